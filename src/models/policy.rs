use serde::Serialize;

use crate::models::Role;

/// Reported for every allowance of an unlimited role.
pub const UNLIMITED_REMAINING: i64 = i32::MAX as i64;

/// How much a role may book per day and per month.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPolicy {
    pub role: Role,
    pub max_bookings_per_day: Option<i64>,
    pub max_bookings_per_month: Option<i64>,
    pub max_hours_per_day: Option<i64>,
    pub max_hours_per_month: Option<i64>,
    pub is_unlimited: bool,
}

/// Bookings that still hold a slot, and their hours, over some period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub bookings: i64,
    pub hours: i64,
}

#[derive(Debug, PartialEq)]
pub enum QuotaExceeded {
    DailyBookings,
    MonthlyBookings,
    DailyHours,
    MonthlyHours,
}

impl std::fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaExceeded::DailyBookings => write!(f, "daily booking limit exceeded"),
            QuotaExceeded::MonthlyBookings => write!(f, "monthly booking limit exceeded"),
            QuotaExceeded::DailyHours => write!(f, "daily hours limit exceeded"),
            QuotaExceeded::MonthlyHours => write!(f, "monthly hours limit exceeded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRemaining {
    pub role: Role,
    pub is_unlimited: bool,
    pub remaining_bookings_today: Option<i64>,
    pub remaining_bookings_month: Option<i64>,
    pub remaining_hours_today: Option<i64>,
    pub remaining_hours_month: Option<i64>,
}

/// A limit of zero or less is treated as unset.
fn enforced(limit: Option<i64>) -> Option<i64> {
    limit.filter(|max| *max > 0)
}

fn left(limit: Option<i64>, used: i64) -> Option<i64> {
    enforced(limit).map(|max| (max - used).max(0))
}

impl BookingPolicy {
    /// A policy that enforces nothing, for roles without a stored row.
    pub fn unlimited(role: Role) -> Self {
        Self {
            role,
            max_bookings_per_day: None,
            max_bookings_per_month: None,
            max_hours_per_day: None,
            max_hours_per_month: None,
            is_unlimited: true,
        }
    }

    /// Whether one more booking of `hours` fits on top of `day` and `month`.
    pub fn admits(&self, day: Usage, month: Usage, hours: i64) -> Result<(), QuotaExceeded> {
        if self.is_unlimited {
            return Ok(());
        }

        let over = |limit: Option<i64>, total: i64| enforced(limit).is_some_and(|max| total > max);

        if over(self.max_bookings_per_day, day.bookings + 1) {
            return Err(QuotaExceeded::DailyBookings);
        }
        if over(self.max_bookings_per_month, month.bookings + 1) {
            return Err(QuotaExceeded::MonthlyBookings);
        }
        if over(self.max_hours_per_day, day.hours + hours) {
            return Err(QuotaExceeded::DailyHours);
        }
        if over(self.max_hours_per_month, month.hours + hours) {
            return Err(QuotaExceeded::MonthlyHours);
        }
        Ok(())
    }

    /// Allowance left after `day` and `month`. Unset limits report `None`.
    pub fn remaining(&self, day: Usage, month: Usage) -> PolicyRemaining {
        if self.is_unlimited {
            return PolicyRemaining {
                role: self.role,
                is_unlimited: true,
                remaining_bookings_today: Some(UNLIMITED_REMAINING),
                remaining_bookings_month: Some(UNLIMITED_REMAINING),
                remaining_hours_today: Some(UNLIMITED_REMAINING),
                remaining_hours_month: Some(UNLIMITED_REMAINING),
            };
        }

        PolicyRemaining {
            role: self.role,
            is_unlimited: false,
            remaining_bookings_today: left(self.max_bookings_per_day, day.bookings),
            remaining_bookings_month: left(self.max_bookings_per_month, month.bookings),
            remaining_hours_today: left(self.max_hours_per_day, day.hours),
            remaining_hours_month: left(self.max_hours_per_month, month.hours),
        }
    }
}
