use chrono::{Datelike, Months, NaiveDate};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{BookingPolicy, PolicyRemaining, QuotaExceeded, Role, Usage, User};

impl From<QuotaExceeded> for AppError {
    fn from(e: QuotaExceeded) -> Self {
        AppError::Conflict(e.to_string())
    }
}

/// First and last day of the month containing `date`.
fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date);
    (first, last)
}

/// The stored policy for `role`. A role without one is not limited.
pub fn policy_for(conn: &Connection, role: Role) -> AppResult<BookingPolicy> {
    match queries::get_policy(conn, role)? {
        Some(policy) => Ok(policy),
        None => {
            tracing::warn!(role = role.as_str(), "no booking policy stored; not limiting");
            Ok(BookingPolicy::unlimited(role))
        }
    }
}

fn usage_around(conn: &Connection, user: &User, date: NaiveDate) -> AppResult<(Usage, Usage)> {
    let (first, last) = month_bounds(date);
    let day = queries::get_usage(conn, &user.id, &date, &date)?;
    let month = queries::get_usage(conn, &user.id, &first, &last)?;
    Ok((day, month))
}

/// Refuses a new booking of `hours` on `date` that would exceed the
/// owner's daily or monthly allowance.
pub fn check_quota(conn: &Connection, user: &User, date: NaiveDate, hours: i64) -> AppResult<()> {
    let policy = policy_for(conn, user.role)?;
    if policy.is_unlimited {
        return Ok(());
    }

    let (day, month) = usage_around(conn, user, date)?;
    if let Err(e) = policy.admits(day, month, hours) {
        tracing::info!(user_id = %user.id, %date, reason = %e, "booking quota reached");
        return Err(e.into());
    }
    Ok(())
}

pub fn remaining_for_user(conn: &Connection, user: &User, today: NaiveDate) -> AppResult<PolicyRemaining> {
    let policy = policy_for(conn, user.role)?;
    if policy.is_unlimited {
        return Ok(policy.remaining(Usage::default(), Usage::default()));
    }

    let (day, month) = usage_around(conn, user, today)?;
    Ok(policy.remaining(day, month))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::NaiveDateTime;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn make_user(conn: &Connection, id: &str, role: Role) -> User {
        let user = User {
            id: id.to_string(),
            name: format!("{id} name"),
            email: format!("{id}@campus.edu"),
            password_hash: "x".to_string(),
            role,
            advisor_id: None,
            created_at: NaiveDateTime::parse_from_str("2026-03-01 08:00", "%Y-%m-%d %H:%M").unwrap(),
        };
        queries::insert_user(conn, &user).unwrap();
        user
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(month_bounds(d("2026-02-14")), (d("2026-02-01"), d("2026-02-28")));
        assert_eq!(month_bounds(d("2028-02-29")), (d("2028-02-01"), d("2028-02-29")));
        assert_eq!(month_bounds(d("2026-12-31")), (d("2026-12-01"), d("2026-12-31")));
    }

    #[test]
    fn test_seeded_policies() {
        let conn = db::init_db(":memory:").unwrap();
        assert!(policy_for(&conn, Role::Admin).unwrap().is_unlimited);

        let student = policy_for(&conn, Role::Student).unwrap();
        assert!(!student.is_unlimited);
        assert_eq!(student.max_bookings_per_day, Some(2));
        assert_eq!(student.max_hours_per_day, Some(4));
    }

    #[test]
    fn test_missing_policy_is_unlimited() {
        let conn = db::init_db(":memory:").unwrap();
        conn.execute("DELETE FROM booking_policies WHERE role = 'STAFF'", [])
            .unwrap();
        let staff = make_user(&conn, "staff", Role::Staff);

        check_quota(&conn, &staff, d("2026-03-03"), 7).unwrap();
        assert!(remaining_for_user(&conn, &staff, d("2026-03-03")).unwrap().is_unlimited);
    }

    #[test]
    fn test_fresh_student_has_full_allowance() {
        let conn = db::init_db(":memory:").unwrap();
        let student = make_user(&conn, "student", Role::Student);

        let left = remaining_for_user(&conn, &student, d("2026-03-03")).unwrap();
        assert!(!left.is_unlimited);
        assert_eq!(left.remaining_bookings_today, Some(2));
        assert_eq!(left.remaining_bookings_month, Some(10));
        assert_eq!(left.remaining_hours_today, Some(4));
        assert_eq!(left.remaining_hours_month, Some(20));
    }

    #[test]
    fn test_quota_error_is_conflict() {
        let err: AppError = QuotaExceeded::DailyHours.into();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "daily hours limit exceeded"));
    }
}
