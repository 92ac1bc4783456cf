use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::approval::{self, Projection, StatusBadge};
use super::permissions::{self, LegalActions};
use super::stage::{ApprovalStage, Visibility};
use super::user::Role;

/// Server-side booking record. Scheduling attributes and owner never change
/// after creation; only the approval columns move.
#[derive(Debug, Clone)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub resource_id: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_hours: i32,
    pub approval_stage: ApprovalStage,
    pub visibility: Visibility,
    pub staff_approved_by: Option<String>,
    pub staff_approved_at: Option<NaiveDateTime>,
    pub admin_approved_by: Option<String>,
    pub admin_approved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Display names joined in from the users table.
#[derive(Debug, Clone, Default)]
pub struct BookingNames {
    pub user_name: Option<String>,
    pub staff_approved_by_name: Option<String>,
    pub admin_approved_by_name: Option<String>,
}

/// Read-only booking snapshot as served to, and held by, clients.
///
/// `approval_stage` and `visibility` stay raw strings so that a value the
/// client does not know still decodes; everything derived from the stage
/// degrades to a safe default instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub resource_id: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_hours: i32,
    pub approval_stage: String,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub staff_approved_by: Option<String>,
    #[serde(default)]
    pub staff_approved_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub staff_approved_by_name: Option<String>,
    #[serde(default)]
    pub admin_approved_by: Option<String>,
    #[serde(default)]
    pub admin_approved_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub admin_approved_by_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BookingView {
    pub fn new(booking: &Booking, names: BookingNames) -> Self {
        Self {
            id: booking.id.clone(),
            user_id: booking.user_id.clone(),
            user_name: names.user_name,
            resource_id: booking.resource_id.clone(),
            booking_date: booking.booking_date,
            start_time: booking.start_time,
            end_time: booking.end_time,
            duration_hours: booking.duration_hours,
            approval_stage: booking.approval_stage.as_str().to_string(),
            visibility: booking.visibility.as_str().to_string(),
            staff_approved_by: booking.staff_approved_by.clone(),
            staff_approved_at: booking.staff_approved_at,
            staff_approved_by_name: names.staff_approved_by_name,
            admin_approved_by: booking.admin_approved_by.clone(),
            admin_approved_at: booking.admin_approved_at,
            admin_approved_by_name: names.admin_approved_by_name,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }

    pub fn stage(&self) -> Option<ApprovalStage> {
        ApprovalStage::parse(&self.approval_stage)
    }

    /// A booking created by staff waits for admin review without ever having
    /// passed a staff approval.
    pub fn is_staff_booking(&self) -> bool {
        self.stage() == Some(ApprovalStage::PendingAdmin) && self.staff_approved_by.is_none()
    }

    pub fn projection(&self) -> Projection {
        approval::project(Some(&self.approval_stage), self.is_staff_booking())
    }

    pub fn status_badge(&self) -> StatusBadge {
        approval::status_badge(Some(&self.approval_stage))
    }

    pub fn legal_actions(&self, viewer_id: &str, viewer_role: Role) -> LegalActions {
        permissions::legal_actions(
            Some(&self.approval_stage),
            viewer_role,
            self.user_id == viewer_id,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub resource_id: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageHistoryEntry {
    pub id: i64,
    pub booking_id: String,
    pub stage: ApprovalStage,
    pub changed_by: Option<String>,
    pub changed_at: NaiveDateTime,
}

/// Broadcast whenever a history row is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChange {
    pub id: i64,
    pub booking_id: String,
    pub owner_id: String,
    pub advisor_id: Option<String>,
    pub stage: ApprovalStage,
    pub changed_by: Option<String>,
    pub changed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingStats {
    pub total_bookings: i64,
    pub pending_bookings: i64,
    pub approved_bookings: i64,
    pub rejected_bookings: i64,
}
