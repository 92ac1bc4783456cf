use async_trait::async_trait;

use super::ClientError;
use crate::models::{ApprovalAction, BookingView};

/// Which list of bookings a board shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardScope {
    Mine,
    All,
    PendingStaff,
    PendingAdmin,
    StaffStudents,
}

impl BoardScope {
    pub fn path(&self) -> &'static str {
        match self {
            BoardScope::Mine => "/api/bookings/my",
            BoardScope::All => "/api/bookings/all",
            BoardScope::PendingStaff => "/api/approvals/staff/pending",
            BoardScope::PendingAdmin => "/api/approvals/admin/pending",
            BoardScope::StaffStudents => "/api/approvals/staff/student-bookings",
        }
    }
}

#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn fetch(&self, scope: BoardScope) -> Result<Vec<BookingView>, ClientError>;

    async fn perform(
        &self,
        booking_id: &str,
        action: ApprovalAction,
    ) -> Result<BookingView, ClientError>;
}
