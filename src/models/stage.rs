use serde::{Deserialize, Serialize};

/// Server-assigned position of a booking in its approval lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStage {
    Created,
    PendingStaff,
    PendingAdmin,
    Approved,
    ApprovedStaffOnly,
    Rejected,
    Cancelled,
}

impl ApprovalStage {
    pub const ALL: [ApprovalStage; 7] = [
        ApprovalStage::Created,
        ApprovalStage::PendingStaff,
        ApprovalStage::PendingAdmin,
        ApprovalStage::Approved,
        ApprovalStage::ApprovedStaffOnly,
        ApprovalStage::Rejected,
        ApprovalStage::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStage::Created => "CREATED",
            ApprovalStage::PendingStaff => "PENDING_STAFF",
            ApprovalStage::PendingAdmin => "PENDING_ADMIN",
            ApprovalStage::Approved => "APPROVED",
            ApprovalStage::ApprovedStaffOnly => "APPROVED_STAFF_ONLY",
            ApprovalStage::Rejected => "REJECTED",
            ApprovalStage::Cancelled => "CANCELLED",
        }
    }

    /// Unknown strings yield `None`; callers fall back instead of failing.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(ApprovalStage::Created),
            "PENDING_STAFF" => Some(ApprovalStage::PendingStaff),
            "PENDING_ADMIN" => Some(ApprovalStage::PendingAdmin),
            "APPROVED" => Some(ApprovalStage::Approved),
            "APPROVED_STAFF_ONLY" => Some(ApprovalStage::ApprovedStaffOnly),
            "REJECTED" => Some(ApprovalStage::Rejected),
            "CANCELLED" => Some(ApprovalStage::Cancelled),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ApprovalStage::PendingStaff | ApprovalStage::PendingAdmin)
    }

    /// Rejected and cancelled bookings no longer hold their time slot.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, ApprovalStage::Rejected | ApprovalStage::Cancelled)
    }
}

impl std::fmt::Display for ApprovalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Private,
    Public,
    StaffOnly,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "PRIVATE",
            Visibility::Public => "PUBLIC",
            Visibility::StaffOnly => "STAFF_ONLY",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "PUBLIC" => Visibility::Public,
            "STAFF_ONLY" => Visibility::StaffOnly,
            _ => Visibility::Private,
        }
    }
}
