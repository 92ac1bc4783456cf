use serde::{Deserialize, Serialize};

use super::stage::ApprovalStage;
use super::user::Role;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalActions {
    pub can_approve: bool,
    pub can_reject: bool,
    pub can_cancel: bool,
}

impl LegalActions {
    pub fn allows(&self, action: ViewerAction) -> bool {
        match action {
            ViewerAction::Approve => self.can_approve,
            ViewerAction::Reject => self.can_reject,
            ViewerAction::Cancel => self.can_cancel,
        }
    }
}

/// Who may move a booking out of `stage`.
///
/// Only pending stages accept actions: the reviewer for that stage may
/// approve or reject, and the owner may cancel. Terminal, created and
/// unrecognized stages allow nothing.
pub fn legal_actions(stage: Option<&str>, viewer_role: Role, is_owner: bool) -> LegalActions {
    let Some(stage) = stage.and_then(ApprovalStage::parse) else {
        return LegalActions::default();
    };

    let reviewer = match stage {
        ApprovalStage::PendingStaff => viewer_role == Role::Staff,
        ApprovalStage::PendingAdmin => viewer_role == Role::Admin,
        _ => false,
    };

    LegalActions {
        can_approve: reviewer,
        can_reject: reviewer,
        can_cancel: stage.is_pending() && is_owner,
    }
}

/// What a viewer asks for, before the role decides which review stage it hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerAction {
    Approve,
    Reject,
    Cancel,
}

/// A concrete server-side transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    StaffApprove,
    StaffReject,
    AdminApprove,
    AdminReject,
    Cancel,
}

impl ApprovalAction {
    pub fn for_viewer(action: ViewerAction, role: Role) -> Option<Self> {
        match (action, role) {
            (ViewerAction::Cancel, _) => Some(ApprovalAction::Cancel),
            (ViewerAction::Approve, Role::Staff) => Some(ApprovalAction::StaffApprove),
            (ViewerAction::Reject, Role::Staff) => Some(ApprovalAction::StaffReject),
            (ViewerAction::Approve, Role::Admin) => Some(ApprovalAction::AdminApprove),
            (ViewerAction::Reject, Role::Admin) => Some(ApprovalAction::AdminReject),
            (ViewerAction::Approve | ViewerAction::Reject, Role::Student) => None,
        }
    }

    pub fn viewer_action(&self) -> ViewerAction {
        match self {
            ApprovalAction::StaffApprove | ApprovalAction::AdminApprove => ViewerAction::Approve,
            ApprovalAction::StaffReject | ApprovalAction::AdminReject => ViewerAction::Reject,
            ApprovalAction::Cancel => ViewerAction::Cancel,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::StaffApprove => "staff_approve",
            ApprovalAction::StaffReject => "staff_reject",
            ApprovalAction::AdminApprove => "admin_approve",
            ApprovalAction::AdminReject => "admin_reject",
            ApprovalAction::Cancel => "cancel",
        }
    }
}
