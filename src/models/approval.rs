//! Approval-stage state machine as seen by a viewer: which sequence a booking
//! travels, where it sits on it, and how that is rendered.
//!
//! Nothing here fails. An absent or unrecognized stage is treated as "just
//! created" so a server value this build does not know never breaks a view.

use serde::{Deserialize, Serialize};

use super::stage::ApprovalStage;

/// The ordered sequence of stops a booking travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// `CREATED → PENDING_STAFF → PENDING_ADMIN → APPROVED`
    Student,
    /// `CREATED → PENDING_ADMIN → APPROVED`; the creator is already staff.
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stop {
    pub stage: ApprovalStage,
    pub label: &'static str,
}

const STUDENT_STOPS: [Stop; 4] = [
    Stop { stage: ApprovalStage::Created, label: "Created" },
    Stop { stage: ApprovalStage::PendingStaff, label: "Staff Review" },
    Stop { stage: ApprovalStage::PendingAdmin, label: "Admin Review" },
    Stop { stage: ApprovalStage::Approved, label: "Approved" },
];

const STAFF_STOPS: [Stop; 3] = [
    Stop { stage: ApprovalStage::Created, label: "Created" },
    Stop { stage: ApprovalStage::PendingAdmin, label: "Admin Review" },
    Stop { stage: ApprovalStage::Approved, label: "Approved" },
];

impl Track {
    pub fn from_staff_flag(is_staff_booking: bool) -> Self {
        if is_staff_booking {
            Track::Staff
        } else {
            Track::Student
        }
    }

    pub fn stops(&self) -> &'static [Stop] {
        match self {
            Track::Student => &STUDENT_STOPS,
            Track::Staff => &STAFF_STOPS,
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops().len()
    }
}

/// A booking's approval state with the originating track made explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingState {
    Created(Track),
    StudentPendingStaff,
    StudentPendingAdmin,
    StaffPendingAdmin,
    Approved { track: Track, staff_only: bool },
    Rejected,
    Cancelled,
}

impl BookingState {
    /// `PENDING_STAFF` always lands on the student track: a booking still
    /// waiting for staff review cannot have been created by staff, whatever
    /// the flag says.
    pub fn new(stage: Option<&str>, is_staff_booking: bool) -> Self {
        let track = Track::from_staff_flag(is_staff_booking);
        match stage.and_then(ApprovalStage::parse) {
            Some(ApprovalStage::Rejected) => BookingState::Rejected,
            Some(ApprovalStage::Cancelled) => BookingState::Cancelled,
            Some(ApprovalStage::PendingStaff) => BookingState::StudentPendingStaff,
            Some(ApprovalStage::PendingAdmin) => match track {
                Track::Student => BookingState::StudentPendingAdmin,
                Track::Staff => BookingState::StaffPendingAdmin,
            },
            Some(ApprovalStage::Approved) => BookingState::Approved {
                track,
                staff_only: false,
            },
            Some(ApprovalStage::ApprovedStaffOnly) => BookingState::Approved {
                track,
                staff_only: true,
            },
            Some(ApprovalStage::Created) | None => BookingState::Created(track),
        }
    }

    /// `None` once the booking has left both sequences.
    pub fn track(&self) -> Option<Track> {
        match self {
            BookingState::Created(track) | BookingState::Approved { track, .. } => Some(*track),
            BookingState::StudentPendingStaff | BookingState::StudentPendingAdmin => {
                Some(Track::Student)
            }
            BookingState::StaffPendingAdmin => Some(Track::Staff),
            BookingState::Rejected | BookingState::Cancelled => None,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        match self {
            BookingState::Created(_) => Some(0),
            BookingState::StudentPendingStaff | BookingState::StaffPendingAdmin => Some(1),
            BookingState::StudentPendingAdmin => Some(2),
            BookingState::Approved { track, .. } => Some(track.stop_count() - 1),
            BookingState::Rejected | BookingState::Cancelled => None,
        }
    }
}

/// Where a booking sits on its progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    /// Position on `track`, or -1 when the booking was rejected or cancelled.
    pub current_index: i32,
    pub is_rejected: bool,
    pub is_cancelled: bool,
    pub track: Track,
}

pub fn project(stage: Option<&str>, is_staff_booking: bool) -> Projection {
    let state = BookingState::new(stage, is_staff_booking);
    Projection {
        current_index: state.current_index().map(|i| i as i32).unwrap_or(-1),
        is_rejected: state == BookingState::Rejected,
        is_cancelled: state == BookingState::Cancelled,
        track: state
            .track()
            .unwrap_or_else(|| Track::from_staff_flag(is_staff_booking)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Current,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStep {
    pub stage: ApprovalStage,
    pub label: &'static str,
    pub status: StepStatus,
}

impl Projection {
    pub fn is_terminal_failure(&self) -> bool {
        self.is_rejected || self.is_cancelled
    }

    /// One step per stop; empty when the progress line is suppressed.
    pub fn steps(&self) -> Vec<TrackerStep> {
        if self.is_terminal_failure() {
            return Vec::new();
        }
        self.track
            .stops()
            .iter()
            .enumerate()
            .map(|(idx, stop)| {
                let idx = idx as i32;
                let status = if idx < self.current_index {
                    StepStatus::Completed
                } else if idx == self.current_index {
                    StepStatus::Current
                } else {
                    StepStatus::Pending
                };
                TrackerStep {
                    stage: stop.stage,
                    label: stop.label,
                    status,
                }
            })
            .collect()
    }

    /// Filled share of the progress line, linear across the stops.
    pub fn progress(&self) -> f64 {
        let last = (self.track.stop_count() - 1) as f64;
        (self.current_index as f64 / last).max(0.0)
    }

    pub fn terminal_badge(&self) -> Option<&'static str> {
        if self.is_rejected {
            Some("Booking Rejected")
        } else if self.is_cancelled {
            Some("Booking Cancelled")
        } else {
            None
        }
    }
}

/// Everything a progress tracker needs to draw one booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracker {
    #[serde(flatten)]
    pub projection: Projection,
    pub steps: Vec<TrackerStep>,
    pub progress: f64,
    pub terminal_badge: Option<&'static str>,
}

impl From<Projection> for Tracker {
    fn from(projection: Projection) -> Self {
        Self {
            steps: projection.steps(),
            progress: projection.progress(),
            terminal_badge: projection.terminal_badge(),
            projection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Success,
    Error,
    Warning,
    Info,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub label: String,
    pub tone: Tone,
}

pub fn status_badge(stage: Option<&str>) -> StatusBadge {
    let raw = stage.unwrap_or("UNKNOWN");
    let tone = match ApprovalStage::parse(raw) {
        Some(ApprovalStage::Approved | ApprovalStage::ApprovedStaffOnly) => Tone::Success,
        Some(ApprovalStage::Rejected) => Tone::Error,
        Some(ApprovalStage::PendingStaff) => Tone::Warning,
        Some(ApprovalStage::PendingAdmin) => Tone::Info,
        Some(ApprovalStage::Cancelled) | Some(ApprovalStage::Created) => Tone::Neutral,
        None => {
            return StatusBadge {
                label: raw.to_string(),
                tone: Tone::Neutral,
            }
        }
    };
    StatusBadge {
        label: raw.replace('_', " "),
        tone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGES: [&str; 7] = [
        "CREATED",
        "PENDING_STAFF",
        "PENDING_ADMIN",
        "APPROVED",
        "APPROVED_STAFF_ONLY",
        "REJECTED",
        "CANCELLED",
    ];

    #[test]
    fn test_index_in_range_for_every_stage() {
        for stage in STAGES {
            for flag in [true, false] {
                let p = project(Some(stage), flag);
                let last = p.track.stop_count() as i32 - 1;
                assert!(
                    (-1..=last).contains(&p.current_index),
                    "{stage}/{flag} gave {}",
                    p.current_index
                );
            }
        }
    }

    #[test]
    fn test_rejected_is_terminal() {
        for flag in [true, false] {
            let p = project(Some("REJECTED"), flag);
            assert_eq!(p.current_index, -1);
            assert!(p.is_rejected);
            assert!(!p.is_cancelled);
        }
    }

    #[test]
    fn test_cancelled_is_terminal() {
        for flag in [true, false] {
            let p = project(Some("CANCELLED"), flag);
            assert_eq!(p.current_index, -1);
            assert!(!p.is_rejected);
            assert!(p.is_cancelled);
        }
    }

    #[test]
    fn test_pending_admin_depends_on_track() {
        assert_eq!(project(Some("PENDING_ADMIN"), false).current_index, 2);
        assert_eq!(project(Some("PENDING_ADMIN"), true).current_index, 1);
    }

    #[test]
    fn test_approved_is_last_stop() {
        assert_eq!(project(Some("APPROVED"), true).current_index, 2);
        assert_eq!(project(Some("APPROVED"), false).current_index, 3);
        assert_eq!(project(Some("APPROVED_STAFF_ONLY"), true).current_index, 2);
        assert_eq!(project(Some("APPROVED_STAFF_ONLY"), false).current_index, 3);
    }

    #[test]
    fn test_unknown_and_missing_stage_fall_back_to_created() {
        assert_eq!(project(Some("UNKNOWN_STAGE"), false).current_index, 0);
        assert_eq!(project(Some("UNKNOWN_STAGE"), true).current_index, 0);
        assert_eq!(project(None, false).current_index, 0);
        assert_eq!(project(Some("CREATED"), false).current_index, 0);
    }

    #[test]
    fn test_pending_staff_on_staff_flag_uses_student_track() {
        let p = project(Some("PENDING_STAFF"), true);
        assert_eq!(p.current_index, 1);
        assert_eq!(p.track, Track::Student);
        let current: Vec<_> = p
            .steps()
            .into_iter()
            .filter(|s| s.status == StepStatus::Current)
            .collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].label, "Staff Review");
    }

    #[test]
    fn test_project_is_pure() {
        for stage in STAGES.iter().copied().chain(["BOGUS"]) {
            for flag in [true, false] {
                assert_eq!(project(Some(stage), flag), project(Some(stage), flag));
            }
        }
    }

    #[test]
    fn test_exactly_one_current_step() {
        for stage in ["CREATED", "PENDING_STAFF", "PENDING_ADMIN", "APPROVED"] {
            for flag in [true, false] {
                let steps = project(Some(stage), flag).steps();
                let current = steps
                    .iter()
                    .filter(|s| s.status == StepStatus::Current)
                    .count();
                assert_eq!(current, 1, "{stage}/{flag}");
            }
        }
    }

    #[test]
    fn test_step_statuses_around_current() {
        let steps = project(Some("PENDING_ADMIN"), false).steps();
        let statuses: Vec<_> = steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Completed,
                StepStatus::Completed,
                StepStatus::Current,
                StepStatus::Pending
            ]
        );
    }

    #[test]
    fn test_terminal_suppresses_steps() {
        let p = project(Some("REJECTED"), false);
        assert!(p.steps().is_empty());
        assert_eq!(p.terminal_badge(), Some("Booking Rejected"));
        assert_eq!(p.progress(), 0.0);

        let p = project(Some("CANCELLED"), true);
        assert!(p.steps().is_empty());
        assert_eq!(p.terminal_badge(), Some("Booking Cancelled"));
    }

    #[test]
    fn test_progress_is_linear() {
        assert_eq!(project(Some("CREATED"), false).progress(), 0.0);
        assert!((project(Some("PENDING_STAFF"), false).progress() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(project(Some("PENDING_ADMIN"), true).progress(), 0.5);
        assert_eq!(project(Some("APPROVED"), false).progress(), 1.0);
        assert_eq!(project(Some("APPROVED"), true).progress(), 1.0);
    }

    #[test]
    fn test_tracker_serializes_flat() {
        let tracker = Tracker::from(project(Some("PENDING_STAFF"), false));
        let json = serde_json::to_value(&tracker).unwrap();
        assert_eq!(json["currentIndex"], 1);
        assert_eq!(json["isRejected"], false);
        assert_eq!(json["track"], "student");
        assert_eq!(json["steps"].as_array().unwrap().len(), 4);
        assert_eq!(json["steps"][1]["status"], "current");
        assert!(json["terminalBadge"].is_null());
    }

    #[test]
    fn test_status_badge_is_total() {
        assert_eq!(status_badge(Some("APPROVED")).tone, Tone::Success);
        assert_eq!(status_badge(Some("APPROVED_STAFF_ONLY")).tone, Tone::Success);
        assert_eq!(status_badge(Some("REJECTED")).tone, Tone::Error);
        assert_eq!(status_badge(Some("PENDING_STAFF")).tone, Tone::Warning);
        assert_eq!(status_badge(Some("PENDING_ADMIN")).tone, Tone::Info);
        assert_eq!(status_badge(Some("CANCELLED")).tone, Tone::Neutral);
        assert_eq!(status_badge(Some("PENDING_ADMIN")).label, "PENDING ADMIN");

        let unknown = status_badge(Some("ON_HOLD"));
        assert_eq!(unknown.label, "ON_HOLD");
        assert_eq!(unknown.tone, Tone::Neutral);

        assert_eq!(status_badge(None).label, "UNKNOWN");
    }
}
