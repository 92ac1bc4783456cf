use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ApprovalStage, Booking, BookingView, LegalActions, NewBooking, Role, StageChange,
    StageHistoryEntry, StatusBadge, Tracker, User, Visibility,
};
use crate::services::{events, policy};

pub(crate) const OPENING: (u32, u32) = (9, 0);
pub(crate) const CLOSING: (u32, u32) = (16, 0);
const LUNCH_START: (u32, u32) = (12, 30);
const LUNCH_END: (u32, u32) = (13, 30);

pub(crate) fn at(hm: (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hm.0, hm.1, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, PartialEq)]
pub enum BookingRuleError {
    EndNotAfterStart,
    PartialHours,
    PastDate,
    StartAlreadyPassed,
    BeforeOpening,
    AfterClosing,
    LunchOverlap,
    SlotTaken,
}

impl std::fmt::Display for BookingRuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingRuleError::EndNotAfterStart => write!(f, "endTime must be after startTime"),
            BookingRuleError::PartialHours => write!(f, "booking duration must be in full hours"),
            BookingRuleError::PastDate => write!(f, "cannot book for past dates"),
            BookingRuleError::StartAlreadyPassed => {
                write!(f, "cannot book a slot that has already passed")
            }
            BookingRuleError::BeforeOpening => write!(f, "booking cannot start before 09:00"),
            BookingRuleError::AfterClosing => write!(f, "booking cannot end after 16:00"),
            BookingRuleError::LunchOverlap => {
                write!(f, "booking cannot overlap with lunch break (12:30 - 13:30)")
            }
            BookingRuleError::SlotTaken => {
                write!(f, "resource already booked for the selected time range")
            }
        }
    }
}

impl From<BookingRuleError> for AppError {
    fn from(e: BookingRuleError) -> Self {
        match e {
            BookingRuleError::SlotTaken => AppError::Conflict(e.to_string()),
            _ => AppError::Validation(e.to_string()),
        }
    }
}

/// Starts before lunch ends and ends after lunch starts.
pub(crate) fn overlaps_lunch(start: NaiveTime, end: NaiveTime) -> bool {
    start < at(LUNCH_END) && at(LUNCH_START) < end
}

pub fn duration_hours(start: NaiveTime, end: NaiveTime) -> Result<i32, BookingRuleError> {
    let minutes = (end - start).num_minutes();
    if minutes <= 0 {
        return Err(BookingRuleError::EndNotAfterStart);
    }
    if minutes % 60 != 0 {
        return Err(BookingRuleError::PartialHours);
    }
    Ok((minutes / 60) as i32)
}

/// Calendar rules that need no storage: whole hours, not in the past,
/// inside opening hours and clear of the lunch break.
pub fn check_time_rules(req: &NewBooking, now: &NaiveDateTime) -> Result<i32, BookingRuleError> {
    let hours = duration_hours(req.start_time, req.end_time)?;

    if req.booking_date < now.date() {
        return Err(BookingRuleError::PastDate);
    }
    if req.booking_date == now.date() && req.start_time < now.time() {
        return Err(BookingRuleError::StartAlreadyPassed);
    }
    if req.start_time < at(OPENING) {
        return Err(BookingRuleError::BeforeOpening);
    }
    if req.end_time > at(CLOSING) {
        return Err(BookingRuleError::AfterClosing);
    }
    if overlaps_lunch(req.start_time, req.end_time) {
        return Err(BookingRuleError::LunchOverlap);
    }

    Ok(hours)
}

/// The creator's role decides where the booking enters the approval flow.
fn initial_stage(role: Role) -> (ApprovalStage, Visibility) {
    match role {
        Role::Student => (ApprovalStage::PendingStaff, Visibility::Private),
        Role::Staff => (ApprovalStage::PendingAdmin, Visibility::Private),
        Role::Admin => (ApprovalStage::Approved, Visibility::Public),
    }
}

pub fn create_booking(
    conn: &Connection,
    user: &User,
    req: NewBooking,
    now: NaiveDateTime,
) -> AppResult<(BookingView, StageChange)> {
    let resource_id = req.resource_id.trim().to_string();
    if resource_id.is_empty() {
        return Err(AppError::Validation("resourceId is required".to_string()));
    }

    let duration_hours = check_time_rules(&req, &now)?;

    if queries::has_overlapping_booking(
        conn,
        &resource_id,
        &req.booking_date,
        &req.start_time,
        &req.end_time,
    )? {
        return Err(BookingRuleError::SlotTaken.into());
    }

    policy::check_quota(conn, user, req.booking_date, i64::from(duration_hours))?;

    let (approval_stage, visibility) = initial_stage(user.role);
    let admin_approval = (user.role == Role::Admin).then(|| (user.id.clone(), now));

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        resource_id,
        booking_date: req.booking_date,
        start_time: req.start_time,
        end_time: req.end_time,
        duration_hours,
        approval_stage,
        visibility,
        staff_approved_by: None,
        staff_approved_at: None,
        admin_approved_by: admin_approval.as_ref().map(|(id, _)| id.clone()),
        admin_approved_at: admin_approval.map(|(_, at)| at),
        created_at: now,
        updated_at: now,
    };

    let tx = conn.unchecked_transaction()?;
    queries::insert_booking(&tx, &booking)?;
    let change = events::record_stage_change(&tx, &booking, user, &user.id, now)?;
    tx.commit()?;

    let view = queries::get_booking_view(conn, &booking.id)?
        .ok_or_else(|| AppError::NotFound("booking vanished after insert".to_string()))?;
    Ok((view, change))
}

pub fn my_bookings(conn: &Connection, user: &User) -> AppResult<Vec<BookingView>> {
    Ok(queries::get_bookings_for_user(conn, &user.id)?)
}

pub fn all_bookings(conn: &Connection, user: &User) -> AppResult<Vec<BookingView>> {
    if user.role != Role::Admin {
        return Err(AppError::Forbidden("only ADMIN can list all bookings".to_string()));
    }
    Ok(queries::get_all_bookings(conn)?)
}

/// Loads a booking the viewer is entitled to see: their own, one of their
/// advisees' (staff), or any (admin).
pub fn get_visible_booking(conn: &Connection, viewer: &User, id: &str) -> AppResult<BookingView> {
    let view = queries::get_booking_view(conn, id)?
        .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;

    let allowed = match viewer.role {
        Role::Admin => true,
        _ if view.user_id == viewer.id => true,
        Role::Staff => queries::get_user_by_id(conn, &view.user_id)?
            .and_then(|owner| owner.advisor_id)
            .is_some_and(|advisor| advisor == viewer.id),
        Role::Student => false,
    };

    if !allowed {
        return Err(AppError::Forbidden("not allowed to view this booking".to_string()));
    }
    Ok(view)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerView {
    pub booking: BookingView,
    pub is_staff_booking: bool,
    pub tracker: Tracker,
    pub status: StatusBadge,
    pub actions: LegalActions,
}

pub fn tracker_view(conn: &Connection, viewer: &User, id: &str) -> AppResult<TrackerView> {
    let booking = get_visible_booking(conn, viewer, id)?;
    Ok(TrackerView {
        is_staff_booking: booking.is_staff_booking(),
        tracker: Tracker::from(booking.projection()),
        status: booking.status_badge(),
        actions: booking.legal_actions(&viewer.id, viewer.role),
        booking,
    })
}

pub fn history(conn: &Connection, viewer: &User, id: &str) -> AppResult<Vec<StageHistoryEntry>> {
    get_visible_booking(conn, viewer, id)?;
    Ok(queries::get_history(conn, id)?)
}
