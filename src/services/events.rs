use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppResult;
use crate::models::{Booking, Role, StageChange, User};
use crate::state::AppState;

/// Appends the booking's current stage to its history and returns the event
/// to broadcast once the caller has released the database.
pub fn record_stage_change(
    conn: &Connection,
    booking: &Booking,
    owner: &User,
    changed_by: &str,
    now: NaiveDateTime,
) -> AppResult<StageChange> {
    let id = queries::insert_history(conn, &booking.id, booking.approval_stage, Some(changed_by), &now)?;
    Ok(StageChange {
        id,
        booking_id: booking.id.clone(),
        owner_id: owner.id.clone(),
        advisor_id: owner.advisor_id.clone(),
        stage: booking.approval_stage,
        changed_by: Some(changed_by.to_string()),
        changed_at: now,
    })
}

pub fn publish(state: &AppState, change: StageChange) {
    tracing::info!(
        booking_id = %change.booking_id,
        stage = change.stage.as_str(),
        "booking stage changed"
    );
    // No subscribers is fine
    let _ = state.stage_tx.send(change);
}

/// Admins follow every booking; everyone else only their own and, for
/// staff, their advisees'.
pub fn visible_to(change: &StageChange, viewer: &User) -> bool {
    match viewer.role {
        Role::Admin => true,
        Role::Staff => {
            change.owner_id == viewer.id || change.advisor_id.as_deref() == Some(viewer.id.as_str())
        }
        Role::Student => change.owner_id == viewer.id,
    }
}
