use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{
    legal_actions, ApprovalAction, ApprovalStage, Booking, BookingStats, BookingView, Role,
    StageChange, User, Visibility,
};
use crate::services::events;

/// The stage a booking must be in for `action` to apply.
fn expected_stage(action: ApprovalAction, stage: ApprovalStage) -> Result<(), AppError> {
    let ok = match action {
        ApprovalAction::StaffApprove | ApprovalAction::StaffReject => {
            stage == ApprovalStage::PendingStaff
        }
        ApprovalAction::AdminApprove | ApprovalAction::AdminReject => {
            stage == ApprovalStage::PendingAdmin
        }
        ApprovalAction::Cancel => stage.is_pending(),
    };
    if ok {
        return Ok(());
    }

    let msg = match action {
        ApprovalAction::StaffApprove | ApprovalAction::StaffReject => {
            "booking is not pending staff approval"
        }
        ApprovalAction::AdminApprove | ApprovalAction::AdminReject => {
            "booking is not pending admin approval"
        }
        ApprovalAction::Cancel => "only pending bookings can be cancelled",
    };
    Err(AppError::Conflict(format!("{msg} (current stage {})", stage.as_str())))
}

/// Moves `booking` to the stage `action` leads to. Stage and permission
/// checks have already passed.
fn transition(booking: &mut Booking, owner: &User, actor: &User, action: ApprovalAction, now: NaiveDateTime) {
    match action {
        ApprovalAction::StaffApprove => {
            booking.approval_stage = ApprovalStage::PendingAdmin;
            booking.staff_approved_by = Some(actor.id.clone());
            booking.staff_approved_at = Some(now);
        }
        ApprovalAction::AdminApprove => {
            booking.admin_approved_by = Some(actor.id.clone());
            booking.admin_approved_at = Some(now);
            if owner.role == Role::Staff {
                booking.approval_stage = ApprovalStage::ApprovedStaffOnly;
                booking.visibility = Visibility::StaffOnly;
            } else {
                booking.approval_stage = ApprovalStage::Approved;
                booking.visibility = Visibility::Public;
            }
        }
        ApprovalAction::StaffReject | ApprovalAction::AdminReject => {
            booking.approval_stage = ApprovalStage::Rejected;
        }
        ApprovalAction::Cancel => {
            booking.approval_stage = ApprovalStage::Cancelled;
        }
    }
    booking.updated_at = now;
}

/// Applies one approval action on behalf of `actor`.
///
/// Unknown bookings are `NotFound`, a booking in the wrong stage is
/// `Conflict`, and an actor the stage does not admit is `Forbidden`.
/// Staff may only review bookings of students they advise.
pub fn apply_action(
    conn: &Connection,
    actor: &User,
    booking_id: &str,
    action: ApprovalAction,
    now: NaiveDateTime,
) -> AppResult<(BookingView, StageChange)> {
    let mut booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
    let owner = queries::get_user_by_id(conn, &booking.user_id)?
        .ok_or_else(|| AppError::NotFound("booking owner not found".to_string()))?;

    expected_stage(action, booking.approval_stage)?;

    let allowed = legal_actions(
        Some(booking.approval_stage.as_str()),
        actor.role,
        booking.user_id == actor.id,
    );
    if !allowed.allows(action.viewer_action()) {
        tracing::warn!(
            user_id = %actor.id,
            booking_id,
            action = action.as_str(),
            "approval action refused"
        );
        return Err(AppError::Forbidden(format!(
            "{} cannot {} this booking",
            actor.role.as_str(),
            action.as_str()
        )));
    }

    if matches!(action, ApprovalAction::StaffApprove | ApprovalAction::StaffReject)
        && owner.advisor_id.as_deref() != Some(actor.id.as_str())
    {
        return Err(AppError::Forbidden(
            "you are not the assigned advisor for this student".to_string(),
        ));
    }

    let from = booking.approval_stage;
    transition(&mut booking, &owner, actor, action, now);

    // Stage and history land together or not at all
    let tx = conn.unchecked_transaction()?;
    queries::update_approval(&tx, &booking)?;
    let change = events::record_stage_change(&tx, &booking, &owner, &actor.id, now)?;
    tx.commit()?;

    tracing::info!(
        booking_id,
        from = from.as_str(),
        to = booking.approval_stage.as_str(),
        by = %actor.id,
        "approval transition"
    );

    let view = queries::get_booking_view(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
    Ok((view, change))
}

fn require_role(user: &User, role: Role) -> AppResult<()> {
    if user.role != role {
        return Err(AppError::Forbidden(format!("requires {} role", role.as_str())));
    }
    Ok(())
}

// ── Review queues ──

pub fn staff_pending(conn: &Connection, staff: &User) -> AppResult<Vec<BookingView>> {
    require_role(staff, Role::Staff)?;
    Ok(queries::get_advisee_bookings_by_stage(conn, &staff.id, ApprovalStage::PendingStaff)?)
}

pub fn staff_student_bookings(conn: &Connection, staff: &User) -> AppResult<Vec<BookingView>> {
    require_role(staff, Role::Staff)?;
    Ok(queries::get_advisee_bookings(conn, &staff.id)?)
}

pub fn staff_stats(conn: &Connection, staff: &User) -> AppResult<BookingStats> {
    require_role(staff, Role::Staff)?;
    Ok(queries::get_advisee_stats(conn, &staff.id)?)
}

pub fn admin_pending(conn: &Connection, admin: &User) -> AppResult<Vec<BookingView>> {
    require_role(admin, Role::Admin)?;
    Ok(queries::get_bookings_by_stage(conn, ApprovalStage::PendingAdmin)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::NewBooking;
    use crate::services::bookings;
    use chrono::{NaiveDate, NaiveTime};

    struct Campus {
        conn: Connection,
        advisor: User,
        other_staff: User,
        student: User,
        admin: User,
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn make_user(conn: &Connection, id: &str, role: Role, advisor_id: Option<&str>) -> User {
        let user = User {
            id: id.to_string(),
            name: format!("{id} name"),
            email: format!("{id}@campus.edu"),
            password_hash: "x".to_string(),
            role,
            advisor_id: advisor_id.map(|s| s.to_string()),
            created_at: now(),
        };
        queries::insert_user(conn, &user).unwrap();
        user
    }

    fn campus() -> Campus {
        let conn = db::init_db(":memory:").unwrap();
        let advisor = make_user(&conn, "advisor", Role::Staff, None);
        let other_staff = make_user(&conn, "other", Role::Staff, None);
        let student = make_user(&conn, "student", Role::Student, Some("advisor"));
        let admin = make_user(&conn, "admin", Role::Admin, None);
        Campus {
            conn,
            advisor,
            other_staff,
            student,
            admin,
        }
    }

    fn book(conn: &Connection, user: &User, start: u32) -> BookingView {
        let req = NewBooking {
            resource_id: "lab-1".to_string(),
            booking_date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(start + 1, 0, 0).unwrap(),
        };
        bookings::create_booking(conn, user, req, now()).unwrap().0
    }

    #[test]
    fn test_student_booking_full_approval() {
        let c = campus();
        let b = book(&c.conn, &c.student, 9);

        let (b, _) = apply_action(&c.conn, &c.advisor, &b.id, ApprovalAction::StaffApprove, now())
            .unwrap();
        assert_eq!(b.approval_stage, "PENDING_ADMIN");
        assert_eq!(b.staff_approved_by.as_deref(), Some("advisor"));
        assert_eq!(b.staff_approved_by_name.as_deref(), Some("advisor name"));
        assert!(!b.is_staff_booking());
        assert_eq!(b.projection().current_index, 2);

        let (b, change) =
            apply_action(&c.conn, &c.admin, &b.id, ApprovalAction::AdminApprove, now()).unwrap();
        assert_eq!(b.approval_stage, "APPROVED");
        assert_eq!(b.visibility, "PUBLIC");
        assert_eq!(b.projection().current_index, 3);
        assert_eq!(change.stage, ApprovalStage::Approved);
        assert_eq!(change.advisor_id.as_deref(), Some("advisor"));

        let history = queries::get_history(&c.conn, &b.id).unwrap();
        let stages: Vec<_> = history.iter().map(|h| h.stage).collect();
        assert_eq!(
            stages,
            vec![
                ApprovalStage::PendingStaff,
                ApprovalStage::PendingAdmin,
                ApprovalStage::Approved
            ]
        );
    }

    #[test]
    fn test_staff_booking_approved_staff_only() {
        let c = campus();
        let b = book(&c.conn, &c.advisor, 10);
        assert!(b.is_staff_booking());

        let (b, _) =
            apply_action(&c.conn, &c.admin, &b.id, ApprovalAction::AdminApprove, now()).unwrap();
        assert_eq!(b.approval_stage, "APPROVED_STAFF_ONLY");
        assert_eq!(b.visibility, "STAFF_ONLY");
        assert_eq!(b.status_badge().label, "APPROVED STAFF ONLY");
    }

    #[test]
    fn test_only_assigned_advisor_reviews() {
        let c = campus();
        let b = book(&c.conn, &c.student, 9);

        let result = apply_action(&c.conn, &c.other_staff, &b.id, ApprovalAction::StaffApprove, now());
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let result = apply_action(&c.conn, &c.student, &b.id, ApprovalAction::StaffApprove, now());
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let (b, _) = apply_action(&c.conn, &c.advisor, &b.id, ApprovalAction::StaffReject, now())
            .unwrap();
        assert_eq!(b.approval_stage, "REJECTED");
        assert_eq!(b.projection().current_index, -1);
        assert!(b.projection().is_rejected);
    }

    #[test]
    fn test_wrong_stage_is_conflict() {
        let c = campus();
        let b = book(&c.conn, &c.student, 9);

        let result = apply_action(&c.conn, &c.admin, &b.id, ApprovalAction::AdminApprove, now());
        assert!(matches!(result, Err(AppError::Conflict(_))));

        apply_action(&c.conn, &c.advisor, &b.id, ApprovalAction::StaffReject, now()).unwrap();
        let result = apply_action(&c.conn, &c.advisor, &b.id, ApprovalAction::StaffApprove, now());
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let result = apply_action(&c.conn, &c.student, &b.id, ApprovalAction::Cancel, now());
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_owner_cancels_pending() {
        let c = campus();
        let b = book(&c.conn, &c.student, 9);

        let result = apply_action(&c.conn, &c.advisor, &b.id, ApprovalAction::Cancel, now());
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let (b, change) =
            apply_action(&c.conn, &c.student, &b.id, ApprovalAction::Cancel, now()).unwrap();
        assert_eq!(b.approval_stage, "CANCELLED");
        assert!(b.projection().is_cancelled);
        assert_eq!(change.changed_by.as_deref(), Some("student"));
    }

    #[test]
    fn test_unknown_booking() {
        let c = campus();
        let result = apply_action(&c.conn, &c.admin, "nope", ApprovalAction::AdminReject, now());
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_queues_and_stats() {
        let c = campus();
        let first = book(&c.conn, &c.student, 9);
        let second = book(&c.conn, &c.student, 10);
        book(&c.conn, &c.advisor, 11);

        assert_eq!(staff_pending(&c.conn, &c.advisor).unwrap().len(), 2);
        assert!(staff_pending(&c.conn, &c.other_staff).unwrap().is_empty());
        assert!(matches!(
            staff_pending(&c.conn, &c.student),
            Err(AppError::Forbidden(_))
        ));

        apply_action(&c.conn, &c.advisor, &first.id, ApprovalAction::StaffApprove, now()).unwrap();
        apply_action(&c.conn, &c.advisor, &second.id, ApprovalAction::StaffReject, now()).unwrap();

        // The advisor's own booking plus the forwarded student booking
        assert_eq!(admin_pending(&c.conn, &c.admin).unwrap().len(), 2);
        assert!(matches!(
            admin_pending(&c.conn, &c.advisor),
            Err(AppError::Forbidden(_))
        ));

        assert_eq!(staff_student_bookings(&c.conn, &c.advisor).unwrap().len(), 2);
        let stats = staff_stats(&c.conn, &c.advisor).unwrap();
        assert_eq!(
            stats,
            BookingStats {
                total_bookings: 2,
                pending_bookings: 1,
                approved_bookings: 0,
                rejected_bookings: 1,
            }
        );
    }

    fn fail_history_writes(conn: &Connection) {
        conn.execute_batch(
            "CREATE TRIGGER no_history BEFORE INSERT ON booking_status_history
             BEGIN SELECT RAISE(ABORT, 'history unavailable'); END;",
        )
        .unwrap();
    }

    #[test]
    fn test_failed_history_write_keeps_stage() {
        let c = campus();
        let b = book(&c.conn, &c.student, 9);
        fail_history_writes(&c.conn);

        let result = apply_action(&c.conn, &c.advisor, &b.id, ApprovalAction::StaffApprove, now());
        assert!(result.is_err());

        let stored = queries::get_booking_by_id(&c.conn, &b.id).unwrap().unwrap();
        assert_eq!(stored.approval_stage, ApprovalStage::PendingStaff);
        assert_eq!(stored.staff_approved_by, None);
        assert_eq!(queries::get_history(&c.conn, &b.id).unwrap().len(), 1);
    }
}
