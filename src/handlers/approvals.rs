use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use crate::errors::AppResult;
use crate::handlers::current_user;
use crate::models::{ApprovalAction, BookingStats, BookingView};
use crate::services::{approvals, events};
use crate::state::AppState;

async fn act(
    state: &AppState,
    headers: &HeaderMap,
    id: &str,
    action: ApprovalAction,
) -> AppResult<Json<BookingView>> {
    let user = current_user(state, headers)?;
    let now = Utc::now().naive_utc();

    let (view, change) = {
        let db = state.db()?;
        approvals::apply_action(&db, &user, id, action, now)?
    };
    events::publish(state, change);

    Ok(Json(view))
}

// PUT /api/approvals/staff/:id
pub async fn staff_approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    act(&state, &headers, &id, ApprovalAction::StaffApprove).await
}

// PUT /api/approvals/staff/:id/reject
pub async fn staff_reject(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    act(&state, &headers, &id, ApprovalAction::StaffReject).await
}

// PUT /api/approvals/admin/:id
pub async fn admin_approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    act(&state, &headers, &id, ApprovalAction::AdminApprove).await
}

// PUT /api/approvals/admin/:id/reject
pub async fn admin_reject(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    act(&state, &headers, &id, ApprovalAction::AdminReject).await
}

// GET /api/approvals/staff/pending
pub async fn staff_pending(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<BookingView>>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(approvals::staff_pending(&db, &user)?))
}

// GET /api/approvals/staff/student-bookings
pub async fn staff_student_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<BookingView>>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(approvals::staff_student_bookings(&db, &user)?))
}

// GET /api/approvals/staff/stats
pub async fn staff_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<BookingStats>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(approvals::staff_stats(&db, &user)?))
}

// GET /api/approvals/admin/pending
pub async fn admin_pending(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<BookingView>>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(approvals::admin_pending(&db, &user)?))
}
