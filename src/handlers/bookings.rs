use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::errors::AppResult;
use crate::handlers::current_user;
use crate::models::{ApprovalAction, BookingView, NewBooking, StageHistoryEntry};
use crate::services::bookings::{self, TrackerView};
use crate::services::slots::{self, TimeSlot};
use crate::services::{approvals, events};
use crate::state::AppState;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewBooking>,
) -> AppResult<(StatusCode, Json<BookingView>)> {
    let user = current_user(&state, &headers)?;
    let now = Utc::now().naive_utc();

    let (view, change) = {
        let db = state.db()?;
        bookings::create_booking(&db, &user, body, now)?
    };
    events::publish(&state, change);

    Ok((StatusCode::CREATED, Json(view)))
}

// GET /api/bookings/my
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<BookingView>>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(bookings::my_bookings(&db, &user)?))
}

// GET /api/bookings/all
pub async fn all_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<BookingView>>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(bookings::all_bookings(&db, &user)?))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(bookings::get_visible_booking(&db, &user, &id)?))
}

#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

// GET /api/bookings/slots/:resource_id?date=YYYY-MM-DD
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(resource_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> AppResult<Json<Vec<TimeSlot>>> {
    current_user(&state, &headers)?;
    let now = Utc::now().naive_utc();
    let db = state.db()?;
    Ok(Json(slots::slots(&db, &resource_id, query.date, now)?))
}

// GET /api/bookings/:id/tracker
pub async fn get_tracker(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<TrackerView>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(bookings::tracker_view(&db, &user, &id)?))
}

// GET /api/bookings/:id/history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<StageHistoryEntry>>> {
    let user = current_user(&state, &headers)?;
    let db = state.db()?;
    Ok(Json(bookings::history(&db, &user, &id)?))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    let user = current_user(&state, &headers)?;
    let now = Utc::now().naive_utc();

    let (view, change) = {
        let db = state.db()?;
        approvals::apply_action(&db, &user, &id, ApprovalAction::Cancel, now)?
    };
    events::publish(&state, change);

    Ok(Json(view))
}
