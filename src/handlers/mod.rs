pub mod approvals;
pub mod auth;
pub mod bookings;
pub mod events;
pub mod health;
pub mod policy;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use tower_http::trace::TraceLayer;

use crate::errors::{AppError, AppResult};
use crate::models::User;
use crate::services::sessions;
use crate::state::AppState;

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the caller from an `Authorization: Bearer` header.
pub fn current_user(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    user_for_token(state, token)
}

pub fn user_for_token(state: &AppState, token: &str) -> AppResult<User> {
    let now = Utc::now().naive_utc();
    let db = state.db()?;
    let (_, user) = sessions::authenticate(&db, &state.config.session_secret, token, &now)?;
    Ok(user)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/my", get(bookings::my_bookings))
        .route("/api/bookings/all", get(bookings::all_bookings))
        .route("/api/bookings/events", get(events::stage_events))
        .route("/api/bookings/slots/:resource_id", get(bookings::get_slots))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/tracker", get(bookings::get_tracker))
        .route("/api/bookings/:id/history", get(bookings::get_history))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/api/approvals/staff/pending", get(approvals::staff_pending))
        .route(
            "/api/approvals/staff/student-bookings",
            get(approvals::staff_student_bookings),
        )
        .route("/api/approvals/staff/stats", get(approvals::staff_stats))
        .route("/api/approvals/staff/:id", put(approvals::staff_approve))
        .route("/api/approvals/staff/:id/reject", put(approvals::staff_reject))
        .route("/api/approvals/admin/pending", get(approvals::admin_pending))
        .route("/api/approvals/admin/:id", put(approvals::admin_approve))
        .route("/api/approvals/admin/:id/reject", put(approvals::admin_reject))
        .route("/api/policy/remaining", get(policy::remaining))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
