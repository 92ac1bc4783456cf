use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;

use crate::errors::{AppError, AppResult};
use crate::handlers::{bearer_token, current_user};
use crate::models::{AuthResponse, UserView};
use crate::services::auth::{self, LoginRequest, RegisterRequest};
use crate::services::sessions;
use crate::state::AppState;

// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let now = Utc::now().naive_utc();
    let res = auth::register(&state, body, now).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let now = Utc::now().naive_utc();
    let res = auth::login(&state, body, now).await?;
    tracing::info!(user_id = %res.user.id, "user logged in");
    Ok(Json(res))
}

// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let closed = {
        let db = state.db()?;
        sessions::close_session(&db, &state.config.session_secret, token)?
    };
    Ok(Json(serde_json::json!({ "ok": closed })))
}

// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<UserView>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(UserView::from(&user)))
}
