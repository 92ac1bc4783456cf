use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use crate::errors::AppResult;
use crate::handlers::current_user;
use crate::models::PolicyRemaining;
use crate::services::policy;
use crate::state::AppState;

// GET /api/policy/remaining
pub async fn remaining(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<PolicyRemaining>> {
    let user = current_user(&state, &headers)?;
    let today = Utc::now().date_naive();
    let db = state.db()?;
    Ok(Json(policy::remaining_for_user(&db, &user, today)?))
}
