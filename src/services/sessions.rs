use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::Connection;
use sha1::Sha1;
use tokio::task::JoinHandle;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{Session, User};
use crate::state::AppState;

const SESSION_ID_LEN: usize = 32;

fn signature(secret: &str, session_id: &str) -> Option<Hmac<Sha1>> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(session_id.as_bytes());
    Some(mac)
}

/// Bearer token handed to clients: `<session id>.<base64 hmac>`.
pub fn sign_token(secret: &str, session_id: &str) -> AppResult<String> {
    let mac = signature(secret, session_id)
        .ok_or_else(|| AppError::Config("session secret cannot key HMAC".to_string()))?;
    let sig = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{session_id}.{sig}"))
}

/// Returns the session id when the signature checks out.
pub fn verify_token<'a>(secret: &str, token: &'a str) -> Option<&'a str> {
    let (session_id, sig) = token.split_once('.')?;
    let sig = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(sig)
        .ok()?;
    signature(secret, session_id)?.verify_slice(&sig).ok()?;
    Some(session_id)
}

pub fn new_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

/// Creates a session for `user_id` and returns it with its signed token.
pub fn open_session(
    conn: &Connection,
    secret: &str,
    user_id: &str,
    ttl_hours: i64,
    now: NaiveDateTime,
) -> AppResult<(Session, String)> {
    let session = Session {
        id: new_session_id(),
        user_id: user_id.to_string(),
        created_at: now,
        expires_at: now + chrono::Duration::hours(ttl_hours),
    };
    queries::insert_session(conn, &session)?;
    let token = sign_token(secret, &session.id)?;
    Ok((session, token))
}

/// Resolves a bearer token to its user. Forged, unknown and expired tokens
/// are all `Unauthorized`.
pub fn authenticate(
    conn: &Connection,
    secret: &str,
    token: &str,
    now: &NaiveDateTime,
) -> AppResult<(Session, User)> {
    let Some(session_id) = verify_token(secret, token) else {
        tracing::warn!("rejected session token with bad signature");
        return Err(AppError::Unauthorized);
    };

    let session = queries::get_live_session(conn, session_id, now)?.ok_or(AppError::Unauthorized)?;
    let user = queries::get_user_by_id(conn, &session.user_id)?.ok_or(AppError::Unauthorized)?;
    Ok((session, user))
}

pub fn close_session(conn: &Connection, secret: &str, token: &str) -> AppResult<bool> {
    let session_id = verify_token(secret, token).ok_or(AppError::Unauthorized)?;
    Ok(queries::delete_session(conn, session_id)?)
}

/// Periodically deletes expired sessions. Abort the handle to stop it.
pub fn spawn_session_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.session_sweep_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let now = Utc::now().naive_utc();
            let result = state
                .db()
                .and_then(|db| Ok(queries::expire_old_sessions(&db, &now)?));
            match result {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "expired sessions removed"),
                Err(e) => tracing::error!(error = %e, "session sweep failed"),
            }
        }
    })
}
