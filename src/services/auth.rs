use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::NaiveDateTime;
use rand::rngs::OsRng;
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{AuthResponse, Role, User, UserView};
use crate::services::sessions;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub advisor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(user: &User, password: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("invalid password hash for {}", user.id)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Argon2 is slow on purpose, so it runs on the blocking pool.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password task failed: {e}")))?
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A sign-up whose fields passed the checks that need no storage.
#[derive(Debug)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub advisor_id: Option<String>,
}

impl RegisterRequest {
    /// Splits the request into its checked fields and the plain password.
    pub fn validate(self) -> AppResult<(Registration, String)> {
        let name = self.name.trim().to_string();
        let email = normalize_email(&self.email);

        if name.is_empty() || email.is_empty() {
            return Err(AppError::Validation("name and email are required".to_string()));
        }
        if !email.contains('@') {
            return Err(AppError::Validation("email is not valid".to_string()));
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.role == Role::Admin {
            return Err(AppError::Forbidden("admin accounts cannot self-register".to_string()));
        }

        let registration = Registration {
            name,
            email,
            role: self.role,
            advisor_id: self.advisor_id.filter(|id| !id.is_empty()),
        };
        Ok((registration, self.password))
    }
}

/// Stores a checked sign-up whose password is already hashed.
pub fn create_account(
    conn: &Connection,
    reg: Registration,
    password_hash: String,
    now: NaiveDateTime,
) -> AppResult<User> {
    let advisor_id = match (reg.role, reg.advisor_id) {
        (Role::Student, Some(advisor_id)) => {
            let advisor = queries::get_user_by_id(conn, &advisor_id)?
                .ok_or_else(|| AppError::Validation("advisor not found".to_string()))?;
            if advisor.role != Role::Staff {
                return Err(AppError::Validation("advisor must be a staff member".to_string()));
            }
            Some(advisor_id)
        }
        _ => None,
    };

    if queries::get_user_by_email(conn, &reg.email)?.is_some() {
        return Err(AppError::Conflict("email already registered".to_string()));
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: reg.name,
        email: reg.email,
        password_hash,
        role: reg.role,
        advisor_id,
        created_at: now,
    };
    queries::insert_user(conn, &user)?;
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user registered");
    Ok(user)
}

/// Self-service sign-up for students and staff. Admins are only ever seeded
/// from configuration. The database is not locked while hashing.
pub async fn register(
    state: &AppState,
    req: RegisterRequest,
    now: NaiveDateTime,
) -> AppResult<AuthResponse> {
    let (reg, password) = req.validate()?;
    let password_hash = blocking(move || hash_password(&password)).await?;

    let db = state.db()?;
    let user = create_account(&db, reg, password_hash, now)?;
    issue(&db, &state.config, &user, now)
}

/// Checks the credentials with the database unlocked, then opens a session.
pub async fn login(state: &AppState, req: LoginRequest, now: NaiveDateTime) -> AppResult<AuthResponse> {
    let email = normalize_email(&req.email);
    let user = {
        let db = state.db()?;
        queries::get_user_by_email(&db, &email)?.ok_or(AppError::Unauthorized)?
    };

    let (user, matches) = blocking(move || {
        let matches = verify_password(&user, &req.password)?;
        Ok((user, matches))
    })
    .await?;
    if !matches {
        tracing::warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::Unauthorized);
    }

    let db = state.db()?;
    issue(&db, &state.config, &user, now)
}

fn issue(
    conn: &Connection,
    config: &AppConfig,
    user: &User,
    now: NaiveDateTime,
) -> AppResult<AuthResponse> {
    let (session, token) = sessions::open_session(
        conn,
        &config.session_secret,
        &user.id,
        config.session_ttl_hours,
        now,
    )?;
    Ok(AuthResponse {
        token,
        user: UserView::from(user),
        expires_at: session.expires_at,
    })
}

/// Creates the configured admin account once; later starts leave it alone.
pub fn seed_admin(conn: &Connection, config: &AppConfig, now: NaiveDateTime) -> AppResult<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    let email = normalize_email(email);
    if queries::get_user_by_email(conn, &email)?.is_some() {
        return Ok(());
    }

    let admin = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: config.admin_name.clone(),
        email,
        password_hash: hash_password(password)?,
        role: Role::Admin,
        advisor_id: None,
        created_at: now,
    };
    queries::insert_user(conn, &admin)?;
    tracing::info!(user_id = %admin.id, "seeded admin account");
    Ok(())
}
