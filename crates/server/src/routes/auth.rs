use std::net::SocketAddr;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    db::{self, models::User, Database},
    error::{is_unique_violation, AppError, Result},
    middleware::auth::{create_token, AuthUser},
    services::{
        access::Role,
        activity::{log_activity, ActivityEntry},
    },
    AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    // Accounts without a usable hash simply cannot log in
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

// Empty strings are treated as absent; a present email must look like one.
pub fn normalize_email(email: Option<&str>) -> Result<Option<String>> {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(e) if !e.contains('@') => Err(AppError::Validation("Invalid email address".to_string())),
        other => Ok(other.map(str::to_string)),
    }
}

async fn fetch_user(db: &Database, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, email, role, full_name, phone_number, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

fn issue(config: &Config, user: &User) -> Result<String> {
    create_token(
        user.id,
        &user.username,
        user.role()?,
        &config.jwt_secret,
        config.jwt_ttl_days,
    )
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(AppError::Validation("Username is required".to_string()));
    }
    check_password(&body.password)?;
    let email = normalize_email(body.email.as_deref())?;

    let password_hash = hash_password(&body.password)?;
    let now = db::now();

    // Self-service accounts are always customers
    let inserted = sqlx::query(
        "INSERT INTO users (username, password_hash, email, role, full_name, phone_number, created_at, updated_at) VALUES (?, ?, ?, 'customer', ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(&password_hash)
    .bind(&email)
    .bind(&body.full_name)
    .bind(&body.phone_number)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await;

    let user_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict(
                "Username or email already registered".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let user = fetch_user(&state.db, user_id).await?;
    log_activity(
        &state.db.pool,
        ActivityEntry {
            user_id: Some(user.id),
            ..ActivityEntry::anonymous(
                "USER_REGISTERED",
                format!("New user '{}' registered", user.username),
            )
        }
        .on("user", user.id),
    )
    .await;

    let token = issue(&state.config, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let source = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, email, role, full_name, phone_number, created_at FROM users WHERE username = ?",
    )
    .bind(body.username.trim())
    .fetch_optional(&state.db.pool)
    .await?;

    let user = match user {
        Some(user) if verify_password(&body.password, &user.password_hash) => user,
        _ => {
            log_activity(
                &state.db.pool,
                ActivityEntry {
                    ip_address: source.as_deref(),
                    ..ActivityEntry::anonymous(
                        "LOGIN_FAILED",
                        format!("Failed login attempt for username '{}'", body.username),
                    )
                },
            )
            .await;
            return Err(AppError::Unauthorized);
        }
    };

    log_activity(
        &state.db.pool,
        ActivityEntry {
            user_id: Some(user.id),
            ip_address: source.as_deref(),
            ..ActivityEntry::anonymous("USER_LOGIN", format!("User '{}' logged in", user.username))
        },
    )
    .await;

    let token = issue(&state.config, &user)?;
    Ok(Json(AuthResponse { token, user }))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<User>> {
    Ok(Json(fetch_user(&state.db, user.id).await?))
}

pub async fn bootstrap_admin(db: &Database, config: &Config) -> Result<()> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    let admins = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(&db.pool)
        .await?;
    if admins > 0 {
        return Ok(());
    }

    check_password(password)?;
    let now = db::now();
    sqlx::query(
        "INSERT INTO users (username, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hash_password(password)?)
    .bind(Role::Admin.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&db.pool)
    .await?;

    tracing::info!(username = %username, "Created bootstrap admin account");
    Ok(())
}
