// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{
        ActivityOverview, ChangePasswordRequest, LoginRequest, MeResponse, RegisterRequest,
        USER_COLUMNS, UpdateProfileRequest, User,
    },
    services::quota::{self, QuotaGate},
    utils::{
        hash::{ensure_password, hash_password},
        html::clean_optional,
        jwt::sign_jwt,
    },
};

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (name, email, password) VALUES ($1, $2, $3) RETURNING {}",
        USER_COLUMNS
    ))
    .bind(payload.name.trim())
    .bind(&email)
    .bind(hashed_password)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        // Postgres error code for unique violation is 23505
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Email '{}' is already registered", email))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    tracing::info!(user_id = user.id, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// Unknown emails and wrong passwords produce the same error.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE email = $1 AND deleted = FALSE",
        USER_COLUMNS
    ))
    .bind(payload.email.trim().to_lowercase())
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

    ensure_password(&payload.password, &user.password)?;

    let token = sign_jwt(
        user.id,
        &user.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": user
    })))
}

/// Current user's profile together with today's activity.
pub async fn me(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let gate = QuotaGate::new(config.daily_question_limit);
    let usage = gate.usage(&mut conn, user.id).await?;
    let tests_completed_today = quota::tests_completed_today(&mut conn, user.id).await?;

    let activity = ActivityOverview {
        questions_answered_today: usage.answered_today,
        daily_question_limit: usage.limit,
        tests_completed_today,
        premium: user.has_active_premium(Utc::now()),
    };

    Ok(Json(MeResponse { user, activity }))
}

/// Edits the caller's name and about text.
pub async fn update_me(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(user.name.as_str())
        .to_string();
    let about = match payload.about.as_deref() {
        Some(about) => clean_optional(Some(about)),
        None => user.about.clone(),
    };

    let updated = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET name = $1, about = $2, updated_at = NOW() WHERE id = $3 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(name)
    .bind(about)
    .bind(user.id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(updated))
}

/// Replaces the caller's password. Tokens issued before now stop working.
pub async fn change_password(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_password(&payload.current_password, &user.password)?;

    let hashed = hash_password(&payload.new_password)?;
    sqlx::query(
        "UPDATE users SET password = $1, password_changed_at = NOW(), updated_at = NOW() WHERE id = $2",
    )
    .bind(hashed)
    .bind(user.id)
    .execute(&pool)
    .await?;

    tracing::info!(user_id = user.id, "Password changed");

    Ok(Json(json!({ "message": "Password updated, please log in again" })))
}
