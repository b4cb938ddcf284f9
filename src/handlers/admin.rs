// src/handlers/admin.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::page_window,
        user::{SetDailyLimitRequest, SetPremiumRequest, USER_COLUMNS, User, UserListParams},
    },
    services::quota,
};

/// Lists users, newest first.
/// Admin only.
pub async fn list_users(
    State(pool): State<PgPool>,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    let (page, limit, offset) = page_window(params.page, params.limit);

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE deleted = FALSE ORDER BY id DESC LIMIT $1 OFFSET $2",
        USER_COLUMNS
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE deleted = FALSE")
        .fetch_one(&pool)
        .await?;

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "total": total,
        "users": users
    })))
}

/// Grants or revokes premium access, which lifts the daily question quota.
/// Admin only.
pub async fn set_premium(
    State(pool): State<PgPool>,
    Extension(admin): Extension<User>,
    Path(id): Path<i64>,
    Json(payload): Json<SetPremiumRequest>,
) -> Result<impl IntoResponse, AppError> {
    let expiry = if payload.is_premium {
        payload.premium_expiry
    } else {
        None
    };

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET is_premium = $1, premium_expiry = $2, updated_at = NOW() \
         WHERE id = $3 AND deleted = FALSE RETURNING {}",
        USER_COLUMNS
    ))
    .bind(payload.is_premium)
    .bind(expiry)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(
        admin_id = admin.id,
        user_id = id,
        is_premium = payload.is_premium,
        "Premium status changed"
    );

    Ok(Json(user))
}

/// Overrides a user's daily question limit for today.
/// Admin only.
pub async fn set_daily_limit(
    State(pool): State<PgPool>,
    Extension(admin): Extension<User>,
    Path(id): Path<i64>,
    Json(payload): Json<SetDailyLimitRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1 AND deleted = FALSE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    quota::set_daily_limit(&mut tx, id, payload.questions_limit).await?;
    tx.commit().await?;

    tracing::info!(
        admin_id = admin.id,
        user_id = id,
        questions_limit = payload.questions_limit,
        "Daily question limit overridden"
    );

    Ok(Json(json!({
        "user_id": id,
        "questions_limit": payload.questions_limit
    })))
}
