// src/handlers/bookmark.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{bookmark::BookmarkedQuestion, user::User},
};

/// Bookmark a question. Bookmarking twice is a no-op.
pub async fn add_bookmark(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM questions WHERE id = $1 AND deleted = FALSE",
    )
    .bind(question_id)
    .fetch_optional(&pool)
    .await?;

    if exists.is_none() {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    sqlx::query(
        "INSERT INTO bookmarked_questions (user_id, question_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user.id)
    .bind(question_id)
    .execute(&pool)
    .await?;

    Ok(StatusCode::CREATED)
}

pub async fn remove_bookmark(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result =
        sqlx::query("DELETE FROM bookmarked_questions WHERE user_id = $1 AND question_id = $2")
            .bind(user.id)
            .bind(question_id)
            .execute(&pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Bookmark not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// The caller's bookmarks, newest first.
pub async fn list_bookmarks(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    let bookmarks = sqlx::query_as::<_, BookmarkedQuestion>(
        r#"
        SELECT b.question_id, q.question, q.subject, q.question_type, b.bookmarked_at
        FROM bookmarked_questions b
        JOIN questions q ON q.id = b.question_id
        WHERE b.user_id = $1 AND q.deleted = FALSE
        ORDER BY b.bookmarked_at DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(bookmarks))
}
