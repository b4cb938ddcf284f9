// src/handlers/explanation.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        explanation::{SaveExplanationRequest, SavedExplanation, UpdateExplanationRequest},
        user::User,
    },
    utils::html::clean_html,
};

const SAVED_EXPLANATION_SELECT: &str = r#"
    SELECT se.question_id, q.question, q.question_type, q.options, q.correct_options,
           se.explanation, se.created_at, se.updated_at
    FROM saved_explanations se
    JOIN questions q ON q.id = se.question_id
"#;

/// Sanitised explanation text; markup that cleans down to nothing is rejected.
fn clean_explanation(raw: &str) -> Result<String, AppError> {
    let cleaned = clean_html(raw.trim());
    if cleaned.trim().is_empty() {
        return Err(AppError::BadRequest("Explanation must not be empty".to_string()));
    }
    Ok(cleaned)
}

async fn fetch_saved(pool: &PgPool, user_id: i64, question_id: i64) -> Result<SavedExplanation, AppError> {
    sqlx::query_as::<_, SavedExplanation>(&format!(
        "{} WHERE se.user_id = $1 AND se.question_id = $2",
        SAVED_EXPLANATION_SELECT
    ))
    .bind(user_id)
    .bind(question_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Saved explanation not found".to_string()))
}

/// Saves the caller's explanation for a question, replacing any earlier one.
pub async fn save_explanation(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Json(payload): Json<SaveExplanationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let explanation = clean_explanation(&payload.explanation)?;

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM questions WHERE id = $1 AND deleted = FALSE",
    )
    .bind(payload.question_id)
    .fetch_optional(&pool)
    .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO saved_explanations (user_id, question_id, explanation)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, question_id)
        DO UPDATE SET explanation = EXCLUDED.explanation, updated_at = NOW()
        "#,
    )
    .bind(user.id)
    .bind(payload.question_id)
    .bind(explanation)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to save explanation: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(user_id = user.id, question_id = payload.question_id, "Explanation saved");

    Ok(Json(fetch_saved(&pool, user.id, payload.question_id).await?))
}

/// Edits an explanation the caller saved earlier.
pub async fn update_explanation(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
    Json(payload): Json<UpdateExplanationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let explanation = clean_explanation(&payload.explanation)?;

    let result = sqlx::query(
        "UPDATE saved_explanations SET explanation = $1, updated_at = NOW() \
         WHERE user_id = $2 AND question_id = $3",
    )
    .bind(explanation)
    .bind(user.id)
    .bind(question_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Saved explanation not found".to_string()));
    }

    Ok(Json(fetch_saved(&pool, user.id, question_id).await?))
}

pub async fn remove_explanation(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result =
        sqlx::query("DELETE FROM saved_explanations WHERE user_id = $1 AND question_id = $2")
            .bind(user.id)
            .bind(question_id)
            .execute(&pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Saved explanation not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// The caller's saved explanations, most recently edited first.
pub async fn list_explanations(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    let saved = sqlx::query_as::<_, SavedExplanation>(&format!(
        "{} WHERE se.user_id = $1 AND q.deleted = FALSE ORDER BY se.updated_at DESC, se.question_id DESC",
        SAVED_EXPLANATION_SELECT
    ))
    .bind(user.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(saved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_explanation_strips_scripts() {
        assert_eq!(
            clean_explanation("  <b>Sum</b> of angles<script>x()</script> ").unwrap(),
            "<b>Sum</b> of angles"
        );
    }

    #[test]
    fn test_clean_explanation_rejects_markup_only() {
        let err = clean_explanation("<script>alert(1)</script>").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
