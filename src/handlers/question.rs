// src/handlers/question.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::AppError,
    handlers::tags::{normalize_tags, tag_question},
    models::{
        question::{
            CreateQuestionRequest, OneOrMany, QUESTION_SELECT, Question, QuestionListParams,
            page_window, split_tags,
        },
        user::User,
    },
    utils::{
        html::{clean_html, clean_optional},
        permissions::ensure_can_manage,
    },
};

/// Creates one question, or a batch of them in a single transaction.
///
/// Prompts and explanations are sanitised before storage.
pub async fn create_questions(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Json(payload): Json<OneOrMany<CreateQuestionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let questions = payload.into_vec();
    if questions.is_empty() {
        return Err(AppError::BadRequest("No questions supplied".to_string()));
    }
    if questions.len() > 200 {
        return Err(AppError::BadRequest(
            "At most 200 questions per request".to_string(),
        ));
    }
    for (i, q) in questions.iter().enumerate() {
        q.check()
            .map_err(|e| AppError::BadRequest(format!("Question #{}: {}", i + 1, message(e))))?;
    }

    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(questions.len());

    for q in &questions {
        let options: Vec<String> = q.options.iter().map(|o| clean_html(o)).collect();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO questions
            (question, subject, exam, language, difficulty, question_type,
             options, correct_options, explanation, created_by_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(clean_html(&q.question))
        .bind(q.subject.trim())
        .bind(q.exam.as_deref().map(str::trim))
        .bind(q.language.trim())
        .bind(q.difficulty)
        .bind(q.question_type.as_str())
        .bind(options)
        .bind(&q.correct_options)
        .bind(clean_optional(q.explanation.as_deref()))
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        tag_question(&mut tx, id, &q.tags).await?;
        ids.push(id);
    }

    tx.commit().await?;

    tracing::info!(user_id = user.id, count = ids.len(), "Questions created");

    Ok((StatusCode::CREATED, Json(json!({ "questions": ids }))))
}

fn message(error: AppError) -> String {
    match error {
        AppError::BadRequest(msg) => msg,
        other => other.to_string(),
    }
}

/// Lists questions with optional filters.
///
/// `tags` matches questions carrying any of the given tags.
pub async fn list_questions(
    State(pool): State<PgPool>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let (page, limit, offset) = page_window(params.page, params.limit);

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(QUESTION_SELECT);
    builder.push(" WHERE q.deleted = FALSE");

    if let Some(subject) = params.subject.filter(|s| !s.is_empty()) {
        builder.push(" AND q.subject = ").push_bind(subject);
    }
    if let Some(exam) = params.exam.filter(|s| !s.is_empty()) {
        builder.push(" AND q.exam = ").push_bind(exam);
    }
    if let Some(language) = params.language.filter(|s| !s.is_empty()) {
        builder.push(" AND q.language = ").push_bind(language);
    }

    let tags = normalize_tags(&split_tags(params.tags.as_deref()));
    if !tags.is_empty() {
        builder.push(
            " AND EXISTS (SELECT 1 FROM question_tags qt JOIN tags t ON t.id = qt.tag_id \
             WHERE qt.question_id = q.id AND t.name = ANY(",
        );
        builder.push_bind(tags);
        builder.push("))");
    }

    let direction = match params.sort.as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };
    builder.push(format!(" ORDER BY q.created_at {}, q.id {}", direction, direction));
    builder.push(" LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(offset);

    let questions = builder
        .build_query_as::<Question>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list questions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "count": questions.len(),
        "questions": questions
    })))
}

/// Get a single question with its tags.
pub async fn get_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = sqlx::query_as::<_, Question>(&format!(
        "{} WHERE q.id = $1 AND q.deleted = FALSE",
        QUESTION_SELECT
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Soft-deletes a question. Sessions that already froze it keep working.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let owner_id = sqlx::query_scalar::<_, i64>(
        "SELECT created_by_id FROM questions WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    ensure_can_manage(&user, owner_id, "question")?;

    sqlx::query("UPDATE questions SET deleted = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    tracing::info!(question_id = id, user_id = user.id, "Question deleted");

    Ok(StatusCode::NO_CONTENT)
}
