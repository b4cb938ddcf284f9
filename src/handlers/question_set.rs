// src/handlers/question_set.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::{
    error::AppError,
    handlers::tags::{normalize_tags, retag_question_set},
    models::{
        question::{page_window, split_tags},
        question_set::{
            Pagination, QUESTION_SET_SELECT, QuestionSet, QuestionSetDetail, QuestionSetEntry,
            QuestionSetListParams, QuestionSetPage, QuestionSetRequest,
        },
        user::User,
    },
    utils::{html::clean_optional, permissions::ensure_can_manage},
};

/// Every id must name a live question.
async fn ensure_questions_exist(conn: &mut PgConnection, ids: &[i64]) -> Result<(), AppError> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM questions WHERE id = ANY($1) AND deleted = FALSE",
    )
    .bind(ids)
    .fetch_one(conn)
    .await?;

    if found != ids.len() as i64 {
        return Err(AppError::BadRequest(
            "Some question ids do not exist or were deleted".to_string(),
        ));
    }
    Ok(())
}

async fn insert_entries(
    conn: &mut PgConnection,
    question_set_id: i64,
    req: &QuestionSetRequest,
) -> Result<(), AppError> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO question_set_questions (question_set_id, question_id, mark, position) ",
    );
    builder.push_values(req.weighted_questions(), |mut row, (question_id, mark, position)| {
        row.push_bind(question_set_id)
            .push_bind(question_id)
            .push_bind(mark)
            .push_bind(position);
    });
    builder.build().execute(conn).await?;
    Ok(())
}

/// Owner of a live question set.
async fn set_owner(pool: &PgPool, id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT created_by_id FROM question_sets WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Question set not found".to_string()))
}

/// Creates a question set with its ordered, weighted questions and tags.
pub async fn create_question_set(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Json(payload): Json<QuestionSetRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.check()?;

    let mut tx = pool.begin().await?;
    ensure_questions_exist(&mut tx, &payload.question_ids).await?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO question_sets
        (name, mode, subject, exam, language, time_duration, description,
         associated_resource, cover_image, created_by_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.mode)
    .bind(payload.subject.trim())
    .bind(payload.exam.as_deref().map(str::trim))
    .bind(payload.language.trim())
    .bind(payload.time_duration)
    .bind(clean_optional(payload.description.as_deref()))
    .bind(&payload.associated_resource)
    .bind(&payload.cover_image)
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question set: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    insert_entries(&mut tx, id, &payload).await?;
    retag_question_set(&mut tx, id, &payload.tags).await?;

    tx.commit().await?;

    tracing::info!(question_set_id = id, user_id = user.id, "Question set created");

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    params: &QuestionSetListParams,
    tags: &[String],
) {
    if let Some(subject) = params.subject.as_ref().filter(|s| !s.is_empty()) {
        builder.push(" AND qs.subject = ").push_bind(subject.clone());
    }
    if let Some(exam) = params.exam.as_ref().filter(|s| !s.is_empty()) {
        builder.push(" AND qs.exam = ").push_bind(exam.clone());
    }
    if let Some(language) = params.language.as_ref().filter(|s| !s.is_empty()) {
        builder.push(" AND qs.language = ").push_bind(language.clone());
    }
    if let Some(created_by) = params.created_by {
        builder.push(" AND qs.created_by_id = ").push_bind(created_by);
    }
    if let Some(search) = params.search.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        builder
            .push(" AND (qs.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR qs.subject ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR qs.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if !tags.is_empty() {
        // All requested tags must be present.
        builder
            .push(
                " AND (SELECT COUNT(DISTINCT t.name) FROM question_set_tags qst \
                 JOIN tags t ON t.id = qst.tag_id \
                 WHERE qst.question_set_id = qs.id AND t.name = ANY(",
            )
            .push_bind(tags.to_vec())
            .push(")) = ")
            .push_bind(tags.len() as i64);
    }
}

/// Lists question sets, newest first, with pagination metadata.
pub async fn list_question_sets(
    State(pool): State<PgPool>,
    Query(params): Query<QuestionSetListParams>,
) -> Result<impl IntoResponse, AppError> {
    let (page, limit, offset) = page_window(params.page, params.limit);
    let tags = normalize_tags(&split_tags(params.tags.as_deref()));

    let mut count_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM question_sets qs WHERE qs.deleted = FALSE");
    push_filters(&mut count_builder, &params, &tags);
    let total = count_builder
        .build_query_scalar::<i64>()
        .fetch_one(&pool)
        .await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(QUESTION_SET_SELECT);
    builder.push(" WHERE qs.deleted = FALSE");
    push_filters(&mut builder, &params, &tags);
    builder.push(" ORDER BY qs.created_at DESC, qs.id DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let data = builder
        .build_query_as::<QuestionSet>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list question sets: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(QuestionSetPage {
        data,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// Get one question set with its questions in order.
pub async fn get_question_set(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let set = sqlx::query_as::<_, QuestionSet>(&format!(
        "{} WHERE qs.id = $1 AND qs.deleted = FALSE",
        QUESTION_SET_SELECT
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Question set not found".to_string()))?;

    let questions = sqlx::query_as::<_, QuestionSetEntry>(
        r#"
        SELECT question_id, mark, position
        FROM question_set_questions
        WHERE question_set_id = $1
        ORDER BY position ASC, question_id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let test_sessions_taken = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM test_sessions WHERE question_set_id = $1",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(QuestionSetDetail {
        set,
        questions,
        test_sessions_taken,
    }))
}

/// Replaces a question set's metadata, questions and tags.
/// Creator or admin only.
pub async fn update_question_set(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(payload): Json<QuestionSetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let owner_id = set_owner(&pool, id).await?;
    ensure_can_manage(&user, owner_id, "question set")?;
    payload.check()?;

    let mut tx = pool.begin().await?;
    ensure_questions_exist(&mut tx, &payload.question_ids).await?;

    sqlx::query(
        r#"
        UPDATE question_sets
        SET name = $1, mode = $2, subject = $3, exam = $4, language = $5,
            time_duration = $6, description = $7, associated_resource = $8,
            cover_image = $9, updated_at = NOW()
        WHERE id = $10
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.mode)
    .bind(payload.subject.trim())
    .bind(payload.exam.as_deref().map(str::trim))
    .bind(payload.language.trim())
    .bind(payload.time_duration)
    .bind(clean_optional(payload.description.as_deref()))
    .bind(&payload.associated_resource)
    .bind(&payload.cover_image)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM question_set_questions WHERE question_set_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    insert_entries(&mut tx, id, &payload).await?;
    retag_question_set(&mut tx, id, &payload.tags).await?;

    tx.commit().await?;

    tracing::info!(question_set_id = id, user_id = user.id, "Question set updated");

    Ok(Json(json!({ "id": id })))
}

/// Soft-deletes a question set. Past sessions stay readable.
pub async fn delete_question_set(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let owner_id = set_owner(&pool, id).await?;
    ensure_can_manage(&user, owner_id, "question set")?;

    sqlx::query("UPDATE question_sets SET deleted = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    tracing::info!(question_set_id = id, user_id = user.id, "Question set deleted");

    Ok(StatusCode::NO_CONTENT)
}
