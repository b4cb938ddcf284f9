// src/handlers/test_session.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        test_session::{CreateSessionRequest, HistoryParams, UpdateSessionRequest},
        user::User,
    },
    services::test_session::TestSessionService,
};

/// Starts a new test session on a question set.
///
/// The set's correct answers are frozen into the session, so later edits
/// to a question never change the scoring of this attempt.
pub async fn create_test_session(
    State(service): State<TestSessionService>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = service.create(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Full session state, ordered by position.
pub async fn get_test_session(
    State(service): State<TestSessionService>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.get(&user, id).await?))
}

/// Saves answers and the cursor position.
///
/// Returns 200 with `status: finished` when the session was already closed.
pub async fn update_test_session(
    State(service): State<TestSessionService>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.update(&user, id, payload).await?))
}

pub async fn finish_test_session(
    State(service): State<TestSessionService>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.finish(&user, id).await?))
}

/// The caller's past sessions, newest first.
pub async fn test_history(
    State(service): State<TestSessionService>,
    Extension(user): Extension<User>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.history(&user, params).await?))
}
