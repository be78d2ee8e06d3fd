use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::schemas::test::{QuestionCreate, QuestionResponse};
use crate::services::questions;

// Only owners reach these handlers, so answer keys are always included.

pub(super) async fn add_question(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let question =
        questions::add_question(state.repos(), &test_id, &user_id, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(QuestionResponse::from_question(question, true))))
}

pub(super) async fn list_questions(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let items = questions::list_questions(state.repos(), &test_id, &user_id).await?;
    Ok(Json(
        items.into_iter().map(|question| QuestionResponse::from_question(question, true)).collect(),
    ))
}

pub(super) async fn update_question(
    Path((test_id, question_id)): Path<(String, String)>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<QuestionCreate>,
) -> Result<Json<QuestionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let question =
        questions::update_question(state.repos(), &test_id, &question_id, &user_id, payload.into())
            .await?;
    Ok(Json(QuestionResponse::from_question(question, true)))
}

pub(super) async fn delete_question(
    Path((test_id, question_id)): Path<(String, String)>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    questions::delete_question(state.repos(), &test_id, &question_id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
