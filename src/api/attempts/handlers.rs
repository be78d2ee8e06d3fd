use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::attempt::{AnswerResponse, AttemptResponse, ResultResponse, SaveAnswerRequest};
use crate::services::{attempts, results};

pub(super) async fn start_attempt(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    let attempt =
        attempts::start_attempt(state.repos(), &test_id, &user_id, primitive_now_utc()).await?;
    Ok((StatusCode::CREATED, Json(attempt.into())))
}

pub(super) async fn my_attempts(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let items = attempts::my_attempts(state.repos(), &user_id).await?;
    Ok(Json(items.into_iter().map(AttemptResponse::from).collect()))
}

pub(super) async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = attempts::get_attempt(state.repos(), &attempt_id, &user_id).await?;
    Ok(Json(attempt.into()))
}

pub(super) async fn save_answer(
    Path(attempt_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let answer = attempts::save_answer(
        state.repos(),
        &attempt_id,
        &payload.question_id,
        payload.answer,
        &user_id,
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(answer.into()))
}

pub(super) async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt =
        attempts::submit_attempt(state.repos(), &attempt_id, &user_id, primitive_now_utc())
            .await?;
    Ok(Json(attempt.into()))
}

pub(super) async fn get_result(
    Path(attempt_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let result = results::get_attempt_result(state.repos(), &attempt_id, &user_id).await?;
    Ok(Json(result.into()))
}
