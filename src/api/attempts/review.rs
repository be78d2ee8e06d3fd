use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::attempt::{
    AttemptResponse, GradeRequest, PendingAnswerResponse, ResultSummaryResponse,
};
use crate::services::{attempts, grading, results};

pub(super) async fn list_test_attempts(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let items = attempts::test_attempts(state.repos(), &test_id, &user_id).await?;
    Ok(Json(items.into_iter().map(AttemptResponse::from).collect()))
}

pub(super) async fn test_results(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ResultSummaryResponse>>, ApiError> {
    let rows = results::test_results(state.repos(), &test_id, &user_id).await?;
    Ok(Json(rows.into_iter().map(ResultSummaryResponse::from).collect()))
}

pub(super) async fn pending_review(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingAnswerResponse>>, ApiError> {
    let pending = grading::pending_review(state.repos(), &test_id, &user_id).await?;
    Ok(Json(pending.into_iter().map(PendingAnswerResponse::from).collect()))
}

pub(super) async fn grade_answer(
    Path((attempt_id, question_id)): Path<(String, String)>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradeRequest>,
) -> Result<Json<AttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = grading::grade_answer(
        state.repos(),
        &attempt_id,
        &question_id,
        payload.points,
        payload.feedback,
        &user_id,
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(attempt.into()))
}
