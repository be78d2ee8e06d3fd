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
use crate::schemas::test::{
    AccessTypeUpdate, AvailabilityUpdate, SettingsUpdate, TestCreate, TestDetailsResponse,
    TestResponse, TestUpdate,
};
use crate::services::test_lifecycle;

pub(super) async fn create_test(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<TestCreate>,
) -> Result<(StatusCode, Json<TestResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let test = test_lifecycle::create_test(
        state.repos(),
        &user_id,
        &payload.title,
        &payload.description,
        primitive_now_utc(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(test.into())))
}

pub(super) async fn list_my_tests(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<TestResponse>>, ApiError> {
    let tests = test_lifecycle::list_my_tests(state.repos(), &user_id).await?;
    Ok(Json(tests.into_iter().map(TestResponse::from).collect()))
}

pub(super) async fn get_test(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<TestDetailsResponse>, ApiError> {
    let details =
        test_lifecycle::get_test(state.repos(), &test_id, &user_id, primitive_now_utc()).await?;
    Ok(Json(details.into()))
}

pub(super) async fn update_test(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<TestUpdate>,
) -> Result<Json<TestResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let test = test_lifecycle::update_test(
        state.repos(),
        &test_id,
        &user_id,
        payload.into(),
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(test.into()))
}

pub(super) async fn update_settings(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SettingsUpdate>,
) -> Result<Json<TestResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let test = test_lifecycle::update_settings(
        state.repos(),
        &test_id,
        &user_id,
        payload.into(),
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(test.into()))
}

pub(super) async fn publish_test(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<TestResponse>, ApiError> {
    let test =
        test_lifecycle::publish_test(state.repos(), &test_id, &user_id, primitive_now_utc())
            .await?;
    Ok(Json(test.into()))
}

pub(super) async fn unpublish_test(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<TestResponse>, ApiError> {
    let test =
        test_lifecycle::unpublish_test(state.repos(), &test_id, &user_id, primitive_now_utc())
            .await?;
    Ok(Json(test.into()))
}

pub(super) async fn set_access_type(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AccessTypeUpdate>,
) -> Result<Json<TestResponse>, ApiError> {
    let test = test_lifecycle::set_access_type(
        state.repos(),
        &test_id,
        &user_id,
        payload.access_type,
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(test.into()))
}

pub(super) async fn set_availability(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AvailabilityUpdate>,
) -> Result<Json<TestResponse>, ApiError> {
    let test = test_lifecycle::set_availability(
        state.repos(),
        &test_id,
        &user_id,
        payload.available_from,
        payload.available_until,
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(test.into()))
}

pub(super) async fn delete_test(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    test_lifecycle::delete_test(state.repos(), &test_id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
