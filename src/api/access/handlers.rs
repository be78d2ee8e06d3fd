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
use crate::schemas::access::{
    AccessResponse, GroupGrantCreate, InviteCreate, InviteLinkResponse, JoinResponse,
    UserGrantCreate,
};
use crate::services::grants;

pub(super) async fn list_test_access(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AccessResponse>>, ApiError> {
    let grants = grants::list_test_access(state.repos(), &test_id, &user_id).await?;
    Ok(Json(grants.into_iter().map(AccessResponse::from).collect()))
}

pub(super) async fn grant_to_user(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<UserGrantCreate>,
) -> Result<(StatusCode, Json<AccessResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let grant = grants::grant_to_user(
        state.repos(),
        &test_id,
        &user_id,
        &payload.user_id,
        payload.expires_at,
        primitive_now_utc(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(grant.into())))
}

pub(super) async fn grant_to_group(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GroupGrantCreate>,
) -> Result<(StatusCode, Json<AccessResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let grant = grants::grant_to_group(
        state.repos(),
        &test_id,
        &user_id,
        &payload.group_id,
        payload.expires_at,
        primitive_now_utc(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(grant.into())))
}

pub(super) async fn create_invite_link(
    Path(test_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    payload: Option<Json<InviteCreate>>,
) -> Result<(StatusCode, Json<InviteLinkResponse>), ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let link = grants::create_invite_link(
        state.repos(),
        state.settings(),
        &test_id,
        &user_id,
        payload.max_uses,
        payload.expires_at,
        primitive_now_utc(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(link.into())))
}

pub(super) async fn join_by_invite(
    Path(code): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<JoinResponse>, ApiError> {
    let joined = grants::join_by_invite(state.repos(), &code, &user_id, primitive_now_utc()).await?;
    Ok(Json(joined.into()))
}

pub(super) async fn revoke(
    Path(access_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AccessResponse>, ApiError> {
    let grant = grants::revoke(state.repos(), &access_id, &user_id, primitive_now_utc()).await?;
    Ok(Json(grant.into()))
}
