mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::core::state::AppState;

/// Grant management nested under `/tests`.
pub(crate) fn test_router() -> Router<AppState> {
    Router::new()
        .route("/:test_id/access", get(handlers::list_test_access))
        .route("/:test_id/access/users", post(handlers::grant_to_user))
        .route("/:test_id/access/groups", post(handlers::grant_to_group))
        .route("/:test_id/access/invites", post(handlers::create_invite_link))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:access_id", delete(handlers::revoke))
}

pub(crate) fn invite_router() -> Router<AppState> {
    Router::new().route("/:code/join", post(handlers::join_by_invite))
}

#[cfg(test)]
mod tests;
