mod handlers;
mod review;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::core::state::AppState;

/// Attempt and result routes nested under `/tests`.
pub(crate) fn test_router() -> Router<AppState> {
    Router::new()
        .route(
            "/:test_id/attempts",
            post(handlers::start_attempt).get(review::list_test_attempts),
        )
        .route("/:test_id/results", get(review::test_results))
        .route("/:test_id/pending-review", get(review::pending_review))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/mine", get(handlers::my_attempts))
        .route("/:attempt_id", get(handlers::get_attempt))
        .route("/:attempt_id/answers", put(handlers::save_answer))
        .route("/:attempt_id/submit", post(handlers::submit_attempt))
        .route("/:attempt_id/result", get(handlers::get_result))
        .route("/:attempt_id/answers/:question_id/grade", post(review::grade_answer))
}

#[cfg(test)]
mod tests;
