mod handlers;
mod questions;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_test).get(handlers::list_my_tests))
        .route(
            "/:test_id",
            get(handlers::get_test).patch(handlers::update_test).delete(handlers::delete_test),
        )
        .route("/:test_id/settings", patch(handlers::update_settings))
        .route("/:test_id/publish", post(handlers::publish_test))
        .route("/:test_id/unpublish", post(handlers::unpublish_test))
        .route("/:test_id/access-type", put(handlers::set_access_type))
        .route("/:test_id/availability", put(handlers::set_availability))
        .route("/:test_id/questions", post(questions::add_question).get(questions::list_questions))
        .route(
            "/:test_id/questions/:question_id",
            put(questions::update_question).delete(questions::delete_question),
        )
}
