mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:submission_id", get(handlers::get_submission))
        .route("/:submission_id/review", get(handlers::review_submission))
        .route("/:submission_id/evaluate", post(handlers::evaluate_submission))
        .route("/:submission_id/markings", post(handlers::save_markings))
        .route("/:submission_id/pages/:page_index/preview", post(handlers::preview_page))
        .route("/:submission_id/result", get(handlers::student_result))
}
