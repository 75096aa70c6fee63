mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam))
        .route("/:exam_id", get(handlers::get_exam).patch(handlers::update_exam))
        .route("/:exam_id/status", get(handlers::exam_status))
        .route("/:exam_id/publish", post(handlers::publish_exam))
        .route("/:exam_id/submissions/summary", get(handlers::submissions_summary))
}
