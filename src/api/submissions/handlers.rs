use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::Evaluator;
use crate::core::state::AppState;
use crate::schemas::submission::{
    EvaluateRequest, EvaluationResponse, MarkingsRequest, PreviewRequest, ReviewResponse,
    StudentResultResponse, SubmissionResponse,
};
use crate::services::{evaluation, publication};

pub(super) async fn get_submission(
    Path(submission_id): Path<String>,
    Evaluator(_): Evaluator,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = state
        .submissions()
        .load_submission(&submission_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    Ok(Json(submission.into()))
}

pub(super) async fn review_submission(
    Path(submission_id): Path<String>,
    Evaluator(_): Evaluator,
    State(state): State<AppState>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let review = evaluation::review(&state, &submission_id).await?;
    Ok(Json(review.into()))
}

pub(super) async fn evaluate_submission(
    Path(submission_id): Path<String>,
    Evaluator(user_id): Evaluator,
    State(state): State<AppState>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome =
        evaluation::evaluate(&state, &submission_id, payload.into_request(user_id)).await?;

    Ok(Json(outcome.into()))
}

pub(super) async fn save_markings(
    Path(submission_id): Path<String>,
    Evaluator(user_id): Evaluator,
    State(state): State<AppState>,
    Json(payload): Json<MarkingsRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = evaluation::save_markings(&state, &submission_id, payload.pages).await?;
    tracing::debug!(submission_id = %submission.id, user_id = %user_id, "Markings saved via API");

    Ok(Json(submission.into()))
}

pub(super) async fn preview_page(
    Path((submission_id, page_index)): Path<(String, usize)>,
    Evaluator(_): Evaluator,
    State(state): State<AppState>,
    Json(payload): Json<PreviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let png = evaluation::preview_page(&state, &submission_id, page_index, payload.strokes).await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// Student-facing; hidden fields stay hidden until publication.
pub(super) async fn student_result(
    Path(submission_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<StudentResultResponse>, ApiError> {
    let view = publication::student_result(&state, &submission_id).await?;
    Ok(Json(view.into()))
}
