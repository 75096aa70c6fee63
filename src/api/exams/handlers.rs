use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::Evaluator;
use crate::core::state::AppState;
use crate::db::models::Exam;
use crate::schemas::exam::{
    CohortSummaryResponse, ExamCreate, ExamResponse, ExamStatusResponse, ExamUpdate,
    PublishResponse,
};
use crate::services::{evaluation, exam_editor, exam_state, publication};

pub(super) async fn create_exam(
    Evaluator(user_id): Evaluator,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = exam_editor::create_exam(&state, &user_id, payload.into()).await?;

    Ok((StatusCode::CREATED, Json(exam.into())))
}

pub(super) async fn get_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    Ok(Json(exam.into()))
}

pub(super) async fn update_exam(
    Path(exam_id): Path<String>,
    Evaluator(user_id): Evaluator,
    State(state): State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = exam_editor::update_exam(&state, &exam_id, payload.into()).await?;
    tracing::debug!(exam_id = %exam.id, user_id = %user_id, "Exam edited");

    Ok(Json(exam.into()))
}

pub(super) async fn exam_status(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExamStatusResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    let now = state.clock().now();
    let view = exam_state::derive_exam_state(&exam, now);

    Ok(Json(ExamStatusResponse::new(exam.id, &view, now)))
}

pub(super) async fn publish_exam(
    Path(exam_id): Path<String>,
    Evaluator(user_id): Evaluator,
    State(state): State<AppState>,
) -> Result<Json<PublishResponse>, ApiError> {
    let outcome = publication::publish(&state, &exam_id).await?;
    tracing::info!(exam_id = %exam_id, user_id = %user_id, outcome = ?outcome, "Publish requested");

    Ok(Json(PublishResponse { exam_id, outcome, result_published: true }))
}

pub(super) async fn submissions_summary(
    Path(exam_id): Path<String>,
    Evaluator(_): Evaluator,
    State(state): State<AppState>,
) -> Result<Json<CohortSummaryResponse>, ApiError> {
    let summary = evaluation::aggregate(&state, &exam_id).await?;
    Ok(Json(summary.into()))
}

async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    state
        .exams()
        .load_exam(exam_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}
