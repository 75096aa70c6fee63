//! One-way release of results and the student-facing read side.

use serde::Serialize;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::state::AppState;
use crate::db::models::{Exam, Submission};
use crate::db::types::ExamType;
use crate::repositories::StoreError;
use crate::services::answer_key;

#[derive(Debug, Error)]
pub(crate) enum PublicationError {
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error("submission {0} not found")]
    SubmissionNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PublishOutcome {
    Published,
    AlreadyPublished,
}

/// Releases results for `exam_id`. Calling it on a published exam is a no-op.
/// Pending submissions do not block publication.
pub(crate) async fn publish(
    state: &AppState,
    exam_id: &str,
) -> Result<PublishOutcome, PublicationError> {
    let exam = state
        .exams()
        .load_exam(exam_id)
        .await?
        .ok_or_else(|| PublicationError::ExamNotFound(exam_id.to_string()))?;

    if exam.result_published {
        return Ok(PublishOutcome::AlreadyPublished);
    }

    let flipped = state.exams().set_exam_published(exam_id, true, state.clock().now()).await?;
    if !flipped {
        tracing::debug!(exam_id, "Results were published concurrently");
        return Ok(PublishOutcome::AlreadyPublished);
    }

    metrics::counter!("results_published_total").increment(1);
    tracing::info!(exam_id, exam_type = exam.exam_type.as_str(), "Results published");
    Ok(PublishOutcome::Published)
}

#[derive(Debug, Clone)]
pub(crate) struct PublishedResult {
    pub(crate) total_marks: Option<f64>,
    /// Only known for MCQ exams.
    pub(crate) max_marks: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) feedback: Option<String>,
    pub(crate) grade: Option<String>,
    pub(crate) evaluated_images: Vec<String>,
    pub(crate) evaluated_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone)]
pub(crate) enum ResultVisibility {
    NotPublished,
    PendingEvaluation,
    Visible(PublishedResult),
}

#[derive(Debug, Clone)]
pub(crate) struct StudentResult {
    pub(crate) submission_id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) visibility: ResultVisibility,
}

pub(crate) async fn student_result(
    state: &AppState,
    submission_id: &str,
) -> Result<StudentResult, PublicationError> {
    let submission = state
        .submissions()
        .load_submission(submission_id)
        .await?
        .ok_or_else(|| PublicationError::SubmissionNotFound(submission_id.to_string()))?;
    let exam = state
        .exams()
        .load_exam(&submission.exam_id)
        .await?
        .ok_or_else(|| PublicationError::ExamNotFound(submission.exam_id.clone()))?;

    Ok(result_view(&exam, submission))
}

pub(crate) fn result_view(exam: &Exam, submission: Submission) -> StudentResult {
    let visibility = if !exam.result_published {
        ResultVisibility::NotPublished
    } else if !submission.is_evaluated {
        ResultVisibility::PendingEvaluation
    } else {
        let max_marks = match exam.exam_type {
            ExamType::Mcq => exam.question_set().map(answer_key::max_marks),
            ExamType::Written => None,
        };
        let percentage = max_marks
            .zip(submission.total_marks)
            .map(|(max, total)| answer_key::percentage_of(total, max));

        ResultVisibility::Visible(PublishedResult {
            total_marks: submission.total_marks,
            max_marks,
            percentage,
            passed: percentage.map(|value| value >= exam.min_pass_mark),
            feedback: submission.feedback,
            grade: submission.grade,
            evaluated_images: submission.evaluated_images.0,
            evaluated_at: submission.evaluated_at,
        })
    };

    StudentResult {
        submission_id: submission.id,
        exam_id: submission.exam_id,
        student_id: submission.student_id,
        visibility,
    }
}
