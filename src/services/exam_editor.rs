//! Authoring boundary for exams. Values accepted here are the invariants the
//! rest of the engine relies on, negative-mark normalization in particular.

use sqlx::types::Json;
use thiserror::Error;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::db::models::{Exam, QuestionSet};
use crate::db::types::{ExamMode, ExamStatus, ExamType};
use crate::repositories::StoreError;
use crate::services::exam_window::{resolve_window, ScheduleError};

const MAX_PENALTY: f64 = 100.0;

#[derive(Debug, Error)]
pub(crate) enum ExamInputError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("duration_minutes must be non-negative, got {0}")]
    InvalidDuration(i32),
    #[error("min_pass_mark must be between 0 and 100, got {0}")]
    InvalidPassMark(f64),
    #[error("negative_mark must be a number with magnitude at most 100, got {0}")]
    InvalidNegativeMark(f64),
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Converts any caller-supplied penalty to `-|value|`.
pub(crate) fn normalize_negative_mark(value: f64) -> Result<f64, ExamInputError> {
    if !value.is_finite() || value.abs() > MAX_PENALTY {
        return Err(ExamInputError::InvalidNegativeMark(value));
    }
    let normalized = -value.abs();
    // -0.0 stored as 0.0
    Ok(if normalized == 0.0 { 0.0 } else { normalized })
}

#[derive(Debug, Clone)]
pub(crate) struct ExamDraft {
    pub(crate) title: String,
    pub(crate) mode: ExamMode,
    pub(crate) scheduled_date: Option<String>,
    pub(crate) scheduled_time: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) exam_type: ExamType,
    pub(crate) min_pass_mark: f64,
    pub(crate) negative_mark: f64,
    pub(crate) question_set: Option<QuestionSet>,
}

/// Partial edit. Mode, type and the question tree are fixed once created and
/// the publication flag is only reachable through publication.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExamChanges {
    pub(crate) title: Option<String>,
    pub(crate) scheduled_date: Option<String>,
    pub(crate) scheduled_time: Option<String>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) min_pass_mark: Option<f64>,
    pub(crate) negative_mark: Option<f64>,
    pub(crate) status: Option<ExamStatus>,
}

pub(crate) async fn create_exam(
    state: &AppState,
    created_by: &str,
    draft: ExamDraft,
) -> Result<Exam, ExamInputError> {
    let now = state.clock().now();
    let exam = Exam {
        id: Uuid::new_v4().to_string(),
        title: draft.title.trim().to_string(),
        mode: draft.mode,
        scheduled_date: draft.scheduled_date,
        scheduled_time: draft.scheduled_time,
        duration_minutes: draft.duration_minutes,
        status: ExamStatus::Active,
        exam_type: draft.exam_type,
        min_pass_mark: draft.min_pass_mark,
        negative_mark: normalize_negative_mark(draft.negative_mark)?,
        result_published: false,
        question_set: draft.question_set.map(Json),
        created_by: created_by.to_string(),
        created_at: now,
        updated_at: now,
        published_at: None,
    };
    validate(&exam)?;

    state.exams().insert_exam(&exam).await?;
    tracing::info!(
        exam_id = %exam.id,
        mode = ?exam.mode,
        exam_type = exam.exam_type.as_str(),
        negative_mark = exam.negative_mark,
        "Exam created"
    );
    Ok(exam)
}

pub(crate) async fn update_exam(
    state: &AppState,
    exam_id: &str,
    changes: ExamChanges,
) -> Result<Exam, ExamInputError> {
    let mut exam = state
        .exams()
        .load_exam(exam_id)
        .await?
        .ok_or_else(|| ExamInputError::ExamNotFound(exam_id.to_string()))?;
    let previous_status = exam.status;

    if let Some(title) = changes.title {
        exam.title = title.trim().to_string();
    }
    if let Some(date) = changes.scheduled_date {
        exam.scheduled_date = Some(date);
    }
    if let Some(time) = changes.scheduled_time {
        exam.scheduled_time = Some(time);
    }
    if let Some(duration) = changes.duration_minutes {
        exam.duration_minutes = duration;
    }
    if let Some(pass_mark) = changes.min_pass_mark {
        exam.min_pass_mark = pass_mark;
    }
    if let Some(penalty) = changes.negative_mark {
        exam.negative_mark = normalize_negative_mark(penalty)?;
    }
    if let Some(status) = changes.status {
        exam.status = status;
    }
    validate(&exam)?;

    exam.updated_at = state.clock().now();
    state.exams().update_exam(&exam).await?;

    if exam.status != previous_status {
        tracing::info!(exam_id, status = ?exam.status, "Exam status changed");
    }
    tracing::debug!(exam_id, "Exam updated");
    Ok(exam)
}

fn validate(exam: &Exam) -> Result<(), ExamInputError> {
    if exam.title.is_empty() {
        return Err(ExamInputError::EmptyTitle);
    }
    if exam.duration_minutes < 0 {
        return Err(ExamInputError::InvalidDuration(exam.duration_minutes));
    }
    if !(0.0..=100.0).contains(&exam.min_pass_mark) {
        return Err(ExamInputError::InvalidPassMark(exam.min_pass_mark));
    }
    resolve_window(
        exam.mode,
        exam.scheduled_date.as_deref(),
        exam.scheduled_time.as_deref(),
        exam.duration_minutes,
    )?;
    Ok(())
}
