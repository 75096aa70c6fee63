use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Exam, QuestionSet};
use crate::db::types::{ExamMode, ExamStatus, ExamType};
use crate::services::evaluation::{CohortSummary, SubmissionDigest};
use crate::services::exam_editor::{ExamChanges, ExamDraft};
use crate::services::exam_state::{ExamPhase, ExamStateView};
use crate::services::publication::PublishOutcome;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: String,
    pub(crate) mode: ExamMode,
    #[serde(default, alias = "scheduledDate")]
    pub(crate) scheduled_date: Option<String>,
    #[serde(default, alias = "scheduledTime")]
    pub(crate) scheduled_time: Option<String>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 0, message = "duration_minutes must be non-negative"))]
    pub(crate) duration_minutes: i32,
    #[serde(alias = "examType")]
    pub(crate) exam_type: ExamType,
    #[serde(default, alias = "minPassMark")]
    #[validate(range(min = 0.0, max = 100.0, message = "min_pass_mark must be between 0 and 100"))]
    pub(crate) min_pass_mark: f64,
    /// Any sign is accepted; stored as a penalty.
    #[serde(default, alias = "negativeMark")]
    pub(crate) negative_mark: f64,
    #[serde(default, alias = "questionSet")]
    pub(crate) question_set: Option<QuestionSet>,
}

impl From<ExamCreate> for ExamDraft {
    fn from(payload: ExamCreate) -> Self {
        Self {
            title: payload.title,
            mode: payload.mode,
            scheduled_date: payload.scheduled_date,
            scheduled_time: payload.scheduled_time,
            duration_minutes: payload.duration_minutes,
            exam_type: payload.exam_type,
            min_pass_mark: payload.min_pass_mark,
            negative_mark: payload.negative_mark,
            question_set: payload.question_set,
        }
    }
}

/// Unknown fields are rejected so clients cannot smuggle in
/// `result_published`, `mode` or `exam_type`.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default, alias = "scheduledDate")]
    pub(crate) scheduled_date: Option<String>,
    #[serde(default, alias = "scheduledTime")]
    pub(crate) scheduled_time: Option<String>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 0, message = "duration_minutes must be non-negative"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default, alias = "minPassMark")]
    #[validate(range(min = 0.0, max = 100.0, message = "min_pass_mark must be between 0 and 100"))]
    pub(crate) min_pass_mark: Option<f64>,
    #[serde(default, alias = "negativeMark")]
    pub(crate) negative_mark: Option<f64>,
    #[serde(default)]
    pub(crate) status: Option<ExamStatus>,
}

impl From<ExamUpdate> for ExamChanges {
    fn from(payload: ExamUpdate) -> Self {
        Self {
            title: payload.title,
            scheduled_date: payload.scheduled_date,
            scheduled_time: payload.scheduled_time,
            duration_minutes: payload.duration_minutes,
            min_pass_mark: payload.min_pass_mark,
            negative_mark: payload.negative_mark,
            status: payload.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) mode: ExamMode,
    pub(crate) scheduled_date: Option<String>,
    pub(crate) scheduled_time: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) status: ExamStatus,
    pub(crate) exam_type: ExamType,
    pub(crate) min_pass_mark: f64,
    pub(crate) negative_mark: f64,
    pub(crate) result_published: bool,
    pub(crate) question_set: Option<QuestionSet>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
}

impl From<Exam> for ExamResponse {
    fn from(exam: Exam) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            mode: exam.mode,
            scheduled_date: exam.scheduled_date,
            scheduled_time: exam.scheduled_time,
            duration_minutes: exam.duration_minutes,
            status: exam.status,
            exam_type: exam.exam_type,
            min_pass_mark: exam.min_pass_mark,
            negative_mark: exam.negative_mark,
            result_published: exam.result_published,
            question_set: exam.question_set.map(|set| set.0),
            created_by: exam.created_by,
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            published_at: exam.published_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamStatusResponse {
    pub(crate) exam_id: String,
    pub(crate) phase: ExamPhase,
    pub(crate) is_open: bool,
    pub(crate) label: String,
    pub(crate) remaining_seconds: Option<i64>,
    pub(crate) window_start: Option<String>,
    pub(crate) window_end: Option<String>,
    /// Re-query about once per second while true.
    pub(crate) refresh_hint: bool,
    pub(crate) schedule_error: Option<String>,
    pub(crate) now: String,
}

impl ExamStatusResponse {
    pub(crate) fn new(exam_id: String, view: &ExamStateView, now: time::PrimitiveDateTime) -> Self {
        Self {
            exam_id,
            phase: view.phase,
            is_open: view.phase.is_open(),
            label: view.label(),
            remaining_seconds: view.remaining.map(|remaining| remaining.whole_seconds()),
            window_start: view.window.map(|(start, _)| format_primitive(start)),
            window_end: view.window.map(|(_, end)| format_primitive(end)),
            refresh_hint: view.needs_refresh(),
            schedule_error: view.schedule_error.as_ref().map(ToString::to_string),
            now: format_primitive(now),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishResponse {
    pub(crate) exam_id: String,
    pub(crate) outcome: PublishOutcome,
    pub(crate) result_published: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionDigestResponse {
    pub(crate) submission_id: String,
    pub(crate) student_id: String,
    pub(crate) total_marks: Option<f64>,
    pub(crate) page_count: usize,
    pub(crate) submitted_at: String,
    pub(crate) evaluated_at: Option<String>,
}

impl From<SubmissionDigest> for SubmissionDigestResponse {
    fn from(digest: SubmissionDigest) -> Self {
        Self {
            submission_id: digest.submission_id,
            student_id: digest.student_id,
            total_marks: digest.total_marks,
            page_count: digest.page_count,
            submitted_at: format_primitive(digest.submitted_at),
            evaluated_at: digest.evaluated_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CohortSummaryResponse {
    pub(crate) exam_id: String,
    pub(crate) exam_type: ExamType,
    pub(crate) result_published: bool,
    pub(crate) total: usize,
    pub(crate) evaluated_count: usize,
    pub(crate) pending_count: usize,
    pub(crate) average_marks: Option<f64>,
    pub(crate) evaluated: Vec<SubmissionDigestResponse>,
    pub(crate) pending: Vec<SubmissionDigestResponse>,
}

impl From<CohortSummary> for CohortSummaryResponse {
    fn from(summary: CohortSummary) -> Self {
        Self {
            exam_id: summary.exam_id,
            exam_type: summary.exam_type,
            result_published: summary.result_published,
            total: summary.total,
            evaluated_count: summary.evaluated_count,
            pending_count: summary.pending_count,
            average_marks: summary.average_marks,
            evaluated: summary.evaluated.into_iter().map(Into::into).collect(),
            pending: summary.pending.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn create_accepts_camel_case_aliases() {
        let payload: ExamCreate = serde_json::from_value(serde_json::json!({
            "title": "Physics",
            "mode": "scheduled",
            "scheduledDate": "2025-01-10",
            "scheduledTime": "10:00",
            "durationMinutes": 45,
            "examType": "MCQ",
            "minPassMark": 40,
            "negativeMark": 0.25
        }))
        .expect("payload");

        assert!(payload.validate().is_ok());
        let draft = ExamDraft::from(payload);
        assert_eq!(draft.exam_type, ExamType::Mcq);
        assert_eq!(draft.duration_minutes, 45);
        assert_eq!(draft.negative_mark, 0.25);
    }

    #[test]
    fn update_rejects_publication_flag() {
        let result = serde_json::from_value::<ExamUpdate>(serde_json::json!({
            "title": "Renamed",
            "result_published": false
        }));
        assert!(result.is_err());
    }

    #[test]
    fn create_validates_pass_mark_range() {
        let payload: ExamCreate = serde_json::from_value(serde_json::json!({
            "title": "Physics",
            "mode": "anytime",
            "exam_type": "WRITTEN",
            "min_pass_mark": 150
        }))
        .expect("payload");
        assert!(payload.validate().is_err());
    }
}
