use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Submission;
use crate::db::types::ExamType;
use crate::services::annotation::Stroke;
use crate::services::answer_key::ScoreReport;
use crate::services::evaluation::{EvaluationOutcome, EvaluationRequest, SubmissionReview};
use crate::services::publication::{ResultVisibility, StudentResult};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct EvaluateRequest {
    #[serde(default, alias = "totalMarks")]
    #[validate(range(min = 0.0, message = "total_marks must be non-negative"))]
    pub(crate) total_marks: Option<f64>,
    #[serde(default)]
    #[validate(length(max = 10000, message = "feedback is too long"))]
    pub(crate) feedback: Option<String>,
    #[serde(default)]
    #[validate(length(max = 32, message = "grade is too long"))]
    pub(crate) grade: Option<String>,
    /// Strokes per answer page, in page order.
    #[serde(default)]
    pub(crate) pages: Vec<Vec<Stroke>>,
    #[serde(default, alias = "forceReevaluate")]
    pub(crate) force: bool,
}

impl EvaluateRequest {
    pub(crate) fn into_request(self, evaluator_id: String) -> EvaluationRequest {
        EvaluationRequest {
            evaluator_id,
            total_marks: self.total_marks,
            pages: self.pages,
            feedback: self.feedback,
            grade: self.grade,
            force: self.force,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarkingsRequest {
    #[serde(default)]
    pub(crate) pages: Vec<Vec<Stroke>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreviewRequest {
    #[serde(default)]
    pub(crate) strokes: Vec<Stroke>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) answers: BTreeMap<String, String>,
    pub(crate) answer_images: Vec<String>,
    pub(crate) evaluated_images: Vec<String>,
    pub(crate) is_evaluated: bool,
    pub(crate) total_marks: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) grade: Option<String>,
    pub(crate) evaluated_by: Option<String>,
    pub(crate) evaluated_at: Option<String>,
    pub(crate) evaluation_count: i32,
    pub(crate) revision: i64,
    pub(crate) submitted_at: String,
    pub(crate) updated_at: String,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            exam_id: submission.exam_id,
            student_id: submission.student_id,
            answers: submission.answers.0,
            answer_images: submission.answer_images.0,
            evaluated_images: submission.evaluated_images.0,
            is_evaluated: submission.is_evaluated,
            total_marks: submission.total_marks,
            feedback: submission.feedback,
            grade: submission.grade,
            evaluated_by: submission.evaluated_by,
            evaluated_at: submission.evaluated_at.map(format_primitive),
            evaluation_count: submission.evaluation_count,
            revision: submission.revision,
            submitted_at: format_primitive(submission.submitted_at),
            updated_at: format_primitive(submission.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluationResponse {
    pub(crate) submission: SubmissionResponse,
    pub(crate) score: Option<ScoreReport>,
    pub(crate) forced: bool,
}

impl From<EvaluationOutcome> for EvaluationResponse {
    fn from(outcome: EvaluationOutcome) -> Self {
        Self { submission: outcome.submission.into(), score: outcome.score, forced: outcome.forced }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewResponse {
    pub(crate) submission: SubmissionResponse,
    pub(crate) exam_type: ExamType,
    pub(crate) read_only: bool,
    pub(crate) page_count: usize,
    pub(crate) breakdown: Option<ScoreReport>,
}

impl From<SubmissionReview> for ReviewResponse {
    fn from(review: SubmissionReview) -> Self {
        Self {
            page_count: review.submission.answer_images.0.len(),
            submission: review.submission.into(),
            exam_type: review.exam_type,
            read_only: review.read_only,
            breakdown: review.breakdown,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishedResultResponse {
    pub(crate) total_marks: Option<f64>,
    pub(crate) max_marks: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) feedback: Option<String>,
    pub(crate) grade: Option<String>,
    pub(crate) evaluated_images: Vec<String>,
    pub(crate) evaluated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentResultResponse {
    pub(crate) submission_id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    /// `not_published`, `pending_evaluation` or `visible`.
    pub(crate) visibility: &'static str,
    pub(crate) result: Option<PublishedResultResponse>,
}

impl From<StudentResult> for StudentResultResponse {
    fn from(view: StudentResult) -> Self {
        let (visibility, result) = match view.visibility {
            ResultVisibility::NotPublished => ("not_published", None),
            ResultVisibility::PendingEvaluation => ("pending_evaluation", None),
            ResultVisibility::Visible(result) => (
                "visible",
                Some(PublishedResultResponse {
                    total_marks: result.total_marks,
                    max_marks: result.max_marks,
                    percentage: result.percentage,
                    passed: result.passed,
                    feedback: result.feedback,
                    grade: result.grade,
                    evaluated_images: result.evaluated_images,
                    evaluated_at: result.evaluated_at.map(format_primitive),
                }),
            ),
        };

        Self {
            submission_id: view.submission_id,
            exam_id: view.exam_id,
            student_id: view.student_id,
            visibility,
            result,
        }
    }
}
