//! Submission evaluation: automatic MCQ scoring, manual WRITTEN grading with
//! annotated pages, partial saves and the cohort read-side.
//!
//! The only synchronization point is the submission's `revision`. Every
//! write is conditional on the revision that was read, so two evaluators
//! racing on the same submission cannot both flip `is_evaluated`.

use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::state::AppState;
use crate::db::models::{Exam, Submission};
use crate::db::types::ExamType;
use crate::repositories::{SaveOutcome, StoreError};
use crate::services::annotation::{AnnotationBoard, AnnotationError, Stroke};
use crate::services::answer_key::{self, ScoreReport};

const PNG: &str = "image/png";

#[derive(Debug, Error)]
pub(crate) enum EvaluationError {
    #[error("submission {0} not found")]
    SubmissionNotFound(String),
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error("submission is already evaluated; pass force to re-evaluate")]
    AlreadyEvaluated,
    #[error("incomplete evaluation: {0}")]
    IncompleteEvaluation(String),
    #[error("exam has no answer key to score against")]
    MissingAnswerKey,
    #[error("{0}")]
    InvalidPayload(String),
    #[error("submission is evaluated; markings are read-only")]
    ReadOnly,
    #[error("submission was modified concurrently; reload and retry")]
    Conflict,
    #[error(transparent)]
    Annotation(AnnotationError),
    #[error("image storage is not configured")]
    StorageUnavailable,
    #[error("image storage failed: {0}")]
    Storage(anyhow::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EvaluationError {
    fn reason(&self) -> &'static str {
        match self {
            Self::SubmissionNotFound(_) | Self::ExamNotFound(_) => "not_found",
            Self::AlreadyEvaluated => "already_evaluated",
            Self::IncompleteEvaluation(_) => "incomplete",
            Self::MissingAnswerKey => "missing_answer_key",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::ReadOnly => "read_only",
            Self::Conflict => "conflict",
            Self::Annotation(_) => "annotation",
            Self::StorageUnavailable | Self::Storage(_) => "storage",
            Self::Store(_) => "store",
        }
    }
}

impl From<AnnotationError> for EvaluationError {
    fn from(err: AnnotationError) -> Self {
        match err {
            AnnotationError::ReadOnly { .. } => Self::ReadOnly,
            other => Self::Annotation(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EvaluationRequest {
    pub(crate) evaluator_id: String,
    /// Required for WRITTEN exams, rejected for MCQ.
    pub(crate) total_marks: Option<f64>,
    /// Strokes per answer page, in page order.
    pub(crate) pages: Vec<Vec<Stroke>>,
    pub(crate) feedback: Option<String>,
    pub(crate) grade: Option<String>,
    pub(crate) force: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct EvaluationOutcome {
    pub(crate) submission: Submission,
    /// Present for MCQ evaluations.
    pub(crate) score: Option<ScoreReport>,
    pub(crate) forced: bool,
}

pub(crate) async fn evaluate(
    state: &AppState,
    submission_id: &str,
    request: EvaluationRequest,
) -> Result<EvaluationOutcome, EvaluationError> {
    let result = evaluate_inner(state, submission_id, request).await;
    if let Err(err) = &result {
        metrics::counter!("evaluation_rejections_total", "reason" => err.reason()).increment(1);
        tracing::info!(submission_id, reason = err.reason(), error = %err, "Evaluation rejected");
    }
    result
}

async fn evaluate_inner(
    state: &AppState,
    submission_id: &str,
    mut request: EvaluationRequest,
) -> Result<EvaluationOutcome, EvaluationError> {
    let mut submission = load_submission(state, submission_id).await?;
    let exam = load_exam(state, &submission.exam_id).await?;

    if submission.is_evaluated && !request.force {
        return Err(EvaluationError::AlreadyEvaluated);
    }

    let (total_marks, evaluated_images, score) = match exam.exam_type {
        ExamType::Mcq => {
            let report = score_mcq(&exam, &submission, &request)?;
            (report.total, submission.evaluated_images.0.clone(), Some(report))
        }
        ExamType::Written => {
            let total_marks = written_marks(request.total_marks)?;
            let pages = std::mem::take(&mut request.pages);
            let images = render_pages(state, &submission, pages, false).await?;
            if images.len() != submission.answer_images.0.len() {
                return Err(EvaluationError::IncompleteEvaluation(format!(
                    "{} evaluated page(s) for {} answer page(s)",
                    images.len(),
                    submission.answer_images.0.len()
                )));
            }
            (total_marks, images, None)
        }
    };

    let now = state.clock().now();
    let forced = submission.is_evaluated;
    let replaced = forced.then(|| (submission.total_marks, submission.evaluated_by.clone()));

    let expected_revision = submission.revision;
    submission.is_evaluated = true;
    submission.total_marks = Some(total_marks);
    submission.evaluated_images = sqlx::types::Json(evaluated_images);
    submission.feedback = request.feedback;
    submission.grade = request.grade;
    submission.evaluated_by = Some(request.evaluator_id);
    submission.evaluated_at = Some(now);
    submission.evaluation_count += 1;
    submission.updated_at = now;
    submission.revision = expected_revision + 1;

    commit(state, &submission, expected_revision).await?;

    if let Some((previous_marks, previous_evaluator)) = replaced {
        tracing::warn!(
            submission_id = %submission.id,
            evaluator_id = ?submission.evaluated_by,
            previous_evaluator = ?previous_evaluator,
            previous_marks = ?previous_marks,
            revision = submission.revision,
            "Previous evaluation replaced by forced re-evaluation"
        );
    }

    metrics::counter!(
        "evaluations_total",
        "exam_type" => exam.exam_type.as_str(),
        "forced" => if forced { "true" } else { "false" }
    )
    .increment(1);
    tracing::info!(
        submission_id = %submission.id,
        exam_id = %exam.id,
        exam_type = exam.exam_type.as_str(),
        total_marks,
        revision = submission.revision,
        forced,
        "Submission evaluated"
    );
    if let Some(report) = &score {
        tracing::debug!(
            submission_id = %submission.id,
            percentage = report.percentage(),
            passed = report.passed(exam.min_pass_mark),
            "MCQ score recorded"
        );
    }

    Ok(EvaluationOutcome { submission, score, forced })
}

/// Stores overlays for the supplied markings without marking the submission
/// evaluated. Every page gets an entry so later reads see a full set.
pub(crate) async fn save_markings(
    state: &AppState,
    submission_id: &str,
    pages: Vec<Vec<Stroke>>,
) -> Result<Submission, EvaluationError> {
    let mut submission = load_submission(state, submission_id).await?;
    if submission.is_evaluated {
        return Err(EvaluationError::ReadOnly);
    }

    let images = render_pages(state, &submission, pages, true).await?;
    let now = state.clock().now();
    let expected_revision = submission.revision;

    submission.evaluated_images = sqlx::types::Json(images);
    submission.updated_at = now;
    submission.revision = expected_revision + 1;

    commit(state, &submission, expected_revision).await.map_err(|err| match err {
        EvaluationError::AlreadyEvaluated => EvaluationError::ReadOnly,
        other => other,
    })?;

    tracing::info!(
        submission_id = %submission.id,
        revision = submission.revision,
        pages = submission.evaluated_images.0.len(),
        "Markings saved"
    );

    Ok(submission)
}

/// Renders one page with `strokes` applied. Nothing is stored.
pub(crate) async fn preview_page(
    state: &AppState,
    submission_id: &str,
    page: usize,
    strokes: Vec<Stroke>,
) -> Result<Vec<u8>, EvaluationError> {
    let submission = load_submission(state, submission_id).await?;
    let images = state.images().ok_or(EvaluationError::StorageUnavailable)?;

    let mut board = AnnotationBoard::for_submission(&submission, state.annotation_limits());
    let session = board.page_mut(page)?;
    for stroke in strokes {
        session.add_stroke(stroke)?;
    }

    let reference = &submission.answer_images.0[session.page()];
    let source = images.fetch_image(reference).await.map_err(EvaluationError::Storage)?;
    Ok(session.finalize(&source)?)
}

fn score_mcq(
    exam: &Exam,
    submission: &Submission,
    request: &EvaluationRequest,
) -> Result<ScoreReport, EvaluationError> {
    if request.total_marks.is_some() {
        return Err(EvaluationError::InvalidPayload(
            "MCQ submissions are scored automatically; total_marks is not accepted".to_string(),
        ));
    }
    if request.pages.iter().any(|strokes| !strokes.is_empty()) {
        return Err(EvaluationError::InvalidPayload(
            "MCQ submissions do not take page markings".to_string(),
        ));
    }

    let question_set = exam.question_set().ok_or(EvaluationError::MissingAnswerKey)?;
    let report = answer_key::score_answers(question_set, &submission.answers.0, exam.negative_mark);
    if report.scoreable_count() == 0 {
        return Err(EvaluationError::MissingAnswerKey);
    }

    for warning in &report.warnings {
        tracing::warn!(
            exam_id = %exam.id,
            submission_id = %submission.id,
            sub_question_id = %warning.sub_question_id,
            message = %warning.message,
            "Sub-question excluded from scoring"
        );
    }

    Ok(report)
}

fn written_marks(total_marks: Option<f64>) -> Result<f64, EvaluationError> {
    let marks = total_marks.ok_or_else(|| {
        EvaluationError::IncompleteEvaluation("total_marks is required".to_string())
    })?;
    if !marks.is_finite() || marks < 0.0 {
        return Err(EvaluationError::InvalidPayload(format!(
            "total_marks must be a non-negative number, got {marks}"
        )));
    }
    Ok(marks)
}

/// Produces one stored reference per answer page, in page order.
async fn render_pages(
    state: &AppState,
    submission: &Submission,
    pages: Vec<Vec<Stroke>>,
    partial: bool,
) -> Result<Vec<String>, EvaluationError> {
    let answer_images = &submission.answer_images.0;
    let settings = state.settings().evaluation();

    if pages.len() > settings.max_images_per_submission {
        return Err(EvaluationError::InvalidPayload(format!(
            "markings supplied for {} pages; at most {} are accepted per request",
            pages.len(),
            settings.max_images_per_submission
        )));
    }
    if pages.len() > answer_images.len() {
        return Err(EvaluationError::IncompleteEvaluation(format!(
            "markings supplied for {} page(s) but the submission has {}",
            pages.len(),
            answer_images.len()
        )));
    }

    let mut board = AnnotationBoard::new(answer_images.len(), state.annotation_limits());
    board.apply(pages)?;
    tracing::debug!(
        submission_id = %submission.id,
        pages = answer_images.len(),
        marked = board.has_marks(),
        partial,
        "Rendering answer pages"
    );

    if answer_images.is_empty() {
        return Ok(Vec::new());
    }
    let images = state.images().ok_or(EvaluationError::StorageUnavailable)?;

    let mut rendered = Vec::with_capacity(answer_images.len());
    for (session, reference) in board.sessions().zip(answer_images) {
        if !session.has_marks() && !settings.reupload_unmarked_pages {
            rendered.push(reference.clone());
            continue;
        }

        let source = images.fetch_image(reference).await.map_err(EvaluationError::Storage)?;
        let bytes = session.finalize(&source)?;
        let stored = images.store_image(bytes, PNG).await.map_err(EvaluationError::Storage)?;
        metrics::counter!("annotation_pages_rendered_total").increment(1);
        tracing::debug!(
            submission_id = %submission.id,
            page = session.page(),
            strokes = session.strokes().len(),
            partial,
            "Rendered answer page"
        );
        rendered.push(stored);
    }

    Ok(rendered)
}

async fn commit(
    state: &AppState,
    submission: &Submission,
    expected_revision: i64,
) -> Result<(), EvaluationError> {
    match state.submissions().save_submission(submission, expected_revision).await? {
        SaveOutcome::Saved => Ok(()),
        SaveOutcome::Stale => {
            let current = load_submission(state, &submission.id).await?;
            tracing::info!(
                submission_id = %submission.id,
                expected_revision,
                current_revision = current.revision,
                "Stale submission write"
            );
            if current.is_evaluated {
                Err(EvaluationError::AlreadyEvaluated)
            } else {
                Err(EvaluationError::Conflict)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SubmissionReview {
    pub(crate) submission: Submission,
    pub(crate) exam_type: ExamType,
    /// Markings can no longer be changed without a forced re-evaluation.
    pub(crate) read_only: bool,
    /// Per-question comparison against the answer key, for MCQ exams that
    /// have one.
    pub(crate) breakdown: Option<ScoreReport>,
}

/// Read-only view an evaluator opens before grading. Nothing is written.
pub(crate) async fn review(
    state: &AppState,
    submission_id: &str,
) -> Result<SubmissionReview, EvaluationError> {
    let submission = load_submission(state, submission_id).await?;
    let exam = load_exam(state, &submission.exam_id).await?;

    let breakdown = match exam.exam_type {
        ExamType::Mcq => exam.question_set().map(|question_set| {
            answer_key::score_answers(question_set, &submission.answers.0, exam.negative_mark)
        }),
        ExamType::Written => None,
    };

    let read_only =
        AnnotationBoard::for_submission(&submission, state.annotation_limits()).is_read_only();

    Ok(SubmissionReview {
        read_only,
        exam_type: exam.exam_type,
        breakdown,
        submission,
    })
}

async fn load_submission(state: &AppState, id: &str) -> Result<Submission, EvaluationError> {
    state
        .submissions()
        .load_submission(id)
        .await?
        .ok_or_else(|| EvaluationError::SubmissionNotFound(id.to_string()))
}

async fn load_exam(state: &AppState, id: &str) -> Result<Exam, EvaluationError> {
    state.exams().load_exam(id).await?.ok_or_else(|| EvaluationError::ExamNotFound(id.to_string()))
}

#[derive(Debug, Clone)]
pub(crate) struct SubmissionDigest {
    pub(crate) submission_id: String,
    pub(crate) student_id: String,
    pub(crate) total_marks: Option<f64>,
    pub(crate) page_count: usize,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) evaluated_at: Option<PrimitiveDateTime>,
}

impl From<&Submission> for SubmissionDigest {
    fn from(submission: &Submission) -> Self {
        Self {
            submission_id: submission.id.clone(),
            student_id: submission.student_id.clone(),
            total_marks: submission.total_marks,
            page_count: submission.answer_images.0.len(),
            submitted_at: submission.submitted_at,
            evaluated_at: submission.evaluated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CohortSummary {
    pub(crate) exam_id: String,
    pub(crate) exam_type: ExamType,
    pub(crate) result_published: bool,
    pub(crate) total: usize,
    pub(crate) evaluated_count: usize,
    pub(crate) pending_count: usize,
    /// Mean over evaluated submissions with marks; `None` when there are none.
    pub(crate) average_marks: Option<f64>,
    pub(crate) evaluated: Vec<SubmissionDigest>,
    pub(crate) pending: Vec<SubmissionDigest>,
}

pub(crate) async fn aggregate(state: &AppState, exam_id: &str) -> Result<CohortSummary, EvaluationError> {
    let exam = load_exam(state, exam_id).await?;
    let submissions = state.submissions().list_submissions(exam_id).await?;
    Ok(summarize(&exam, &submissions))
}

pub(crate) fn summarize(exam: &Exam, submissions: &[Submission]) -> CohortSummary {
    let (evaluated, pending): (Vec<&Submission>, Vec<&Submission>) =
        submissions.iter().filter(|s| s.exam_id == exam.id).partition(|s| s.is_evaluated);

    let marks: Vec<f64> = evaluated.iter().filter_map(|s| s.total_marks).collect();
    let average_marks =
        (!marks.is_empty()).then(|| marks.iter().sum::<f64>() / marks.len() as f64);

    CohortSummary {
        exam_id: exam.id.clone(),
        exam_type: exam.exam_type,
        result_published: exam.result_published,
        total: evaluated.len() + pending.len(),
        evaluated_count: evaluated.len(),
        pending_count: pending.len(),
        average_marks,
        evaluated: evaluated.into_iter().map(SubmissionDigest::from).collect(),
        pending: pending.into_iter().map(SubmissionDigest::from).collect(),
    }
}
