use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use sqlx::types::Json;
use time::macros::datetime;
use time::PrimitiveDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::api;
use crate::core::config::Settings;
use crate::core::state::{AppState, Backends};
use crate::core::time::Clock;
use crate::db::models::{Exam, Question, QuestionCategory, QuestionSet, SubQuestion, Submission};
use crate::db::types::{ExamMode, ExamStatus, ExamType};
use crate::repositories::{ExamStore, SaveOutcome, StoreError, SubmissionStore};
use crate::services::storage::{evaluation_key, ImageStore};

/// Instant returned by the test clock.
pub(crate) const NOW: PrimitiveDateTime = datetime!(2025-01-10 12:00:00);

pub(crate) use crate::api::guards::USER_ID_HEADER as EVALUATOR_HEADER;

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: Arc<InMemoryStore>,
    pub(crate) images: Arc<InMemoryImageStore>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<AsyncMutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(AsyncMutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("EXAM_ENV", "test");
    std::env::set_var("EXAM_STRICT_CONFIG", "0");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");
    for key in [
        "ENVIRONMENT",
        "API_V1_STR",
        "BACKEND_CORS_ORIGINS",
        "DATABASE_URL",
        "S3_ENDPOINT",
        "S3_ACCESS_KEY",
        "S3_SECRET_KEY",
        "S3_BUCKET",
        "S3_REGION",
        "EVALUATION_MAX_IMAGES",
        "EVALUATION_REUPLOAD_UNMARKED",
        "ANNOTATION_MAX_STROKES",
        "ANNOTATION_DEFAULT_BRUSH_WIDTH",
    ] {
        std::env::remove_var(key);
    }
}

pub(crate) async fn setup_engine() -> TestContext {
    setup_engine_with_env(&[]).await
}

/// In-memory stores, fixed clock and the full router. `vars` are applied on
/// top of the test environment before settings are loaded.
pub(crate) async fn setup_engine_with_env(vars: &[(&str, &str)]) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    let settings = Settings::load().expect("settings");
    let store = Arc::new(InMemoryStore::default());
    let images = Arc::new(InMemoryImageStore::default());

    let state = AppState::new(
        settings,
        Backends {
            exams: store.clone(),
            submissions: store.clone(),
            images: Some(images.clone() as Arc<dyn ImageStore>),
            clock: Arc::new(FixedClock(NOW)),
            db: None,
        },
    );
    let app = api::router::router(state.clone());

    TestContext { state, app, store, images, _guard: guard }
}

pub(crate) struct FixedClock(pub(crate) PrimitiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> PrimitiveDateTime {
        self.0
    }
}

#[derive(Default)]
struct StoreInner {
    exams: HashMap<String, Exam>,
    submissions: BTreeMap<String, Submission>,
    /// `is_evaluated` after every write, per submission.
    history: HashMap<String, Vec<bool>>,
    stale_once: HashSet<String>,
    evaluated_elsewhere: HashSet<String>,
    fail_once: HashSet<String>,
}

#[derive(Default)]
pub(crate) struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub(crate) fn put_exam(&self, exam: Exam) {
        self.inner.lock().expect("store lock").exams.insert(exam.id.clone(), exam);
    }

    pub(crate) fn put_submission(&self, submission: Submission) {
        let mut inner = self.inner.lock().expect("store lock");
        inner.history.entry(submission.id.clone()).or_default().push(submission.is_evaluated);
        inner.submissions.insert(submission.id.clone(), submission);
    }

    pub(crate) fn exam(&self, id: &str) -> Option<Exam> {
        self.inner.lock().expect("store lock").exams.get(id).cloned()
    }

    pub(crate) fn submission(&self, id: &str) -> Option<Submission> {
        self.inner.lock().expect("store lock").submissions.get(id).cloned()
    }

    pub(crate) fn evaluation_history(&self, id: &str) -> Vec<bool> {
        self.inner.lock().expect("store lock").history.get(id).cloned().unwrap_or_default()
    }

    /// Makes the next save of `id` behave as if another writer got there first.
    pub(crate) fn fail_next_save_as_stale(&self, id: &str) {
        self.inner.lock().expect("store lock").stale_once.insert(id.to_string());
    }

    /// Another evaluator commits `id` right before our next save lands.
    pub(crate) fn evaluate_before_next_save(&self, id: &str) {
        self.inner.lock().expect("store lock").evaluated_elsewhere.insert(id.to_string());
    }

    /// The next save of `id` fails with a database error and writes nothing.
    pub(crate) fn fail_next_save(&self, id: &str) {
        self.inner.lock().expect("store lock").fail_once.insert(id.to_string());
    }
}

#[async_trait]
impl ExamStore for InMemoryStore {
    async fn load_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(self.exam(id))
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        self.put_exam(exam.clone());
        Ok(())
    }

    async fn update_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let stored = inner
            .exams
            .get_mut(&exam.id)
            .ok_or_else(|| StoreError::Missing(format!("exam {}", exam.id)))?;
        let (published, published_at) = (stored.result_published, stored.published_at);
        *stored = exam.clone();
        stored.result_published = published;
        stored.published_at = published_at;
        Ok(())
    }

    async fn set_exam_published(
        &self,
        id: &str,
        published: bool,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        match inner.exams.get_mut(id) {
            Some(exam) if published && !exam.result_published => {
                exam.result_published = true;
                exam.published_at = Some(now);
                exam.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn load_submission(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        Ok(self.submission(id))
    }

    async fn list_submissions(&self, exam_id: &str) -> Result<Vec<Submission>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.submissions.values().filter(|s| s.exam_id == exam_id).cloned().collect())
    }

    async fn save_submission(
        &self,
        submission: &Submission,
        expected_revision: i64,
    ) -> Result<SaveOutcome, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.fail_once.remove(&submission.id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        if inner.stale_once.remove(&submission.id) {
            return Ok(SaveOutcome::Stale);
        }
        if inner.evaluated_elsewhere.remove(&submission.id) {
            if let Some(stored) = inner.submissions.get_mut(&submission.id) {
                stored.is_evaluated = true;
                stored.revision += 1;
            }
            return Ok(SaveOutcome::Stale);
        }
        match inner.submissions.get(&submission.id) {
            Some(stored) if stored.revision == expected_revision => {}
            _ => return Ok(SaveOutcome::Stale),
        }

        inner.history.entry(submission.id.clone()).or_default().push(submission.is_evaluated);
        inner.submissions.insert(submission.id.clone(), submission.clone());
        Ok(SaveOutcome::Saved)
    }
}

#[derive(Default)]
pub(crate) struct InMemoryImageStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    stored: Mutex<usize>,
}

impl InMemoryImageStore {
    /// Seeds a source page without counting it as stored.
    pub(crate) fn put(&self, reference: &str, bytes: Vec<u8>) {
        self.objects.lock().expect("image lock").insert(reference.to_string(), bytes);
    }

    pub(crate) fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.objects.lock().expect("image lock").get(reference).cloned()
    }

    pub(crate) fn stored_count(&self) -> usize {
        *self.stored.lock().expect("image lock")
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn store_image(&self, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        let key = evaluation_key(&bytes, content_type);
        self.objects.lock().expect("image lock").insert(key.clone(), bytes);
        *self.stored.lock().expect("image lock") += 1;
        Ok(key)
    }

    async fn fetch_image(&self, reference: &str) -> anyhow::Result<Vec<u8>> {
        self.get(reference).ok_or_else(|| anyhow::anyhow!("no object stored under {reference}"))
    }
}

pub(crate) fn blank_png(width: u32, height: u32) -> Vec<u8> {
    let page = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(page).write_to(&mut bytes, ImageFormat::Png).expect("encode png");
    bytes.into_inner()
}

fn sub_question(id: &str, correct: &str) -> SubQuestion {
    SubQuestion {
        id: id.to_string(),
        prompt: format!("Pick the right option for {id}"),
        options: ["A", "B", "C", "D"].iter().map(|option| option.to_string()).collect(),
        correct_answer: Some(correct.to_string()),
        mark: 2.0,
    }
}

/// Four sub-questions worth 2 marks each; keys are s1=A, s2=B, s3=C, s4=D.
pub(crate) fn question_set() -> QuestionSet {
    QuestionSet {
        categories: vec![QuestionCategory {
            id: "cat-1".to_string(),
            title: "General".to_string(),
            questions: vec![
                Question {
                    id: "q-1".to_string(),
                    prompt: "First".to_string(),
                    sub_questions: vec![sub_question("s1", "A"), sub_question("s2", "B")],
                },
                Question {
                    id: "q-2".to_string(),
                    prompt: "Second".to_string(),
                    sub_questions: vec![sub_question("s3", "C"), sub_question("s4", "D")],
                },
            ],
        }],
    }
}

fn base_exam(id: &str, exam_type: ExamType) -> Exam {
    Exam {
        id: id.to_string(),
        title: format!("Exam {id}"),
        mode: ExamMode::Anytime,
        scheduled_date: None,
        scheduled_time: None,
        duration_minutes: 60,
        status: ExamStatus::Active,
        exam_type,
        min_pass_mark: 40.0,
        negative_mark: 0.0,
        result_published: false,
        question_set: None,
        created_by: "admin-1".to_string(),
        created_at: NOW,
        updated_at: NOW,
        published_at: None,
    }
}

pub(crate) fn scheduled_exam(id: &str, date: &str, time: &str, duration_minutes: i32) -> Exam {
    let mut exam = mcq_exam(id, 0.0);
    exam.mode = ExamMode::Scheduled;
    exam.scheduled_date = Some(date.to_string());
    exam.scheduled_time = Some(time.to_string());
    exam.duration_minutes = duration_minutes;
    exam
}

pub(crate) fn mcq_exam(id: &str, negative_mark: f64) -> Exam {
    let mut exam = base_exam(id, ExamType::Mcq);
    exam.negative_mark = negative_mark;
    exam.question_set = Some(Json(question_set()));
    exam
}

pub(crate) fn written_exam(id: &str) -> Exam {
    base_exam(id, ExamType::Written)
}

pub(crate) fn submission(id: &str, exam_id: &str, pages: &[&str]) -> Submission {
    Submission {
        id: id.to_string(),
        exam_id: exam_id.to_string(),
        student_id: format!("student-{id}"),
        answers: Json(BTreeMap::new()),
        answer_images: Json(pages.iter().map(|page| page.to_string()).collect()),
        evaluated_images: Json(Vec::new()),
        is_evaluated: false,
        total_marks: None,
        feedback: None,
        grade: None,
        evaluated_by: None,
        evaluated_at: None,
        evaluation_count: 0,
        revision: 0,
        submitted_at: NOW,
        updated_at: NOW,
    }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    user_id: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(user_id) = user_id {
        builder = builder.header(EVALUATOR_HEADER, user_id);
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

pub(crate) async fn read_bytes(response: axum::response::Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.expect("response body").to_vec()
}
