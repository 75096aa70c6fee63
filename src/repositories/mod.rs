//! Persistence seams for the evaluation engine.
//!
//! Services only talk to [`ExamStore`] and [`SubmissionStore`]; [`PgRepository`]
//! backs both with PostgreSQL.

pub(crate) mod exams;
pub(crate) mod submissions;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Exam, Submission};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record not found: {0}")]
    Missing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveOutcome {
    Saved,
    /// The stored revision no longer matches the one the caller read.
    Stale,
}

#[async_trait]
pub(crate) trait ExamStore: Send + Sync {
    async fn load_exam(&self, id: &str) -> Result<Option<Exam>, StoreError>;

    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError>;

    /// Persists editable fields. Never changes `result_published`.
    async fn update_exam(&self, exam: &Exam) -> Result<(), StoreError>;

    /// Returns true when this call flipped the flag; the flag never goes back
    /// to false through this method.
    async fn set_exam_published(
        &self,
        id: &str,
        published: bool,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub(crate) trait SubmissionStore: Send + Sync {
    async fn load_submission(&self, id: &str) -> Result<Option<Submission>, StoreError>;

    async fn list_submissions(&self, exam_id: &str) -> Result<Vec<Submission>, StoreError>;

    /// Writes `submission` only if the stored revision still equals
    /// `expected_revision`.
    async fn save_submission(
        &self,
        submission: &Submission,
        expected_revision: i64,
    ) -> Result<SaveOutcome, StoreError>;
}

#[derive(Debug, Clone)]
pub(crate) struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamStore for PgRepository {
    async fn load_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(exams::find_by_id(&self.pool, id).await?)
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        Ok(exams::insert(&self.pool, exam).await?)
    }

    async fn update_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        if exams::update_editable(&self.pool, exam).await? {
            Ok(())
        } else {
            Err(StoreError::Missing(format!("exam {}", exam.id)))
        }
    }

    async fn set_exam_published(
        &self,
        id: &str,
        published: bool,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(exams::set_published(&self.pool, id, published, now).await?)
    }
}

#[async_trait]
impl SubmissionStore for PgRepository {
    async fn load_submission(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        Ok(submissions::find_by_id(&self.pool, id).await?)
    }

    async fn list_submissions(&self, exam_id: &str) -> Result<Vec<Submission>, StoreError> {
        Ok(submissions::list_by_exam(&self.pool, exam_id).await?)
    }

    async fn save_submission(
        &self,
        submission: &Submission,
        expected_revision: i64,
    ) -> Result<SaveOutcome, StoreError> {
        if submissions::save_if_revision(&self.pool, submission, expected_revision).await? {
            Ok(SaveOutcome::Saved)
        } else {
            Ok(SaveOutcome::Stale)
        }
    }
}
