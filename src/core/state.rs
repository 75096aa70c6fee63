use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::core::time::Clock;
use crate::repositories::{ExamStore, SubmissionStore};
use crate::services::annotation::AnnotationLimits;
use crate::services::storage::ImageStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

/// Collaborators the engine talks to; swapped for in-memory versions in tests.
pub(crate) struct Backends {
    pub(crate) exams: Arc<dyn ExamStore>,
    pub(crate) submissions: Arc<dyn SubmissionStore>,
    pub(crate) images: Option<Arc<dyn ImageStore>>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Only used by the health check.
    pub(crate) db: Option<PgPool>,
}

struct InnerState {
    settings: Settings,
    backends: Backends,
}

impl AppState {
    pub(crate) fn new(settings: Settings, backends: Backends) -> Self {
        Self { inner: Arc::new(InnerState { settings, backends }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn exams(&self) -> &dyn ExamStore {
        self.inner.backends.exams.as_ref()
    }

    pub(crate) fn submissions(&self) -> &dyn SubmissionStore {
        self.inner.backends.submissions.as_ref()
    }

    pub(crate) fn images(&self) -> Option<&dyn ImageStore> {
        self.inner.backends.images.as_deref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.inner.backends.clock.as_ref()
    }

    pub(crate) fn db(&self) -> Option<&PgPool> {
        self.inner.backends.db.as_ref()
    }

    pub(crate) fn annotation_limits(&self) -> AnnotationLimits {
        AnnotationLimits::from(self.settings().evaluation())
    }
}
