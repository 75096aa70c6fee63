use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::StoreError;
use crate::services::annotation::AnnotationError;
use crate::services::evaluation::EvaluationError;
use crate::services::exam_editor::ExamInputError;
use crate::services::publication::PublicationError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UnprocessableEntity(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) => message.to_string(),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                message
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::UnprocessableEntity(message) => message,
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing(what) => ApiError::NotFound(format!("{what} not found")),
            StoreError::Database(err) => ApiError::internal(err, "Database operation failed"),
        }
    }
}

impl From<EvaluationError> for ApiError {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::SubmissionNotFound(_) | EvaluationError::ExamNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            EvaluationError::AlreadyEvaluated
            | EvaluationError::Conflict
            | EvaluationError::ReadOnly => ApiError::Conflict(err.to_string()),
            EvaluationError::IncompleteEvaluation(_) | EvaluationError::MissingAnswerKey => {
                ApiError::UnprocessableEntity(err.to_string())
            }
            EvaluationError::InvalidPayload(message) => ApiError::BadRequest(message),
            EvaluationError::Annotation(AnnotationError::PageOutOfRange { .. }) => {
                ApiError::NotFound(err.to_string())
            }
            EvaluationError::Annotation(AnnotationError::Render(render)) => {
                ApiError::internal(render, "Failed to render answer page")
            }
            EvaluationError::Annotation(other) => ApiError::BadRequest(other.to_string()),
            EvaluationError::StorageUnavailable => ApiError::ServiceUnavailable(err.to_string()),
            EvaluationError::Storage(storage) => {
                ApiError::internal(format!("{storage:#}"), "Image storage request failed")
            }
            EvaluationError::Store(store) => store.into(),
        }
    }
}

impl From<PublicationError> for ApiError {
    fn from(err: PublicationError) -> Self {
        match err {
            PublicationError::ExamNotFound(_) | PublicationError::SubmissionNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            PublicationError::Store(store) => store.into(),
        }
    }
}

impl From<ExamInputError> for ApiError {
    fn from(err: ExamInputError) -> Self {
        match err {
            ExamInputError::ExamNotFound(_) => ApiError::NotFound(err.to_string()),
            ExamInputError::Store(store) => store.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
