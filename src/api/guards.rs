use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::errors::ApiError;

/// Header set by the upstream gateway once it has authenticated the caller.
pub(crate) const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the mentor or admin performing an evaluation action.
#[derive(Debug, Clone)]
pub(crate) struct Evaluator(pub(crate) String);

#[async_trait]
impl<S> FromRequestParts<S> for Evaluator
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthorized("Missing evaluator identity"))?;

        Ok(Evaluator(user_id.to_string()))
    }
}
