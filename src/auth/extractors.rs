use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{routes::error::ApiError, users::UserId};

/// The authenticated session of the current request.
///
/// Put into the request extensions by [`super::middleware::require_session`];
/// it lives and dies with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSession {
    pub user_id: UserId,
    pub session_id: String,
    pub expires_at: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or_else(ApiError::unauthorized)
    }
}
