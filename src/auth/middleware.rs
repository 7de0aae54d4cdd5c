use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::extractors::CurrentSession;
use crate::{
    routes::{error::ApiError, users::TOKEN_HEADER},
    state::AppState,
};

/// Lets allow-listed paths through and demands a live session everywhere else.
///
/// The token is read from `Authorization: Bearer`, or from `x-jwt-token` when
/// that is absent.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_owned();
    if state.public_paths.iter().any(|p| *p == path) {
        return Ok(next.run(req).await);
    }

    let headers = req.headers();
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .or_else(|| {
            // the header login hands the token out in
            headers
                .get(TOKEN_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
        .ok_or_else(|| {
            warn!(%path, "missing session token");
            ApiError::unauthorized()
        })?;

    let claims = state.sessions.verify(token).await.map_err(|e| {
        warn!(error = %e, %path, "session rejected");
        ApiError::unauthorized()
    })?;

    req.extensions_mut().insert(CurrentSession {
        user_id: claims.sub,
        session_id: claims.sid,
        expires_at: claims.exp,
    });
    Ok(next.run(req).await)
}

fn bearer_token(header: &str) -> Option<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic dXNlcjpwdw=="), None);
        assert_eq!(bearer_token("abc.def.ghi"), None);
    }
}
