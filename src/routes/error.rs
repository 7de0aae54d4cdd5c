use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::rpc::{Code, Status};

/// Body of every gateway response. `code` is 0 on success, otherwise the
/// numeric status code of the failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: Code::Ok.into(),
            msg: "ok".into(),
            data: Some(data),
        }
    }
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(data)))
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{status} {msg}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Code,
    pub msg: String,
}

impl ApiError {
    pub fn new(code: Code, msg: impl Into<String>) -> Self {
        Self {
            status: code.http_status(),
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(Code::Unauthenticated, "unauthorized")
    }

    pub fn internal() -> Self {
        Self::new(Code::Internal, "internal error")
    }
}

impl From<Status> for ApiError {
    fn from(s: Status) -> Self {
        if s.code == Code::Internal {
            error!(message = %s.message, "user service internal error");
            return Self::internal();
        }
        Self::new(s.code, s.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            code: self.code.into(),
            msg: self.msg,
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_http() {
        let cases = [
            (Code::InvalidArgument, StatusCode::BAD_REQUEST),
            (Code::Unauthenticated, StatusCode::UNAUTHORIZED),
            (Code::PermissionDenied, StatusCode::FORBIDDEN),
            (Code::NotFound, StatusCode::NOT_FOUND),
            (Code::DeadlineExceeded, StatusCode::REQUEST_TIMEOUT),
            (Code::AlreadyExists, StatusCode::CONFLICT),
            (Code::Internal, StatusCode::INTERNAL_SERVER_ERROR),
            (Code::Unavailable, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (code, http) in cases {
            let err = ApiError::from(Status::new(code, "x"));
            assert_eq!(err.status, http);
            assert_eq!(err.code, code);
        }
    }

    #[test]
    fn internal_detail_is_dropped() {
        let err = ApiError::from(Status::new(Code::Internal, "pq: relation users missing"));
        assert_eq!(err.msg, "internal error");
    }

    #[test]
    fn envelope_shape() {
        let json = serde_json::to_value(Envelope::ok(serde_json::json!({"userId": 1})))
            .expect("serialize");
        assert_eq!(json["code"], 0);
        assert_eq!(json["msg"], "ok");
        assert_eq!(json["data"]["userId"], 1);

        let err = serde_json::to_value(Envelope::<()> {
            code: 6,
            msg: "user already exists".into(),
            data: None,
        })
        .expect("serialize");
        assert!(err.get("data").is_none());
    }
}
