use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tracing::{instrument, warn};

use super::{
    Code, DeleteUserRequest, Empty, GetUserByEmailRequest, GetUserByEmailResponse, LoginRequest,
    LoginResponse, RegisterRequest, RegisterResponse, Status, UpdateUserRequest,
    UpdateUserResponse, UserService, SERVICE_PATH,
};
use crate::users::{IdentityService, ProfileUpdate};

/// Server side of the user service, backed by the identity service.
///
/// Argument checks here are a backstop; the gateway validates formats first.
#[derive(Clone)]
pub struct UserHandler {
    identity: IdentityService,
}

impl UserHandler {
    pub fn new(identity: IdentityService) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl UserService for UserHandler {
    #[instrument(skip_all)]
    async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, Status> {
        if req.email.is_empty() || req.password.is_empty() {
            return Err(Status::invalid_argument("email and password are required"));
        }
        if req.password != req.confirm_password {
            return Err(Status::invalid_argument("passwords do not match"));
        }
        let user_id = self.identity.sign_up(&req.email, &req.password).await?;
        Ok(RegisterResponse { user_id })
    }

    #[instrument(skip_all)]
    async fn login(&self, req: LoginRequest) -> Result<LoginResponse, Status> {
        if req.email.is_empty() || req.password.is_empty() {
            return Err(Status::invalid_argument("email and password are required"));
        }
        let profile = self.identity.login(&req.email, &req.password).await?;
        Ok(LoginResponse {
            user_id: profile.id,
        })
    }

    #[instrument(skip_all)]
    async fn get_user_by_email(
        &self,
        req: GetUserByEmailRequest,
    ) -> Result<GetUserByEmailResponse, Status> {
        if req.email.is_empty() {
            return Err(Status::invalid_argument("email is required"));
        }
        let profile = self.identity.get_by_email(&req.email).await?;
        Ok(profile.into())
    }

    #[instrument(skip_all, fields(user_id = req.user_id))]
    async fn update_user(&self, req: UpdateUserRequest) -> Result<UpdateUserResponse, Status> {
        let update = ProfileUpdate {
            id: req.user_id,
            nickname: req.nickname,
            description: req.description,
            avatar: req.avatar,
            address: req.address,
            birth_day: req.birth_day,
            password: req.password,
        };
        let profile = self.identity.update_profile(req.actor_id, update).await?;
        Ok(UpdateUserResponse { profile })
    }

    #[instrument(skip_all, fields(user_id = req.user_id))]
    async fn delete_user(&self, req: DeleteUserRequest) -> Result<Empty, Status> {
        self.identity
            .delete_account(req.actor_id, req.user_id)
            .await?;
        Ok(Empty {})
    }
}

impl Code {
    /// HTTP status used when this code travels over HTTP.
    pub fn http_status(self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for Status {
    fn into_response(self) -> Response {
        if self.code == Code::Internal {
            warn!(message = %self.message, "rpc internal error");
        }
        (self.code.http_status(), Json(self)).into_response()
    }
}

type SharedService = Arc<dyn UserService>;

/// Internal RPC endpoints: `POST /users.v1.UserService/<Method>` with JSON bodies.
pub fn router(svc: SharedService) -> Router {
    Router::new()
        .route(&format!("{SERVICE_PATH}/Register"), post(register))
        .route(&format!("{SERVICE_PATH}/Login"), post(login))
        .route(&format!("{SERVICE_PATH}/GetUserByEmail"), post(get_user_by_email))
        .route(&format!("{SERVICE_PATH}/UpdateUser"), post(update_user))
        .route(&format!("{SERVICE_PATH}/DeleteUser"), post(delete_user))
        .route("/health", axum::routing::get(|| async { "ok" }))
        .with_state(svc)
}

async fn register(
    State(svc): State<SharedService>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, Status> {
    svc.register(req).await.map(Json)
}

async fn login(
    State(svc): State<SharedService>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Status> {
    svc.login(req).await.map(Json)
}

async fn get_user_by_email(
    State(svc): State<SharedService>,
    Json(req): Json<GetUserByEmailRequest>,
) -> Result<Json<GetUserByEmailResponse>, Status> {
    svc.get_user_by_email(req).await.map(Json)
}

async fn update_user(
    State(svc): State<SharedService>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UpdateUserResponse>, Status> {
    svc.update_user(req).await.map(Json)
}

async fn delete_user(
    State(svc): State<SharedService>,
    Json(req): Json<DeleteUserRequest>,
) -> Result<Json<Empty>, Status> {
    svc.delete_user(req).await.map(Json)
}

#[cfg(test)]
pub(crate) fn test_handler() -> UserHandler {
    let (identity, _) = crate::users::services::test_identity();
    UserHandler::new(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn register_req(email: &str, pw: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: pw.into(),
            confirm_password: confirm.into(),
        }
    }

    #[tokio::test]
    async fn register_login_lookup_scenario() {
        let h = test_handler();
        let reg = h
            .register(register_req("a@x.com", "Passw0rd!", "Passw0rd!"))
            .await
            .expect("register");
        assert_eq!(reg.user_id, 1);

        let dup = h
            .register(register_req("a@x.com", "Passw0rd!", "Passw0rd!"))
            .await
            .unwrap_err();
        assert_eq!(dup.code, Code::AlreadyExists);

        let login = h
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: "Passw0rd!".into(),
            })
            .await
            .expect("login");
        assert_eq!(login.user_id, reg.user_id);

        let bad = h
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(bad.code, Code::Unauthenticated);

        let profile = h
            .get_user_by_email(GetUserByEmailRequest {
                email: "a@x.com".into(),
            })
            .await
            .expect("lookup");
        assert_eq!(profile.email, "a@x.com");
        let json = serde_json::to_string(&profile).expect("serialize");
        assert!(!json.to_lowercase().contains("password"));
    }

    #[tokio::test]
    async fn argument_checks() {
        let h = test_handler();
        for req in [
            register_req("", "Passw0rd!", "Passw0rd!"),
            register_req("a@x.com", "", ""),
            register_req("a@x.com", "Passw0rd!", "Passw0rd?"),
        ] {
            assert_eq!(h.register(req).await.unwrap_err().code, Code::InvalidArgument);
        }
        let err = h
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        let err = h
            .get_user_by_email(GetUserByEmailRequest { email: String::new() })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let h = test_handler();
        let err = h
            .login(LoginRequest {
                email: "nobody@x.com".into(),
                password: "Passw0rd!".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::NotFound);
        let err = h
            .get_user_by_email(GetUserByEmailRequest {
                email: "nobody@x.com".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn update_and_delete_enforce_ownership() {
        let h = test_handler();
        let a = h
            .register(register_req("a@x.com", "Passw0rd!", "Passw0rd!"))
            .await
            .expect("a")
            .user_id;
        let b = h
            .register(register_req("b@x.com", "Passw0rd!", "Passw0rd!"))
            .await
            .expect("b")
            .user_id;

        let err = h
            .update_user(UpdateUserRequest {
                actor_id: b,
                user_id: a,
                nickname: Some("mallory".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::PermissionDenied);

        let ok = h
            .update_user(UpdateUserRequest {
                actor_id: a,
                user_id: a,
                nickname: Some("ann".into()),
                ..Default::default()
            })
            .await
            .expect("own update");
        assert_eq!(ok.profile.nickname.as_deref(), Some("ann"));

        h.delete_user(DeleteUserRequest { actor_id: a, user_id: a })
            .await
            .expect("delete");
        let err = h
            .delete_user(DeleteUserRequest { actor_id: a, user_id: a })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn router_maps_status_to_http() {
        let app = router(Arc::new(test_handler()));
        let body = serde_json::json!({"email": "", "password": "x", "confirmPassword": "x"});
        let res = app
            .oneshot(
                axum::http::Request::post(format!("{SERVICE_PATH}/Register"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = res.into_body().collect().await.expect("body").to_bytes();
        let status: Status = serde_json::from_slice(&bytes).expect("status body");
        assert_eq!(status.code, Code::InvalidArgument);
    }
}
