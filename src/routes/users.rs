use std::future::Future;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::error::{ok, ApiError, ApiResult, Envelope};
use crate::{
    auth::extractors::CurrentSession,
    rpc::{
        Code, DeleteUserRequest, GetUserByEmailRequest, GetUserByEmailResponse, LoginRequest,
        RegisterRequest, Status, UpdateUserRequest,
    },
    state::AppState,
    users::{Profile, UserId},
};

pub const TOKEN_HEADER: &str = "x-jwt-token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdResponse {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct InfoQuery {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub birth_day: Option<i64>,
    pub password: Option<String>,
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

/// 8 to 64 characters with at least one letter and one digit.
fn is_strong_password(password: &str) -> bool {
    let len = password.chars().count();
    (8..=64).contains(&len)
        && password.chars().any(|c| c.is_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users/signup", post(sign_up))
        .route("/v1/users/login", post(login))
        .route("/v1/users/logout", post(logout))
        .route("/v1/users/info", get(info))
        .route("/v1/users/profile", put(update_profile))
        .route("/v1/users/me", delete(delete_me))
}

/// Bounds a user service call by the configured RPC timeout. On expiry the
/// call future is dropped.
async fn rpc<T>(
    state: &AppState,
    call: impl Future<Output = Result<T, Status>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(state.config.rpc_timeout(), call).await {
        Ok(res) => res.map_err(ApiError::from),
        Err(_) => {
            warn!(timeout_ms = state.config.rpc_timeout_ms, "user service call timed out");
            Err(Status::deadline_exceeded().into())
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(mut payload): Json<SignUpRequest>,
) -> ApiResult<UserIdResponse> {
    payload.email = payload.email.trim().to_owned();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::bad_request("invalid email"));
    }
    if !is_strong_password(&payload.password) {
        warn!("weak password");
        return Err(ApiError::bad_request(
            "password must be 8-64 characters with at least one letter and one digit",
        ));
    }
    if payload.password != payload.confirm_password {
        return Err(ApiError::bad_request("passwords do not match"));
    }

    let res = rpc(
        &state,
        state.users.register(RegisterRequest {
            email: payload.email.clone(),
            password: payload.password,
            confirm_password: payload.confirm_password,
        }),
    )
    .await?;

    info!(user_id = res.user_id, email = %payload.email, "user signed up");
    ok(UserIdResponse {
        user_id: res.user_id,
    })
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginForm>,
) -> Result<impl IntoResponse, ApiError> {
    payload.email = payload.email.trim().to_owned();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::bad_request("invalid email"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("password is required"));
    }

    let res = rpc(
        &state,
        state.users.login(LoginRequest {
            email: payload.email.clone(),
            password: payload.password,
        }),
    )
    .await
    .map_err(|e| match e.code {
        Code::NotFound | Code::Unauthenticated => {
            warn!(email = %payload.email, "login failed");
            ApiError::new(Code::Unauthenticated, "invalid email or password")
        }
        _ => e,
    })?;

    let issued = state.sessions.issue(res.user_id).map_err(|e| {
        error!(error = %e, "session issue failed");
        ApiError::internal()
    })?;

    info!(user_id = res.user_id, session_id = %issued.session_id, "user logged in");
    Ok((
        [(TOKEN_HEADER, issued.token)],
        Json(Envelope::ok(UserIdResponse {
            user_id: res.user_id,
        })),
    ))
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn logout(
    State(state): State<AppState>,
    session: CurrentSession,
) -> ApiResult<UserIdResponse> {
    state
        .sessions
        .revoke(&session.session_id, session.expires_at)
        .await
        .map_err(|e| {
            error!(error = %e, "logout failed");
            ApiError::internal()
        })?;
    info!(session_id = %session.session_id, "user logged out");
    ok(UserIdResponse {
        user_id: session.user_id,
    })
}

#[instrument(skip(state, _session, query))]
pub async fn info(
    State(state): State<AppState>,
    _session: CurrentSession,
    Query(query): Query<InfoQuery>,
) -> ApiResult<GetUserByEmailResponse> {
    let email = query.email.trim();
    if !is_valid_email(email) {
        return Err(ApiError::bad_request("invalid email"));
    }
    let profile = rpc(
        &state,
        state.users.get_user_by_email(GetUserByEmailRequest {
            email: email.to_owned(),
        }),
    )
    .await?;
    ok(profile)
}

#[instrument(skip(state, session, payload), fields(user_id = session.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(payload): Json<ProfileForm>,
) -> ApiResult<Profile> {
    if let Some(pw) = &payload.password {
        if !is_strong_password(pw) {
            return Err(ApiError::bad_request(
                "password must be 8-64 characters with at least one letter and one digit",
            ));
        }
    }

    let res = rpc(
        &state,
        state.users.update_user(UpdateUserRequest {
            actor_id: session.user_id,
            user_id: session.user_id,
            nickname: payload.nickname,
            description: payload.description,
            avatar: payload.avatar,
            address: payload.address,
            birth_day: payload.birth_day,
            password: payload.password,
        }),
    )
    .await?;
    ok(res.profile)
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn delete_me(
    State(state): State<AppState>,
    session: CurrentSession,
) -> ApiResult<UserIdResponse> {
    rpc(
        &state,
        state.users.delete_user(DeleteUserRequest {
            actor_id: session.user_id,
            user_id: session.user_id,
        }),
    )
    .await?;

    // the account is gone either way; a failed revoke only leaves the token to expire
    if let Err(e) = state
        .sessions
        .revoke(&session.session_id, session.expires_at)
        .await
    {
        error!(error = %e, "revoke after account deletion failed");
    }
    info!("account deleted");
    ok(UserIdResponse {
        user_id: session.user_id,
    })
}
