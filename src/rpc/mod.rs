//! Collaborator-facing user service contract.
//!
//! The same [`UserService`] trait is implemented by the in-process
//! [`server::UserHandler`] and by the network client
//! [`client::RemoteUserService`], so the gateway does not care where the
//! identity service runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::users::{IdentityError, Profile, UserId};

pub mod client;
pub mod server;

pub const SERVICE_PATH: &str = "/users.v1.UserService";

/// Status codes, numbered like gRPC's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Code {
    Ok = 0,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    Internal = 13,
    Unavailable = 14,
    Unauthenticated = 16,
}

impl From<Code> for i32 {
    fn from(c: Code) -> Self {
        c as i32
    }
}

impl TryFrom<i32> for Code {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Code::Ok,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            13 => Code::Internal,
            14 => Code::Unavailable,
            16 => Code::Unauthenticated,
            other => return Err(format!("unknown status code {other}")),
        })
    }
}

/// Error half of every RPC result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn internal() -> Self {
        Self::new(Code::Internal, "internal error")
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(Code::DeadlineExceeded, "deadline exceeded")
    }
}

impl From<IdentityError> for Status {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidArgument(msg) => Status::invalid_argument(msg),
            IdentityError::AlreadyExists => Status::new(Code::AlreadyExists, "user already exists"),
            IdentityError::NotFound => Status::new(Code::NotFound, "user not found"),
            IdentityError::InvalidCredentials => {
                Status::new(Code::Unauthenticated, "invalid credentials")
            }
            IdentityError::PermissionDenied => Status::new(Code::PermissionDenied, "permission denied"),
            IdentityError::Internal(_) => Status::internal(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserByEmailRequest {
    pub email: String,
}

/// Profile fields only; no id and nothing derived from the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserByEmailResponse {
    pub email: String,
    pub nickname: Option<String>,
    pub birth_day: Option<i64>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

impl From<Profile> for GetUserByEmailResponse {
    fn from(p: Profile) -> Self {
        Self {
            email: p.email,
            nickname: p.nickname,
            birth_day: p.birth_day,
            address: p.address,
            description: p.description,
            avatar: p.avatar,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    /// Authenticated caller; must match `user_id`.
    pub actor_id: UserId,
    pub user_id: UserId,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub birth_day: Option<i64>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserResponse {
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUserRequest {
    pub actor_id: UserId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[async_trait]
pub trait UserService: Send + Sync {
    async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, Status>;

    async fn login(&self, req: LoginRequest) -> Result<LoginResponse, Status>;

    async fn get_user_by_email(
        &self,
        req: GetUserByEmailRequest,
    ) -> Result<GetUserByEmailResponse, Status>;

    async fn update_user(&self, req: UpdateUserRequest) -> Result<UpdateUserResponse, Status>;

    async fn delete_user(&self, req: DeleteUserRequest) -> Result<Empty, Status>;
}
