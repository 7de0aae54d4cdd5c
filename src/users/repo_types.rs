use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type UserId = i64;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2id PHC string, never exposed
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub birth_day: Option<i64>,
    pub created_at: i64, // unix millis
    pub updated_at: i64,
    pub deleted_at: i64, // 0 while the account is alive
}

/// Fields accepted when creating a user. The hash is computed by the caller.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub birth_day: Option<i64>,
}

/// Partial update keyed by `id`. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub id: UserId,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub birth_day: Option<i64>,
    /// Plain text on the way into the identity service, a hash on the way into the store.
    pub password: Option<String>,
}

/// Public projection of a user; carries no credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub birth_day: Option<i64>,
}

impl From<User> for Profile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            nickname: u.nickname,
            description: u.description,
            avatar: u.avatar,
            address: u.address,
            birth_day: u.birth_day,
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
