use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::users::repo_types::{now_millis, NewUser, ProfileUpdate, User, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A live record with the same email already exists.
    #[error("email already registered")]
    Conflict,

    #[error("record not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Internal(#[from] sqlx::Error),
}

/// Durable record of users, one live row per email.
///
/// Every operation touches a single record; callers must not hold an
/// in-process lock across these calls.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user and return its id. Email collisions surface as
    /// [`StoreError::Conflict`], detected by the unique index rather than a pre-check.
    async fn create(&self, user: NewUser) -> Result<UserId, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Partial update of the mutable fields. `password` must already be hashed.
    async fn update_by_id(&self, update: ProfileUpdate) -> Result<User, StoreError>;

    /// Soft delete.
    async fn delete_by_id(&self, id: UserId) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str = "id, email, password_hash, nickname, description, avatar, address, \
                            birth_day, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, user: NewUser) -> Result<UserId, StoreError> {
        let now = now_millis();
        let res = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (email, password_hash, nickname, description, avatar, address,
                               birth_day, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, 0)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.nickname)
        .bind(&user.description)
        .bind(&user.avatar)
        .bind(&user.address)
        .bind(user.birth_day)
        .bind(now)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                info!(email = %user.email, "email already registered");
                Err(StoreError::Conflict)
            }
            Err(e) => {
                warn!(error = %e, "insert user failed");
                Err(StoreError::Internal(e))
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at = 0"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            warn!(error = %e, "find user by email failed");
            StoreError::Internal(e)
        })?;
        user.ok_or(StoreError::NotFound)
    }

    async fn update_by_id(&self, update: ProfileUpdate) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                nickname      = COALESCE($2, nickname),
                description   = COALESCE($3, description),
                avatar        = COALESCE($4, avatar),
                address       = COALESCE($5, address),
                birth_day     = COALESCE($6, birth_day),
                password_hash = COALESCE($7, password_hash),
                updated_at    = $8
            WHERE id = $1 AND deleted_at = 0
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(update.id)
        .bind(&update.nickname)
        .bind(&update.description)
        .bind(&update.avatar)
        .bind(&update.address)
        .bind(update.birth_day)
        .bind(&update.password)
        .bind(now_millis())
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = update.id, "update user failed");
            StoreError::Internal(e)
        })?;
        user.ok_or(StoreError::NotFound)
    }

    async fn delete_by_id(&self, id: UserId) -> Result<(), StoreError> {
        let now = now_millis();
        let done = sqlx::query(
            r#"
            UPDATE users SET deleted_at = $2, updated_at = $2
            WHERE id = $1 AND deleted_at = 0
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = id, "delete user failed");
            StoreError::Internal(e)
        })?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
