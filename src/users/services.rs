use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::users::{
    password::PasswordHasher,
    repo::{CredentialStore, StoreError},
    repo_types::{NewUser, Profile, ProfileUpdate, UserId},
};

/// Transport-agnostic outcomes of identity operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("user already exists")]
    AlreadyExists,

    #[error("user not found")]
    NotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("not allowed to modify another user's account")]
    PermissionDenied,

    /// Detail stays in the server log; the message is all a caller ever sees.
    #[error("internal error")]
    Internal(String),
}

impl IdentityError {
    fn internal(ctx: &str, e: impl std::fmt::Display) -> Self {
        error!(error = %e, "{ctx}");
        IdentityError::Internal(format!("{ctx}: {e}"))
    }
}

impl From<StoreError> for IdentityError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => IdentityError::AlreadyExists,
            StoreError::NotFound => IdentityError::NotFound,
            StoreError::Internal(e) => IdentityError::internal("credential store failure", e),
        }
    }
}

/// Registration, login and profile management on top of a [`CredentialStore`].
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
}

impl IdentityService {
    pub fn new(store: Arc<dyn CredentialStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Callers validate that email and password are non-empty.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, IdentityError> {
        let password_hash = self
            .hasher
            .hash(password.to_owned())
            .await
            .map_err(|e| IdentityError::internal("hash password", e))?;

        let id = self
            .store
            .create(NewUser {
                email: email.to_owned(),
                password_hash,
                ..Default::default()
            })
            .await?;
        info!(user_id = id, "user registered");
        Ok(id)
    }

    /// Unknown email and wrong password both pay for one hash verification.
    pub async fn login(&self, email: &str, password: &str) -> Result<Profile, IdentityError> {
        let user = match self.store.find_by_email(email).await {
            Ok(u) => u,
            Err(StoreError::NotFound) => {
                self.hasher
                    .verify_dummy(password.to_owned())
                    .await
                    .map_err(|e| IdentityError::internal("verify password", e))?;
                debug!("login for unknown email");
                return Err(IdentityError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let ok = self
            .hasher
            .verify(password.to_owned(), user.password_hash.clone())
            .await
            .map_err(|e| IdentityError::internal("verify password", e))?;
        if !ok {
            warn!(user_id = user.id, "login with invalid password");
            return Err(IdentityError::InvalidCredentials);
        }

        info!(user_id = user.id, "user logged in");
        Ok(user.into())
    }

    /// Only the owner may update a record. A supplied password is re-hashed,
    /// otherwise the stored hash stays as it is.
    pub async fn update_profile(
        &self,
        actor: UserId,
        mut update: ProfileUpdate,
    ) -> Result<Profile, IdentityError> {
        if actor != update.id {
            warn!(actor, target = update.id, "profile update denied");
            return Err(IdentityError::PermissionDenied);
        }
        if let Some(plain) = update.password.take() {
            if plain.is_empty() {
                return Err(IdentityError::InvalidArgument("password must not be empty"));
            }
            let hash = self
                .hasher
                .hash(plain)
                .await
                .map_err(|e| IdentityError::internal("hash password", e))?;
            update.password = Some(hash);
        }

        let user = self.store.update_by_id(update).await?;
        info!(user_id = user.id, "profile updated");
        Ok(user.into())
    }

    pub async fn delete_account(&self, actor: UserId, id: UserId) -> Result<(), IdentityError> {
        if actor != id {
            warn!(actor, target = id, "account deletion denied");
            return Err(IdentityError::PermissionDenied);
        }
        self.store.delete_by_id(id).await?;
        info!(user_id = id, "account deleted");
        Ok(())
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Profile, IdentityError> {
        Ok(self.store.find_by_email(email).await?.into())
    }
}

#[cfg(test)]
pub(crate) fn test_identity() -> (IdentityService, Arc<crate::users::memory::MemoryCredentialStore>) {
    let store = Arc::new(crate::users::memory::MemoryCredentialStore::new());
    let svc = IdentityService::new(store.clone(), crate::users::password::test_hasher());
    (svc, store)
}
