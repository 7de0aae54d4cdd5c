use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::users::{
    repo::{CredentialStore, StoreError},
    repo_types::{now_millis, NewUser, ProfileUpdate, User, UserId},
};

#[derive(Default)]
struct Inner {
    next_id: UserId,
    rows: HashMap<UserId, User>,
    live_by_email: HashMap<String, UserId>,
}

/// In-process [`CredentialStore`] for tests and local runs.
///
/// Check-and-insert happens under one lock acquisition, which gives the same
/// one-winner guarantee as the unique index in Postgres.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows including soft-deleted ones.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, user: NewUser) -> Result<UserId, StoreError> {
        let mut inner = self.inner.lock();
        if inner.live_by_email.contains_key(&user.email) {
            return Err(StoreError::Conflict);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        let now = now_millis();
        inner.live_by_email.insert(user.email.clone(), id);
        inner.rows.insert(
            id,
            User {
                id,
                email: user.email,
                password_hash: user.password_hash,
                nickname: user.nickname,
                description: user.description,
                avatar: user.avatar,
                address: user.address,
                birth_day: user.birth_day,
                created_at: now,
                updated_at: now,
                deleted_at: 0,
            },
        );
        Ok(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let inner = self.inner.lock();
        inner
            .live_by_email
            .get(email)
            .and_then(|id| inner.rows.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_by_id(&self, update: ProfileUpdate) -> Result<User, StoreError> {
        let mut inner = self.inner.lock();
        let row = inner
            .rows
            .get_mut(&update.id)
            .filter(|u| u.deleted_at == 0)
            .ok_or(StoreError::NotFound)?;

        if let Some(v) = update.nickname {
            row.nickname = Some(v);
        }
        if let Some(v) = update.description {
            row.description = Some(v);
        }
        if let Some(v) = update.avatar {
            row.avatar = Some(v);
        }
        if let Some(v) = update.address {
            row.address = Some(v);
        }
        if let Some(v) = update.birth_day {
            row.birth_day = Some(v);
        }
        if let Some(v) = update.password {
            row.password_hash = v;
        }
        row.updated_at = now_millis();
        Ok(row.clone())
    }

    async fn delete_by_id(&self, id: UserId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let row = inner
            .rows
            .get_mut(&id)
            .filter(|u| u.deleted_at == 0)
            .ok_or(StoreError::NotFound)?;
        let now = now_millis();
        row.deleted_at = now;
        row.updated_at = now;
        let email = row.email.clone();
        inner.live_by_email.remove(&email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "$argon2id$fake".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids_and_rejects_duplicates() {
        let store = MemoryCredentialStore::new();
        let a = store.create(new_user("a@x.com")).await.expect("first insert");
        let b = store.create(new_user("b@x.com")).await.expect("second insert");
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        let err = store.create(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn email_match_is_case_sensitive() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("a@x.com")).await.expect("insert");
        store.create(new_user("A@x.com")).await.expect("different case is a different email");
        assert!(matches!(
            store.find_by_email("A@X.COM").await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn concurrent_creates_for_one_email_have_a_single_winner() {
        let store = Arc::new(MemoryCredentialStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(new_user("race@x.com")).await
            }));
        }
        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.expect("task joins") {
                Ok(_) => ok += 1,
                Err(StoreError::Conflict) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_is_partial_and_refreshes_updated_at() {
        let store = MemoryCredentialStore::new();
        let id = store.create(new_user("a@x.com")).await.expect("insert");
        let before = store.find_by_email("a@x.com").await.expect("found");

        let after = store
            .update_by_id(ProfileUpdate {
                id,
                nickname: Some("ann".into()),
                ..Default::default()
            })
            .await
            .expect("update");
        assert_eq!(after.nickname.as_deref(), Some("ann"));
        assert_eq!(after.password_hash, before.password_hash);
        assert_eq!(after.email, "a@x.com");
        assert!(after.updated_at >= before.updated_at);

        let err = store
            .update_by_id(ProfileUpdate { id: 99, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn soft_delete_hides_record_and_frees_the_email() {
        let store = MemoryCredentialStore::new();
        let id = store.create(new_user("a@x.com")).await.expect("insert");
        store.delete_by_id(id).await.expect("delete");

        assert!(matches!(
            store.find_by_email("a@x.com").await.unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(store.delete_by_id(id).await.unwrap_err(), StoreError::NotFound));
        assert!(matches!(
            store
                .update_by_id(ProfileUpdate { id, ..Default::default() })
                .await
                .unwrap_err(),
            StoreError::NotFound
        ));

        let again = store.create(new_user("a@x.com")).await.expect("email reusable");
        assert_ne!(again, id);
        assert_eq!(store.len(), 2);
    }
}
