use std::{
    collections::{hash_map::RandomState, HashMap},
    hash::BuildHasher,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Negative cache of explicitly ended sessions.
///
/// Absence means "not revoked", not "exists". Entries only need to outlive the
/// token they block, so each one carries its own expiry.
#[async_trait]
pub trait RevocationList: Send + Sync {
    async fn revoke(&self, session_id: &str, ttl: Duration) -> anyhow::Result<()>;

    async fn is_revoked(&self, session_id: &str) -> anyhow::Result<bool>;

    /// Drops entries whose token can no longer be valid. Returns how many went.
    async fn purge_expired(&self) -> anyhow::Result<usize>;
}

const SHARDS: usize = 16;
const PURGE_BATCH: usize = 1024;

type Shard = RwLock<HashMap<String, OffsetDateTime>>;

/// Process-local revocation list.
///
/// Entries are spread over independently locked shards. A lookup only touches
/// one shard, and purging removes entries in small batches, so a reader never
/// waits behind a whole sweep.
pub struct MemoryRevocationList {
    shards: Box<[Shard]>,
    hasher: RandomState,
}

impl Default for MemoryRevocationList {
    fn default() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Shard::default()).collect(),
            hasher: RandomState::new(),
        }
    }
}

impl MemoryRevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, session_id: &str) -> &Shard {
        let idx = self.hasher.hash_one(session_id) as usize % self.shards.len();
        &self.shards[idx]
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }
}

#[async_trait]
impl RevocationList for MemoryRevocationList {
    async fn revoke(&self, session_id: &str, ttl: Duration) -> anyhow::Result<()> {
        let until = OffsetDateTime::now_utc() + ttl;
        self.shard(session_id)
            .write()
            .insert(session_id.to_owned(), until);
        Ok(())
    }

    async fn is_revoked(&self, session_id: &str) -> anyhow::Result<bool> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .shard(session_id)
            .read()
            .get(session_id)
            .is_some_and(|until| *until > now))
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = OffsetDateTime::now_utc();
        let mut purged = 0;
        for shard in self.shards.iter() {
            // collected under the shared lock; readers are not held up
            let expired: Vec<String> = shard
                .read()
                .iter()
                .filter(|(_, until)| **until <= now)
                .map(|(sid, _)| sid.clone())
                .collect();

            for batch in expired.chunks(PURGE_BATCH) {
                {
                    let mut entries = shard.write();
                    for sid in batch {
                        // a re-revoke since the scan may have pushed the expiry out
                        if entries.get(sid).is_some_and(|until| *until <= now) {
                            entries.remove(sid);
                            purged += 1;
                        }
                    }
                }
                tokio::task::yield_now().await;
            }
        }
        Ok(purged)
    }
}

/// Revocation list in Postgres, shared by every gateway instance on the database.
#[derive(Clone)]
pub struct PgRevocationList {
    db: PgPool,
}

impl PgRevocationList {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RevocationList for PgRevocationList {
    async fn revoke(&self, session_id: &str, ttl: Duration) -> anyhow::Result<()> {
        let until = (OffsetDateTime::now_utc() + ttl).unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO revoked_sessions (session_id, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (session_id) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(session_id)
        .bind(until)
        .execute(&self.db)
        .await
        .context("insert revoked session")?;
        Ok(())
    }

    async fn is_revoked(&self, session_id: &str) -> anyhow::Result<bool> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let revoked = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM revoked_sessions
                 WHERE session_id = $1 AND expires_at > $2
            )
            "#,
        )
        .bind(session_id)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .context("check revoked session")?;
        Ok(revoked)
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let done = sqlx::query("DELETE FROM revoked_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await
            .context("purge revoked sessions")?;
        Ok(done.rows_affected() as usize)
    }
}

/// Periodically evicts revocation entries that have outlived their tokens.
pub fn spawn_purger(
    list: Arc<dyn RevocationList>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match list.purge_expired().await {
                Ok(0) => {}
                Ok(n) => debug!(purged = n, "revocation entries purged"),
                Err(e) => warn!(error = %e, "revocation purge failed"),
            }
        }
    })
}
