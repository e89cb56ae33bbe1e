use async_trait::async_trait;
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{StorageError, StorageResult},
    runner::ReportRunner,
};

/// One user's workspace: credential, report, transcript and chat session,
/// all held by its runner.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub runner: ReportRunner,
}

impl Session {
    pub fn new(runner: ReportRunner) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            runner,
        }
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> StorageResult<()>;
    async fn get(&self, id: &str) -> StorageResult<Option<Session>>;
    async fn delete(&self, id: &str) -> StorageResult<()>;

    async fn require(&self, id: &str) -> StorageResult<Session> {
        self.get(id)
            .await?
            .ok_or_else(|| StorageError::SessionNotFound(id.to_string()))
    }
}

/// Sessions untouched for this long are dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct StoredSession {
    session: Session,
    last_access: Instant,
}

/// In-memory implementation of SessionStorage. Sessions do not survive a
/// restart, and idle ones are evicted on the next save or lookup.
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, StoredSession>>,
    idle_timeout: Duration,
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session idle for longer than the timeout. Returns how many
    /// were removed.
    pub fn evict_idle(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, stored| stored.last_access.elapsed() <= self.idle_timeout);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!("Evicted {} idle sessions", evicted);
        }
        evicted
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> StorageResult<()> {
        self.evict_idle();
        self.sessions.insert(
            session.id.clone(),
            StoredSession {
                session,
                last_access: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Session>> {
        self.evict_idle();
        Ok(self.sessions.get_mut(id).map(|mut entry| {
            entry.last_access = Instant::now();
            entry.session.clone()
        }))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.sessions.remove(id);
        Ok(())
    }
}
