//! In-process session backend.
//!
//! Suitable for a single instance: records live in this process and are lost
//! on restart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::session::{SessionBackend, SessionBackendKind, SessionError, SessionRecord};

struct StoredSession {
    record: SessionRecord,
    expires_at: Instant,
}

/// Process-local map from session id to record, with server-side expiry.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredSession>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired records, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, s| s.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired records until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = self.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, remaining = self.len(), "Expired sessions purged");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Session sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    fn kind(&self) -> SessionBackendKind {
        SessionBackendKind::Memory
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let now = Instant::now();
        let expired = match self.entries.get(id) {
            Some(s) if s.expires_at > now => return Ok(Some(s.record.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(id, |_, s| s.expires_at <= now);
        }
        Ok(None)
    }

    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError> {
        self.entries.insert(
            id.to_string(),
            StoredSession {
                record: record.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.entries.remove(id);
        Ok(())
    }
}
