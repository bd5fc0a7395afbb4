use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, SessionBackend};
use crate::notifications::{Notifier, Severity};
use crate::session::{ItemStatus, RemoteApply, Session, SessionStore};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Session {session_id} not found: {source}")]
    SessionNotFound {
        session_id: String,
        #[source]
        source: BackendError,
    },

    #[error("Refresh failed: {0}")]
    Refresh(#[source] BackendError),

    #[error("Sync cancelled")]
    Cancelled,
}

/// Loads the session once and then keeps it fresh from the backend.
///
/// The scheduler is keyed to a session id only, so local item edits never
/// reset its timer. Every fetch honours the scope's cancellation token: once
/// it fires, no fetched value reaches the store.
pub struct SyncScheduler {
    store: SessionStore,
    backend: Arc<dyn SessionBackend>,
    notifier: Arc<dyn Notifier>,
    session_id: String,
    interval: Duration,
    is_loading: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(
        store: SessionStore,
        backend: Arc<dyn SessionBackend>,
        notifier: Arc<dyn Notifier>,
        session_id: String,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            backend,
            notifier,
            session_id,
            interval,
            is_loading: Arc::new(AtomicBool::new(false)),
            cancel,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Shared flag that is true while the initial load is in flight.
    pub fn loading_flag(&self) -> Arc<AtomicBool> {
        self.is_loading.clone()
    }

    /// Fetch the session for the first time.
    ///
    /// Any failure means the session cannot be shown; the store stays empty
    /// and the caller should route to its not-found surface.
    pub async fn initial_load(&self) -> Result<(), SyncError> {
        tracing::info!("Loading session {}", self.session_id);
        let start = Instant::now();
        self.is_loading.store(true, Ordering::SeqCst);

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.backend.get_session(&self.session_id) => Some(result),
        };

        self.is_loading.store(false, Ordering::SeqCst);

        let Some(result) = fetched else {
            return Err(SyncError::Cancelled);
        };
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        match result {
            Ok(session) => {
                tracing::info!(
                    "Loaded session {} with {} items in {}ms",
                    session.session_id,
                    session.items.len(),
                    start.elapsed().as_millis()
                );
                self.store.set_remote(session);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to load session {}: {}", self.session_id, e);
                Err(SyncError::SessionNotFound {
                    session_id: self.session_id.clone(),
                    source: e,
                })
            }
        }
    }

    /// Run one fetch-and-apply cycle.
    pub async fn poll_once(&self) -> Result<RemoteApply, SyncError> {
        let ticket = self.store.begin_fetch();

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.backend.get_session(&self.session_id) => Some(result),
        };

        let Some(result) = fetched else {
            return Err(SyncError::Cancelled);
        };
        if self.cancel.is_cancelled() {
            tracing::debug!("Discarding refresh for {} after teardown", self.session_id);
            return Err(SyncError::Cancelled);
        }

        match result {
            Ok(session) => {
                let previous = self.store.snapshot();
                let applied = self.store.apply_fetched(session.clone(), ticket);

                match applied {
                    RemoteApply::Applied => {
                        if let Some(previous) = previous {
                            log_remote_changes(&previous, &session);
                        }
                    }
                    RemoteApply::Stale => {
                        tracing::debug!(
                            "Discarded refresh for {}: local edit pending",
                            self.session_id
                        );
                    }
                }
                Ok(applied)
            }
            Err(e) => {
                tracing::warn!("Session refresh failed for {}: {}", self.session_id, e);
                self.notifier
                    .notify(&format!("Failed to refresh session: {}", e), Severity::Warning);
                Err(SyncError::Refresh(e))
            }
        }
    }

    /// Start the periodic refresh loop.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tracing::info!(
            "Starting session refresh for {} every {}s",
            self.session_id,
            self.interval.as_secs_f32()
        );

        tokio::spawn(async move {
            // The initial load already fetched, so the first tick is one interval out
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if let Err(SyncError::Cancelled) = self.poll_once().await {
                    break;
                }
            }

            tracing::info!("Session refresh for {} stopped", self.session_id);
        })
    }
}

/// Log which items the backend advanced since the last value we held.
fn log_remote_changes(previous: &Session, next: &Session) {
    let before: HashMap<&str, (ItemStatus, i64)> = previous
        .items
        .iter()
        .map(|item| (item.id.as_str(), (item.status, item.updated_at)))
        .collect();

    let mut advanced = 0;
    for item in &next.items {
        let Some(&(status, updated_at)) = before.get(item.id.as_str()) else {
            continue;
        };
        if item.updated_at > updated_at {
            advanced += 1;
        } else if item.updated_at < updated_at {
            tracing::warn!(
                "Item {} went back in time ({} -> {})",
                item.id,
                updated_at,
                item.updated_at
            );
        }
        if item.status != status {
            tracing::info!("Item {} ({}): {} -> {}", item.name, item.id, status, item.status);
        }
    }

    tracing::debug!("Refresh applied, {} items advanced", advanced);
}
