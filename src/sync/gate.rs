//! Pushes local session edits to the backend.
//!
//! The gate watches the store and saves only when the most recent change was
//! tagged `local`. Remote refreshes are already durable and never trigger a
//! save, which keeps the gate and the scheduler from feeding each other.

use crate::backend::SessionBackend;
use crate::notifications::{Notifier, Severity};
use crate::session::SessionStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("Failed to save session: {0}")]
    Failed(String),

    #[error("Session persistence has stopped")]
    Stopped,
}

/// Result of the most recent save attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Local revision covered by the save.
    pub revision: u64,
    pub error: Option<String>,
}

/// How many past save results are kept for late waiters.
const RETAINED_OUTCOMES: usize = 64;

#[derive(Debug, Clone, Default)]
struct SaveLog {
    latest: SaveOutcome,
    /// Save revision -> error, oldest first.
    recent: BTreeMap<u64, Option<String>>,
}

impl SaveLog {
    fn record(&mut self, revision: u64, error: Option<String>) {
        if revision >= self.latest.revision {
            self.latest = SaveOutcome {
                revision,
                error: error.clone(),
            };
        }
        self.recent.insert(revision, error);
        while self.recent.len() > RETAINED_OUTCOMES {
            self.recent.pop_first();
        }
    }

    /// Result of the first save that included `revision`.
    fn covering(&self, revision: u64) -> Option<Result<(), PersistError>> {
        self.recent
            .range(revision..)
            .next()
            .map(|(_, error)| match error {
                None => Ok(()),
                Some(message) => Err(PersistError::Failed(message.clone())),
            })
    }
}

pub struct PersistenceGate {
    store: SessionStore,
    backend: Arc<dyn SessionBackend>,
    notifier: Arc<dyn Notifier>,
    outcome: watch::Sender<SaveLog>,
    cancel: CancellationToken,
}

impl PersistenceGate {
    pub fn new(
        store: SessionStore,
        backend: Arc<dyn SessionBackend>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        let (outcome, _rx) = watch::channel(SaveLog::default());
        Self {
            store,
            backend,
            notifier,
            outcome,
            cancel,
        }
    }

    /// Run the gate on its own task until the scope is cancelled.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) {
        let mut changes = self.store.subscribe();
        tracing::debug!("Persistence gate started");

        // A commit may have landed before we subscribed
        self.persist_pending().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.persist_pending().await;
                }
            }
        }

        tracing::debug!("Persistence gate stopped");
    }

    /// Save the session if the last change was local. Returns `None` when
    /// there was nothing to do.
    ///
    /// Save failures are reported but never roll back the local edit.
    pub async fn persist_pending(&self) -> Option<Result<(), PersistError>> {
        let (session, revision) = self.store.take_local()?;

        tracing::debug!(
            "Saving session {} at revision {} ({} items)",
            session.session_id,
            revision,
            session.items.len()
        );

        let result = self.backend.save_session(&session).await;
        self.store.mark_settled(revision);

        let error = match result {
            Ok(()) => {
                tracing::debug!("Session {} saved", session.session_id);
                None
            }
            Err(e) => {
                tracing::error!("Failed to save session {}: {}", session.session_id, e);
                let message = e.to_string();
                self.notifier
                    .notify(&format!("Failed to save session: {}", message), Severity::Error);
                Some(message)
            }
        };

        self.outcome
            .send_modify(|log| log.record(revision, error.clone()));

        Some(match error {
            None => Ok(()),
            Some(message) => Err(PersistError::Failed(message)),
        })
    }

    /// Wait until the first save that includes `revision` has finished and
    /// return its result. Later saves don't change the answer.
    pub async fn wait_for(&self, revision: u64) -> Result<(), PersistError> {
        let mut outcomes = self.outcome.subscribe();

        loop {
            let covered = outcomes.borrow_and_update().covering(revision);
            if let Some(result) = covered {
                return result;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PersistError::Stopped),
                changed = outcomes.changed() => {
                    if changed.is_err() {
                        return Err(PersistError::Stopped);
                    }
                }
            }
        }
    }

    pub fn last_outcome(&self) -> SaveOutcome {
        self.outcome.borrow().latest.clone()
    }
}
