//! Submits analysis jobs for newly imported items.
//!
//! Items are submitted one at a time in input order. A failed submission only
//! marks that item as `error`; the rest of the batch still goes out. There is
//! no automatic retry and no de-duplication, so callers submit each item once.

use crate::backend::JobBackend;
use crate::notifications::{Notifier, Severity};
use crate::session::{now_millis, Item, ItemKind, ItemStatus, SessionStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Submitted { item_id: String },
    Failed { item_id: String, error: String },
    Skipped { item_id: String, reason: String },
}

impl SubmissionOutcome {
    pub fn item_id(&self) -> &str {
        match self {
            Self::Submitted { item_id }
            | Self::Failed { item_id, .. }
            | Self::Skipped { item_id, .. } => item_id,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Clone)]
pub struct JobSubmitter {
    store: SessionStore,
    backend: Arc<dyn JobBackend>,
    notifier: Arc<dyn Notifier>,
}

impl JobSubmitter {
    pub fn new(store: SessionStore, backend: Arc<dyn JobBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            backend,
            notifier,
        }
    }

    /// Submit every item in order, capturing each result separately.
    pub async fn submit_all(&self, session_id: &str, items: &[Item]) -> Vec<SubmissionOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());

        for item in items {
            outcomes.push(self.submit_one(session_id, item).await);
        }

        let failures = outcomes.iter().filter(|o| o.is_failed()).count();
        let submitted = outcomes.iter().filter(|o| o.is_submitted()).count();
        tracing::info!(
            "Submitted {} of {} jobs for session {} ({} failed)",
            submitted,
            items.len(),
            session_id,
            failures
        );

        outcomes
    }

    async fn submit_one(&self, session_id: &str, item: &Item) -> SubmissionOutcome {
        let current = self
            .store
            .with_session(|session| session.item(&item.id).map(|i| i.status))
            .flatten();

        match current {
            None => {
                tracing::warn!("Skipping job for {}: item was removed", item.id);
                return SubmissionOutcome::Skipped {
                    item_id: item.id.clone(),
                    reason: "Item was removed".to_string(),
                };
            }
            Some(status) if status != ItemStatus::Queued => {
                tracing::warn!("Skipping job for {}: item is already {}", item.id, status);
                return SubmissionOutcome::Skipped {
                    item_id: item.id.clone(),
                    reason: format!("Item is already {}", status),
                };
            }
            Some(_) => {}
        }

        tracing::debug!("Submitting {} job for item {}", item.kind(), item.id);
        let result = match item.kind() {
            ItemKind::Compound => self.backend.submit_compound_job(session_id, item).await,
            ItemKind::GeneCluster => self.backend.submit_gene_cluster_job(session_id, item).await,
        };

        match result {
            Ok(ack) => {
                tracing::debug!(
                    "Job for item {} accepted (status={:?}, elapsed={:?}ms)",
                    item.id,
                    ack.status,
                    ack.elapsed_ms
                );
                SubmissionOutcome::Submitted {
                    item_id: item.id.clone(),
                }
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!("Job submission failed for item {}: {}", item.id, error);
                self.mark_failed(&item.id, &error);
                self.notifier.notify(
                    &format!("Failed to submit {}: {}", item.name, error),
                    Severity::Error,
                );
                SubmissionOutcome::Failed {
                    item_id: item.id.clone(),
                    error,
                }
            }
        }
    }

    fn mark_failed(&self, item_id: &str, error: &str) {
        let now = now_millis();
        let result = self.store.set_local(|session| {
            if let Some(item) = session.item_mut(item_id) {
                item.mark_error(error, now);
            }
            Ok::<_, StoreError>(())
        });

        if let Err(e) = result {
            tracing::warn!("Could not mark item {} as failed: {}", item_id, e);
        }
    }
}
