//! One open session scope: the store plus the tasks and services around it.

use crate::backend::{BackendError, JobBackend, SessionBackend};
use crate::config::WorkspaceConfig;
use crate::import::ImportPipeline;
use crate::jobs::JobSubmitter;
use crate::lifecycle::ItemLifecycle;
use crate::notifications::Notifier;
use crate::session::{RemoteApply, Session, SessionStore};
use crate::sync::{PersistenceGate, SyncError, SyncScheduler};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// External services a workspace talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionBackend>,
    pub jobs: Arc<dyn JobBackend>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct Workspace {
    store: SessionStore,
    sessions: Arc<dyn SessionBackend>,
    gate: Arc<PersistenceGate>,
    scheduler: Arc<SyncScheduler>,
    pipeline: ImportPipeline,
    lifecycle: ItemLifecycle,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Workspace {
    /// Register a fresh session with the backend and open it.
    pub async fn create(
        collaborators: Collaborators,
        config: &WorkspaceConfig,
    ) -> Result<Self, WorkspaceError> {
        let session = Session::new();
        let session_id = collaborators.sessions.create_session(&session).await?;
        tracing::info!("Created session {}", session_id);

        Self::open(collaborators, config, &session_id).await
    }

    /// Load `session_id` and start syncing it.
    ///
    /// Fails with [`SyncError::SessionNotFound`] when the session cannot be
    /// fetched; nothing is left running in that case.
    pub async fn open(
        collaborators: Collaborators,
        config: &WorkspaceConfig,
        session_id: &str,
    ) -> Result<Self, WorkspaceError> {
        let Collaborators {
            sessions,
            jobs,
            notifier,
        } = collaborators;

        let store = SessionStore::new();
        let cancel = CancellationToken::new();

        let scheduler = Arc::new(SyncScheduler::new(
            store.clone(),
            sessions.clone(),
            notifier.clone(),
            session_id.to_string(),
            config.poll_interval(),
            cancel.child_token(),
        ));

        if let Err(e) = scheduler.initial_load().await {
            cancel.cancel();
            return Err(e.into());
        }

        let gate = Arc::new(PersistenceGate::new(
            store.clone(),
            sessions.clone(),
            notifier.clone(),
            cancel.child_token(),
        ));

        let submitter = JobSubmitter::new(store.clone(), jobs, notifier.clone());
        let pipeline = ImportPipeline::new(store.clone(), gate.clone(), submitter, notifier, config);
        let lifecycle = ItemLifecycle::new(store.clone());

        let tasks = vec![gate.clone().spawn(), scheduler.clone().start()];

        Ok(Self {
            store,
            sessions,
            gate,
            scheduler,
            pipeline,
            lifecycle,
            cancel,
            tasks,
        })
    }

    pub fn session_id(&self) -> &str {
        self.scheduler.session_id()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn imports(&self) -> &ImportPipeline {
        &self.pipeline
    }

    pub fn items(&self) -> &ItemLifecycle {
        &self.lifecycle
    }

    pub fn is_loading(&self) -> bool {
        self.scheduler.loading_flag().load(Ordering::SeqCst)
    }

    /// Fetch the session now instead of waiting for the next tick.
    pub async fn refresh(&self) -> Result<RemoteApply, SyncError> {
        self.scheduler.poll_once().await
    }

    /// Stop syncing. A local change that has not been saved yet is saved
    /// before this returns; no remote value is applied afterwards.
    pub async fn close(mut self) {
        self.shutdown().await;
    }

    /// Delete the session on the backend and close the workspace.
    pub async fn delete(mut self) -> Result<(), WorkspaceError> {
        self.cancel.cancel();
        self.join_tasks().await;

        let session_id = self.session_id().to_string();
        self.sessions.delete_session(&session_id).await?;
        tracing::info!("Deleted session {}", session_id);
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.join_tasks().await;

        // The gate may have stopped between a commit and its save
        if let Some(Err(e)) = self.gate.persist_pending().await {
            tracing::warn!("Final save for {} failed: {}", self.session_id(), e);
        }
        tracing::info!("Closed session {}", self.session_id());
    }

    async fn join_tasks(&mut self) {
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::error!("Workspace task failed: {}", e);
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
