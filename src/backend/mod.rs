//! Backend collaborators: the session store of record and the job workers.
//!
//! The core only talks to the backend through these traits so that the HTTP
//! client can be swapped for a fake in tests.

mod client;
mod types;

pub use client::HttpBackend;
pub use types::{BackendError, HealthStatus, JobAck};

use crate::session::{Item, Session};
use async_trait::async_trait;

/// Whole-session read/replace contract. No partial-field updates.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Register a client-minted session and return its id.
    async fn create_session(&self, session: &Session) -> Result<String, BackendError>;

    async fn get_session(&self, session_id: &str) -> Result<Session, BackendError>;

    async fn save_session(&self, session: &Session) -> Result<(), BackendError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError>;
}

/// Asynchronous analysis jobs. Completion is only ever observed through a
/// later `get_session`.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn submit_compound_job(&self, session_id: &str, item: &Item)
        -> Result<JobAck, BackendError>;

    async fn submit_gene_cluster_job(
        &self,
        session_id: &str,
        item: &Item,
    ) -> Result<JobAck, BackendError>;
}
