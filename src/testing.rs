//! In-memory fakes for the backend collaborators, with scripted failures and
//! controllable fetch resolution.

use crate::backend::{BackendError, JobAck, JobBackend, SessionBackend};
use crate::session::{Item, Session};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Create(String),
    Get(String),
    Save { items: usize },
    Delete(String),
    SubmitCompound(String),
    SubmitGeneCluster(String),
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    sessions: Mutex<HashMap<String, Session>>,
    calls: Mutex<Vec<Call>>,
    fail_saves: AtomicBool,
    fail_gets: AtomicBool,
    failing_names: Mutex<HashSet<String>>,
    held_get: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session);
    }

    pub fn stored_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    /// Mutate the stored copy, as the job workers do out-of-band.
    pub fn update_stored(&self, session_id: &str, update: impl FnOnce(&mut Session)) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(session_id) {
            update(session);
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submissions_for(&self, name: &str) {
        self.failing_names.lock().unwrap().insert(name.to_string());
    }

    /// The next `get_session` snapshots the stored session when it is issued
    /// but only resolves once the returned sender fires (or is dropped).
    pub fn hold_next_get(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.held_get.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Save { .. }))
            .count()
    }

    pub fn get_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Get(_)))
            .count()
    }

    /// Names of submitted items, in submission order.
    pub fn submissions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SubmitCompound(name) | Call::SubmitGeneCluster(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn submit(&self, item: &Item) -> Result<JobAck, BackendError> {
        if self.failing_names.lock().unwrap().contains(&item.name) {
            return Err(BackendError::Api {
                status: 500,
                message: format!("Could not process {}", item.name),
            });
        }
        Ok(JobAck::accepted())
    }
}

#[async_trait]
impl SessionBackend for FakeBackend {
    async fn create_session(&self, session: &Session) -> Result<String, BackendError> {
        self.record(Call::Create(session.session_id.clone()));
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.session_id) {
            return Err(BackendError::Api {
                status: 400,
                message: "Session ID already exists".to_string(),
            });
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(session.session_id.clone())
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, BackendError> {
        self.record(Call::Get(session_id.to_string()));
        let snapshot = self.stored_session(session_id);
        let held = self.held_get.lock().unwrap().take();

        if let Some(release) = held {
            let _ = release.await;
        }

        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }

        snapshot.ok_or_else(|| BackendError::NotFound("Session not found".to_string()))
    }

    async fn save_session(&self, session: &Session) -> Result<(), BackendError> {
        self.record(Call::Save {
            items: session.items.len(),
        });

        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 500,
                message: "Storage unavailable".to_string(),
            });
        }

        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.contains_key(&session.session_id) {
            return Err(BackendError::NotFound("Session not found".to_string()));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.record(Call::Delete(session_id.to_string()));
        self.sessions
            .lock()
            .unwrap()
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound("Session not found".to_string()))
    }
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn submit_compound_job(&self, _session_id: &str, item: &Item) -> Result<JobAck, BackendError> {
        self.record(Call::SubmitCompound(item.name.clone()));
        self.submit(item)
    }

    async fn submit_gene_cluster_job(
        &self,
        _session_id: &str,
        item: &Item,
    ) -> Result<JobAck, BackendError> {
        self.record(Call::SubmitGeneCluster(item.name.clone()));
        self.submit(item)
    }
}

/// Let spawned tasks on the current-thread runtime make progress.
pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
