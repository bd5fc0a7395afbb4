//! The single in-memory session cell shared by every workspace surface.
//!
//! There are exactly two write paths: [`SessionStore::set_local`] for
//! user-driven edits and [`SessionStore::set_remote`] for values observed on
//! the backend. Each write is a whole-value replacement inside the watch
//! channel, so readers never see a half-applied change.

use super::types::Session;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No session is loaded")]
    NoSession,
}

/// Which actor produced the most recent session value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOrigin {
    Local,
    Remote,
}

/// Snapshot of everything the store holds.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    session: Option<Session>,
    origin: Option<SyncOrigin>,
    selection: BTreeSet<String>,
    revision: u64,
    local_revision: u64,
    settled_revision: u64,
    /// Sequence handed to the most recently issued fetch.
    fetches_issued: u64,
    /// Sequence of the newest fetch whose value was applied.
    fetch_applied: u64,
}

impl StoreState {
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn origin(&self) -> Option<SyncOrigin> {
        self.origin
    }

    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    /// Bumped on every committed session change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when every local commit has finished its save attempt.
    pub fn is_settled(&self) -> bool {
        self.settled_revision >= self.local_revision
    }

    fn prune_selection(&mut self) {
        match &self.session {
            Some(session) => self.selection.retain(|id| session.contains(id)),
            None => self.selection.clear(),
        }
    }
}

/// Result of a [`SessionStore::set_local`] call.
#[derive(Debug)]
pub struct LocalCommit<R> {
    pub value: R,
    /// Revision of the commit, or `None` if the mutation changed nothing.
    pub revision: Option<u64>,
}

/// Captured when a remote fetch is issued; decides whether its result may
/// still be applied when it resolves.
#[derive(Debug, Clone, Copy)]
pub struct FetchTicket {
    sequence: u64,
    local_revision: u64,
    clean: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    Applied,
    /// A local edit was pending or happened while the fetch was in flight.
    Stale,
}

#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<StoreState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StoreState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Apply a user-initiated change and tag it `local`.
    ///
    /// The mutator runs against a draft copy. If it returns an error nothing
    /// is committed; if the draft ends up identical to the current session the
    /// call is a no-op and no save is triggered. The mutator must not call
    /// back into the store.
    pub fn set_local<R, E, F>(&self, mutator: F) -> Result<LocalCommit<R>, E>
    where
        F: FnOnce(&mut Session) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut outcome: Result<LocalCommit<R>, E> = Err(StoreError::NoSession.into());

        self.tx.send_if_modified(|state| {
            let Some(current) = state.session.as_ref() else {
                return false;
            };

            let mut draft = current.clone();
            let value = match mutator(&mut draft) {
                Ok(value) => value,
                Err(e) => {
                    outcome = Err(e);
                    return false;
                }
            };

            if draft == *current {
                outcome = Ok(LocalCommit {
                    value,
                    revision: None,
                });
                return false;
            }

            state.revision += 1;
            state.local_revision = state.revision;
            state.session = Some(draft);
            state.origin = Some(SyncOrigin::Local);
            state.prune_selection();

            outcome = Ok(LocalCommit {
                value,
                revision: Some(state.revision),
            });
            true
        });

        outcome
    }

    /// Replace the session wholesale with a value fetched from the backend.
    pub fn set_remote(&self, next: Session) {
        self.tx.send_modify(|state| Self::commit_remote(state, next));
    }

    fn commit_remote(state: &mut StoreState, next: Session) {
        state.revision += 1;
        state.session = Some(next);
        state.origin = Some(SyncOrigin::Remote);
        state.prune_selection();
    }

    /// Record the store's local position before issuing a fetch.
    pub fn begin_fetch(&self) -> FetchTicket {
        let mut ticket = FetchTicket {
            sequence: 0,
            local_revision: 0,
            clean: false,
        };

        self.tx.send_if_modified(|state| {
            state.fetches_issued += 1;
            ticket = FetchTicket {
                sequence: state.fetches_issued,
                local_revision: state.local_revision,
                clean: state.is_settled(),
            };
            false
        });

        ticket
    }

    /// Apply a fetched session unless it could overwrite a local edit.
    ///
    /// The value is discarded when a local commit was still unsaved at the
    /// time the fetch was issued, when a local commit happened while it was
    /// in flight, or when a fetch issued later has already been applied. The
    /// next poll reconciles.
    pub fn apply_fetched(&self, next: Session, ticket: FetchTicket) -> RemoteApply {
        let mut applied = RemoteApply::Stale;

        self.tx.send_if_modified(|state| {
            if !ticket.clean || state.local_revision != ticket.local_revision {
                return false;
            }
            if ticket.sequence <= state.fetch_applied {
                return false;
            }
            if let Some(current) = &state.session {
                if current.session_id != next.session_id {
                    tracing::warn!(
                        "Ignoring fetched session {} while {} is loaded",
                        next.session_id,
                        current.session_id
                    );
                    return false;
                }
            }
            Self::commit_remote(state, next);
            state.fetch_applied = ticket.sequence;
            applied = RemoteApply::Applied;
            true
        });

        applied
    }

    /// Consume the `local` origin tag, returning the session to persist and
    /// the revision it covers.
    pub fn take_local(&self) -> Option<(Session, u64)> {
        let mut taken = None;

        self.tx.send_if_modified(|state| {
            if state.origin == Some(SyncOrigin::Local) {
                state.origin = None;
                taken = state
                    .session
                    .clone()
                    .map(|session| (session, state.local_revision));
            }
            false
        });

        taken
    }

    /// Mark local revisions up to `revision` as having finished their save
    /// attempt.
    pub fn mark_settled(&self, revision: u64) {
        self.tx.send_if_modified(|state| {
            if revision > state.settled_revision {
                state.settled_revision = revision;
            }
            false
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Option<Session> {
        self.tx.borrow().session.clone()
    }

    /// Read the current session without cloning it.
    pub fn with_session<R>(&self, reader: impl FnOnce(&Session) -> R) -> Option<R> {
        self.tx.borrow().session.as_ref().map(reader)
    }

    pub fn session_id(&self) -> Option<String> {
        self.with_session(|session| session.session_id.clone())
    }

    pub fn revision(&self) -> u64 {
        self.tx.borrow().revision
    }

    pub fn origin(&self) -> Option<SyncOrigin> {
        self.tx.borrow().origin
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_settled()
    }

    pub fn selected(&self) -> BTreeSet<String> {
        self.tx.borrow().selection.clone()
    }

    /// Add `id` to the selection if such an item exists.
    pub fn select(&self, id: &str) -> bool {
        self.tx.send_if_modified(|state| {
            let present = state
                .session
                .as_ref()
                .is_some_and(|session| session.contains(id));
            present && state.selection.insert(id.to_string())
        })
    }

    pub fn deselect(&self, id: &str) -> bool {
        self.tx.send_if_modified(|state| state.selection.remove(id))
    }

    pub fn select_all(&self) -> usize {
        let mut count = 0;
        self.tx.send_if_modified(|state| {
            let before = state.selection.len();
            if let Some(session) = &state.session {
                state.selection = session.item_ids().map(str::to_string).collect();
            }
            count = state.selection.len();
            count != before
        });
        count
    }

    pub fn clear_selection(&self) {
        self.tx.send_if_modified(|state| {
            let changed = !state.selection.is_empty();
            state.selection.clear();
            changed
        });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{Item, ItemPayload, ItemStatus};

    fn session_with(names: &[&str]) -> Session {
        let mut session = Session::new();
        for name in names {
            session.items.push(Item::new(
                *name,
                ItemPayload::Compound {
                    smiles: "C".to_string(),
                },
                1,
            ));
        }
        session
    }

    fn loaded_store(names: &[&str]) -> SessionStore {
        let store = SessionStore::new();
        store.set_remote(session_with(names));
        store
    }

    fn rename_first(store: &SessionStore, name: &str) -> Result<LocalCommit<()>, StoreError> {
        let name = name.to_string();
        store.set_local(move |session| {
            session.items[0].name = name;
            Ok(())
        })
    }

    #[test]
    fn test_set_local_without_session_fails() {
        let store = SessionStore::new();
        let result = store.set_local(|_| Ok::<_, StoreError>(()));
        assert_eq!(result.unwrap_err(), StoreError::NoSession);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_set_local_tags_origin_and_bumps_revision() {
        let store = loaded_store(&["a"]);
        assert_eq!(store.origin(), Some(SyncOrigin::Remote));

        let commit = rename_first(&store, "b").unwrap();
        assert_eq!(commit.revision, Some(2));
        assert_eq!(store.origin(), Some(SyncOrigin::Local));
        assert_eq!(store.snapshot().unwrap().items[0].name, "b");
        assert!(!store.is_settled());
    }

    #[test]
    fn test_unchanged_mutation_is_not_tagged() {
        let store = loaded_store(&["a"]);
        let commit = rename_first(&store, "a").unwrap();

        assert_eq!(commit.revision, None);
        assert_eq!(store.origin(), Some(SyncOrigin::Remote));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_failed_mutator_commits_nothing() {
        let store = loaded_store(&["a"]);
        let result: Result<LocalCommit<()>, StoreError> = store.set_local(|session| {
            session.items.clear();
            Err(StoreError::NoSession)
        });

        assert!(result.is_err());
        assert_eq!(store.snapshot().unwrap().items.len(), 1);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_readers_are_notified_of_commits() {
        let store = loaded_store(&["a"]);
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        rename_first(&store, "b").unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().session().unwrap().items[0].name, "b");
    }

    #[test]
    fn test_take_local_consumes_tag_once() {
        let store = loaded_store(&["a"]);
        assert!(store.take_local().is_none());

        rename_first(&store, "b").unwrap();
        let (session, revision) = store.take_local().unwrap();
        assert_eq!(session.items[0].name, "b");
        assert_eq!(revision, 2);
        assert_eq!(store.origin(), None);
        assert!(store.take_local().is_none());
    }

    #[test]
    fn test_fetch_applies_when_clean() {
        let store = loaded_store(&["a"]);
        let mut fetched = store.snapshot().unwrap();
        fetched.items[0].name = "from server".to_string();

        let ticket = store.begin_fetch();
        assert_eq!(store.apply_fetched(fetched, ticket), RemoteApply::Applied);
        assert_eq!(store.snapshot().unwrap().items[0].name, "from server");
        assert_eq!(store.origin(), Some(SyncOrigin::Remote));
    }

    #[test]
    fn test_fetch_is_stale_after_local_commit_in_flight() {
        let store = loaded_store(&["a"]);
        let stale = store.snapshot().unwrap();

        let ticket = store.begin_fetch();
        rename_first(&store, "renamed").unwrap();

        assert_eq!(store.apply_fetched(stale, ticket), RemoteApply::Stale);
        assert_eq!(store.snapshot().unwrap().items[0].name, "renamed");
        assert_eq!(store.origin(), Some(SyncOrigin::Local));
    }

    #[test]
    fn test_fetch_is_stale_while_save_is_unsettled() {
        let store = loaded_store(&["a"]);
        rename_first(&store, "renamed").unwrap();
        let (_, revision) = store.take_local().unwrap();

        let mut fetched = store.snapshot().unwrap();
        fetched.items[0].name = "a".to_string();

        let ticket = store.begin_fetch();
        assert_eq!(store.apply_fetched(fetched.clone(), ticket), RemoteApply::Stale);

        store.mark_settled(revision);
        let ticket = store.begin_fetch();
        assert_eq!(store.apply_fetched(fetched, ticket), RemoteApply::Applied);
    }

    #[test]
    fn test_older_fetch_never_replaces_newer_one() {
        let store = loaded_store(&["a"]);
        let older = store.snapshot().unwrap();
        let older_ticket = store.begin_fetch();

        let mut newer = older.clone();
        newer.items[0].status = ItemStatus::Processing;
        let newer_ticket = store.begin_fetch();
        assert_eq!(store.apply_fetched(newer, newer_ticket), RemoteApply::Applied);

        assert_eq!(store.apply_fetched(older, older_ticket), RemoteApply::Stale);
        assert_eq!(store.snapshot().unwrap().items[0].status, ItemStatus::Processing);
    }

    #[test]
    fn test_fetch_for_other_session_is_ignored() {
        let store = loaded_store(&["a"]);
        let ticket = store.begin_fetch();
        assert_eq!(
            store.apply_fetched(session_with(&["x"]), ticket),
            RemoteApply::Stale
        );
    }

    #[test]
    fn test_delete_prunes_selection_in_same_commit() {
        let store = loaded_store(&["a", "b"]);
        let ids: Vec<String> = store
            .with_session(|s| s.item_ids().map(str::to_string).collect())
            .unwrap();
        assert_eq!(store.select_all(), 2);

        let doomed = ids[0].clone();
        store
            .set_local(move |session| {
                session.items.retain(|item| item.id != doomed);
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let selected = store.selected();
        assert_eq!(selected.len(), 1);
        assert!(selected.contains(&ids[1]));
    }

    #[test]
    fn test_select_ignores_unknown_ids() {
        let store = loaded_store(&["a"]);
        assert!(!store.select("nope"));
        assert!(store.selected().is_empty());

        let id = store.with_session(|s| s.items[0].id.clone()).unwrap();
        assert!(store.select(&id));
        assert!(!store.select(&id));
        assert!(store.deselect(&id));
        store.select(&id);
        store.clear_selection();
        assert!(store.selected().is_empty());
    }
}
