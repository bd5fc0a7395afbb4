//! Edits to items that are already in the session.
//!
//! Every change goes through [`SessionStore::set_local`], so the persistence
//! gate saves it. Item status is never advanced here: `processing` and `done`
//! only ever arrive from the backend on a refresh.

use crate::session::{SessionStore, StoreError};
use std::collections::{BTreeSet, HashSet};

#[derive(Clone)]
pub struct ItemLifecycle {
    store: SessionStore,
}

impl ItemLifecycle {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Rename an item. Returns `false` without committing anything when the
    /// trimmed name is blank, unchanged, or the item no longer exists.
    pub fn rename(&self, id: &str, name: &str) -> Result<bool, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }

        let commit = self.store.set_local(|session| {
            if let Some(item) = session.item_mut(id) {
                if item.name != name {
                    item.name = name.to_string();
                }
            }
            Ok::<_, StoreError>(())
        })?;

        if commit.revision.is_some() {
            tracing::debug!("Renamed item {} to {}", id, name);
        }
        Ok(commit.revision.is_some())
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.delete_many(&[id.to_string()])? == 1)
    }

    /// Remove every listed item in one change. Selected ids go with them.
    pub fn delete_many(&self, ids: &[String]) -> Result<usize, StoreError> {
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let commit = self.store.set_local(|session| {
            let before = session.items.len();
            session.items.retain(|item| !doomed.contains(item.id.as_str()));
            Ok::<_, StoreError>(before - session.items.len())
        })?;

        if commit.value > 0 {
            tracing::info!("Deleted {} items", commit.value);
        }
        Ok(commit.value)
    }

    pub fn delete_selected(&self) -> Result<usize, StoreError> {
        let selected: Vec<String> = self.store.selected().into_iter().collect();
        if selected.is_empty() {
            return Ok(0);
        }
        self.delete_many(&selected)
    }

    pub fn select(&self, id: &str) -> bool {
        self.store.select(id)
    }

    pub fn deselect(&self, id: &str) -> bool {
        self.store.deselect(id)
    }

    /// Flip selection for `id`. Returns whether it is selected afterwards.
    pub fn toggle(&self, id: &str) -> bool {
        if self.store.deselect(id) {
            false
        } else {
            self.store.select(id)
        }
    }

    pub fn select_all(&self) -> usize {
        self.store.select_all()
    }

    pub fn clear_selection(&self) {
        self.store.clear_selection()
    }

    pub fn selected(&self) -> BTreeSet<String> {
        self.store.selected()
    }
}
