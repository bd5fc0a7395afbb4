//! Session model and the shared session store.

mod store;
mod types;

pub use store::{
    FetchTicket, LocalCommit, RemoteApply, SessionStore, StoreError, StoreState, SyncOrigin,
};
pub use types::{now_millis, Fingerprint, Item, ItemKind, ItemPayload, ItemStatus, Session};
