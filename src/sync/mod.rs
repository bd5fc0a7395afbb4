//! Keeping the local session and the backend copy consistent.

pub mod gate;
pub mod scheduler;

// Re-export commonly used types
pub use gate::{PersistError, PersistenceGate, SaveOutcome};
pub use scheduler::{SyncError, SyncScheduler};
