// Library entry point for the BioNexus workspace client
pub mod backend;
pub mod config;
pub mod import;
pub mod jobs;
pub mod lifecycle;
pub mod notifications;
pub mod session;
pub mod sync;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use workspace::{Collaborators, Workspace, WorkspaceError};
