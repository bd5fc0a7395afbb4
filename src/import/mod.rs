//! Compound and gene cluster imports.
//!
//! An import admits as many records as the workspace has room for, commits
//! them in one local change, waits for that change to be saved and only then
//! submits analysis jobs for the new items.

pub mod parse;
mod pipeline;
mod types;

pub use pipeline::ImportPipeline;
pub use types::{CandidateRecord, ImportError, ImportReport, ParsedTable};
