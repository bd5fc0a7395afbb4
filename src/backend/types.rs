//! Backend wire types and error definitions

use crate::session::Session;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Job rejected: {0}")]
    JobRejected(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionEnvelope<'a> {
    pub session: &'a Session,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionIdBody {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetSessionResponse {
    #[allow(dead_code)]
    pub session_id: String,
    pub session: Session,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitCompoundRequest<'a> {
    pub session_id: &'a str,
    pub item_id: &'a str,
    pub name: &'a str,
    pub smiles: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitGeneClusterRequest<'a> {
    pub session_id: &'a str,
    pub item_id: &'a str,
    pub name: &'a str,
    pub file_content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

/// Acknowledgement returned by a job submission endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAck {
    pub ok: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobAck {
    pub fn accepted() -> Self {
        Self {
            ok: true,
            status: None,
            elapsed_ms: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub uptime: Option<i64>,
    #[serde(default)]
    pub version: Option<String>,
}
