//! HTTP client for the BioNexus backend

use super::types::{
    BackendError, ErrorBody, GetSessionResponse, HealthStatus, JobAck, SessionEnvelope,
    SessionIdBody, SubmitCompoundRequest, SubmitGeneClusterRequest,
};
use super::{JobBackend, SessionBackend};
use crate::config::WorkspaceConfig;
use crate::session::{Item, ItemPayload, Session};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub struct HttpBackend {
    http: Client,
    base_url: String,
    job_timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            job_timeout: request_timeout,
        })
    }

    pub fn from_config(config: &WorkspaceConfig) -> Result<Self, BackendError> {
        Ok(Self::new(config.api_base_url.clone(), config.request_timeout())?
            .with_job_timeout(config.job_timeout()))
    }

    /// Job endpoints run the analysis before answering, so they get their own
    /// timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B, timeout: Option<Duration>) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.http.post(self.endpoint(path)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {}", status),
        };

        tracing::debug!("POST {} failed with {}: {}", path, status, message);

        if status == StatusCode::NOT_FOUND {
            Err(BackendError::NotFound(message))
        } else {
            Err(BackendError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn submit(&self, path: &str, body: &impl Serialize) -> Result<JobAck, BackendError> {
        let ack: JobAck = self.post(path, body, Some(self.job_timeout)).await?;
        if !ack.ok {
            return Err(BackendError::JobRejected(
                ack.error.unwrap_or_else(|| "Job was not accepted".to_string()),
            ));
        }
        Ok(ack)
    }

    /// Check that the backend is up.
    pub async fn health(&self) -> Result<HealthStatus, BackendError> {
        let response = self.http.get(self.endpoint("health")).send().await?;

        if !response.status().is_success() {
            return Err(BackendError::Api {
                status: response.status().as_u16(),
                message: "Health check failed".to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn create_session(&self, session: &Session) -> Result<String, BackendError> {
        let response: SessionIdBody = self
            .post("createSession", &SessionEnvelope { session }, None)
            .await?;
        Ok(response.session_id)
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, BackendError> {
        let body = SessionIdBody {
            session_id: session_id.to_string(),
        };
        let response: GetSessionResponse = self.post("getSession", &body, None).await?;
        Ok(response.session)
    }

    async fn save_session(&self, session: &Session) -> Result<(), BackendError> {
        let _: SessionIdBody = self
            .post("saveSession", &SessionEnvelope { session }, None)
            .await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError> {
        let body = SessionIdBody {
            session_id: session_id.to_string(),
        };
        let _: SessionIdBody = self.post("deleteSession", &body, None).await?;
        Ok(())
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn submit_compound_job(&self, session_id: &str, item: &Item) -> Result<JobAck, BackendError> {
        let ItemPayload::Compound { smiles } = &item.payload else {
            return Err(BackendError::InvalidRequest(format!(
                "Item {} is not a compound",
                item.id
            )));
        };

        let body = SubmitCompoundRequest {
            session_id,
            item_id: &item.id,
            name: &item.name,
            smiles,
        };
        self.submit("submitCompound", &body).await
    }

    async fn submit_gene_cluster_job(
        &self,
        session_id: &str,
        item: &Item,
    ) -> Result<JobAck, BackendError> {
        let ItemPayload::GeneCluster { file_content } = &item.payload else {
            return Err(BackendError::InvalidRequest(format!(
                "Item {} is not a gene cluster",
                item.id
            )));
        };

        let body = SubmitGeneClusterRequest {
            session_id,
            item_id: &item.id,
            name: &item.name,
            file_content,
        };
        self.submit("submitGeneCluster", &body).await
    }
}
