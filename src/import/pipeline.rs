//! Turns raw user input into committed, persisted and submitted items.

use super::parse;
use super::types::{CandidateRecord, ImportError, ImportReport};
use crate::config::WorkspaceConfig;
use crate::jobs::JobSubmitter;
use crate::notifications::{items, Notifier, Severity};
use crate::session::{now_millis, Item, SessionStore, StoreError};
use crate::sync::{PersistError, PersistenceGate};
use std::path::Path;
use std::sync::Arc;

pub struct ImportPipeline {
    store: SessionStore,
    gate: Arc<PersistenceGate>,
    submitter: JobSubmitter,
    notifier: Arc<dyn Notifier>,
    max_items: usize,
    max_file_bytes: u64,
}

impl ImportPipeline {
    pub fn new(
        store: SessionStore,
        gate: Arc<PersistenceGate>,
        submitter: JobSubmitter,
        notifier: Arc<dyn Notifier>,
        config: &WorkspaceConfig,
    ) -> Self {
        Self {
            store,
            gate,
            submitter,
            notifier,
            max_items: config.max_items,
            max_file_bytes: config.max_file_bytes,
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Import a batch of already-validated records.
    pub async fn import_batch(
        &self,
        records: Vec<CandidateRecord>,
    ) -> Result<ImportReport, ImportError> {
        let result = self.run_batch(records).await;
        self.finish(result)
    }

    pub async fn import_compound(&self, name: &str, smiles: &str) -> Result<ImportReport, ImportError> {
        let result = match CandidateRecord::compound(name, smiles) {
            Ok(record) => self.run_batch(vec![record]).await,
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    pub async fn import_gene_cluster(
        &self,
        name: &str,
        file_content: &str,
    ) -> Result<ImportReport, ImportError> {
        let result = match CandidateRecord::gene_cluster(name, file_content) {
            Ok(record) => self.run_batch(vec![record]).await,
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    /// Import every valid row of an uploaded `.csv`, `.tsv` or `.txt` table.
    pub async fn import_compound_file(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ImportReport, ImportError> {
        let result = self.run_compound_file(file_name, bytes).await;
        self.finish(result)
    }

    pub async fn import_gene_cluster_file(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ImportReport, ImportError> {
        let result = match parse::check_size(file_name, bytes.len() as u64, self.max_file_bytes)
            .and_then(|_| parse::parse_gene_cluster(file_name, bytes))
        {
            Ok(record) => self.run_batch(vec![record]).await,
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    /// Import a file from disk, choosing compound or gene cluster handling by
    /// extension. The size ceiling is checked before the file is read.
    pub async fn import_path(&self, path: &Path) -> Result<ImportReport, ImportError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        let bytes = match self.read_file(path, &file_name).await {
            Ok(bytes) => bytes,
            Err(e) => return self.finish(Err(e)),
        };

        if parse::is_compound_table(&file_name) {
            self.import_compound_file(&file_name, &bytes).await
        } else {
            self.import_gene_cluster_file(&file_name, &bytes).await
        }
    }

    async fn read_file(&self, path: &Path, file_name: &str) -> Result<Vec<u8>, ImportError> {
        let unreadable =
            |e: std::io::Error| ImportError::Validation(format!("Could not read {}: {}", file_name, e));

        let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
        parse::check_size(file_name, metadata.len(), self.max_file_bytes)?;
        tokio::fs::read(path).await.map_err(unreadable)
    }

    async fn run_compound_file(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ImportReport, ImportError> {
        parse::check_size(file_name, bytes.len() as u64, self.max_file_bytes)?;
        let table = parse::parse_compound_table(file_name, bytes)?;

        if table.skipped_rows > 0 {
            tracing::info!("Skipped {} rows in {}", table.skipped_rows, file_name);
        }

        let mut report = self.run_batch(table.records).await?;
        report.skipped_rows = table.skipped_rows;
        Ok(report)
    }

    async fn run_batch(&self, records: Vec<CandidateRecord>) -> Result<ImportReport, ImportError> {
        if records.is_empty() {
            return Err(ImportError::Validation("Nothing to import".to_string()));
        }

        let requested = records.len();
        let max_items = self.max_items;
        let now = now_millis();

        // Room is measured inside the commit so concurrent imports can't overfill
        let commit = self.store.set_local(|session| {
            let remaining = max_items.saturating_sub(session.items.len());
            if remaining == 0 {
                return Err(ImportError::Capacity { max_items });
            }

            let admitted: Vec<Item> = records
                .into_iter()
                .take(remaining)
                .map(|record| Item::new(record.name, record.payload, now))
                .collect();
            session.items.extend(admitted.iter().cloned());
            Ok((session.session_id.clone(), admitted))
        })?;

        let (session_id, admitted) = commit.value;
        let mut report = ImportReport {
            admitted: admitted.iter().map(|item| item.id.clone()).collect(),
            dropped: requested - admitted.len(),
            ..ImportReport::default()
        };

        if report.dropped > 0 {
            self.notifier.notify(
                &format!(
                    "Workspace limit of {} reached: {} {} not imported",
                    max_items,
                    report.dropped,
                    items(report.dropped)
                ),
                Severity::Warning,
            );
        }

        let Some(revision) = commit.revision else {
            return Ok(report);
        };

        tracing::info!(
            "Added {} {} to session {} (revision {})",
            admitted.len(),
            items(admitted.len()),
            session_id,
            revision
        );

        match self.gate.wait_for(revision).await {
            Ok(()) => {}
            Err(PersistError::Failed(message)) => {
                self.fail_unsaved(&report.admitted, &message);
                report.failed = admitted.len();
                return Ok(report);
            }
            Err(PersistError::Stopped) => return Err(ImportError::Cancelled),
        }

        let outcomes = self.submitter.submit_all(&session_id, &admitted).await;
        report.submitted = outcomes.iter().filter(|o| o.is_submitted()).count();
        report.failed = outcomes.iter().filter(|o| o.is_failed()).count();

        if report.submitted > 0 {
            self.notifier.notify(
                &format!("Queued {} {} for analysis", report.submitted, items(report.submitted)),
                Severity::Success,
            );
        }

        Ok(report)
    }

    /// The batch may not be durable, so none of it is submitted.
    fn fail_unsaved(&self, ids: &[String], message: &str) {
        let error = format!("Failed to save session: {}", message);
        let now = now_millis();

        tracing::warn!("Skipping job submission for {} unsaved items", ids.len());
        let result = self.store.set_local(|session| {
            for id in ids {
                if let Some(item) = session.item_mut(id) {
                    item.mark_error(error.as_str(), now);
                }
            }
            Ok::<_, StoreError>(())
        });

        if let Err(e) = result {
            tracing::warn!("Could not mark unsaved items as failed: {}", e);
        }
    }

    fn finish(&self, result: Result<ImportReport, ImportError>) -> Result<ImportReport, ImportError> {
        if let Err(e) = &result {
            match e {
                ImportError::Validation(_) => self.notifier.notify(&e.to_string(), Severity::Error),
                ImportError::Capacity { .. } => self.notifier.notify(&e.to_string(), Severity::Warning),
                ImportError::NoSession | ImportError::Cancelled => {
                    tracing::warn!("Import abandoned: {}", e)
                }
            }
        }
        result
    }
}
