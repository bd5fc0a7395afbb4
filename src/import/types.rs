use crate::session::{ItemPayload, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("{0}")]
    Validation(String),

    #[error("Workspace is full ({max_items} items maximum)")]
    Capacity { max_items: usize },

    #[error("No session is loaded")]
    NoSession,

    #[error("Import was cancelled")]
    Cancelled,
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoSession => ImportError::NoSession,
        }
    }
}

/// A validated record waiting to become an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub name: String,
    pub payload: ItemPayload,
}

impl CandidateRecord {
    pub fn compound(name: &str, smiles: &str) -> Result<Self, ImportError> {
        let name = name.trim();
        let smiles = smiles.trim();

        if name.is_empty() || smiles.is_empty() {
            return Err(ImportError::Validation(
                "Please provide both a name and a SMILES string".to_string(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            payload: ItemPayload::Compound {
                smiles: smiles.to_string(),
            },
        })
    }

    pub fn gene_cluster(name: &str, file_content: &str) -> Result<Self, ImportError> {
        let name = name.trim();

        if name.is_empty() {
            return Err(ImportError::Validation(
                "Please provide a name for the gene cluster".to_string(),
            ));
        }
        if file_content.trim().is_empty() {
            return Err(ImportError::Validation(
                "Gene cluster file is empty".to_string(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            payload: ItemPayload::GeneCluster {
                file_content: file_content.to_string(),
            },
        })
    }
}

/// What happened to one import call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Ids of the items that were committed, in input order.
    pub admitted: Vec<String>,
    /// Records left out because the workspace ran out of room.
    pub dropped: usize,
    /// Blank or malformed file rows.
    pub skipped_rows: usize,
    pub submitted: usize,
    pub failed: usize,
}

/// Records parsed out of an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    pub records: Vec<CandidateRecord>,
    pub skipped_rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_record_is_trimmed() {
        let record = CandidateRecord::compound("  aspirin ", " CC(=O)OC1=CC=CC=C1C(=O)O\n").unwrap();
        assert_eq!(record.name, "aspirin");
        assert_eq!(
            record.payload,
            ItemPayload::Compound {
                smiles: "CC(=O)OC1=CC=CC=C1C(=O)O".to_string()
            }
        );
    }

    #[test]
    fn test_blank_fields_are_rejected() {
        assert!(matches!(
            CandidateRecord::compound("  ", "CCO"),
            Err(ImportError::Validation(_))
        ));
        assert!(matches!(
            CandidateRecord::compound("ethanol", ""),
            Err(ImportError::Validation(_))
        ));
        assert!(matches!(
            CandidateRecord::gene_cluster("bgc", " \n "),
            Err(ImportError::Validation(_))
        ));
    }

    #[test]
    fn test_store_error_conversion() {
        assert_eq!(ImportError::from(StoreError::NoSession), ImportError::NoSession);
    }
}
