//! Session data model, mirrored from the backend's JSON representation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wall-clock time in milliseconds, the unit the backend stamps
/// `updatedAt` with.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Processing status of a single item.
///
/// Transitions only move forward: `queued -> processing -> {done, error}`.
/// A queued item may also fail directly when the client cannot save or
/// submit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Queued, Processing) | (Queued, Error) | (Processing, Done) | (Processing, Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Compound,
    GeneCluster,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compound => f.write_str("compound"),
            Self::GeneCluster => f.write_str("gene cluster"),
        }
    }
}

/// Kind-specific payload, serialized inline with a `kind` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemPayload {
    Compound {
        smiles: String,
    },
    #[serde(rename_all = "camelCase")]
    GeneCluster {
        file_content: String,
    },
}

impl ItemPayload {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Compound { .. } => ItemKind::Compound,
            Self::GeneCluster { .. } => ItemKind::GeneCluster,
        }
    }
}

/// A processed result attached by the backend once analysis completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub id: String,
    pub vector_encoding: String,
    pub score: f64,
}

/// One imported compound or gene cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub updated_at: i64,
    #[serde(flatten)]
    pub payload: ItemPayload,
    #[serde(default)]
    pub fingerprints: Vec<Fingerprint>,
    /// Hex-encoded 512-bit fingerprint written by the job worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint512: Option<String>,
    /// Fingerprint coverage; compounds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

impl Item {
    /// Create a fresh `queued` item with a newly minted id.
    pub fn new(name: impl Into<String>, payload: ItemPayload, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status: ItemStatus::Queued,
            error_message: None,
            updated_at: now,
            payload,
            fingerprints: Vec::new(),
            fingerprint512: None,
            coverage: None,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.payload.kind()
    }

    /// Force the item into `error`. Terminal items are left untouched.
    ///
    /// Returns `true` if the item changed.
    pub fn mark_error(&mut self, message: impl Into<String>, now: i64) -> bool {
        if !self.status.can_transition_to(ItemStatus::Error) {
            return false;
        }
        self.status = ItemStatus::Error;
        self.error_message = Some(message.into());
        self.updated_at = self.updated_at.max(now);
        true
    }
}

/// The durable state of one user workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    /// Seconds since the Unix epoch.
    pub created: i64,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    /// A new, empty session with a client-minted id.
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            created: chrono::Utc::now().timestamp(),
            items: Vec::new(),
            settings: serde_json::Map::new(),
        }
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.item(id).is_some()
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.id.as_str())
    }

    /// True once every item has reached `done` or `error`.
    pub fn is_settled(&self) -> bool {
        self.items.iter().all(|item| item.status.is_terminal())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compound(name: &str) -> Item {
        Item::new(
            name,
            ItemPayload::Compound {
                smiles: "CCO".to_string(),
            },
            1_000,
        )
    }

    #[test]
    fn test_status_transitions_only_move_forward() {
        use ItemStatus::*;

        assert!(Queued.can_transition_to(Processing));
        assert!(Queued.can_transition_to(Error));
        assert!(Processing.can_transition_to(Done));
        assert!(Processing.can_transition_to(Error));

        assert!(!Queued.can_transition_to(Done));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Done.can_transition_to(Queued));
        assert!(!Done.can_transition_to(Error));
        assert!(!Error.can_transition_to(Processing));
    }

    #[test]
    fn test_new_item_is_queued_with_unique_id() {
        let a = compound("a");
        let b = compound("b");

        assert_eq!(a.status, ItemStatus::Queued);
        assert!(a.error_message.is_none());
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind(), ItemKind::Compound);
    }

    #[test]
    fn test_mark_error_sets_message_and_refuses_terminal_items() {
        let mut item = compound("aspirin");
        assert!(item.mark_error("Failed to save session", 2_000));
        assert_eq!(item.status, ItemStatus::Error);
        assert_eq!(item.error_message.as_deref(), Some("Failed to save session"));
        assert_eq!(item.updated_at, 2_000);

        let mut done = compound("done");
        done.status = ItemStatus::Processing;
        done.status = ItemStatus::Done;
        assert!(!done.mark_error("late failure", 3_000));
        assert_eq!(done.status, ItemStatus::Done);
        assert!(done.error_message.is_none());
    }

    #[test]
    fn test_mark_error_never_moves_updated_at_backwards() {
        let mut item = compound("x");
        item.updated_at = 5_000;
        item.mark_error("boom", 4_000);
        assert_eq!(item.updated_at, 5_000);
    }

    #[test]
    fn test_item_serializes_with_inline_kind_tag() {
        let item = Item {
            id: "i1".to_string(),
            name: "cluster".to_string(),
            status: ItemStatus::Queued,
            error_message: None,
            updated_at: 42,
            payload: ItemPayload::GeneCluster {
                file_content: "LOCUS".to_string(),
            },
            fingerprints: vec![],
            fingerprint512: None,
            coverage: None,
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "gene_cluster");
        assert_eq!(json["fileContent"], "LOCUS");
        assert_eq!(json["updatedAt"], 42);
        assert_eq!(json["status"], "queued");
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn test_backend_session_with_extra_fields_deserializes() {
        let json = serde_json::json!({
            "sessionId": "s1",
            "created": 1700000000,
            "items": [{
                "id": "i1",
                "kind": "compound",
                "name": "ethanol",
                "smiles": "CCO",
                "status": "done",
                "errorMessage": null,
                "updatedAt": 1700000000123i64,
                "fingerprint512": "ab",
                "coverage": 0.5,
                "fingerprints": [{"id": "f1", "vectorEncoding": "ff00", "score": 0.5}]
            }]
        });

        let session: Session = serde_json::from_value(json).unwrap();
        let item = session.item("i1").unwrap();
        assert_eq!(item.status, ItemStatus::Done);
        assert_eq!(
            item.payload,
            ItemPayload::Compound {
                smiles: "CCO".to_string()
            }
        );
        assert_eq!(item.fingerprints.len(), 1);
        assert_eq!(item.fingerprint512.as_deref(), Some("ab"));
        assert_eq!(item.coverage, Some(0.5));
        assert!(session.settings.is_empty());
        assert!(session.is_settled());

        // Saving the session back must not drop the worker's results
        let saved = serde_json::to_value(&session).unwrap();
        assert_eq!(saved["items"][0]["fingerprint512"], "ab");
        assert_eq!(saved["items"][0]["coverage"], 0.5);
    }

    #[test]
    fn test_session_lookup_helpers() {
        let mut session = Session::new();
        let item = compound("benzene");
        let id = item.id.clone();
        session.items.push(item);

        assert!(session.contains(&id));
        assert!(!session.contains("missing"));
        assert_eq!(session.item_ids().collect::<Vec<_>>(), vec![id.as_str()]);

        session.item_mut(&id).unwrap().name = "toluene".to_string();
        assert_eq!(session.item(&id).unwrap().name, "toluene");
        assert!(!session.is_settled());
    }
}
