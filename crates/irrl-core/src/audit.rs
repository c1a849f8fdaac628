use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EntityId, Timestamp};

/// One event in the append-only audit chain.
///
/// `hash = sha256(canonical({type, actor, entityIds asc, payload, timestamp,
/// previousHash}))`; the first event in a chain links to `"genesis"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub actor: EntityId,
    /// Ids of the entities the event touches, sorted ascending.
    pub entity_ids: Vec<String>,
    pub payload: Value,
    pub previous_hash: String,
    pub hash: String,
    pub timestamp: Timestamp,
}

/// Result of an end-to-end chain walk.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub valid: bool,
    pub checked_events: usize,
    /// Index of the first event whose link or hash failed, when invalid.
    pub broken_at: Option<usize>,
}
