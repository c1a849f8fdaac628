//! Append-only, hash-chained audit log.
//!
//! Every significant mutation in the system lands here as an event whose
//! hash covers its content plus the previous event's hash, so any later
//! tampering with a stored event breaks the chain at that index. Appends are
//! strictly serial: a single async mutex orders concurrent writers, and the
//! repository assigns sequence numbers under that lock.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use irrl_core::{AuditEvent, ChainReport, IrrlError, AUDIT_DISABLED_HASH, AUDIT_GENESIS_HASH};
use irrl_crypto::{canonical_bytes, sha256_hex};
use irrl_store::Repository;

pub struct AuditLog {
    repo: Arc<dyn Repository>,
    enabled: bool,
    /// Hash of the chain tail. `None` until the first append reads it back
    /// from storage (`"genesis"` for an empty chain).
    tail: Mutex<Option<String>>,
}

impl AuditLog {
    pub fn new(repo: Arc<dyn Repository>, enabled: bool) -> Self {
        Self { repo, enabled, tail: Mutex::new(None) }
    }

    /// Append one event and return it.
    ///
    /// With persistence disabled the returned event is still well-formed,
    /// but carries `previousHash = hash = "disabled"` and no chain state.
    pub async fn append(
        &self,
        event_type: &str,
        actor: &str,
        entity_ids: &[String],
        payload: Value,
    ) -> Result<AuditEvent, IrrlError> {
        let timestamp = Utc::now();
        let mut entity_ids: Vec<String> = entity_ids.to_vec();
        entity_ids.sort();

        if !self.enabled {
            let body_hash = event_hash(
                event_type, actor, &entity_ids, &payload, &timestamp, AUDIT_DISABLED_HASH,
            );
            return Ok(AuditEvent {
                id: event_id(&body_hash),
                event_type: event_type.to_string(),
                actor: actor.to_string(),
                entity_ids,
                payload,
                previous_hash: AUDIT_DISABLED_HASH.to_string(),
                hash: AUDIT_DISABLED_HASH.to_string(),
                timestamp,
            });
        }

        let mut tail = self.tail.lock().await;
        let previous_hash = match tail.as_ref() {
            Some(h) => h.clone(),
            None => match self.repo.last_audit_event()? {
                Some(last) => last.hash,
                None => AUDIT_GENESIS_HASH.to_string(),
            },
        };

        let hash = event_hash(
            event_type, actor, &entity_ids, &payload, &timestamp, &previous_hash,
        );
        let event = AuditEvent {
            id: event_id(&hash),
            event_type: event_type.to_string(),
            actor: actor.to_string(),
            entity_ids,
            payload,
            previous_hash,
            hash: hash.clone(),
            timestamp,
        };

        let seq = self.repo.append_audit(&event)?;
        *tail = Some(hash);
        debug!(seq, event_type, "audit event appended");
        Ok(event)
    }

    /// Walk the stored chain in insertion order, recomputing every hash and
    /// link. Returns at the first break.
    pub fn verify_chain(&self) -> Result<ChainReport, IrrlError> {
        let events = self.repo.iter_audit()?;
        let mut previous = AUDIT_GENESIS_HASH.to_string();

        for (index, event) in events.iter().enumerate() {
            let recomputed = event_hash(
                &event.event_type,
                &event.actor,
                &event.entity_ids,
                &event.payload,
                &event.timestamp,
                &event.previous_hash,
            );
            if event.previous_hash != previous || event.hash != recomputed {
                return Ok(ChainReport {
                    valid: false,
                    checked_events: index + 1,
                    broken_at: Some(index),
                });
            }
            previous = event.hash.clone();
        }

        Ok(ChainReport { valid: true, checked_events: events.len(), broken_at: None })
    }
}

fn event_hash(
    event_type: &str,
    actor: &str,
    entity_ids: &[String],
    payload: &Value,
    timestamp: &irrl_core::Timestamp,
    previous_hash: &str,
) -> String {
    let body = json!({
        "type": event_type,
        "actor": actor,
        "entityIds": entity_ids,
        "payload": payload,
        "timestamp": timestamp,
        "previousHash": previous_hash,
    });
    sha256_hex(&canonical_bytes(&body))
}

fn event_id(hash: &str) -> String {
    format!("evt_{}", &hash[..32])
}
