use serde::{Deserialize, Serialize};

use crate::types::{ContentId, Domain, EntityId, RealmId, Timestamp};

/// A signed directed trust edge, scoped to a realm and domain.
///
/// At most one active evaluation exists per `(from, to, realmId, domain)`;
/// re-submission updates the row in place, keeping the original `id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: ContentId,
    pub from_entity: EntityId,
    pub to_entity: EntityId,
    pub realm_id: RealmId,
    pub domain: Domain,
    /// Integer trust score, 0..=100.
    pub score: u8,
    /// Evaluator-declared weight in `[0, 1]`.
    pub weight: f64,
    pub rationale: Option<String>,
    /// Content ids of attestations cited in support.
    pub supporting_attestations: Vec<ContentId>,
    /// Base64 Ed25519 signature by the issuing instance key.
    pub signature: String,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Evaluation {
    /// Edge strength in `[0, 1]` used by the trust graph.
    pub fn strength(&self) -> f64 {
        f64::from(self.score) / 100.0
    }
}

/// Filter for evaluation listings.
#[derive(Clone, Debug, Default)]
pub struct EvaluationFilter {
    pub from_entity: Option<EntityId>,
    pub to_entity: Option<EntityId>,
    pub realm_id: Option<RealmId>,
    pub domain: Option<Domain>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
