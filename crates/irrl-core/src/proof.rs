use serde::{Deserialize, Serialize};

use crate::reputation::ReputationCache;
use crate::types::{ContentId, Domain, EntityId, RealmId, Timestamp};

/// A portable, signed snapshot of a reputation, committing to its evidence
/// set through a Merkle root. Immutable once issued.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationProof {
    /// Always `"IRRL-Proof-v1"`.
    pub version: String,
    pub subject: EntityId,
    pub realm_id: RealmId,
    pub domain: Domain,
    pub reputation: ReputationCache,
    /// Issuer identity derived from the signing public key.
    pub issuer: String,
    pub issued_at: Timestamp,
    pub valid_until: Timestamp,
    /// Merkle root over the supporting attestation and evaluation ids.
    pub evidence_merkle_root: String,
    /// Base64 Ed25519 signature over the canonical proof body.
    pub signature: String,
}

/// Wire envelope for a proof: the proof body plus everything a third party
/// needs to verify it offline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofEnvelope {
    pub data: ReputationProof,
    /// Same base64 signature as `data.signature`, lifted for convenience.
    pub signature: String,
    /// SPKI PEM of the signing key.
    pub public_key: String,
    pub timestamp: Timestamp,
    /// Always `"IRRL-Proof-v1"`.
    pub version: String,
}

/// Result of verifying a proof envelope. The three checks are reported
/// independently so a caller can tell expiry from tampering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofVerification {
    pub valid: bool,
    pub signature_valid: bool,
    pub expired: bool,
    pub issuer_trusted: bool,
}

/// A stored proof row: the envelope plus its content id and evidence count.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProof {
    pub id: ContentId,
    pub envelope: ProofEnvelope,
    pub evidence_count: usize,
}
