use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ContentId, EntityId, RealmId, ResolverId, Timestamp};

/// Lifecycle state of an attestation.
///
/// ```text
/// pending ──verify(verified)──► verified ──revoke──► revoked
/// pending ──verify(failed)───► failed  ──re-verify──► verified
/// *       ──scan(expiresAt < now)──► expired
/// ```
///
/// `revoked` and `expired` are terminal for verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    Pending,
    Verified,
    Failed,
    Revoked,
    Expired,
}

impl AttestationStatus {
    /// Terminal states admit no further verification runs.
    pub fn is_terminal(self) -> bool {
        matches!(self, AttestationStatus::Revoked | AttestationStatus::Expired)
    }
}

/// A signed claim about a subject, backed by machine-verifiable evidence.
///
/// `id` is the content id of the defining fields; everything except `status`,
/// `verification_count`, `last_verified_at` and `updated_at` is immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub id: ContentId,
    pub realm_id: RealmId,
    pub attester: EntityId,
    pub subject: EntityId,
    pub claim: String,
    pub resolver_id: ResolverId,
    pub evidence: Value,
    /// Content ids of attestations this one builds on.
    pub references: Vec<ContentId>,
    /// Base64 Ed25519 signature by the issuing instance key.
    pub signature: String,
    pub status: AttestationStatus,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub verification_count: u32,
    pub last_verified_at: Option<Timestamp>,
}

/// Outcome class of a single verification run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Verified,
    Failed,
    Error,
}

impl RunStatus {
    /// Attestation status this run outcome maps to. `error` leaves the
    /// attestation re-verifiable.
    pub fn next_attestation_status(self) -> AttestationStatus {
        match self {
            RunStatus::Verified => AttestationStatus::Verified,
            RunStatus::Failed   => AttestationStatus::Failed,
            RunStatus::Error    => AttestationStatus::Pending,
        }
    }
}

/// Immutable record of one resolver invocation against an attestation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRun {
    pub id: ContentId,
    pub attestation_id: ContentId,
    pub resolver_id: ResolverId,
    pub resolver_version: String,
    pub status: RunStatus,
    pub output: Value,
    /// `sha256(canonical(output))`, for cross-instance comparison of
    /// deterministic resolvers.
    pub output_hash: String,
    /// Evidence snapshot the resolver actually saw.
    pub snapshot: Value,
    pub duration_ms: u64,
    pub triggered_by: EntityId,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

/// Filter for attestation listings.
#[derive(Clone, Debug, Default)]
pub struct AttestationFilter {
    pub realm_id: Option<RealmId>,
    pub subject: Option<EntityId>,
    pub status: Option<AttestationStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
