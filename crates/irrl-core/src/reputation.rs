use serde::{Deserialize, Serialize};

use crate::types::{Domain, EntityId, RealmId, Timestamp};

/// Memoized reputation for one `(subject, realm, domain)` key.
///
/// Rows expire `REPUTATION_CACHE_TTL_SECS` after computation and are dropped
/// eagerly whenever a new evaluation touches the subject in the realm.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationCache {
    pub subject: EntityId,
    pub realm_id: RealmId,
    pub domain: Domain,
    /// Aggregate score in `[minScore, maxScore]`, rounded to 1 decimal.
    pub score: f64,
    /// Confidence in `[0, 1]`, rounded to 2 decimals.
    pub confidence: f64,
    pub evaluation_count: usize,
    pub attestation_count: usize,
    pub breakdown: ReputationBreakdown,
    pub computed_at: Timestamp,
    pub valid_until: Timestamp,
}

impl ReputationCache {
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.valid_until > now
    }
}

/// How the aggregate score was assembled.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationBreakdown {
    /// Half-life-weighted mean of evaluation scores before adjustments.
    pub raw_score: f64,
    pub attestation_bonus: f64,
    pub staleness_penalty: f64,
    pub verified_attestation_count: usize,
    /// Days since the newest evaluation.
    pub staleness_days: f64,
    pub sybil: SybilResistance,
}

/// Resistance of the evaluation population to Sybil inflation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SybilResistance {
    /// Weighted factor blend in `[0, 1]`, rounded to 2 decimals.
    pub score: f64,
    pub factors: SybilFactors,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SybilFactors {
    pub evaluator_diversity: f64,
    pub verification_depth: f64,
    pub temporal_spread: f64,
    pub cross_realm_consistency: f64,
}
