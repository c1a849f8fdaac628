//! Reputation aggregation.
//!
//! A subject's reputation in a `(realm, domain)` is the half-life-weighted
//! mean of the evaluations about them, nudged up by verified attestations
//! and down by staleness, clamped to the realm's score bounds. Results are
//! memoized per `(subject, realm, domain)` with a short TTL and dropped
//! whenever a new evaluation touches the subject in the realm.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use irrl_core::{
    Attestation, Evaluation, IrrlError, ReputationBreakdown, ReputationCache, SybilFactors,
    SybilResistance, Timestamp, CONFIDENCE_SATURATION_COUNT, DEFAULT_MAX_SCORE,
    NEUTRAL_SCORE, REPUTATION_CACHE_TTL_SECS, SYBIL_DEPTH_SATURATION,
    SYBIL_DIVERSITY_SATURATION, SYBIL_SPREAD_SATURATION_DAYS,
};
use irrl_store::Repository;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Clamp bounds and decay horizon, taken from the realm's rules.
#[derive(Clone, Copy, Debug)]
pub struct DecayConfig {
    pub half_life_days: f64,
    pub min_score: f64,
    pub max_score: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: 180.0,
            min_score: 0.0,
            max_score: DEFAULT_MAX_SCORE,
        }
    }
}

/// Everything the pure aggregation needs, gathered by the service.
pub struct ReputationInput<'a> {
    pub evaluations: &'a [Evaluation],
    pub attestation_count: usize,
    pub verified_attestation_count: usize,
    pub newest_evaluation_date: Option<Timestamp>,
}

/// The score/confidence pair with its full breakdown, before caching.
pub struct ComputedReputation {
    pub score: f64,
    pub confidence: f64,
    pub raw_score: f64,
    pub attestation_bonus: f64,
    pub staleness_penalty: f64,
    pub staleness_days: f64,
}

/// Time-decayed aggregation of an evaluation set.
pub fn compute_reputation_with_decay(
    input: &ReputationInput<'_>,
    config: &DecayConfig,
    now: Timestamp,
) -> ComputedReputation {
    let half_life = config.half_life_days.max(f64::MIN_POSITIVE);

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for eval in input.evaluations {
        let age_days = (now - eval.created_at).num_seconds() as f64 / SECONDS_PER_DAY;
        let weight = eval.weight * 0.5f64.powf(age_days / half_life);
        weighted_sum += f64::from(eval.score) * weight;
        weight_sum += weight;
    }
    let raw_score = if weight_sum > 0.0 {
        weighted_sum / weight_sum
    } else {
        NEUTRAL_SCORE
    };

    let verified = input.verified_attestation_count as f64;
    let attestation_bonus = if input.verified_attestation_count == 0 {
        0.0
    } else {
        (verified / input.attestation_count as f64) * 10.0 * (verified / 5.0).min(1.0)
    };

    let staleness_days = input
        .newest_evaluation_date
        .map(|newest| (now - newest).num_seconds() as f64 / SECONDS_PER_DAY)
        .unwrap_or(0.0);
    let staleness_penalty = ((staleness_days - half_life) * 0.1).max(0.0);

    let score = (raw_score + attestation_bonus - staleness_penalty)
        .clamp(config.min_score, config.max_score);
    let confidence = (input.evaluations.len() as f64 / CONFIDENCE_SATURATION_COUNT as f64)
        .min(1.0)
        * 0.5f64.powf(staleness_days / half_life);

    ComputedReputation {
        score: round_to(score, 1),
        confidence: round_to(confidence, 2),
        raw_score,
        attestation_bonus,
        staleness_penalty,
        staleness_days,
    }
}

/// How resistant the evaluation population looks to Sybil inflation.
pub fn compute_sybil_resistance(
    evaluations: &[Evaluation],
    attestations: &[Attestation],
) -> SybilResistance {
    let unique_evaluators = evaluations
        .iter()
        .map(|e| e.from_entity.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len();
    let evaluator_diversity =
        (unique_evaluators as f64 / SYBIL_DIVERSITY_SATURATION as f64).min(1.0);

    let avg_verifications = if attestations.is_empty() {
        0.0
    } else {
        attestations.iter().map(|a| a.verification_count as f64).sum::<f64>()
            / attestations.len() as f64
    };
    let verification_depth = (avg_verifications / SYBIL_DEPTH_SATURATION).min(1.0);

    let span_days = match (
        evaluations.iter().map(|e| e.created_at).min(),
        evaluations.iter().map(|e| e.created_at).max(),
    ) {
        (Some(oldest), Some(newest)) => {
            (newest - oldest).num_seconds() as f64 / SECONDS_PER_DAY
        }
        _ => 0.0,
    };
    let temporal_spread = (span_days / SYBIL_SPREAD_SATURATION_DAYS).min(1.0);

    let unique_realms = evaluations
        .iter()
        .map(|e| e.realm_id.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len();
    let cross_realm_consistency =
        ((unique_realms.saturating_sub(1)) as f64 / 3.0).min(1.0);

    let mut warnings = Vec::new();
    if unique_evaluators < 3 {
        warnings.push("Low evaluator diversity".to_string());
    }
    if avg_verifications < 2.0 {
        warnings.push("Low verification depth".to_string());
    }
    if span_days < 7.0 {
        warnings.push("Suspicious temporal clustering".to_string());
    }

    let score = 0.35 * evaluator_diversity
        + 0.25 * verification_depth
        + 0.20 * temporal_spread
        + 0.20 * cross_realm_consistency;

    SybilResistance {
        score: round_to(score, 2),
        factors: SybilFactors {
            evaluator_diversity,
            verification_depth,
            temporal_spread,
            cross_realm_consistency,
        },
        warnings,
    }
}

/// Read-through reputation with TTL caching.
pub struct ReputationService {
    repo: Arc<dyn Repository>,
}

impl ReputationService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Return the cached reputation when fresh, otherwise recompute and
    /// cache. `refresh` bypasses the cache.
    pub fn reputation(
        &self,
        subject: &str,
        realm_id: &str,
        domain: &str,
        refresh: bool,
    ) -> Result<ReputationCache, IrrlError> {
        let now = Utc::now();
        if !refresh {
            if let Some(cached) = self.repo.get_reputation(subject, realm_id, domain)? {
                if cached.is_valid_at(now) {
                    return Ok(cached);
                }
            }
        }

        let realm = self
            .repo
            .get_realm(realm_id)?
            .ok_or_else(|| IrrlError::InvalidRealm(realm_id.to_string()))?;
        let config = DecayConfig {
            half_life_days: realm.rules.half_life_days().unwrap_or(180.0),
            min_score: realm.rules.min_score,
            max_score: DEFAULT_MAX_SCORE,
        };

        let evaluations = self
            .repo
            .iter_evaluations_for_subject(subject, realm_id, domain)?;
        let attestations = self.repo.iter_attestations_for_subject(realm_id, subject)?;
        let verified_count = attestations
            .iter()
            .filter(|a| a.status == irrl_core::AttestationStatus::Verified)
            .count();

        let computed = compute_reputation_with_decay(
            &ReputationInput {
                evaluations: &evaluations,
                attestation_count: attestations.len(),
                verified_attestation_count: verified_count,
                newest_evaluation_date: evaluations.iter().map(|e| e.created_at).max(),
            },
            &config,
            now,
        );
        let sybil = compute_sybil_resistance(&evaluations, &attestations);

        let cache = ReputationCache {
            subject: subject.to_string(),
            realm_id: realm_id.to_string(),
            domain: domain.to_string(),
            score: computed.score,
            confidence: computed.confidence,
            evaluation_count: evaluations.len(),
            attestation_count: attestations.len(),
            breakdown: ReputationBreakdown {
                raw_score: computed.raw_score,
                attestation_bonus: computed.attestation_bonus,
                staleness_penalty: computed.staleness_penalty,
                verified_attestation_count: verified_count,
                staleness_days: computed.staleness_days,
                sybil,
            },
            computed_at: now,
            valid_until: now + chrono::Duration::seconds(REPUTATION_CACHE_TTL_SECS),
        };
        self.repo.put_reputation(&cache)?;
        debug!(subject, realm_id, domain, score = cache.score, "reputation computed");
        Ok(cache)
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
