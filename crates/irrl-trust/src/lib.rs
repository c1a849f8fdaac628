//! Evaluations and the trust graph built from them.
//!
//! `EvaluationStore` owns the write path: idempotent upsert of directed
//! trust edges, audit emission, and reputation-cache invalidation.
//! `TrustEngine` owns the read path: it loads the bounded edge set for a
//! query's domain and runs the graph search in memory.

pub mod graph;

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use irrl_audit::AuditLog;
use irrl_core::{
    ContentId, Domain, EntityId, Evaluation, EvaluationFilter, IrrlError, RealmId, Timestamp,
};
use irrl_crypto::{content_id, InstanceKey};
use irrl_store::Repository;

pub use graph::{
    effective_params, TrustGraph, TrustMetadata, TrustPath, TrustQuery, TrustResult,
};

/// Caller input for an evaluation upsert.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEvaluation {
    pub from: EntityId,
    pub to: EntityId,
    pub realm_id: RealmId,
    pub domain: Domain,
    /// Integer trust score, 0..=100.
    pub score: u8,
    /// Defaults to 1.0.
    pub weight: Option<f64>,
    pub rationale: Option<String>,
    #[serde(default)]
    pub supporting_attestations: Vec<ContentId>,
    pub expires_at: Option<Timestamp>,
}

pub struct EvaluationStore {
    repo: Arc<dyn Repository>,
    audit: Arc<AuditLog>,
    key: Arc<InstanceKey>,
}

impl EvaluationStore {
    pub fn new(repo: Arc<dyn Repository>, audit: Arc<AuditLog>, key: Arc<InstanceKey>) -> Self {
        Self { repo, audit, key }
    }

    /// Upsert by `(from, to, realmId, domain)`.
    ///
    /// The first submission mints a content id; later submissions update
    /// `score`, `weight`, `rationale`, `supportingAttestations` and the
    /// signature in place, keeping the id. Every write invalidates the
    /// subject's reputation cache in the realm before returning, so a
    /// concurrent reader sees either the old cache or a fresh computation.
    pub async fn upsert(&self, input: SubmitEvaluation) -> Result<Evaluation, IrrlError> {
        if input.from.is_empty() || input.to.is_empty() {
            return Err(IrrlError::Validation("from and to must not be empty".into()));
        }
        if input.from == input.to {
            return Err(IrrlError::Validation("self-evaluation is not allowed".into()));
        }
        if input.score > 100 {
            return Err(IrrlError::Validation("score must be in 0..=100".into()));
        }
        let weight = input.weight.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&weight) {
            return Err(IrrlError::Validation("weight must be in [0, 1]".into()));
        }
        if self.repo.get_realm(&input.realm_id)?.is_none() {
            return Err(IrrlError::InvalidRealm(input.realm_id));
        }
        for reference in &input.supporting_attestations {
            if self.repo.get_attestation(reference)?.is_none() {
                return Err(IrrlError::Validation(format!(
                    "supporting attestation not found: {reference}"
                )));
            }
        }

        let existing =
            self.repo
                .get_evaluation(&input.from, &input.to, &input.realm_id, &input.domain)?;

        let evaluation = match existing {
            None => {
                let now = Utc::now();
                let body = json!({
                    "from": &input.from,
                    "to": &input.to,
                    "realmId": &input.realm_id,
                    "domain": &input.domain,
                    "score": input.score,
                    "ts": now,
                });
                Evaluation {
                    id: content_id(&body),
                    signature: self.key.sign_object(&body),
                    from_entity: input.from,
                    to_entity: input.to,
                    realm_id: input.realm_id,
                    domain: input.domain,
                    score: input.score,
                    weight,
                    rationale: input.rationale,
                    supporting_attestations: input.supporting_attestations,
                    expires_at: input.expires_at,
                    created_at: now,
                }
            }
            Some(mut row) => {
                let body = json!({
                    "from": &row.from_entity,
                    "to": &row.to_entity,
                    "realmId": &row.realm_id,
                    "domain": &row.domain,
                    "score": input.score,
                    "ts": row.created_at,
                });
                row.score = input.score;
                row.weight = weight;
                row.rationale = input.rationale;
                row.supporting_attestations = input.supporting_attestations;
                row.signature = self.key.sign_object(&body);
                row.expires_at = input.expires_at;
                row
            }
        };

        self.repo.put_evaluation(&evaluation)?;
        self.repo
            .invalidate_reputation(&evaluation.to_entity, &evaluation.realm_id)?;
        self.audit
            .append(
                "evaluation.created",
                &evaluation.from_entity,
                &[evaluation.id.clone(), evaluation.realm_id.clone()],
                json!({
                    "to": &evaluation.to_entity,
                    "domain": &evaluation.domain,
                    "score": evaluation.score,
                }),
            )
            .await?;
        info!(evaluation = %evaluation.id, to = %evaluation.to_entity, "evaluation upserted");
        Ok(evaluation)
    }

    pub fn list(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>, IrrlError> {
        let mut rows: Vec<Evaluation> = self
            .repo
            .iter_evaluations()?
            .into_iter()
            .filter(|e| filter.from_entity.as_ref().is_none_or(|f| &e.from_entity == f))
            .filter(|e| filter.to_entity.as_ref().is_none_or(|t| &e.to_entity == t))
            .filter(|e| filter.realm_id.as_ref().is_none_or(|r| &e.realm_id == r))
            .filter(|e| filter.domain.as_ref().is_none_or(|d| &e.domain == d))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50).min(200);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

/// Read side: transitive trust queries over the stored evaluation graph.
pub struct TrustEngine {
    repo: Arc<dyn Repository>,
}

impl TrustEngine {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Load the edge set for the query's domain (optionally realm-scoped)
    /// and run the search. Memory is released when the result returns.
    pub fn transitive(&self, query: &TrustQuery) -> Result<TrustResult, IrrlError> {
        let realm_rules = match &query.realm_id {
            Some(realm_id) => Some(
                self.repo
                    .get_realm(realm_id)?
                    .ok_or_else(|| IrrlError::InvalidRealm(realm_id.clone()))?
                    .rules,
            ),
            None => None,
        };
        let (max_depth, decay_factor, min_confidence) =
            effective_params(query, realm_rules.as_ref());

        let mut evaluations = self.repo.iter_evaluations_in_domain(&query.domain)?;
        if let Some(realm_id) = &query.realm_id {
            evaluations.retain(|e| &e.realm_id == realm_id);
        }

        let graph = TrustGraph::from_evaluations(evaluations);
        Ok(graph.transitive(&query.from, &query.to, &query.domain, max_depth, decay_factor, min_confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irrl_core::{Realm, RealmRules};
    use irrl_store::SledRepository;

    struct Fixture {
        store: EvaluationStore,
        engine: TrustEngine,
        repo: Arc<dyn Repository>,
        dir: std::path::PathBuf,
    }

    impl Fixture {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("irrl_trust_{}_{name}", std::process::id()));
            let _ = std::fs::remove_dir_all(&dir);
            let repo: Arc<dyn Repository> = Arc::new(SledRepository::open(&dir).unwrap());

            let now = Utc::now();
            repo.put_realm(&Realm {
                id: "realm-1".into(),
                name: "Realm".into(),
                description: String::new(),
                parent: None,
                path: "realm-1".into(),
                depth: 0,
                domain: "d".into(),
                rules: RealmRules::default(),
                public_key: "pem".into(),
                created_by: "admin".into(),
                created_at: now,
                updated_at: now,
            })
            .unwrap();

            let audit = Arc::new(AuditLog::new(Arc::clone(&repo), true));
            let key = Arc::new(InstanceKey::generate());
            Self {
                store: EvaluationStore::new(Arc::clone(&repo), audit, key),
                engine: TrustEngine::new(Arc::clone(&repo)),
                repo,
                dir,
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn submission(from: &str, to: &str, score: u8) -> SubmitEvaluation {
        SubmitEvaluation {
            from: from.into(),
            to: to.into(),
            realm_id: "realm-1".into(),
            domain: "d".into(),
            score,
            weight: None,
            rationale: None,
            supporting_attestations: vec![],
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn resubmission_updates_in_place_keeping_the_id() {
        let f = Fixture::new("upsert");
        let first = f.store.upsert(submission("alice", "bob", 40)).await.unwrap();

        let mut again = submission("alice", "bob", 90);
        again.rationale = Some("improved".into());
        let second = f.store.upsert(again).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.score, 90);
        assert_eq!(second.rationale.as_deref(), Some("improved"));
        assert_ne!(second.signature, first.signature);
        assert_eq!(f.repo.iter_evaluations().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_validates_inputs() {
        let f = Fixture::new("validate");
        assert!(f.store.upsert(submission("alice", "alice", 50)).await.is_err());

        let mut bad_weight = submission("alice", "bob", 50);
        bad_weight.weight = Some(1.5);
        assert!(f.store.upsert(bad_weight).await.is_err());

        let mut bad_realm = submission("alice", "bob", 50);
        bad_realm.realm_id = "ghost".into();
        assert!(matches!(
            f.store.upsert(bad_realm).await.unwrap_err(),
            IrrlError::InvalidRealm(_)
        ));
    }

    #[tokio::test]
    async fn upsert_invalidates_the_subjects_reputation_cache() {
        let f = Fixture::new("invalidate");
        let cache = irrl_core::ReputationCache {
            subject: "bob".into(),
            realm_id: "realm-1".into(),
            domain: "d".into(),
            score: 50.0,
            confidence: 0.5,
            evaluation_count: 0,
            attestation_count: 0,
            breakdown: irrl_core::ReputationBreakdown {
                raw_score: 50.0,
                attestation_bonus: 0.0,
                staleness_penalty: 0.0,
                verified_attestation_count: 0,
                staleness_days: 0.0,
                sybil: irrl_core::SybilResistance {
                    score: 0.0,
                    factors: irrl_core::SybilFactors {
                        evaluator_diversity: 0.0,
                        verification_depth: 0.0,
                        temporal_spread: 0.0,
                        cross_realm_consistency: 0.0,
                    },
                    warnings: vec![],
                },
            },
            computed_at: Utc::now(),
            valid_until: Utc::now() + chrono::Duration::seconds(300),
        };
        f.repo.put_reputation(&cache).unwrap();

        f.store.upsert(submission("alice", "bob", 70)).await.unwrap();
        assert!(f.repo.get_reputation("bob", "realm-1", "d").unwrap().is_none());
    }

    #[tokio::test]
    async fn engine_answers_transitive_queries_from_storage() {
        let f = Fixture::new("engine");
        f.store.upsert(submission("A", "B", 100)).await.unwrap();
        f.store.upsert(submission("B", "C", 100)).await.unwrap();

        let query = TrustQuery {
            from: "A".into(),
            to: "C".into(),
            domain: "d".into(),
            realm_id: Some("realm-1".into()),
            max_depth: None,
            decay_factor: None,
            min_confidence: None,
        };
        let result = f.engine.transitive(&query).unwrap();
        assert!((result.score - 0.64).abs() < 1e-9);
        assert_eq!(result.metadata.max_depth, 5);

        // The same query again returns the same score.
        let again = f.engine.transitive(&query).unwrap();
        assert!((again.score - result.score).abs() < 1e-12);
    }
}
