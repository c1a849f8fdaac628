//! Portable reputation proofs.
//!
//! A proof is a signed snapshot of a cached reputation plus a Merkle
//! commitment over the ids of the supporting evidence (verified
//! attestations for the subject in the realm, then the subject's
//! evaluations in the domain, each group ordered by id ascending). The
//! ordering is reconstructible from storage, so inclusion proofs can be
//! produced long after issuance and still match the committed root.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::info;

use irrl_audit::AuditLog;
use irrl_core::{
    AttestationStatus, ContentId, IrrlError, ProofEnvelope, ProofVerification, ReputationProof,
    StoredProof, DEFAULT_PROOF_VALIDITY_DAYS, PROOF_VERSION,
};
use irrl_crypto::{
    content_id, generate_proof, issuer_id_of, merkle_root, verify_object, verify_proof,
    InstanceKey, MerkleProof,
};
use irrl_store::Repository;

/// Filter for proof listings.
#[derive(Clone, Debug, Default)]
pub struct ProofFilter {
    pub subject: Option<String>,
    pub realm_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub struct ProofService {
    repo: Arc<dyn Repository>,
    audit: Arc<AuditLog>,
    key: Arc<InstanceKey>,
    /// Issuer identities whose proofs verify as trusted. Always contains
    /// the instance's own issuer id; extended by configuration.
    trusted_issuers: Vec<String>,
}

impl ProofService {
    pub fn new(
        repo: Arc<dyn Repository>,
        audit: Arc<AuditLog>,
        key: Arc<InstanceKey>,
        extra_issuer_pems: &[String],
    ) -> Self {
        let mut trusted_issuers = vec![key.issuer_id()];
        trusted_issuers.extend(extra_issuer_pems.iter().map(|pem| issuer_id_of(pem)));
        Self { repo, audit, key, trusted_issuers }
    }

    /// Issue a proof for `(subject, realm, domain)`. Requires a cached
    /// reputation: proofs snapshot what the instance has already computed.
    pub async fn generate(
        &self,
        subject: &str,
        realm_id: &str,
        domain: &str,
        valid_for_days: Option<i64>,
    ) -> Result<StoredProof, IrrlError> {
        let reputation = self
            .repo
            .get_reputation(subject, realm_id, domain)?
            .ok_or_else(|| {
                IrrlError::not_found("reputation", format!("{subject}/{realm_id}/{domain}"))
            })?;

        let leaves = self.evidence_leaves(subject, realm_id, domain)?;
        let evidence_merkle_root = merkle_root(&leaves);

        let now = Utc::now();
        let valid_until =
            now + Duration::days(valid_for_days.unwrap_or(DEFAULT_PROOF_VALIDITY_DAYS));
        let body = json!({
            "version": PROOF_VERSION,
            "subject": subject,
            "realmId": realm_id,
            "domain": domain,
            "reputation": reputation,
            "issuer": self.key.issuer_id(),
            "issuedAt": now,
            "validUntil": valid_until,
            "evidenceMerkleRoot": evidence_merkle_root,
        });
        let signature = self.key.sign_object(&body);
        let id = content_id(&body);

        let proof = ReputationProof {
            version: PROOF_VERSION.to_string(),
            subject: subject.to_string(),
            realm_id: realm_id.to_string(),
            domain: domain.to_string(),
            reputation,
            issuer: self.key.issuer_id(),
            issued_at: now,
            valid_until,
            evidence_merkle_root,
            signature: signature.clone(),
        };
        let stored = StoredProof {
            id: id.clone(),
            envelope: ProofEnvelope {
                data: proof,
                signature,
                public_key: self.key.public_key_pem().to_string(),
                timestamp: now,
                version: PROOF_VERSION.to_string(),
            },
            evidence_count: leaves.len(),
        };

        self.repo.put_proof(&stored)?;
        self.audit
            .append(
                "proof.generated",
                subject,
                &[id.clone(), realm_id.to_string()],
                json!({"domain": domain, "evidenceCount": stored.evidence_count}),
            )
            .await?;
        info!(proof = %id, subject, "proof generated");
        Ok(stored)
    }

    /// Verify an envelope. The three checks are independent so callers can
    /// tell expiry from tampering from an unknown issuer.
    pub fn verify(&self, envelope: &ProofEnvelope) -> ProofVerification {
        let signature_valid =
            verify_object(&envelope.public_key, &signable_body(&envelope.data), &envelope.signature);
        let expired = envelope.data.valid_until <= Utc::now();
        let issuer_trusted = envelope.data.issuer == issuer_id_of(&envelope.public_key)
            && self.trusted_issuers.contains(&envelope.data.issuer);

        ProofVerification {
            valid: signature_valid && !expired && issuer_trusted,
            signature_valid,
            expired,
            issuer_trusted,
        }
    }

    pub fn get(&self, id: &str) -> Result<StoredProof, IrrlError> {
        self.repo
            .get_proof(&id.to_string())?
            .ok_or_else(|| IrrlError::not_found("proof", id))
    }

    pub fn list(&self, filter: &ProofFilter) -> Result<Vec<StoredProof>, IrrlError> {
        let mut rows: Vec<StoredProof> = self
            .repo
            .iter_proofs()?
            .into_iter()
            .filter(|p| filter.subject.as_ref().is_none_or(|s| &p.envelope.data.subject == s))
            .filter(|p| filter.realm_id.as_ref().is_none_or(|r| &p.envelope.data.realm_id == r))
            .collect();
        rows.sort_by(|a, b| b.envelope.data.issued_at.cmp(&a.envelope.data.issued_at));
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50).min(200);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    /// Produce a Merkle inclusion proof for one evidence id of a stored
    /// proof. The leaf list is rebuilt from storage; if the evidence set
    /// changed since issuance the resulting root will no longer match the
    /// committed one and verification will fail, which is the honest answer.
    pub fn evidence_proof(
        &self,
        proof_id: &str,
        evidence_id: &str,
    ) -> Result<MerkleProof, IrrlError> {
        let stored = self.get(proof_id)?;
        let data = &stored.envelope.data;
        let leaves = self.evidence_leaves(&data.subject, &data.realm_id, &data.domain)?;
        let index = leaves
            .iter()
            .position(|leaf| leaf == evidence_id)
            .ok_or_else(|| IrrlError::not_found("evidence", evidence_id))?;
        generate_proof(&leaves, index)
            .ok_or_else(|| IrrlError::Internal("evidence index out of range".into()))
    }

    /// An inclusion proof holds only if it folds to its own root *and* that
    /// root is the one the reputation proof committed to.
    pub fn verify_evidence(&self, proof: &MerkleProof, expected_root: &str) -> bool {
        verify_proof(proof) && proof.root == expected_root
    }

    /// The committed leaf order: verified attestation ids for the subject
    /// in the realm, ascending, then evaluation ids for the subject in the
    /// domain, ascending.
    fn evidence_leaves(
        &self,
        subject: &str,
        realm_id: &str,
        domain: &str,
    ) -> Result<Vec<ContentId>, IrrlError> {
        let mut attestation_ids: Vec<ContentId> = self
            .repo
            .iter_attestations_for_subject(realm_id, subject)?
            .into_iter()
            .filter(|a| a.status == AttestationStatus::Verified)
            .map(|a| a.id)
            .collect();
        attestation_ids.sort();

        let mut evaluation_ids: Vec<ContentId> = self
            .repo
            .iter_evaluations_for_subject(subject, realm_id, domain)?
            .into_iter()
            .map(|e| e.id)
            .collect();
        evaluation_ids.sort();

        attestation_ids.extend(evaluation_ids);
        Ok(attestation_ids)
    }
}

/// The canonical sign/verify input: the proof record without its signature.
fn signable_body(proof: &ReputationProof) -> Value {
    json!({
        "version": proof.version,
        "subject": proof.subject,
        "realmId": proof.realm_id,
        "domain": proof.domain,
        "reputation": proof.reputation,
        "issuer": proof.issuer,
        "issuedAt": proof.issued_at,
        "validUntil": proof.valid_until,
        "evidenceMerkleRoot": proof.evidence_merkle_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use irrl_core::{
        Attestation, Evaluation, Realm, RealmRules, ReputationBreakdown, ReputationCache,
        SybilFactors, SybilResistance,
    };
    use irrl_store::SledRepository;

    struct Fixture {
        service: ProofService,
        repo: Arc<dyn Repository>,
        dir: std::path::PathBuf,
    }

    impl Fixture {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("irrl_proof_{}_{name}", std::process::id()));
            let _ = std::fs::remove_dir_all(&dir);
            let repo: Arc<dyn Repository> = Arc::new(SledRepository::open(&dir).unwrap());
            let audit = Arc::new(AuditLog::new(Arc::clone(&repo), true));
            let key = Arc::new(InstanceKey::generate());
            Self {
                service: ProofService::new(Arc::clone(&repo), audit, key, &[]),
                repo,
                dir,
            }
        }

        fn seed(&self) {
            let now = Utc::now();
            self.repo
                .put_realm(&Realm {
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

            for (suffix, status) in [("a1", AttestationStatus::Verified),
                                     ("a2", AttestationStatus::Verified),
                                     ("a3", AttestationStatus::Pending)] {
                self.repo
                    .put_attestation(&Attestation {
                        id: format!("cid_{}", suffix.repeat(32)),
                        realm_id: "realm-1".into(),
                        attester: "alice".into(),
                        subject: "bob".into(),
                        claim: "claim".into(),
                        resolver_id: "document-hash".into(),
                        evidence: json!({}),
                        references: vec![],
                        signature: "sig".into(),
                        status,
                        expires_at: None,
                        created_at: now,
                        updated_at: now,
                        verification_count: 1,
                        last_verified_at: None,
                    })
                    .unwrap();
            }

            self.repo
                .put_evaluation(&Evaluation {
                    id: format!("cid_{}", "e1".repeat(32)),
                    from_entity: "alice".into(),
                    to_entity: "bob".into(),
                    realm_id: "realm-1".into(),
                    domain: "d".into(),
                    score: 80,
                    weight: 1.0,
                    rationale: None,
                    supporting_attestations: vec![],
                    signature: "sig".into(),
                    expires_at: None,
                    created_at: now,
                })
                .unwrap();

            self.repo
                .put_reputation(&ReputationCache {
                    subject: "bob".into(),
                    realm_id: "realm-1".into(),
                    domain: "d".into(),
                    score: 80.0,
                    confidence: 0.5,
                    evaluation_count: 1,
                    attestation_count: 3,
                    breakdown: ReputationBreakdown {
                        raw_score: 80.0,
                        attestation_bonus: 0.0,
                        staleness_penalty: 0.0,
                        verified_attestation_count: 2,
                        staleness_days: 0.0,
                        sybil: SybilResistance {
                            score: 0.2,
                            factors: SybilFactors {
                                evaluator_diversity: 0.1,
                                verification_depth: 0.3,
                                temporal_spread: 0.0,
                                cross_realm_consistency: 0.0,
                            },
                            warnings: vec![],
                        },
                    },
                    computed_at: now,
                    valid_until: now + Duration::seconds(300),
                })
                .unwrap();
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    #[tokio::test]
    async fn proof_round_trip_verifies_and_proves_inclusion() {
        let f = Fixture::new("round_trip");
        f.seed();

        let stored = f.service.generate("bob", "realm-1", "d", Some(7)).await.unwrap();
        // Two verified attestations + one evaluation; the pending one is out.
        assert_eq!(stored.evidence_count, 3);
        assert_eq!(stored.envelope.version, "IRRL-Proof-v1");

        let verification = f.service.verify(&stored.envelope);
        assert!(verification.valid);
        assert!(verification.signature_valid);
        assert!(!verification.expired);
        assert!(verification.issuer_trusted);

        // Inclusion of a verified attestation id.
        let evidence_id = format!("cid_{}", "a1".repeat(32));
        let inclusion = f.service.evidence_proof(&stored.id, &evidence_id).unwrap();
        assert_eq!(inclusion.root, stored.envelope.data.evidence_merkle_root);
        assert!(f
            .service
            .verify_evidence(&inclusion, &stored.envelope.data.evidence_merkle_root));
        assert!(!f.service.verify_evidence(&inclusion, "someotherroot"));

        // An id that never entered the commitment has no inclusion proof.
        assert!(f
            .service
            .evidence_proof(&stored.id, &format!("cid_{}", "zz".repeat(32)))
            .is_err());
    }

    #[tokio::test]
    async fn expiry_flips_valid_but_not_signature() {
        let f = Fixture::new("expiry");
        f.seed();

        let stored = f.service.generate("bob", "realm-1", "d", Some(0)).await.unwrap();
        let verification = f.service.verify(&stored.envelope);
        assert!(verification.expired);
        assert!(verification.signature_valid);
        assert!(verification.issuer_trusted);
        assert!(!verification.valid);
    }

    #[tokio::test]
    async fn tampered_data_breaks_the_signature_check() {
        let f = Fixture::new("tamper");
        f.seed();

        let stored = f.service.generate("bob", "realm-1", "d", Some(7)).await.unwrap();
        let mut envelope = stored.envelope.clone();
        envelope.data.reputation.score = 99.9;

        let verification = f.service.verify(&envelope);
        assert!(!verification.signature_valid);
        assert!(!verification.valid);
        assert!(verification.issuer_trusted);
    }

    #[tokio::test]
    async fn foreign_issuers_are_untrusted_unless_configured() {
        let f = Fixture::new("foreign");
        f.seed();
        let stored = f.service.generate("bob", "realm-1", "d", Some(7)).await.unwrap();

        // A verifier that does not know this issuer rejects it...
        let dir = std::env::temp_dir().join(format!("irrl_proof_other_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let other_repo: Arc<dyn Repository> = Arc::new(SledRepository::open(&dir).unwrap());
        let other_audit = Arc::new(AuditLog::new(Arc::clone(&other_repo), false));
        let stranger = ProofService::new(
            Arc::clone(&other_repo),
            Arc::clone(&other_audit),
            Arc::new(InstanceKey::generate()),
            &[],
        );
        let rejected = stranger.verify(&stored.envelope);
        assert!(rejected.signature_valid);
        assert!(!rejected.issuer_trusted);
        assert!(!rejected.valid);

        // ...but accepts it once the issuer key is configured.
        let friend = ProofService::new(
            other_repo,
            other_audit,
            Arc::new(InstanceKey::generate()),
            &[stored.envelope.public_key.clone()],
        );
        assert!(friend.verify(&stored.envelope).valid);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn generation_requires_a_cached_reputation() {
        let f = Fixture::new("no_cache");
        f.seed();
        let err = f.service.generate("nobody", "realm-1", "d", None).await.unwrap_err();
        assert!(matches!(err, IrrlError::NotFound { .. }));
    }
}
