//! Attestation lifecycle.
//!
//! Creation validates the realm, the resolver and the evidence, derives the
//! content id, and signs the record with the instance key. Verification
//! dispatches to the declared resolver under a time budget and persists the
//! run together with the attestation's status transition in one storage
//! transaction. Revocation and expiry are terminal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{info, warn};

use irrl_audit::AuditLog;
use irrl_core::{
    Attestation, AttestationFilter, AttestationStatus, ContentId, EntityId, IrrlError, RealmId,
    ResolverId, RunStatus, Timestamp, VerificationRun, RESOLVER_TIMEOUT_FACTOR,
    RESOLVER_TIMEOUT_FLOOR_MS,
};
use irrl_crypto::{canonical_bytes, content_id, sha256_hex, InstanceKey};
use irrl_resolver::{ResolverOutcome, ResolverRegistry};
use irrl_store::Repository;

/// Caller input for attestation creation.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttestation {
    pub realm_id: RealmId,
    pub attester: EntityId,
    pub subject: EntityId,
    pub claim: String,
    pub resolver_id: ResolverId,
    pub evidence: Value,
    #[serde(default)]
    pub references: Vec<ContentId>,
    pub expires_at: Option<Timestamp>,
}

pub struct AttestationManager {
    repo: Arc<dyn Repository>,
    registry: Arc<ResolverRegistry>,
    audit: Arc<AuditLog>,
    key: Arc<InstanceKey>,
}

impl AttestationManager {
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: Arc<ResolverRegistry>,
        audit: Arc<AuditLog>,
        key: Arc<InstanceKey>,
    ) -> Self {
        Self { repo, registry, audit, key }
    }

    /// Create an attestation in `pending` state.
    pub async fn create(&self, input: CreateAttestation) -> Result<Attestation, IrrlError> {
        if input.subject.is_empty() {
            return Err(IrrlError::Validation("subject must not be empty".into()));
        }
        if input.claim.is_empty() {
            return Err(IrrlError::Validation("claim must not be empty".into()));
        }
        if self.repo.get_realm(&input.realm_id)?.is_none() {
            return Err(IrrlError::InvalidRealm(input.realm_id));
        }
        let resolver = self
            .registry
            .lookup(&input.resolver_id)
            .ok_or_else(|| IrrlError::InvalidResolver(input.resolver_id.clone()))?;

        let report = resolver.validate_evidence(&input.evidence);
        if !report.valid {
            return Err(IrrlError::InvalidEvidence {
                resolver: input.resolver_id,
                errors: report.errors,
            });
        }
        if !resolver.can_resolve(&input.claim, &input.evidence) {
            return Err(IrrlError::Validation(format!(
                "resolver {} is not applicable to this claim",
                input.resolver_id
            )));
        }
        for reference in &input.references {
            if self.repo.get_attestation(reference)?.is_none() {
                return Err(IrrlError::Validation(format!(
                    "referenced attestation not found: {reference}"
                )));
            }
        }

        let now = Utc::now();
        let body = json!({
            "realmId": &input.realm_id,
            "subject": &input.subject,
            "claim": &input.claim,
            "resolverId": &input.resolver_id,
            "evidence": &input.evidence,
            "references": &input.references,
            "ts": now,
        });
        let id = content_id(&body);
        if self.repo.get_attestation(&id)?.is_some() {
            return Err(IrrlError::AlreadyExists(id));
        }
        let signature = self.key.sign_object(&body);

        let attestation = Attestation {
            id: id.clone(),
            realm_id: input.realm_id,
            attester: input.attester.clone(),
            subject: input.subject,
            claim: input.claim,
            resolver_id: input.resolver_id,
            evidence: input.evidence,
            references: input.references,
            signature,
            status: AttestationStatus::Pending,
            expires_at: input.expires_at,
            created_at: now,
            updated_at: now,
            verification_count: 0,
            last_verified_at: None,
        };
        self.repo.put_attestation(&attestation)?;
        self.audit
            .append(
                "attestation.created",
                &input.attester,
                &[id.clone(), attestation.realm_id.clone()],
                json!({"subject": &attestation.subject, "resolver": &attestation.resolver_id}),
            )
            .await?;
        info!(attestation = %id, "attestation created");
        Ok(attestation)
    }

    pub fn get(&self, id: &str) -> Result<Attestation, IrrlError> {
        self.repo
            .get_attestation(id)?
            .ok_or_else(|| IrrlError::not_found("attestation", id))
    }

    pub fn list(&self, filter: &AttestationFilter) -> Result<Vec<Attestation>, IrrlError> {
        let mut rows: Vec<Attestation> = self
            .repo
            .iter_attestations()?
            .into_iter()
            .filter(|a| filter.realm_id.as_ref().is_none_or(|r| &a.realm_id == r))
            .filter(|a| filter.subject.as_ref().is_none_or(|s| &a.subject == s))
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50).min(200);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    /// Verification history, oldest first.
    pub fn history(&self, attestation_id: &str) -> Result<Vec<VerificationRun>, IrrlError> {
        self.get(attestation_id)?;
        self.repo.iter_runs_for_attestation(attestation_id)
    }

    /// Run the declared resolver against the attestation's evidence.
    ///
    /// A `verified` attestation returns its latest run unless `force` is
    /// set. Resolver failures and timeouts become run outcomes, never
    /// request errors; `error` runs leave the attestation re-verifiable.
    pub async fn verify(
        &self,
        attestation_id: &str,
        triggered_by: &EntityId,
        force: bool,
    ) -> Result<(Attestation, VerificationRun), IrrlError> {
        let mut attestation = self.get(attestation_id)?;
        match attestation.status {
            AttestationStatus::Revoked => {
                return Err(IrrlError::AlreadyRevoked(attestation.id));
            }
            AttestationStatus::Expired => {
                return Err(IrrlError::Validation(format!(
                    "attestation {} is expired",
                    attestation.id
                )));
            }
            AttestationStatus::Verified if !force => {
                if let Some(last) = self.repo.iter_runs_for_attestation(attestation_id)?.pop() {
                    return Ok((attestation, last));
                }
                // No run on record despite the status; fall through and
                // produce one.
            }
            _ => {}
        }

        let resolver = self
            .registry
            .lookup(&attestation.resolver_id)
            .ok_or_else(|| IrrlError::ResolverNotFound(attestation.resolver_id.clone()))?;
        let meta = resolver.metadata().clone();
        let budget_ms =
            (meta.avg_verification_time_ms * RESOLVER_TIMEOUT_FACTOR).max(RESOLVER_TIMEOUT_FLOOR_MS);

        let started = std::time::Instant::now();
        let outcome = match timeout(
            Duration::from_millis(budget_ms),
            resolver.verify(&attestation.evidence),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(attestation = %attestation.id, resolver = %meta.id, budget_ms, "resolver timed out");
                ResolverOutcome::error(format!(
                    "resolver {} exceeded its {budget_ms} ms budget",
                    meta.id
                ))
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let now = Utc::now();
        let output_hash = sha256_hex(&canonical_bytes(&outcome.output));
        let run_body = json!({
            "attestationId": attestation.id,
            "resolverId": meta.id,
            "resolverVersion": meta.version,
            "outputHash": output_hash,
            "ts": now,
        });
        let run = VerificationRun {
            id: content_id(&run_body),
            attestation_id: attestation.id.clone(),
            resolver_id: meta.id,
            resolver_version: meta.version,
            status: outcome.status,
            output: outcome.output,
            output_hash,
            snapshot: attestation.evidence.clone(),
            duration_ms,
            triggered_by: triggered_by.clone(),
            error: outcome.error,
            created_at: now,
        };

        attestation.status = run.status.next_attestation_status();
        attestation.verification_count += 1;
        if run.status == RunStatus::Verified {
            attestation.last_verified_at = Some(now);
        }
        attestation.updated_at = now;

        self.repo.record_verification(&run, &attestation)?;
        self.audit
            .append(
                "attestation.verified",
                triggered_by,
                &[attestation.id.clone(), attestation.realm_id.clone()],
                json!({"runId": &run.id, "status": run.status, "durationMs": run.duration_ms}),
            )
            .await?;
        Ok((attestation, run))
    }

    /// Revoke from any non-revoked state. Terminal.
    pub async fn revoke(&self, id: &str, actor: &EntityId) -> Result<Attestation, IrrlError> {
        let mut attestation = self.get(id)?;
        if attestation.status == AttestationStatus::Revoked {
            return Err(IrrlError::AlreadyRevoked(attestation.id));
        }
        attestation.status = AttestationStatus::Revoked;
        attestation.updated_at = Utc::now();
        self.repo.put_attestation(&attestation)?;
        self.audit
            .append(
                "attestation.revoked",
                actor,
                &[attestation.id.clone(), attestation.realm_id.clone()],
                json!({}),
            )
            .await?;
        info!(attestation = %attestation.id, "attestation revoked");
        Ok(attestation)
    }

    /// Mark every attestation past its `expiresAt` as expired. Returns the
    /// number of rows transitioned.
    pub async fn expire_scan(&self) -> Result<usize, IrrlError> {
        let now = Utc::now();
        let mut expired = 0usize;
        for mut attestation in self.repo.iter_attestations()? {
            if attestation.status.is_terminal() {
                continue;
            }
            let Some(expires_at) = attestation.expires_at else { continue };
            if expires_at < now {
                attestation.status = AttestationStatus::Expired;
                attestation.updated_at = now;
                self.repo.put_attestation(&attestation)?;
                self.audit
                    .append("attestation.expired", "system", &[attestation.id.clone()], json!({}))
                    .await?;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use irrl_core::{Realm, RealmRules};
    use irrl_store::SledRepository;

    struct Fixture {
        manager: AttestationManager,
        dir: std::path::PathBuf,
    }

    impl Fixture {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("irrl_attest_{}_{name}", std::process::id()));
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
                domain: "rust".into(),
                rules: RealmRules::default(),
                public_key: "pem".into(),
                created_by: "admin".into(),
                created_at: now,
                updated_at: now,
            })
            .unwrap();

            let registry = Arc::new(ResolverRegistry::new());
            registry.register_builtins(Arc::clone(&repo), None);
            let audit = Arc::new(AuditLog::new(Arc::clone(&repo), true));
            let key = Arc::new(InstanceKey::generate());
            Self { manager: AttestationManager::new(repo, registry, audit, key), dir }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn hash_input(content: &str) -> CreateAttestation {
        CreateAttestation {
            realm_id: "realm-1".into(),
            attester: "alice".into(),
            subject: "bob".into(),
            claim: "authored the document".into(),
            resolver_id: "document-hash".into(),
            evidence: json!({"content": content, "sha256": sha256_hex(content.as_bytes())}),
            references: vec![],
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn create_validates_realm_resolver_and_evidence() {
        let f = Fixture::new("create_validation");

        let mut bad_realm = hash_input("doc");
        bad_realm.realm_id = "ghost".into();
        assert!(matches!(
            f.manager.create(bad_realm).await.unwrap_err(),
            IrrlError::InvalidRealm(_)
        ));

        let mut bad_resolver = hash_input("doc");
        bad_resolver.resolver_id = "ghost".into();
        assert!(matches!(
            f.manager.create(bad_resolver).await.unwrap_err(),
            IrrlError::InvalidResolver(_)
        ));

        let mut bad_evidence = hash_input("doc");
        bad_evidence.evidence = json!({"content": "doc"});
        let err = f.manager.create(bad_evidence).await.unwrap_err();
        match err {
            IrrlError::InvalidEvidence { errors, .. } => assert!(!errors.is_empty()),
            other => panic!("expected InvalidEvidence, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_then_verify_transitions_to_verified() {
        let f = Fixture::new("verify_ok");
        let created = f.manager.create(hash_input("doc")).await.unwrap();
        assert_eq!(created.status, AttestationStatus::Pending);
        assert!(created.id.starts_with("cid_"));
        assert!(!created.signature.is_empty());

        let (att, run) = f.manager.verify(&created.id, &"carol".into(), false).await.unwrap();
        assert_eq!(run.status, RunStatus::Verified);
        assert_eq!(att.status, AttestationStatus::Verified);
        assert_eq!(att.verification_count, 1);
        assert!(att.last_verified_at.is_some());
        assert_eq!(run.output_hash, sha256_hex(&canonical_bytes(&run.output)));
    }

    #[tokio::test]
    async fn verified_attestation_returns_cached_run_unless_forced() {
        let f = Fixture::new("cached_run");
        let created = f.manager.create(hash_input("doc")).await.unwrap();
        let (_, first) = f.manager.verify(&created.id, &"carol".into(), false).await.unwrap();

        let (att, cached) = f.manager.verify(&created.id, &"carol".into(), false).await.unwrap();
        assert_eq!(cached.id, first.id);
        assert_eq!(att.verification_count, 1);

        let (att, fresh) = f.manager.verify(&created.id, &"carol".into(), true).await.unwrap();
        assert_ne!(fresh.id, first.id);
        assert_eq!(att.verification_count, 2);
        assert_eq!(f.manager.history(&created.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_verification_can_be_retried() {
        let f = Fixture::new("retry");
        let mut input = hash_input("doc");
        input.evidence = json!({"content": "doc", "sha256": sha256_hex(b"different")});
        let created = f.manager.create(input).await.unwrap();

        let (att, run) = f.manager.verify(&created.id, &"carol".into(), false).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(att.status, AttestationStatus::Failed);

        // A failed attestation may be re-verified; same evidence fails again.
        let (att, _) = f.manager.verify(&created.id, &"carol".into(), false).await.unwrap();
        assert_eq!(att.status, AttestationStatus::Failed);
        assert_eq!(att.verification_count, 2);
    }

    #[tokio::test]
    async fn revoked_is_terminal() {
        let f = Fixture::new("revoke");
        let created = f.manager.create(hash_input("doc")).await.unwrap();
        let revoked = f.manager.revoke(&created.id, &"alice".into()).await.unwrap();
        assert_eq!(revoked.status, AttestationStatus::Revoked);

        assert!(matches!(
            f.manager.revoke(&created.id, &"alice".into()).await.unwrap_err(),
            IrrlError::AlreadyRevoked(_)
        ));
        assert!(matches!(
            f.manager.verify(&created.id, &"alice".into(), true).await.unwrap_err(),
            IrrlError::AlreadyRevoked(_)
        ));
    }

    #[tokio::test]
    async fn expire_scan_marks_past_expiry_terminal() {
        let f = Fixture::new("expire");
        let mut input = hash_input("doc");
        input.expires_at = Some(Utc::now() - ChronoDuration::seconds(5));
        let created = f.manager.create(input).await.unwrap();

        assert_eq!(f.manager.expire_scan().await.unwrap(), 1);
        let att = f.manager.get(&created.id).unwrap();
        assert_eq!(att.status, AttestationStatus::Expired);

        // Expired is terminal for verification.
        assert!(f.manager.verify(&created.id, &"alice".into(), true).await.is_err());
        // Idempotent: a second scan finds nothing.
        assert_eq!(f.manager.expire_scan().await.unwrap(), 0);
    }
}
