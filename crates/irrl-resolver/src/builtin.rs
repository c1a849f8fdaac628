//! Built-in resolvers installed by `ResolverRegistry::register_builtins`.

use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use tracing::warn;

use irrl_core::AttestationStatus;
use irrl_crypto::sha256_hex;
use irrl_store::Repository;

use crate::{compile_schema, validate_with, EvidenceReport, Resolver, ResolverMetadata, ResolverOutcome};

// ── document-hash ─────────────────────────────────────────────────────────────

/// Verifies that a document's SHA-256 matches the hash committed in the
/// evidence. Fully deterministic and offline.
pub struct DocumentHashResolver {
    metadata: ResolverMetadata,
    schema: JSONSchema,
}

impl DocumentHashResolver {
    pub fn new() -> Self {
        let evidence_schema = json!({
            "type": "object",
            "required": ["content", "sha256"],
            "properties": {
                "content": { "type": "string" },
                "sha256": { "type": "string", "pattern": "^[0-9a-f]{64}$" }
            },
            "additionalProperties": false
        });
        let schema = compile_schema(&evidence_schema);
        Self {
            metadata: ResolverMetadata {
                id: "document-hash".into(),
                version: "1.0.0".into(),
                name: "Document hash".into(),
                description: "Checks that a document matches its committed SHA-256".into(),
                author: "irrl".into(),
                evidence_schema,
                output_schema: json!({
                    "type": "object",
                    "required": ["expectedHash", "computedHash", "match"],
                    "properties": {
                        "expectedHash": { "type": "string" },
                        "computedHash": { "type": "string" },
                        "match": { "type": "boolean" }
                    }
                }),
                domains: vec!["*".into()],
                deterministic: true,
                avg_verification_time_ms: 50,
            },
            schema,
        }
    }
}

impl Default for DocumentHashResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for DocumentHashResolver {
    fn metadata(&self) -> &ResolverMetadata {
        &self.metadata
    }

    fn validate_evidence(&self, evidence: &Value) -> EvidenceReport {
        validate_with(&self.schema, evidence)
    }

    async fn verify(&self, evidence: &Value) -> ResolverOutcome {
        let (Some(content), Some(expected)) = (
            evidence.get("content").and_then(Value::as_str),
            evidence.get("sha256").and_then(Value::as_str),
        ) else {
            return ResolverOutcome::error("evidence missing content or sha256");
        };

        let computed = sha256_hex(content.as_bytes());
        let matches = computed == expected;
        let output = json!({
            "expectedHash": expected,
            "computedHash": computed,
            "match": matches,
        });
        if matches {
            ResolverOutcome::verified(output)
        } else {
            ResolverOutcome::failed(output)
        }
    }
}

// ── attestation-reference ─────────────────────────────────────────────────────

/// Verifies that every referenced attestation exists and is itself verified.
/// Lets attestations chain: "this claim stands on those claims".
pub struct ReferenceResolver {
    metadata: ResolverMetadata,
    schema: JSONSchema,
    repo: Arc<dyn Repository>,
}

impl ReferenceResolver {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        let evidence_schema = json!({
            "type": "object",
            "required": ["attestationIds"],
            "properties": {
                "attestationIds": {
                    "type": "array",
                    "items": { "type": "string", "pattern": "^cid_[0-9a-f]{64}$" },
                    "minItems": 1
                }
            },
            "additionalProperties": false
        });
        let schema = compile_schema(&evidence_schema);
        Self {
            metadata: ResolverMetadata {
                id: "attestation-reference".into(),
                version: "1.0.0".into(),
                name: "Attestation reference".into(),
                description: "Checks that referenced attestations exist and are verified".into(),
                author: "irrl".into(),
                evidence_schema,
                output_schema: json!({
                    "type": "object",
                    "required": ["checked", "verified", "missing"],
                    "properties": {
                        "checked": { "type": "integer" },
                        "verified": { "type": "integer" },
                        "missing": { "type": "array", "items": { "type": "string" } }
                    }
                }),
                domains: vec!["*".into()],
                // Outcome depends on the state of the referenced rows.
                deterministic: false,
                avg_verification_time_ms: 100,
            },
            schema,
            repo,
        }
    }
}

#[async_trait]
impl Resolver for ReferenceResolver {
    fn metadata(&self) -> &ResolverMetadata {
        &self.metadata
    }

    fn validate_evidence(&self, evidence: &Value) -> EvidenceReport {
        validate_with(&self.schema, evidence)
    }

    async fn verify(&self, evidence: &Value) -> ResolverOutcome {
        let Some(ids) = evidence.get("attestationIds").and_then(Value::as_array) else {
            return ResolverOutcome::error("evidence missing attestationIds");
        };

        let mut verified = 0usize;
        let mut missing = Vec::new();
        let mut unverified = Vec::new();
        for id in ids.iter().filter_map(Value::as_str) {
            match self.repo.get_attestation(id) {
                Ok(Some(att)) if att.status == AttestationStatus::Verified => verified += 1,
                Ok(Some(_)) => unverified.push(id.to_string()),
                Ok(None) => missing.push(id.to_string()),
                Err(e) => return ResolverOutcome::error(format!("storage error: {e}")),
            }
        }

        let output = json!({
            "checked": ids.len(),
            "verified": verified,
            "missing": missing,
            "unverified": unverified,
        });
        if verified == ids.len() {
            ResolverOutcome::verified(output)
        } else {
            ResolverOutcome::failed(output)
        }
    }
}

// ── github-repo ───────────────────────────────────────────────────────────────

/// Verifies that a GitHub repository exists and is reachable. Network
/// failures yield an `error` outcome so the attestation stays re-verifiable.
pub struct GithubRepoResolver {
    metadata: ResolverMetadata,
    schema: JSONSchema,
    client: reqwest::Client,
    token: Option<String>,
}

impl GithubRepoResolver {
    pub fn new(token: Option<String>) -> Self {
        let evidence_schema = json!({
            "type": "object",
            "required": ["owner", "repo"],
            "properties": {
                "owner": { "type": "string", "minLength": 1 },
                "repo": { "type": "string", "minLength": 1 }
            },
            "additionalProperties": false
        });
        let schema = compile_schema(&evidence_schema);
        Self {
            metadata: ResolverMetadata {
                id: "github-repo".into(),
                version: "1.0.0".into(),
                name: "GitHub repository".into(),
                description: "Checks that a GitHub repository exists".into(),
                author: "irrl".into(),
                evidence_schema,
                output_schema: json!({
                    "type": "object",
                    "required": ["exists"],
                    "properties": {
                        "exists": { "type": "boolean" },
                        "fullName": { "type": "string" },
                        "private": { "type": "boolean" }
                    }
                }),
                domains: vec!["software".into(), "open-source".into()],
                deterministic: false,
                avg_verification_time_ms: 2_000,
            },
            schema,
            client: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait]
impl Resolver for GithubRepoResolver {
    fn metadata(&self) -> &ResolverMetadata {
        &self.metadata
    }

    fn validate_evidence(&self, evidence: &Value) -> EvidenceReport {
        validate_with(&self.schema, evidence)
    }

    async fn verify(&self, evidence: &Value) -> ResolverOutcome {
        let (Some(owner), Some(repo)) = (
            evidence.get("owner").and_then(Value::as_str),
            evidence.get("repo").and_then(Value::as_str),
        ) else {
            return ResolverOutcome::error("evidence missing owner or repo");
        };

        let url = format!("https://api.github.com/repos/{owner}/{repo}");
        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", "irrl-resolver")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, %url, "github request failed");
                return ResolverOutcome::error(format!("github unreachable: {e}"));
            }
        };

        match response.status() {
            s if s.is_success() => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                ResolverOutcome::verified(json!({
                    "exists": true,
                    "fullName": body.get("full_name").cloned().unwrap_or(Value::Null),
                    "private": body.get("private").cloned().unwrap_or(Value::Null),
                }))
            }
            reqwest::StatusCode::NOT_FOUND => {
                ResolverOutcome::failed(json!({"exists": false}))
            }
            s => ResolverOutcome::error(format!("github responded {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use irrl_core::Attestation;
    use irrl_store::SledRepository;

    #[tokio::test]
    async fn document_hash_verifies_matching_content() {
        let resolver = DocumentHashResolver::new();
        let evidence = json!({
            "content": "hello",
            "sha256": sha256_hex(b"hello"),
        });
        assert!(resolver.validate_evidence(&evidence).valid);

        let outcome = resolver.verify(&evidence).await;
        assert_eq!(outcome.status, irrl_core::RunStatus::Verified);
        assert_eq!(outcome.output["match"], json!(true));
    }

    #[tokio::test]
    async fn document_hash_fails_on_mismatch() {
        let resolver = DocumentHashResolver::new();
        let evidence = json!({
            "content": "hello",
            "sha256": sha256_hex(b"other"),
        });
        let outcome = resolver.verify(&evidence).await;
        assert_eq!(outcome.status, irrl_core::RunStatus::Failed);
        assert_eq!(outcome.output["match"], json!(false));
    }

    #[test]
    fn document_hash_rejects_malformed_evidence_with_field_errors() {
        let resolver = DocumentHashResolver::new();
        let report = resolver.validate_evidence(&json!({"content": "x", "sha256": "nothex"}));
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("sha256")));

        let report = resolver.validate_evidence(&json!({"sha256": sha256_hex(b"x")}));
        assert!(!report.valid);
        assert!(!report.errors.is_empty());
    }

    #[tokio::test]
    async fn reference_resolver_requires_all_references_verified() {
        let dir = std::env::temp_dir().join(format!("irrl_refres_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let repo: Arc<dyn Repository> = Arc::new(SledRepository::open(&dir).unwrap());

        let mut att = Attestation {
            id: format!("cid_{}", "a".repeat(64)),
            realm_id: "realm-1".into(),
            attester: "alice".into(),
            subject: "bob".into(),
            claim: "base claim".into(),
            resolver_id: "document-hash".into(),
            evidence: json!({}),
            references: vec![],
            signature: "sig".into(),
            status: AttestationStatus::Verified,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            verification_count: 1,
            last_verified_at: None,
        };
        repo.put_attestation(&att).unwrap();

        let resolver = ReferenceResolver::new(Arc::clone(&repo));
        let ok = resolver
            .verify(&json!({"attestationIds": [att.id.clone()]}))
            .await;
        assert_eq!(ok.status, irrl_core::RunStatus::Verified);

        att.status = AttestationStatus::Pending;
        repo.put_attestation(&att).unwrap();
        let not_ok = resolver
            .verify(&json!({"attestationIds": [att.id.clone()]}))
            .await;
        assert_eq!(not_ok.status, irrl_core::RunStatus::Failed);

        let missing = resolver
            .verify(&json!({"attestationIds": [format!("cid_{}", "b".repeat(64))]}))
            .await;
        assert_eq!(missing.status, irrl_core::RunStatus::Failed);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
