//! Evidence verification plugins.
//!
//! A *resolver* declares immutable metadata (including a JSON Schema for the
//! evidence it accepts), validates evidence, and produces a verification
//! outcome. The registry is process-wide state constructed at boot:
//! `register_builtins` installs the in-process resolvers, and callers may
//! additionally register metadata-only descriptors for resolvers that run
//! elsewhere (those are listable but never invocable here).

pub mod builtin;
pub mod registry;

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use irrl_core::{Domain, ResolverId, RunStatus};

pub use builtin::{DocumentHashResolver, GithubRepoResolver, ReferenceResolver};
pub use registry::{ResolverEntry, ResolverRegistry};

/// Immutable description of a resolver.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverMetadata {
    pub id: ResolverId,
    pub version: String,
    pub name: String,
    pub description: String,
    pub author: String,
    /// JSON Schema the evidence payload must satisfy.
    pub evidence_schema: Value,
    /// JSON Schema of the verification output.
    pub output_schema: Value,
    pub domains: Vec<Domain>,
    /// Whether equal evidence always yields an equal `outputHash`.
    pub deterministic: bool,
    pub avg_verification_time_ms: u64,
}

impl ResolverMetadata {
    /// Registry key carrying the version, `id@version`.
    pub fn versioned_id(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }
}

/// Result of schema validation of an evidence payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl EvidenceReport {
    pub fn ok() -> Self {
        Self { valid: true, errors: Vec::new() }
    }
}

/// What a resolver concluded about one piece of evidence.
///
/// `error` is a resolver-internal failure (timeout, network, panic-adjacent
/// conditions); it leaves the attestation re-verifiable, unlike `failed`,
/// which is a definitive negative result.
#[derive(Clone, Debug)]
pub struct ResolverOutcome {
    pub status: RunStatus,
    pub output: Value,
    pub error: Option<String>,
}

impl ResolverOutcome {
    pub fn verified(output: Value) -> Self {
        Self { status: RunStatus::Verified, output, error: None }
    }

    pub fn failed(output: Value) -> Self {
        Self { status: RunStatus::Failed, output, error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: RunStatus::Error, output: Value::Null, error: Some(message.into()) }
    }
}

/// The capability interface every verification plugin implements.
#[async_trait]
pub trait Resolver: Send + Sync {
    fn metadata(&self) -> &ResolverMetadata;

    /// Validate evidence against this resolver's schema; never verifies.
    fn validate_evidence(&self, evidence: &Value) -> EvidenceReport;

    /// Whether this resolver is applicable to the claim/evidence pair.
    fn can_resolve(&self, claim: &str, evidence: &Value) -> bool {
        !claim.is_empty() && self.validate_evidence(evidence).valid
    }

    /// Run the verification. Must not panic; resolver-internal failures are
    /// reported as an `error` outcome.
    async fn verify(&self, evidence: &Value) -> ResolverOutcome;
}

/// Validate `instance` against a compiled schema, collecting per-field errors.
pub(crate) fn validate_with(schema: &JSONSchema, instance: &Value) -> EvidenceReport {
    match schema.validate(instance) {
        Ok(()) => EvidenceReport::ok(),
        Err(errors) => EvidenceReport {
            valid: false,
            errors: errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect(),
        },
    }
}

/// Compile an evidence/output schema, panicking on malformed built-in
/// schemas (a programming error, not an input error).
pub(crate) fn compile_schema(schema: &Value) -> JSONSchema {
    JSONSchema::compile(schema).expect("built-in schema is valid")
}
