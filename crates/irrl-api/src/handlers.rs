use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use irrl_core::{
    AttestationFilter, AttestationStatus, EvaluationFilter, IrrlError, ProofEnvelope,
    PROOF_VERSION,
};
use irrl_crypto::MerkleProof;
use irrl_proof::ProofFilter;
use irrl_realm::{CreateRealm, RealmFilter, UpdateRealm};
use irrl_resolver::ResolverMetadata;
use irrl_trust::{SubmitEvaluation, TrustQuery};

use crate::server::AppState;
use crate::types::{created, ok, parse_body, require_json, ApiFailure, ApiResult};

type Body = Result<Json<Value>, JsonRejection>;

const DEFAULT_ACTOR: &str = "anonymous";

fn actor_of(body: &Value) -> String {
    body.get("createdBy")
        .or_else(|| body.get("actor"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

/// Tolerate an absent body on endpoints where every field is optional.
fn optional_json(payload: Body) -> Value {
    match payload {
        Ok(Json(value)) => value,
        Err(_) => json!({}),
    }
}

// ── Realms ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RealmListQuery {
    pub domain: Option<String>,
    pub parent: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn create_realm(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let body = require_json(payload)?;
    let actor = actor_of(&body);
    let input: CreateRealm = parse_body(body)?;
    let realm = state.realms.create(input, &actor).await?;
    Ok(created(realm))
}

pub async fn get_realm(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    Ok(ok(state.realms.get(&id)?))
}

pub async fn list_realms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RealmListQuery>,
) -> ApiResult {
    let realms = state.realms.list(&RealmFilter {
        domain: query.domain,
        parent: query.parent,
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(ok(realms))
}

#[derive(Deserialize)]
pub struct ChildrenQuery {
    #[serde(default)]
    pub recursive: bool,
}

pub async fn realm_children(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ChildrenQuery>,
) -> ApiResult {
    Ok(ok(state.realms.children(&id, query.recursive)?))
}

pub async fn update_realm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult {
    let input: UpdateRealm = parse_body(require_json(payload)?)?;
    Ok(ok(state.realms.update(&id, input).await?))
}

pub async fn delete_realm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult {
    let actor = actor_of(&optional_json(payload));
    state.realms.delete(&id, &actor).await?;
    Ok(ok(json!({"deleted": id})))
}

// ── Attestations ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AttestationListQuery {
    pub realm: Option<String>,
    pub subject: Option<String>,
    pub status: Option<AttestationStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn create_attestation(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let input = parse_body(require_json(payload)?)?;
    let attestation = state.attestations.create(input).await?;
    Ok(created(attestation))
}

pub async fn get_attestation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    Ok(ok(state.attestations.get(&id)?))
}

pub async fn list_attestations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttestationListQuery>,
) -> ApiResult {
    let rows = state.attestations.list(&AttestationFilter {
        realm_id: query.realm,
        subject: query.subject,
        status: query.status,
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(ok(rows))
}

pub async fn revoke_attestation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult {
    let actor = actor_of(&optional_json(payload));
    Ok(ok(state.attestations.revoke(&id, &actor).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub force: bool,
    pub triggered_by: Option<String>,
}

pub async fn verify_attestation(
    State(state): State<Arc<AppState>>,
    Path(attestation_id): Path<String>,
    payload: Body,
) -> ApiResult {
    let request: VerifyRequest = parse_body(optional_json(payload))?;
    let triggered_by = request.triggered_by.unwrap_or_else(|| DEFAULT_ACTOR.into());
    let (attestation, run) = state
        .attestations
        .verify(&attestation_id, &triggered_by, request.force)
        .await?;
    Ok(ok(json!({"attestation": attestation, "run": run})))
}

pub async fn verification_history(
    State(state): State<Arc<AppState>>,
    Path(attestation_id): Path<String>,
) -> ApiResult {
    Ok(ok(state.attestations.history(&attestation_id)?))
}

// ── Trust ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EvaluationListQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub realm: Option<String>,
    pub domain: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn submit_evaluation(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let input: SubmitEvaluation = parse_body(require_json(payload)?)?;
    let evaluation = state.evaluations.upsert(input).await?;
    Ok(created(evaluation))
}

pub async fn list_evaluations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EvaluationListQuery>,
) -> ApiResult {
    let rows = state.evaluations.list(&EvaluationFilter {
        from_entity: query.from,
        to_entity: query.to,
        realm_id: query.realm,
        domain: query.domain,
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(ok(rows))
}

pub async fn transitive_trust(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let query: TrustQuery = parse_body(require_json(payload)?)?;
    if query.from.is_empty() || query.to.is_empty() || query.domain.is_empty() {
        return Err(ApiFailure(IrrlError::Validation(
            "from, to and domain are required".into(),
        )));
    }
    Ok(ok(state.trust.transitive(&query)?))
}

#[derive(Deserialize)]
pub struct ReputationQuery {
    pub realm: String,
    pub domain: String,
    #[serde(default)]
    pub refresh: bool,
}

pub async fn reputation(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
    Query(query): Query<ReputationQuery>,
) -> ApiResult {
    Ok(ok(state
        .reputation
        .reputation(&subject, &query.realm, &query.domain, query.refresh)?))
}

// ── Proofs ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateProofRequest {
    pub subject: String,
    pub realm_id: String,
    pub domain: String,
    pub valid_for_days: Option<i64>,
}

pub async fn generate_proof(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let request: GenerateProofRequest = parse_body(require_json(payload)?)?;
    // Proofs snapshot the cache; compute through it so a fresh subject
    // does not 404 on its first proof.
    state
        .reputation
        .reputation(&request.subject, &request.realm_id, &request.domain, false)?;
    let stored = state
        .proofs
        .generate(
            &request.subject,
            &request.realm_id,
            &request.domain,
            request.valid_for_days,
        )
        .await?;
    Ok(created(json!({
        "proofId": stored.id,
        "proof": stored.envelope,
        "evidenceCount": stored.evidence_count,
    })))
}

#[derive(Deserialize)]
pub struct VerifyProofRequest {
    pub proof: ProofEnvelope,
}

pub async fn verify_proof(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let request: VerifyProofRequest = parse_body(require_json(payload)?)?;
    Ok(ok(state.proofs.verify(&request.proof)))
}

pub async fn get_proof(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    Ok(ok(state.proofs.get(&id)?))
}

#[derive(Deserialize)]
pub struct ProofListQuery {
    pub subject: Option<String>,
    pub realm: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_proofs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProofListQuery>,
) -> ApiResult {
    let rows = state.proofs.list(&ProofFilter {
        subject: query.subject,
        realm_id: query.realm,
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(ok(rows))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceProofRequest {
    pub proof_id: String,
    pub evidence_id: String,
}

pub async fn evidence_proof(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let request: EvidenceProofRequest = parse_body(require_json(payload)?)?;
    Ok(ok(state
        .proofs
        .evidence_proof(&request.proof_id, &request.evidence_id)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEvidenceRequest {
    pub merkle_proof: MerkleProof,
    pub expected_root: String,
}

pub async fn verify_evidence(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let request: VerifyEvidenceRequest = parse_body(require_json(payload)?)?;
    let valid = state
        .proofs
        .verify_evidence(&request.merkle_proof, &request.expected_root);
    Ok(ok(json!({"valid": valid})))
}

// ── Resolvers ────────────────────────────────────────────────────────────────

fn resolver_json(entry: &irrl_resolver::ResolverEntry) -> Value {
    let mut value = serde_json::to_value(&entry.metadata).unwrap_or(Value::Null);
    if let Some(map) = value.as_object_mut() {
        map.insert("invocable".into(), json!(entry.invocable));
        map.insert("deprecated".into(), json!(entry.deprecated));
    }
    value
}

pub async fn list_resolvers(State(state): State<Arc<AppState>>) -> ApiResult {
    let entries: Vec<Value> = state.registry.list().iter().map(resolver_json).collect();
    Ok(ok(entries))
}

#[derive(Deserialize)]
pub struct ResolverQuery {
    pub version: Option<String>,
}

pub async fn get_resolver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ResolverQuery>,
) -> ApiResult {
    let entry = state
        .registry
        .get_metadata(&id, query.version.as_deref())
        .ok_or(IrrlError::ResolverNotFound(id))?;
    Ok(ok(resolver_json(&entry)))
}

pub async fn register_resolver(State(state): State<Arc<AppState>>, payload: Body) -> ApiResult {
    let metadata: ResolverMetadata = parse_body(require_json(payload)?)?;
    if metadata.id.is_empty() || metadata.version.is_empty() {
        return Err(ApiFailure(IrrlError::Validation(
            "resolver id and version are required".into(),
        )));
    }
    state.registry.register_descriptor(metadata.clone())?;
    Ok(created(json!({"id": metadata.id, "version": metadata.version})))
}

pub async fn deprecate_resolver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    state.registry.deprecate(&id)?;
    Ok(ok(json!({"deprecated": id})))
}

#[derive(Deserialize)]
pub struct TestResolverRequest {
    pub evidence: Value,
    pub version: Option<String>,
}

/// Dry-run a resolver against caller-supplied evidence without touching any
/// attestation.
pub async fn test_resolver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult {
    let request: TestResolverRequest = parse_body(require_json(payload)?)?;
    let resolver = state
        .registry
        .lookup_versioned(&id, request.version.as_deref())
        .ok_or(IrrlError::ResolverNotFound(id))?;

    let validation = resolver.validate_evidence(&request.evidence);
    if !validation.valid {
        return Ok(ok(json!({"validation": validation, "outcome": Value::Null})));
    }
    let outcome = resolver.verify(&request.evidence).await;
    Ok(ok(json!({
        "validation": validation,
        "outcome": {
            "status": outcome.status,
            "output": outcome.output,
            "error": outcome.error,
        },
    })))
}

// ── System ───────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult {
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds();
    Ok(ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": uptime,
    })))
}

pub async fn info(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(ok(json!({
        "name": "irrl",
        "version": env!("CARGO_PKG_VERSION"),
        "proofVersion": PROOF_VERSION,
        "issuer": state.issuer,
        "publicKey": state.public_key_pem,
        "resolvers": state.registry.list().len(),
    })))
}

pub async fn audit_verify(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(ok(state.audit.verify_chain()?))
}

#[derive(Deserialize)]
pub struct AuditEventsQuery {
    pub limit: Option<usize>,
}

/// Most recent audit events, newest first.
pub async fn audit_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditEventsQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(50).min(500);
    let mut events = state.repo.iter_audit()?;
    events.reverse();
    events.truncate(limit);
    Ok(ok(events))
}

pub async fn route_not_found() -> ApiFailure {
    ApiFailure(IrrlError::not_found("route", "no such endpoint"))
}
