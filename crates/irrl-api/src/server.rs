use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

use irrl_attest::AttestationManager;
use irrl_audit::AuditLog;
use irrl_core::Timestamp;
use irrl_proof::ProofService;
use irrl_realm::RealmStore;
use irrl_reputation::ReputationService;
use irrl_resolver::ResolverRegistry;
use irrl_store::Repository;
use irrl_trust::{EvaluationStore, TrustEngine};

use crate::handlers;

/// Everything the handlers need, constructed once at boot.
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub realms: RealmStore,
    pub attestations: AttestationManager,
    pub evaluations: EvaluationStore,
    pub trust: TrustEngine,
    pub reputation: ReputationService,
    pub proofs: ProofService,
    pub registry: Arc<ResolverRegistry>,
    pub audit: Arc<AuditLog>,
    pub public_key_pem: String,
    pub issuer: String,
    pub started_at: Timestamp,
}

/// Build the full route table.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Realms ───────────────────────────────────────────────────────────
        .route("/realms", post(handlers::create_realm).get(handlers::list_realms))
        .route("/realms/:id/children", get(handlers::realm_children))
        // Lookup accepts ids and materialized paths; paths carry their `/`
        // percent-encoded (`/realms/root%2Fchild`).
        .route(
            "/realms/:id",
            get(handlers::get_realm)
                .put(handlers::update_realm)
                .delete(handlers::delete_realm),
        )
        // ── Attestations ─────────────────────────────────────────────────────
        .route(
            "/attestations",
            post(handlers::create_attestation).get(handlers::list_attestations),
        )
        .route("/attestations/:id", get(handlers::get_attestation))
        .route("/attestations/:id/revoke", post(handlers::revoke_attestation))
        .route("/verify/:attestation_id", post(handlers::verify_attestation))
        .route("/verify/:attestation_id/history", get(handlers::verification_history))
        // ── Trust ────────────────────────────────────────────────────────────
        .route(
            "/trust/evaluations",
            post(handlers::submit_evaluation).get(handlers::list_evaluations),
        )
        .route("/trust/transitive", post(handlers::transitive_trust))
        .route("/trust/reputation/:subject", get(handlers::reputation))
        // ── Proofs ───────────────────────────────────────────────────────────
        .route("/proofs/generate", post(handlers::generate_proof))
        .route("/proofs/verify", post(handlers::verify_proof))
        .route("/proofs/evidence-proof", post(handlers::evidence_proof))
        .route("/proofs/verify-evidence", post(handlers::verify_evidence))
        .route("/proofs", get(handlers::list_proofs))
        .route("/proofs/:id", get(handlers::get_proof))
        // ── Resolvers ────────────────────────────────────────────────────────
        .route("/resolvers", get(handlers::list_resolvers).post(handlers::register_resolver))
        .route("/resolvers/:id", get(handlers::get_resolver))
        .route("/resolvers/:id/deprecate", post(handlers::deprecate_resolver))
        .route("/resolvers/:id/test", post(handlers::test_resolver))
        // ── System ───────────────────────────────────────────────────────────
        .route("/health", get(handlers::health))
        .route("/info", get(handlers::info))
        .route("/audit/verify", get(handlers::audit_verify))
        .route("/audit/events", get(handlers::audit_events))
        .fallback(handlers::route_not_found)
        .with_state(state)
}

/// CORS layer from the configured origins (`*` or a comma-separated list).
pub fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.trim() == "*" {
        layer.allow_origin(Any)
    } else {
        let list: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(list))
    }
}

/// Bind and serve until the process exits.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr, origins: &str) -> anyhow::Result<()> {
    let app = router(state).layer(cors_layer(origins));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server started");
    axum::serve(listener, app).await?;
    Ok(())
}
