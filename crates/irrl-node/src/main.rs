//! irrl-node — the reputation service binary.
//!
//! Startup sequence:
//!   1. Load configuration (flags override environment)
//!   2. Open (or initialise) the repository
//!   3. Load or generate the instance signing key
//!   4. Register the built-in resolvers
//!   5. Construct the component graph and serve HTTP
//!   6. Run the attestation expiry scan on an interval

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use irrl_api::AppState;
use irrl_attest::AttestationManager;
use irrl_audit::AuditLog;
use irrl_crypto::InstanceKey;
use irrl_proof::ProofService;
use irrl_realm::RealmStore;
use irrl_reputation::ReputationService;
use irrl_resolver::ResolverRegistry;
use irrl_store::{Repository, SledRepository};
use irrl_trust::{EvaluationStore, TrustEngine};

/// Seconds between attestation expiry scans.
const EXPIRY_SCAN_INTERVAL_SECS: u64 = 60;

#[derive(Parser, Debug)]
#[command(
    name = "irrl-node",
    version,
    about = "IRRL node — contextual reputation on verifiable evidence"
)]
struct Args {
    /// Listen host. Overrides $HOST.
    #[arg(long)]
    host: Option<String>,

    /// Listen port. Overrides $PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for the embedded database and keyfile.
    /// Overrides $DATABASE_URL.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Disable audit-log persistence. Overrides $ENABLE_AUDIT_LOG=false.
    #[arg(long)]
    disable_audit: bool,

    /// Additional trusted issuer public keys (PEM files, comma-separated).
    #[arg(long, value_delimiter = ',')]
    trusted_issuer: Vec<PathBuf>,
}

struct Config {
    host: String,
    port: u16,
    data_dir: PathBuf,
    enable_audit: bool,
    cors_origins: String,
    github_token: Option<String>,
    log_queries: bool,
}

impl Config {
    fn load(args: &Args) -> anyhow::Result<Self> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let data_dir = match (&args.data_dir, env("DATABASE_URL")) {
            (Some(dir), _) => dir.clone(),
            (None, Some(url)) => PathBuf::from(url),
            (None, None) => bail!("DATABASE_URL (or --data-dir) is required"),
        };

        let port = match (args.port, env("PORT")) {
            (Some(p), _) => p,
            (None, Some(v)) => v.parse().context("parsing $PORT")?,
            (None, None) => 3000,
        };

        let enable_audit = if args.disable_audit {
            false
        } else {
            env("ENABLE_AUDIT_LOG").map(|v| v != "false" && v != "0").unwrap_or(true)
        };

        // JWT_SECRET gates production boots even though caller auth lives in
        // a fronting proxy.
        if env("IRRL_ENV").as_deref() == Some("production") && env("JWT_SECRET").is_none() {
            bail!("JWT_SECRET is required in production");
        }
        if env("DB_POOL_SIZE").is_some() {
            warn!("DB_POOL_SIZE is accepted but unused by the embedded database");
        }

        Ok(Self {
            host: args.host.clone().or_else(|| env("HOST")).unwrap_or_else(|| "127.0.0.1".into()),
            port,
            data_dir,
            enable_audit,
            cors_origins: env("CORS_ORIGINS").unwrap_or_else(|| "*".into()),
            github_token: env("GITHUB_TOKEN"),
            log_queries: env("LOG_QUERIES").map(|v| v == "true" || v == "1").unwrap_or(false),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args)?;

    let default_filter = if config.log_queries { "debug" } else { "info,irrl=debug" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.parse().unwrap()),
        )
        .init();

    info!("IRRL node starting");

    // ── Repository ────────────────────────────────────────────────────────────
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let repo: Arc<dyn Repository> = Arc::new(
        SledRepository::open(config.data_dir.join("db")).context("opening repository")?,
    );

    // ── Instance key ──────────────────────────────────────────────────────────
    let key = Arc::new(load_or_generate_key(&config.data_dir.join("instance-key.pem"))?);
    info!(issuer = %key.issuer_id(), "instance key ready");

    let trusted_issuer_pems = args
        .trusted_issuer
        .iter()
        .map(|p| {
            std::fs::read_to_string(p)
                .with_context(|| format!("reading trusted issuer key {}", p.display()))
        })
        .collect::<anyhow::Result<Vec<String>>>()?;

    // ── Resolvers ─────────────────────────────────────────────────────────────
    let registry = Arc::new(ResolverRegistry::new());
    registry.register_builtins(Arc::clone(&repo), config.github_token.clone());

    // ── Component graph ───────────────────────────────────────────────────────
    let audit = Arc::new(AuditLog::new(Arc::clone(&repo), config.enable_audit));
    if !config.enable_audit {
        warn!("audit-log persistence is DISABLED; no chain will be maintained");
    }

    let attestations = AttestationManager::new(
        Arc::clone(&repo),
        Arc::clone(&registry),
        Arc::clone(&audit),
        Arc::clone(&key),
    );
    let state = Arc::new(AppState {
        realms: RealmStore::new(Arc::clone(&repo), Arc::clone(&audit)),
        evaluations: EvaluationStore::new(Arc::clone(&repo), Arc::clone(&audit), Arc::clone(&key)),
        trust: TrustEngine::new(Arc::clone(&repo)),
        reputation: ReputationService::new(Arc::clone(&repo)),
        proofs: ProofService::new(
            Arc::clone(&repo),
            Arc::clone(&audit),
            Arc::clone(&key),
            &trusted_issuer_pems,
        ),
        attestations,
        registry,
        audit,
        public_key_pem: key.public_key_pem().to_string(),
        issuer: key.issuer_id(),
        started_at: chrono::Utc::now(),
        repo: Arc::clone(&repo),
    });

    // ── Expiry scan ───────────────────────────────────────────────────────────
    // `expired` is a derived state: a periodic sweep transitions attestations
    // whose expiresAt has passed.
    let scan_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(EXPIRY_SCAN_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match scan_state.attestations.expire_scan().await {
                Ok(0) => {}
                Ok(n) => info!(count = n, "attestations expired"),
                Err(e) => warn!(error = %e, "expiry scan failed"),
            }
        }
    });

    // ── HTTP ──────────────────────────────────────────────────────────────────
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("parsing listen address")?;
    info!("node ready");
    irrl_api::serve(state, addr, &config.cors_origins).await
}

/// Load the instance key from `path`, or generate one and persist it.
///
/// # Warning
/// A deleted keyfile means a fresh issuer identity: proofs signed by the
/// old key only verify on instances that keep the old public key in their
/// trusted issuer list.
fn load_or_generate_key(path: &Path) -> anyhow::Result<InstanceKey> {
    if path.exists() {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("reading keyfile {}", path.display()))?;
        return InstanceKey::from_secret_pem(&pem)
            .map_err(|e| anyhow::anyhow!("decoding keyfile {}: {e}", path.display()));
    }
    warn!(keyfile = %path.display(), "no keyfile found — generating a fresh instance key");
    let key = InstanceKey::generate();
    let pem = key.secret_key_pem().map_err(|e| anyhow::anyhow!("encoding key: {e}"))?;
    std::fs::write(path, pem.as_bytes())
        .with_context(|| format!("writing keyfile {}", path.display()))?;
    Ok(key)
}
