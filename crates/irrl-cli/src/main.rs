//! irrl — CLI client for a running IRRL node.
//!
//! Usage:
//!   irrl keygen      [--out <dir>]
//!   irrl realm       --id <id> --name <name> --domain <d> [--parent <id>]
//!   irrl show-realm  --id <id|path>
//!   irrl attest      --realm <id> --subject <s> --claim <c> --resolver <r> --evidence <json>
//!   irrl verify      --attestation <cid> [--force]
//!   irrl evaluate    --from <e> --to <e> --realm <id> --domain <d> --score <0-100>
//!   irrl reputation  --subject <s> --realm <id> --domain <d> [--refresh]
//!   irrl trust       --from <e> --to <e> --domain <d>
//!   irrl prove       --subject <s> --realm <id> --domain <d>
//!   irrl audit-verify
//!   irrl info
//!
//! All commands accept `--node <url>` (default http://127.0.0.1:3000).

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use irrl_crypto::InstanceKey;

mod http_client;
use http_client::ApiClient;

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "irrl", version, about = "IRRL client — query and feed a reputation node")]
struct Args {
    /// Node API endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:3000")]
    node: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an Ed25519 keypair (PEM) for use as a trusted issuer key.
    Keygen {
        /// Output directory for issuer-key.pem / issuer-key.pub.pem.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Create a realm.
    Realm {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        parent: Option<String>,
        /// Actor recorded as the realm's creator.
        #[arg(long, default_value = "cli")]
        created_by: String,
    },

    /// Show a realm by id or path.
    ShowRealm {
        #[arg(long)]
        id: String,
    },

    /// Submit an attestation.
    Attest {
        #[arg(long)]
        realm: String,
        #[arg(long, default_value = "cli")]
        attester: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        claim: String,
        #[arg(long)]
        resolver: String,
        /// Evidence payload as inline JSON.
        #[arg(long)]
        evidence: String,
    },

    /// Run verification for an attestation.
    Verify {
        #[arg(long)]
        attestation: String,
        #[arg(long)]
        force: bool,
    },

    /// Submit (or re-submit) a trust evaluation.
    Evaluate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        realm: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        score: u8,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        rationale: Option<String>,
    },

    /// Compute (or fetch) a subject's reputation.
    Reputation {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        realm: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        refresh: bool,
    },

    /// Transitive trust between two entities.
    Trust {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        realm: Option<String>,
    },

    /// Generate a portable reputation proof.
    Prove {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        realm: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        valid_for_days: Option<i64>,
    },

    /// Verify the node's audit chain end to end.
    AuditVerify,

    /// Node identity and version.
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let api = ApiClient::new(&args.node);

    let output = match args.command {
        Command::Keygen { out } => {
            let key = InstanceKey::generate();
            let secret_path = out.join("issuer-key.pem");
            let public_path = out.join("issuer-key.pub.pem");
            std::fs::write(
                &secret_path,
                key.secret_key_pem()
                    .map_err(|e| anyhow::anyhow!("encoding key: {e}"))?
                    .as_bytes(),
            )
            .with_context(|| format!("writing {}", secret_path.display()))?;
            std::fs::write(&public_path, key.public_key_pem())
                .with_context(|| format!("writing {}", public_path.display()))?;
            json!({
                "issuer": key.issuer_id(),
                "secretKey": secret_path.display().to_string(),
                "publicKey": public_path.display().to_string(),
            })
        }

        Command::Realm { id, name, domain, parent, created_by } => {
            api.post(
                "/realms",
                json!({
                    "id": id,
                    "name": name,
                    "domain": domain,
                    "parent": parent,
                    "createdBy": created_by,
                }),
            )
            .await?
        }

        Command::ShowRealm { id } => {
            // Paths contain `/`; they travel percent-encoded.
            let encoded = id.replace('/', "%2F");
            api.get(&format!("/realms/{encoded}")).await?
        }

        Command::Attest { realm, attester, subject, claim, resolver, evidence } => {
            let evidence: serde_json::Value =
                serde_json::from_str(&evidence).context("parsing --evidence as JSON")?;
            api.post(
                "/attestations",
                json!({
                    "realmId": realm,
                    "attester": attester,
                    "subject": subject,
                    "claim": claim,
                    "resolverId": resolver,
                    "evidence": evidence,
                }),
            )
            .await?
        }

        Command::Verify { attestation, force } => {
            api.post(&format!("/verify/{attestation}"), json!({"force": force}))
                .await?
        }

        Command::Evaluate { from, to, realm, domain, score, weight, rationale } => {
            api.post(
                "/trust/evaluations",
                json!({
                    "from": from,
                    "to": to,
                    "realmId": realm,
                    "domain": domain,
                    "score": score,
                    "weight": weight,
                    "rationale": rationale,
                }),
            )
            .await?
        }

        Command::Reputation { subject, realm, domain, refresh } => {
            api.get(&format!(
                "/trust/reputation/{subject}?realm={realm}&domain={domain}&refresh={refresh}"
            ))
            .await?
        }

        Command::Trust { from, to, domain, realm } => {
            api.post(
                "/trust/transitive",
                json!({"from": from, "to": to, "domain": domain, "realmId": realm}),
            )
            .await?
        }

        Command::Prove { subject, realm, domain, valid_for_days } => {
            api.post(
                "/proofs/generate",
                json!({
                    "subject": subject,
                    "realmId": realm,
                    "domain": domain,
                    "validForDays": valid_for_days,
                }),
            )
            .await?
        }

        Command::AuditVerify => api.get("/audit/verify").await?,

        Command::Info => api.get("/info").await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
