//! End-to-end smoke test for irrl-node.
//!
//! Starts a real node process against a fresh data directory, then drives
//! the whole flow over HTTP: realm → attestation → verification →
//! evaluations → reputation → transitive trust → proof → audit chain.
//!
//! Run with:
//!   cargo test -p irrl-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use irrl_crypto::sha256_hex;
use serde_json::{json, Value};

// ── Node lifecycle ────────────────────────────────────────────────────────────

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

/// Find a free TCP port on loopback.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

async fn post(client: &reqwest::Client, url: &str, body: Value) -> (u16, Value) {
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("POST {url} failed: {e}"));
    let status = resp.status().as_u16();
    let json: Value = resp.json().await.expect("parse response JSON");
    (status, json)
}

async fn get(client: &reqwest::Client, url: &str) -> Value {
    let resp = client
        .get(url)
        .send()
        .await
        .unwrap_or_else(|e| panic!("GET {url} failed: {e}"));
    let json: Value = resp.json().await.expect("parse response JSON");
    assert_eq!(json["success"], json!(true), "GET {url}: {json}");
    json["data"].clone()
}

/// Poll until /health responds or the timeout elapses.
async fn wait_for_ready(client: &reqwest::Client, base: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.get(format!("{base}/health")).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

fn approx(value: &Value, expected: f64) {
    let actual = value.as_f64().unwrap_or_else(|| panic!("not a number: {value}"));
    assert!((actual - expected).abs() < 1e-9, "{actual} !~ {expected}");
}

// ── Smoke test ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn smoke_realm_to_proof() {
    // ── 1. Start the node on a fresh data dir ─────────────────────────────────
    let data_dir = std::env::temp_dir().join(format!("irrl_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let port = free_port();
    let base = format!("http://127.0.0.1:{port}");

    let node_bin = env!("CARGO_BIN_EXE_irrl-node");
    let child = Command::new(node_bin)
        .args([
            "--data-dir", data_dir.to_str().unwrap(),
            "--host", "127.0.0.1",
            "--port", &port.to_string(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn irrl-node");
    let _guard = NodeGuard { child, data_dir };

    let http = reqwest::Client::new();
    assert!(
        wait_for_ready(&http, &base, Duration::from_secs(20)).await,
        "irrl-node did not become ready within 20 seconds"
    );

    // ── 2. Create a realm ─────────────────────────────────────────────────────
    let (status, body) = post(
        &http,
        &format!("{base}/realms"),
        json!({"id": "oss", "name": "Open Source", "domain": "rust", "createdBy": "admin"}),
    )
    .await;
    assert_eq!(status, 201, "{body}");
    assert_eq!(body["data"]["path"], json!("oss"));
    assert_eq!(body["data"]["depth"], json!(0));
    assert_eq!(body["data"]["rules"]["decayHalfLife"], json!("180d"));

    // ── 3. Attest and verify ──────────────────────────────────────────────────
    let content = "RELEASE-NOTES-1.0";
    let (status, body) = post(
        &http,
        &format!("{base}/attestations"),
        json!({
            "realmId": "oss",
            "attester": "alice",
            "subject": "bob",
            "claim": "authored release 1.0",
            "resolverId": "document-hash",
            "evidence": {"content": content, "sha256": sha256_hex(content.as_bytes())},
        }),
    )
    .await;
    assert_eq!(status, 201, "{body}");
    let attestation_id = body["data"]["id"].as_str().unwrap().to_string();
    assert!(attestation_id.starts_with("cid_"));
    assert_eq!(body["data"]["status"], json!("pending"));

    let (status, body) = post(&http, &format!("{base}/verify/{attestation_id}"), json!({})).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["attestation"]["status"], json!("verified"));
    assert_eq!(body["data"]["run"]["status"], json!("verified"));

    // Malformed evidence is rejected with field-level errors.
    let (status, body) = post(
        &http,
        &format!("{base}/attestations"),
        json!({
            "realmId": "oss",
            "attester": "alice",
            "subject": "bob",
            "claim": "bad evidence",
            "resolverId": "document-hash",
            "evidence": {"content": 42},
        }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("INVALID_EVIDENCE"));

    // ── 4. Evaluations ────────────────────────────────────────────────────────
    for (from, to, score) in [("alice", "bob", 90u8), ("carol", "bob", 70), ("bob", "dave", 100)] {
        let (status, body) = post(
            &http,
            &format!("{base}/trust/evaluations"),
            json!({"from": from, "to": to, "realmId": "oss", "domain": "rust", "score": score}),
        )
        .await;
        assert_eq!(status, 201, "{body}");
    }

    // ── 5. Reputation ─────────────────────────────────────────────────────────
    let reputation = get(
        &http,
        &format!("{base}/trust/reputation/bob?realm=oss&domain=rust"),
    )
    .await;
    assert_eq!(reputation["evaluationCount"], json!(2));
    assert_eq!(reputation["attestationCount"], json!(1));
    // Fresh evaluations: mean of 90 and 70 plus the single-verified bonus
    // (1/1 · 10 · 1/5 = 2).
    approx(&reputation["score"], 82.0);
    let warnings = reputation["breakdown"]["sybil"]["warnings"].as_array().unwrap();
    assert!(!warnings.is_empty());

    // ── 6. Transitive trust: alice → bob → dave ───────────────────────────────
    let (status, body) = post(
        &http,
        &format!("{base}/trust/transitive"),
        json!({"from": "alice", "to": "dave", "domain": "rust"}),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    // 0.9 · 1.0 · 0.8 decayed once more on arrival: 0.576.
    approx(&body["data"]["score"], 0.576);
    let best = &body["data"]["bestPath"];
    assert_eq!(best["path"], json!(["alice", "bob", "dave"]));

    // ── 7. Proof round trip ───────────────────────────────────────────────────
    let (status, body) = post(
        &http,
        &format!("{base}/proofs/generate"),
        json!({"subject": "bob", "realmId": "oss", "domain": "rust"}),
    )
    .await;
    assert_eq!(status, 201, "{body}");
    let proof_id = body["data"]["proofId"].as_str().unwrap().to_string();
    let envelope = body["data"]["proof"].clone();
    // One verified attestation + two evaluations about bob.
    assert_eq!(body["data"]["evidenceCount"], json!(3));
    assert_eq!(envelope["version"], json!("IRRL-Proof-v1"));

    let (status, body) = post(
        &http,
        &format!("{base}/proofs/verify"),
        json!({"proof": envelope}),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["valid"], json!(true));
    assert_eq!(body["data"]["signatureValid"], json!(true));
    assert_eq!(body["data"]["expired"], json!(false));
    assert_eq!(body["data"]["issuerTrusted"], json!(true));

    let (status, body) = post(
        &http,
        &format!("{base}/proofs/evidence-proof"),
        json!({"proofId": proof_id, "evidenceId": attestation_id}),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    let merkle_proof = body["data"].clone();
    let root = envelope["data"]["evidenceMerkleRoot"].as_str().unwrap();
    assert_eq!(merkle_proof["root"], json!(root));

    let (status, body) = post(
        &http,
        &format!("{base}/proofs/verify-evidence"),
        json!({"merkleProof": merkle_proof, "expectedRoot": root}),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["valid"], json!(true));

    // ── 8. Audit chain holds end to end ───────────────────────────────────────
    let report = get(&http, &format!("{base}/audit/verify")).await;
    assert_eq!(report["valid"], json!(true));
    assert!(report["checkedEvents"].as_u64().unwrap() >= 6);

    // ── 9. Listings see what we created ───────────────────────────────────────
    let attestations = get(&http, &format!("{base}/attestations?realm=oss&subject=bob")).await;
    assert_eq!(attestations.as_array().unwrap().len(), 1);

    let resolvers = get(&http, &format!("{base}/resolvers")).await;
    assert!(resolvers.as_array().unwrap().len() >= 3);
}
