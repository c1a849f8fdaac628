use anyhow::{bail, Context};
use serde_json::Value;

/// Thin client for the node's enveloped JSON API.
pub struct ApiClient {
    base: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Unwrap `{success, data, error}`; API errors become readable failures.
    fn unwrap_envelope(&self, path: &str, envelope: Value) -> anyhow::Result<Value> {
        if envelope["success"] == Value::Bool(true) {
            return Ok(envelope["data"].clone());
        }
        let code = envelope["error"]["code"].as_str().unwrap_or("UNKNOWN");
        let message = envelope["error"]["message"].as_str().unwrap_or("no message");
        bail!("{path}: {code}: {message}");
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.base))?;
        let envelope: Value = resp.json().await.context("parsing API response")?;
        self.unwrap_envelope(path, envelope)
    }

    pub async fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.base))?;
        let envelope: Value = resp.json().await.context("parsing API response")?;
        self.unwrap_envelope(path, envelope)
    }
}
