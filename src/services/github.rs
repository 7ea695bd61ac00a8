//! GitHub integration — webhook signature validation and the queued label.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Validate a GitHub webhook signature (X-Hub-Signature-256).
pub fn validate_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        tracing::warn!("Webhook secret not configured, skipping validation");
        return true;
    }

    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    let sig_bytes = match hex::decode(sig) {
        Ok(b) => b,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Applies the "<pipeline>/queued" label when an event enters the queue.
#[async_trait]
pub trait PullRequestLabeler: Send + Sync {
    async fn add_label(&self, repository: &str, pr_number: u64, label: &str) -> anyhow::Result<()>;
}

/// Labeler backed by the GitHub issues API.
pub struct GithubLabeler {
    client: reqwest::Client,
    token: String,
}

impl GithubLabeler {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait]
impl PullRequestLabeler for GithubLabeler {
    async fn add_label(&self, repository: &str, pr_number: u64, label: &str) -> anyhow::Result<()> {
        if self.token.is_empty() {
            tracing::debug!("GitHub token not set, skipping label update");
            return Ok(());
        }

        let url = format!("https://api.github.com/repos/{repository}/issues/{pr_number}/labels");
        let body = serde_json::json!({ "labels": [label] });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "pr-dispatch")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!("GitHub label update failed: {} {}", status, text);
        }

        Ok(())
    }
}
