//! GitHub webhook handler — authenticates PR events and persists them as
//! pending, for the dispatcher to pick up.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};

use crate::config::DispatchConfig;
use crate::models::event::{Event, HEADER_ALLOWLIST};
use crate::services::github;
use crate::store::EventStore;

/// Handle an incoming GitHub webhook payload.
pub async fn handle_webhook(
    config: &DispatchConfig,
    store: &Arc<dyn EventStore>,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    // Validate signature
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !github::validate_signature(&config.webhook_secret, &body, signature) {
        tracing::warn!("Webhook signature validation failed");
        return Err(StatusCode::UNAUTHORIZED);
    }

    // GitHub hook deliveries identify themselves via the agent string.
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !user_agent.starts_with("GitHub-Hookshot/") {
        tracing::warn!(user_agent, "Webhook from unrecognized caller");
        return Err(StatusCode::FORBIDDEN);
    }

    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    if event_type == "ping" {
        tracing::info!("Received GitHub ping webhook");
        return Ok(StatusCode::OK);
    }

    if !config.allowed_events.iter().any(|e| e == event_type) {
        tracing::warn!(event_type, "Webhook event type not on allow list");
        return Err(StatusCode::BAD_REQUEST);
    }

    let delivery_id = headers
        .get("x-github-delivery")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if delivery_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?;

    let repository = payload["repository"]["full_name"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    if repository.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Events without a resolvable pull request are acknowledged but never
    // stored; the dispatcher only reasons about PR groups.
    let pr_number = match extract_pr_number(&payload) {
        Some(n) => n,
        None => {
            tracing::debug!(event_type, repository = %repository, "No pull request in payload, ignoring");
            return Ok(StatusCode::OK);
        }
    };

    // "push" carries no action field; the event type doubles as the action.
    let action = payload["action"]
        .as_str()
        .unwrap_or(event_type)
        .to_string();

    let forwarded: BTreeMap<String, String> = HEADER_ALLOWLIST
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();

    let event = Event::new(
        delivery_id.to_string(),
        action.clone(),
        repository.clone(),
        pr_number,
        payload,
        forwarded,
    );
    let event_id = event.id;

    let inserted = store.insert(event).await.map_err(|e| {
        tracing::error!("Failed to store webhook event: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if !inserted {
        tracing::info!(delivery_id, "Duplicate delivery, already ingested");
        return Ok(StatusCode::OK);
    }

    tracing::info!(
        event_id = %event_id,
        delivery_id,
        repository = %repository,
        pr_number,
        action = %action,
        "Webhook event stored as pending"
    );

    Ok(StatusCode::CREATED)
}

fn extract_pr_number(payload: &serde_json::Value) -> Option<u64> {
    payload["pull_request"]["number"]
        .as_u64()
        .or_else(|| payload["number"].as_u64())
        .or_else(|| payload["issue"]["pull_request"].as_object().and_then(|_| payload["issue"]["number"].as_u64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn config() -> DispatchConfig {
        DispatchConfig {
            webhook_secret: "s3cret".into(),
            github_token: String::new(),
            tick_interval_secs: 5,
            settle_delay_ms: 0,
            orchestrator_url: "http://localhost".into(),
            orchestrator_token: String::new(),
            allowed_events: vec!["pull_request".into()],
        }
    }

    fn signed_headers(secret: &str, body: &[u8], event_type: &str) -> HeaderMap {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        let mut headers = HeaderMap::new();
        headers.insert("x-hub-signature-256", sig.parse().unwrap());
        headers.insert("x-github-event", event_type.parse().unwrap());
        headers.insert("x-github-delivery", "delivery-1".parse().unwrap());
        headers.insert("user-agent", "GitHub-Hookshot/abc123".parse().unwrap());
        headers
    }

    fn pr_body() -> Vec<u8> {
        serde_json::json!({
            "action": "opened",
            "number": 42,
            "repository": {"full_name": "org/repo"}
        })
        .to_string()
        .into_bytes()
    }

    fn store() -> Arc<dyn EventStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn valid_webhook_is_stored_pending() {
        let cfg = config();
        let store = store();
        let body = pr_body();
        let headers = signed_headers("s3cret", &body, "pull_request");

        let status = handle_webhook(&cfg, &store, &headers, Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let events = store.list_unresolved().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].repository, "org/repo");
        assert_eq!(events[0].pr_number, 42);
        assert_eq!(events[0].action, "opened");
        assert_eq!(
            events[0].headers.get("x-github-delivery").map(String::as_str),
            Some("delivery-1")
        );
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let cfg = config();
        let store = store();
        let body = pr_body();
        let headers = signed_headers("wrong-secret", &body, "pull_request");

        let result = handle_webhook(&cfg, &store, &headers, Bytes::from(body)).await;
        assert_eq!(result, Err(StatusCode::UNAUTHORIZED));
        assert!(store.list_unresolved().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_caller_is_rejected() {
        let cfg = config();
        let store = store();
        let body = pr_body();
        let mut headers = signed_headers("s3cret", &body, "pull_request");
        headers.insert("user-agent", "curl/8.0".parse().unwrap());

        let result = handle_webhook(&cfg, &store, &headers, Bytes::from(body)).await;
        assert_eq!(result, Err(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn disallowed_event_type_is_rejected() {
        let cfg = config();
        let store = store();
        let body = pr_body();
        let headers = signed_headers("s3cret", &body, "workflow_run");

        let result = handle_webhook(&cfg, &store, &headers, Bytes::from(body)).await;
        assert_eq!(result, Err(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn duplicate_delivery_is_idempotent() {
        let cfg = config();
        let store = store();
        let body = pr_body();
        let headers = signed_headers("s3cret", &body, "pull_request");

        let first = handle_webhook(&cfg, &store, &headers, Bytes::from(body.clone()))
            .await
            .unwrap();
        assert_eq!(first, StatusCode::CREATED);

        let second = handle_webhook(&cfg, &store, &headers, Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(second, StatusCode::OK);

        assert_eq!(store.list_unresolved().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payload_without_pull_request_is_acknowledged_not_stored() {
        let cfg = config();
        let store = store();
        let body = serde_json::json!({
            "action": "opened",
            "repository": {"full_name": "org/repo"}
        })
        .to_string()
        .into_bytes();
        let headers = signed_headers("s3cret", &body, "pull_request");

        let status = handle_webhook(&cfg, &store, &headers, Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(store.list_unresolved().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ping_is_acknowledged() {
        let cfg = config();
        let store = store();
        let body = b"{}".to_vec();
        let headers = signed_headers("s3cret", &body, "ping");

        let status = handle_webhook(&cfg, &store, &headers, Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
    }
}
