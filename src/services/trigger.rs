//! Pipeline trigger — the side effect of starting a downstream execution.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::models::event::Event;
use crate::models::rule::DispatchRule;

#[async_trait]
pub trait Trigger: Send + Sync {
    /// POST the event to the rule's callback. Returns `true` only on
    /// HTTP 202; every other response or transport error is `false`, so the
    /// caller owns retry policy.
    async fn trigger(&self, event: &Event, rule: &DispatchRule) -> bool;
}

pub struct HttpTrigger {
    client: reqwest::Client,
}

impl HttpTrigger {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Trigger for HttpTrigger {
    async fn trigger(&self, event: &Event, rule: &DispatchRule) -> bool {
        let mut req = self.client.post(&rule.callback_url).json(&event.payload);
        for (name, value) in &event.headers {
            req = req.header(name, value);
        }

        match req.send().await {
            Ok(resp) if resp.status() == StatusCode::ACCEPTED => {
                tracing::info!(
                    event_id = %event.id,
                    rule = %rule.name,
                    callback = %rule.callback_url,
                    "Pipeline triggered"
                );
                true
            }
            Ok(resp) => {
                tracing::warn!(
                    event_id = %event.id,
                    rule = %rule.name,
                    status = %resp.status(),
                    "Trigger callback rejected"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.id,
                    rule = %rule.name,
                    "Trigger callback failed: {e}"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rule::CapacitySpec;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::Router;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/hook")
    }

    fn event_with_headers() -> Event {
        let mut headers = BTreeMap::new();
        headers.insert("x-github-event".to_string(), "pull_request".to_string());
        Event::new(
            "d-1".into(),
            "opened".into(),
            "org/repo".into(),
            3,
            serde_json::json!({"action": "opened"}),
            headers,
        )
    }

    fn rule_for(callback_url: String) -> DispatchRule {
        DispatchRule {
            name: "r".into(),
            actions: vec!["opened".into()],
            repository: "org/repo".into(),
            callback_url,
            capacity: CapacitySpec {
                kind: "tekton".into(),
                pipeline: "hosted".into(),
                max_concurrent: 1,
                namespace: "ns".into(),
            },
            predicate: None,
        }
    }

    #[tokio::test]
    async fn accepted_is_success_and_headers_forwarded() {
        let seen: Arc<Mutex<Option<(String, serde_json::Value)>>> = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();

        let router = Router::new().route(
            "/hook",
            post(
                move |headers: HeaderMap, axum::Json(body): axum::Json<serde_json::Value>| {
                    let seen = seen_clone.clone();
                    async move {
                        let event_header = headers
                            .get("x-github-event")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *seen.lock().await = Some((event_header, body));
                        axum::http::StatusCode::ACCEPTED
                    }
                },
            ),
        );
        let url = serve(router).await;

        let ok = HttpTrigger::new()
            .trigger(&event_with_headers(), &rule_for(url))
            .await;
        assert!(ok);

        let recorded = seen.lock().await.clone().unwrap();
        assert_eq!(recorded.0, "pull_request");
        assert_eq!(recorded.1, serde_json::json!({"action": "opened"}));
    }

    #[tokio::test]
    async fn non_202_is_failure() {
        // 200 OK is not good enough; success is strictly 202.
        let router = Router::new().route("/hook", post(|| async { axum::http::StatusCode::OK }));
        let url = serve(router).await;

        let ok = HttpTrigger::new()
            .trigger(&event_with_headers(), &rule_for(url))
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn server_error_is_failure() {
        let router = Router::new().route(
            "/hook",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let url = serve(router).await;

        let ok = HttpTrigger::new()
            .trigger(&event_with_headers(), &rule_for(url))
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn transport_error_is_failure_not_panic() {
        // Nothing listens on this port.
        let ok = HttpTrigger::new()
            .trigger(
                &event_with_headers(),
                &rule_for("http://127.0.0.1:1/hook".into()),
            )
            .await;
        assert!(!ok);
    }
}
