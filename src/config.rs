//! Dispatcher configuration — environment variables plus the rules file.
//!
//! Built once at startup and passed by reference; nothing here is global
//! or mutable afterwards.

use std::path::Path;

use crate::models::rule::DispatchRule;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read rules file {path}: {source}")]
    RulesUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rules file {path}: {source}")]
    RulesInvalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("rule {name}: {reason}")]
    RuleRejected { name: String, reason: String },
}

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// GitHub webhook secret for HMAC validation.
    pub webhook_secret: String,
    /// GitHub personal access token for the queued-label API call.
    pub github_token: String,
    /// Seconds between dispatch ticks.
    pub tick_interval_secs: u64,
    /// Milliseconds to wait after a successful trigger, so the execution
    /// registers as running before the next capacity read.
    pub settle_delay_ms: u64,
    /// Base URL of the orchestration API the capacity gate polls.
    pub orchestrator_url: String,
    /// Bearer token for the orchestration API.
    pub orchestrator_token: String,
    /// Webhook event types accepted at ingestion.
    pub allowed_events: Vec<String>,
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let webhook_secret = std::env::var("DISPATCH_WEBHOOK_SECRET").unwrap_or_default();
        let github_token = std::env::var("DISPATCH_GITHUB_TOKEN").unwrap_or_default();
        let tick_interval_secs = std::env::var("DISPATCH_TICK_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let settle_delay_ms = std::env::var("DISPATCH_SETTLE_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2000);
        let orchestrator_url = std::env::var("DISPATCH_ORCHESTRATOR_URL")
            .unwrap_or_else(|_| "https://kubernetes.default.svc".to_string());
        let orchestrator_token = std::env::var("DISPATCH_ORCHESTRATOR_TOKEN").unwrap_or_default();
        let allowed_events = std::env::var("DISPATCH_ALLOWED_EVENTS")
            .map(|s| s.split(',').map(|e| e.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["pull_request".to_string(), "issue_comment".to_string()]);

        if webhook_secret.is_empty() {
            tracing::warn!("DISPATCH_WEBHOOK_SECRET not set -- webhook signature validation disabled");
        }
        if github_token.is_empty() {
            tracing::warn!("DISPATCH_GITHUB_TOKEN not set -- queued-label updates disabled");
        }

        Self {
            webhook_secret,
            github_token,
            tick_interval_secs,
            settle_delay_ms,
            orchestrator_url,
            orchestrator_token,
            allowed_events,
        }
    }
}

/// Load and validate the dispatch rules file (a JSON array of rules).
pub fn load_rules(path: &Path) -> Result<Vec<DispatchRule>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::RulesUnreadable {
        path: path.display().to_string(),
        source,
    })?;
    let rules: Vec<DispatchRule> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::RulesInvalid {
            path: path.display().to_string(),
            source,
        })?;

    for rule in &rules {
        if rule.actions.is_empty() {
            return Err(ConfigError::RuleRejected {
                name: rule.name.clone(),
                reason: "empty action list".to_string(),
            });
        }
        if rule.capacity.max_concurrent == 0 {
            return Err(ConfigError::RuleRejected {
                name: rule.name.clone(),
                reason: "max_concurrent must be at least 1".to_string(),
            });
        }
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempRules(std::path::PathBuf);

    impl Drop for TempRules {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn write_rules(json: &str) -> TempRules {
        let path = std::env::temp_dir().join(format!("rules-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, json).unwrap();
        TempRules(path)
    }

    #[test]
    fn loads_valid_rules() {
        let tmp = write_rules(
            r#"[{
                "name": "hosted",
                "actions": ["opened", "synchronize"],
                "repository": "org/repo",
                "callback_url": "http://listener:8080/hook",
                "capacity": {
                    "kind": "tekton",
                    "pipeline": "hosted-pipeline",
                    "max_concurrent": 2,
                    "namespace": "pipelines"
                },
                "predicate": "body.action == 'opened'"
            }]"#,
        );
        let rules = load_rules(&tmp.0).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].capacity.max_concurrent, 2);
        assert!(rules[0].predicate.is_some());
    }

    #[test]
    fn rejects_empty_actions() {
        let tmp = write_rules(
            r#"[{
                "name": "bad",
                "actions": [],
                "repository": "org/repo",
                "callback_url": "http://listener:8080/hook",
                "capacity": {"kind": "tekton", "pipeline": "p", "max_concurrent": 1, "namespace": "ns"}
            }]"#,
        );
        assert!(matches!(
            load_rules(&tmp.0),
            Err(ConfigError::RuleRejected { .. })
        ));
    }

    #[test]
    fn rejects_zero_capacity() {
        let tmp = write_rules(
            r#"[{
                "name": "bad",
                "actions": ["opened"],
                "repository": "org/repo",
                "callback_url": "http://listener:8080/hook",
                "capacity": {"kind": "tekton", "pipeline": "p", "max_concurrent": 0, "namespace": "ns"}
            }]"#,
        );
        assert!(matches!(
            load_rules(&tmp.0),
            Err(ConfigError::RuleRejected { .. })
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        let tmp = write_rules("not json");
        assert!(matches!(
            load_rules(&tmp.0),
            Err(ConfigError::RulesInvalid { .. })
        ));
    }
}
