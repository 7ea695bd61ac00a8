//! Dispatch rules — which events trigger which pipeline, and under what
//! concurrency ceiling. Loaded once at startup, immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::models::event::Event;

/// Concurrency ceiling for a rule's downstream pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacitySpec {
    /// Capacity backend kind; selects the gate implementation ("tekton").
    pub kind: String,
    /// Pipeline name the running-execution count is filtered on.
    pub pipeline: String,
    /// Maximum number of concurrently running executions.
    pub max_concurrent: usize,
    /// Namespace the orchestration API is queried in.
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRule {
    pub name: String,
    /// Event actions this rule accepts, e.g. ["opened", "synchronize"].
    pub actions: Vec<String>,
    /// Repository full name the rule is bound to.
    pub repository: String,
    /// Trigger callback address; the event payload is POSTed here.
    pub callback_url: String,
    pub capacity: CapacitySpec,
    /// Optional CEL predicate over `{body, headers}`; evaluation errors are
    /// treated as non-match.
    #[serde(default)]
    pub predicate: Option<String>,
}

impl DispatchRule {
    /// Repository + action check. The predicate, if any, is evaluated
    /// separately by the matcher.
    pub fn accepts(&self, event: &Event) -> bool {
        self.repository == event.repository && self.actions.iter().any(|a| a == &event.action)
    }
}
