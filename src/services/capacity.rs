//! Capacity gate — can a rule admit one more pipeline execution right now?
//!
//! Gates are keyed by the rule's capacity `kind` so new backends can be
//! registered without touching the dispatcher. The `tekton` backend polls
//! the orchestration API for PipelineRun objects and counts the running
//! ones against the rule's ceiling.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::rule::DispatchRule;

#[async_trait]
pub trait CapacityGate: Send + Sync {
    /// Whether `rule` may start one more execution. Failures contacting the
    /// backend propagate; the caller retries the pairing on the next tick.
    async fn is_capacity_available(&self, rule: &DispatchRule) -> anyhow::Result<bool>;
}

/// Type-keyed gate lookup, populated at startup.
#[derive(Default)]
pub struct GateRegistry {
    gates: HashMap<String, Arc<dyn CapacityGate>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &str, gate: Arc<dyn CapacityGate>) {
        self.gates.insert(kind.to_string(), gate);
    }

    pub fn get(&self, kind: &str) -> anyhow::Result<Arc<dyn CapacityGate>> {
        self.gates
            .get(kind)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no capacity gate registered for kind {kind:?}"))
    }

    /// Startup check: every rule's capacity kind must have a gate.
    pub fn validate(&self, rules: &[DispatchRule]) -> anyhow::Result<()> {
        for rule in rules {
            if !self.gates.contains_key(&rule.capacity.kind) {
                anyhow::bail!(
                    "rule {:?} references unknown capacity kind {:?}",
                    rule.name,
                    rule.capacity.kind
                );
            }
        }
        Ok(())
    }
}

// ── Tekton backend ──

#[derive(Debug, Deserialize)]
pub struct PipelineRunList {
    #[serde(default)]
    pub items: Vec<PipelineRun>,
}

#[derive(Debug, Deserialize)]
pub struct PipelineRun {
    #[serde(default)]
    pub spec: PipelineRunSpec,
    #[serde(default)]
    pub status: PipelineRunStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineRunSpec {
    #[serde(rename = "pipelineRef")]
    pub pipeline_ref: Option<PipelineRef>,
}

#[derive(Debug, Deserialize)]
pub struct PipelineRef {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineRunStatus {
    #[serde(default)]
    pub conditions: Vec<RunCondition>,
}

#[derive(Debug, Deserialize)]
pub struct RunCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

impl RunCondition {
    /// Only the exact in-progress triple counts as running. A completed
    /// Succeeded condition (True/False) does not occupy capacity.
    fn is_running(&self) -> bool {
        self.condition_type == "Succeeded" && self.status == "Unknown" && self.reason == "Running"
    }
}

/// Count the runs of `pipeline` currently marked running.
pub fn count_running(list: &PipelineRunList, pipeline: &str) -> usize {
    list.items
        .iter()
        .filter(|run| {
            run.spec
                .pipeline_ref
                .as_ref()
                .is_some_and(|r| r.name == pipeline)
        })
        .filter(|run| run.status.conditions.iter().any(RunCondition::is_running))
        .count()
}

pub struct TektonGate {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TektonGate {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn list_pipeline_runs(&self, namespace: &str) -> anyhow::Result<PipelineRunList> {
        let url = format!(
            "{}/apis/tekton.dev/v1/namespaces/{}/pipelineruns",
            self.base_url, namespace
        );

        let mut req = self.client.get(&url).header("Accept", "application/json");
        if !self.token.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.token));
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!(
                "orchestration API returned {} listing pipelineruns in {namespace}",
                resp.status()
            );
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CapacityGate for TektonGate {
    async fn is_capacity_available(&self, rule: &DispatchRule) -> anyhow::Result<bool> {
        let list = self.list_pipeline_runs(&rule.capacity.namespace).await?;
        let running = count_running(&list, &rule.capacity.pipeline);

        tracing::debug!(
            rule = %rule.name,
            pipeline = %rule.capacity.pipeline,
            running,
            max = rule.capacity.max_concurrent,
            "Capacity check"
        );

        Ok(running < rule.capacity.max_concurrent)
    }
}
