//! Dispatch loop — background task that resolves pending events.
//!
//! Each tick: fetch unresolved events, group by (repository, PR),
//! deduplicate each group to the newest matchable event, abort unsupported
//! ones, then gate every matched rule on capacity before triggering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::event::{Event, EventStatus};
use crate::models::rule::DispatchRule;
use crate::services::capacity::GateRegistry;
use crate::services::github::PullRequestLabeler;
use crate::services::matcher::RuleMatcher;
use crate::services::trigger::Trigger;
use crate::store::{EventStore, StatusUpdate};

const UNSUPPORTED_EVENT: &str = "Unsupported event";
const SUPERSEDED: &str = "Cancelled due to receiving a newer event for the same pull request";

pub struct Dispatcher {
    store: Arc<dyn EventStore>,
    matcher: RuleMatcher,
    gates: GateRegistry,
    trigger: Arc<dyn Trigger>,
    labeler: Arc<dyn PullRequestLabeler>,
    /// Pause after a successful trigger so the execution shows up as running
    /// before the next capacity read.
    settle_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn EventStore>,
        matcher: RuleMatcher,
        gates: GateRegistry,
        trigger: Arc<dyn Trigger>,
        labeler: Arc<dyn PullRequestLabeler>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            store,
            matcher,
            gates,
            trigger,
            labeler,
            settle_delay,
        }
    }

    /// Run the dispatch loop forever. Spawned as a background tokio task.
    /// A failed tick is logged and the loop moves on; it never brings the
    /// process down.
    pub async fn run(self: Arc<Self>, tick_interval: Duration) {
        tracing::info!(
            tick_secs = tick_interval.as_secs(),
            "Dispatcher started"
        );

        loop {
            let started = std::time::Instant::now();
            if let Err(e) = self.tick().await {
                tracing::error!("Dispatch tick error: {e:#}");
            }
            crate::metrics::tick_duration(started.elapsed().as_millis() as u64);
            tokio::time::sleep(tick_interval).await;
        }
    }

    /// One dispatch pass over all unresolved events.
    pub async fn tick(&self) -> anyhow::Result<()> {
        let events = self.store.list_unresolved().await?;
        if events.is_empty() {
            return Ok(());
        }

        let mut groups: HashMap<(String, u64), Vec<Event>> = HashMap::new();
        for event in events {
            groups.entry(event.group_key()).or_default().push(event);
        }

        for ((repository, pr_number), group) in groups {
            tracing::debug!(
                repository = %repository,
                pr_number,
                events = group.len(),
                "Processing pull-request group"
            );
            self.process_group(group).await?;
        }

        Ok(())
    }

    /// Deduplicate one (repository, PR) group and dispatch its newest
    /// matchable event.
    async fn process_group(&self, group: Vec<Event>) -> anyhow::Result<()> {
        let mut matchable: Vec<(Event, Vec<&DispatchRule>)> = Vec::new();

        for event in group {
            let rules = self.matcher.matching_rules(&event);
            if rules.is_empty() {
                tracing::info!(
                    event_id = %event.id,
                    repository = %event.repository,
                    action = %event.action,
                    "No dispatch rule matches, aborting event"
                );
                self.store
                    .update_status(
                        event.id,
                        StatusUpdate::terminal(EventStatus::Aborted, UNSUPPORTED_EVENT),
                    )
                    .await?;
                crate::metrics::event_status_changed("aborted");
            } else {
                matchable.push((event, rules));
            }
        }

        if matchable.is_empty() {
            return Ok(());
        }

        // Newest first; identical timestamps fall back to the event id so
        // the winner is stable across retries.
        matchable.sort_by(|(a, _), (b, _)| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let (winner, rules) = matchable.remove(0);

        for (superseded, _) in matchable {
            tracing::info!(
                event_id = %superseded.id,
                superseded_by = %winner.id,
                "Cancelling event superseded by a newer one"
            );
            self.store
                .update_status(
                    superseded.id,
                    StatusUpdate::terminal(EventStatus::Cancelled, SUPERSEDED),
                )
                .await?;
            crate::metrics::event_status_changed("cancelled");
        }

        self.admit(&winner, &rules).await
    }

    /// Capacity-gate each matched rule and fire the trigger where admitted.
    ///
    /// Disposition: any capacity-blocked rule leaves the event `queued`
    /// (label applied once, on the transition in); otherwise `processed`
    /// only when every rule triggered successfully; a failed trigger leaves
    /// the event unchanged for retry on the next tick.
    async fn admit(&self, event: &Event, rules: &[&DispatchRule]) -> anyhow::Result<()> {
        let mut blocked_pipelines: Vec<&str> = Vec::new();
        let mut all_triggered = true;

        for rule in rules {
            let gate = self.gates.get(&rule.capacity.kind)?;

            if !gate.is_capacity_available(rule).await? {
                tracing::info!(
                    event_id = %event.id,
                    rule = %rule.name,
                    pipeline = %rule.capacity.pipeline,
                    "Capacity unavailable, queueing event"
                );
                crate::metrics::capacity_unavailable(&rule.capacity.pipeline);
                blocked_pipelines.push(&rule.capacity.pipeline);
                continue;
            }

            if self.trigger.trigger(event, rule).await {
                crate::metrics::trigger_result(&rule.name, true);
                tokio::time::sleep(self.settle_delay).await;
            } else {
                crate::metrics::trigger_result(&rule.name, false);
                all_triggered = false;
            }
        }

        if !blocked_pipelines.is_empty() {
            if event.status != EventStatus::Queued {
                self.store
                    .update_status(event.id, StatusUpdate::queued())
                    .await?;
                crate::metrics::event_status_changed("queued");

                for pipeline in blocked_pipelines {
                    let label = format!("{pipeline}/queued");
                    if let Err(e) = self
                        .labeler
                        .add_label(&event.repository, event.pr_number, &label)
                        .await
                    {
                        tracing::warn!(
                            event_id = %event.id,
                            label,
                            "Failed to label pull request: {e}"
                        );
                    }
                }
            }
            return Ok(());
        }

        if all_triggered {
            self.store
                .update_status(event.id, StatusUpdate::processed())
                .await?;
            crate::metrics::event_status_changed("processed");
            tracing::info!(event_id = %event.id, "Event processed");
        } else {
            tracing::warn!(
                event_id = %event.id,
                "Trigger failed, leaving event for retry on the next tick"
            );
        }

        Ok(())
    }
}
