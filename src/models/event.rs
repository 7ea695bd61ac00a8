//! Webhook event — one pull-request event awaiting (or past) dispatch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport headers forwarded to the trigger callback. Everything else is
/// dropped at ingestion.
pub const HEADER_ALLOWLIST: &[&str] = &[
    "content-type",
    "x-github-event",
    "x-github-delivery",
    "x-github-hook-id",
];

/// Dispatch status of an event.
///
/// `Pending` and `Queued` are unresolved; the other three are terminal.
/// The dispatcher is the only writer after ingestion, and never moves an
/// event out of a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Queued,
    Processed,
    Cancelled,
    Aborted,
}

impl EventStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Cancelled | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Processed => "processed",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// GitHub delivery id (X-GitHub-Delivery); re-ingestion of the same
    /// delivery is a no-op.
    pub delivery_id: String,
    /// Event action tag, e.g. "opened", "labeled", "push".
    pub action: String,
    /// Repository full name, e.g. "org/repo".
    pub repository: String,
    pub pr_number: u64,
    /// Raw webhook payload, forwarded verbatim to the trigger callback.
    pub payload: serde_json::Value,
    /// Allow-listed subset of the delivery headers.
    pub headers: BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
    pub status: EventStatus,
    pub processing_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(
        delivery_id: String,
        action: String,
        repository: String,
        pr_number: u64,
        payload: serde_json::Value,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            delivery_id,
            action,
            repository,
            pr_number,
            payload,
            headers,
            received_at: Utc::now(),
            status: EventStatus::Pending,
            processing_error: None,
            processed_at: None,
        }
    }

    /// Grouping key for deduplication: one pull request per repository.
    pub fn group_key(&self) -> (String, u64) {
        (self.repository.clone(), self.pr_number)
    }
}
