//! Event store — durable record of submitted events.
//!
//! The dispatcher reads unresolved events and writes status transitions
//! through this trait. The in-memory backend is the default; a durable
//! backend plugs in behind the same seam.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::event::{Event, EventStatus};

/// One status mutation, applied by the dispatcher.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: EventStatus,
    pub processing_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// Terminal failure dispositions (aborted/cancelled) carry a message.
    pub fn terminal(status: EventStatus, error: &str) -> Self {
        Self {
            status,
            processing_error: Some(error.to_string()),
            processed_at: None,
        }
    }

    /// Successful processing: error cleared, processed_at stamped.
    pub fn processed() -> Self {
        Self {
            status: EventStatus::Processed,
            processing_error: None,
            processed_at: Some(Utc::now()),
        }
    }

    pub fn queued() -> Self {
        Self {
            status: EventStatus::Queued,
            processing_error: None,
            processed_at: None,
        }
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a freshly ingested event. Returns `false` without inserting
    /// when an event with the same delivery id already exists.
    async fn insert(&self, event: Event) -> anyhow::Result<bool>;

    /// All events still awaiting a decision (`pending` or `queued`).
    async fn list_unresolved(&self) -> anyhow::Result<Vec<Event>>;

    /// Apply a status transition. Transitions out of a terminal status are
    /// rejected with an error.
    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> anyhow::Result<()>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Event>>;

    /// Most recent events first, up to `limit`.
    async fn list(&self, limit: usize) -> anyhow::Result<Vec<Event>>;
}
