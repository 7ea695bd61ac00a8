//! Status/listing API over the event store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::event::Event;
use crate::store::EventStore;

/// API view of an event; the raw payload is omitted from listings.
#[derive(Debug, Serialize)]
pub struct EventJson {
    pub id: Uuid,
    pub delivery_id: String,
    pub action: String,
    pub repository: String,
    pub pr_number: u64,
    pub status: String,
    pub processing_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<Event> for EventJson {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            delivery_id: e.delivery_id,
            action: e.action,
            repository: e.repository,
            pr_number: e.pr_number,
            status: e.status.as_str().to_string(),
            processing_error: e.processing_error,
            received_at: e.received_at,
            processed_at: e.processed_at,
        }
    }
}

pub async fn list_events(
    store: &Arc<dyn EventStore>,
    limit: usize,
) -> anyhow::Result<Vec<EventJson>> {
    let events = store.list(limit).await?;
    Ok(events.into_iter().map(EventJson::from).collect())
}

pub async fn get_event(store: &Arc<dyn EventStore>, id: Uuid) -> anyhow::Result<Option<EventJson>> {
    Ok(store.get(id).await?.map(EventJson::from))
}
