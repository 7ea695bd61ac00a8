//! In-memory event store backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::event::{Event, EventStatus};
use crate::store::{EventStore, StatusUpdate};

#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<Uuid, Event>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert(&self, event: Event) -> anyhow::Result<bool> {
        let mut events = self.events.write().await;
        if events.values().any(|e| e.delivery_id == event.delivery_id) {
            return Ok(false);
        }
        events.insert(event.id, event);
        Ok(true)
    }

    async fn list_unresolved(&self) -> anyhow::Result<Vec<Event>> {
        let events = self.events.read().await;
        Ok(events
            .values()
            .filter(|e| !e.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> anyhow::Result<()> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown event: {id}"))?;

        if event.status.is_terminal() {
            anyhow::bail!(
                "event {id} is already {}; refusing transition to {}",
                event.status.as_str(),
                update.status.as_str()
            );
        }

        event.status = update.status;
        event.processing_error = update.processing_error;
        event.processed_at = update.processed_at;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Event>> {
        Ok(self.events.read().await.get(&id).cloned())
    }

    async fn list(&self, limit: usize) -> anyhow::Result<Vec<Event>> {
        let events = self.events.read().await;
        let mut all: Vec<Event> = events.values().cloned().collect();
        all.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        all.truncate(limit);
        Ok(all)
    }
}
