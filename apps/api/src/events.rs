#![allow(dead_code)]

//! Push-update channel for dashboard clients.
//!
//! The core only ever calls `emit`; delivery is a process-wide broadcast
//! that the WebSocket route subscribes to and filters per user. Alongside
//! the cache TTL this bounds read staleness: a connected client hears about
//! a write immediately, everyone else within one TTL.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// Events pushed to connected dashboard listeners.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    ItemCreated {
        user_id: i64,
        item_id: i64,
    },
    ItemUpdated {
        user_id: i64,
        item_id: i64,
    },
    ItemDeleted {
        user_id: i64,
        item_id: i64,
    },
    SyncProgress {
        user_id: i64,
        sync_id: Uuid,
        processed: u32,
        total: u32,
    },
    SyncComplete {
        user_id: i64,
        sync_id: Uuid,
        created: u32,
        skipped: u32,
        errors: u32,
    },
}

impl DashboardEvent {
    /// The user whose dashboard this event belongs on.
    pub fn user_id(&self) -> i64 {
        match *self {
            DashboardEvent::ItemCreated { user_id, .. }
            | DashboardEvent::ItemUpdated { user_id, .. }
            | DashboardEvent::ItemDeleted { user_id, .. }
            | DashboardEvent::SyncProgress { user_id, .. }
            | DashboardEvent::SyncComplete { user_id, .. } => user_id,
        }
    }
}

/// Broadcast fan-out for dashboard events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Emits an event to all current listeners. Nobody listening is not an
    /// error — the dashboard may simply be closed.
    pub fn emit(&self, event: DashboardEvent) {
        if self.tx.send(event).is_err() {
            debug!("dashboard event dropped: no listeners");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(DashboardEvent::ItemCreated {
            user_id: 7,
            item_id: 42,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id(), 7);
    }

    #[test]
    fn test_emit_without_listeners_is_silent() {
        let bus = EventBus::new();
        bus.emit(DashboardEvent::ItemDeleted {
            user_id: 1,
            item_id: 1,
        });
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = DashboardEvent::SyncComplete {
            user_id: 3,
            sync_id: Uuid::nil(),
            created: 2,
            skipped: 1,
            errors: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sync_complete");
        assert_eq!(json["created"], 2);
    }
}
