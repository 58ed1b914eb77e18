use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::models::{items::Stage, notifications::NotificationCategory};

#[derive(Debug, Serialize)]
#[serde(tag = "event_type")]
pub enum SyncEvent {
    ItemCreated {
        order_id: Uuid,
        item_id: Uuid,
        stage: Stage,
    },
    ItemMoved {
        order_id: Uuid,
        item_id: Uuid,
        stage: Stage,
        position: i64,
    },
    ItemUpdated {
        order_id: Uuid,
        item_id: Uuid,
        fields: Vec<String>,
    },
    ItemDeleted {
        order_id: Uuid,
        item_id: Uuid,
    },
    ContainerRenumbered {
        order_id: Uuid,
        stage: Stage,
        items: usize,
    },
    CommentAdded {
        order_id: Uuid,
        comment_id: Uuid,
        mentions: usize,
    },
    PresenceSwept {
        order_id: Uuid,
        reaped: usize,
    },
    NotificationDelivered {
        user_id: Uuid,
        category: NotificationCategory,
    },
    NotificationSkipped {
        user_id: Uuid,
        category: NotificationCategory,
        reason: String,
    },
    ResyncServed {
        order_id: Uuid,
        items: usize,
    },
}

impl SyncEvent {
    pub fn log(&self) {
        let event_json = serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self));
        info!(
            target: "sync_events",
            event = %event_json,
            "Sync event occurred"
        );
    }
}
