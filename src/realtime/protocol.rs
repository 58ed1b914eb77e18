use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{comments::Comment, items::PositionedItem, presence::CursorPosition};

/// The wire unit fanned out to every member of an order's room.
///
/// Serialized shape is `{"type": ..., "resource_id": ..., "payload": ...}`.
/// Delivery is at-least-once; consumers must treat re-application of an
/// identical event as a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeEvent {
    pub resource_id: Uuid,
    #[serde(flatten)]
    pub body: EventBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    Created {
        item: PositionedItem,
    },
    Updated {
        item: PositionedItem,
    },
    Moved {
        item: PositionedItem,
    },
    Deleted {
        item_id: Uuid,
    },
    /// Derived advisory emitted alongside `Updated` when record fields
    /// changed, so collaborators looking at an unrelated part of the order
    /// still get informed.
    FieldChanged {
        item_id: Uuid,
        fields: Vec<String>,
        actor_id: Uuid,
    },
    CommentAdded {
        comment: Comment,
    },
    CommentDeleted {
        comment_id: Uuid,
    },
    ReactionToggled {
        comment_id: Uuid,
        emoji: String,
        user_id: Uuid,
        active: bool,
    },
    PresenceJoined {
        user_id: Uuid,
    },
    PresenceLeft {
        user_id: Uuid,
    },
    CursorMoved {
        user_id: Uuid,
        cursor: CursorPosition,
    },
    /// `field` is None on blur/save/cancel.
    FieldFocusChanged {
        user_id: Uuid,
        field: Option<String>,
    },
}

impl RealtimeEvent {
    pub fn new(resource_id: Uuid, body: EventBody) -> Self {
        Self { resource_id, body }
    }

    // Item constructors take the room key from the item itself, which keeps
    // events scoped to the room of the order they belong to.
    pub fn created(item: PositionedItem) -> Self {
        Self::new(item.order_id, EventBody::Created { item })
    }

    pub fn updated(item: PositionedItem) -> Self {
        Self::new(item.order_id, EventBody::Updated { item })
    }

    pub fn moved(item: PositionedItem) -> Self {
        Self::new(item.order_id, EventBody::Moved { item })
    }

    pub fn deleted(order_id: Uuid, item_id: Uuid) -> Self {
        Self::new(order_id, EventBody::Deleted { item_id })
    }

    pub fn comment_added(comment: Comment) -> Self {
        Self::new(comment.order_id, EventBody::CommentAdded { comment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::items::{Stage, tests::test_item};

    #[test]
    fn wire_shape_carries_type_resource_and_payload() {
        let item = test_item(Stage::Planning, 0, false);
        let order_id = item.order_id;
        let event = RealtimeEvent::moved(item);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "moved");
        assert_eq!(value["resource_id"], order_id.to_string());
        assert!(value["payload"]["item"].is_object());
    }

    #[test]
    fn round_trips_through_json() {
        let event = RealtimeEvent::new(
            Uuid::now_v7(),
            EventBody::FieldFocusChanged {
                user_id: Uuid::now_v7(),
                field: Some("title".to_string()),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: RealtimeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn item_constructors_scope_to_owning_order() {
        let item = test_item(Stage::Review, 0, false);
        let event = RealtimeEvent::created(item.clone());
        assert_eq!(event.resource_id, item.order_id);
    }
}
