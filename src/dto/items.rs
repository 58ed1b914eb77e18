use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::items::{ItemKind, PositionedItem, Stage};

/// Fields for a new item. The gateway assigns id, position and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDraft {
    pub order_id: Uuid,
    pub kind: ItemKind,
    pub parent_id: Option<Uuid>,
    pub stage: Stage,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned: bool,
}

/// Partial update of an item's record fields. Position and stage changes go
/// through the move operation instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub assignee_id: Option<Option<Uuid>>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub pinned: Option<bool>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.assignee_id.is_none()
            && self.due_at.is_none()
            && self.pinned.is_none()
    }

    /// Applies the patch and returns the names of fields that actually
    /// changed. Toggling `pinned` never touches `position`.
    pub fn apply(&self, item: &mut PositionedItem) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(title) = &self.title {
            if item.title != *title {
                item.title = title.clone();
                changed.push("title");
            }
        }
        if let Some(description) = &self.description {
            if item.description != *description {
                item.description = description.clone();
                changed.push("description");
            }
        }
        if let Some(assignee_id) = &self.assignee_id {
            if item.assignee_id != *assignee_id {
                item.assignee_id = *assignee_id;
                changed.push("assignee_id");
            }
        }
        if let Some(due_at) = &self.due_at {
            if item.due_at != *due_at {
                item.due_at = *due_at;
                changed.push("due_at");
            }
        }
        if let Some(pinned) = self.pinned {
            if item.pinned != pinned {
                item.pinned = pinned;
                changed.push("pinned");
            }
        }
        changed
    }
}
