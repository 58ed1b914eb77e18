use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Workflow stage an item currently sits in. One kanban column per stage.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "board.item_stage", rename_all = "lowercase")]
pub enum Stage {
    Intake,
    Planning,
    Development,
    Review,
    Done,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Intake,
        Stage::Planning,
        Stage::Development,
        Stage::Review,
        Stage::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Planning => "planning",
            Stage::Development => "development",
            Stage::Review => "review",
            Stage::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "board.item_kind", rename_all = "lowercase")]
pub enum ItemKind {
    Task,
    Subtask,
}

/// A draggable unit of work on an order's board.
///
/// `position` is unique within `(stage, pinned)`; pinned items sort before
/// unpinned ones regardless of position. There is no optimistic-lock column:
/// concurrent edits resolve last-write-wins at the gateway and the final
/// state is re-broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PositionedItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: ItemKind,
    pub parent_id: Option<Uuid>,
    pub stage: Stage,
    pub position: i64,
    pub pinned: bool,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PositionedItem {
    /// Sort key for a container view: pinned partition first, then position.
    pub fn sort_key(&self) -> (bool, i64) {
        (!self.pinned, self.position)
    }
}
