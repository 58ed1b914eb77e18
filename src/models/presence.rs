use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caret location inside a text field, broadcast best-effort.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

/// Ephemeral view/edit state of one user on one order.
///
/// Never persisted; a process restart clears all presence. Each user only
/// ever writes their own record, so there is no cross-client write
/// contention here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceRecord {
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub editing_field: Option<String>,
    pub cursor: Option<CursorPosition>,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn new(user_id: Uuid, order_id: Uuid, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            order_id,
            editing_field: None,
            cursor: None,
            joined_at,
            last_seen: joined_at,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after_secs: i64) -> bool {
        now.signed_duration_since(self.last_seen).num_seconds() >= stale_after_secs
    }
}
