use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A new comment on an order. `parent_id` threads the comment as a reply;
/// `mentions` drives mention notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub order_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    #[serde(default)]
    pub mentions: Vec<Uuid>,
}
