use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A comment on an order. Replies reference their parent by id only; the
/// parent is resolved by lookup in the thread arena and may have been
/// soft-deleted in the meantime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub mentions: Vec<Uuid>,
    pub reactions: HashMap<String, HashSet<Uuid>>,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}

/// Arena of comments for one order, keyed by id. Parent references are
/// non-owning back-references; deletion tombstones the entry so replies keep
/// resolving.
#[derive(Debug, Default, Clone)]
pub struct CommentThread {
    entries: HashMap<Uuid, Comment>,
}

impl CommentThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, comment: Comment) {
        self.entries.insert(comment.id, comment);
    }

    pub fn get(&self, id: Uuid) -> Option<&Comment> {
        self.entries.get(&id)
    }

    pub fn parent_of(&self, id: Uuid) -> Option<&Comment> {
        let parent_id = self.entries.get(&id)?.parent_id?;
        self.entries.get(&parent_id)
    }

    /// Tombstones the comment. The entry stays in the arena so existing
    /// replies still resolve their parent.
    pub fn soft_delete(&mut self, id: Uuid) -> bool {
        match self.entries.get_mut(&id) {
            Some(comment) if !comment.deleted => {
                comment.deleted = true;
                comment.body.clear();
                true
            }
            _ => false,
        }
    }

    /// Flips the user's membership in the emoji reaction set. Returns the
    /// resulting active flag, or None when the comment does not exist.
    pub fn toggle_reaction(&mut self, id: Uuid, user_id: Uuid, emoji: &str) -> Option<bool> {
        let comment = self.entries.get_mut(&id)?;
        let voters = comment.reactions.entry(emoji.to_string()).or_default();
        let active = if voters.remove(&user_id) {
            false
        } else {
            voters.insert(user_id);
            true
        };
        if voters.is_empty() {
            comment.reactions.remove(emoji);
        }
        Some(active)
    }

    pub fn all(&self) -> impl Iterator<Item = &Comment> {
        self.entries.values()
    }

    pub fn replies_to(&self, parent_id: Uuid) -> Vec<&Comment> {
        let mut replies: Vec<&Comment> = self
            .entries
            .values()
            .filter(|comment| comment.parent_id == Some(parent_id))
            .collect();
        replies.sort_by_key(|comment| comment.created_at);
        replies
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
