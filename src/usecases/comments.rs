use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    dto::comments::NewComment,
    error::{SyncError, SyncResult},
    models::{
        comments::{Comment, CommentThread},
        notifications::{Notification, NotificationCategory},
    },
    realtime::protocol::{EventBody, RealtimeEvent},
    telemetry::SyncEvent,
};

/// The comment plus everything the caller owes the outside world: events to
/// broadcast and mention notifications to fan out.
pub struct CommentOutcome {
    pub comment: Comment,
    pub events: Vec<RealtimeEvent>,
    pub mention_recipients: Vec<Uuid>,
    pub mention_notification: Option<Notification>,
}

/// Comment threads per order. Replies hold a non-owning `parent_id` resolved
/// by lookup, so a deleted parent tombstones instead of invalidating its
/// replies.
pub struct CommentService {
    threads: DashMap<Uuid, CommentThread>,
}

impl CommentService {
    pub fn new() -> Self {
        Self {
            threads: DashMap::new(),
        }
    }

    pub fn add_comment(&self, new: NewComment, now: DateTime<Utc>) -> SyncResult<CommentOutcome> {
        if new.body.trim().is_empty() {
            return Err(SyncError::Validation("Comment must not be blank".to_string()));
        }

        let mut mentions = new.mentions.clone();
        mentions.sort();
        mentions.dedup();
        mentions.retain(|user_id| *user_id != new.author_id);

        let comment = Comment {
            id: Uuid::now_v7(),
            order_id: new.order_id,
            author_id: new.author_id,
            parent_id: new.parent_id,
            body: new.body,
            mentions: mentions.clone(),
            reactions: HashMap::new(),
            created_at: now,
            deleted: false,
        };
        self.threads
            .entry(new.order_id)
            .or_default()
            .insert(comment.clone());
        SyncEvent::CommentAdded {
            order_id: comment.order_id,
            comment_id: comment.id,
            mentions: mentions.len(),
        }
        .log();

        let mention_notification = if mentions.is_empty() {
            None
        } else {
            Some(Notification {
                category: NotificationCategory::Mention,
                order_id: comment.order_id,
                actor_id: comment.author_id,
                title: "You were mentioned".to_string(),
                body: comment.body.clone(),
            })
        };

        Ok(CommentOutcome {
            events: vec![RealtimeEvent::comment_added(comment.clone())],
            mention_recipients: mentions,
            mention_notification,
            comment,
        })
    }

    pub fn delete_comment(&self, order_id: Uuid, comment_id: Uuid) -> SyncResult<Vec<RealtimeEvent>> {
        let Some(mut thread) = self.threads.get_mut(&order_id) else {
            return Err(SyncError::NotFound("Comment not found".to_string()));
        };
        if !thread.soft_delete(comment_id) {
            return Err(SyncError::NotFound("Comment not found".to_string()));
        }
        Ok(vec![RealtimeEvent::new(
            order_id,
            EventBody::CommentDeleted { comment_id },
        )])
    }

    pub fn toggle_reaction(
        &self,
        order_id: Uuid,
        comment_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> SyncResult<(bool, Vec<RealtimeEvent>)> {
        if emoji.trim().is_empty() {
            return Err(SyncError::Validation("Reaction must not be blank".to_string()));
        }
        let Some(mut thread) = self.threads.get_mut(&order_id) else {
            return Err(SyncError::NotFound("Comment not found".to_string()));
        };
        let Some(active) = thread.toggle_reaction(comment_id, user_id, emoji) else {
            return Err(SyncError::NotFound("Comment not found".to_string()));
        };
        Ok((
            active,
            vec![RealtimeEvent::new(
                order_id,
                EventBody::ReactionToggled {
                    comment_id,
                    emoji: emoji.to_string(),
                    user_id,
                    active,
                },
            )],
        ))
    }

    /// All comments on an order, oldest first. Tombstones are included so
    /// clients can render "deleted" placeholders inside threads.
    pub fn comments(&self, order_id: Uuid) -> Vec<Comment> {
        let Some(thread) = self.threads.get(&order_id) else {
            return Vec::new();
        };
        let mut all: Vec<Comment> = thread.all().cloned().collect();
        all.sort_by_key(|comment| (comment.created_at, comment.id));
        all
    }
}

impl Default for CommentService {
    fn default() -> Self {
        Self::new()
    }
}
