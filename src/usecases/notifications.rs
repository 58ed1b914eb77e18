use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    error::SyncResult,
    models::notifications::{Notification, NotificationPreferences},
    telemetry::SyncEvent,
};

/// Outbound delivery adapter. Telegram and webhook sinks live outside this
/// crate; the dispatcher only cares that delivery either succeeded or
/// failed for one recipient.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, user_id: Uuid, notification: &Notification) -> SyncResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    SkippedQuietHours,
    SkippedCategory,
    Failed,
}

/// Fans a notification out to recipients, honouring each recipient's
/// category flags and quiet hours. Skipped recipients are skipped for good,
/// never queued for later.
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    preferences: DashMap<Uuid, NotificationPreferences>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            preferences: DashMap::new(),
        }
    }

    pub fn set_preferences(&self, user_id: Uuid, preferences: NotificationPreferences) {
        self.preferences.insert(user_id, preferences);
    }

    pub fn preferences_for(&self, user_id: Uuid) -> NotificationPreferences {
        self.preferences
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub async fn dispatch(
        &self,
        notification: &Notification,
        recipients: &[Uuid],
        now: DateTime<Utc>,
    ) -> Vec<(Uuid, DispatchOutcome)> {
        let mut outcomes = Vec::with_capacity(recipients.len());
        for &user_id in recipients {
            let preferences = self.preferences_for(user_id);
            let outcome = if !preferences.allows(notification.category) {
                SyncEvent::NotificationSkipped {
                    user_id,
                    category: notification.category,
                    reason: "category_disabled".to_string(),
                }
                .log();
                DispatchOutcome::SkippedCategory
            } else if preferences.in_quiet_hours(now) {
                SyncEvent::NotificationSkipped {
                    user_id,
                    category: notification.category,
                    reason: "quiet_hours".to_string(),
                }
                .log();
                DispatchOutcome::SkippedQuietHours
            } else {
                match self.sink.deliver(user_id, notification).await {
                    Ok(()) => {
                        SyncEvent::NotificationDelivered {
                            user_id,
                            category: notification.category,
                        }
                        .log();
                        DispatchOutcome::Delivered
                    }
                    Err(error) => {
                        // One broken recipient must not stop the fan-out.
                        tracing::warn!(
                            %user_id,
                            error = %error,
                            "Notification delivery failed"
                        );
                        DispatchOutcome::Failed
                    }
                }
            };
            outcomes.push((user_id, outcome));
        }
        outcomes
    }
}
