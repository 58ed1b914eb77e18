use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    OrderCreated,
    Comment,
    Mention,
    Deadline,
}

/// A do-not-disturb window on the recipient's local clock. The window may
/// wrap midnight; `start == end` means the whole day while enabled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }

    pub fn contains(&self, at: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start == self.end {
            return true;
        }
        if self.start < self.end {
            at >= self.start && at < self.end
        } else {
            at >= self.start || at < self.end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPreferences {
    pub quiet_hours: QuietHours,
    pub enabled_categories: HashSet<NotificationCategory>,
    pub utc_offset_minutes: i32,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            quiet_hours: QuietHours::disabled(),
            enabled_categories: HashSet::from([
                NotificationCategory::OrderCreated,
                NotificationCategory::Comment,
                NotificationCategory::Mention,
                NotificationCategory::Deadline,
            ]),
            utc_offset_minutes: 0,
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, category: NotificationCategory) -> bool {
        self.enabled_categories.contains(&category)
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        (now + Duration::minutes(i64::from(self.utc_offset_minutes))).time()
    }

    /// True when the recipient should not be disturbed at `now`.
    pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        self.quiet_hours.contains(self.local_time(now))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub category: NotificationCategory,
    pub order_id: Uuid,
    pub actor_id: Uuid,
    pub title: String,
    pub body: String,
}
