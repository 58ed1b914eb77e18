use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use uuid::Uuid;

use crate::realtime::protocol::{EventBody, RealtimeEvent};

/// Non-blocking notice that someone else is editing the same field. Purely
/// advisory: neither user's edit is held up, last-write-wins still governs
/// the final value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictWarning {
    pub order_id: Uuid,
    pub field: String,
    pub other_user: Uuid,
    pub raised_at: Instant,
}

type AdvisoryKey = (Uuid, Uuid, String);

/// Watches field-focus events against the local user's own focus and raises
/// at most one warning per `(order, user, field)` window. Warnings expire on
/// their own after the dismiss interval or on explicit dismissal.
pub struct ConflictAdvisor {
    user_id: Uuid,
    editing: HashMap<Uuid, String>,
    active: Vec<ConflictWarning>,
    limiter: DefaultKeyedRateLimiter<AdvisoryKey>,
    dismiss_after: Duration,
}

impl ConflictAdvisor {
    pub fn new(user_id: Uuid, advisory_window: Duration, dismiss_after: Duration) -> Self {
        let quota = Quota::with_period(advisory_window).expect("advisory window is non-zero");
        Self {
            user_id,
            editing: HashMap::new(),
            active: Vec::new(),
            limiter: RateLimiter::keyed(quota),
            dismiss_after,
        }
    }

    /// Records which field the local user has focused. Blur clears it and
    /// retires warnings for that order.
    pub fn focus_local(&mut self, order_id: Uuid, field: Option<String>) {
        match field {
            Some(field) => {
                self.active
                    .retain(|warning| warning.order_id != order_id || warning.field == field);
                self.editing.insert(order_id, field);
            }
            None => {
                self.editing.remove(&order_id);
                self.active.retain(|warning| warning.order_id != order_id);
            }
        }
    }

    /// Feeds an observed event through the advisor. Returns a warning when
    /// another user focused the field the local user is editing, rate
    /// limited per `(order, user, field)`.
    pub fn observe(&mut self, event: &RealtimeEvent, now: Instant) -> Option<ConflictWarning> {
        let EventBody::FieldFocusChanged { user_id, field } = &event.body else {
            return None;
        };
        if *user_id == self.user_id {
            return None;
        }

        let Some(field) = field else {
            // The other user blurred; their warning has served its purpose.
            self.active
                .retain(|warning| warning.order_id != event.resource_id || warning.other_user != *user_id);
            return None;
        };

        let editing = self.editing.get(&event.resource_id)?;
        if editing != field {
            return None;
        }

        let key: AdvisoryKey = (event.resource_id, *user_id, field.clone());
        if self.limiter.check_key(&key).is_err() {
            return None;
        }

        let warning = ConflictWarning {
            order_id: event.resource_id,
            field: field.clone(),
            other_user: *user_id,
            raised_at: now,
        };
        self.active.retain(|existing| {
            existing.order_id != warning.order_id
                || existing.field != warning.field
                || existing.other_user != warning.other_user
        });
        self.active.push(warning.clone());
        Some(warning)
    }

    /// Warnings still worth showing; expired ones are pruned on the way.
    pub fn active_warnings(&mut self, now: Instant) -> Vec<ConflictWarning> {
        let dismiss_after = self.dismiss_after;
        self.active
            .retain(|warning| now.saturating_duration_since(warning.raised_at) < dismiss_after);
        self.active.clone()
    }

    pub fn dismiss(&mut self, order_id: Uuid, field: &str) {
        self.active
            .retain(|warning| warning.order_id != order_id || warning.field != field);
    }
}
