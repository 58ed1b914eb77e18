use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    models::presence::{CursorPosition, PresenceRecord},
    realtime::protocol::{EventBody, RealtimeEvent},
    telemetry::SyncEvent,
};

/// In-memory registry of who is looking at which order right now.
///
/// Every operation returns the events the caller must broadcast; the
/// service itself never touches the channel. State is ephemeral on purpose:
/// a restart empties the registry and clients re-join.
pub struct PresenceService {
    rooms: DashMap<Uuid, DashMap<Uuid, PresenceRecord>>,
}

impl PresenceService {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Registers the user on the order. A repeat join refreshes the record
    /// without announcing the user a second time.
    pub fn join(&self, user_id: Uuid, order_id: Uuid, now: DateTime<Utc>) -> Vec<RealtimeEvent> {
        let room = self.rooms.entry(order_id).or_default();
        if let Some(mut record) = room.get_mut(&user_id) {
            record.last_seen = now;
            return Vec::new();
        }
        room.insert(user_id, PresenceRecord::new(user_id, order_id, now));
        vec![RealtimeEvent::new(
            order_id,
            EventBody::PresenceJoined { user_id },
        )]
    }

    pub fn leave(&self, user_id: Uuid, order_id: Uuid) -> Vec<RealtimeEvent> {
        let Some(room) = self.rooms.get(&order_id) else {
            return Vec::new();
        };
        if room.remove(&user_id).is_none() {
            return Vec::new();
        }
        drop(room);
        self.drop_room_if_empty(order_id);
        vec![RealtimeEvent::new(
            order_id,
            EventBody::PresenceLeft { user_id },
        )]
    }

    /// Records which field the user has focused; `None` clears it on
    /// blur/save/cancel. Observers use this for the conflict advisory.
    pub fn focus_field(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        field: Option<String>,
        now: DateTime<Utc>,
    ) -> Vec<RealtimeEvent> {
        let Some(room) = self.rooms.get(&order_id) else {
            return Vec::new();
        };
        let Some(mut record) = room.get_mut(&user_id) else {
            return Vec::new();
        };
        record.editing_field = field.clone();
        record.last_seen = now;
        vec![RealtimeEvent::new(
            order_id,
            EventBody::FieldFocusChanged { user_id, field },
        )]
    }

    /// Best-effort cursor update. Loss of these events has no correctness
    /// impact; senders are expected to throttle before calling.
    pub fn cursor_moved(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        cursor: CursorPosition,
        now: DateTime<Utc>,
    ) -> Vec<RealtimeEvent> {
        let Some(room) = self.rooms.get(&order_id) else {
            return Vec::new();
        };
        let Some(mut record) = room.get_mut(&user_id) else {
            return Vec::new();
        };
        record.cursor = Some(cursor);
        record.last_seen = now;
        vec![RealtimeEvent::new(
            order_id,
            EventBody::CursorMoved { user_id, cursor },
        )]
    }

    pub fn heartbeat(&self, user_id: Uuid, order_id: Uuid, now: DateTime<Utc>) {
        if let Some(room) = self.rooms.get(&order_id) {
            if let Some(mut record) = room.get_mut(&user_id) {
                record.last_seen = now;
            }
        }
    }

    /// Removes the user from every order, as on connection loss.
    pub fn disconnect_user(&self, user_id: Uuid) -> Vec<RealtimeEvent> {
        let order_ids: Vec<Uuid> = self.rooms.iter().map(|entry| *entry.key()).collect();
        let mut events = Vec::new();
        for order_id in order_ids {
            events.extend(self.leave(user_id, order_id));
        }
        events
    }

    /// Reaps records that stopped heartbeating. Returns the leave events to
    /// broadcast for the reaped users.
    pub fn sweep_stale(&self, now: DateTime<Utc>, stale_after_secs: i64) -> Vec<RealtimeEvent> {
        let mut events = Vec::new();
        let order_ids: Vec<Uuid> = self.rooms.iter().map(|entry| *entry.key()).collect();
        for order_id in order_ids {
            let stale: Vec<Uuid> = match self.rooms.get(&order_id) {
                Some(room) => room
                    .iter()
                    .filter(|entry| entry.value().is_stale(now, stale_after_secs))
                    .map(|entry| *entry.key())
                    .collect(),
                None => continue,
            };
            if stale.is_empty() {
                continue;
            }
            SyncEvent::PresenceSwept {
                order_id,
                reaped: stale.len(),
            }
            .log();
            for user_id in stale {
                events.extend(self.leave(user_id, order_id));
            }
        }
        events
    }

    /// Current records for an order, oldest join first.
    pub fn snapshot(&self, order_id: Uuid) -> Vec<PresenceRecord> {
        let Some(room) = self.rooms.get(&order_id) else {
            return Vec::new();
        };
        let mut records: Vec<PresenceRecord> =
            room.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by_key(|record| (record.joined_at, record.user_id));
        records
    }

    pub fn clear(&self) {
        self.rooms.clear();
    }

    fn drop_room_if_empty(&self, order_id: Uuid) {
        self.rooms
            .remove_if(&order_id, |_, room| room.is_empty());
    }
}

impl Default for PresenceService {
    fn default() -> Self {
        Self::new()
    }
}
