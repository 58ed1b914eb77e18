use std::sync::Arc;

use dashmap::{DashMap, Entry};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::realtime::{protocol::RealtimeEvent, room::Room};

pub type EventStream = UnboundedReceiverStream<RealtimeEvent>;

/// Registry of rooms plus the join/leave/broadcast surface the engine talks
/// to. Purely transport: no history is kept, so a client re-joining after a
/// gap must refetch full state instead of expecting a replay.
pub struct ChannelHub {
    rooms: DashMap<Uuid, Arc<Room>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    fn room(&self, order_id: Uuid) -> Arc<Room> {
        if let Some(room) = self.rooms.get(&order_id) {
            return room.clone();
        }
        match self.rooms.entry(order_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let room = Arc::new(Room::new(order_id));
                entry.insert(room.clone());
                room
            }
        }
    }

    pub async fn join(&self, client_id: Uuid, order_id: Uuid) -> EventStream {
        self.room(order_id).join(client_id).await
    }

    pub async fn leave(&self, client_id: Uuid, order_id: Uuid) -> bool {
        let Some(room) = self.rooms.get(&order_id).map(|entry| entry.clone()) else {
            return false;
        };
        let left = room.leave(client_id).await;
        if room.member_count().await == 0 {
            self.rooms.remove(&order_id);
        }
        left
    }

    /// Removes the client from every room it is in, returning the order ids
    /// it was subscribed to. Used on connection loss.
    pub async fn leave_all(&self, client_id: Uuid) -> Vec<Uuid> {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|entry| entry.value().clone()).collect();
        let mut left = Vec::new();
        for room in rooms {
            if room.leave(client_id).await {
                left.push(room.order_id);
            }
            if room.member_count().await == 0 {
                self.rooms.remove(&room.order_id);
            }
        }
        left
    }

    /// Delivers the event, in broadcast order, to every member of the order's
    /// room except `exclude`. Exclusion is an optimization for origin echo:
    /// correctness never depends on it because apply is idempotent.
    pub async fn broadcast(&self, order_id: Uuid, event: &RealtimeEvent, exclude: &[Uuid]) -> usize {
        let Some(room) = self.rooms.get(&order_id).map(|entry| entry.clone()) else {
            return 0;
        };
        room.broadcast(event, exclude).await
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drops every room, closing all member streams.
    pub fn close(&self) {
        self.rooms.clear();
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::protocol::EventBody;
    use futures::StreamExt;

    fn presence_event(order_id: Uuid, user_id: Uuid) -> RealtimeEvent {
        RealtimeEvent::new(order_id, EventBody::PresenceJoined { user_id })
    }

    #[tokio::test]
    async fn members_receive_events_in_broadcast_order() {
        let hub = ChannelHub::new();
        let order_id = Uuid::now_v7();
        let mut a = hub.join(Uuid::now_v7(), order_id).await;
        let mut b = hub.join(Uuid::now_v7(), order_id).await;

        let users: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
        for user in &users {
            hub.broadcast(order_id, &presence_event(order_id, *user), &[])
                .await;
        }

        for stream in [&mut a, &mut b] {
            for user in &users {
                let event = stream.next().await.unwrap();
                assert_eq!(
                    event.body,
                    EventBody::PresenceJoined { user_id: *user }
                );
            }
        }
    }

    #[tokio::test]
    async fn excluded_origin_is_skipped() {
        let hub = ChannelHub::new();
        let order_id = Uuid::now_v7();
        let origin = Uuid::now_v7();
        let origin_stream = hub.join(origin, order_id).await;
        let mut other = hub.join(Uuid::now_v7(), order_id).await;

        let delivered = hub
            .broadcast(order_id, &presence_event(order_id, Uuid::now_v7()), &[origin])
            .await;
        assert_eq!(delivered, 1);
        assert!(other.next().await.is_some());

        let mut origin_rx = origin_stream.into_inner();
        assert!(origin_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let hub = ChannelHub::new();
        let order_a = Uuid::now_v7();
        let order_b = Uuid::now_v7();
        let _a = hub.join(Uuid::now_v7(), order_a).await;
        let b = hub.join(Uuid::now_v7(), order_b).await;

        hub.broadcast(order_a, &presence_event(order_a, Uuid::now_v7()), &[])
            .await;

        let mut b_rx = b.into_inner();
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_member_does_not_block_the_rest() {
        let hub = ChannelHub::new();
        let order_id = Uuid::now_v7();
        let gone = hub.join(Uuid::now_v7(), order_id).await;
        let mut alive = hub.join(Uuid::now_v7(), order_id).await;
        drop(gone);

        let delivered = hub
            .broadcast(order_id, &presence_event(order_id, Uuid::now_v7()), &[])
            .await;
        assert_eq!(delivered, 1);
        assert!(alive.next().await.is_some());
    }

    #[tokio::test]
    async fn leave_then_broadcast_skips_the_client() {
        let hub = ChannelHub::new();
        let order_id = Uuid::now_v7();
        let client = Uuid::now_v7();
        let stream = hub.join(client, order_id).await;
        let mut other = hub.join(Uuid::now_v7(), order_id).await;

        assert!(hub.leave(client, order_id).await);
        hub.broadcast(order_id, &presence_event(order_id, Uuid::now_v7()), &[])
            .await;

        assert!(other.next().await.is_some());
        let mut rx = stream.into_inner();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn leave_all_reports_rooms_left() {
        let hub = ChannelHub::new();
        let client = Uuid::now_v7();
        let order_a = Uuid::now_v7();
        let order_b = Uuid::now_v7();
        let _a = hub.join(client, order_a).await;
        let _b = hub.join(client, order_b).await;

        let mut left = hub.leave_all(client).await;
        left.sort();
        let mut expected = vec![order_a, order_b];
        expected.sort();
        assert_eq!(left, expected);
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn rejoin_replaces_previous_subscription() {
        let hub = ChannelHub::new();
        let order_id = Uuid::now_v7();
        let client = Uuid::now_v7();
        let stale = hub.join(client, order_id).await;
        let mut fresh = hub.join(client, order_id).await;

        hub.broadcast(order_id, &presence_event(order_id, Uuid::now_v7()), &[])
            .await;

        assert!(fresh.next().await.is_some());
        let mut stale_rx = stale.into_inner();
        assert!(stale_rx.recv().await.is_none());
    }
}
