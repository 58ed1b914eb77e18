use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::realtime::protocol::RealtimeEvent;

pub struct RoomMember {
    pub client_id: Uuid,
    tx: mpsc::UnboundedSender<RealtimeEvent>,
}

/// One pub/sub partition, keyed by order id.
///
/// The member list mutex doubles as the ordering guarantee: broadcasts into
/// the same room are serialized, so every member observes them in broadcast
/// order. Nothing is promised across rooms.
pub struct Room {
    pub order_id: Uuid,
    members: Mutex<Vec<RoomMember>>,
    pub last_active: Mutex<Instant>,
}

impl Room {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            members: Mutex::new(Vec::new()),
            last_active: Mutex::new(Instant::now()),
        }
    }

    /// Subscribes a client. A second join by the same client replaces its
    /// previous subscription, closing the old stream.
    pub async fn join(&self, client_id: Uuid) -> UnboundedReceiverStream<RealtimeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut members = self.members.lock().await;
        members.retain(|member| member.client_id != client_id);
        members.push(RoomMember { client_id, tx });
        *self.last_active.lock().await = Instant::now();
        UnboundedReceiverStream::new(rx)
    }

    pub async fn leave(&self, client_id: Uuid) -> bool {
        let mut members = self.members.lock().await;
        let before = members.len();
        members.retain(|member| member.client_id != client_id);
        before != members.len()
    }

    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Fans the event out to every current member except `exclude`. A member
    /// whose receiver is gone is pruned; the rest still get the event.
    /// Returns the number of deliveries.
    pub async fn broadcast(&self, event: &RealtimeEvent, exclude: &[Uuid]) -> usize {
        let mut members = self.members.lock().await;
        let mut delivered = 0;
        members.retain(|member| {
            if exclude.contains(&member.client_id) {
                return true;
            }
            match member.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        *self.last_active.lock().await = Instant::now();
        delivered
    }
}
