use std::{collections::HashMap, sync::Arc};

use dashmap::{DashMap, Entry};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    board::ordering,
    error::SyncResult,
    models::items::{PositionedItem, Stage},
    repositories::ItemPersistence,
};

/// Authoritative in-memory items of one order. All access goes through the
/// per-order mutex handed out by [`ItemStore`], which is what serializes
/// concurrent mutations into the same containers.
#[derive(Debug, Default)]
pub struct OrderItems {
    items: HashMap<Uuid, PositionedItem>,
}

impl OrderItems {
    pub fn from_items(items: Vec<PositionedItem>) -> Self {
        Self {
            items: items.into_iter().map(|item| (item.id, item)).collect(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&PositionedItem> {
        self.items.get(&id)
    }

    pub fn upsert(&mut self, item: PositionedItem) {
        self.items.insert(item.id, item);
    }

    pub fn remove(&mut self, id: Uuid) -> Option<PositionedItem> {
        self.items.remove(&id)
    }

    pub fn snapshot(&self) -> Vec<PositionedItem> {
        self.items.values().cloned().collect()
    }

    /// Items of one stage in display order.
    pub fn stage_view(&self, stage: Stage) -> Vec<PositionedItem> {
        let snapshot = self.snapshot();
        ordering::visible_list(&snapshot, stage)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn apply_renumber(&mut self, moves: &[(Uuid, i64)]) {
        for (id, position) in moves {
            if let Some(item) = self.items.get_mut(id) {
                item.position = *position;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub type OrderHandle = Arc<Mutex<OrderItems>>;

/// Registry of per-order item mirrors, hydrated lazily from persistence.
pub struct ItemStore {
    orders: DashMap<Uuid, OrderHandle>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
        }
    }

    /// Returns the mirror for an order, loading it from persistence on first
    /// access. A racing loader may win the registry slot; its state is the
    /// one returned then.
    pub async fn get_or_load(
        &self,
        persistence: &dyn ItemPersistence,
        order_id: Uuid,
    ) -> SyncResult<OrderHandle> {
        if let Some(handle) = self.orders.get(&order_id) {
            return Ok(handle.clone());
        }

        let items = persistence.load_items_for_resource(order_id).await?;
        let fresh: OrderHandle = Arc::new(Mutex::new(OrderItems::from_items(items)));

        match self.orders.entry(order_id) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(fresh.clone());
                Ok(fresh)
            }
        }
    }

    pub fn evict(&self, order_id: Uuid) -> bool {
        self.orders.remove(&order_id).is_some()
    }

    pub fn loaded_orders(&self) -> Vec<Uuid> {
        self.orders.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}
