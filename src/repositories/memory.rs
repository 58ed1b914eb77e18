use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    dto::items::ItemPatch,
    error::{SyncError, SyncResult},
    models::items::{PositionedItem, Stage},
    repositories::{ItemPersistence, ItemPlacement},
};

/// In-process [`ItemPersistence`] used by the test suite and by embedders
/// that do not need a database. `inject_failure` makes the next call fail,
/// which is how rollback paths are exercised.
#[derive(Default)]
pub struct MemoryItemStore {
    items: Mutex<HashMap<Uuid, PositionedItem>>,
    fail_next: Mutex<Option<SyncError>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, items: Vec<PositionedItem>) {
        let mut guard = self.items.lock().await;
        for item in items {
            guard.insert(item.id, item);
        }
    }

    pub async fn inject_failure(&self, error: SyncError) {
        *self.fail_next.lock().await = Some(error);
    }

    pub async fn contains(&self, item_id: Uuid) -> bool {
        self.items.lock().await.contains_key(&item_id)
    }

    async fn take_failure(&self) -> SyncResult<()> {
        match self.fail_next.lock().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ItemPersistence for MemoryItemStore {
    async fn persist_create(&self, item: &PositionedItem) -> SyncResult<PositionedItem> {
        self.take_failure().await?;
        let mut guard = self.items.lock().await;
        guard.insert(item.id, item.clone());
        Ok(item.clone())
    }

    async fn persist_update(&self, item_id: Uuid, patch: &ItemPatch) -> SyncResult<PositionedItem> {
        self.take_failure().await?;
        if patch.is_empty() {
            return Err(SyncError::Validation("Empty patch".to_string()));
        }
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(SyncError::Validation("Title must not be blank".to_string()));
            }
        }
        let mut guard = self.items.lock().await;
        let item = guard
            .get_mut(&item_id)
            .ok_or_else(|| SyncError::NotFound("Item not found".to_string()))?;
        let changed = patch.apply(item);
        if !changed.is_empty() {
            item.updated_at = Utc::now();
        }
        Ok(item.clone())
    }

    async fn persist_move(
        &self,
        item_id: Uuid,
        stage: Stage,
        position: i64,
    ) -> SyncResult<PositionedItem> {
        self.take_failure().await?;
        let mut guard = self.items.lock().await;
        let item = guard
            .get_mut(&item_id)
            .ok_or_else(|| SyncError::NotFound("Item not found".to_string()))?;
        item.stage = stage;
        item.position = position;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn persist_renumber(
        &self,
        order_id: Uuid,
        placements: &[ItemPlacement],
    ) -> SyncResult<Vec<PositionedItem>> {
        self.take_failure().await?;
        let mut guard = self.items.lock().await;
        // Validate the whole batch before touching anything.
        for placement in placements {
            match guard.get(&placement.item_id) {
                Some(item) if item.order_id == order_id => {}
                _ => return Err(SyncError::NotFound("Item not found".to_string())),
            }
        }
        let now = Utc::now();
        let mut updated = Vec::with_capacity(placements.len());
        for placement in placements {
            if let Some(item) = guard.get_mut(&placement.item_id) {
                item.stage = placement.stage;
                item.position = placement.position;
                item.updated_at = now;
                updated.push(item.clone());
            }
        }
        Ok(updated)
    }

    async fn persist_delete(&self, item_id: Uuid) -> SyncResult<()> {
        self.take_failure().await?;
        let mut guard = self.items.lock().await;
        guard
            .remove(&item_id)
            .map(|_| ())
            .ok_or_else(|| SyncError::NotFound("Item not found".to_string()))
    }

    async fn load_items_for_resource(&self, order_id: Uuid) -> SyncResult<Vec<PositionedItem>> {
        self.take_failure().await?;
        let guard = self.items.lock().await;
        let mut items: Vec<PositionedItem> = guard
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.stage, item.sort_key()));
        Ok(items)
    }
}
