pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    dto::items::ItemPatch,
    error::SyncResult,
    models::items::{PositionedItem, Stage},
};

/// One row of an atomic reposition batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPlacement {
    pub item_id: Uuid,
    pub stage: Stage,
    pub position: i64,
}

/// Boundary to the CRUD/storage layer the board engine runs on top of.
///
/// Every mutation is a single logical transaction on the implementor's side;
/// a returned error means nothing was applied. The gateway only commits its
/// in-memory mirror after one of these calls succeeds.
#[async_trait]
pub trait ItemPersistence: Send + Sync {
    async fn persist_create(&self, item: &PositionedItem) -> SyncResult<PositionedItem>;

    async fn persist_update(&self, item_id: Uuid, patch: &ItemPatch) -> SyncResult<PositionedItem>;

    async fn persist_move(
        &self,
        item_id: Uuid,
        stage: Stage,
        position: i64,
    ) -> SyncResult<PositionedItem>;

    /// Atomic batch used when a container runs out of position gaps. Applies
    /// every placement or none, and returns the canonical rows in batch
    /// order.
    async fn persist_renumber(
        &self,
        order_id: Uuid,
        placements: &[ItemPlacement],
    ) -> SyncResult<Vec<PositionedItem>>;

    async fn persist_delete(&self, item_id: Uuid) -> SyncResult<()>;

    /// Full state of one order, used for hydration and client resync after
    /// a connection gap.
    async fn load_items_for_resource(&self, order_id: Uuid) -> SyncResult<Vec<PositionedItem>>;
}
