use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dto::items::ItemPatch,
    error::{SyncError, SyncResult},
    models::items::{PositionedItem, Stage},
    repositories::{ItemPersistence, ItemPlacement},
};

/// Production [`ItemPersistence`] backed by the CRM's Postgres schema.
#[derive(Clone)]
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemPersistence for PgItemStore {
    async fn persist_create(&self, item: &PositionedItem) -> SyncResult<PositionedItem> {
        insert_item(&self.pool, item).await
    }

    async fn persist_update(&self, item_id: Uuid, patch: &ItemPatch) -> SyncResult<PositionedItem> {
        update_item(&self.pool, item_id, patch).await
    }

    async fn persist_move(
        &self,
        item_id: Uuid,
        stage: Stage,
        position: i64,
    ) -> SyncResult<PositionedItem> {
        move_item(&self.pool, item_id, stage, position).await
    }

    async fn persist_renumber(
        &self,
        order_id: Uuid,
        placements: &[ItemPlacement],
    ) -> SyncResult<Vec<PositionedItem>> {
        renumber_items(&self.pool, order_id, placements).await
    }

    async fn persist_delete(&self, item_id: Uuid) -> SyncResult<()> {
        delete_item(&self.pool, item_id).await
    }

    async fn load_items_for_resource(&self, order_id: Uuid) -> SyncResult<Vec<PositionedItem>> {
        list_items_for_order(&self.pool, order_id).await
    }
}

pub async fn insert_item(pool: &PgPool, item: &PositionedItem) -> SyncResult<PositionedItem> {
    let row = crate::log_query_fetch_one!(
        "items.insert_item",
        sqlx::query_as::<_, PositionedItem>(
            r#"
                INSERT INTO board.item (
                    id,
                    order_id,
                    kind,
                    parent_id,
                    stage,
                    position,
                    pinned,
                    title,
                    description,
                    assignee_id,
                    due_at,
                    created_at,
                    updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                RETURNING
                    id, order_id, kind, parent_id, stage, position, pinned,
                    title, description, assignee_id, due_at, created_at, updated_at
            "#,
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.kind)
        .bind(item.parent_id)
        .bind(item.stage)
        .bind(item.position)
        .bind(item.pinned)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.assignee_id)
        .bind(item.due_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .fetch_one(pool)
    )?;

    Ok(row)
}

pub async fn update_item(
    pool: &PgPool,
    item_id: Uuid,
    patch: &ItemPatch,
) -> SyncResult<PositionedItem> {
    if patch.is_empty() {
        return Err(SyncError::Validation("Empty patch".to_string()));
    }
    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(SyncError::Validation("Title must not be blank".to_string()));
        }
    }

    let mut tx = pool.begin().await?;
    let row = crate::log_query_fetch_optional!(
        "items.lock_item",
        sqlx::query_as::<_, PositionedItem>(
            r#"
                SELECT
                    id, order_id, kind, parent_id, stage, position, pinned,
                    title, description, assignee_id, due_at, created_at, updated_at
                FROM board.item
                WHERE id = $1
                FOR UPDATE
            "#,
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
    )?;
    let Some(mut item) = row else {
        return Err(SyncError::NotFound("Item not found".to_string()));
    };

    let changed = patch.apply(&mut item);
    if changed.is_empty() {
        return Ok(item);
    }

    let updated = crate::log_query_fetch_one!(
        "items.update_item",
        sqlx::query_as::<_, PositionedItem>(
            r#"
                UPDATE board.item
                SET title = $2,
                    description = $3,
                    assignee_id = $4,
                    due_at = $5,
                    pinned = $6,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $1
                RETURNING
                    id, order_id, kind, parent_id, stage, position, pinned,
                    title, description, assignee_id, due_at, created_at, updated_at
            "#,
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.assignee_id)
        .bind(item.due_at)
        .bind(item.pinned)
        .fetch_one(&mut *tx)
    )?;
    tx.commit().await?;

    Ok(updated)
}

pub async fn move_item(
    pool: &PgPool,
    item_id: Uuid,
    stage: Stage,
    position: i64,
) -> SyncResult<PositionedItem> {
    let row = crate::log_query_fetch_optional!(
        "items.move_item",
        sqlx::query_as::<_, PositionedItem>(
            r#"
                UPDATE board.item
                SET stage = $2,
                    position = $3,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $1
                RETURNING
                    id, order_id, kind, parent_id, stage, position, pinned,
                    title, description, assignee_id, due_at, created_at, updated_at
            "#,
        )
        .bind(item_id)
        .bind(stage)
        .bind(position)
        .fetch_optional(pool)
    )?;

    row.ok_or_else(|| SyncError::NotFound("Item not found".to_string()))
}

pub async fn renumber_items(
    pool: &PgPool,
    order_id: Uuid,
    placements: &[ItemPlacement],
) -> SyncResult<Vec<PositionedItem>> {
    if placements.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let mut updated = Vec::with_capacity(placements.len());
    for placement in placements {
        let row = crate::log_query_fetch_optional!(
            "items.renumber_item",
            sqlx::query_as::<_, PositionedItem>(
                r#"
                    UPDATE board.item
                    SET stage = $3,
                        position = $4,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = $1
                      AND order_id = $2
                    RETURNING
                        id, order_id, kind, parent_id, stage, position, pinned,
                        title, description, assignee_id, due_at, created_at, updated_at
                "#,
            )
            .bind(placement.item_id)
            .bind(order_id)
            .bind(placement.stage)
            .bind(placement.position)
            .fetch_optional(&mut *tx)
        )?;
        match row {
            Some(item) => updated.push(item),
            // Dropping the transaction rolls the batch back.
            None => return Err(SyncError::NotFound("Item not found".to_string())),
        }
    }
    tx.commit().await?;

    Ok(updated)
}

pub async fn delete_item(pool: &PgPool, item_id: Uuid) -> SyncResult<()> {
    let result = crate::log_query_execute!(
        "items.delete_item",
        sqlx::query("DELETE FROM board.item WHERE id = $1")
            .bind(item_id)
            .execute(pool)
    )?;

    if result.rows_affected() == 0 {
        return Err(SyncError::NotFound("Item not found".to_string()));
    }
    Ok(())
}

pub async fn list_items_for_order(
    pool: &PgPool,
    order_id: Uuid,
) -> SyncResult<Vec<PositionedItem>> {
    let rows = crate::log_query_fetch_all!(
        "items.list_items_for_order",
        sqlx::query_as::<_, PositionedItem>(
            r#"
                SELECT
                    id, order_id, kind, parent_id, stage, position, pinned,
                    title, description, assignee_id, due_at, created_at, updated_at
                FROM board.item
                WHERE order_id = $1
                ORDER BY stage, pinned DESC, position
            "#,
        )
        .bind(order_id)
        .fetch_all(pool)
    )?;

    Ok(rows)
}
