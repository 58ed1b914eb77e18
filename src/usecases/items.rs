use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    board::{
        ordering::{self, PositionPlan},
        store::ItemStore,
    },
    dto::items::{ItemDraft, ItemPatch},
    error::{SyncError, SyncResult},
    models::items::{PositionedItem, Stage},
    realtime::protocol::{EventBody, RealtimeEvent},
    repositories::{ItemPersistence, ItemPlacement},
    telemetry::SyncEvent,
};

/// Canonical result of a mutation: the confirmed item plus the events the
/// caller must broadcast. The gateway itself never broadcasts, which keeps
/// persistence correctness independent of delivery.
pub struct MutationOutcome {
    pub item: PositionedItem,
    pub events: Vec<RealtimeEvent>,
}

pub struct DeleteOutcome {
    pub events: Vec<RealtimeEvent>,
}

/// Server-side entry point for item mutations. All writes to the
/// authoritative store flow through here; per-order serialization comes from
/// the store's order mutex, held across the persistence call.
pub struct MutationGateway {
    persistence: Arc<dyn ItemPersistence>,
    store: Arc<ItemStore>,
}

impl MutationGateway {
    pub fn new(persistence: Arc<dyn ItemPersistence>, store: Arc<ItemStore>) -> Self {
        Self { persistence, store }
    }

    pub async fn apply_create(&self, draft: ItemDraft) -> SyncResult<MutationOutcome> {
        validate_title(&draft.title)?;

        let handle = self
            .store
            .get_or_load(self.persistence.as_ref(), draft.order_id)
            .await?;
        let mut state = handle.lock().await;

        let snapshot = state.snapshot();
        let position = ordering::plan_append(&snapshot, draft.stage, draft.pinned);
        let now = Utc::now();
        let item = PositionedItem {
            id: Uuid::now_v7(),
            order_id: draft.order_id,
            kind: draft.kind,
            parent_id: draft.parent_id,
            stage: draft.stage,
            position,
            pinned: draft.pinned,
            title: draft.title,
            description: draft.description,
            assignee_id: draft.assignee_id,
            due_at: draft.due_at,
            created_at: now,
            updated_at: now,
        };

        let item = self.persistence.persist_create(&item).await?;
        state.upsert(item.clone());
        SyncEvent::ItemCreated {
            order_id: item.order_id,
            item_id: item.id,
            stage: item.stage,
        }
        .log();

        Ok(MutationOutcome {
            item: item.clone(),
            events: vec![RealtimeEvent::created(item)],
        })
    }

    pub async fn apply_update(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        actor_id: Uuid,
        patch: ItemPatch,
    ) -> SyncResult<MutationOutcome> {
        if patch.is_empty() {
            return Err(SyncError::Validation("Empty patch".to_string()));
        }
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }

        let handle = self
            .store
            .get_or_load(self.persistence.as_ref(), order_id)
            .await?;
        let mut state = handle.lock().await;

        let current = state
            .get(item_id)
            .ok_or_else(|| SyncError::NotFound("Item not found".to_string()))?;
        let mut preview = current.clone();
        let changed = patch.apply(&mut preview);
        if changed.is_empty() {
            return Ok(MutationOutcome {
                item: preview,
                events: Vec::new(),
            });
        }

        let item = self.persistence.persist_update(item_id, &patch).await?;
        state.upsert(item.clone());

        let fields: Vec<String> = changed.iter().map(|field| field.to_string()).collect();
        SyncEvent::ItemUpdated {
            order_id,
            item_id,
            fields: fields.clone(),
        }
        .log();

        Ok(MutationOutcome {
            item: item.clone(),
            events: vec![
                RealtimeEvent::updated(item),
                RealtimeEvent::new(
                    order_id,
                    EventBody::FieldChanged {
                        item_id,
                        fields,
                        actor_id,
                    },
                ),
            ],
        })
    }

    pub async fn apply_move(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        stage: Stage,
        index: usize,
    ) -> SyncResult<MutationOutcome> {
        let handle = self
            .store
            .get_or_load(self.persistence.as_ref(), order_id)
            .await?;
        let mut state = handle.lock().await;

        let current = state
            .get(item_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound("Item not found".to_string()))?;
        let snapshot = state.snapshot();

        match ordering::plan_insert(&snapshot, stage, item_id, current.pinned, index) {
            PositionPlan::Place(position) => {
                let item = self.persistence.persist_move(item_id, stage, position).await?;
                state.upsert(item.clone());
                SyncEvent::ItemMoved {
                    order_id,
                    item_id,
                    stage,
                    position,
                }
                .log();
                Ok(MutationOutcome {
                    item: item.clone(),
                    events: vec![RealtimeEvent::moved(item)],
                })
            }
            PositionPlan::Renumber(moves) => {
                let placements: Vec<ItemPlacement> = moves
                    .iter()
                    .map(|(id, position)| ItemPlacement {
                        item_id: *id,
                        stage,
                        position: *position,
                    })
                    .collect();
                let updated = self.persistence.persist_renumber(order_id, &placements).await?;

                let old_positions: HashMap<Uuid, i64> = snapshot
                    .iter()
                    .map(|item| (item.id, item.position))
                    .collect();
                let mut subject = None;
                let mut events = Vec::new();
                for item in updated {
                    state.upsert(item.clone());
                    if item.id == item_id {
                        subject = Some(item);
                    } else if old_positions.get(&item.id) != Some(&item.position) {
                        events.push(RealtimeEvent::updated(item));
                    }
                }
                let item = subject
                    .ok_or_else(|| SyncError::Internal("Renumber batch lost subject".to_string()))?;
                events.insert(0, RealtimeEvent::moved(item.clone()));

                SyncEvent::ContainerRenumbered {
                    order_id,
                    stage,
                    items: placements.len(),
                }
                .log();
                SyncEvent::ItemMoved {
                    order_id,
                    item_id,
                    stage,
                    position: item.position,
                }
                .log();
                Ok(MutationOutcome { item, events })
            }
        }
    }

    pub async fn apply_delete(&self, order_id: Uuid, item_id: Uuid) -> SyncResult<DeleteOutcome> {
        let handle = self
            .store
            .get_or_load(self.persistence.as_ref(), order_id)
            .await?;
        let mut state = handle.lock().await;

        if state.get(item_id).is_none() {
            return Err(SyncError::NotFound("Item not found".to_string()));
        }

        self.persistence.persist_delete(item_id).await?;
        state.remove(item_id);
        SyncEvent::ItemDeleted { order_id, item_id }.log();

        Ok(DeleteOutcome {
            events: vec![RealtimeEvent::deleted(order_id, item_id)],
        })
    }
}

fn validate_title(title: &str) -> SyncResult<()> {
    if title.trim().is_empty() {
        return Err(SyncError::Validation("Title must not be blank".to_string()));
    }
    Ok(())
}
