use uuid::Uuid;

use crate::models::items::{PositionedItem, Stage};

/// Gap left between neighbouring positions so mid-list inserts usually find
/// an integer midpoint without renumbering.
pub const POSITION_SPACING: i64 = 1024;

/// Items of one stage in display order: pinned partition first, each
/// partition ascending by position.
pub fn visible_list(items: &[PositionedItem], stage: Stage) -> Vec<&PositionedItem> {
    let mut visible: Vec<&PositionedItem> = items.iter().filter(|i| i.stage == stage).collect();
    visible.sort_by_key(|item| item.sort_key());
    visible
}

/// How the store realises a requested insert.
///
/// `Renumber` carries the complete new layout of the affected partition,
/// subject item included; it must be persisted as one atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionPlan {
    Place(i64),
    Renumber(Vec<(Uuid, i64)>),
}

/// Plans placing `moved_id` at `target_index` of the stage's visible list.
///
/// The index counts the whole visible list but is clamped into the span of
/// the partition matching the item's `pinned` flag; an index past the end
/// appends. The subject itself is ignored while computing neighbours, so the
/// item may already live in the target stage.
pub fn plan_insert(
    items: &[PositionedItem],
    stage: Stage,
    moved_id: Uuid,
    pinned: bool,
    target_index: usize,
) -> PositionPlan {
    let visible: Vec<&PositionedItem> = visible_list(items, stage)
        .into_iter()
        .filter(|item| item.id != moved_id)
        .collect();
    let pinned_len = visible.iter().filter(|item| item.pinned).count();

    let partition: Vec<&PositionedItem> = visible
        .iter()
        .copied()
        .filter(|item| item.pinned == pinned)
        .collect();

    // Translate the visible-list index into a slot of the partition.
    let slot = if pinned {
        target_index.min(pinned_len)
    } else {
        target_index.saturating_sub(pinned_len).min(partition.len())
    };

    if partition.is_empty() {
        return PositionPlan::Place(0);
    }
    if slot == 0 {
        return PositionPlan::Place(partition[0].position - POSITION_SPACING);
    }
    if slot >= partition.len() {
        return PositionPlan::Place(partition[partition.len() - 1].position + POSITION_SPACING);
    }

    let low = partition[slot - 1].position;
    let high = partition[slot].position;
    let midpoint = low + (high - low) / 2;
    if midpoint > low && midpoint < high {
        return PositionPlan::Place(midpoint);
    }

    // No integer gap left between the neighbours: lay the partition out
    // afresh with the subject in its slot.
    let mut layout: Vec<Uuid> = partition.iter().map(|item| item.id).collect();
    layout.insert(slot, moved_id);
    PositionPlan::Renumber(
        layout
            .into_iter()
            .enumerate()
            .map(|(index, id)| (id, index as i64 * POSITION_SPACING))
            .collect(),
    )
}

/// Position for appending to the end of a stage partition. Appends never
/// need renumbering.
pub fn plan_append(items: &[PositionedItem], stage: Stage, pinned: bool) -> i64 {
    items
        .iter()
        .filter(|item| item.stage == stage && item.pinned == pinned)
        .map(|item| item.position)
        .max()
        .map(|max| max + POSITION_SPACING)
        .unwrap_or(0)
}
