use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    board::ordering,
    models::items::{PositionedItem, Stage},
    realtime::protocol::{EventBody, RealtimeEvent},
};

/// Local copy of one item. `Pending` keeps the last confirmed snapshot next
/// to the optimistic guess so a failure can restore it exactly; stacked
/// optimistic edits keep the original base.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorState {
    Confirmed(PositionedItem),
    Pending {
        base: PositionedItem,
        guess: PositionedItem,
    },
}

impl MirrorState {
    /// What the UI should render right now.
    pub fn current(&self) -> &PositionedItem {
        match self {
            MirrorState::Confirmed(item) => item,
            MirrorState::Pending { guess, .. } => guess,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MirrorState::Pending { .. })
    }
}

/// One client's mirror of an order's items, reconciled against server
/// events and mutation results. The server is the single source of truth:
/// its events overwrite unconditionally.
#[derive(Debug, Default)]
pub struct ResourceMirror {
    items: HashMap<Uuid, MirrorState>,
}

impl ResourceMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full-state resync after a connection gap. Everything becomes
    /// confirmed; optimistic remnants are discarded.
    pub fn replace_all(&mut self, items: Vec<PositionedItem>) {
        self.items = items
            .into_iter()
            .map(|item| (item.id, MirrorState::Confirmed(item)))
            .collect();
    }

    pub fn get(&self, id: Uuid) -> Option<&MirrorState> {
        self.items.get(&id)
    }

    pub fn current_items(&self) -> Vec<PositionedItem> {
        self.items
            .values()
            .map(|state| state.current().clone())
            .collect()
    }

    /// UI-facing view of one column, re-sorted after every reconciliation.
    pub fn stage_view(&self, stage: Stage) -> Vec<PositionedItem> {
        let snapshot = self.current_items();
        ordering::visible_list(&snapshot, stage)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Applies an optimistic local mutation ahead of the server round-trip.
    pub fn begin_optimistic(&mut self, guess: PositionedItem) {
        let id = guess.id;
        let state = match self.items.remove(&id) {
            Some(MirrorState::Confirmed(base)) => MirrorState::Pending { base, guess },
            // A second edit before the first response stacks on top but
            // keeps the original confirmed snapshot for rollback.
            Some(MirrorState::Pending { base, .. }) => MirrorState::Pending { base, guess },
            None => MirrorState::Pending {
                base: guess.clone(),
                guess,
            },
        };
        self.items.insert(id, state);
    }

    /// Adopts the server-confirmed entity, which may differ from the local
    /// guess. Always wins over whatever is there.
    pub fn confirm(&mut self, item: PositionedItem) {
        self.items.insert(item.id, MirrorState::Confirmed(item));
    }

    /// Restores the pre-optimistic snapshot. Returns the restored item, or
    /// None when the item is not pending (a server event settled it first).
    pub fn rollback(&mut self, id: Uuid) -> Option<PositionedItem> {
        match self.items.remove(&id) {
            Some(MirrorState::Pending { base, .. }) => {
                self.items.insert(id, MirrorState::Confirmed(base.clone()));
                Some(base)
            }
            Some(confirmed) => {
                self.items.insert(id, confirmed);
                None
            }
            None => None,
        }
    }

    /// Applies a pushed event. Returns false when the event was a duplicate
    /// and changed nothing, which makes at-least-once delivery safe.
    pub fn apply_event(&mut self, event: &RealtimeEvent) -> bool {
        match &event.body {
            EventBody::Created { item } | EventBody::Updated { item } | EventBody::Moved { item } => {
                let confirmed = MirrorState::Confirmed(item.clone());
                if self.items.get(&item.id) == Some(&confirmed) {
                    return false;
                }
                self.items.insert(item.id, confirmed);
                true
            }
            EventBody::Deleted { item_id } => self.items.remove(item_id).is_some(),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::items::tests::test_item;

    #[test]
    fn optimistic_then_confirm_prefers_server_truth() {
        let mut mirror = ResourceMirror::new();
        let item = test_item(Stage::Planning, 0, false);
        mirror.replace_all(vec![item.clone()]);

        let mut guess = item.clone();
        guess.position = 512;
        mirror.begin_optimistic(guess);
        assert!(mirror.get(item.id).unwrap().is_pending());

        // Server settled on a different position than the guess.
        let mut confirmed = item.clone();
        confirmed.position = 1024;
        mirror.confirm(confirmed.clone());
        assert_eq!(
            mirror.get(item.id),
            Some(&MirrorState::Confirmed(confirmed))
        );
    }

    #[test]
    fn rollback_restores_exact_snapshot() {
        let mut mirror = ResourceMirror::new();
        let item = test_item(Stage::Planning, 0, false);
        mirror.replace_all(vec![item.clone()]);

        let mut guess = item.clone();
        guess.stage = Stage::Development;
        guess.position = 0;
        mirror.begin_optimistic(guess);

        let restored = mirror.rollback(item.id).unwrap();
        assert_eq!(restored, item);
        assert_eq!(mirror.get(item.id), Some(&MirrorState::Confirmed(item)));
    }

    #[test]
    fn stacked_edits_roll_back_to_original_base() {
        let mut mirror = ResourceMirror::new();
        let item = test_item(Stage::Planning, 0, false);
        mirror.replace_all(vec![item.clone()]);

        let mut first = item.clone();
        first.position = 512;
        mirror.begin_optimistic(first);
        let mut second = item.clone();
        second.position = 768;
        mirror.begin_optimistic(second.clone());

        assert_eq!(mirror.get(item.id).unwrap().current(), &second);
        assert_eq!(mirror.rollback(item.id), Some(item));
    }

    #[test]
    fn server_event_overrides_pending_state() {
        let mut mirror = ResourceMirror::new();
        let item = test_item(Stage::Planning, 0, false);
        mirror.replace_all(vec![item.clone()]);

        let mut guess = item.clone();
        guess.position = 512;
        mirror.begin_optimistic(guess);

        let mut remote = item.clone();
        remote.position = 4096;
        assert!(mirror.apply_event(&RealtimeEvent::moved(remote.clone())));
        assert_eq!(mirror.get(item.id), Some(&MirrorState::Confirmed(remote)));
        // The optimistic assumption is gone; rollback has nothing to do.
        assert_eq!(mirror.rollback(item.id), None);
    }

    #[test]
    fn duplicate_event_is_a_no_op() {
        let mut mirror = ResourceMirror::new();
        let item = test_item(Stage::Planning, 0, false);
        let event = RealtimeEvent::updated(item.clone());

        assert!(mirror.apply_event(&event));
        let snapshot = mirror.current_items();
        assert!(!mirror.apply_event(&event));
        assert_eq!(mirror.current_items(), snapshot);
    }

    #[test]
    fn delete_event_drops_item_once() {
        let mut mirror = ResourceMirror::new();
        let item = test_item(Stage::Planning, 0, false);
        mirror.replace_all(vec![item.clone()]);

        let event = RealtimeEvent::deleted(item.order_id, item.id);
        assert!(mirror.apply_event(&event));
        assert!(!mirror.apply_event(&event));
        assert!(mirror.is_empty());
    }

    #[test]
    fn stage_view_resorts_after_events() {
        let mut mirror = ResourceMirror::new();
        let order_id = Uuid::now_v7();
        let mut a = test_item(Stage::Planning, 0, false);
        a.order_id = order_id;
        let mut b = test_item(Stage::Planning, 1024, false);
        b.order_id = order_id;
        mirror.replace_all(vec![a.clone(), b.clone()]);

        let mut moved = b.clone();
        moved.position = -1024;
        mirror.apply_event(&RealtimeEvent::moved(moved));

        let view = mirror.stage_view(Stage::Planning);
        assert_eq!(view[0].id, b.id);
        assert_eq!(view[1].id, a.id);
    }
}
