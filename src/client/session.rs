use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use uuid::Uuid;

use crate::{
    client::mirror::ResourceMirror,
    config::SyncConfig,
    error::{SyncError, SyncResult},
    models::items::{PositionedItem, Stage},
    realtime::protocol::RealtimeEvent,
};

/// Bookkeeping for one in-flight mutation.
#[derive(Debug)]
struct PendingRequest {
    item_id: Uuid,
    issued_at: Instant,
}

/// How a mutation result (or timeout) was resolved locally.
#[derive(Debug)]
pub enum MutationResolution {
    /// Server truth adopted; may differ from the optimistic guess.
    Confirmed(PositionedItem),
    /// The optimistic change was undone; `restored` is what the UI should
    /// show again. None means a server event had already settled the item.
    /// `surface` is false when failures for this item are arriving so fast
    /// that this one should not produce another toast.
    RolledBack {
        item_id: Uuid,
        restored: Option<PositionedItem>,
        error: SyncError,
        surface: bool,
    },
    /// Late failure for a request that no longer matters.
    Ignored,
}

/// A connected client's reconciliation loop state for one order: local
/// mirror, in-flight requests, and the timeout that turns silence into a
/// rollback.
pub struct ClientSession {
    pub client_id: Uuid,
    pub order_id: Uuid,
    mirror: ResourceMirror,
    pending: HashMap<Uuid, PendingRequest>,
    mutation_timeout: Duration,
    failure_limiter: DefaultKeyedRateLimiter<Uuid>,
}

impl ClientSession {
    pub fn new(client_id: Uuid, order_id: Uuid, config: &SyncConfig) -> Self {
        let quota = Quota::with_period(config.advisory_window).expect("non-zero surfacing window");
        Self {
            client_id,
            order_id,
            mirror: ResourceMirror::new(),
            pending: HashMap::new(),
            mutation_timeout: config.mutation_timeout,
            failure_limiter: RateLimiter::keyed(quota),
        }
    }

    /// Applies the guess locally and registers the request. Returns the
    /// request id to correlate the eventual result.
    pub fn begin_mutation(&mut self, guess: PositionedItem, now: Instant) -> Uuid {
        let request_id = Uuid::new_v4();
        self.pending.insert(
            request_id,
            PendingRequest {
                item_id: guess.id,
                issued_at: now,
            },
        );
        self.mirror.begin_optimistic(guess);
        request_id
    }

    pub fn on_mutation_result(
        &mut self,
        request_id: Uuid,
        result: SyncResult<PositionedItem>,
    ) -> MutationResolution {
        let pending = self.pending.remove(&request_id);
        match result {
            // Success always lands, even after a timeout rollback already
            // gave up on the request: server truth is adopted as a fresh
            // confirmed state.
            Ok(item) => {
                self.mirror.confirm(item.clone());
                MutationResolution::Confirmed(item)
            }
            Err(error) => match pending {
                Some(request) => {
                    let restored = self.mirror.rollback(request.item_id);
                    let surface = self.failure_limiter.check_key(&request.item_id).is_ok();
                    MutationResolution::RolledBack {
                        item_id: request.item_id,
                        restored,
                        error,
                        surface,
                    }
                }
                None => MutationResolution::Ignored,
            },
        }
    }

    /// Treats requests older than the timeout as failed. The eventual late
    /// response is then handled by `on_mutation_result` as usual.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<MutationResolution> {
        let expired: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|(_, request)| {
                now.saturating_duration_since(request.issued_at) >= self.mutation_timeout
            })
            .map(|(request_id, _)| *request_id)
            .collect();

        expired
            .into_iter()
            .map(|request_id| {
                self.on_mutation_result(
                    request_id,
                    Err(SyncError::TransientNetwork("mutation timed out".to_string())),
                )
            })
            .collect()
    }

    /// Feeds a pushed event into the mirror. A server event settling an
    /// item also abandons any in-flight optimistic request for it, so a
    /// stale failure response cannot undo newer server truth.
    pub fn on_realtime_event(&mut self, event: &RealtimeEvent) -> bool {
        let changed = self.mirror.apply_event(event);
        if changed {
            if let Some(item) = item_of(event) {
                self.pending.retain(|_, request| request.item_id != item);
            }
        }
        changed
    }

    /// Full-state resync after a gap: pending requests are stale by
    /// definition and dropped along with optimistic remnants.
    pub fn resync(&mut self, items: Vec<PositionedItem>) {
        self.pending.clear();
        self.mirror.replace_all(items);
    }

    pub fn stage_view(&self, stage: Stage) -> Vec<PositionedItem> {
        self.mirror.stage_view(stage)
    }

    pub fn mirror(&self) -> &ResourceMirror {
        &self.mirror
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn item_of(event: &RealtimeEvent) -> Option<Uuid> {
    use crate::realtime::protocol::EventBody;
    match &event.body {
        EventBody::Created { item } | EventBody::Updated { item } | EventBody::Moved { item } => {
            Some(item.id)
        }
        EventBody::Deleted { item_id } => Some(*item_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::items::tests::test_item;

    fn session_with(item: &PositionedItem) -> ClientSession {
        let mut session = ClientSession::new(Uuid::new_v4(), item.order_id, &SyncConfig::default());
        session.resync(vec![item.clone()]);
        session
    }

    fn moved_guess(item: &PositionedItem) -> PositionedItem {
        let mut guess = item.clone();
        guess.stage = Stage::Development;
        guess.position = 0;
        guess
    }

    #[test]
    fn failure_rolls_back_to_exact_snapshot() {
        let item = test_item(Stage::Planning, 0, false);
        let mut session = session_with(&item);
        let request_id = session.begin_mutation(moved_guess(&item), Instant::now());

        let resolution = session.on_mutation_result(
            request_id,
            Err(SyncError::NotFound("Item not found".to_string())),
        );
        let MutationResolution::RolledBack { restored, .. } = resolution else {
            panic!("expected rollback");
        };
        assert_eq!(restored, Some(item.clone()));
        assert_eq!(session.stage_view(Stage::Planning), vec![item]);
    }

    #[test]
    fn success_adopts_server_position_over_guess() {
        let item = test_item(Stage::Planning, 0, false);
        let mut session = session_with(&item);
        let request_id = session.begin_mutation(moved_guess(&item), Instant::now());

        let mut canonical = moved_guess(&item);
        canonical.position = 2048;
        let resolution = session.on_mutation_result(request_id, Ok(canonical.clone()));
        let MutationResolution::Confirmed(confirmed) = resolution else {
            panic!("expected confirmation");
        };
        assert_eq!(confirmed, canonical);
        assert_eq!(session.stage_view(Stage::Development), vec![canonical]);
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn timeout_rolls_back_then_late_success_reapplies() {
        let item = test_item(Stage::Planning, 0, false);
        let mut session = session_with(&item);
        let start = Instant::now();
        let request_id = session.begin_mutation(moved_guess(&item), start);

        let resolutions = session.check_timeouts(start + Duration::from_secs(10));
        assert_eq!(resolutions.len(), 1);
        assert!(matches!(
            resolutions[0],
            MutationResolution::RolledBack { .. }
        ));
        assert_eq!(session.stage_view(Stage::Planning), vec![item.clone()]);

        // The server processed it after all; the late success still lands.
        let canonical = moved_guess(&item);
        let resolution = session.on_mutation_result(request_id, Ok(canonical.clone()));
        assert!(matches!(resolution, MutationResolution::Confirmed(_)));
        assert_eq!(session.stage_view(Stage::Development), vec![canonical]);
    }

    #[test]
    fn event_settling_item_makes_stale_failure_ignored() {
        let item = test_item(Stage::Planning, 0, false);
        let mut session = session_with(&item);
        let request_id = session.begin_mutation(moved_guess(&item), Instant::now());

        // Another actor's confirmed move arrives before our response.
        let mut remote = item.clone();
        remote.position = 4096;
        assert!(session.on_realtime_event(&RealtimeEvent::moved(remote.clone())));

        let resolution = session.on_mutation_result(
            request_id,
            Err(SyncError::TransientNetwork("lost".to_string())),
        );
        assert!(matches!(resolution, MutationResolution::Ignored));
        assert_eq!(session.stage_view(Stage::Planning), vec![remote]);
    }

    #[test]
    fn rapid_repeat_failures_surface_only_once() {
        let item = test_item(Stage::Planning, 0, false);
        let mut session = session_with(&item);
        let now = Instant::now();

        let first = session.begin_mutation(moved_guess(&item), now);
        let first_resolution = session.on_mutation_result(
            first,
            Err(SyncError::TransientNetwork("lost".to_string())),
        );
        let MutationResolution::RolledBack { surface, .. } = first_resolution else {
            panic!("expected rollback");
        };
        assert!(surface);

        let second = session.begin_mutation(moved_guess(&item), now);
        let second_resolution = session.on_mutation_result(
            second,
            Err(SyncError::TransientNetwork("lost again".to_string())),
        );
        let MutationResolution::RolledBack { surface, .. } = second_resolution else {
            panic!("expected rollback");
        };
        assert!(!surface, "repeat failure within the window must not toast");
    }

    #[test]
    fn resync_discards_pending_state() {
        let item = test_item(Stage::Planning, 0, false);
        let mut session = session_with(&item);
        session.begin_mutation(moved_guess(&item), Instant::now());
        assert_eq!(session.pending_count(), 1);

        let fresh = test_item(Stage::Review, 0, false);
        session.resync(vec![fresh.clone()]);
        assert_eq!(session.pending_count(), 0);
        assert_eq!(session.stage_view(Stage::Review), vec![fresh]);
    }

    #[test]
    fn second_move_before_first_response_keeps_last_server_state() {
        let item = test_item(Stage::Planning, 0, false);
        let mut session = session_with(&item);
        let now = Instant::now();

        let first_guess = moved_guess(&item);
        let first = session.begin_mutation(first_guess.clone(), now);
        let mut second_guess = item.clone();
        second_guess.stage = Stage::Review;
        second_guess.position = 0;
        let second = session.begin_mutation(second_guess.clone(), now);

        // Gateway serialized them; responses arrive in order. The last
        // received confirmation is what sticks.
        let mut first_confirmed = first_guess;
        first_confirmed.position = 1024;
        session.on_mutation_result(first, Ok(first_confirmed));
        let mut second_confirmed = second_guess;
        second_confirmed.position = 512;
        session.on_mutation_result(second, Ok(second_confirmed.clone()));

        assert_eq!(session.stage_view(Stage::Review), vec![second_confirmed]);
    }
}
