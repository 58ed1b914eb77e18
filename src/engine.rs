use std::sync::Arc;

use chrono::Utc;
use tokio::{sync::Mutex, task::JoinHandle};
use uuid::Uuid;

use crate::{
    board::store::ItemStore,
    client::{conflict::ConflictAdvisor, session::ClientSession},
    config::SyncConfig,
    dto::{
        comments::NewComment,
        items::{ItemDraft, ItemPatch},
    },
    error::SyncResult,
    models::{
        comments::Comment,
        items::{PositionedItem, Stage},
        notifications::{Notification, NotificationPreferences},
        presence::{CursorPosition, PresenceRecord},
    },
    realtime::{
        channel::{ChannelHub, EventStream},
        protocol::RealtimeEvent,
    },
    repositories::ItemPersistence,
    telemetry::SyncEvent,
    usecases::{
        comments::CommentService,
        items::MutationGateway,
        notifications::{DispatchOutcome, NotificationDispatcher, NotificationSink},
        presence::PresenceService,
    },
};

/// The board synchronization engine: the one place that both mutates
/// authoritative state and broadcasts the resulting events.
///
/// Explicitly constructed with its collaborators and torn down with
/// [`SyncEngine::shutdown`]; nothing here is process-global.
pub struct SyncEngine {
    config: SyncConfig,
    persistence: Arc<dyn ItemPersistence>,
    gateway: MutationGateway,
    hub: Arc<ChannelHub>,
    presence: Arc<PresenceService>,
    comments: CommentService,
    notifier: NotificationDispatcher,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        persistence: Arc<dyn ItemPersistence>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = Arc::new(ItemStore::new());
        Self {
            gateway: MutationGateway::new(persistence.clone(), store),
            hub: Arc::new(ChannelHub::new()),
            presence: Arc::new(PresenceService::new()),
            comments: CommentService::new(),
            notifier: NotificationDispatcher::new(sink),
            persistence,
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Builds the reconciliation state a connected client keeps for one
    /// order, wired to this engine's mutation timeout.
    pub fn client_session(&self, client_id: Uuid, order_id: Uuid) -> ClientSession {
        ClientSession::new(client_id, order_id, &self.config)
    }

    pub fn conflict_advisor(&self, user_id: Uuid) -> ConflictAdvisor {
        ConflictAdvisor::new(
            user_id,
            self.config.advisory_window,
            self.config.advisory_dismiss,
        )
    }

    // --- item mutations -------------------------------------------------

    pub async fn create_item(
        &self,
        origin: Option<Uuid>,
        draft: ItemDraft,
    ) -> SyncResult<PositionedItem> {
        let outcome = self.gateway.apply_create(draft).await?;
        self.broadcast_all(&outcome.events, origin).await;
        Ok(outcome.item)
    }

    pub async fn update_item(
        &self,
        origin: Option<Uuid>,
        order_id: Uuid,
        item_id: Uuid,
        actor_id: Uuid,
        patch: ItemPatch,
    ) -> SyncResult<PositionedItem> {
        let outcome = self
            .gateway
            .apply_update(order_id, item_id, actor_id, patch)
            .await?;
        self.broadcast_all(&outcome.events, origin).await;
        Ok(outcome.item)
    }

    pub async fn move_item(
        &self,
        origin: Option<Uuid>,
        order_id: Uuid,
        item_id: Uuid,
        stage: Stage,
        index: usize,
    ) -> SyncResult<PositionedItem> {
        let outcome = self
            .gateway
            .apply_move(order_id, item_id, stage, index)
            .await?;
        self.broadcast_all(&outcome.events, origin).await;
        Ok(outcome.item)
    }

    pub async fn delete_item(
        &self,
        origin: Option<Uuid>,
        order_id: Uuid,
        item_id: Uuid,
    ) -> SyncResult<()> {
        let outcome = self.gateway.apply_delete(order_id, item_id).await?;
        self.broadcast_all(&outcome.events, origin).await;
        Ok(())
    }

    /// Full state for a client re-joining after a gap; the channel keeps no
    /// history, so this is the recovery path.
    pub async fn resync(&self, order_id: Uuid) -> SyncResult<Vec<PositionedItem>> {
        let items = self.persistence.load_items_for_resource(order_id).await?;
        SyncEvent::ResyncServed {
            order_id,
            items: items.len(),
        }
        .log();
        Ok(items)
    }

    // --- comments -------------------------------------------------------

    pub async fn add_comment(&self, origin: Option<Uuid>, new: NewComment) -> SyncResult<Comment> {
        let outcome = self.comments.add_comment(new, Utc::now())?;
        self.broadcast_all(&outcome.events, origin).await;
        if let Some(notification) = &outcome.mention_notification {
            self.notifier
                .dispatch(notification, &outcome.mention_recipients, Utc::now())
                .await;
        }
        Ok(outcome.comment)
    }

    pub async fn delete_comment(
        &self,
        origin: Option<Uuid>,
        order_id: Uuid,
        comment_id: Uuid,
    ) -> SyncResult<()> {
        let events = self.comments.delete_comment(order_id, comment_id)?;
        self.broadcast_all(&events, origin).await;
        Ok(())
    }

    pub async fn toggle_reaction(
        &self,
        origin: Option<Uuid>,
        order_id: Uuid,
        comment_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> SyncResult<bool> {
        let (active, events) = self
            .comments
            .toggle_reaction(order_id, comment_id, user_id, emoji)?;
        self.broadcast_all(&events, origin).await;
        Ok(active)
    }

    pub fn comments(&self, order_id: Uuid) -> Vec<Comment> {
        self.comments.comments(order_id)
    }

    // --- presence and connections --------------------------------------

    /// Subscribes a client to an order's room and announces the user.
    /// Returns the event stream plus the current presence list.
    pub async fn connect(
        &self,
        client_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    ) -> (EventStream, Vec<PresenceRecord>) {
        let stream = self.hub.join(client_id, order_id).await;
        let events = self.presence.join(user_id, order_id, Utc::now());
        self.broadcast_excluding(&events, &[client_id]).await;
        (stream, self.presence.snapshot(order_id))
    }

    pub async fn leave(&self, client_id: Uuid, user_id: Uuid, order_id: Uuid) {
        self.hub.leave(client_id, order_id).await;
        let events = self.presence.leave(user_id, order_id);
        self.broadcast_all(&events, None).await;
    }

    /// Connection loss: drop every subscription and announce the departures.
    pub async fn disconnect(&self, client_id: Uuid, user_id: Uuid) {
        self.hub.leave_all(client_id).await;
        let events = self.presence.disconnect_user(user_id);
        self.broadcast_all(&events, None).await;
    }

    pub async fn focus_field(&self, user_id: Uuid, order_id: Uuid, field: Option<String>) {
        let events = self.presence.focus_field(user_id, order_id, field, Utc::now());
        self.broadcast_all(&events, None).await;
    }

    /// Callers are expected to throttle with
    /// [`crate::client::cursor::CursorThrottle`] before invoking this.
    pub async fn move_cursor(&self, user_id: Uuid, order_id: Uuid, cursor: CursorPosition) {
        let events = self.presence.cursor_moved(user_id, order_id, cursor, Utc::now());
        self.broadcast_all(&events, None).await;
    }

    pub fn heartbeat(&self, user_id: Uuid, order_id: Uuid) {
        self.presence.heartbeat(user_id, order_id, Utc::now());
    }

    pub fn presence_snapshot(&self, order_id: Uuid) -> Vec<PresenceRecord> {
        self.presence.snapshot(order_id)
    }

    // --- notifications --------------------------------------------------

    pub fn set_notification_preferences(&self, user_id: Uuid, preferences: NotificationPreferences) {
        self.notifier.set_preferences(user_id, preferences);
    }

    pub async fn notify(
        &self,
        notification: &Notification,
        recipients: &[Uuid],
    ) -> Vec<(Uuid, DispatchOutcome)> {
        self.notifier.dispatch(notification, recipients, Utc::now()).await
    }

    // --- lifecycle ------------------------------------------------------

    /// Starts the background task that reaps silent presence records and
    /// announces their departure.
    pub async fn spawn_presence_sweep(&self) {
        let presence = self.presence.clone();
        let hub = self.hub.clone();
        let interval = self.config.presence_sweep_interval;
        let stale_after = self.config.presence_stale_after_secs;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let events = presence.sweep_stale(Utc::now(), stale_after);
                for event in events {
                    hub.broadcast(event.resource_id, &event, &[]).await;
                }
            }
        });

        let mut sweeper = self.sweeper.lock().await;
        if let Some(previous) = sweeper.replace(handle) {
            previous.abort();
        }
    }

    /// Stops background work, closes every room (ending member streams) and
    /// clears presence. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        self.hub.close();
        self.presence.clear();
    }

    async fn broadcast_all(&self, events: &[RealtimeEvent], origin: Option<Uuid>) {
        // Excluding the origin is an optimization only; delivering anyway is
        // safe because client apply is idempotent.
        let exclude: Vec<Uuid> = origin.into_iter().collect();
        self.broadcast_excluding(events, &exclude).await;
    }

    async fn broadcast_excluding(&self, events: &[RealtimeEvent], exclude: &[Uuid]) {
        for event in events {
            self.hub.broadcast(event.resource_id, event, exclude).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SyncError,
        models::items::{ItemKind, tests::test_item},
        models::notifications::QuietHours,
        realtime::protocol::EventBody,
        repositories::memory::MemoryItemStore,
    };
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use futures::StreamExt;

    struct RecordingSink {
        delivered: Mutex<Vec<Uuid>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, user_id: Uuid, _notification: &Notification) -> SyncResult<()> {
            self.delivered.lock().await.push(user_id);
            Ok(())
        }
    }

    fn engine_with(persistence: Arc<MemoryItemStore>, sink: Arc<RecordingSink>) -> SyncEngine {
        SyncEngine::new(SyncConfig::default(), persistence, sink)
    }

    fn planning_board(order_id: Uuid, positions: &[i64]) -> Vec<PositionedItem> {
        positions
            .iter()
            .map(|&position| {
                let mut item = test_item(Stage::Planning, position, false);
                item.order_id = order_id;
                item
            })
            .collect()
    }

    #[tokio::test]
    async fn two_clients_converge_after_a_move() {
        let persistence = Arc::new(MemoryItemStore::new());
        let order_id = Uuid::now_v7();
        let items = planning_board(order_id, &[0, 1, 2]);
        let moved_id = items[2].id;
        persistence.seed(items).await;
        let engine = engine_with(persistence, Arc::new(RecordingSink::new()));

        let origin_client = Uuid::new_v4();
        let observer_client = Uuid::new_v4();
        let (_origin_stream, _) = engine
            .connect(origin_client, Uuid::now_v7(), order_id)
            .await;
        let (mut observer_stream, _) = engine
            .connect(observer_client, Uuid::now_v7(), order_id)
            .await;

        let mut observer = engine.client_session(observer_client, order_id);
        observer.resync(engine.resync(order_id).await.unwrap());

        let confirmed = engine
            .move_item(Some(origin_client), order_id, moved_id, Stage::Development, 0)
            .await
            .unwrap();
        assert_eq!(confirmed.stage, Stage::Development);

        let event = observer_stream.next().await.unwrap();
        assert!(matches!(event.body, EventBody::Moved { .. }));
        observer.on_realtime_event(&event);
        // Re-delivery of the same event is harmless.
        assert!(!observer.on_realtime_event(&event));

        let development = observer.stage_view(Stage::Development);
        assert_eq!(development.len(), 1);
        assert_eq!(development[0].id, moved_id);
        assert_eq!(observer.stage_view(Stage::Planning).len(), 2);
    }

    #[tokio::test]
    async fn rejected_move_reaches_nobody_and_rolls_back_locally() {
        let persistence = Arc::new(MemoryItemStore::new());
        let order_id = Uuid::now_v7();
        let items = planning_board(order_id, &[0, 1024]);
        let item = items[0].clone();
        persistence.seed(items).await;
        let engine = engine_with(persistence.clone(), Arc::new(RecordingSink::new()));

        let origin_client = Uuid::new_v4();
        let observer_client = Uuid::new_v4();
        let (_origin_stream, _) = engine
            .connect(origin_client, Uuid::now_v7(), order_id)
            .await;
        let (observer_stream, _) = engine
            .connect(observer_client, Uuid::now_v7(), order_id)
            .await;

        // Origin applies optimistically, then the gateway rejects.
        let mut session = engine.client_session(origin_client, order_id);
        session.resync(engine.resync(order_id).await.unwrap());
        let mut guess = item.clone();
        guess.stage = Stage::Development;
        let request_id = session.begin_mutation(guess, std::time::Instant::now());

        persistence
            .inject_failure(SyncError::NotFound("Item not found".to_string()))
            .await;
        let result = engine
            .move_item(Some(origin_client), order_id, item.id, Stage::Development, 0)
            .await;
        assert!(matches!(&result, Err(SyncError::NotFound(_))));

        let resolution = session.on_mutation_result(request_id, result.map(|_| unreachable!()));
        assert!(matches!(
            resolution,
            crate::client::session::MutationResolution::RolledBack { .. }
        ));
        assert_eq!(session.stage_view(Stage::Planning).len(), 2);

        // No events were produced for anyone.
        let mut observer_rx = observer_stream.into_inner();
        assert!(observer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn field_focus_fans_out_to_room_members() {
        let persistence = Arc::new(MemoryItemStore::new());
        let order_id = Uuid::now_v7();
        let engine = engine_with(persistence, Arc::new(RecordingSink::new()));

        let user_a = Uuid::now_v7();
        let user_b = Uuid::now_v7();
        let client_a = Uuid::new_v4();
        let client_b = Uuid::new_v4();
        let (mut stream_a, _) = engine.connect(client_a, user_a, order_id).await;
        let (_stream_b, presence) = engine.connect(client_b, user_b, order_id).await;
        assert_eq!(presence.len(), 2);

        // A sees B join, then B's focus.
        let joined = stream_a.next().await.unwrap();
        assert_eq!(joined.body, EventBody::PresenceJoined { user_id: user_b });

        engine
            .focus_field(user_b, order_id, Some("title".to_string()))
            .await;
        let focused = stream_a.next().await.unwrap();

        // Both users on "title" raises exactly one advisory for A.
        let mut advisor = engine.conflict_advisor(user_a);
        advisor.focus_local(order_id, Some("title".to_string()));
        let now = std::time::Instant::now();
        let warning = advisor.observe(&focused, now).expect("conflict advisory");
        assert_eq!(warning.field, "title");
        assert_eq!(warning.other_user, user_b);
        assert!(advisor.observe(&focused, now).is_none());
    }

    #[tokio::test]
    async fn mention_notifications_respect_quiet_hours() {
        let persistence = Arc::new(MemoryItemStore::new());
        let sink = Arc::new(RecordingSink::new());
        let order_id = Uuid::now_v7();
        let engine = engine_with(persistence, sink.clone());

        let sleeping = Uuid::now_v7();
        engine.set_notification_preferences(
            sleeping,
            NotificationPreferences {
                quiet_hours: QuietHours {
                    enabled: true,
                    start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                },
                ..Default::default()
            },
        );
        let awake = Uuid::now_v7();

        engine
            .add_comment(
                None,
                NewComment {
                    order_id,
                    author_id: Uuid::now_v7(),
                    parent_id: None,
                    body: "deadline moved".to_string(),
                    mentions: vec![sleeping, awake],
                },
            )
            .await
            .unwrap();

        assert_eq!(sink.delivered.lock().await.as_slice(), &[awake]);
    }

    #[tokio::test]
    async fn reaction_toggle_round_trips_through_room() {
        let persistence = Arc::new(MemoryItemStore::new());
        let order_id = Uuid::now_v7();
        let engine = engine_with(persistence, Arc::new(RecordingSink::new()));

        let comment = engine
            .add_comment(
                None,
                NewComment {
                    order_id,
                    author_id: Uuid::now_v7(),
                    parent_id: None,
                    body: "ship it".to_string(),
                    mentions: Vec::new(),
                },
            )
            .await
            .unwrap();

        let client = Uuid::new_v4();
        let (mut stream, _) = engine.connect(client, Uuid::now_v7(), order_id).await;
        let user = Uuid::now_v7();
        let active = engine
            .toggle_reaction(None, order_id, comment.id, user, "👍")
            .await
            .unwrap();
        assert!(active);

        let event = stream.next().await.unwrap();
        assert_eq!(
            event.body,
            EventBody::ReactionToggled {
                comment_id: comment.id,
                emoji: "👍".to_string(),
                user_id: user,
                active: true,
            }
        );
    }

    #[tokio::test]
    async fn shutdown_ends_member_streams() {
        let persistence = Arc::new(MemoryItemStore::new());
        let order_id = Uuid::now_v7();
        let engine = engine_with(persistence, Arc::new(RecordingSink::new()));
        engine.spawn_presence_sweep().await;

        let (stream, _) = engine.connect(Uuid::new_v4(), Uuid::now_v7(), order_id).await;
        engine.shutdown().await;

        let mut rx = stream.into_inner();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unpositioned_create_lands_at_stage_tail_for_everyone() {
        let persistence = Arc::new(MemoryItemStore::new());
        let order_id = Uuid::now_v7();
        persistence.seed(planning_board(order_id, &[0])).await;
        let engine = engine_with(persistence, Arc::new(RecordingSink::new()));

        let client = Uuid::new_v4();
        let (mut stream, _) = engine.connect(client, Uuid::now_v7(), order_id).await;

        let created = engine
            .create_item(
                None,
                ItemDraft {
                    order_id,
                    kind: ItemKind::Task,
                    parent_id: None,
                    stage: Stage::Planning,
                    title: "new task".to_string(),
                    description: None,
                    assignee_id: None,
                    due_at: None,
                    pinned: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.position, 1024);

        let event = stream.next().await.unwrap();
        let EventBody::Created { item } = event.body else {
            panic!("expected created event");
        };
        assert_eq!(item.id, created.id);
    }
}
