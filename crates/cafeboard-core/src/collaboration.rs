//! Synchronization between the local board and the shared store.
//!
//! Outbound, every mutation saves the full board state. Stroke commits are
//! throttled: inside the save interval they only mark the state pending, and
//! [`SyncCoordinator::maybe_flush`] sends it once the interval has passed. Any
//! other mutation saves at once and supersedes a pending stroke save.
//!
//! Inbound, a standing subscription hands every remote snapshot back to the
//! caller, which replaces its history and text boxes wholesale. There is no
//! merge; the last completed write wins. While a stroke save is pending, the
//! echo of this client's own last save is dropped so it cannot roll back the
//! newer local state.

use crate::board::{BoardState, now_millis};
use crate::storage::{BoardStore, BoardSubscription, ConnectionState, StoreResult, SubscriptionEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default minimum time between throttled saves.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_millis(1000);

/// How a mutation should be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    /// Stroke commits: rate limited by the save interval.
    Throttled,
    /// Everything else: sent right away.
    Immediate,
}

/// Result of a commit or flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The full state was written.
    Saved,
    /// Held back by the throttle; the state is pending.
    Deferred,
    /// Nothing to send.
    Skipped,
    /// The write failed; the state stays pending for the next flush.
    Failed,
}

/// A remote snapshot ready to replace local state.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteUpdate {
    pub state: BoardState,
    /// The board did not exist yet; `state` is empty.
    pub missing: bool,
}

/// Keeps one board in eventual agreement with a [`BoardStore`].
pub struct SyncCoordinator<S: BoardStore + ?Sized> {
    store: Arc<S>,
    board_id: String,
    interval: Duration,
    /// Last successful save; the throttle interval runs from here.
    last_save: Option<Instant>,
    /// Last failed save; a pending retry waits one interval from here.
    last_failure: Option<Instant>,
    pending: Option<BoardState>,
    /// Content of the last state the store accepted from this client.
    last_sent: Option<BoardState>,
    subscription: Option<BoardSubscription>,
    loading: bool,
    connection: ConnectionState,
    revision_guard: bool,
    newest_applied: Option<i64>,
}

impl<S: BoardStore + ?Sized> SyncCoordinator<S> {
    /// Create a coordinator for `board_id`. Call [`open`](Self::open) to subscribe.
    pub fn new(store: Arc<S>, board_id: impl Into<String>) -> Self {
        Self {
            store,
            board_id: board_id.into(),
            interval: DEFAULT_SAVE_INTERVAL,
            last_save: None,
            last_failure: None,
            pending: None,
            last_sent: None,
            subscription: None,
            loading: true,
            connection: ConnectionState::Disconnected,
            revision_guard: false,
            newest_applied: None,
        }
    }

    /// Set the throttle interval for stroke saves.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Drop inbound snapshots older than the newest one already applied.
    ///
    /// Off by default: without it a slow older write that lands last still wins.
    pub fn with_revision_guard(mut self, enabled: bool) -> Self {
        self.revision_guard = enabled;
        self
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Local changes the store has not accepted yet: a throttled stroke or a
    /// failed save waiting for retry.
    pub fn is_syncing(&self) -> bool {
        self.pending.is_some()
    }

    /// No snapshot has arrived since subscribing.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// A throttled stroke save is waiting.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Subscribe to the board.
    pub fn open(&mut self) -> StoreResult<()> {
        let subscription = self.store.subscribe(&self.board_id)?;
        log::info!("Subscribed to board {}", self.board_id);
        self.subscription = Some(subscription);
        self.loading = true;
        self.connection = self.store.connection_state();
        Ok(())
    }

    /// Drop the subscription. Pending saves are discarded.
    pub fn close(&mut self) {
        if self.subscription.take().is_some() {
            log::info!("Unsubscribed from board {}", self.board_id);
        }
        if self.pending.take().is_some() {
            log::warn!("Discarding pending save for board {}", self.board_id);
        }
        self.connection = ConnectionState::Disconnected;
    }

    /// Persist a mutation.
    ///
    /// `state` is the complete local board after the mutation.
    pub async fn commit(&mut self, kind: SaveKind, state: &BoardState) -> SaveOutcome {
        match kind {
            SaveKind::Throttled if !self.interval_elapsed() => {
                log::debug!("Deferring stroke save for board {}", self.board_id);
                self.pending = Some(state.clone());
                SaveOutcome::Deferred
            }
            SaveKind::Throttled | SaveKind::Immediate => self.save(state).await,
        }
    }

    /// Send the pending stroke save once the interval has passed.
    pub async fn maybe_flush(&mut self) -> SaveOutcome {
        if self.pending.is_none() {
            return SaveOutcome::Skipped;
        }
        if !self.interval_elapsed() || !self.retry_elapsed() {
            return SaveOutcome::Deferred;
        }
        match self.pending.take() {
            Some(state) => self.save(&state).await,
            None => SaveOutcome::Skipped,
        }
    }

    /// Write the full state now, superseding any pending save.
    ///
    /// Failures are logged and leave the state pending; local state is never
    /// rolled back.
    pub async fn save(&mut self, state: &BoardState) -> SaveOutcome {
        self.pending = None;
        let mut outgoing = state.clone();
        outgoing.last_updated = now_millis();

        match self.store.set(&self.board_id, &outgoing).await {
            Ok(()) => {
                log::debug!(
                    "Saved board {} ({} actions, {} text boxes)",
                    self.board_id,
                    outgoing.actions.len(),
                    outgoing.text_boxes.len()
                );
                self.last_save = Some(Instant::now());
                self.last_failure = None;
                self.last_sent = Some(outgoing);
                SaveOutcome::Saved
            }
            Err(e) => {
                log::error!("Failed to save board {}: {}", self.board_id, e);
                self.pending = Some(outgoing);
                self.last_failure = Some(Instant::now());
                SaveOutcome::Failed
            }
        }
    }

    /// Drain the subscription and return the state to apply, if any.
    ///
    /// When several snapshots queued up only the last one is returned. A
    /// subscription failure is logged and leaves local state untouched.
    pub fn poll_remote(&mut self) -> Option<RemoteUpdate> {
        let events = self.subscription.as_mut()?.poll();
        let mut update = None;

        for event in events {
            match event {
                SubscriptionEvent::Snapshot(snapshot) => {
                    self.loading = false;
                    self.connection = ConnectionState::Connected;
                    let missing = snapshot.is_none();
                    let state = snapshot.unwrap_or_default();

                    if self.is_own_echo(&state) {
                        log::debug!(
                            "Ignoring echo of own save for board {} while a save is pending",
                            self.board_id
                        );
                        continue;
                    }
                    if self.is_stale(&state) {
                        log::debug!(
                            "Ignoring stale snapshot for board {} ({} < {:?})",
                            self.board_id,
                            state.last_updated,
                            self.newest_applied
                        );
                        continue;
                    }
                    if !missing {
                        self.newest_applied = Some(
                            self.newest_applied
                                .map_or(state.last_updated, |n| n.max(state.last_updated)),
                        );
                    }
                    update = Some(RemoteUpdate { state, missing });
                }
                SubscriptionEvent::Failed(reason) => {
                    log::warn!("Subscription to board {} failed: {}", self.board_id, reason);
                    self.loading = false;
                    self.connection = ConnectionState::Error;
                }
            }
        }

        if self.subscription.as_ref().is_some_and(BoardSubscription::is_closed) {
            self.subscription = None;
        }
        update
    }

    fn is_own_echo(&self, state: &BoardState) -> bool {
        self.pending.is_some()
            && self
                .last_sent
                .as_ref()
                .is_some_and(|sent| sent.same_content(state))
    }

    fn is_stale(&self, state: &BoardState) -> bool {
        self.revision_guard
            && self
                .newest_applied
                .is_some_and(|newest| state.last_updated < newest)
    }

    fn interval_elapsed(&self) -> bool {
        match self.last_save {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    fn retry_elapsed(&self) -> bool {
        self.last_failure
            .is_none_or(|failed| failed.elapsed() >= self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{DrawingAction, History};
    use crate::storage::test_util::block_on;
    use crate::storage::{BoxFuture, MemoryBoardStore, StoreError};
    use kurbo::Point;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn stroke_state(n: usize) -> BoardState {
        let mut actions = History::new();
        for i in 0..n {
            actions.push(DrawingAction::stroke(
                vec![Point::new(i as f64, i as f64)],
                "#000000",
                3.0,
                i as i64,
            ));
        }
        BoardState::with_content(actions, Default::default())
    }

    fn open(store: &Arc<MemoryBoardStore>) -> SyncCoordinator<MemoryBoardStore> {
        let mut sync = SyncCoordinator::new(Arc::clone(store), "shared");
        sync.open().unwrap();
        sync
    }

    #[test]
    fn test_first_stroke_saves_immediately() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store);

        let outcome = block_on(sync.commit(SaveKind::Throttled, &stroke_state(1)));

        assert_eq!(outcome, SaveOutcome::Saved);
        let saved = block_on(store.get("shared")).unwrap().unwrap();
        assert_eq!(saved.actions.len(), 1);
        assert!(saved.last_updated > 0);
    }

    #[test]
    fn test_stroke_inside_interval_is_deferred() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store).with_interval(Duration::from_secs(60));

        block_on(sync.commit(SaveKind::Throttled, &stroke_state(1)));
        let outcome = block_on(sync.commit(SaveKind::Throttled, &stroke_state(2)));

        assert_eq!(outcome, SaveOutcome::Deferred);
        assert!(sync.has_pending());
        assert_eq!(block_on(store.get("shared")).unwrap().unwrap().actions.len(), 1);
        assert_eq!(block_on(sync.maybe_flush()), SaveOutcome::Deferred);
    }

    #[test]
    fn test_immediate_save_supersedes_pending() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store).with_interval(Duration::from_secs(60));

        block_on(sync.commit(SaveKind::Throttled, &stroke_state(1)));
        block_on(sync.commit(SaveKind::Throttled, &stroke_state(2)));
        let outcome = block_on(sync.commit(SaveKind::Immediate, &stroke_state(3)));

        assert_eq!(outcome, SaveOutcome::Saved);
        assert!(!sync.has_pending());
        assert_eq!(block_on(store.get("shared")).unwrap().unwrap().actions.len(), 3);
    }

    #[test]
    fn test_flush_after_interval() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store).with_interval(Duration::from_millis(20));

        block_on(sync.commit(SaveKind::Throttled, &stroke_state(1)));
        block_on(sync.commit(SaveKind::Throttled, &stroke_state(2)));
        assert!(sync.has_pending());

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(block_on(sync.maybe_flush()), SaveOutcome::Saved);
        assert_eq!(block_on(store.get("shared")).unwrap().unwrap().actions.len(), 2);
        assert_eq!(block_on(sync.maybe_flush()), SaveOutcome::Skipped);
    }

    #[test]
    fn test_missing_document_yields_empty_state() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store);
        assert!(sync.is_loading());

        let update = sync.poll_remote().unwrap();

        assert!(update.missing);
        assert!(update.state.is_empty());
        assert!(!sync.is_loading());
        assert!(sync.poll_remote().is_none());
    }

    #[test]
    fn test_own_save_echoes_back() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store);
        sync.poll_remote();

        block_on(sync.save(&stroke_state(2)));
        let echo = sync.poll_remote().unwrap();

        assert!(echo.state.same_content(&stroke_state(2)));
    }

    #[test]
    fn test_only_latest_queued_snapshot_is_returned() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store);

        block_on(store.set("shared", &stroke_state(1))).unwrap();
        block_on(store.set("shared", &stroke_state(4))).unwrap();

        let update = sync.poll_remote().unwrap();
        assert_eq!(update.state.actions.len(), 4);
    }

    #[test]
    fn test_revision_guard_drops_older_snapshot() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = SyncCoordinator::new(Arc::clone(&store), "shared").with_revision_guard(true);
        sync.open().unwrap();
        sync.poll_remote();

        let mut newer = stroke_state(2);
        newer.last_updated = 2_000;
        let mut older = stroke_state(1);
        older.last_updated = 1_000;

        block_on(store.set("shared", &newer)).unwrap();
        assert_eq!(sync.poll_remote().unwrap().state.actions.len(), 2);

        block_on(store.set("shared", &older)).unwrap();
        assert!(sync.poll_remote().is_none());
    }

    #[test]
    fn test_without_guard_older_snapshot_wins() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store);
        sync.poll_remote();

        let mut newer = stroke_state(2);
        newer.last_updated = 2_000;
        let mut older = stroke_state(1);
        older.last_updated = 1_000;

        block_on(store.set("shared", &newer)).unwrap();
        block_on(store.set("shared", &older)).unwrap();

        assert_eq!(sync.poll_remote().unwrap().state.actions.len(), 1);
    }

    #[test]
    fn test_subscription_failure_keeps_state() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store);
        sync.poll_remote();

        store.close();

        assert!(sync.poll_remote().is_none());
        assert_eq!(sync.connection_state(), ConnectionState::Error);
        assert!(!sync.is_open());
    }

    struct FailingStore;

    impl BoardStore for FailingStore {
        fn get(&self, _board: &str) -> BoxFuture<'_, StoreResult<Option<BoardState>>> {
            Box::pin(async { Err(StoreError::Connection("offline".to_string())) })
        }

        fn set(&self, _board: &str, _state: &BoardState) -> BoxFuture<'_, StoreResult<()>> {
            Box::pin(async { Err(StoreError::Connection("offline".to_string())) })
        }

        fn subscribe(&self, _board: &str) -> StoreResult<BoardSubscription> {
            Err(StoreError::Connection("offline".to_string()))
        }
    }

    #[test]
    fn test_failed_save_stays_pending() {
        let mut sync = SyncCoordinator::new(Arc::new(FailingStore), "shared");

        let outcome = block_on(sync.commit(SaveKind::Immediate, &stroke_state(1)));

        assert_eq!(outcome, SaveOutcome::Failed);
        assert!(sync.has_pending());
        assert!(sync.is_syncing());
        assert!(sync.open().is_err());
    }

    /// Memory store whose next `set` can be made to fail.
    struct FlakyStore {
        inner: MemoryBoardStore,
        fail_next: AtomicBool,
    }

    impl FlakyStore {
        fn failing_once() -> Self {
            Self {
                inner: MemoryBoardStore::new(),
                fail_next: AtomicBool::new(true),
            }
        }
    }

    impl BoardStore for FlakyStore {
        fn get(&self, board: &str) -> BoxFuture<'_, StoreResult<Option<BoardState>>> {
            self.inner.get(board)
        }

        fn set(&self, board: &str, state: &BoardState) -> BoxFuture<'_, StoreResult<()>> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Box::pin(async { Err(StoreError::Connection("offline".to_string())) });
            }
            self.inner.set(board, state)
        }

        fn subscribe(&self, board: &str) -> StoreResult<BoardSubscription> {
            self.inner.subscribe(board)
        }
    }

    #[test]
    fn test_failed_save_does_not_start_throttle() {
        let store = Arc::new(FlakyStore::failing_once());
        let mut sync =
            SyncCoordinator::new(Arc::clone(&store), "shared").with_interval(Duration::from_secs(60));

        assert_eq!(
            block_on(sync.commit(SaveKind::Throttled, &stroke_state(1))),
            SaveOutcome::Failed
        );
        // The retry of a failed save waits one interval.
        assert_eq!(block_on(sync.maybe_flush()), SaveOutcome::Deferred);

        // No save has succeeded yet, so the next stroke goes out at once.
        assert_eq!(
            block_on(sync.commit(SaveKind::Throttled, &stroke_state(2))),
            SaveOutcome::Saved
        );
        assert!(!sync.has_pending());
        assert_eq!(block_on(store.get("shared")).unwrap().unwrap().actions.len(), 2);
    }

    #[test]
    fn test_syncing_until_store_accepts() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store).with_interval(Duration::from_secs(60));
        assert!(!sync.is_syncing());

        block_on(sync.commit(SaveKind::Throttled, &stroke_state(1)));
        assert!(!sync.is_syncing());

        block_on(sync.commit(SaveKind::Throttled, &stroke_state(2)));
        assert!(sync.is_syncing());

        block_on(sync.commit(SaveKind::Immediate, &stroke_state(2)));
        assert!(!sync.is_syncing());
    }

    #[test]
    fn test_own_echo_ignored_while_stroke_pending() {
        let store = Arc::new(MemoryBoardStore::new());
        let mut sync = open(&store).with_interval(Duration::from_secs(60));
        sync.poll_remote();

        block_on(sync.commit(SaveKind::Throttled, &stroke_state(1)));
        block_on(sync.commit(SaveKind::Throttled, &stroke_state(2)));

        // The echo of the first save would drop the deferred second stroke.
        assert!(sync.poll_remote().is_none());
        assert!(sync.has_pending());

        // Writes from other clients still come through.
        block_on(store.set("shared", &stroke_state(5))).unwrap();
        assert_eq!(sync.poll_remote().unwrap().state.actions.len(), 5);
    }
}
