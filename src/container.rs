//! The application state container.

use crate::clock::{Clock, SystemClock};
use crate::error::{LoadError, Result, StateError};
use crate::persist::{PersistStats, PersistWorker};
use crate::storage::PersistenceGateway;
use crate::subscriptions::{ChangeNotice, NotifyReport, Subscriber, SubscriberRegistry};
use crate::types::{CounterState, RestorableState, StateField, StateSnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Storage key shared by every container unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "AppStateKey";

/// Saved state older than this is discarded on load.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// Asks the rendering layer to redraw. Coalescing is the renderer's job.
pub trait RedrawSignal: Send + Sync {
    fn request_redraw(&self);
}

impl<F> RedrawSignal for F
where
    F: Fn() + Send + Sync,
{
    fn request_redraw(&self) {
        (self)()
    }
}

/// Container configuration.
///
/// Writes are queued for the persist worker without limit or merging; an
/// embedder with a slow gateway and frequent writes should expect the queue
/// to grow until the gateway catches up.
#[derive(Clone, Debug)]
pub struct ContainerConfig {
    /// Key the snapshot is stored under.
    pub storage_key: String,

    /// Maximum age (inclusive) of a snapshot that may still be restored.
    /// Default: 60s
    pub freshness_window: Duration,

    /// Thread name of the persist worker.
    pub worker_name: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            worker_name: "app-state-persist".to_string(),
        }
    }
}

impl ContainerConfig {
    fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(StateError::InvalidConfig("storage key must not be empty".into()));
        }
        Ok(())
    }
}

/// A single field write.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldUpdate {
    Message(String),
    Count(i32),
    Counter(CounterState),
}

impl FieldUpdate {
    pub fn field(&self) -> StateField {
        match self {
            FieldUpdate::Message(_) => StateField::Message,
            FieldUpdate::Count(_) => StateField::Count,
            FieldUpdate::Counter(_) => StateField::Counter,
        }
    }

    fn to_value(&self) -> serde_json::Value {
        match self {
            FieldUpdate::Message(message) => serde_json::Value::from(message.as_str()),
            FieldUpdate::Count(count) => serde_json::Value::from(*count),
            FieldUpdate::Counter(counter) => serde_json::to_value(counter).unwrap_or_default(),
        }
    }
}

/// What a load from storage found.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOutcome {
    /// Nothing stored; defaults kept.
    Empty,
    /// Snapshot was fresh and its fields were copied in.
    Restored { age_secs: f64 },
    /// Snapshot was too old, or carried no save time; defaults kept.
    Stale { age_secs: Option<f64> },
}

/// In-memory application state with change notification and persistence.
///
/// Lifecycle:
/// - Created unloaded. Field writes notify subscribers but persist nothing.
/// - [`activate`](Self::activate) restores a fresh snapshot, if any, and
///   marks the container loaded.
/// - From then on every field write also queues a snapshot write.
pub struct StateContainer {
    config: ContainerConfig,

    /// Current field values.
    state: RestorableState,

    /// Change-notice subscribers.
    subscribers: SubscriberRegistry,

    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    redraw: Box<dyn RedrawSignal>,

    /// Background writer; also owns the loaded flag.
    persister: PersistWorker,

    /// Whether the first activation has happened.
    activated: bool,
}

impl StateContainer {
    /// Create a container using the system clock.
    pub fn new(
        config: ContainerConfig,
        gateway: Arc<dyn PersistenceGateway>,
        redraw: impl RedrawSignal + 'static,
    ) -> Result<Self> {
        Self::with_clock(config, gateway, redraw, Arc::new(SystemClock))
    }

    /// Create a container reading time from `clock`.
    pub fn with_clock(
        config: ContainerConfig,
        gateway: Arc<dyn PersistenceGateway>,
        redraw: impl RedrawSignal + 'static,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let persister = PersistWorker::spawn(
            config.worker_name.clone(),
            config.storage_key.clone(),
            Arc::clone(&gateway),
            Arc::clone(&clock),
        )?;

        Ok(Self {
            config,
            state: RestorableState::default(),
            subscribers: SubscriberRegistry::new(),
            gateway,
            clock,
            redraw: Box::new(redraw),
            persister,
            activated: false,
        })
    }

    // --- Accessors ---

    pub fn message(&self) -> &str {
        &self.state.message
    }

    pub fn count(&self) -> i32 {
        self.state.count
    }

    pub fn counter(&self) -> &CounterState {
        &self.state.counter
    }

    /// The restorable fields as they stand.
    pub fn state(&self) -> &RestorableState {
        &self.state
    }

    /// Time of the most recent successful persist, if any.
    ///
    /// Never taken from a restored snapshot.
    pub fn last_save_time(&self) -> Option<DateTime<Utc>> {
        self.persister.last_save_time()
    }

    /// Current fields together with the last save time.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            state: self.state.clone(),
            last_save_time: self.last_save_time(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.persister.is_loaded()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn persist_stats(&self) -> PersistStats {
        self.persister.stats()
    }

    // --- Subscriptions ---

    /// Register a subscriber. Registering the same handle twice is a no-op.
    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) -> bool {
        self.subscribers.register(subscriber)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // --- Mutation ---

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.set_field(FieldUpdate::Message(message.into()));
    }

    pub fn set_count(&mut self, count: i32) {
        self.set_field(FieldUpdate::Count(count));
    }

    pub fn set_counter(&mut self, counter: CounterState) {
        self.set_field(FieldUpdate::Counter(counter));
    }

    /// Apply one field write.
    ///
    /// Assigns the value, requests a redraw, notifies every subscriber
    /// before returning, then queues a persist (a no-op until loaded).
    pub fn set_field(&mut self, update: FieldUpdate) -> NotifyReport {
        let notice = ChangeNotice::new(update.field(), update.to_value());

        match update {
            FieldUpdate::Message(message) => self.state.message = message,
            FieldUpdate::Count(count) => self.state.count = count,
            FieldUpdate::Counter(counter) => self.state.counter = counter,
        }

        self.redraw.request_redraw();
        let report = self.subscribers.notify_all(&notice);
        self.persist();
        report
    }

    // --- Persistence ---

    /// Queue a write of the current fields.
    ///
    /// Returns whether a write was queued; nothing is written before the
    /// container is loaded.
    pub fn persist(&self) -> bool {
        self.persister.schedule(self.state.clone())
    }

    /// Wait for every queued write to finish.
    pub fn flush(&self) -> Result<()> {
        self.persister.flush()
    }

    /// First-activation hook.
    ///
    /// Loads from storage, then marks the container loaded and requests a
    /// redraw whether or not the load succeeded. A load failure is returned
    /// after that. Later calls do nothing and return `Ok(None)`.
    pub fn activate(&mut self) -> Result<Option<LoadOutcome>> {
        if self.activated {
            return Ok(None);
        }
        self.activated = true;

        let result = self.load_from_storage();

        self.persister.mark_loaded();
        self.redraw.request_redraw();

        match &result {
            Ok(outcome) => tracing::debug!(?outcome, "State container activated"),
            Err(e) => tracing::error!(error = %e, "State container activated without restoring state"),
        }

        result.map(Some)
    }

    /// Restore fields from storage if the stored snapshot is fresh.
    ///
    /// Only `message`, `count` and `counter` are copied; the save time is
    /// left alone. Gateway and parse failures come back as
    /// [`StateError::Load`].
    pub fn load_from_storage(&mut self) -> Result<LoadOutcome> {
        let key = self.config.storage_key.clone();

        let raw = match self.gateway.get_string(&key) {
            Ok(raw) => raw,
            Err(e) => {
                return Err(StateError::Load {
                    key,
                    source: LoadError::Gateway(e),
                })
            }
        };
        let raw = match raw {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => {
                tracing::debug!(key = %key, "No stored state");
                return Ok(LoadOutcome::Empty);
            }
        };

        let snapshot: StateSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return Err(StateError::Load {
                    key,
                    source: LoadError::Malformed(e),
                })
            }
        };

        let window = self.config.freshness_window.as_secs_f64();
        match snapshot.age_secs(self.clock.now()) {
            Some(age_secs) if age_secs <= window => {
                tracing::debug!(key = %key, age_secs, "Restoring stored state");
                self.restore(snapshot.state);
                Ok(LoadOutcome::Restored { age_secs })
            }
            age_secs => {
                tracing::debug!(key = %key, ?age_secs, "Discarding stale stored state");
                Ok(LoadOutcome::Stale { age_secs })
            }
        }
    }

    /// Copy each restorable field in through its setter.
    fn restore(&mut self, restored: RestorableState) {
        let RestorableState {
            message,
            count,
            counter,
        } = restored;

        self.set_message(message);
        self.set_count(count);
        self.set_counter(counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryGateway;
    use crate::subscriptions::ChannelSubscriber;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    struct Fixture {
        gateway: Arc<MemoryGateway>,
        clock: Arc<ManualClock>,
        redraws: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                gateway: Arc::new(MemoryGateway::new()),
                clock: Arc::new(ManualClock::new(now())),
                redraws: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn container(&self) -> StateContainer {
            let redraws = Arc::clone(&self.redraws);
            StateContainer::with_clock(
                ContainerConfig::default(),
                Arc::clone(&self.gateway) as Arc<dyn PersistenceGateway>,
                move || {
                    redraws.fetch_add(1, Ordering::SeqCst);
                },
                Arc::clone(&self.clock) as Arc<dyn Clock>,
            )
            .unwrap()
        }

        fn store_saved(&self, saved_at: DateTime<Utc>) {
            let snapshot = StateSnapshot::stamped(
                RestorableState {
                    message: "saved".to_string(),
                    count: 9,
                    counter: CounterState::new(4, "nested"),
                },
                saved_at,
            );
            self.gateway
                .insert_raw(DEFAULT_STORAGE_KEY, serde_json::to_string(&snapshot).unwrap());
        }
    }

    #[test]
    fn test_defaults() {
        let fixture = Fixture::new();
        let container = fixture.container();

        assert_eq!(container.message(), "");
        assert_eq!(container.count(), 0);
        assert_eq!(container.counter(), &CounterState::default());
        assert!(container.last_save_time().is_none());
        assert!(!container.is_loaded());
    }

    #[test]
    fn test_set_count_notifies_redraws_and_persists() {
        let fixture = Fixture::new();
        let mut container = fixture.container();
        container.activate().unwrap();

        let (subscriber, notices) = ChannelSubscriber::new(8);
        container.subscribe(Arc::new(subscriber));

        let redraws_before = fixture.redraws.load(Ordering::SeqCst);
        container.set_count(5);
        container.flush().unwrap();

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.field_name(), "Count");
        assert_eq!(notice.new_value(), &json!(5));
        assert_eq!(fixture.redraws.load(Ordering::SeqCst), redraws_before + 1);

        let stored: StateSnapshot =
            serde_json::from_str(&fixture.gateway.raw(DEFAULT_STORAGE_KEY).unwrap()).unwrap();
        assert_eq!(stored.state.count, 5);
        assert_eq!(stored.last_save_time, Some(now()));
        assert_eq!(container.last_save_time(), Some(now()));
    }

    #[test]
    fn test_counter_notice_carries_whole_substate() {
        let fixture = Fixture::new();
        let mut container = fixture.container();
        let (subscriber, notices) = ChannelSubscriber::new(8);
        container.subscribe(Arc::new(subscriber));

        container.set_counter(CounterState::new(2, "two"));

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.field_name(), "Counter");
        assert_eq!(notice.new_value(), &json!({"count": 2, "message": "two"}));
    }

    #[test]
    fn test_writes_before_activation_are_not_persisted() {
        let fixture = Fixture::new();
        let mut container = fixture.container();

        container.set_message("early");
        assert!(!container.persist());
        container.flush().unwrap();

        assert_eq!(fixture.gateway.write_count(), 0);
        assert_eq!(container.message(), "early");
    }

    #[test]
    fn test_activate_restores_fresh_state() {
        let fixture = Fixture::new();
        fixture.store_saved(now() - chrono::Duration::seconds(30));
        let mut container = fixture.container();

        let outcome = container.activate().unwrap();

        assert_eq!(outcome, Some(LoadOutcome::Restored { age_secs: 30.0 }));
        assert_eq!(container.message(), "saved");
        assert_eq!(container.count(), 9);
        assert_eq!(container.counter(), &CounterState::new(4, "nested"));
        assert!(container.last_save_time().is_none());
        assert!(container.is_loaded());

        // Restoring went through the setters but wrote nothing back.
        container.flush().unwrap();
        assert_eq!(fixture.gateway.write_count(), 0);
    }

    #[test]
    fn test_freshness_boundary_is_inclusive() {
        let fixture = Fixture::new();
        fixture.store_saved(now() - chrono::Duration::seconds(60));
        let mut container = fixture.container();

        let outcome = container.load_from_storage().unwrap();
        assert_eq!(outcome, LoadOutcome::Restored { age_secs: 60.0 });
    }

    #[test]
    fn test_stale_state_is_discarded() {
        let fixture = Fixture::new();
        fixture.store_saved(now() - chrono::Duration::seconds(90));
        let mut container = fixture.container();

        let outcome = container.activate().unwrap();

        assert_eq!(outcome, Some(LoadOutcome::Stale { age_secs: Some(90.0) }));
        assert_eq!(container.state(), &RestorableState::default());
    }

    #[test]
    fn test_activate_only_once() {
        let fixture = Fixture::new();
        let mut container = fixture.container();

        assert_eq!(container.activate().unwrap(), Some(LoadOutcome::Empty));
        let redraws = fixture.redraws.load(Ordering::SeqCst);

        assert_eq!(container.activate().unwrap(), None);
        assert_eq!(fixture.redraws.load(Ordering::SeqCst), redraws);
    }

    #[test]
    fn test_empty_key_rejected() {
        let fixture = Fixture::new();
        let result = StateContainer::new(
            ContainerConfig {
                storage_key: "  ".to_string(),
                ..Default::default()
            },
            Arc::clone(&fixture.gateway) as Arc<dyn PersistenceGateway>,
            || {},
        );
        assert!(matches!(result, Err(StateError::InvalidConfig(_))));
    }

    #[test]
    fn test_custom_window() {
        let fixture = Fixture::new();
        fixture.store_saved(now() - chrono::Duration::seconds(90));
        let mut container = StateContainer::with_clock(
            ContainerConfig {
                freshness_window: Duration::from_secs(120),
                ..Default::default()
            },
            Arc::clone(&fixture.gateway) as Arc<dyn PersistenceGateway>,
            || {},
            Arc::clone(&fixture.clock) as Arc<dyn Clock>,
        )
        .unwrap();

        assert!(matches!(
            container.load_from_storage().unwrap(),
            LoadOutcome::Restored { .. }
        ));
    }
}
