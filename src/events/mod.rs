//! Central event stack: a bounded log of categorized entries plus the queue of
//! game events drained once per simulation tick.

mod entry;
mod export;
mod queue;

pub use entry::{EventCategory, EventEntry, LogLevel, LogRecord};
pub use export::format_entry;
pub use queue::{GameEvent, GameEventDispatcher, GameEventError, GameEventHandler};

use crate::ecs::World;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub const DEFAULT_CAPACITY: usize = 1000;

pub type LogListener = Arc<dyn Fn(&EventEntry) + Send + Sync>;
pub type GameEventCallback = Arc<dyn Fn(&GameEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventStackConfig {
    pub capacity: usize,
    pub min_level: LogLevel,
    pub show_verbose: bool,
}

impl Default for EventStackConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            min_level: LogLevel::Debug,
            show_verbose: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub failed: usize,
}

struct Subscriber {
    id: SubscriptionId,
    kind: String,
    callback: GameEventCallback,
}

pub struct EventStack {
    config: EventStackConfig,
    enabled: BTreeSet<EventCategory>,
    entries: VecDeque<EventEntry>,
    next_entry_id: u64,
    log_listeners: Vec<(SubscriptionId, LogListener)>,
    queue: VecDeque<GameEvent>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl Default for EventStack {
    fn default() -> Self {
        Self::new(EventStackConfig::default())
    }
}

fn default_categories() -> BTreeSet<EventCategory> {
    EventCategory::ALL
        .into_iter()
        .filter(|category| !category.is_debug())
        .collect()
}

impl EventStack {
    pub fn new(config: EventStackConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            config: EventStackConfig { capacity, ..config },
            enabled: default_categories(),
            entries: VecDeque::with_capacity(capacity),
            next_entry_id: 1,
            log_listeners: Vec::new(),
            queue: VecDeque::new(),
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn config(&self) -> &EventStackConfig {
        &self.config
    }

    pub fn set_min_level(&mut self, level: LogLevel) {
        self.config.min_level = level;
    }

    pub fn set_show_verbose(&mut self, show: bool) {
        self.config.show_verbose = show;
    }

    /// Appends `record` if its category, level and verbosity pass the current
    /// filters. Returns the new entry id.
    pub fn record(&mut self, record: LogRecord) -> Option<u64> {
        let (entry, listeners) = self.append(record)?;
        for listener in &listeners {
            listener(&entry);
        }
        Some(entry.id)
    }

    fn append(&mut self, record: LogRecord) -> Option<(EventEntry, Vec<LogListener>)> {
        if !self.accepts(&record) {
            return None;
        }
        let entry = record.into_entry(self.next_entry_id);
        self.next_entry_id += 1;
        while self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        let listeners = self
            .log_listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        Some((entry, listeners))
    }

    fn accepts(&self, record: &LogRecord) -> bool {
        self.enabled.contains(&record.category)
            && record.level >= self.config.min_level
            && (!record.verbose || self.config.show_verbose)
    }

    pub fn debug(
        &mut self,
        category: EventCategory,
        event_type: &str,
        message: impl Into<String>,
    ) -> Option<u64> {
        self.record(LogRecord::new(category, LogLevel::Debug, event_type, message))
    }

    pub fn info(
        &mut self,
        category: EventCategory,
        event_type: &str,
        message: impl Into<String>,
    ) -> Option<u64> {
        self.record(LogRecord::new(category, LogLevel::Info, event_type, message))
    }

    pub fn warn(
        &mut self,
        category: EventCategory,
        event_type: &str,
        message: impl Into<String>,
    ) -> Option<u64> {
        self.record(LogRecord::new(category, LogLevel::Warn, event_type, message))
    }

    pub fn error(
        &mut self,
        category: EventCategory,
        event_type: &str,
        message: impl Into<String>,
    ) -> Option<u64> {
        self.record(LogRecord::new(category, LogLevel::Error, event_type, message))
    }

    pub fn is_category_enabled(&self, category: EventCategory) -> bool {
        self.enabled.contains(&category)
    }

    pub fn enabled_categories(&self) -> Vec<EventCategory> {
        self.enabled.iter().copied().collect()
    }

    pub fn enable_debug_category(&mut self, category: EventCategory) -> bool {
        self.set_category_enabled(category, true)
    }

    pub fn disable_debug_category(&mut self, category: EventCategory) -> bool {
        self.set_category_enabled(category, false)
    }

    /// Toggles a debug category. Non-debug categories cannot be changed and
    /// the request is logged and refused.
    pub fn set_category_enabled(&mut self, category: EventCategory, enabled: bool) -> bool {
        if !category.is_debug() {
            log::warn!("[events] category {category} is not a debug category");
            self.record(
                LogRecord::new(
                    EventCategory::Error,
                    LogLevel::Warn,
                    "category_toggle_rejected",
                    format!("{category} is always enabled"),
                )
                .context(json!({ "category": category, "requested": enabled })),
            );
            return false;
        }
        if enabled {
            self.enabled.insert(category);
        } else {
            self.enabled.remove(&category);
        }
        true
    }

    pub fn enable_all_debug_categories(&mut self) {
        self.enabled.extend(
            EventCategory::ALL
                .into_iter()
                .filter(|category| category.is_debug()),
        );
    }

    pub fn disable_all_debug_categories(&mut self) {
        self.enabled.retain(|category| !category.is_debug());
    }

    pub fn reset_categories(&mut self) {
        self.enabled = default_categories();
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn get_all_events(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn events(&self) -> impl Iterator<Item = &EventEntry> + '_ {
        self.entries.iter()
    }

    pub fn events_by_category(&self, category: EventCategory) -> Vec<&EventEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.category == category)
            .collect()
    }

    /// The newest `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> Vec<&EventEntry> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Clears the log and the pending queue and restores default categories.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.queue.clear();
        self.reset_categories();
    }

    fn next_subscription_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        id
    }

    pub fn subscribe_log<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&EventEntry) + Send + Sync + 'static,
    {
        let id = self.next_subscription_id();
        self.log_listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe_log(&mut self, id: SubscriptionId) -> bool {
        let before = self.log_listeners.len();
        self.log_listeners.retain(|(listener, _)| *listener != id);
        self.log_listeners.len() != before
    }

    /// Subscribes to processed game events of `kind`.
    pub fn subscribe<F>(&mut self, kind: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&GameEvent) + Send + Sync + 'static,
    {
        let id = self.next_subscription_id();
        self.subscribers.push(Subscriber {
            id,
            kind: kind.to_string(),
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    fn subscribers_for(&self, kind: &str) -> Vec<GameEventCallback> {
        self.subscribers
            .iter()
            .filter(|subscriber| subscriber.kind == kind)
            .map(|subscriber| subscriber.callback.clone())
            .collect()
    }

    /// Notifies subscribers of `event` immediately, bypassing the queue.
    pub fn emit(&self, event: &GameEvent) -> usize {
        let callbacks = self.subscribers_for(&event.kind);
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    pub fn push_game_event(&mut self, event: GameEvent) {
        self.queue.push_back(event);
    }

    pub fn pending_game_events(&self) -> usize {
        self.queue.len()
    }
}

fn drain_failure(event: &GameEvent, err: &GameEventError) -> LogRecord {
    log::error!("[events] game event '{}' failed: {err}", event.kind);
    let record = LogRecord::new(
        EventCategory::Error,
        LogLevel::Error,
        "game_event_failed",
        err.to_string(),
    )
    .context(json!({ "kind": event.kind, "payload": event.payload }));
    match &event.source {
        Some(source) => record.source(source.clone()),
        None => record,
    }
}

/// Shared handle to an [`EventStack`].
///
/// Listener and subscriber callbacks run after the lock is released, so they
/// may log or queue events through the same handle.
#[derive(Clone, Default)]
pub struct EventStackHandle {
    inner: Arc<Mutex<EventStack>>,
}

impl EventStackHandle {
    pub fn new(config: EventStackConfig) -> Self {
        Self::from_stack(EventStack::new(config))
    }

    pub fn from_stack(stack: EventStack) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stack)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, EventStack> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn downgrade(&self) -> WeakEventStack {
        WeakEventStack {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn record(&self, record: LogRecord) -> Option<u64> {
        let appended = self.lock().append(record);
        let (entry, listeners) = appended?;
        for listener in &listeners {
            listener(&entry);
        }
        Some(entry.id)
    }

    pub fn debug(&self, category: EventCategory, event_type: &str, message: impl Into<String>) {
        self.record(LogRecord::new(category, LogLevel::Debug, event_type, message));
    }

    pub fn info(&self, category: EventCategory, event_type: &str, message: impl Into<String>) {
        self.record(LogRecord::new(category, LogLevel::Info, event_type, message));
    }

    pub fn warn(&self, category: EventCategory, event_type: &str, message: impl Into<String>) {
        self.record(LogRecord::new(category, LogLevel::Warn, event_type, message));
    }

    pub fn error(&self, category: EventCategory, event_type: &str, message: impl Into<String>) {
        self.record(LogRecord::new(category, LogLevel::Error, event_type, message));
    }

    pub fn push_game_event(&self, event: GameEvent) {
        self.lock().push_game_event(event);
    }

    pub fn emit(&self, event: &GameEvent) -> usize {
        let callbacks = self.lock().subscribers_for(&event.kind);
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// Dispatches the queue as it stood on entry, in FIFO order.
    ///
    /// Failures are logged under `ERROR` and do not stop the drain; successes
    /// are published to subscribers. The lock is not held while handlers run,
    /// so events they queue land in the queue again and wait for the next
    /// drain.
    pub fn process_game_events(
        &self,
        world: &mut World,
        dispatcher: &mut GameEventDispatcher,
    ) -> DrainReport {
        let pending = std::mem::take(&mut self.lock().queue);
        let mut report = DrainReport::default();
        for event in pending {
            match dispatcher.dispatch(world, &event) {
                Ok(()) => {
                    report.processed += 1;
                    self.emit(&event);
                }
                Err(err) => {
                    report.failed += 1;
                    self.record(drain_failure(&event, &err));
                }
            }
        }
        report
    }

    pub fn get_all_events(&self) -> Vec<EventEntry> {
        self.lock().get_all_events()
    }

    pub fn export_text(&self) -> String {
        self.lock().export_text()
    }
}

#[derive(Clone, Default)]
pub struct WeakEventStack {
    inner: Weak<Mutex<EventStack>>,
}

impl WeakEventStack {
    pub fn upgrade(&self) -> Option<EventStackHandle> {
        self.inner.upgrade().map(|inner| EventStackHandle { inner })
    }
}
