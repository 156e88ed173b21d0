//! Typed event bus bridging engine and item signals to subscribers.
//!
//! Architecture:
//! - The bus observes the engine (status, rate) and its current item
//!   (status, keep-up hint, buffered ranges, lifecycle notifications)
//! - Each raw signal is normalized into at most one [`PlaybackEvent`]
//! - dispatch() calls the primary callback, then persistent subscribers,
//!   then one-shot subscribers, in that order
//!
//! Callback order: FIFO (first-subscribed, first-called) within same kind.
//! No lock is held while a callback runs, so callbacks may subscribe,
//! unsubscribe or issue engine commands that signal synchronously.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, trace};

use crate::core::engine::{
    EngineSignal, EngineStatus, ItemId, ItemSignal, ItemStatus, MediaItem, ObserverToken,
    PlaybackEngine,
};
use crate::core::events::{EventKind, Payload, PlaybackEvent};

/// Subscriber callback
pub type Callback = Arc<dyn Fn(&PlaybackEvent) + Send + Sync>;

/// Identity of a single subscription, used for explicit unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Kind -> ordered callbacks
#[derive(Default)]
struct SubscriptionTable {
    entries: HashMap<EventKind, Vec<(SubscriptionId, Callback)>>,
}

impl SubscriptionTable {
    fn push(&mut self, kind: EventKind, id: SubscriptionId, callback: Callback) {
        self.entries.entry(kind).or_default().push((id, callback));
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Callback> {
        self.entries
            .get(&kind)
            .map(|cbs| cbs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    fn take(&mut self, kind: EventKind) -> Vec<Callback> {
        self.entries
            .remove(&kind)
            .map(|cbs| cbs.into_iter().map(|(_, cb)| cb).collect())
            .unwrap_or_default()
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let mut found = false;
        self.entries.retain(|_, cbs| {
            let before = cbs.len();
            cbs.retain(|(sub, _)| *sub != id);
            found |= cbs.len() != before;
            !cbs.is_empty()
        });
        found
    }

    fn count(&self, kind: EventKind) -> usize {
        self.entries.get(&kind).map(|cbs| cbs.len()).unwrap_or(0)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Raw signal registrations held by the bus
#[derive(Default)]
struct Sources {
    engine: Option<ObserverToken>,
    item: Option<(Arc<dyn MediaItem>, ObserverToken)>,
}

struct BusInner {
    engine: Arc<dyn PlaybackEngine>,
    primary: Callback,
    on: Mutex<SubscriptionTable>,
    once: Mutex<SubscriptionTable>,
    sources: Mutex<Sources>,
    next_id: AtomicU64,
    detached: AtomicBool,
}

/// Event bus for one engine and its current item.
///
/// Cheap to clone; clones share the same tables and registrations.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("detached", &self.is_detached())
            .field("item", &self.observed_item())
            .finish()
    }
}

impl EventBus {
    /// Start observing `engine` and its current item.
    ///
    /// `primary` is invoked first for every event, before any subscriber.
    pub fn attach<F>(engine: Arc<dyn PlaybackEngine>, primary: F) -> Self
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        let bus = Self {
            inner: Arc::new(BusInner {
                engine,
                primary: Arc::new(primary),
                on: Mutex::new(SubscriptionTable::default()),
                once: Mutex::new(SubscriptionTable::default()),
                sources: Mutex::new(Sources::default()),
                next_id: AtomicU64::new(1),
                detached: AtomicBool::new(false),
            }),
        };

        let weak = Arc::downgrade(&bus.inner);
        let token = bus.inner.engine.observe(Arc::new(move |signal: EngineSignal| {
            if let Some(inner) = weak.upgrade() {
                inner.on_engine_signal(signal);
            }
        }));
        bus.inner.lock_sources().engine = Some(token);

        bus.rebind_item();
        bus
    }

    // ========== Subscriptions ==========

    /// Register `callback` for `kind`.
    ///
    /// `once` callbacks fire on the next event of that kind only.
    pub fn subscribe<F>(&self, kind: EventKind, once: bool, callback: F) -> SubscriptionId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let table = if once { &self.inner.once } else { &self.inner.on };
        table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(kind, id, Arc::new(callback));
        trace!("EventBus: subscribed {:?} to {} (once={})", id, kind, once);
        id
    }

    /// Persistent subscription
    pub fn on<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, false, callback)
    }

    /// One-shot subscription
    pub fn once<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, true, callback)
    }

    /// Remove one subscription. Returns false if it already fired or was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed_on = self.inner.on.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
        let removed_once = self.inner.once.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
        removed_on || removed_once
    }

    /// Number of persistent subscribers for `kind`
    pub fn persistent_count(&self, kind: EventKind) -> usize {
        self.inner.on.lock().unwrap_or_else(|e| e.into_inner()).count(kind)
    }

    /// Number of pending one-shot subscribers for `kind`
    pub fn once_count(&self, kind: EventKind) -> usize {
        self.inner.once.lock().unwrap_or_else(|e| e.into_inner()).count(kind)
    }

    // ========== Sources ==========

    /// Re-establish item-level observation on the engine's current item.
    ///
    /// Call after the engine's item was replaced. Engine-level observation
    /// is left untouched. With no current item, item observation just stops.
    pub fn rebind_item(&self) {
        if self.is_detached() {
            return;
        }

        let current = self.inner.engine.current_item();
        let previous = {
            let mut sources = self.inner.lock_sources();
            if let (Some((old, _)), Some(new)) = (&sources.item, &current)
                && old.id() == new.id()
            {
                return;
            }
            sources.item.take()
        };

        if let Some((old, token)) = previous {
            old.unobserve(token);
            trace!("EventBus: stopped observing item {}", old.id());
        }

        if let Some(item) = current {
            let item_id = item.id();
            let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
            let token = item.observe(Arc::new(move |signal: ItemSignal| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_item_signal(item_id, signal);
                }
            }));
            self.inner.lock_sources().item = Some((item, token));
            trace!("EventBus: observing item {}", item_id);
        }
    }

    /// Unregister from every signal source and drop all subscriptions.
    ///
    /// Safe to call any number of times.
    pub fn detach(&self) {
        if self.inner.detached.swap(true, Ordering::SeqCst) {
            return;
        }

        let sources = std::mem::take(&mut *self.inner.lock_sources());
        if let Some(token) = sources.engine {
            self.inner.engine.unobserve(token);
        }
        if let Some((item, token)) = sources.item {
            item.unobserve(token);
        }

        self.inner.on.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.inner.once.lock().unwrap_or_else(|e| e.into_inner()).clear();
        debug!("EventBus detached");
    }

    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::SeqCst)
    }

    /// Id of the item currently observed
    pub fn observed_item(&self) -> Option<ItemId> {
        self.inner.lock_sources().item.as_ref().map(|(item, _)| item.id())
    }
}

impl BusInner {
    fn lock_sources(&self) -> std::sync::MutexGuard<'_, Sources> {
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_engine_signal(&self, signal: EngineSignal) {
        let event = match signal {
            EngineSignal::Status => match self.engine.status() {
                EngineStatus::ReadyToPlay => {
                    Some(PlaybackEvent::new(EventKind::EngineReady).with_message("Player ready to play"))
                }
                EngineStatus::Failed => Some(failure_event(EventKind::EngineFailed, self.engine.error())),
                EngineStatus::Unknown => None,
            },
            EngineSignal::Rate => {
                let rate = self.engine.rate();
                if rate == 0.0 {
                    Some(PlaybackEvent::new(EventKind::Paused).with_message("Paused"))
                } else if rate == 1.0 {
                    Some(PlaybackEvent::new(EventKind::Playing).with_message("Playing"))
                } else {
                    trace!("EventBus: rate {} has no event", rate);
                    None
                }
            }
        };

        if let Some(event) = event {
            self.dispatch(event);
        }
    }

    fn on_item_signal(&self, item_id: ItemId, signal: ItemSignal) {
        let item = match &self.lock_sources().item {
            Some((item, _)) if item.id() == item_id => Arc::clone(item),
            _ => {
                trace!("EventBus: ignoring {:?} from stale item {}", signal, item_id);
                return;
            }
        };

        let event = match signal {
            ItemSignal::Status => match item.status() {
                ItemStatus::ReadyToPlay => {
                    Some(PlaybackEvent::new(EventKind::ItemReady).with_message("Item ready to play"))
                }
                ItemStatus::Failed => Some(failure_event(EventKind::ItemFailed, item.error())),
                ItemStatus::Unknown => {
                    debug!("EventBus: item {} reported unhandled status", item_id);
                    None
                }
            },
            ItemSignal::KeepUp => Some(if item.is_playback_likely_to_keep_up() {
                PlaybackEvent::new(EventKind::LikelyToKeepUp)
                    .with_message("Current item says playback is likely to keep up")
            } else {
                PlaybackEvent::new(EventKind::UnlikelyToKeepUp)
                    .with_message("Current item says playback is unlikely to keep up")
            }),
            ItemSignal::BufferedRanges => Some(
                PlaybackEvent::new(EventKind::BufferRangesChanged)
                    .with_message("Current item loaded more time ranges"),
            ),
            ItemSignal::Stalled => {
                Some(PlaybackEvent::new(EventKind::Stalled).with_message("Playback stalled"))
            }
            ItemSignal::TimeJumped => {
                Some(PlaybackEvent::new(EventKind::TimeJumped).with_message("Time jumped"))
            }
            ItemSignal::NewAccessLogEntry => Some(
                PlaybackEvent::new(EventKind::AccessLogAppended)
                    .with_message("Access log")
                    .with_payload(item.last_access_log_entry().map(Payload::AccessLog)),
            ),
            ItemSignal::NewErrorLogEntry => Some(
                PlaybackEvent::new(EventKind::ErrorLogAppended)
                    .with_message("Error log")
                    .with_payload(item.last_error_log_entry().map(Payload::ErrorLog)),
            ),
        };

        if let Some(event) = event {
            self.dispatch(event);
        }
    }

    fn dispatch(&self, event: PlaybackEvent) {
        if self.detached.load(Ordering::SeqCst) {
            trace!("EventBus: dropping {} after detach", event.kind);
            return;
        }

        // One-shots leave the table before anything runs, so a nested
        // dispatch of the same kind cannot fire them twice.
        let once = self.once.lock().unwrap_or_else(|e| e.into_inner()).take(event.kind);
        let on = self.on.lock().unwrap_or_else(|e| e.into_inner()).snapshot(event.kind);

        trace!(
            "EventBus: dispatch {} (persistent={}, once={})",
            event.kind,
            on.len(),
            once.len()
        );

        (self.primary)(&event);
        for cb in on {
            cb(&event);
        }
        for cb in once {
            cb(&event);
        }
    }
}

fn failure_event(kind: EventKind, error: Option<crate::core::engine::EngineError>) -> PlaybackEvent {
    let message = error.as_ref().map(|e| e.description.clone());
    PlaybackEvent {
        kind,
        message,
        payload: error.map(Payload::Error),
    }
}
