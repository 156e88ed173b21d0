//! In-memory engine, item and view.
//!
//! Signals are delivered synchronously on the calling thread, the clock only
//! moves on [`SimEngine::tick`], and seeks can be held back to exercise
//! late completions. Used by the demo binary and by tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, trace};

use crate::core::engine::{
    AccessLogEntry, EngineError, EngineSignal, EngineSink, EngineStatus, ErrorLogEntry, ItemId, ItemSignal,
    ItemSink, ItemStatus, MediaItem, ObserverToken, PlaybackEngine, SamplerCallback, SamplerId, SeekCompletion,
    TimeRange,
};
use crate::core::view::{Container, ContainerId, PlayerView, Rect};
use crate::utils::format_mmss;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Token-keyed sink list; emit() snapshots before calling out.
struct Observers<S> {
    sinks: Mutex<Vec<(ObserverToken, S)>>,
    next: AtomicU64,
}

impl<S: Clone> Observers<S> {
    fn new() -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
            next: AtomicU64::new(1),
        }
    }

    fn add(&self, sink: S) -> ObserverToken {
        let token = ObserverToken(self.next.fetch_add(1, Ordering::Relaxed));
        lock(&self.sinks).push((token, sink));
        token
    }

    fn remove(&self, token: ObserverToken) {
        lock(&self.sinks).retain(|(t, _)| *t != token);
    }

    fn snapshot(&self) -> Vec<S> {
        lock(&self.sinks).iter().map(|(_, s)| s.clone()).collect()
    }

    fn len(&self) -> usize {
        lock(&self.sinks).len()
    }
}

// ============================================================================
// SimItem
// ============================================================================

#[derive(Debug)]
struct ItemState {
    status: ItemStatus,
    error: Option<EngineError>,
    keep_up: bool,
    ranges: Vec<TimeRange>,
    duration: f64,
    access_log: Vec<AccessLogEntry>,
    error_log: Vec<ErrorLogEntry>,
}

pub struct SimItem {
    id: ItemId,
    state: Mutex<ItemState>,
    observers: Observers<ItemSink>,
}

impl SimItem {
    /// New item of `duration` seconds (NaN for "not known yet").
    pub fn new(duration: f64) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(ItemState {
                status: ItemStatus::Unknown,
                error: None,
                keep_up: false,
                ranges: Vec::new(),
                duration,
                access_log: Vec::new(),
                error_log: Vec::new(),
            }),
            observers: Observers::new(),
        })
    }

    fn emit(&self, signal: ItemSignal) {
        trace!("SimItem {}: {:?}", self.id, signal);
        for sink in self.observers.snapshot() {
            sink(signal);
        }
    }

    pub fn set_status(&self, status: ItemStatus, error: Option<EngineError>) {
        {
            let mut state = lock(&self.state);
            state.status = status;
            state.error = error;
        }
        self.emit(ItemSignal::Status);
    }

    pub fn set_duration(&self, duration: f64) {
        lock(&self.state).duration = duration;
    }

    pub fn set_keep_up(&self, likely: bool) {
        lock(&self.state).keep_up = likely;
        self.emit(ItemSignal::KeepUp);
    }

    pub fn set_loaded_ranges(&self, ranges: Vec<TimeRange>) {
        lock(&self.state).ranges = ranges;
        self.emit(ItemSignal::BufferedRanges);
    }

    pub fn stall(&self) {
        self.emit(ItemSignal::Stalled);
    }

    pub fn jump_time(&self) {
        self.emit(ItemSignal::TimeJumped);
    }

    pub fn push_access_log(&self, entry: AccessLogEntry) {
        lock(&self.state).access_log.push(entry);
        self.emit(ItemSignal::NewAccessLogEntry);
    }

    pub fn push_error_log(&self, entry: ErrorLogEntry) {
        lock(&self.state).error_log.push(entry);
        self.emit(ItemSignal::NewErrorLogEntry);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl MediaItem for SimItem {
    fn id(&self) -> ItemId {
        self.id
    }

    fn status(&self) -> ItemStatus {
        lock(&self.state).status
    }

    fn error(&self) -> Option<EngineError> {
        lock(&self.state).error.clone()
    }

    fn is_playback_likely_to_keep_up(&self) -> bool {
        lock(&self.state).keep_up
    }

    fn loaded_time_ranges(&self) -> Vec<TimeRange> {
        lock(&self.state).ranges.clone()
    }

    fn duration(&self) -> f64 {
        lock(&self.state).duration
    }

    fn last_access_log_entry(&self) -> Option<AccessLogEntry> {
        lock(&self.state).access_log.last().cloned()
    }

    fn last_error_log_entry(&self) -> Option<ErrorLogEntry> {
        lock(&self.state).error_log.last().cloned()
    }

    fn observe(&self, sink: ItemSink) -> ObserverToken {
        self.observers.add(sink)
    }

    fn unobserve(&self, token: ObserverToken) {
        self.observers.remove(token);
    }
}

// ============================================================================
// SimEngine
// ============================================================================

struct Sampler {
    id: SamplerId,
    interval: Duration,
    callback: SamplerCallback,
}

struct PendingSeek {
    target: f64,
    completion: SeekCompletion,
}

struct EngineState {
    status: EngineStatus,
    error: Option<EngineError>,
    rate: f32,
    time: f64,
    item: Option<Arc<dyn MediaItem>>,
    samplers: Vec<Sampler>,
    next_sampler: u64,
    pending: Vec<PendingSeek>,
    defer_seeks: bool,
    /// Seek granularity in seconds (keyframe spacing); 0 seeks exactly
    seek_snap: f64,
}

pub struct SimEngine {
    state: Mutex<EngineState>,
    observers: Observers<EngineSink>,
}

impl SimEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState {
                status: EngineStatus::Unknown,
                error: None,
                rate: 0.0,
                time: 0.0,
                item: None,
                samplers: Vec::new(),
                next_sampler: 1,
                pending: Vec::new(),
                defer_seeks: false,
                seek_snap: 0.0,
            }),
            observers: Observers::new(),
        })
    }

    pub fn with_item(item: Arc<SimItem>) -> Arc<Self> {
        let engine = Self::new();
        lock(&engine.state).item = Some(item as Arc<dyn MediaItem>);
        engine
    }

    fn emit(&self, signal: EngineSignal) {
        for sink in self.observers.snapshot() {
            sink(signal);
        }
    }

    pub fn set_status(&self, status: EngineStatus, error: Option<EngineError>) {
        {
            let mut state = lock(&self.state);
            state.status = status;
            state.error = error;
        }
        self.emit(EngineSignal::Status);
    }

    /// Hold seek completions until [`complete_pending_seeks`](Self::complete_pending_seeks).
    pub fn defer_seeks(&self, defer: bool) {
        lock(&self.state).defer_seeks = defer;
    }

    pub fn set_seek_snap(&self, seconds: f64) {
        lock(&self.state).seek_snap = seconds.max(0.0);
    }

    /// Land every held seek and fire its completion. Returns how many fired.
    pub fn complete_pending_seeks(&self) -> usize {
        let pending = std::mem::take(&mut lock(&self.state).pending);
        let count = pending.len();
        for seek in pending {
            self.land(seek.target);
            (seek.completion)(true);
        }
        count
    }

    pub fn pending_seek_count(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Advance the clock by `dt` seconds at the current rate, then fire samplers.
    pub fn tick(&self, dt: f64) {
        let (time, callbacks) = {
            let mut state = lock(&self.state);
            let advanced = state.time + dt * state.rate as f64;
            state.time = clamp_to_item(advanced, state.item.as_deref());
            let callbacks: Vec<SamplerCallback> = state.samplers.iter().map(|s| Arc::clone(&s.callback)).collect();
            (state.time, callbacks)
        };
        for cb in callbacks {
            cb(time);
        }
    }

    pub fn sampler_count(&self) -> usize {
        lock(&self.state).samplers.len()
    }

    pub fn sampler_intervals(&self) -> Vec<Duration> {
        lock(&self.state).samplers.iter().map(|s| s.interval).collect()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn land(&self, target: f64) {
        let mut state = lock(&self.state);
        let snapped = if state.seek_snap > 0.0 {
            (target / state.seek_snap).floor() * state.seek_snap
        } else {
            target
        };
        state.time = clamp_to_item(snapped, state.item.as_deref());
        trace!("SimEngine: landed at {}", format_mmss(state.time));
    }
}

fn clamp_to_item(time: f64, item: Option<&dyn MediaItem>) -> f64 {
    let time = time.max(0.0);
    match item.map(|i| i.duration()) {
        Some(d) if d.is_finite() => time.min(d),
        _ => time,
    }
}

impl PlaybackEngine for SimEngine {
    fn status(&self) -> EngineStatus {
        lock(&self.state).status
    }

    fn error(&self) -> Option<EngineError> {
        lock(&self.state).error.clone()
    }

    fn rate(&self) -> f32 {
        lock(&self.state).rate
    }

    fn set_rate(&self, rate: f32) {
        lock(&self.state).rate = rate;
        self.emit(EngineSignal::Rate);
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).time
    }

    fn current_item(&self) -> Option<Arc<dyn MediaItem>> {
        lock(&self.state).item.clone()
    }

    fn replace_current_item(&self, item: Option<Arc<dyn MediaItem>>) {
        let mut state = lock(&self.state);
        debug!(
            "SimEngine: current item {:?} -> {:?}",
            state.item.as_ref().map(|i| i.id()),
            item.as_ref().map(|i| i.id())
        );
        state.item = item;
    }

    /// A newer seek interrupts a held one, whose completion gets `false`.
    fn seek(&self, seconds: f64, completion: SeekCompletion) {
        let interrupted = {
            let mut state = lock(&self.state);
            if state.defer_seeks {
                let interrupted = std::mem::take(&mut state.pending);
                state.pending.push(PendingSeek {
                    target: seconds,
                    completion,
                });
                interrupted
            } else {
                drop(state);
                self.land(seconds);
                completion(true);
                return;
            }
        };
        for seek in interrupted {
            (seek.completion)(false);
        }
    }

    fn add_periodic_sampler(&self, interval: Duration, callback: SamplerCallback) -> SamplerId {
        let mut state = lock(&self.state);
        let id = SamplerId(state.next_sampler);
        state.next_sampler += 1;
        state.samplers.push(Sampler { id, interval, callback });
        id
    }

    fn remove_sampler(&self, id: SamplerId) {
        lock(&self.state).samplers.retain(|s| s.id != id);
    }

    fn observe(&self, sink: EngineSink) -> ObserverToken {
        self.observers.add(sink)
    }

    fn unobserve(&self, token: ObserverToken) {
        self.observers.remove(token);
    }
}

// ============================================================================
// RecordingView
// ============================================================================

/// Every call a controller made on a [`RecordingView`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCall {
    AddTo(ContainerId),
    RemoveFromParent,
    ShowLoading,
    HideLoading,
    ShowChrome,
    HideChrome,
    EnableScrubber,
    DisableScrubber,
    SyncPosition(f64),
    SyncSlider(f64),
    SyncDuration(f64),
    SetBuffered(f64),
    SetSeeking(bool),
}

#[derive(Debug, Default)]
struct ViewState {
    parent: Option<ContainerId>,
    frame: Option<Rect>,
    loading: bool,
    chrome: bool,
    scrubber_enabled: bool,
    seeking: bool,
    position: Option<f64>,
    slider: Option<f64>,
    duration: Option<f64>,
    buffered: Option<f64>,
}

/// View that keeps its state in memory and records each call.
#[derive(Debug)]
pub struct RecordingView {
    slider_width: f64,
    state: Mutex<ViewState>,
    calls: Mutex<Vec<ViewCall>>,
}

impl RecordingView {
    pub fn new(slider_width: f64) -> Arc<Self> {
        Arc::new(Self {
            slider_width,
            state: Mutex::new(ViewState::default()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, call: ViewCall, apply: impl FnOnce(&mut ViewState)) {
        apply(&mut lock(&self.state));
        lock(&self.calls).push(call);
    }

    pub fn calls(&self) -> Vec<ViewCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, pred: impl Fn(&ViewCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    pub fn frame(&self) -> Option<Rect> {
        lock(&self.state).frame
    }

    pub fn loading(&self) -> bool {
        lock(&self.state).loading
    }

    pub fn chrome_visible(&self) -> bool {
        lock(&self.state).chrome
    }

    pub fn scrubber_enabled(&self) -> bool {
        lock(&self.state).scrubber_enabled
    }

    pub fn seeking(&self) -> bool {
        lock(&self.state).seeking
    }

    pub fn position(&self) -> Option<f64> {
        lock(&self.state).position
    }

    pub fn slider(&self) -> Option<f64> {
        lock(&self.state).slider
    }

    pub fn duration(&self) -> Option<f64> {
        lock(&self.state).duration
    }

    pub fn buffered(&self) -> Option<f64> {
        lock(&self.state).buffered
    }

    /// "MM:SS / MM:SS" as the scrubber labels would read.
    pub fn labels(&self) -> String {
        let state = lock(&self.state);
        format!(
            "{} / {}",
            format_mmss(state.position.unwrap_or(0.0)),
            format_mmss(state.duration.unwrap_or(0.0))
        )
    }
}

impl PlayerView for RecordingView {
    fn parent(&self) -> Option<ContainerId> {
        lock(&self.state).parent
    }

    fn add_to(&self, container: &Container) {
        self.record(ViewCall::AddTo(container.id), |s| {
            s.parent = Some(container.id);
            s.frame = Some(container.bounds.bounds());
        });
    }

    fn remove_from_parent(&self) {
        self.record(ViewCall::RemoveFromParent, |s| {
            s.parent = None;
            s.frame = None;
        });
    }

    fn slider_width(&self) -> f64 {
        self.slider_width
    }

    fn show_loading(&self) {
        self.record(ViewCall::ShowLoading, |s| s.loading = true);
    }

    fn hide_loading(&self) {
        self.record(ViewCall::HideLoading, |s| s.loading = false);
    }

    fn show_chrome(&self) {
        self.record(ViewCall::ShowChrome, |s| s.chrome = true);
    }

    fn hide_chrome(&self) {
        self.record(ViewCall::HideChrome, |s| s.chrome = false);
    }

    fn enable_scrubber(&self) {
        self.record(ViewCall::EnableScrubber, |s| s.scrubber_enabled = true);
    }

    fn disable_scrubber(&self) {
        self.record(ViewCall::DisableScrubber, |s| s.scrubber_enabled = false);
    }

    fn sync_position(&self, seconds: f64) {
        self.record(ViewCall::SyncPosition(seconds), |s| s.position = Some(seconds));
    }

    fn sync_slider(&self, fraction: f64) {
        self.record(ViewCall::SyncSlider(fraction), |s| s.slider = Some(fraction));
    }

    fn sync_duration(&self, seconds: f64) {
        self.record(ViewCall::SyncDuration(seconds), |s| s.duration = Some(seconds));
    }

    fn set_buffered_fraction(&self, fraction: f64) {
        self.record(ViewCall::SetBuffered(fraction), |s| s.buffered = Some(fraction));
    }

    fn set_seeking(&self, seeking: bool) {
        self.record(ViewCall::SetSeeking(seeking), |s| s.seeking = seeking);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_clamps_to_duration() {
        let engine = SimEngine::with_item(SimItem::new(3.0));
        engine.tick(1.0);
        assert_eq!(engine.current_time(), 0.0);
        engine.play();
        engine.tick(2.0);
        engine.tick(2.0);
        assert_eq!(engine.current_time(), 3.0);
    }

    #[test]
    fn test_deferred_seek_interrupted_by_newer_one() {
        let engine = SimEngine::with_item(SimItem::new(10.0));
        engine.defer_seeks(true);
        let results = Arc::new(Mutex::new(Vec::new()));

        for target in [2.0, 6.0] {
            let r = Arc::clone(&results);
            engine.seek(target, Box::new(move |finished: bool| r.lock().unwrap().push((target, finished))));
        }
        assert_eq!(*results.lock().unwrap(), vec![(2.0, false)]);
        assert_eq!(engine.pending_seek_count(), 1);

        assert_eq!(engine.complete_pending_seeks(), 1);
        assert_eq!(*results.lock().unwrap(), vec![(2.0, false), (6.0, true)]);
        assert_eq!(engine.current_time(), 6.0);
    }

    #[test]
    fn test_recording_view_labels() {
        let view = RecordingView::new(100.0);
        view.sync_duration(125.0);
        view.sync_position(61.0);
        assert_eq!(view.labels(), "01:01 / 02:05");
        assert_eq!(view.calls().len(), 2);
    }
}
