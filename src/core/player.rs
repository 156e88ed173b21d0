//! Per-resource playback controller with scrub/seek coordination.
//!
//! **Architecture**: one controller per media URL. It owns the engine, the
//! item it was created with, and the [`EventBus`] observing them. UI code
//! drives it through a small command API and receives state through the
//! injected [`PlayerView`].
//!
//! # Scrub state machine
//!
//! - `Idle -> Scrubbing` on `begin_scrub()`: remember the rate, pause,
//!   cancel the position sampler so it cannot fight the drag
//! - `Scrubbing -> Scrubbing` on `scrub(fraction)`: seek to
//!   `fraction * duration`, label updates immediately; drags are dropped
//!   while a seek is outstanding
//! - `Scrubbing -> Idle` on `end_scrub()`: restore the rate, re-arm the
//!   sampler. No-op when a sampler is already armed
//!
//! # Threading
//!
//! UI thread only. No lock is held while calling the engine or the view,
//! because engines may signal synchronously from inside a command and the
//! resulting event re-enters the controller.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use crate::core::engine::{MediaItem, PlaybackEngine, SamplerId};
use crate::core::error::PlaybackFault;
use crate::core::event_bus::{EventBus, SubscriptionId};
use crate::core::events::{EventKind, Payload, PlaybackEvent};
use crate::core::view::{Container, PlayerView};
use crate::settings::Settings;
use crate::utils::format_mmss;

/// Sampling interval used when the duration is unknown
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Sampler tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    /// Interval when duration or slider width is unusable
    pub default_sample_interval: Duration,
    /// Interval = factor * duration / slider width
    pub tolerance_factor: f64,
    /// Slider width assumed when the view reports none
    pub fallback_slider_width: f64,
    /// Start playback when the view is attached
    pub auto_play: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_sample_interval: DEFAULT_SAMPLE_INTERVAL,
            tolerance_factor: 0.5,
            fallback_slider_width: 0.0,
            auto_play: true,
        }
    }
}

impl From<&Settings> for ControllerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            default_sample_interval: Duration::try_from_secs_f64(settings.default_sample_interval_secs)
                .ok()
                .filter(|d| !d.is_zero())
                .unwrap_or(DEFAULT_SAMPLE_INTERVAL),
            tolerance_factor: settings.sample_tolerance_factor,
            fallback_slider_width: settings.fallback_slider_width,
            auto_play: settings.auto_play,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrubState {
    #[default]
    Idle,
    Scrubbing,
}

#[derive(Debug)]
struct SessionState {
    /// Seconds; NaN until the item is ready
    duration: f64,
    /// Last known position, seconds
    position: f64,
    scrub: ScrubState,
    restore_rate: f32,
    sampler: Option<SamplerId>,
    seeking: bool,
    stopped: bool,
    last_fault: Option<PlaybackFault>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            duration: f64::NAN,
            position: 0.0,
            scrub: ScrubState::Idle,
            restore_rate: 0.0,
            sampler: None,
            seeking: false,
            stopped: false,
            last_fault: None,
        }
    }
}

/// Playback session for one media resource.
pub struct PlaybackController {
    url: String,
    engine: Arc<dyn PlaybackEngine>,
    item: Arc<dyn MediaItem>,
    view: Arc<dyn PlayerView>,
    config: ControllerConfig,
    state: Mutex<SessionState>,
    bus: Mutex<Option<EventBus>>,
    weak_self: Weak<PlaybackController>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("url", &self.url)
            .field("state", &*self.lock_state())
            .finish()
    }
}

impl PlaybackController {
    /// Create a controller and start observing `engine`.
    ///
    /// `item` becomes the engine's current item if it has none.
    pub fn new(
        url: impl Into<String>,
        engine: Arc<dyn PlaybackEngine>,
        item: Arc<dyn MediaItem>,
        view: Arc<dyn PlayerView>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let url = url.into();
        if engine.current_item().is_none() {
            engine.replace_current_item(Some(Arc::clone(&item)));
        }

        let controller = Arc::new_cyclic(|weak: &Weak<PlaybackController>| {
            let primary_target = weak.clone();
            let bus = EventBus::attach(Arc::clone(&engine), move |event| {
                if let Some(controller) = primary_target.upgrade() {
                    controller.handle_event(event);
                }
            });

            PlaybackController {
                url,
                engine,
                item,
                view,
                config,
                state: Mutex::new(SessionState::default()),
                bus: Mutex::new(Some(bus)),
                weak_self: weak.clone(),
            }
        });

        info!("PlaybackController created for {}", controller.url);
        controller
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bus(&self) -> Option<EventBus> {
        self.bus.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // === Accessors ===

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn engine(&self) -> &Arc<dyn PlaybackEngine> {
        &self.engine
    }

    pub fn scrub_state(&self) -> ScrubState {
        self.lock_state().scrub
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrub_state() == ScrubState::Scrubbing
    }

    /// Cached duration in seconds, non-finite until the item is ready
    pub fn duration(&self) -> f64 {
        self.lock_state().duration
    }

    /// Last known position in seconds
    pub fn position(&self) -> f64 {
        self.lock_state().position
    }

    pub fn has_sampler(&self) -> bool {
        self.lock_state().sampler.is_some()
    }

    pub fn is_seeking(&self) -> bool {
        self.lock_state().seeking
    }

    pub fn is_stopped(&self) -> bool {
        self.lock_state().stopped
    }

    /// Most recent fault recorded for this session
    pub fn last_fault(&self) -> Option<PlaybackFault> {
        self.lock_state().last_fault.clone()
    }

    /// Subscribe to this session's events. None once stopped.
    pub fn subscribe<F>(&self, kind: EventKind, once: bool, callback: F) -> Option<SubscriptionId>
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.bus().map(|bus| bus.subscribe(kind, once, callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus().is_some_and(|bus| bus.unsubscribe(id))
    }

    // === Event reactions ===

    fn handle_event(&self, event: &PlaybackEvent) {
        trace!("{}: {} ({})", self.url, event.kind, event.message_or("-"));

        match event.kind {
            EventKind::EngineFailed => {
                self.record_fault(event);
                self.sync_scrubber();
                self.disable_scrubber();
                self.detach_view();
                error!(
                    "{}: engine failed ({}), no recovery for this session",
                    self.url,
                    event.message_or("unknown error")
                );
            }
            EventKind::ItemFailed => {
                self.record_fault(event);
                self.remove_sampler();
                self.sync_scrubber();
                self.disable_scrubber();
                self.detach_view();
                error!(
                    "{}: item failed ({}), no recovery for this session",
                    self.url,
                    event.message_or("unknown error")
                );
            }
            EventKind::ItemReady => {
                self.arm_on_ready();
                self.enable_scrubber();
            }
            EventKind::Stalled => {
                self.record_fault(event);
                warn!(
                    "{}: playback stalled at {}",
                    self.url,
                    format_mmss(self.engine.current_time())
                );
            }
            EventKind::LikelyToKeepUp => {
                self.view.hide_loading();
                self.view.hide_chrome();
            }
            EventKind::UnlikelyToKeepUp => {
                self.view.show_loading();
                self.view.show_chrome();
            }
            EventKind::BufferRangesChanged => {
                self.view.set_buffered_fraction(self.buffered_fraction());
            }
            EventKind::AccessLogAppended => match &event.payload {
                Some(Payload::AccessLog(entry)) => debug!(
                    "{}: access log, observed bitrate {:.0}, stalls {}",
                    self.url, entry.observed_bitrate, entry.stall_count
                ),
                _ => debug!("{}: new access log entry", self.url),
            },
            EventKind::ErrorLogAppended => match &event.payload {
                Some(Payload::ErrorLog(entry)) => warn!(
                    "{}: error log, {} {} {}",
                    self.url,
                    entry.domain,
                    entry.status_code,
                    entry.comment.as_deref().unwrap_or("")
                ),
                _ => warn!("{}: new error log entry", self.url),
            },
            EventKind::Playing | EventKind::Paused | EventKind::EngineReady | EventKind::TimeJumped => {
                debug!("{}: {}", self.url, event.kind);
            }
        }
    }

    fn record_fault(&self, event: &PlaybackEvent) {
        let position = self.engine.current_time();
        if let Some(fault) = PlaybackFault::from_event(event, position) {
            self.lock_state().last_fault = Some(fault);
        }
    }

    /// Item became ready: cache duration, report it, start sampling.
    /// While scrubbing only the duration is cached; end_scrub arms the sampler.
    fn arm_on_ready(&self) {
        let duration = self.item.duration();
        let scrubbing = {
            let mut state = self.lock_state();
            if state.stopped {
                return;
            }
            state.duration = duration;
            state.scrub == ScrubState::Scrubbing
        };
        if duration.is_finite() {
            self.view.sync_duration(duration);
        }

        self.remove_sampler();
        if scrubbing {
            debug!("{}: item ready during scrub, sampler deferred", self.url);
            return;
        }
        self.add_sampler(duration);
    }

    // === Sampling ===

    /// Sampler interval: `factor * duration / slider width`, or the default
    /// when either is unusable.
    pub fn sample_interval(&self, duration: f64) -> Duration {
        let width = match self.view.slider_width() {
            w if w > 0.0 => w,
            _ => self.config.fallback_slider_width,
        };
        if !duration.is_finite() || width <= 0.0 {
            return self.config.default_sample_interval;
        }
        Duration::try_from_secs_f64(self.config.tolerance_factor * duration / width)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(self.config.default_sample_interval)
    }

    fn add_sampler(&self, duration: f64) {
        let interval = self.sample_interval(duration);
        let target = self.weak_self.clone();
        let id = self.engine.add_periodic_sampler(
            interval,
            Arc::new(move |_time: f64| {
                if let Some(controller) = target.upgrade() {
                    controller.sync_scrubber();
                }
            }),
        );
        self.lock_state().sampler = Some(id);
        trace!("{}: sampler {:?} armed every {:?}", self.url, id, interval);
    }

    fn remove_sampler(&self) {
        let id = self.lock_state().sampler.take();
        if let Some(id) = id {
            self.engine.remove_sampler(id);
            trace!("{}: sampler {:?} removed", self.url, id);
        }
    }

    /// Push the engine position to the label and thumb.
    pub fn sync_scrubber(&self) {
        let duration = self.duration();
        if !duration.is_finite() {
            return;
        }
        let time = self.engine.current_time();
        if !time.is_finite() {
            return;
        }
        self.lock_state().position = time;
        self.view.sync_position(time);
        let fraction = if duration > 0.0 { time / duration } else { 0.0 };
        self.view.sync_slider(fraction);
    }

    pub fn enable_scrubber(&self) {
        self.view.enable_scrubber();
    }

    pub fn disable_scrubber(&self) {
        self.view.disable_scrubber();
    }

    /// End of the first loaded range as a fraction of the timeline.
    pub fn buffered_fraction(&self) -> f64 {
        let total = self.item.duration();
        let Some(first) = self.item.loaded_time_ranges().first().copied() else {
            return 0.0;
        };
        if !total.is_finite() || total <= 0.0 {
            return 0.0;
        }
        (first.end() / total).clamp(0.0, 1.0)
    }

    // === Scrubbing ===

    pub fn begin_scrub(&self) {
        let rate = self.engine.rate();
        let already_scrubbing = {
            let mut state = self.lock_state();
            if state.stopped {
                return;
            }
            let already = state.scrub == ScrubState::Scrubbing;
            if !already {
                state.restore_rate = rate;
                state.scrub = ScrubState::Scrubbing;
            }
            already
        };
        if already_scrubbing {
            // Saved rate stays; only make sure nothing samples mid-drag
            debug!("{}: begin_scrub while already scrubbing", self.url);
            self.remove_sampler();
            return;
        }
        self.engine.set_rate(0.0);
        self.remove_sampler();
        debug!("{}: scrub started (restore rate {})", self.url, rate);
    }

    /// Drag to `fraction` of the timeline. Returns true if a seek was issued.
    pub fn scrub(&self, fraction: f64) -> bool {
        if fraction.is_nan() {
            return false;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        let target = {
            let mut state = self.lock_state();
            if state.stopped {
                return false;
            }
            if state.scrub != ScrubState::Scrubbing {
                trace!("{}: drag outside of a scrub ignored", self.url);
                return false;
            }
            if state.seeking {
                trace!("{}: drag dropped, seek in flight", self.url);
                return false;
            }
            if !state.duration.is_finite() {
                return false;
            }
            let target = state.duration * fraction;
            state.seeking = true;
            state.position = target;
            target
        };

        self.view.set_seeking(true);
        self.view.sync_position(target);
        self.issue_seek(target);
        true
    }

    pub fn end_scrub(&self) {
        let (restore, duration) = {
            let mut state = self.lock_state();
            if state.stopped {
                return;
            }
            if state.sampler.is_some() {
                trace!("{}: end_scrub with sampler armed, ignored", self.url);
                return;
            }
            state.scrub = ScrubState::Idle;
            (std::mem::take(&mut state.restore_rate), state.duration)
        };

        if restore != 0.0 {
            self.engine.set_rate(restore);
        }
        self.add_sampler(duration);
        debug!("{}: scrub ended", self.url);
    }

    // === Seeking ===

    /// Programmatic seek, clamped to the known duration.
    /// Returns false while another seek is in flight.
    pub fn seek(&self, seconds: f64) -> bool {
        if !seconds.is_finite() {
            return false;
        }
        let target = {
            let mut state = self.lock_state();
            if state.stopped || state.seeking {
                return false;
            }
            let target = if state.duration.is_finite() {
                seconds.clamp(0.0, state.duration)
            } else {
                seconds.max(0.0)
            };
            state.seeking = true;
            state.position = target;
            target
        };

        self.view.set_seeking(true);
        self.view.sync_position(target);
        self.issue_seek(target);
        true
    }

    fn issue_seek(&self, target: f64) {
        let controller = self.weak_self.clone();
        self.engine.seek(
            target,
            Box::new(move |finished: bool| {
                if let Some(controller) = controller.upgrade() {
                    controller.finish_seek(finished);
                }
            }),
        );
    }

    /// Clear the seek latch, then reconcile the label with the real position.
    fn finish_seek(&self, finished: bool) {
        let stopped = {
            let mut state = self.lock_state();
            state.seeking = false;
            state.stopped
        };
        if stopped {
            trace!("{}: late seek completion after stop", self.url);
            return;
        }

        self.view.set_seeking(false);
        if finished {
            let time = self.engine.current_time();
            if time.is_finite() {
                self.lock_state().position = time;
                self.view.sync_position(time);
            }
        }
    }

    // === Transport ===

    pub fn play(&self) {
        self.engine.play();
    }

    pub fn pause(&self) {
        self.engine.pause();
    }

    /// Play/pause button: pause when playing, play otherwise.
    pub fn toggle(&self, is_playing: bool) {
        if is_playing {
            self.pause();
        } else {
            self.play();
        }
    }

    // === View lifecycle ===

    /// Show the playback view inside `container` and start playing
    /// (unless auto-play is off).
    pub fn attach_view(&self, container: &Container) {
        if self.engine.current_item().is_none() {
            self.engine.replace_current_item(Some(Arc::clone(&self.item)));
            if let Some(bus) = self.bus() {
                bus.rebind_item();
            }
        }

        if self.config.auto_play {
            self.engine.play();
        }

        if self.view.parent() == Some(container.id) {
            return;
        }
        self.view.add_to(container);
        debug!("{}: view attached to {:?}", self.url, container.id);
    }

    /// Take the view off screen and release the item; the session survives.
    pub fn detach_view(&self) {
        self.view.remove_from_parent();
        self.engine.pause();
        self.view.hide_chrome();

        self.engine.replace_current_item(None);
        if let Some(bus) = self.bus() {
            bus.rebind_item();
        }
        debug!("{}: view detached", self.url);
    }

    /// Tear down observation and sampling. The registry entry is untouched.
    pub fn stop(&self) {
        let bus = self.bus.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(bus) = bus {
            bus.detach();
        }
        self.remove_sampler();

        let mut state = self.lock_state();
        if !state.stopped {
            state.stopped = true;
            info!("{}: stopped", self.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::{EngineError, EngineStatus, ItemStatus, TimeRange};
    use crate::core::view::Rect;
    use crate::sim::{RecordingView, SimEngine, SimItem, ViewCall};

    struct Fixture {
        item: Arc<SimItem>,
        engine: Arc<SimEngine>,
        view: Arc<RecordingView>,
        controller: Arc<PlaybackController>,
    }

    fn fixture(duration: f64) -> Fixture {
        let item = SimItem::new(duration);
        let engine = SimEngine::with_item(item.clone());
        let view = RecordingView::new(200.0);
        let controller = PlaybackController::new(
            "https://cdn.example/v/1.mp4",
            engine.clone(),
            item.clone(),
            view.clone(),
            ControllerConfig::default(),
        );
        Fixture {
            item,
            engine,
            view,
            controller,
        }
    }

    fn ready(fx: &Fixture) {
        fx.engine.set_status(EngineStatus::ReadyToPlay, None);
        fx.item.set_status(ItemStatus::ReadyToPlay, None);
    }

    #[test]
    fn test_item_ready_enables_scrubber_and_arms_sampler() {
        let fx = fixture(10.0);
        fx.engine.set_status(EngineStatus::ReadyToPlay, None);
        assert!(!fx.view.scrubber_enabled());
        assert!(!fx.controller.has_sampler());

        fx.item.set_status(ItemStatus::ReadyToPlay, None);
        assert!(fx.view.scrubber_enabled());
        assert!(fx.controller.has_sampler());
        assert_eq!(fx.controller.duration(), 10.0);
        assert_eq!(fx.view.duration(), Some(10.0));
        // 0.5 * 10s / 200pt
        assert_eq!(fx.engine.sampler_intervals(), vec![Duration::from_millis(25)]);
    }

    #[test]
    fn test_item_ready_twice_keeps_one_sampler() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.item.set_status(ItemStatus::ReadyToPlay, None);
        assert_eq!(fx.engine.sampler_count(), 1);
    }

    #[test]
    fn test_scrub_cycle() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.play();
        assert_eq!(fx.engine.sampler_count(), 1);

        fx.controller.begin_scrub();
        assert_eq!(fx.controller.scrub_state(), ScrubState::Scrubbing);
        assert_eq!(fx.engine.sampler_count(), 0);
        assert_eq!(fx.engine.rate(), 0.0);

        fx.controller.end_scrub();
        assert_eq!(fx.controller.scrub_state(), ScrubState::Idle);
        assert_eq!(fx.engine.sampler_count(), 1);
        assert_eq!(fx.engine.rate(), 1.0);

        // Second end without a new begin: no duplicate sampler
        fx.controller.end_scrub();
        assert_eq!(fx.engine.sampler_count(), 1);
    }

    #[test]
    fn test_item_ready_during_scrub_defers_sampler() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.play();
        fx.controller.begin_scrub();

        // Item re-reports ready mid-drag
        fx.item.set_status(ItemStatus::ReadyToPlay, None);
        assert_eq!(fx.engine.sampler_count(), 0);
        assert!(!fx.controller.has_sampler());
        assert_eq!(fx.controller.scrub_state(), ScrubState::Scrubbing);

        fx.controller.end_scrub();
        assert_eq!(fx.controller.scrub_state(), ScrubState::Idle);
        assert_eq!(fx.engine.rate(), 1.0);
        assert_eq!(fx.engine.sampler_count(), 1);

        // The next drag cycles normally
        fx.controller.begin_scrub();
        assert_eq!(fx.engine.sampler_count(), 0);
        fx.controller.end_scrub();
        assert_eq!(fx.controller.scrub_state(), ScrubState::Idle);
        assert_eq!(fx.engine.sampler_count(), 1);
    }

    #[test]
    fn test_begin_scrub_twice_keeps_sampler_off() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.play();
        fx.controller.begin_scrub();
        fx.controller.begin_scrub();
        assert_eq!(fx.engine.sampler_count(), 0);

        fx.controller.end_scrub();
        assert_eq!(fx.engine.rate(), 1.0);
        assert_eq!(fx.engine.sampler_count(), 1);
    }

    #[test]
    fn test_duration_learned_before_item_ready() {
        let fx = fixture(f64::NAN);
        fx.item.set_duration(8.0);
        ready(&fx);
        assert_eq!(fx.controller.duration(), 8.0);
        assert_eq!(fx.view.duration(), Some(8.0));
        assert!(fx.controller.seek(20.0));
        assert_eq!(fx.engine.current_time(), 8.0);
    }

    #[test]
    fn test_end_scrub_from_paused_keeps_paused() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.pause();

        fx.controller.begin_scrub();
        fx.controller.end_scrub();
        assert_eq!(fx.engine.rate(), 0.0);
        assert!(fx.controller.has_sampler());
    }

    #[test]
    fn test_end_scrub_unknown_duration_uses_default_interval() {
        let fx = fixture(f64::NAN);
        fx.controller.begin_scrub();
        fx.controller.end_scrub();
        assert_eq!(fx.engine.sampler_intervals(), vec![DEFAULT_SAMPLE_INTERVAL]);
    }

    #[test]
    fn test_scrub_seeks_and_updates_label_optimistically() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.defer_seeks(true);

        fx.controller.begin_scrub();
        assert!(fx.controller.scrub(0.25));
        assert_eq!(fx.view.position(), Some(2.5));
        assert!(fx.controller.is_seeking());
        assert_eq!(fx.engine.pending_seek_count(), 1);

        // Overlapping drag rejected while the seek is in flight
        assert!(!fx.controller.scrub(0.75));
        assert_eq!(fx.engine.pending_seek_count(), 1);

        assert_eq!(fx.engine.complete_pending_seeks(), 1);
        assert!(!fx.controller.is_seeking());
        assert_eq!(fx.engine.current_time(), 2.5);

        assert!(fx.controller.scrub(0.75));
        fx.engine.complete_pending_seeks();
        assert_eq!(fx.view.position(), Some(7.5));
    }

    #[test]
    fn test_scrub_outside_scrub_ignored() {
        let fx = fixture(10.0);
        ready(&fx);
        assert!(!fx.controller.scrub(0.5));
        assert_eq!(fx.engine.current_time(), 0.0);
    }

    #[test]
    fn test_scrub_unknown_duration_does_not_latch() {
        let fx = fixture(f64::NAN);
        fx.controller.begin_scrub();
        assert!(!fx.controller.scrub(0.5));
        assert!(!fx.controller.is_seeking());
    }

    #[test]
    fn test_seek_reconciles_with_engine_position() {
        let fx = fixture(10.0);
        ready(&fx);
        // Engine lands on a keyframe a bit before the request
        fx.engine.set_seek_snap(1.0);

        assert!(fx.controller.seek(4.4));
        assert_eq!(fx.engine.current_time(), 4.0);
        assert_eq!(fx.view.position(), Some(4.0));
        assert_eq!(fx.controller.position(), 4.0);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let fx = fixture(10.0);
        ready(&fx);
        assert!(fx.controller.seek(42.0));
        assert_eq!(fx.engine.current_time(), 10.0);
    }

    #[test]
    fn test_buffered_fraction() {
        let fx = fixture(10.0);
        fx.item.set_loaded_ranges(vec![TimeRange::new(2.0, 3.0), TimeRange::new(8.0, 1.0)]);
        assert_eq!(fx.controller.buffered_fraction(), 0.5);
        assert_eq!(fx.view.buffered(), Some(0.5));
    }

    #[test]
    fn test_buffered_fraction_without_ranges_or_duration() {
        let fx = fixture(f64::NAN);
        assert_eq!(fx.controller.buffered_fraction(), 0.0);
        fx.item.set_loaded_ranges(vec![TimeRange::new(0.0, 3.0)]);
        assert_eq!(fx.controller.buffered_fraction(), 0.0);
    }

    #[test]
    fn test_keep_up_drives_loading() {
        let fx = fixture(10.0);
        fx.item.set_keep_up(false);
        assert!(fx.view.loading());
        assert!(fx.view.chrome_visible());
        fx.item.set_keep_up(true);
        assert!(!fx.view.loading());
        assert!(!fx.view.chrome_visible());
    }

    #[test]
    fn test_attach_view_idempotent_per_container() {
        let fx = fixture(10.0);
        let cell = Container::new(1, Rect::new(0.0, 0.0, 375.0, 667.0));

        fx.controller.attach_view(&cell);
        fx.controller.attach_view(&cell);
        assert_eq!(fx.view.parent(), Some(cell.id));
        assert_eq!(fx.view.count(|c| matches!(c, ViewCall::AddTo(_))), 1);
        assert_eq!(fx.engine.rate(), 1.0);

        let other = Container::new(2, Rect::new(0.0, 0.0, 375.0, 200.0));
        fx.controller.attach_view(&other);
        assert_eq!(fx.view.parent(), Some(other.id));
        assert_eq!(fx.view.frame(), Some(other.bounds));
    }

    #[test]
    fn test_detach_then_attach_restores_item() {
        let fx = fixture(10.0);
        let cell = Container::new(1, Rect::new(0.0, 0.0, 375.0, 667.0));
        fx.controller.attach_view(&cell);

        fx.controller.detach_view();
        assert_eq!(fx.view.parent(), None);
        assert!(fx.engine.current_item().is_none());
        assert_eq!(fx.engine.rate(), 0.0);
        assert_eq!(fx.item.observer_count(), 0);

        fx.controller.attach_view(&cell);
        assert_eq!(fx.engine.current_item().map(|i| i.id()), Some(fx.item.id()));
        assert_eq!(fx.item.observer_count(), 1);
        assert_eq!(fx.view.parent(), Some(cell.id));

        // Item events flow again after re-attach
        fx.item.set_status(ItemStatus::ReadyToPlay, None);
        assert!(fx.view.scrubber_enabled());
    }

    #[test]
    fn test_item_failure_is_terminal() {
        let fx = fixture(10.0);
        let cell = Container::new(1, Rect::new(0.0, 0.0, 375.0, 667.0));
        fx.controller.attach_view(&cell);
        ready(&fx);
        assert!(fx.controller.has_sampler());

        fx.item.set_status(
            ItemStatus::Failed,
            Some(EngineError::new("AVFoundationErrorDomain", -11828, "Cannot Open")),
        );

        assert!(!fx.controller.has_sampler());
        assert!(!fx.view.scrubber_enabled());
        assert_eq!(fx.view.parent(), None);
        assert!(fx.engine.current_item().is_none());
        assert_eq!(
            fx.controller.last_fault(),
            Some(PlaybackFault::ItemFailure("Cannot Open".into()))
        );
    }

    #[test]
    fn test_engine_failure_is_terminal() {
        let fx = fixture(10.0);
        let cell = Container::new(1, Rect::new(0.0, 0.0, 375.0, 667.0));
        fx.controller.attach_view(&cell);

        fx.engine.set_status(EngineStatus::Failed, None);
        assert!(!fx.view.scrubber_enabled());
        assert_eq!(fx.view.parent(), None);
        assert!(fx.controller.last_fault().is_some_and(|f| f.is_terminal()));
    }

    #[test]
    fn test_sampler_syncs_scrubber() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.play();
        fx.engine.tick(2.0);
        assert_eq!(fx.view.position(), Some(2.0));
        assert_eq!(fx.view.slider(), Some(0.2));
    }

    #[test]
    fn test_late_seek_completion_after_stop_is_noop() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.defer_seeks(true);
        fx.controller.begin_scrub();
        assert!(fx.controller.scrub(0.5));

        fx.controller.stop();
        assert!(fx.controller.is_stopped());
        let calls_before = fx.view.calls().len();

        assert_eq!(fx.engine.complete_pending_seeks(), 1);
        assert!(!fx.controller.is_seeking());
        assert_eq!(fx.view.calls().len(), calls_before);
    }

    #[test]
    fn test_stopped_session_rejects_scrub_and_seek() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.defer_seeks(true);
        fx.controller.begin_scrub();
        fx.controller.stop();

        assert!(!fx.controller.scrub(0.5));
        assert!(!fx.controller.seek(3.0));
        assert!(!fx.controller.is_seeking());
        assert!(!fx.view.seeking());
        assert_eq!(fx.engine.pending_seek_count(), 0);
    }

    #[test]
    fn test_late_seek_completion_after_drop_is_noop() {
        let fx = fixture(10.0);
        ready(&fx);
        fx.engine.defer_seeks(true);
        assert!(fx.controller.seek(3.0));

        let Fixture { engine, controller, .. } = fx;
        controller.stop();
        drop(controller);
        assert_eq!(engine.complete_pending_seeks(), 1);
    }

    #[test]
    fn test_stop_tears_down_bus_and_sampler() {
        let fx = fixture(10.0);
        ready(&fx);
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        assert!(
            fx.controller
                .subscribe(EventKind::Stalled, false, move |_| {
                    c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                })
                .is_some()
        );

        fx.controller.stop();
        fx.controller.stop();

        assert_eq!(fx.engine.observer_count(), 0);
        assert_eq!(fx.item.observer_count(), 0);
        assert_eq!(fx.engine.sampler_count(), 0);
        fx.item.stall();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(fx.controller.subscribe(EventKind::Stalled, false, |_| {}).is_none());
    }

    #[test]
    fn test_toggle() {
        let fx = fixture(10.0);
        fx.controller.toggle(false);
        assert_eq!(fx.engine.rate(), 1.0);
        fx.controller.toggle(true);
        assert_eq!(fx.engine.rate(), 0.0);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            default_sample_interval_secs: 0.25,
            sample_tolerance_factor: 1.0,
            ..Settings::default()
        };
        let config = ControllerConfig::from(&settings);
        assert_eq!(config.default_sample_interval, Duration::from_millis(250));
        assert_eq!(config.tolerance_factor, 1.0);
    }
}
