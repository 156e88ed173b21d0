//! Media engine capability traits.
//!
//! The core never talks to a concrete media framework. A platform adapter
//! implements [`PlaybackEngine`] for the transport and [`MediaItem`] for the
//! loaded media, and forwards property changes and item notifications as
//! [`EngineSignal`] / [`ItemSignal`] values to whoever observes them.
//!
//! Signals carry no data: the observer reads the current property value back
//! from the engine or item when a signal arrives.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Engine readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineStatus {
    #[default]
    Unknown,
    ReadyToPlay,
    Failed,
}

/// Item readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemStatus {
    #[default]
    Unknown,
    ReadyToPlay,
    Failed,
}

/// Loaded span of media, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub duration: f64,
}

impl TimeRange {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    /// Union end-point of the range (start + duration).
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Error reported by the engine or the item.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineError {
    pub domain: String,
    pub code: i64,
    pub description: String,
}

impl EngineError {
    pub fn new(domain: impl Into<String>, code: i64, description: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            description: description.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.description, self.domain, self.code)
    }
}

impl std::error::Error for EngineError {}

/// One entry of the item's network access log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccessLogEntry {
    pub uri: Option<String>,
    pub indicated_bitrate: f64,
    pub observed_bitrate: f64,
    pub stall_count: u32,
    pub bytes_transferred: u64,
}

/// One entry of the item's error log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorLogEntry {
    pub uri: Option<String>,
    pub status_code: i64,
    pub domain: String,
    pub comment: Option<String>,
}

/// Engine-level property changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineSignal {
    Status,
    Rate,
}

/// Item-level property changes and lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemSignal {
    Status,
    KeepUp,
    BufferedRanges,
    Stalled,
    TimeJumped,
    NewAccessLogEntry,
    NewErrorLogEntry,
}

pub type ItemId = u64;

/// Handle returned by `observe`, passed back to `unobserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(pub u64);

/// Handle of a periodic position sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(pub u64);

pub type EngineSink = Arc<dyn Fn(EngineSignal) + Send + Sync>;
pub type ItemSink = Arc<dyn Fn(ItemSignal) + Send + Sync>;

/// Seek completion; the flag is false when the seek was interrupted.
pub type SeekCompletion = Box<dyn FnOnce(bool) + Send>;

/// Periodic sampler callback, receives the engine time in seconds.
pub type SamplerCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Transport side of a media engine.
pub trait PlaybackEngine: Send + Sync {
    fn status(&self) -> EngineStatus;
    fn error(&self) -> Option<EngineError>;

    fn rate(&self) -> f32;
    fn set_rate(&self, rate: f32);

    fn play(&self) {
        self.set_rate(1.0);
    }

    fn pause(&self) {
        self.set_rate(0.0);
    }

    /// Current playhead, seconds. May be non-finite before the item loads.
    fn current_time(&self) -> f64;

    fn current_item(&self) -> Option<Arc<dyn MediaItem>>;
    fn replace_current_item(&self, item: Option<Arc<dyn MediaItem>>);

    /// Asynchronous seek. `completion` fires exactly once, possibly later.
    fn seek(&self, seconds: f64, completion: SeekCompletion);

    fn add_periodic_sampler(&self, interval: Duration, callback: SamplerCallback) -> SamplerId;
    fn remove_sampler(&self, id: SamplerId);

    /// Register for status and rate changes.
    fn observe(&self, sink: EngineSink) -> ObserverToken;
    fn unobserve(&self, token: ObserverToken);
}

/// Loaded media unit of an engine.
pub trait MediaItem: Send + Sync {
    fn id(&self) -> ItemId;
    fn status(&self) -> ItemStatus;
    fn error(&self) -> Option<EngineError>;
    fn is_playback_likely_to_keep_up(&self) -> bool;
    fn loaded_time_ranges(&self) -> Vec<TimeRange>;

    /// Total timeline length, seconds. Non-finite while unknown.
    fn duration(&self) -> f64;

    fn last_access_log_entry(&self) -> Option<AccessLogEntry>;
    fn last_error_log_entry(&self) -> Option<ErrorLogEntry>;

    /// Register for property changes and lifecycle notifications.
    fn observe(&self, sink: ItemSink) -> ObserverToken;
    fn unobserve(&self, token: ObserverToken);
}

impl fmt::Debug for dyn MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaItem")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}
