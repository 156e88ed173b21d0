//! Normalized playback events.
//!
//! Every raw engine or item signal maps to at most one [`PlaybackEvent`].

use crate::core::engine::{AccessLogEntry, EngineError, ErrorLogEntry};

/// Kind of a playback event, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Engine ===
    EngineFailed,
    EngineReady,
    Playing,
    Paused,

    // === Item ===
    ItemFailed,
    ItemReady,
    Stalled,
    TimeJumped,
    AccessLogAppended,
    ErrorLogAppended,
    LikelyToKeepUp,
    UnlikelyToKeepUp,
    BufferRangesChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::EngineFailed,
        EventKind::EngineReady,
        EventKind::Playing,
        EventKind::Paused,
        EventKind::ItemFailed,
        EventKind::ItemReady,
        EventKind::Stalled,
        EventKind::TimeJumped,
        EventKind::AccessLogAppended,
        EventKind::ErrorLogAppended,
        EventKind::LikelyToKeepUp,
        EventKind::UnlikelyToKeepUp,
        EventKind::BufferRangesChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::EngineFailed => "engine_failed",
            EventKind::EngineReady => "engine_ready",
            EventKind::Playing => "playing",
            EventKind::Paused => "paused",
            EventKind::ItemFailed => "item_failed",
            EventKind::ItemReady => "item_ready",
            EventKind::Stalled => "stalled",
            EventKind::TimeJumped => "time_jumped",
            EventKind::AccessLogAppended => "access_log_appended",
            EventKind::ErrorLogAppended => "error_log_appended",
            EventKind::LikelyToKeepUp => "likely_to_keep_up",
            EventKind::UnlikelyToKeepUp => "unlikely_to_keep_up",
            EventKind::BufferRangesChanged => "buffer_ranges_changed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic payload attached to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Error(EngineError),
    AccessLog(AccessLogEntry),
    ErrorLog(ErrorLogEntry),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub kind: EventKind,
    pub message: Option<String>,
    pub payload: Option<Payload>,
}

impl PlaybackEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            message: None,
            payload: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_payload(mut self, payload: Option<Payload>) -> Self {
        self.payload = payload;
        self
    }

    /// Error carried by failure events, if any.
    pub fn error(&self) -> Option<&EngineError> {
        match &self.payload {
            Some(Payload::Error(err)) => Some(err),
            _ => None,
        }
    }

    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(fallback)
    }
}
