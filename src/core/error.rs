//! Playback fault taxonomy.
//!
//! Engine and item failures are terminal for a session: no retry, no
//! fallback resource. Stalls and log entries are informational.

use thiserror::Error;

use crate::core::events::{EventKind, PlaybackEvent};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackFault {
    #[error("engine failed: {0}")]
    EngineFailure(String),

    #[error("item failed: {0}")]
    ItemFailure(String),

    #[error("playback stalled at {0:.2}s")]
    Stall(f64),

    #[error("{0} log entry appended")]
    LogAppended(&'static str),
}

impl PlaybackFault {
    /// Classify an event. Returns None for events that are not faults.
    pub fn from_event(event: &PlaybackEvent, position: f64) -> Option<Self> {
        let reason = || event.message_or("unknown error").to_string();
        match event.kind {
            EventKind::EngineFailed => Some(Self::EngineFailure(reason())),
            EventKind::ItemFailed => Some(Self::ItemFailure(reason())),
            EventKind::Stalled => Some(Self::Stall(position)),
            EventKind::AccessLogAppended => Some(Self::LogAppended("access")),
            EventKind::ErrorLogAppended => Some(Self::LogAppended("error")),
            _ => None,
        }
    }

    /// Terminal faults end the session's interactivity.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EngineFailure(_) | Self::ItemFailure(_))
    }
}
