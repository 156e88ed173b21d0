//! Core playback modules - engine seam, events, bus, controller, registry
//!
//! These modules form the player core, independent of any UI toolkit or
//! media framework.

pub mod engine;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod player;
pub mod registry;
pub mod view;

// Re-exports for convenience
pub use error::PlaybackFault;
pub use event_bus::{EventBus, SubscriptionId};
pub use events::{EventKind, PlaybackEvent};
pub use player::{ControllerConfig, PlaybackController, ScrubState};
pub use registry::ControllerRegistry;
