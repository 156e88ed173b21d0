//! FEEDPLAY - video feed player core
//!
//! Re-exports all modules for use by binary targets.

// Core (engine seam, events, controller, registry)
pub mod core;

// App modules
pub mod cli;
pub mod feed;
pub mod paths;
pub mod settings;
pub mod sim;
pub mod utils;

// Re-export commonly used types from core
pub use crate::core::engine::{MediaItem, PlaybackEngine};
pub use crate::core::event_bus::EventBus;
pub use crate::core::events::{EventKind, PlaybackEvent};
pub use crate::core::player::PlaybackController;
pub use crate::core::registry::ControllerRegistry;
pub use settings::Settings;
