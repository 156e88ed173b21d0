//! UI collaborator seam.
//!
//! The core never lays anything out. It tells a [`PlayerView`] where to be
//! and what to show; the UI layer renders it.

/// Axis-aligned rectangle in points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn mid_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn mid_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Half-open containment, matching how list viewports clip.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Same size, origin at zero.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub u64);

/// A host view the playback view can be inserted into (e.g. a list cell).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Container {
    pub id: ContainerId,
    pub bounds: Rect,
}

impl Container {
    pub fn new(id: u64, bounds: Rect) -> Self {
        Self {
            id: ContainerId(id),
            bounds,
        }
    }
}

/// Renderable playback view plus its scrubber chrome.
///
/// All methods are called on the UI thread.
pub trait PlayerView: Send + Sync {
    /// Container the view is currently a child of.
    fn parent(&self) -> Option<ContainerId>;
    /// Insert as a child of `container`, sized to its bounds.
    fn add_to(&self, container: &Container);
    fn remove_from_parent(&self);

    /// Width of the scrubber track in points; drives sampler granularity.
    fn slider_width(&self) -> f64;

    fn show_loading(&self);
    fn hide_loading(&self);
    fn show_chrome(&self);
    fn hide_chrome(&self);

    /// Ready to interact.
    fn enable_scrubber(&self);
    fn disable_scrubber(&self);

    /// Position label, seconds.
    fn sync_position(&self, seconds: f64);
    /// Scrubber thumb, normalized 0..=1.
    fn sync_slider(&self, fraction: f64);
    /// Duration label, seconds.
    fn sync_duration(&self, seconds: f64);
    /// Secondary "buffered" track, normalized 0..=1.
    fn set_buffered_fraction(&self, fraction: f64);

    fn set_seeking(&self, _seeking: bool) {}
}
