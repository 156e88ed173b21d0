//! Scrolling feed: which cell gets the playback view.
//!
//! A cell is "fully visible" when its midpoint lies inside the viewport.
//! On every scroll the controller of each fully visible cell is attached
//! to that cell and every other visible cell's controller is detached.
//! Sessions that failed terminally are left detached.
//! Scroll handling is suppressed while a screen transition runs.

use std::sync::Arc;

use log::{debug, trace};

use crate::core::player::PlaybackController;
use crate::core::registry::ControllerRegistry;
use crate::core::view::{Container, Rect};

/// One on-screen row of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedCell {
    pub url: String,
    /// Cell container; bounds are in feed content coordinates
    pub container: Container,
}

impl FeedCell {
    pub fn new(url: impl Into<String>, container: Container) -> Self {
        Self {
            url: url.into(),
            container,
        }
    }
}

/// Midpoint test: `cell` and `viewport` share the content coordinate space.
pub fn is_fully_visible(cell: &Rect, viewport: &Rect) -> bool {
    viewport.contains_point(cell.mid_x(), cell.mid_y())
}

/// Keeps controllers attached to the cells the user is looking at.
pub struct FeedSync<F> {
    registry: Arc<ControllerRegistry>,
    factory: F,
    in_transition: bool,
}

impl<F> FeedSync<F>
where
    F: Fn(&str) -> Arc<PlaybackController>,
{
    /// `factory` builds a controller for a URL the registry has not seen.
    pub fn new(registry: Arc<ControllerRegistry>, factory: F) -> Self {
        Self {
            registry,
            factory,
            in_transition: false,
        }
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    pub fn is_in_transition(&self) -> bool {
        self.in_transition
    }

    /// Cell is being configured for display: reuse or create its controller
    /// and put the view into it.
    pub fn bind_cell(&self, cell: &FeedCell) -> Arc<PlaybackController> {
        let controller = self.registry.get_or_create(&cell.url, || (self.factory)(&cell.url));
        controller.attach_view(&cell.container);
        controller
    }

    /// Scroll update. Returns the URLs whose controllers ended up attached.
    pub fn on_scroll(&self, visible: &[FeedCell], viewport: Rect) -> Vec<String> {
        if self.in_transition {
            trace!("FeedSync: scroll ignored during transition");
            return Vec::new();
        }
        self.sync_visible(visible, viewport)
    }

    /// Attach unless the session already failed for good.
    fn attach_live(controller: &PlaybackController, cell: &FeedCell) -> bool {
        if controller.last_fault().is_some_and(|f| f.is_terminal()) {
            trace!("FeedSync: {} failed, not attaching", cell.url);
            return false;
        }
        controller.attach_view(&cell.container);
        true
    }

    fn sync_visible(&self, visible: &[FeedCell], viewport: Rect) -> Vec<String> {
        let mut attached = Vec::new();
        for cell in visible {
            let Some(controller) = self.registry.get(&cell.url) else {
                continue;
            };
            if is_fully_visible(&cell.container.bounds, &viewport) {
                if Self::attach_live(&controller, cell) {
                    attached.push(cell.url.clone());
                }
            } else {
                controller.detach_view();
            }
        }
        attached
    }

    pub fn will_appear(&mut self) {
        self.in_transition = true;
    }

    /// Screen finished appearing: attach fully visible cells only.
    pub fn did_appear(&mut self, visible: &[FeedCell], viewport: Rect) -> Vec<String> {
        self.in_transition = false;
        let mut attached = Vec::new();
        for cell in visible {
            if !is_fully_visible(&cell.container.bounds, &viewport) {
                continue;
            }
            if let Some(controller) = self.registry.get(&cell.url)
                && Self::attach_live(&controller, cell)
            {
                attached.push(cell.url.clone());
            }
        }
        debug!("FeedSync: appeared with {} attached", attached.len());
        attached
    }

    /// Screen is going away: detach every visible cell.
    pub fn will_disappear(&mut self, visible: &[FeedCell]) {
        self.in_transition = true;
        self.detach_all(visible);
    }

    pub fn did_disappear(&mut self) {
        self.in_transition = false;
    }

    pub fn detach_all(&self, visible: &[FeedCell]) {
        for cell in visible {
            if let Some(controller) = self.registry.get(&cell.url) {
                controller.detach_view();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::{EngineError, ItemStatus};
    use crate::core::player::ControllerConfig;
    use crate::core::view::PlayerView;
    use crate::sim::{RecordingView, SimEngine, SimItem};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const ROW: f64 = 200.0;

    fn cells(n: usize) -> Vec<FeedCell> {
        (0..n)
            .map(|i| {
                FeedCell::new(
                    format!("https://cdn.example/{i}.mp4"),
                    Container::new(i as u64, Rect::new(0.0, i as f64 * ROW, 375.0, ROW)),
                )
            })
            .collect()
    }

    type Views = Arc<Mutex<HashMap<String, (Arc<RecordingView>, Arc<SimItem>)>>>;

    fn feed() -> (FeedSync<impl Fn(&str) -> Arc<PlaybackController>>, Views) {
        let views: Views = Arc::new(Mutex::new(HashMap::new()));
        let v = Arc::clone(&views);
        let sync = FeedSync::new(Arc::new(ControllerRegistry::default()), move |url: &str| {
            let item = SimItem::new(30.0);
            let engine = SimEngine::with_item(item.clone());
            let view = RecordingView::new(300.0);
            v.lock().unwrap().insert(url.to_string(), (view.clone(), item.clone()));
            PlaybackController::new(url, engine, item, view, ControllerConfig::default())
        });
        (sync, views)
    }

    fn parent_of(views: &Views, cell: &FeedCell) -> Option<u64> {
        views.lock().unwrap()[&cell.url].0.parent().map(|id| id.0)
    }

    fn item_of(views: &Views, cell: &FeedCell) -> Arc<SimItem> {
        Arc::clone(&views.lock().unwrap()[&cell.url].1)
    }

    #[test]
    fn test_is_fully_visible_uses_midpoint() {
        let viewport = Rect::new(0.0, 150.0, 375.0, 300.0);
        // Row 0 spans 0..200, midpoint 100: above the viewport
        assert!(!is_fully_visible(&Rect::new(0.0, 0.0, 375.0, 200.0), &viewport));
        // Row 1 spans 200..400, midpoint 300
        assert!(is_fully_visible(&Rect::new(0.0, 200.0, 375.0, 200.0), &viewport));
        // Row 2 spans 400..600, midpoint 500: below
        assert!(!is_fully_visible(&Rect::new(0.0, 400.0, 375.0, 200.0), &viewport));
    }

    #[test]
    fn test_bind_cell_reuses_controller() {
        let (sync, _) = feed();
        let rows = cells(1);
        let first = sync.bind_cell(&rows[0]);
        let second = sync.bind_cell(&rows[0]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sync.registry().len(), 1);
    }

    #[test]
    fn test_scroll_attaches_visible_detaches_rest() {
        let (sync, views) = feed();
        let rows = cells(3);
        for row in &rows {
            sync.bind_cell(row);
        }

        let attached = sync.on_scroll(&rows, Rect::new(0.0, 250.0, 375.0, 200.0));
        assert_eq!(attached, vec![rows[1].url.clone()]);
        assert_eq!(parent_of(&views, &rows[0]), None);
        assert_eq!(parent_of(&views, &rows[1]), Some(1));
        assert_eq!(parent_of(&views, &rows[2]), None);

        let playing = sync.registry().get(&rows[1].url).map(|c| c.engine().rate());
        assert_eq!(playing, Some(1.0));
        let paused = sync.registry().get(&rows[0].url).map(|c| c.engine().rate());
        assert_eq!(paused, Some(0.0));
    }

    #[test]
    fn test_scroll_ignored_during_transition() {
        let (mut sync, views) = feed();
        let rows = cells(2);
        for row in &rows {
            sync.bind_cell(row);
        }

        sync.will_appear();
        assert!(sync.on_scroll(&rows, Rect::new(0.0, 400.0, 375.0, 200.0)).is_empty());
        // Still attached from bind_cell
        assert_eq!(parent_of(&views, &rows[0]), Some(0));

        let attached = sync.did_appear(&rows, Rect::new(0.0, 0.0, 375.0, 200.0));
        assert_eq!(attached, vec![rows[0].url.clone()]);
        assert!(!sync.is_in_transition());
    }

    #[test]
    fn test_disappear_detaches_everything() {
        let (mut sync, views) = feed();
        let rows = cells(2);
        for row in &rows {
            sync.bind_cell(row);
        }

        sync.will_disappear(&rows);
        assert!(sync.is_in_transition());
        assert_eq!(parent_of(&views, &rows[0]), None);
        assert_eq!(parent_of(&views, &rows[1]), None);

        sync.did_disappear();
        assert!(!sync.is_in_transition());
    }

    #[test]
    fn test_failed_session_stays_detached() {
        let (mut sync, views) = feed();
        let rows = cells(2);
        for row in &rows {
            sync.bind_cell(row);
        }

        item_of(&views, &rows[0]).set_status(
            ItemStatus::Failed,
            Some(EngineError::new("NSURLErrorDomain", -1100, "File not found")),
        );
        assert_eq!(parent_of(&views, &rows[0]), None);

        let viewport = Rect::new(0.0, 0.0, 375.0, 400.0);
        let attached = sync.on_scroll(&rows, viewport);
        assert_eq!(attached, vec![rows[1].url.clone()]);
        assert_eq!(parent_of(&views, &rows[0]), None);
        assert_eq!(parent_of(&views, &rows[1]), Some(1));

        sync.will_appear();
        let attached = sync.did_appear(&rows, viewport);
        assert_eq!(attached, vec![rows[1].url.clone()]);
        assert_eq!(parent_of(&views, &rows[0]), None);
    }

    #[test]
    fn test_unknown_urls_are_skipped() {
        let (sync, _) = feed();
        let rows = cells(2);
        assert!(sync.on_scroll(&rows, Rect::new(0.0, 0.0, 375.0, 400.0)).is_empty());
        assert!(sync.registry().is_empty());
    }
}
