//! Scroll-pause controller: reader position decides whether the log follows.
//!
//! DESIGN
//! ======
//! A scroll event computes `at_bottom = top + client >= height - threshold`
//! and sets `paused = !at_bottom`. Whenever the display log changes and the
//! store is not paused, the surface is scrolled smoothly to its end. While
//! paused, nothing moves; new messages keep accumulating under the caps.

use tokio::sync::watch;

use super::queue::ChatQueueStore;

pub const DEFAULT_THRESHOLD_PX: f64 = 10.0;

/// Geometry of the scrollable display surface at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl ScrollMetrics {
    #[must_use]
    pub fn is_at_bottom(&self, threshold_px: f64) -> bool {
        self.scroll_top + self.client_height >= self.scroll_height - threshold_px
    }
}

/// The display surface the controller reads and moves.
pub trait ScrollSurface {
    fn metrics(&self) -> ScrollMetrics;

    /// Animate the viewport to `top`.
    fn scroll_smoothly_to(&mut self, top: f64);
}

pub struct ScrollPauseController {
    store: ChatQueueStore,
    threshold_px: f64,
}

impl ScrollPauseController {
    #[must_use]
    pub fn new(store: ChatQueueStore, threshold_px: f64) -> Self {
        Self { store, threshold_px }
    }

    /// Handle a scroll event. Returns the resulting pause flag.
    pub fn on_scroll(&self, metrics: ScrollMetrics) -> bool {
        let paused = !metrics.is_at_bottom(self.threshold_px);
        self.store.set_paused(paused);
        paused
    }

    /// React to a display-log change. Returns true if the surface was moved.
    pub fn on_log_changed(&self, surface: &mut dyn ScrollSurface) -> bool {
        if self.store.is_paused() {
            return false;
        }
        let height = surface.metrics().scroll_height;
        surface.scroll_smoothly_to(height);
        true
    }

    /// Follow the display log. The controller's own store handle keeps the
    /// change feed open, so this runs until the task is aborted.
    pub async fn follow<S: ScrollSurface>(&self, surface: &mut S, mut changes: watch::Receiver<u64>) {
        while changes.changed().await.is_ok() {
            self.on_log_changed(surface);
        }
    }
}

#[cfg(test)]
#[path = "scroll_test.rs"]
mod tests;
