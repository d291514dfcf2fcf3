//! DOM side effects driven by the recorder

use tracing::{debug, info};

/// The parts of the page the recorder writes to.
///
/// Implementations are shared with the banner's hide task, so they must be
/// usable from any thread.
pub trait DomSurface: Send + Sync {
    /// Overwrite the text of the click counter element
    fn set_click_count(&self, total_clicks: u64);

    /// Toggle the `show` state of the notification banner
    fn set_banner_visible(&self, visible: bool);

    /// Emit one line on the page's diagnostic console
    fn console_log(&self, line: &str);
}

/// Surface with no DOM behind it; console lines go to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSurface;

impl DomSurface for TracingSurface {
    fn set_click_count(&self, total_clicks: u64) {
        debug!(total_clicks, "click counter updated");
    }

    fn set_banner_visible(&self, visible: bool) {
        debug!(visible, "analytics banner toggled");
    }

    fn console_log(&self, line: &str) {
        info!(target: "console", "{}", line);
    }
}
