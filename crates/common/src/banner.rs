//! Transient "analytics active" notification banner
//!
//! The banner owns at most one pending hide task. Every `show()` aborts the
//! pending task and schedules a fresh one, so a burst of clicks keeps the
//! banner up until `delay` after the last click. Each task carries the
//! generation it was scheduled for and only hides the banner if no newer
//! `show()` happened in the meantime, which covers the window where an abort
//! races a task that has already woken up.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::surface::DomSurface;

/// How long the banner stays up after the most recent activation
pub const DEFAULT_HIDE_DELAY: Duration = Duration::from_millis(3000);

pub struct Banner {
    delay: Duration,
    surface: Arc<dyn DomSurface>,
    inner: Arc<Mutex<BannerInner>>,
}

#[derive(Default)]
struct BannerInner {
    visible: bool,
    generation: u64,
    hide_at: Option<Instant>,
    hide_task: Option<JoinHandle<()>>,
}

impl Banner {
    pub fn new(delay: Duration, surface: Arc<dyn DomSurface>) -> Self {
        Self {
            delay,
            surface,
            inner: Arc::new(Mutex::new(BannerInner::default())),
        }
    }

    /// Show the banner and (re)arm its hide timer
    pub fn show(&self) {
        let mut inner = self.inner.lock();

        if let Some(task) = inner.hide_task.take() {
            task.abort();
        }

        inner.generation += 1;
        inner.visible = true;
        self.surface.set_banner_visible(true);

        let generation = inner.generation;
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                inner.hide_at = None;
                warn!("No tokio runtime available; analytics banner will stay visible");
                return;
            }
        };

        let hide_at = Instant::now() + self.delay;
        inner.hide_at = Some(hide_at);

        let state = Arc::clone(&self.inner);
        let surface = Arc::clone(&self.surface);
        inner.hide_task = Some(handle.spawn(async move {
            tokio::time::sleep_until(hide_at).await;

            let mut inner = state.lock();
            if inner.generation != generation {
                return;
            }
            inner.visible = false;
            inner.hide_at = None;
            inner.hide_task = None;
            surface.set_banner_visible(false);
            debug!(generation, "Analytics banner hidden");
        }));

        debug!(generation, delay_ms = self.delay.as_millis() as u64, "Analytics banner armed");
    }

    pub fn is_visible(&self) -> bool {
        self.inner.lock().visible
    }

    /// When the pending hide task will fire, if one is armed
    pub fn hide_deadline(&self) -> Option<Instant> {
        self.inner.lock().hide_at
    }

    /// Number of times the banner has been shown
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for Banner {
    fn drop(&mut self) {
        if let Some(task) = self.inner.lock().hide_task.take() {
            task.abort();
        }
    }
}
