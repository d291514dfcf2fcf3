//! Click analytics recorder
//!
//! One recorder is constructed per page load. It restores prior state from
//! local storage, records activations of tracked controls, and drives the
//! click counter and notification banner on the page. Storage failures never
//! escape: the first failed read or write moves the recorder into
//! [`PersistenceMode::Degraded`], after which it keeps working purely in
//! memory for the rest of the page's lifetime.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::banner::Banner;
use crate::config::AnalyticsConfig;
use crate::storage::LocalStorage;
use crate::surface::DomSurface;
use crate::types::{AnalyticsData, AnalyticsState, ClickEvent, PageContext};
use crate::Error;

/// Whether recorded clicks are reaching local storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    Nominal,
    Degraded,
}

impl std::fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceMode::Nominal => write!(f, "nominal"),
            PersistenceMode::Degraded => write!(f, "degraded"),
        }
    }
}

/// What happened to a `record` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded { total_clicks: u64 },
    /// The activation carried no usable tracking label
    Ignored,
}

pub struct AnalyticsRecorder {
    page: PageContext,
    storage_key: String,
    storage: Arc<dyn LocalStorage>,
    surface: Arc<dyn DomSurface>,
    state: AnalyticsState,
    persistence: PersistenceMode,
    banner: Banner,
}

impl AnalyticsRecorder {
    /// Restore state for a freshly loaded page and render it.
    ///
    /// The banner's auto-hide timer runs on the current tokio runtime. Called
    /// outside a runtime, the recorder still works but the banner stays
    /// visible until the next page load.
    pub fn init(
        page: PageContext,
        storage: Arc<dyn LocalStorage>,
        surface: Arc<dyn DomSurface>,
        config: &AnalyticsConfig,
    ) -> Self {
        let banner = Banner::new(config.banner_delay(), Arc::clone(&surface));
        let mut recorder = Self {
            page,
            storage_key: config.storage_key.clone(),
            storage,
            surface,
            state: AnalyticsState::new(),
            persistence: PersistenceMode::Nominal,
            banner,
        };

        recorder.restore();
        recorder.surface.set_click_count(recorder.state.total_clicks());
        recorder.banner.show();

        info!(
            page = %recorder.page,
            total_clicks = recorder.state.total_clicks(),
            persistence = %recorder.persistence,
            "Analytics initialized"
        );
        recorder
    }

    fn restore(&mut self) {
        match self.storage.get_item(&self.storage_key) {
            Ok(None) => debug!("No stored analytics under {}", self.storage_key),
            Ok(Some(json)) => match AnalyticsState::from_json(&json) {
                Ok(state) => self.state = state,
                Err(e) => warn!(
                    "Discarding unreadable analytics under {}: {}",
                    self.storage_key, e
                ),
            },
            Err(e) => self.degrade(e),
        }
    }

    /// Record one activation of a tracked control.
    ///
    /// Never fails outwardly; storage trouble only changes [`Self::persistence`].
    pub fn record(&mut self, label: &str, page: PageContext) -> RecordOutcome {
        let label = label.trim();
        if label.is_empty() {
            debug!("{}", Error::InvalidLabel(label.to_string()));
            return RecordOutcome::Ignored;
        }

        let total_clicks = self.state.push(ClickEvent::now(label, page));

        self.surface
            .console_log(&format!("Analytics: Button clicked - {} on {}", label, page));
        self.persist();
        self.surface.set_click_count(total_clicks);
        self.banner.show();

        RecordOutcome::Recorded { total_clicks }
    }

    fn persist(&mut self) {
        if self.persistence == PersistenceMode::Degraded {
            return;
        }

        let result = self
            .state
            .to_json()
            .and_then(|json| self.storage.set_item(&self.storage_key, &json));

        match result {
            Ok(()) => {}
            Err(e) if e.is_persistence_failure() => self.degrade(e),
            Err(e) => warn!("Analytics not saved: {}", e),
        }
    }

    fn degrade(&mut self, cause: Error) {
        if self.persistence == PersistenceMode::Degraded {
            return;
        }
        warn!(
            page = %self.page,
            "Analytics persistence unavailable, continuing in memory: {}",
            cause
        );
        self.persistence = PersistenceMode::Degraded;
    }

    /// Snapshot of everything recorded so far (`getAnalyticsData`)
    pub fn analytics_data(&self) -> AnalyticsData {
        self.state.snapshot()
    }

    pub fn total_clicks(&self) -> u64 {
        self.state.total_clicks()
    }

    pub fn persistence(&self) -> PersistenceMode {
        self.persistence
    }

    pub fn page_context(&self) -> PageContext {
        self.page
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn banner(&self) -> &Banner {
        &self.banner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STORAGE_KEY;
    use crate::storage::{DisabledStorage, FailureMode, MemoryStorage};
    use crate::surface::testing::CapturingSurface;
    use std::time::Duration;

    fn recorder_with(
        page: PageContext,
        storage: Arc<dyn LocalStorage>,
    ) -> (AnalyticsRecorder, Arc<CapturingSurface>) {
        let surface = Arc::new(CapturingSurface::default());
        let recorder =
            AnalyticsRecorder::init(page, storage, surface.clone(), &AnalyticsConfig::default());
        (recorder, surface)
    }

    /// Storage whose writes start failing after `ok_writes` successes
    struct FlakyStorage {
        inner: MemoryStorage,
        ok_writes: parking_lot::Mutex<usize>,
    }

    impl LocalStorage for FlakyStorage {
        fn get_item(&self, key: &str) -> crate::Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> crate::Result<()> {
            let mut remaining = self.ok_writes.lock();
            if *remaining == 0 {
                return Err(Error::StorageUnavailable("quota exceeded".to_string()));
            }
            *remaining -= 1;
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> crate::Result<()> {
            self.inner.remove_item(key)
        }

        fn clear(&self) -> crate::Result<()> {
            self.inner.clear()
        }

        fn len(&self) -> crate::Result<usize> {
            self.inner.len()
        }
    }

    #[tokio::test]
    async fn test_first_click_on_helmets_page() {
        let (mut recorder, surface) =
            recorder_with(PageContext::Helmets, Arc::new(MemoryStorage::new()));
        assert_eq!(surface.counter_text().as_deref(), Some("0"));

        let outcome = recorder.record("explore-collection", PageContext::Helmets);
        assert_eq!(outcome, RecordOutcome::Recorded { total_clicks: 1 });

        let data = recorder.analytics_data();
        assert_eq!(data.total_clicks, 1);
        assert_eq!(data.count_for("explore-collection"), 1);
        assert_eq!(surface.counter_text().as_deref(), Some("1"));

        let lines = surface.console_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Analytics:"));
        assert!(lines[0].contains("Button clicked - explore-collection"));
        assert!(lines[0].contains("helmets page"));
    }

    #[tokio::test]
    async fn test_totals_match_activation_counts() {
        let (mut recorder, _surface) =
            recorder_with(PageContext::Helmets, Arc::new(MemoryStorage::new()));

        let labels = [
            "explore-collection",
            "view-glasses",
            "explore-collection",
            "explore-collection",
            "view-glasses",
        ];
        for label in labels {
            recorder.record(label, PageContext::Helmets);
        }

        let data = recorder.analytics_data();
        assert_eq!(data.total_clicks, labels.len() as u64);
        assert_eq!(data.count_for("explore-collection"), 3);
        assert_eq!(data.count_for("view-glasses"), 2);
    }

    #[tokio::test]
    async fn test_query_is_idempotent() {
        let (mut recorder, _surface) =
            recorder_with(PageContext::Glasses, Arc::new(MemoryStorage::new()));
        recorder.record("shop-glasses-collection", PageContext::Glasses);

        assert_eq!(recorder.analytics_data(), recorder.analytics_data());
    }

    #[tokio::test]
    async fn test_blank_label_is_ignored() {
        let (mut recorder, surface) =
            recorder_with(PageContext::Helmets, Arc::new(MemoryStorage::new()));

        assert_eq!(recorder.record("   ", PageContext::Helmets), RecordOutcome::Ignored);
        assert_eq!(recorder.total_clicks(), 0);
        assert!(surface.console_lines().is_empty());
        assert_eq!(recorder.banner().generation(), 1);
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let storage = MemoryStorage::new();

        let (mut helmets, _) = recorder_with(PageContext::Helmets, Arc::new(storage.clone()));
        helmets.record("explore-collection", PageContext::Helmets);
        helmets.record("view-glasses", PageContext::Helmets);
        drop(helmets);

        let (mut glasses, surface) = recorder_with(PageContext::Glasses, Arc::new(storage));
        assert_eq!(surface.counter_text().as_deref(), Some("2"));

        glasses.record("shop-glasses-collection", PageContext::Glasses);
        let data = glasses.analytics_data();
        assert_eq!(data.total_clicks, 3);
        assert_eq!(
            data.labels().collect::<Vec<_>>(),
            vec!["explore-collection", "shop-glasses-collection", "view-glasses"]
        );
        assert_eq!(
            data.clicks["shop-glasses-collection"][0].page_context,
            PageContext::Glasses
        );
    }

    #[tokio::test]
    async fn test_disabled_storage_degrades_on_read() {
        let (mut recorder, surface) = recorder_with(
            PageContext::Helmets,
            Arc::new(DisabledStorage::new(FailureMode::ReadsAndWrites)),
        );
        assert_eq!(recorder.persistence(), PersistenceMode::Degraded);

        recorder.record("explore-collection", PageContext::Helmets);
        assert_eq!(recorder.total_clicks(), 1);
        assert_eq!(surface.counter_text().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_failing_writes_degrade_on_first_record() {
        let (mut recorder, surface) = recorder_with(
            PageContext::Helmets,
            Arc::new(DisabledStorage::new(FailureMode::WritesOnly)),
        );
        assert_eq!(recorder.persistence(), PersistenceMode::Nominal);

        recorder.record("explore-collection", PageContext::Helmets);
        assert_eq!(recorder.persistence(), PersistenceMode::Degraded);

        recorder.record("view-glasses", PageContext::Helmets);
        assert_eq!(recorder.total_clicks(), 2);
        assert_eq!(surface.counter_text().as_deref(), Some("2"));
        assert_eq!(surface.console_lines().len(), 2);
    }

    #[tokio::test]
    async fn test_no_write_retry_once_degraded() {
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            ok_writes: parking_lot::Mutex::new(1),
        });
        let (mut recorder, _) = recorder_with(PageContext::Helmets, storage.clone());

        recorder.record("explore-collection", PageContext::Helmets);
        assert_eq!(recorder.persistence(), PersistenceMode::Nominal);

        recorder.record("explore-collection", PageContext::Helmets);
        assert_eq!(recorder.persistence(), PersistenceMode::Degraded);

        *storage.ok_writes.lock() = 10;
        recorder.record("explore-collection", PageContext::Helmets);
        assert_eq!(recorder.persistence(), PersistenceMode::Degraded);
        assert_eq!(recorder.total_clicks(), 3);

        let persisted = AnalyticsState::from_json(
            &storage.get_item("bikeGearAnalytics").unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(persisted.total_clicks(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_payload_starts_empty_and_overwrites() {
        let storage = MemoryStorage::new();
        storage.set_item("bikeGearAnalytics", "{oops").unwrap();

        let (mut recorder, _) = recorder_with(PageContext::Helmets, Arc::new(storage.clone()));
        assert_eq!(recorder.total_clicks(), 0);
        assert_eq!(recorder.persistence(), PersistenceMode::Nominal);

        recorder.record("explore-collection", PageContext::Helmets);
        let restored =
            AnalyticsState::from_json(&storage.get_item("bikeGearAnalytics").unwrap().unwrap())
                .unwrap();
        assert_eq!(restored.total_clicks(), 1);
    }

    /// Surface that logs its calls and peeks at storage when the counter moves
    struct OrderingSurface {
        storage: MemoryStorage,
        calls: parking_lot::Mutex<Vec<&'static str>>,
        stored_total_at_console: parking_lot::Mutex<Option<u64>>,
        stored_total_at_counter: parking_lot::Mutex<Option<u64>>,
    }

    impl OrderingSurface {
        fn stored_total(&self) -> Option<u64> {
            self.storage
                .get_item(DEFAULT_STORAGE_KEY)
                .unwrap()
                .map(|json| AnalyticsState::from_json(&json).unwrap().total_clicks())
        }
    }

    impl DomSurface for OrderingSurface {
        fn set_click_count(&self, _total_clicks: u64) {
            self.calls.lock().push("counter");
            *self.stored_total_at_counter.lock() = self.stored_total();
        }

        fn set_banner_visible(&self, visible: bool) {
            if visible {
                self.calls.lock().push("banner");
            }
        }

        fn console_log(&self, _line: &str) {
            self.calls.lock().push("console");
            *self.stored_total_at_console.lock() = self.stored_total();
        }
    }

    #[tokio::test]
    async fn test_record_side_effects_follow_persist() {
        let storage = MemoryStorage::new();
        let surface = Arc::new(OrderingSurface {
            storage: storage.clone(),
            calls: parking_lot::Mutex::new(Vec::new()),
            stored_total_at_console: parking_lot::Mutex::new(None),
            stored_total_at_counter: parking_lot::Mutex::new(None),
        });
        let mut recorder = AnalyticsRecorder::init(
            PageContext::Helmets,
            Arc::new(storage),
            surface.clone(),
            &AnalyticsConfig::default(),
        );
        surface.calls.lock().clear();

        recorder.record("explore-collection", PageContext::Helmets);
        assert_eq!(*surface.calls.lock(), vec!["console", "counter", "banner"]);
        assert_eq!(*surface.stored_total_at_console.lock(), None);
        assert_eq!(*surface.stored_total_at_counter.lock(), Some(1));

        recorder.record("view-glasses", PageContext::Helmets);
        assert_eq!(*surface.stored_total_at_console.lock(), Some(1));
        assert_eq!(*surface.stored_total_at_counter.lock(), Some(2));
    }

    #[test]
    fn test_outside_runtime_records_but_banner_stays() {
        let (mut recorder, surface) =
            recorder_with(PageContext::Glasses, Arc::new(MemoryStorage::new()));

        let outcome = recorder.record("shop-glasses-collection", PageContext::Glasses);
        assert_eq!(outcome, RecordOutcome::Recorded { total_clicks: 1 });
        assert_eq!(surface.counter_text().as_deref(), Some("1"));
        assert!(surface.banner_visible());
        assert!(recorder.banner().is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_shown_on_load_and_rearmed_by_clicks() {
        let (mut recorder, surface) =
            recorder_with(PageContext::Helmets, Arc::new(MemoryStorage::new()));
        assert!(surface.banner_visible());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        recorder.record("explore-collection", PageContext::Helmets);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        tokio::task::yield_now().await;
        assert!(recorder.banner().is_visible());

        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert!(!recorder.banner().is_visible());
        assert!(!surface.banner_visible());
    }
}
