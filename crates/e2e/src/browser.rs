//! Headless browsing session
//!
//! Fetches pages over HTTP, runs the analytics recorder on every load that
//! has scripting enabled, and drives clicks, taps and keyboard input against
//! the loaded [`Page`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use bikegear_common::{
    AnalyticsConfig, AnalyticsData, DisabledStorage, FailureMode, LocalStorage, PersistenceMode,
    RecordOutcome,
};

use crate::error::{E2eError, E2eResult};
use crate::page::{Activation, ConsoleLog, ConsoleMessage, Page, ScriptEnv};
use crate::spec::{AttributeAssertion, TestStep, Viewport};

/// Substring present on every analytics console line
pub const ANALYTICS_CONSOLE_PREFIX: &str = "Analytics:";

/// Configuration for a browsing session
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub viewport: Viewport,

    /// Run the analytics script on page load
    pub javascript_enabled: bool,

    /// Added before every request to simulate a slow network
    pub request_delay: Option<Duration>,

    pub request_timeout: Duration,

    /// Recorder settings and the session's storage backend
    pub analytics: AnalyticsConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            javascript_enabled: true,
            request_delay: None,
            request_timeout: Duration::from_secs(30),
            analytics: AnalyticsConfig::default(),
        }
    }
}

/// Result of a single step execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// One browser tab with its own local storage
pub struct BrowserSession {
    base_url: Url,
    client: reqwest::Client,
    config: BrowserConfig,
    storage: Arc<dyn LocalStorage>,
    storage_override: Option<DisabledStorage>,
    console: ConsoleLog,
    page: Option<Page>,
    history: Vec<Url>,
}

impl BrowserSession {
    pub fn new(base_url: &str, config: BrowserConfig) -> E2eResult<Self> {
        let base_url = Url::parse(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let storage = config.analytics.storage.open()?;

        debug!(
            base_url = %base_url,
            viewport = ?config.viewport,
            javascript = config.javascript_enabled,
            "Browser session created"
        );

        Ok(Self {
            base_url,
            client,
            config,
            storage,
            storage_override: None,
            console: ConsoleLog::new(),
            page: None,
            history: Vec::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// The loaded page
    pub fn page(&self) -> E2eResult<&Page> {
        self.page.as_ref().ok_or(E2eError::NoPage)
    }

    fn page_mut(&mut self) -> E2eResult<&mut Page> {
        self.page.as_mut().ok_or(E2eError::NoPage)
    }

    /// URLs loaded so far, oldest first
    pub fn history(&self) -> &[Url] {
        &self.history
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Load `target`, resolved against the current page or the base URL.
    ///
    /// Returns the HTTP status; error statuses still load the returned page.
    pub async fn goto(&mut self, target: &str) -> E2eResult<u16> {
        let url = match &self.page {
            Some(page) => page.url().join(target)?,
            None => self.base_url.join(target)?,
        };
        self.load(url).await
    }

    pub async fn reload(&mut self) -> E2eResult<u16> {
        let url = self.page()?.url().clone();
        self.load(url).await
    }

    async fn load(&mut self, url: Url) -> E2eResult<u16> {
        if let Some(delay) = self.config.request_delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response.text().await?;

        // Unload first so the old page's banner timer is cancelled
        self.page = None;

        let script = self.config.javascript_enabled.then(|| ScriptEnv {
            storage: self.effective_storage(),
            config: self.config.analytics.clone(),
        });
        let page = Page::load(final_url, status, &body, self.console.clone(), script);

        info!("GET {} -> {}", page.url(), status);
        self.history.push(page.url().clone());
        self.page = Some(page);
        Ok(status)
    }

    fn effective_storage(&self) -> Arc<dyn LocalStorage> {
        match self.storage_override {
            Some(disabled) => Arc::new(disabled),
            None => self.storage.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    pub async fn click(&mut self, selector: &str) -> E2eResult<()> {
        let activation = self.page()?.activation(selector)?;
        debug!("click {}", activation.target);
        self.activate(activation).await
    }

    /// Touch activation; same effect as a click
    pub async fn tap(&mut self, selector: &str) -> E2eResult<()> {
        let activation = self.page()?.activation(selector)?;
        debug!(
            "tap {} at {}x{}",
            activation.target, self.config.viewport.width, self.config.viewport.height
        );
        self.activate(activation).await
    }

    /// Click the control tracked under `label`
    pub async fn activate_tracked(&mut self, label: &str) -> E2eResult<()> {
        let activation = self.page()?.tracked_activation(label)?;
        debug!("activate tracked {}", label);
        self.activate(activation).await
    }

    pub fn focus(&mut self, selector: &str) -> E2eResult<()> {
        self.page_mut()?.focus(selector)
    }

    /// `Enter` activates the focused element, `Tab` moves focus forward.
    pub async fn press(&mut self, key: &str) -> E2eResult<()> {
        match key {
            "Enter" | "NumpadEnter" => {
                let focused = self.page()?.focused_activation()?;
                match focused {
                    Some(activation) => self.activate(activation).await,
                    None => {
                        debug!("Enter with nothing focused");
                        Ok(())
                    }
                }
            }
            "Tab" => {
                let focused = self.page_mut()?.focus_next()?;
                debug!("Tab -> {:?}", focused);
                Ok(())
            }
            other => Err(E2eError::UnsupportedKey(other.to_string())),
        }
    }

    /// Record the activation if it is tracked, then follow its link.
    async fn activate(&mut self, activation: Activation) -> E2eResult<()> {
        let page = self.page_mut()?;

        if let Some(label) = activation.label.as_deref() {
            match page.record(label) {
                Some(RecordOutcome::Recorded { total_clicks }) => {
                    debug!("Recorded {} (total {})", label, total_clicks)
                }
                Some(RecordOutcome::Ignored) => debug!("Ignored blank label on {}", activation.target),
                None => debug!("No recorder on page, {} not recorded", label),
            }
        }

        if !activation.navigates() {
            return Ok(());
        }

        let href = activation.href.as_deref().unwrap_or_default();
        let url = page.url().join(href)?;
        self.load(url).await.map(|_| ())
    }

    // ------------------------------------------------------------------
    // Analytics and console
    // ------------------------------------------------------------------

    /// Snapshot from the page's recorder; `None` when no recorder runs
    pub fn analytics_data(&self) -> Option<AnalyticsData> {
        self.page.as_ref().and_then(Page::analytics_data)
    }

    pub fn persistence(&self) -> Option<PersistenceMode> {
        self.page.as_ref().and_then(Page::persistence)
    }

    /// Everything logged to the console this session
    pub fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.console.messages()
    }

    /// Text of console lines emitted by the recorder
    pub fn analytics_console_lines(&self) -> Vec<String> {
        self.console
            .matching(ANALYTICS_CONSOLE_PREFIX)
            .into_iter()
            .map(|m| m.text)
            .collect()
    }

    // ------------------------------------------------------------------
    // Session settings
    // ------------------------------------------------------------------

    pub fn clear_storage(&mut self) -> E2eResult<()> {
        self.storage.clear()?;
        debug!("Local storage cleared");
        Ok(())
    }

    /// Make storage fail for pages loaded from now on
    pub fn disable_storage(&mut self, mode: FailureMode) {
        info!("Local storage disabled ({:?})", mode);
        self.storage_override = Some(DisabledStorage::new(mode));
    }

    pub fn enable_storage(&mut self) {
        self.storage_override = None;
    }

    pub fn set_javascript_enabled(&mut self, enabled: bool) {
        self.config.javascript_enabled = enabled;
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.config.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.config.viewport
    }

    pub fn set_request_delay(&mut self, delay: Option<Duration>) {
        self.config.request_delay = delay;
    }

    // ------------------------------------------------------------------
    // Declarative steps
    // ------------------------------------------------------------------

    /// Execute a test step. Step failures are reported in the result.
    pub async fn execute_step(&mut self, step: &TestStep) -> E2eResult<StepResult> {
        let start = Instant::now();
        let step_name = step.name();

        debug!("Executing step: {}", step_name);

        let result = match step {
            TestStep::Navigate { url, expect_status } => {
                self.execute_navigate(url, *expect_status).await
            }
            TestStep::Reload => self.reload().await.map(|_| ()),
            TestStep::Click { selector } => self.click(selector).await,
            TestStep::Tap { selector } => self.tap(selector).await,
            TestStep::Focus { selector } => self.focus(selector),
            TestStep::Press { selector, key } => self.execute_press(selector.as_deref(), key).await,
            TestStep::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            TestStep::Assert {
                selector,
                visible,
                text,
                text_contains,
                attribute,
                count,
                has_class,
                lacks_class,
            } => self.execute_assert(
                selector,
                *visible,
                text.as_deref(),
                text_contains.as_deref(),
                attribute.as_ref(),
                *count,
                has_class.as_deref(),
                lacks_class.as_deref(),
            ),
            TestStep::AssertPage {
                title_contains,
                title_matches,
                url_matches,
            } => self.execute_assert_page(
                title_contains.as_deref(),
                title_matches.as_deref(),
                url_matches.as_deref(),
            ),
            TestStep::AssertAnalytics {
                initialized,
                total_clicks,
                min_total_clicks,
                labels,
                label_counts,
                persistence,
            } => self.execute_assert_analytics(
                *initialized,
                *total_clicks,
                *min_total_clicks,
                labels,
                label_counts.iter().map(|(k, v)| (k.as_str(), *v)),
                *persistence,
            ),
            TestStep::AssertConsole { contains, count } => {
                self.execute_assert_console(contains, *count)
            }
            TestStep::ClearStorage => self.clear_storage(),
            TestStep::DisableStorage { mode } => {
                self.disable_storage(*mode);
                Ok(())
            }
            TestStep::EnableStorage => {
                self.enable_storage();
                Ok(())
            }
            TestStep::SetJavascript { enabled } => {
                self.set_javascript_enabled(*enabled);
                Ok(())
            }
            TestStep::SetViewport { width, height } => {
                self.set_viewport(Viewport {
                    width: *width,
                    height: *height,
                });
                Ok(())
            }
            TestStep::Log { message } => {
                info!("[TEST LOG] {}", message);
                Ok(())
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => Ok(StepResult {
                success: true,
                step_name,
                duration_ms,
                error: None,
            }),
            Err(e) => {
                warn!("Step {} failed: {}", step_name, e);
                Ok(StepResult {
                    success: false,
                    step_name,
                    duration_ms,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    async fn execute_navigate(&mut self, url: &str, expect_status: Option<u16>) -> E2eResult<()> {
        let status = self.goto(url).await?;
        let expected = expect_status.unwrap_or(200);
        if status != expected {
            return Err(E2eError::AssertionFailed(format!(
                "{} returned status {}, expected {}",
                url, status, expected
            )));
        }
        Ok(())
    }

    async fn execute_press(&mut self, selector: Option<&str>, key: &str) -> E2eResult<()> {
        if let Some(selector) = selector {
            self.focus(selector)?;
        }
        self.press(key).await
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_assert(
        &self,
        selector: &str,
        visible: Option<bool>,
        text: Option<&str>,
        text_contains: Option<&str>,
        attribute: Option<&AttributeAssertion>,
        count: Option<usize>,
        has_class: Option<&str>,
        lacks_class: Option<&str>,
    ) -> E2eResult<()> {
        let page = self.page()?;

        if let Some(expected) = count {
            let actual = page.count(selector)?;
            if actual != expected {
                return Err(E2eError::AssertionFailed(format!(
                    "{} matched {} element(s), expected {}",
                    selector, actual, expected
                )));
            }
        }

        if let Some(expected) = visible {
            let actual = page.is_visible(selector)?;
            if actual != expected {
                return Err(E2eError::AssertionFailed(format!(
                    "{} visible = {}, expected {}",
                    selector, actual, expected
                )));
            }
        }

        if let Some(expected) = text {
            let actual = page.text(selector)?;
            if actual != expected {
                return Err(E2eError::AssertionFailed(format!(
                    "{} text is {:?}, expected {:?}",
                    selector, actual, expected
                )));
            }
        }

        if let Some(needle) = text_contains {
            let actual = page.text(selector)?;
            if !actual.contains(needle) {
                return Err(E2eError::AssertionFailed(format!(
                    "{} text {:?} does not contain {:?}",
                    selector, actual, needle
                )));
            }
        }

        if let Some(assertion) = attribute {
            let actual = page.attribute(selector, &assertion.name)?.ok_or_else(|| {
                E2eError::AssertionFailed(format!("{} has no {} attribute", selector, assertion.name))
            })?;
            if let Some(expected) = &assertion.value {
                if &actual != expected {
                    return Err(E2eError::AssertionFailed(format!(
                        "{}[{}] is {:?}, expected {:?}",
                        selector, assertion.name, actual, expected
                    )));
                }
            }
            if let Some(needle) = &assertion.contains {
                if !actual.contains(needle.as_str()) {
                    return Err(E2eError::AssertionFailed(format!(
                        "{}[{}] {:?} does not contain {:?}",
                        selector, assertion.name, actual, needle
                    )));
                }
            }
        }

        if let Some(class) = has_class {
            if !page.has_class(selector, class)? {
                return Err(E2eError::AssertionFailed(format!(
                    "{} lacks class {}",
                    selector, class
                )));
            }
        }

        if let Some(class) = lacks_class {
            if page.has_class(selector, class)? {
                return Err(E2eError::AssertionFailed(format!(
                    "{} has class {}",
                    selector, class
                )));
            }
        }

        Ok(())
    }

    fn execute_assert_page(
        &self,
        title_contains: Option<&str>,
        title_matches: Option<&str>,
        url_matches: Option<&str>,
    ) -> E2eResult<()> {
        let page = self.page()?;
        let title = page.title();

        if let Some(needle) = title_contains {
            if !title.contains(needle) {
                return Err(E2eError::AssertionFailed(format!(
                    "title {:?} does not contain {:?}",
                    title, needle
                )));
            }
        }

        if let Some(pattern) = title_matches {
            if !Regex::new(pattern)?.is_match(&title) {
                return Err(E2eError::AssertionFailed(format!(
                    "title {:?} does not match /{}/",
                    title, pattern
                )));
            }
        }

        if let Some(pattern) = url_matches {
            let url = page.url().as_str();
            if !Regex::new(pattern)?.is_match(url) {
                return Err(E2eError::AssertionFailed(format!(
                    "url {} does not match /{}/",
                    url, pattern
                )));
            }
        }

        Ok(())
    }

    fn execute_assert_analytics<'a>(
        &self,
        initialized: Option<bool>,
        total_clicks: Option<u64>,
        min_total_clicks: Option<u64>,
        labels: &[String],
        label_counts: impl Iterator<Item = (&'a str, usize)>,
        persistence: Option<PersistenceMode>,
    ) -> E2eResult<()> {
        let data = self.analytics_data();

        if let Some(expected) = initialized {
            if data.is_some() != expected {
                return Err(E2eError::AssertionFailed(format!(
                    "analytics initialized = {}, expected {}",
                    data.is_some(),
                    expected
                )));
            }
            if !expected {
                return Ok(());
            }
        }

        let data = data.ok_or_else(|| {
            E2eError::AssertionFailed("analytics is not running on this page".to_string())
        })?;

        if let Some(expected) = total_clicks {
            if data.total_clicks != expected {
                return Err(E2eError::AssertionFailed(format!(
                    "totalClicks is {}, expected {}",
                    data.total_clicks, expected
                )));
            }
        }

        if let Some(minimum) = min_total_clicks {
            if data.total_clicks < minimum {
                return Err(E2eError::AssertionFailed(format!(
                    "totalClicks is {}, expected at least {}",
                    data.total_clicks, minimum
                )));
            }
        }

        for label in labels {
            if data.count_for(label) == 0 {
                return Err(E2eError::AssertionFailed(format!("no clicks recorded for {}", label)));
            }
        }

        for (label, expected) in label_counts {
            let actual = data.count_for(label);
            if actual != expected {
                return Err(E2eError::AssertionFailed(format!(
                    "{} has {} click(s), expected {}",
                    label, actual, expected
                )));
            }
        }

        if let Some(expected) = persistence {
            let actual = self.persistence();
            if actual != Some(expected) {
                return Err(E2eError::AssertionFailed(format!(
                    "persistence is {:?}, expected {}",
                    actual, expected
                )));
            }
        }

        Ok(())
    }

    fn execute_assert_console(&self, contains: &str, count: Option<usize>) -> E2eResult<()> {
        let matching = self.console.matching(contains).len();
        let ok = match count {
            Some(expected) => matching == expected,
            None => matching > 0,
        };
        if !ok {
            return Err(E2eError::AssertionFailed(format!(
                "{} console line(s) contain {:?}, expected {}",
                matching,
                contains,
                count.map(|c| c.to_string()).unwrap_or_else(|| "at least one".to_string())
            )));
        }
        Ok(())
    }
}
