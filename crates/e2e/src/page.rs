//! A loaded storefront page
//!
//! The fetched markup is immutable; everything the analytics recorder writes
//! (counter text, banner `show` class, console lines) lands in a [`DomOverlay`]
//! that queries consult before falling back to the markup.

use parking_lot::Mutex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use bikegear_common::{
    AnalyticsConfig, AnalyticsData, AnalyticsRecorder, DomSurface, LocalStorage, PageContext,
    PersistenceMode, RecordOutcome,
};

use crate::error::{E2eError, E2eResult};

/// Element whose text mirrors the total click count
pub const CLICK_COUNT_ID: &str = "click-count";
/// Notification banner element
pub const BANNER_ID: &str = "analytics-info";
/// Class present while the banner is showing
pub const BANNER_CLASS: &str = "show";

const FOCUSABLE: &str = "a[href], button, input, select, textarea, [tabindex]";
const SKIP_TEXT: &[&str] = &["script", "style", "noscript", "template"];

/// One line written to the page console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleMessage {
    pub text: String,
    pub url: String,
}

/// Console history shared by every page of a session
#[derive(Clone, Default)]
pub struct ConsoleLog {
    messages: Arc<Mutex<Vec<ConsoleMessage>>>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: ConsoleMessage) {
        self.messages.lock().push(message);
    }

    pub fn messages(&self) -> Vec<ConsoleMessage> {
        self.messages.lock().clone()
    }

    /// Messages whose text contains `needle`
    pub fn matching(&self, needle: &str) -> Vec<ConsoleMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.text.contains(needle))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

/// Live DOM state written by the recorder
pub struct DomOverlay {
    url: String,
    console: ConsoleLog,
    click_count: Mutex<Option<u64>>,
    banner_visible: Mutex<Option<bool>>,
}

impl DomOverlay {
    fn new(url: &str, console: ConsoleLog) -> Self {
        Self {
            url: url.to_string(),
            console,
            click_count: Mutex::new(None),
            banner_visible: Mutex::new(None),
        }
    }

    pub fn click_count(&self) -> Option<u64> {
        *self.click_count.lock()
    }

    /// `None` until the recorder has touched the banner
    pub fn banner_visible(&self) -> Option<bool> {
        *self.banner_visible.lock()
    }
}

impl DomSurface for DomOverlay {
    fn set_click_count(&self, total_clicks: u64) {
        *self.click_count.lock() = Some(total_clicks);
    }

    fn set_banner_visible(&self, visible: bool) {
        *self.banner_visible.lock() = Some(visible);
    }

    fn console_log(&self, line: &str) {
        debug!(target: "console", "[{}] {}", self.url, line);
        self.console.push(ConsoleMessage {
            text: line.to_string(),
            url: self.url.clone(),
        });
    }
}

/// What a page needs to run its analytics script
pub struct ScriptEnv {
    pub storage: Arc<dyn LocalStorage>,
    pub config: AnalyticsConfig,
}

/// A control carrying a `data-track` label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedControl {
    pub label: String,
    pub href: Option<String>,
    pub accessible_name: Option<String>,
}

/// What activating an element does
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Human-readable element description for logs
    pub target: String,
    pub label: Option<String>,
    pub href: Option<String>,
}

impl Activation {
    /// In-page targets (`#...`, `javascript:`) do not trigger a load
    pub fn navigates(&self) -> bool {
        match self.href.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(href) => !href.starts_with('#') && !href.starts_with("javascript:"),
        }
    }
}

pub struct Page {
    url: Url,
    status: u16,
    document: Html,
    context: Option<PageContext>,
    overlay: Arc<DomOverlay>,
    recorder: Option<AnalyticsRecorder>,
    focused: Option<usize>,
}

impl Page {
    /// Parse a fetched document and, when scripting is on, start its recorder.
    pub fn load(
        url: Url,
        status: u16,
        body: &str,
        console: ConsoleLog,
        script: Option<ScriptEnv>,
    ) -> Self {
        let document = Html::parse_document(body);
        let context = detect_context(&document);
        let overlay = Arc::new(DomOverlay::new(url.as_str(), console));

        let recorder = match (script, context) {
            (Some(env), Some(context)) => Some(AnalyticsRecorder::init(
                context,
                env.storage,
                overlay.clone(),
                &env.config,
            )),
            _ => None,
        };

        debug!(
            url = %url,
            status,
            context = ?context,
            analytics = recorder.is_some(),
            "Page loaded"
        );

        Self {
            url,
            status,
            document,
            context,
            overlay,
            recorder,
            focused: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn page_context(&self) -> Option<PageContext> {
        self.context
    }

    pub fn overlay(&self) -> &DomOverlay {
        &self.overlay
    }

    // ------------------------------------------------------------------
    // Analytics
    // ------------------------------------------------------------------

    /// The page's recorder; absent when scripting is off or the page is untracked
    pub fn recorder(&self) -> Option<&AnalyticsRecorder> {
        self.recorder.as_ref()
    }

    pub fn analytics_data(&self) -> Option<AnalyticsData> {
        self.recorder.as_ref().map(AnalyticsRecorder::analytics_data)
    }

    pub fn persistence(&self) -> Option<PersistenceMode> {
        self.recorder.as_ref().map(AnalyticsRecorder::persistence)
    }

    /// Forward a tracked activation to the recorder
    pub fn record(&mut self, label: &str) -> Option<RecordOutcome> {
        let context = self.context?;
        self.recorder
            .as_mut()
            .map(|recorder| recorder.record(label, context))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn title(&self) -> String {
        self.select("title")
            .ok()
            .and_then(|els| els.first().map(|el| normalize(&el.text().collect::<String>())))
            .unwrap_or_default()
    }

    pub fn count(&self, selector: &str) -> E2eResult<usize> {
        Ok(self.select(selector)?.len())
    }

    /// Normalized text content of the first match
    pub fn text(&self, selector: &str) -> E2eResult<String> {
        let el = self.first(selector)?;
        Ok(self.text_of(el))
    }

    /// Normalized text content of every match
    pub fn texts(&self, selector: &str) -> E2eResult<Vec<String>> {
        Ok(self
            .select(selector)?
            .into_iter()
            .map(|el| self.text_of(el))
            .collect())
    }

    pub fn attribute(&self, selector: &str, name: &str) -> E2eResult<Option<String>> {
        let el = self.first(selector)?;
        Ok(el.value().attr(name).map(str::to_string))
    }

    pub fn has_class(&self, selector: &str, class: &str) -> E2eResult<bool> {
        let el = self.first(selector)?;
        if el.value().id() == Some(BANNER_ID) && class == BANNER_CLASS {
            if let Some(visible) = self.overlay.banner_visible() {
                return Ok(visible);
            }
        }
        Ok(el.value().classes().any(|c| c == class))
    }

    /// Whether the first match exists and is not hidden by markup
    pub fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        Ok(self
            .select(selector)?
            .first()
            .map(|el| rendered(*el))
            .unwrap_or(false))
    }

    /// `content` of `<meta name=key>` or `<meta property=key>`
    pub fn meta_content(&self, key: &str) -> Option<String> {
        let selector = format!(r#"meta[name="{key}"], meta[property="{key}"]"#);
        self.select(&selector)
            .ok()?
            .first()
            .and_then(|el| el.value().attr("content"))
            .map(str::to_string)
    }

    pub fn accessible_name(&self, selector: &str) -> E2eResult<Option<String>> {
        let el = self.first(selector)?;
        Ok(self.accessible_name_of(el))
    }

    /// Links and buttons that expose no accessible name
    pub fn unlabelled_controls(&self) -> E2eResult<Vec<String>> {
        Ok(self
            .select("a, button")?
            .into_iter()
            .filter(|el| self.accessible_name_of(*el).is_none())
            .map(describe)
            .collect())
    }

    /// Every `data-track` control in document order
    pub fn tracked_controls(&self) -> E2eResult<Vec<TrackedControl>> {
        Ok(self
            .select("[data-track]")?
            .into_iter()
            .map(|el| TrackedControl {
                label: el.value().attr("data-track").unwrap_or_default().to_string(),
                href: el.value().attr("href").map(str::to_string),
                accessible_name: self.accessible_name_of(el),
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Interaction
    // ------------------------------------------------------------------

    /// What clicking the first match would do
    pub fn activation(&self, selector: &str) -> E2eResult<Activation> {
        let el = self.first(selector)?;
        Ok(activation_of(el))
    }

    /// What activating the first control tracked under `label` would do
    pub fn tracked_activation(&self, label: &str) -> E2eResult<Activation> {
        self.select("[data-track]")?
            .into_iter()
            .find(|el| el.value().attr("data-track") == Some(label))
            .map(activation_of)
            .ok_or_else(|| E2eError::ElementNotFound(format!("[data-track] = {:?}", label)))
    }

    pub fn focus(&mut self, selector: &str) -> E2eResult<()> {
        let el = self.first(selector)?;
        let index = self
            .focusables()?
            .iter()
            .position(|f| *f == el)
            .ok_or_else(|| E2eError::NotFocusable(selector.to_string()))?;
        self.focused = Some(index);
        Ok(())
    }

    /// Move focus to the next focusable element, as `Tab` does.
    ///
    /// Returns the newly focused element's accessible name, or `None` once
    /// focus leaves the document.
    pub fn focus_next(&mut self) -> E2eResult<Option<String>> {
        let focusables = self.focusables()?;
        let next = self.focused.map(|i| i + 1).unwrap_or(0);

        if next >= focusables.len() {
            self.focused = None;
            return Ok(None);
        }

        let name = self
            .accessible_name_of(focusables[next])
            .unwrap_or_else(|| describe(focusables[next]));
        self.focused = Some(next);
        Ok(Some(name))
    }

    /// Whether the first match currently holds focus
    pub fn is_focused(&self, selector: &str) -> E2eResult<bool> {
        let Some(index) = self.focused else {
            return Ok(false);
        };
        let el = self.first(selector)?;
        Ok(self.focusables()?.get(index) == Some(&el))
    }

    pub fn focused_activation(&self) -> E2eResult<Option<Activation>> {
        let Some(index) = self.focused else {
            return Ok(None);
        };
        Ok(self.focusables()?.get(index).map(|el| activation_of(*el)))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn select(&self, selector: &str) -> E2eResult<Vec<ElementRef<'_>>> {
        let parsed = parse_selector(selector)?;
        Ok(self.document.select(&parsed).collect())
    }

    fn first(&self, selector: &str) -> E2eResult<ElementRef<'_>> {
        self.select(selector)?
            .into_iter()
            .next()
            .ok_or_else(|| E2eError::ElementNotFound(selector.to_string()))
    }

    fn focusables(&self) -> E2eResult<Vec<ElementRef<'_>>> {
        Ok(self
            .select(FOCUSABLE)?
            .into_iter()
            .filter(|el| {
                let tabindex = el
                    .value()
                    .attr("tabindex")
                    .and_then(|v| v.trim().parse::<i32>().ok())
                    .unwrap_or(0);
                tabindex >= 0 && el.value().attr("disabled").is_none() && rendered(*el)
            })
            .collect())
    }

    fn text_of(&self, el: ElementRef<'_>) -> String {
        let mut raw = String::new();
        self.collect_text(el, &mut raw);
        normalize(&raw)
    }

    fn collect_text(&self, el: ElementRef<'_>, out: &mut String) {
        if SKIP_TEXT.contains(&el.value().name()) {
            return;
        }
        if el.value().id() == Some(CLICK_COUNT_ID) {
            if let Some(count) = self.overlay.click_count() {
                out.push_str(&count.to_string());
                return;
            }
        }

        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(&text.text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.collect_text(child_el, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn accessible_name_of(&self, el: ElementRef<'_>) -> Option<String> {
        let non_empty = |value: Option<&str>| {
            value
                .map(normalize)
                .filter(|v| !v.is_empty())
        };

        non_empty(el.value().attr("aria-label"))
            .or_else(|| Some(self.text_of(el)).filter(|t| !t.is_empty()))
            .or_else(|| non_empty(el.value().attr("title")))
    }
}

fn parse_selector(selector: &str) -> E2eResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| E2eError::InvalidSelector(format!("{selector}: {e:?}")))
}

fn detect_context(document: &Html) -> Option<PageContext> {
    let selector = parse_selector("body[data-page-context]").ok()?;
    let value = document
        .select(&selector)
        .next()?
        .value()
        .attr("data-page-context")?;

    match value.parse() {
        Ok(context) => Some(context),
        Err(e) => {
            warn!("Ignoring page context: {}", e);
            None
        }
    }
}

fn activation_of(el: ElementRef<'_>) -> Activation {
    Activation {
        target: describe(el),
        label: el.value().attr("data-track").map(str::to_string),
        href: el.value().attr("href").map(str::to_string),
    }
}

/// Not hidden by the element itself or any ancestor
fn rendered(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .all(|e| {
            let value = e.value();
            let display_none = value
                .attr("style")
                .map(|s| s.replace(' ', "").contains("display:none"))
                .unwrap_or(false);
            value.name() != "head" && value.attr("hidden").is_none() && !display_none
        })
}

fn describe(el: ElementRef<'_>) -> String {
    let value = el.value();
    match (value.attr("data-track"), value.id()) {
        (Some(label), _) => format!("{}[data-track={}]", value.name(), label),
        (None, Some(id)) => format!("{}#{}", value.name(), id),
        (None, None) => value.name().to_string(),
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
