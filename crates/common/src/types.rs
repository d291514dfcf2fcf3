//! Core analytics types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::warn;

use crate::{Error, Result};

/// Which storefront page a click originated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageContext {
    Helmets,
    Glasses,
}

impl PageContext {
    /// Value used in the `data-page-context` body attribute
    pub fn as_attr(&self) -> &'static str {
        match self {
            PageContext::Helmets => "helmets",
            PageContext::Glasses => "glasses",
        }
    }
}

impl std::fmt::Display for PageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageContext::Helmets => write!(f, "helmets page"),
            PageContext::Glasses => write!(f, "glasses page"),
        }
    }
}

impl FromStr for PageContext {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "helmets" | "helmets page" => Ok(PageContext::Helmets),
            "glasses" | "glasses page" => Ok(PageContext::Glasses),
            other => Err(Error::UnknownPageContext(other.to_string())),
        }
    }
}

/// A single activation of a tracked control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub page_context: PageContext,
}

impl ClickEvent {
    /// Create an event stamped with the current time
    pub fn now(label: impl Into<String>, page_context: PageContext) -> Self {
        Self {
            label: label.into(),
            timestamp: Utc::now(),
            page_context,
        }
    }
}

/// Read-only snapshot returned by `getAnalyticsData`.
///
/// This is also the persisted layout:
/// `{"totalClicks": N, "clicks": {"<label>": [ClickEvent, ...]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
    pub total_clicks: u64,
    #[serde(default)]
    pub clicks: BTreeMap<String, Vec<ClickEvent>>,
}

impl AnalyticsData {
    /// Number of events recorded for `label`
    pub fn count_for(&self, label: &str) -> usize {
        self.clicks.get(label).map(Vec::len).unwrap_or(0)
    }

    /// Labels that have at least one event
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.clicks.keys().map(String::as_str)
    }
}

/// Click log that keeps `total_clicks` equal to the number of stored events.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsState {
    data: AnalyticsData,
}

impl AnalyticsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to its label's sequence
    pub fn push(&mut self, event: ClickEvent) -> u64 {
        self.data
            .clicks
            .entry(event.label.clone())
            .or_default()
            .push(event);
        self.data.total_clicks += 1;
        self.data.total_clicks
    }

    pub fn total_clicks(&self) -> u64 {
        self.data.total_clicks
    }

    pub fn count_for(&self, label: &str) -> usize {
        self.data.count_for(label)
    }

    pub fn is_empty(&self) -> bool {
        self.data.total_clicks == 0
    }

    pub fn snapshot(&self) -> AnalyticsData {
        self.data.clone()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.data)?)
    }

    /// Restore from the persisted layout.
    ///
    /// The total is always recomputed from the event lists.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut data: AnalyticsData = serde_json::from_str(json)?;
        data.clicks.retain(|_, events| !events.is_empty());

        let counted: u64 = data.clicks.values().map(|events| events.len() as u64).sum();
        if counted != data.total_clicks {
            warn!(
                stored = data.total_clicks,
                counted, "Stored click total disagrees with event log, using event count"
            );
            data.total_clicks = counted;
        }

        Ok(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("helmets", PageContext::Helmets ; "attribute helmets")]
    #[test_case("glasses", PageContext::Glasses ; "attribute glasses")]
    #[test_case("helmets page", PageContext::Helmets ; "phrase helmets")]
    #[test_case(" glasses page ", PageContext::Glasses ; "padded phrase glasses")]
    fn test_parse_page_context(input: &str, expected: PageContext) {
        assert_eq!(input.parse::<PageContext>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_page_context() {
        assert!(matches!(
            "checkout".parse::<PageContext>(),
            Err(Error::UnknownPageContext(_))
        ));
    }

    #[test]
    fn test_page_context_phrase() {
        assert_eq!(PageContext::Helmets.to_string(), "helmets page");
        assert_eq!(PageContext::Glasses.to_string(), "glasses page");
    }

    #[test]
    fn test_total_matches_event_count() {
        let mut state = AnalyticsState::new();
        let labels = ["explore-collection", "view-glasses", "explore-collection"];
        for label in labels {
            state.push(ClickEvent::now(label, PageContext::Helmets));
        }

        assert_eq!(state.total_clicks(), 3);
        assert_eq!(state.count_for("explore-collection"), 2);
        assert_eq!(state.count_for("view-glasses"), 1);
        assert_eq!(state.count_for("back-to-helmets"), 0);
    }

    #[test]
    fn test_events_keep_insertion_order() {
        let mut state = AnalyticsState::new();
        state.push(ClickEvent::now("explore-collection", PageContext::Helmets));
        state.push(ClickEvent::now("explore-collection", PageContext::Glasses));

        let snapshot = state.snapshot();
        let events = &snapshot.clicks["explore-collection"];
        assert_eq!(events[0].page_context, PageContext::Helmets);
        assert_eq!(events[1].page_context, PageContext::Glasses);
        assert!(events[0].timestamp <= events[1].timestamp);
    }

    #[test]
    fn test_persisted_layout_uses_camel_case() {
        let mut state = AnalyticsState::new();
        state.push(ClickEvent::now("view-glasses", PageContext::Helmets));

        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(json["totalClicks"], 1);
        assert_eq!(json["clicks"]["view-glasses"][0]["pageContext"], "helmets");
    }

    #[test]
    fn test_restore_recomputes_total() {
        let json = r#"{
            "totalClicks": 7,
            "clicks": {
                "shop-glasses-collection": [
                    {"label": "shop-glasses-collection", "timestamp": "2024-05-01T10:00:00Z", "pageContext": "glasses"}
                ],
                "empty": []
            }
        }"#;

        let state = AnalyticsState::from_json(json).unwrap();
        assert_eq!(state.total_clicks(), 1);
        assert_eq!(state.snapshot().labels().collect::<Vec<_>>(), vec!["shop-glasses-collection"]);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(matches!(
            AnalyticsState::from_json("not json"),
            Err(Error::Serialization(_))
        ));
    }
}
