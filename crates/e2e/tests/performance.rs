//! Load times and recorder throughput

mod common;

use bikegear_common::{AnalyticsConfig, AnalyticsRecorder, MemoryStorage, PageContext, TracingSurface};
use bikegear_e2e::BrowserConfig;
use common::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn pages_load_quickly() {
    let server = serve().await;
    let mut browser = session(&server);

    for path in ["/", "/glasses.html"] {
        let start = Instant::now();
        browser.goto(path).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(3), "{path} took {:?}", start.elapsed());
    }
}

#[tokio::test]
async fn navigation_is_fast() {
    let server = serve().await;
    let mut browser = session(&server);
    browser.goto("/").await.unwrap();

    let start = Instant::now();
    browser.click(VIEW_GLASSES).await.unwrap();
    browser.click(BACK_TO_HELMETS).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn analytics_adds_little_load_time() {
    let server = serve().await;

    let mut scripted = session(&server);
    let start = Instant::now();
    scripted.goto("/").await.unwrap();
    let with_script = start.elapsed();

    let mut plain = session_with(
        &server,
        BrowserConfig {
            javascript_enabled: false,
            ..BrowserConfig::default()
        },
    );
    let start = Instant::now();
    plain.goto("/").await.unwrap();
    let without_script = start.elapsed();

    assert!(with_script < without_script + Duration::from_secs(1));
}

#[tokio::test]
async fn storage_operations_are_efficient() {
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = AnalyticsRecorder::init(
        PageContext::Helmets,
        storage,
        Arc::new(TracingSurface),
        &AnalyticsConfig::default(),
    );

    let start = Instant::now();
    for i in 0..100 {
        recorder.record(&format!("button-{}", i % 10), PageContext::Helmets);
    }

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(recorder.total_clicks(), 100);
    assert_eq!(recorder.analytics_data().count_for("button-3"), 10);
}

#[tokio::test]
async fn handles_rapid_interactions() {
    let server = serve().await;
    let mut browser = session(&server);
    browser.goto("/").await.unwrap();

    for _ in 0..10 {
        browser.click(EXPLORE).await.unwrap();
    }

    let data = browser.analytics_data().unwrap();
    assert_eq!(data.total_clicks, 10);
    assert_eq!(data.count_for("explore-collection"), 10);
    assert_eq!(browser.page().unwrap().text("#click-count").unwrap(), "10");
    assert!(browser.page().unwrap().has_class("#analytics-info", "show").unwrap());
}
