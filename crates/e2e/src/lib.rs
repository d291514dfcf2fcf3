//! Bike Gear E2E Test Framework
//!
//! Drives the storefront the way the original browser suites did, without a
//! browser engine:
//! - Runs the site server in-process on an ephemeral port
//! - Loads pages over HTTP and queries them with CSS selectors
//! - Runs the analytics recorder on every scripted page load, sharing one
//!   local storage per browser session
//! - Parses declarative YAML test specs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start_server() -> ServerHandle                       │
//! │    ├── run_spec(spec) -> TestResult                         │
//! │    └── write_results(suite)                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserSession                                             │
//! │    ├── goto / reload / click / tap / press                  │
//! │    ├── LocalStorage (persists across navigations)           │
//! │    └── Page                                                 │
//! │          ├── scraper::Html                                  │
//! │          ├── DomOverlay (counter, banner, console)          │
//! │          └── AnalyticsRecorder                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod error;
pub mod page;
pub mod runner;
pub mod server;
pub mod spec;

pub use browser::{BrowserConfig, BrowserSession, StepResult};
pub use error::{E2eError, E2eResult};
pub use page::{ConsoleMessage, Page};
pub use runner::{RunnerConfig, TestRunner};
pub use server::{ServerConfig, ServerHandle};
pub use spec::{TestSpec, TestStep, Viewport};
