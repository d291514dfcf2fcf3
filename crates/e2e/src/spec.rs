//! Declarative YAML test specification

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use bikegear_common::{FailureMode, PersistenceMode};

use crate::error::{E2eError, E2eResult};

/// A complete test specification parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size; the runner's default when absent
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Whether pages run their analytics script
    #[serde(default = "default_javascript")]
    pub javascript: bool,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

fn default_javascript() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Viewport {
    pub const MOBILE: Viewport = Viewport {
        width: 375,
        height: 667,
    };

    pub fn is_mobile(&self) -> bool {
        self.width < 768
    }
}

/// A single step in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to the current page, or the base URL)
    Navigate {
        url: String,
        #[serde(default)]
        expect_status: Option<u16>,
    },

    /// Load the current URL again
    Reload,

    /// Click an element
    Click { selector: String },

    /// Tap an element (touch input)
    Tap { selector: String },

    /// Focus an element
    Focus { selector: String },

    /// Press a key, optionally focusing an element first
    Press {
        #[serde(default)]
        selector: Option<String>,
        key: String,
    },

    /// Wait for a fixed amount of time
    Sleep { ms: u64 },

    /// Assert something about an element
    Assert {
        selector: String,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        attribute: Option<AttributeAssertion>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        has_class: Option<String>,
        #[serde(default)]
        lacks_class: Option<String>,
    },

    /// Assert on the document as a whole
    AssertPage {
        #[serde(default)]
        title_contains: Option<String>,
        /// Regex over the title
        #[serde(default)]
        title_matches: Option<String>,
        /// Regex over the current URL
        #[serde(default)]
        url_matches: Option<String>,
    },

    /// Assert on the recorder's snapshot
    AssertAnalytics {
        /// Whether a recorder is running on the page
        #[serde(default)]
        initialized: Option<bool>,
        #[serde(default)]
        total_clicks: Option<u64>,
        #[serde(default)]
        min_total_clicks: Option<u64>,
        /// Labels that must be present
        #[serde(default)]
        labels: Vec<String>,
        /// Exact per-label event counts
        #[serde(default)]
        label_counts: BTreeMap<String, usize>,
        #[serde(default)]
        persistence: Option<PersistenceMode>,
    },

    /// Assert on console output
    AssertConsole {
        contains: String,
        /// Exact number of matching lines; at least one when absent
        #[serde(default)]
        count: Option<usize>,
    },

    /// Remove everything from the session's local storage
    ClearStorage,

    /// Make local storage fail for subsequent page loads
    DisableStorage {
        #[serde(default)]
        mode: FailureMode,
    },

    /// Undo `disable_storage` for subsequent page loads
    EnableStorage,

    /// Toggle scripting for subsequent page loads
    SetJavascript { enabled: bool },

    SetViewport { width: u32, height: u32 },

    /// Log a message (for debugging)
    Log { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeAssertion {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
}

impl TestStep {
    /// Short description used in logs and results
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate({})", url),
            TestStep::Reload => "reload".to_string(),
            TestStep::Click { selector } => format!("click({})", selector),
            TestStep::Tap { selector } => format!("tap({})", selector),
            TestStep::Focus { selector } => format!("focus({})", selector),
            TestStep::Press { selector: Some(s), key } => format!("press({}, {})", s, key),
            TestStep::Press { selector: None, key } => format!("press({})", key),
            TestStep::Sleep { ms } => format!("sleep({}ms)", ms),
            TestStep::Assert { selector, .. } => format!("assert({})", selector),
            TestStep::AssertPage { .. } => "assert_page".to_string(),
            TestStep::AssertAnalytics { .. } => "assert_analytics".to_string(),
            TestStep::AssertConsole { contains, .. } => format!("assert_console({})", contains),
            TestStep::ClearStorage => "clear_storage".to_string(),
            TestStep::DisableStorage { mode } => format!("disable_storage({:?})", mode),
            TestStep::EnableStorage => "enable_storage".to_string(),
            TestStep::SetJavascript { enabled } => format!("set_javascript({})", enabled),
            TestStep::SetViewport { width, height } => format!("set_viewport({}x{})", width, height),
            TestStep::Log { message } => format!("log({})", message),
        }
    }
}

impl TestSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        if spec.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("{} has no steps", spec.name)));
        }
        Ok(spec)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}
