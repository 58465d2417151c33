//! Declarative YAML scenarios

use std::path::Path;

use kbqa_common::Viewport;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Overrides the runner's base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Viewport size for the browser
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,
}

fn default_viewport() -> Viewport {
    Viewport {
        width: 1280,
        height: 720,
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Navigate to a URL (relative to base)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Fill an input field; `${VAR}` is expanded from the environment
    Fill { selector: String, value: String },

    /// Click an element by CSS selector; `${VAR}` is expanded
    Click { selector: String },

    /// Click the element whose visible text is exactly `text`; `${VAR}` is expanded
    ClickText { text: String },

    /// Send a key (e.g. `Enter`, `Escape`) to a focused element
    Press { selector: String, key: String },

    /// Set the files of an `<input type="file">`. Relative paths resolve
    /// against the specs directory; `${VAR}` is expanded.
    Upload { selector: String, path: String },

    /// Wait until an element contains the given text
    ExpectText {
        selector: String,
        contains: String,
        #[serde(default = "default_expect_timeout")]
        timeout_ms: u64,
    },

    /// Wait until no element matching `selector` contains the text
    ExpectNoText {
        selector: String,
        contains: String,
        #[serde(default = "default_expect_timeout")]
        timeout_ms: u64,
    },

    /// Wait until an attribute of the first match contains a value
    ExpectAttribute {
        selector: String,
        name: String,
        contains: String,
        #[serde(default = "default_expect_timeout")]
        timeout_ms: u64,
    },

    /// Wait until an element is visible
    ExpectVisible {
        selector: String,
        #[serde(default = "default_expect_timeout")]
        timeout_ms: u64,
    },

    /// Wait until the page URL matches a regex
    WaitUrl {
        pattern: String,
        #[serde(default = "default_expect_timeout")]
        timeout_ms: u64,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Screenshot the toast if one shows up; never fails
    CaptureToast,

    /// Take a screenshot and attach it
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_expect_timeout() -> u64 {
    10_000
}

impl ScenarioStep {
    /// Short label used in logs and results
    pub fn label(&self) -> String {
        match self {
            ScenarioStep::Navigate { url, .. } => format!("navigate:{}", url),
            ScenarioStep::Fill { selector, .. } => format!("fill:{}", selector),
            ScenarioStep::Click { selector } => format!("click:{}", selector),
            ScenarioStep::ClickText { text } => format!("click_text:{}", text),
            ScenarioStep::Press { key, .. } => format!("press:{}", key),
            ScenarioStep::Upload { path, .. } => format!("upload:{}", path),
            ScenarioStep::ExpectNoText { contains, .. } => format!("expect_no_text:{}", contains),
            ScenarioStep::ExpectAttribute { name, contains, .. } => {
                format!("expect_attribute:{}~{}", name, contains)
            }
            ScenarioStep::ExpectText { contains, .. } => format!("expect_text:{}", contains),
            ScenarioStep::ExpectVisible { selector, .. } => format!("expect_visible:{}", selector),
            ScenarioStep::WaitUrl { pattern, .. } => format!("wait_url:{}", pattern),
            ScenarioStep::Sleep { ms } => format!("sleep:{}ms", ms),
            ScenarioStep::CaptureToast => "capture_toast".to_string(),
            ScenarioStep::Screenshot { name, .. } => format!("screenshot:{}", name),
            ScenarioStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        if scenario.steps.is_empty() {
            return Err(E2eError::SpecParse(format!(
                "scenario '{}' has no steps",
                scenario.name
            )));
        }
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }
}
