//! Exporter configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use kbqa_common::{LaunchOptions, Viewport};
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Allure raw results produced by the test run
    pub results_dir: PathBuf,

    /// Where the PDF is written
    pub output_path: PathBuf,

    /// Upper bound for everything between browser launch and the PDF write.
    /// The expand batch has no size limit and settles after every click, so
    /// very large reports need a higher value than the default 30 minutes.
    pub capture_timeout_secs: u64,

    /// Top-level report sections, clicked in order by visible text
    pub sections: Vec<String>,

    /// Report server configuration
    pub server: ServerConfig,

    /// Browser configuration
    pub browser: BrowserSettings,

    /// Settle delays
    pub delays: Delays,

    /// Expansion batches
    pub expand: ExpandConfig,

    /// Page layout of the exported PDF
    pub pdf: PdfLayout,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("allure-results"),
            output_path: PathBuf::from("test-report.pdf"),
            capture_timeout_secs: 30 * 60,
            sections: ["Suites", "Behaviors", "Packages", "Overview"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            server: ServerConfig::default(),
            browser: BrowserSettings::default(),
            delays: Delays::default(),
            expand: ExpandConfig::default(),
            pdf: PdfLayout::default(),
        }
    }
}

/// Report server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Report CLI binary
    pub program: String,

    /// Full argument list (None = `serve <results_dir> --port <port>`)
    pub args: Option<Vec<String>>,

    /// Port the report is served on
    pub port: u16,

    /// Maximum warm-up before navigating to the report
    pub warmup_ms: u64,

    /// Interval between readiness probes
    pub probe_interval_ms: u64,

    /// Time between SIGTERM and SIGKILL on shutdown
    pub kill_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: "allure".to_string(),
            args: None,
            port: 63346,
            warmup_ms: 10_000,
            probe_interval_ms: 250,
            kill_grace_ms: 2_000,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Arguments the server is spawned with
    pub fn command_args(&self, results_dir: &Path) -> Vec<String> {
        match &self.args {
            Some(args) => args.clone(),
            None => vec![
                "serve".to_string(),
                results_dir.display().to_string(),
                "--port".to_string(),
                self.port.to_string(),
            ],
        }
    }
}

/// Browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,

    /// Chrome/Chromium binary (None = auto-detect)
    pub chrome_executable: Option<PathBuf>,

    /// Extra browser flags
    pub args: Vec<String>,

    /// Bound for the initial load of the report page
    pub navigation_timeout_secs: u64,

    pub viewport: Viewport,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        let defaults = LaunchOptions::report_defaults();
        Self {
            headless: defaults.headless,
            chrome_executable: None,
            args: defaults.args,
            navigation_timeout_secs: 180,
            viewport: defaults.viewport,
        }
    }
}

impl BrowserSettings {
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless,
            chrome_executable: self.chrome_executable.clone(),
            args: self.args.clone(),
            viewport: self.viewport,
            request_timeout: self.navigation_timeout(),
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// Fixed settle delays, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    /// After the report page has loaded
    pub content_ms: u64,

    /// After each successful section click
    pub section_ms: u64,

    /// After each expand control click
    pub expand_ms: u64,

    /// After each test link click
    pub link_ms: u64,

    /// After each scroll
    pub scroll_ms: u64,

    /// Before the PDF is printed
    pub final_ms: u64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            content_ms: 20_000,
            section_ms: 5_000,
            expand_ms: 300,
            link_ms: 1_500,
            scroll_ms: 3_000,
            final_ms: 15_000,
        }
    }
}

impl Delays {
    /// No settling at all
    pub fn none() -> Self {
        Self {
            content_ms: 0,
            section_ms: 0,
            expand_ms: 0,
            link_ms: 0,
            scroll_ms: 0,
            final_ms: 0,
        }
    }
}

/// Selectors for the expansion batches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandConfig {
    /// Collapsed tree nodes and toggles
    pub expand_selector: String,

    /// Links into individual test cases
    pub link_selector: String,

    /// Only the first `link_limit` links are opened
    pub link_limit: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            expand_selector:
                r#".fa-chevron-right, .expand-button, button[data-toggle="collapse"], .collapsed"#
                    .to_string(),
            link_selector: r##"a[href*="#"], .test-link, [data-test-uid], .test-item"##
                .to_string(),
            link_limit: 20,
        }
    }
}

/// PDF page layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfLayout {
    pub title: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin_top_px: f64,
    pub margin_right_px: f64,
    pub margin_bottom_px: f64,
    pub margin_left_px: f64,
}

impl Default for PdfLayout {
    fn default() -> Self {
        Self {
            title: "Test Execution Report".to_string(),
            width_mm: 210.0,
            height_mm: 297.0,
            margin_top_px: 40.0,
            margin_right_px: 20.0,
            margin_bottom_px: 40.0,
            margin_left_px: 20.0,
        }
    }
}

impl ExporterConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> ExportResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> ExportResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ExportError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> ExportResult<()> {
        if self.server.program.trim().is_empty() {
            return Err(ExportError::Config("server.program is empty".to_string()));
        }
        if self.capture_timeout_secs == 0 {
            return Err(ExportError::Config(
                "capture_timeout_secs must be positive".to_string(),
            ));
        }
        if self.pdf.width_mm <= 0.0 || self.pdf.height_mm <= 0.0 {
            return Err(ExportError::Config("pdf page size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }
}
