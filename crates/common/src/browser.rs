//! Browser automation seam
//!
//! Flows only ever talk to these traits. A launcher produces a session, a
//! session produces pages, and a page is the handle every UI interaction goes
//! through. Handles are passed explicitly; nothing here is global.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Browser viewport in CSS pixels
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPosition {
    Top,
    Bottom,
}

/// Options for launching a browser instance
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,

    /// Explicit Chrome/Chromium binary (None = auto-detect)
    pub chrome_executable: Option<PathBuf>,

    /// Extra command-line flags passed to the browser
    pub args: Vec<String>,

    /// Initial window size
    pub viewport: Viewport,

    /// Upper bound for a single DevTools request, navigation included
    pub request_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            args: Vec::new(),
            viewport: Viewport::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl LaunchOptions {
    /// Flags for constrained environments (containers, CI runners): no
    /// sandbox, no background compositor, no /dev/shm.
    pub fn report_defaults() -> Self {
        Self {
            args: [
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-web-security",
                "--disable-features=VizDisplayCompositor",
                "--disable-dev-shm-usage",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            viewport: Viewport {
                width: 1200,
                height: 900,
            },
            ..Default::default()
        }
    }
}

/// Paginated PDF rendering options.
///
/// Physical sizes are in millimetres and margins in CSS pixels; engines
/// convert to whatever unit they need.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub paper_width_mm: f64,
    pub paper_height_mm: f64,
    pub margin_top_px: f64,
    pub margin_right_px: f64,
    pub margin_bottom_px: f64,
    pub margin_left_px: f64,
    pub print_background: bool,
    pub display_header_footer: bool,
    pub header_template: String,
    pub footer_template: String,
    pub prefer_css_page_size: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            paper_width_mm: 210.0,
            paper_height_mm: 297.0,
            margin_top_px: 0.0,
            margin_right_px: 0.0,
            margin_bottom_px: 0.0,
            margin_left_px: 0.0,
            print_background: false,
            display_header_footer: false,
            header_template: String::new(),
            footer_template: String::new(),
            prefer_css_page_size: false,
        }
    }
}

/// A marker doubles as an attribute name and a CSS identifier: an ASCII
/// letter followed by letters, digits, `-` or `_`.
pub fn is_valid_marker(marker: &str) -> bool {
    let mut chars = marker.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }
        _ => false,
    }
}

/// Starts browser instances
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>>;
}

/// A running browser instance, exclusively owned by one flow
#[async_trait]
pub trait BrowserSession: Send {
    /// Open a new blank tab
    async fn new_page(&mut self) -> Result<Arc<dyn BrowserPage>>;

    /// Close the browser and wait for its process to exit
    async fn close(&mut self) -> Result<()>;
}

/// A single browser tab
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait (bounded by `timeout`) until the network goes quiet
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Single probe: is any element matching the selector list rendered?
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Text content of every element matching the selector list
    async fn texts(&self, selector: &str) -> Result<Vec<String>>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Press a key (e.g. `Enter`) with the first match focused
    async fn press(&self, selector: &str, key: &str) -> Result<()>;

    /// Attach local files to the first matching `<input type="file">`.
    /// Paths must be absolute.
    async fn upload(&self, selector: &str, files: &[PathBuf]) -> Result<()>;

    /// Attribute of the first match; `None` when the attribute is absent.
    /// Fails with `ElementNotFound` when nothing matches.
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Click the innermost element whose trimmed text equals `label`.
    /// Returns `false` when no such element exists.
    async fn click_text(&self, label: &str) -> Result<bool>;

    /// Tag every element currently matching `selector` with `marker` and a
    /// stable index, returning how many were tagged. `marker` must satisfy
    /// [`is_valid_marker`].
    async fn mark_all(&self, selector: &str, marker: &str) -> Result<usize>;

    /// Click the `index`-th element tagged by [`BrowserPage::mark_all`]
    async fn click_marked(&self, marker: &str, index: usize, scroll_into_view: bool) -> Result<()>;

    async fn scroll_to(&self, position: ScrollPosition) -> Result<()>;

    /// PNG screenshot of the viewport, or of the whole document
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    async fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>>;
}
