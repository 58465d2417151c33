//! Scripted in-memory browser for tests
//!
//! `ScriptedPage` answers every [`BrowserPage`] call from a small script and
//! records what it was asked to do, so flows can be checked without a real
//! Chrome. Enable with the `testing` feature.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::browser::{
    is_valid_marker, BrowserLauncher, BrowserPage, BrowserSession, LaunchOptions, PdfOptions, ScrollPosition,
    Viewport,
};
use crate::error::{BrowserError, Result};

/// Minimal PNG signature plus padding
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";

/// One recorded interaction
#[derive(Debug, Clone, PartialEq)]
pub enum PageCall {
    Goto(String),
    SetViewport(Viewport),
    Click(String),
    Fill { selector: String, value: String },
    Press { selector: String, key: String },
    Upload { selector: String, files: Vec<PathBuf> },
    ClickText(String),
    MarkAll { selector: String, marker: String },
    ClickMarked { selector: String, index: usize, scroll_into_view: bool },
    Scroll(ScrollPosition),
    Screenshot { full_page: bool },
    PrintPdf(PdfOptions),
}

#[derive(Default)]
struct PageState {
    url: String,
    visible_after: HashMap<String, usize>,
    probes: HashMap<String, usize>,
    texts: HashMap<String, Vec<String>>,
    texts_gone_after: HashMap<String, usize>,
    text_reads: HashMap<String, usize>,
    attributes: HashMap<String, HashMap<String, String>>,
    labels: HashSet<String>,
    targets: HashMap<String, usize>,
    markers: HashMap<String, String>,
    failing_clicks: HashSet<(String, usize)>,
    failing_selectors: HashSet<String>,
    navigations: HashMap<String, String>,
    fail_probes: bool,
    fail_navigation: bool,
    hang_navigation: bool,
    fail_screenshot: bool,
    fail_pdf: bool,
    screenshot: Vec<u8>,
    pdf: Vec<u8>,
    calls: Vec<PageCall>,
}

pub struct ScriptedPage {
    state: Mutex<PageState>,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                screenshot: FAKE_PNG.to_vec(),
                pdf: FAKE_PDF.to_vec(),
                ..Default::default()
            }),
        }
    }

    /// `selector` turns visible on the probe after `after_probes` misses
    pub fn with_visible(self, selector: &str, after_probes: usize) -> Self {
        self.state
            .lock()
            .visible_after
            .insert(selector.to_string(), after_probes);
        self
    }

    pub fn with_text(self, selector: &str, text: &str) -> Self {
        self.state
            .lock()
            .texts
            .entry(selector.to_string())
            .or_default()
            .push(text.to_string());
        self
    }

    /// Texts under `selector` disappear after `reads` lookups
    pub fn texts_gone_after(self, selector: &str, reads: usize) -> Self {
        self.state
            .lock()
            .texts_gone_after
            .insert(selector.to_string(), reads);
        self
    }

    /// The first element matching `selector` carries `name="value"`
    pub fn with_attribute(self, selector: &str, name: &str, value: &str) -> Self {
        self.state
            .lock()
            .attributes
            .entry(selector.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_label(self, label: &str) -> Self {
        self.state.lock().labels.insert(label.to_string());
        self
    }

    /// `count` elements match `selector` when a batch is marked
    pub fn with_targets(self, selector: &str, count: usize) -> Self {
        self.state.lock().targets.insert(selector.to_string(), count);
        self
    }

    /// Clicking `label` (via `click_text`) or `selector` (via `click`) moves to `url`
    pub fn navigates_on(self, trigger: &str, url: &str) -> Self {
        self.state
            .lock()
            .navigations
            .insert(trigger.to_string(), url.to_string());
        self
    }

    pub fn with_screenshot(self, bytes: &[u8]) -> Self {
        self.state.lock().screenshot = bytes.to_vec();
        self
    }

    pub fn fail_click_at(self, selector: &str, index: usize) -> Self {
        self.state
            .lock()
            .failing_clicks
            .insert((selector.to_string(), index));
        self
    }

    pub fn fail_click_on(self, selector: &str) -> Self {
        self.state.lock().failing_selectors.insert(selector.to_string());
        self
    }

    pub fn fail_probes(self) -> Self {
        self.state.lock().fail_probes = true;
        self
    }

    pub fn fail_navigation(self) -> Self {
        self.state.lock().fail_navigation = true;
        self
    }

    /// Navigation never completes, whatever timeout the caller passes
    pub fn hang_navigation(self) -> Self {
        self.state.lock().hang_navigation = true;
        self
    }

    pub fn fail_screenshot(self) -> Self {
        self.state.lock().fail_screenshot = true;
        self
    }

    pub fn fail_pdf(self) -> Self {
        self.state.lock().fail_pdf = true;
        self
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.state.lock().calls.clone()
    }

    pub fn probe_count(&self, selector: &str) -> usize {
        self.state.lock().probes.get(selector).copied().unwrap_or(0)
    }

    /// Indices of `selector` that received a click attempt, in order
    pub fn marked_clicks(&self, selector: &str) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PageCall::ClickMarked { selector: s, index, .. } if s == selector => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn clicked_labels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PageCall::ClickText(label) => Some(label),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PageCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        let (fail, hang) = {
            let mut state = self.state.lock();
            state.calls.push(PageCall::Goto(url.to_string()));
            (state.fail_navigation, state.hang_navigation)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        self.state.lock().url = url.to_string();
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.record(PageCall::SetViewport(viewport));
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.fail_probes {
            return Err(BrowserError::Script("probe failed".to_string()));
        }
        let probes = state.probes.entry(selector.to_string()).or_insert(0);
        *probes += 1;
        let seen = *probes;
        Ok(state
            .visible_after
            .get(selector)
            .map(|after| seen > *after)
            .unwrap_or(false))
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        if state.fail_probes {
            return Err(BrowserError::Script("probe failed".to_string()));
        }
        let reads = state.text_reads.entry(selector.to_string()).or_insert(0);
        *reads += 1;
        let seen = *reads;
        if let Some(after) = state.texts_gone_after.get(selector) {
            if seen > *after {
                return Ok(Vec::new());
            }
        }
        Ok(state.texts.get(selector).cloned().unwrap_or_default())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PageCall::Click(selector.to_string()));
        if state.failing_selectors.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        if let Some(url) = state.navigations.get(selector).cloned() {
            state.url = url;
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PageCall::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        });
        if state.failing_selectors.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn press(&self, selector: &str, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PageCall::Press {
            selector: selector.to_string(),
            key: key.to_string(),
        });
        if state.failing_selectors.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn upload(&self, selector: &str, files: &[PathBuf]) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PageCall::Upload {
            selector: selector.to_string(),
            files: files.to_vec(),
        });
        if state.failing_selectors.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let state = self.state.lock();
        if state.fail_probes {
            return Err(BrowserError::Script("probe failed".to_string()));
        }
        state
            .attributes
            .get(selector)
            .map(|attrs| attrs.get(name).cloned())
            .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))
    }

    async fn click_text(&self, label: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.push(PageCall::ClickText(label.to_string()));
        if !state.labels.contains(label) {
            return Ok(false);
        }
        if let Some(url) = state.navigations.get(label).cloned() {
            state.url = url;
        }
        Ok(true)
    }

    async fn mark_all(&self, selector: &str, marker: &str) -> Result<usize> {
        let mut state = self.state.lock();
        state.calls.push(PageCall::MarkAll {
            selector: selector.to_string(),
            marker: marker.to_string(),
        });
        if !is_valid_marker(marker) {
            return Err(BrowserError::Script(format!(
                "'{marker}' is not a valid attribute name"
            )));
        }
        state.markers.insert(marker.to_string(), selector.to_string());
        Ok(state.targets.get(selector).copied().unwrap_or(0))
    }

    async fn click_marked(&self, marker: &str, index: usize, scroll_into_view: bool) -> Result<()> {
        let mut state = self.state.lock();
        let selector = state
            .markers
            .get(marker)
            .cloned()
            .ok_or_else(|| BrowserError::ElementNotFound(marker.to_string()))?;
        state.calls.push(PageCall::ClickMarked {
            selector: selector.clone(),
            index,
            scroll_into_view,
        });
        if state.failing_clicks.contains(&(selector.clone(), index)) {
            return Err(BrowserError::Script(format!(
                "element {index} of {selector} is detached"
            )));
        }
        Ok(())
    }

    async fn scroll_to(&self, position: ScrollPosition) -> Result<()> {
        self.record(PageCall::Scroll(position));
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.calls.push(PageCall::Screenshot { full_page });
        if state.fail_screenshot {
            return Err(BrowserError::Script("screenshot failed".to_string()));
        }
        Ok(state.screenshot.clone())
    }

    async fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.calls.push(PageCall::PrintPdf(options.clone()));
        if state.fail_pdf {
            return Err(BrowserError::Script("Printing failed".to_string()));
        }
        Ok(state.pdf.clone())
    }
}

/// Launcher handing out sessions backed by one shared [`ScriptedPage`]
pub struct ScriptedLauncher {
    page: Arc<ScriptedPage>,
    fail_launch: bool,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    last_options: Mutex<Option<LaunchOptions>>,
}

impl ScriptedLauncher {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page: Arc::new(page),
            fail_launch: false,
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            last_options: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(ScriptedPage::new())
        }
    }

    pub fn page(&self) -> &ScriptedPage {
        &self.page
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<LaunchOptions> {
        self.last_options.lock().clone()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());
        if self.fail_launch {
            return Err(BrowserError::Launch(
                "Could not auto detect a chrome executable".to_string(),
            ));
        }
        Ok(Box::new(ScriptedSession {
            page: Arc::clone(&self.page),
            closes: Arc::clone(&self.closes),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    page: Arc<ScriptedPage>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn new_page(&mut self) -> Result<Arc<dyn BrowserPage>> {
        if self.closed {
            return Err(BrowserError::Closed);
        }
        let page: Arc<dyn BrowserPage> = self.page.clone();
        Ok(page)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
