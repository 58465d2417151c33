//! Chromium over the DevTools protocol (chromiumoxide)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace};

use crate::browser::{
    is_valid_marker, BrowserLauncher, BrowserPage, BrowserSession, LaunchOptions, PdfOptions,
    ScrollPosition, Viewport,
};
use crate::error::{BrowserError, Result};

const MM_PER_INCH: f64 = 25.4;
const CSS_PX_PER_INCH: f64 = 96.0;

/// How long the resource count must stay flat to call the network quiet
const QUIET_WINDOW: Duration = Duration::from_millis(500);
const QUIET_POLL: Duration = Duration::from_millis(250);

/// Launches a local Chrome/Chromium
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.viewport.width, options.viewport.height)
            .request_timeout(options.request_timeout);

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &options.args {
            builder = builder.arg(arg.as_str());
        }

        let config = builder.build().map_err(BrowserError::Launch)?;

        info!(headless = options.headless, "Launching browser");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("CDP handler event error: {}", e);
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            handler_task: Some(handler_task),
        }))
    }
}

struct ChromiumSession {
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&mut self) -> Result<Arc<dyn BrowserPage>> {
        let browser = self.browser.as_ref().ok_or(BrowserError::Closed)?;
        let page = browser.new_page("about:blank").await?;
        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut browser) = self.browser.take() {
            debug!("Closing browser");
            browser.close().await?;
            browser.wait().await?;
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Browser's own Drop kills the process; only the handler needs stopping.
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}

struct ChromiumPage {
    page: Page,
}

#[derive(Deserialize)]
struct AttributeProbe {
    found: bool,
    value: Option<String>,
}

#[derive(Deserialize)]
struct LoadState {
    ready: String,
    resources: u64,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(BrowserError::Script)?;

        let result = self.page.evaluate_expression(params).await?;
        Ok(result.into_value()?)
    }

    /// Wait until the document is complete and no new resources have been
    /// requested for [`QUIET_WINDOW`]. Callers bound this with a timeout.
    async fn wait_for_network_quiet(&self) -> Result<()> {
        let mut last: Option<u64> = None;
        let mut quiet_for = Duration::ZERO;

        loop {
            let state: LoadState = self
                .eval(
                    "({ ready: document.readyState, \
                        resources: performance.getEntriesByType('resource').length })"
                        .to_string(),
                )
                .await?;

            if state.ready == "complete" && last == Some(state.resources) {
                quiet_for += QUIET_POLL;
                if quiet_for >= QUIET_WINDOW {
                    return Ok(());
                }
            } else {
                quiet_for = Duration::ZERO;
            }
            last = Some(state.resources);
            sleep(QUIET_POLL).await;
        }
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str, limit: Duration) -> Result<()> {
        debug!("Navigating to {}", url);

        let navigation = async {
            self.page.goto(url).await?;
            self.wait_for_network_quiet().await
        };

        match timeout(limit, navigation).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(BrowserError::Cdp(e))) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BrowserError::timeout(format!("navigation to {}", url), limit)),
        }
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport.width))
            .height(i64::from(viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(BrowserError::Script)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        self.eval(visibility_script(selector)).await
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        self.eval(format!(
            "Array.from(document.querySelectorAll({sel}))\
                .map((el) => (el.innerText || el.textContent || '').trim())",
            sel = js_string(selector),
        ))
        .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element.click().await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let _: bool = self.eval(fill_script(selector, value)).await?;
        Ok(())
    }

    async fn press(&self, selector: &str, key: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element.focus().await?;
        element.press_key(key).await?;
        Ok(())
    }

    async fn upload(&self, selector: &str, files: &[PathBuf]) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;

        let mut params = SetFileInputFilesParams::new(
            files
                .iter()
                .map(|f| f.display().to_string())
                .collect::<Vec<_>>(),
        );
        params.backend_node_id = Some(element.backend_node_id);
        self.page.execute(params).await?;
        Ok(())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let found: AttributeProbe = self.eval(attribute_script(selector, name)).await?;
        if !found.found {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        Ok(found.value)
    }

    async fn click_text(&self, label: &str) -> Result<bool> {
        self.eval(click_text_script(label)).await
    }

    async fn mark_all(&self, selector: &str, marker: &str) -> Result<usize> {
        check_marker(marker)?;
        self.eval(format!(
            "(() => {{
                document.querySelectorAll('[' + {marker} + ']')
                    .forEach((el) => el.removeAttribute({marker}));
                const els = document.querySelectorAll({sel});
                els.forEach((el, i) => el.setAttribute({marker}, String(i)));
                return els.length;
            }})()",
            marker = js_string(marker),
            sel = js_string(selector),
        ))
        .await
    }

    async fn click_marked(&self, marker: &str, index: usize, scroll_into_view: bool) -> Result<()> {
        check_marker(marker)?;
        let target = format!("[{}=\"{}\"]", marker, index);
        let _: bool = self
            .eval(format!(
                "(() => {{
                    const el = document.querySelector({target});
                    if (!el) throw new Error('marked element ' + {index} + ' is gone');
                    if ({scroll}) el.scrollIntoView();
                    el.click();
                    return true;
                }})()",
                target = js_string(&target),
                index = index,
                scroll = scroll_into_view,
            ))
            .await?;
        Ok(())
    }

    async fn scroll_to(&self, position: ScrollPosition) -> Result<()> {
        let script = match position {
            ScrollPosition::Top => "(window.scrollTo(0, 0), true)",
            ScrollPosition::Bottom => "(window.scrollTo(0, document.body.scrollHeight), true)",
        };
        let _: bool = self.eval(script.to_string()).await?;
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        Ok(self.page.pdf(pdf_params(options)).await?)
    }
}

fn pdf_params(options: &PdfOptions) -> PrintToPdfParams {
    PrintToPdfParams {
        paper_width: Some(mm_to_inches(options.paper_width_mm)),
        paper_height: Some(mm_to_inches(options.paper_height_mm)),
        margin_top: Some(px_to_inches(options.margin_top_px)),
        margin_right: Some(px_to_inches(options.margin_right_px)),
        margin_bottom: Some(px_to_inches(options.margin_bottom_px)),
        margin_left: Some(px_to_inches(options.margin_left_px)),
        print_background: Some(options.print_background),
        display_header_footer: Some(options.display_header_footer),
        header_template: Some(options.header_template.clone()),
        footer_template: Some(options.footer_template.clone()),
        prefer_css_page_size: Some(options.prefer_css_page_size),
        ..Default::default()
    }
}

fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

fn px_to_inches(px: f64) -> f64 {
    px / CSS_PX_PER_INCH
}

/// Quote a Rust string as a JavaScript string literal
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn check_marker(marker: &str) -> Result<()> {
    if is_valid_marker(marker) {
        Ok(())
    } else {
        Err(BrowserError::Script(format!("invalid marker name '{}'", marker)))
    }
}

fn attribute_script(selector: &str, name: &str) -> String {
    format!(
        "(() => {{
            const el = document.querySelector({sel});
            return el
                ? {{ found: true, value: el.getAttribute({name}) }}
                : {{ found: false, value: null }};
        }})()",
        sel = js_string(selector),
        name = js_string(name),
    )
}

fn visibility_script(selector: &str) -> String {
    format!(
        "(() => {{
            const shown = (el) => {{
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                return style.display !== 'none'
                    && style.visibility !== 'hidden'
                    && parseFloat(style.opacity || '1') > 0
                    && rect.width > 0
                    && rect.height > 0;
            }};
            return Array.from(document.querySelectorAll({sel})).some(shown);
        }})()",
        sel = js_string(selector),
    )
}

fn fill_script(selector: &str, value: &str) -> String {
    // Native setter so framework-controlled inputs see the change.
    format!(
        "(() => {{
            const el = document.querySelector({sel});
            if (!el) throw new Error('no element matches ' + {sel});
            el.focus();
            const proto = el instanceof HTMLTextAreaElement
                ? HTMLTextAreaElement.prototype
                : HTMLInputElement.prototype;
            Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {value});
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()",
        sel = js_string(selector),
        value = js_string(value),
    )
}

fn click_text_script(label: &str) -> String {
    format!(
        "(() => {{
            const label = {label};
            const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
            let node;
            while ((node = walker.nextNode())) {{
                if (node.textContent.trim() !== label || !node.parentElement) continue;
                const el = node.parentElement.closest(
                    'a, button, [role=\"tab\"], [role=\"link\"], [role=\"button\"], li'
                ) || node.parentElement;
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return true;
            }}
            return false;
        }})()",
        label = js_string(label),
    )
}
