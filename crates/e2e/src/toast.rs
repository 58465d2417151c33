//! Best-effort toast capture
//!
//! Toasts come and go on their own schedule. After a UI action, the watcher
//! gives the notification a bounded window to show up and, if it does,
//! screenshots the viewport into the run record. It never fails the caller.

use std::time::Duration;

use kbqa_common::poll::{wait_for_visible, DEFAULT_POLL_INTERVAL};
use kbqa_common::{BrowserPage, PollResult};
use tracing::debug;

use crate::artifact::{unique_file_name, Attachment, RunContext};
use crate::error::E2eResult;

/// Toast markups emitted by the console (sonner toasts, alerts, legacy classes)
pub const TOAST_SELECTOR: &str =
    r#"[data-sonner-toast], .toast, [role="alert"], .notification"#;

pub const TOAST_TIMEOUT: Duration = Duration::from_secs(5);

pub const ATTACHMENT_NAME: &str = "toast-screenshot";

#[derive(Debug, Clone)]
pub struct ToastWatcher {
    pub selector: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ToastWatcher {
    fn default() -> Self {
        Self {
            selector: TOAST_SELECTOR.to_string(),
            timeout: TOAST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ToastWatcher {
    /// Wait for a toast and attach a viewport screenshot of it.
    ///
    /// Returns `None` on timeout and on any error along the way; in both
    /// cases nothing is written or attached.
    pub async fn capture(&self, page: &dyn BrowserPage, run: &RunContext) -> Option<Attachment> {
        match self.try_capture(page, run).await {
            Ok(attachment) => attachment,
            Err(e) => {
                debug!("Toast capture skipped for '{}': {}", run.name(), e);
                None
            }
        }
    }

    async fn try_capture(
        &self,
        page: &dyn BrowserPage,
        run: &RunContext,
    ) -> E2eResult<Option<Attachment>> {
        let seen =
            wait_for_visible(page, &self.selector, self.timeout, self.poll_interval).await?;
        if seen == PollResult::TimedOut {
            return Ok(None);
        }

        let png = page.screenshot(false).await?;
        let file_name = unique_file_name("toast", "png");
        let attachment = run.attach_bytes(ATTACHMENT_NAME, &file_name, "image/png", &png)?;
        Ok(Some(attachment))
    }
}

/// [`ToastWatcher::capture`] with the default selector and 5s window
pub async fn capture_toast_screenshot(
    page: &dyn BrowserPage,
    run: &RunContext,
) -> Option<Attachment> {
    ToastWatcher::default().capture(page, run).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_watcher() {
        let watcher = ToastWatcher::default();
        assert_eq!(watcher.timeout, Duration::from_secs(5));
        assert!(watcher.selector.contains("[role=\"alert\"]"));
        assert!(watcher.selector.contains(".toast"));
        assert!(watcher.selector.contains(".notification"));
    }
}
