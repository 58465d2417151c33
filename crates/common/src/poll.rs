//! Bounded condition polling against a live page

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::browser::BrowserPage;
use crate::error::{BrowserError, Result};

/// Outcome of a bounded-time check on a UI element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    Visible,
    TimedOut,
}

impl PollResult {
    pub fn is_visible(self) -> bool {
        matches!(self, PollResult::Visible)
    }
}

/// Default interval between probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Probe until any element matching `selector` is visible or `timeout` runs out.
///
/// The page is always probed at least once, even with a zero timeout. Probe
/// errors propagate; running out of time does not.
pub async fn wait_for_visible(
    page: &dyn BrowserPage,
    selector: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<PollResult> {
    poll_until(timeout, interval, move || async move {
        page.is_visible(selector).await
    })
    .await
}

/// Probe until an element matching `selector` contains `needle`.
pub async fn wait_for_text(
    page: &dyn BrowserPage,
    selector: &str,
    needle: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<PollResult> {
    poll_until(timeout, interval, move || async move {
        let texts = page.texts(selector).await?;
        trace!(selector, ?texts, "text probe");
        Ok(texts.iter().any(|t| t.contains(needle)))
    })
    .await
}

/// Probe until no element matching `selector` contains `needle`.
pub async fn wait_for_text_gone(
    page: &dyn BrowserPage,
    selector: &str,
    needle: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<PollResult> {
    poll_until(timeout, interval, move || async move {
        let texts = page.texts(selector).await?;
        Ok(!texts.iter().any(|t| t.contains(needle)))
    })
    .await
}

/// Probe until the first element matching `selector` has an attribute
/// `name` containing `needle`. A missing element counts as a miss.
pub async fn wait_for_attribute(
    page: &dyn BrowserPage,
    selector: &str,
    name: &str,
    needle: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<PollResult> {
    poll_until(timeout, interval, move || async move {
        match page.attribute(selector, name).await {
            Ok(value) => Ok(value.is_some_and(|v| v.contains(needle))),
            Err(BrowserError::ElementNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    })
    .await
}

async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Result<PollResult>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if probe().await? {
            return Ok(PollResult::Visible);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(PollResult::TimedOut);
        }
        sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPage;

    #[tokio::test]
    async fn test_visible_after_a_few_probes() {
        let page = ScriptedPage::new().with_visible(".toast", 3);

        let result = wait_for_visible(&page, ".toast", Duration::from_secs(2), Duration::from_millis(1))
            .await
            .unwrap();

        assert_eq!(result, PollResult::Visible);
        assert_eq!(page.probe_count(".toast"), 4);
    }

    #[tokio::test]
    async fn test_never_visible_times_out() {
        let page = ScriptedPage::new();

        let result = wait_for_visible(&page, ".toast", Duration::from_millis(30), Duration::from_millis(5))
            .await
            .unwrap();

        assert_eq!(result, PollResult::TimedOut);
        assert!(page.probe_count(".toast") >= 2);
    }

    #[tokio::test]
    async fn test_zero_timeout_still_probes_once() {
        let page = ScriptedPage::new().with_visible(".toast", 0);

        let result = wait_for_visible(&page, ".toast", Duration::ZERO, DEFAULT_POLL_INTERVAL)
            .await
            .unwrap();

        assert!(result.is_visible());
    }

    #[tokio::test]
    async fn test_probe_error_propagates() {
        let page = ScriptedPage::new().fail_probes();

        let result =
            wait_for_visible(&page, ".toast", Duration::from_millis(20), Duration::from_millis(5)).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_text_matches_substring() {
        let page = ScriptedPage::new().with_text("[role=\"alert\"]", "Logged in successfully!");

        let found = wait_for_text(
            &page,
            "[role=\"alert\"]",
            "successfully",
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        let missing = wait_for_text(
            &page,
            "[role=\"alert\"]",
            "Invalid email",
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap();

        assert_eq!(found, PollResult::Visible);
        assert_eq!(missing, PollResult::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_for_text_gone() {
        let page = ScriptedPage::new()
            .with_text(".card-title", "QA KB 42")
            .texts_gone_after(".card-title", 2);

        let gone = wait_for_text_gone(
            &page,
            ".card-title",
            "QA KB 42",
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert_eq!(gone, PollResult::Visible);

        let stays = ScriptedPage::new().with_text(".card-title", "QA KB 42");
        let result = wait_for_text_gone(
            &stays,
            ".card-title",
            "QA KB",
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert_eq!(result, PollResult::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_for_attribute() {
        let page = ScriptedPage::new().with_attribute("a.google", "href", "https://api.test/auth/google/");

        let found = wait_for_attribute(
            &page,
            "a.google",
            "href",
            "/auth/google/",
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        let absent = wait_for_attribute(
            &page,
            "a.github",
            "href",
            "/auth/github/",
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap();

        assert_eq!(found, PollResult::Visible);
        assert_eq!(absent, PollResult::TimedOut);
    }
}
