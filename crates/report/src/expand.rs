//! Report traversal: section tabs, expand controls and test links.
//!
//! Everything here is best effort. A click that fails is logged and
//! counted, and the traversal moves on.

use std::time::Duration;

use kbqa_common::{BrowserPage, ScrollPosition};
use tracing::{debug, info, warn};

use crate::config::{Delays, ExpandConfig};

/// Counters for one click batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Elements matching the selector
    pub found: usize,
    /// Elements a click was attempted on (bounded by the batch limit)
    pub attempted: usize,
    pub clicked: usize,
    pub failed: usize,
}

/// A set of elements clicked one by one
#[derive(Debug, Clone)]
pub struct ClickBatch<'a> {
    /// Used in logs
    pub name: &'a str,
    /// Attribute the matches are tagged with, see [`kbqa_common::is_valid_marker`]
    pub marker: &'a str,
    pub selector: &'a str,
    /// Only the first `limit` matches are clicked
    pub limit: Option<usize>,
    pub scroll_into_view: bool,
    /// Pause after every successful click
    pub settle: Duration,
}

/// What [`expand_all`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionSummary {
    pub expanded: BatchOutcome,
    pub links: BatchOutcome,
}

/// Click each section tab by its visible text, in order.
///
/// Returns the labels that were found and clicked.
pub async fn traverse_sections(
    page: &dyn BrowserPage,
    sections: &[String],
    settle: Duration,
) -> Vec<String> {
    let mut visited = Vec::with_capacity(sections.len());
    for label in sections {
        match page.click_text(label).await {
            Ok(true) => {
                debug!("Opened {} tab", label);
                pause(settle).await;
                visited.push(label.clone());
            }
            Ok(false) => info!("{} tab not found", label),
            Err(e) => info!("{} tab not found: {}", label, e),
        }
    }
    visited
}

/// Click every element of the batch, isolating failures
pub async fn run_batch(page: &dyn BrowserPage, batch: &ClickBatch<'_>) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    outcome.found = match page.mark_all(batch.selector, batch.marker).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Could not collect {}: {}", batch.name, e);
            return outcome;
        }
    };
    info!("Found {} {}", outcome.found, batch.name);

    let take = batch
        .limit
        .map_or(outcome.found, |limit| limit.min(outcome.found));

    for index in 0..take {
        outcome.attempted += 1;
        match page
            .click_marked(batch.marker, index, batch.scroll_into_view)
            .await
        {
            Ok(()) => {
                outcome.clicked += 1;
                pause(batch.settle).await;
            }
            Err(e) => {
                outcome.failed += 1;
                debug!("{} #{} click failed: {}", batch.name, index, e);
            }
        }
    }

    if outcome.failed > 0 {
        info!(
            "{}: {} clicked, {} failed",
            batch.name, outcome.clicked, outcome.failed
        );
    }
    outcome
}

/// Open every collapsed node, then the first test links, then scroll the
/// whole document so lazily rendered content is loaded.
pub async fn expand_all(
    page: &dyn BrowserPage,
    expand: &ExpandConfig,
    delays: &Delays,
) -> ExpansionSummary {
    let expanded = run_batch(
        page,
        &ClickBatch {
            name: "expand buttons",
            marker: "kbqa-expand-buttons",
            selector: &expand.expand_selector,
            limit: None,
            scroll_into_view: false,
            settle: Duration::from_millis(delays.expand_ms),
        },
    )
    .await;

    let links = run_batch(
        page,
        &ClickBatch {
            name: "test links",
            marker: "kbqa-test-links",
            selector: &expand.link_selector,
            limit: Some(expand.link_limit),
            scroll_into_view: true,
            settle: Duration::from_millis(delays.link_ms),
        },
    )
    .await;

    let scroll_settle = Duration::from_millis(delays.scroll_ms);
    for position in [ScrollPosition::Bottom, ScrollPosition::Top] {
        if let Err(e) = page.scroll_to(position).await {
            warn!("Scroll to {:?} failed: {}", position, e);
        }
        pause(scroll_settle).await;
    }

    ExpansionSummary { expanded, links }
}

/// Fixed settle delay
pub(crate) async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbqa_common::testing::{PageCall, ScriptedPage};

    fn batch(selector: &str, limit: Option<usize>) -> ClickBatch<'_> {
        ClickBatch {
            name: "nodes",
            marker: "kbqa-nodes",
            selector,
            limit,
            scroll_into_view: false,
            settle: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let page = ScriptedPage::new()
            .with_targets(".node", 5)
            .fail_click_at(".node", 1)
            .fail_click_at(".node", 3);

        let outcome = run_batch(&page, &batch(".node", None)).await;

        assert_eq!(
            outcome,
            BatchOutcome {
                found: 5,
                attempted: 5,
                clicked: 3,
                failed: 2
            }
        );
        assert_eq!(page.marked_clicks(".node"), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_limit_bounds_attempts() {
        let page = ScriptedPage::new().with_targets(".link", 30);
        let outcome = run_batch(&page, &batch(".link", Some(20))).await;
        assert_eq!(outcome.found, 30);
        assert_eq!(outcome.attempted, 20);
        assert_eq!(page.marked_clicks(".link"), (0..20).collect::<Vec<_>>());

        let few = ScriptedPage::new().with_targets(".link", 3);
        assert_eq!(run_batch(&few, &batch(".link", Some(20))).await.attempted, 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let page = ScriptedPage::new();
        assert_eq!(
            run_batch(&page, &batch(".none", None)).await,
            BatchOutcome::default()
        );
    }

    #[tokio::test]
    async fn test_missing_sections_are_skipped() {
        let page = ScriptedPage::new().with_label("Suites").with_label("Overview");
        let sections: Vec<String> = ["Suites", "Behaviors", "Packages", "Overview"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let visited = traverse_sections(&page, &sections, Duration::ZERO).await;

        assert_eq!(visited, vec!["Suites", "Overview"]);
        assert_eq!(page.clicked_labels(), sections);
    }

    #[tokio::test]
    async fn test_expand_all_order() {
        let expand = ExpandConfig::default();
        let page = ScriptedPage::new()
            .with_targets(&expand.expand_selector, 2)
            .with_targets(&expand.link_selector, 25);

        let summary = expand_all(&page, &expand, &Delays::none()).await;

        assert_eq!(summary.expanded.clicked, 2);
        assert_eq!(summary.links.found, 25);
        assert_eq!(summary.links.attempted, 20);

        let calls = page.calls();
        let scrolls: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                PageCall::Scroll(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(scrolls, vec![ScrollPosition::Bottom, ScrollPosition::Top]);
        assert!(calls.iter().any(|c| matches!(
            c,
            PageCall::ClickMarked { scroll_into_view: true, .. }
        )));
        assert!(matches!(calls.last(), Some(PageCall::Scroll(ScrollPosition::Top))));
    }

    #[tokio::test]
    async fn test_expand_all_markers_are_attribute_names() {
        let expand = ExpandConfig::default();
        let page = ScriptedPage::new()
            .with_targets(&expand.expand_selector, 4)
            .with_targets(&expand.link_selector, 2);

        let summary = expand_all(&page, &expand, &Delays::none()).await;

        let markers: Vec<String> = page
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                PageCall::MarkAll { marker, .. } => Some(marker),
                _ => None,
            })
            .collect();
        assert_eq!(markers.len(), 2);
        assert!(markers.iter().all(|m| kbqa_common::is_valid_marker(m)));
        assert_ne!(markers[0], markers[1]);

        assert_eq!(summary.expanded.clicked, 4);
        assert_eq!(summary.links.clicked, 2);
        assert_eq!(page.marked_clicks(&expand.expand_selector), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_invalid_marker_collects_nothing() {
        let page = ScriptedPage::new().with_targets(".node", 3);
        let bad = ClickBatch {
            marker: "kbqa nodes",
            ..batch(".node", None)
        };

        assert_eq!(run_batch(&page, &bad).await, BatchOutcome::default());
        assert!(page.marked_clicks(".node").is_empty());
    }
}
