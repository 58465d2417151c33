//! Toast watcher behaviour against a scripted page

use std::time::Duration;

use kbqa_common::testing::{PageCall, ScriptedPage, FAKE_PNG};
use kbqa_e2e::toast::{ToastWatcher, ATTACHMENT_NAME, TOAST_SELECTOR};
use kbqa_e2e::RunContext;

fn fast_watcher() -> ToastWatcher {
    ToastWatcher {
        timeout: Duration::from_millis(40),
        poll_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

fn files_in(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn no_toast_means_no_artifact_and_no_error() {
    let dir = tempfile::tempdir().unwrap();
    let run = RunContext::new("no-toast", dir.path()).unwrap();
    let page = ScriptedPage::new();

    let attachment = fast_watcher().capture(&page, &run).await;

    assert!(attachment.is_none());
    assert!(run.attachments().is_empty());
    assert_eq!(files_in(run.output_dir()), 0);
    assert!(!page
        .calls()
        .iter()
        .any(|c| matches!(c, PageCall::Screenshot { .. })));
}

#[tokio::test]
async fn visible_toast_attaches_exactly_one_viewport_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let run = RunContext::new("toast", dir.path()).unwrap();
    let page = ScriptedPage::new().with_visible(TOAST_SELECTOR, 2);

    let attachment = fast_watcher().capture(&page, &run).await.expect("toast captured");

    assert_eq!(attachment.name, ATTACHMENT_NAME);
    assert_eq!(attachment.content_type, "image/png");
    assert_eq!(attachment.size, FAKE_PNG.len() as u64);
    assert_eq!(std::fs::read(&attachment.path).unwrap(), FAKE_PNG);

    let file_name = attachment.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("toast-") && file_name.ends_with(".png"));
    assert!(file_name.chars().any(|c| c.is_ascii_digit()));

    assert_eq!(run.attachments(), vec![attachment]);
    assert!(page.calls().contains(&PageCall::Screenshot { full_page: false }));
}

#[tokio::test]
async fn repeated_captures_use_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let run = RunContext::new("twice", dir.path()).unwrap();
    let page = ScriptedPage::new().with_visible(TOAST_SELECTOR, 0);
    let watcher = fast_watcher();

    let first = watcher.capture(&page, &run).await.unwrap();
    let second = watcher.capture(&page, &run).await.unwrap();

    assert_ne!(first.path, second.path);
    assert_eq!(run.attachments().len(), 2);
    assert_eq!(files_in(run.output_dir()), 2);
}

#[tokio::test]
async fn errors_during_wait_or_capture_are_swallowed() {
    let dir = tempfile::tempdir().unwrap();
    let run = RunContext::new("errors", dir.path()).unwrap();

    let probe_fails = ScriptedPage::new().fail_probes();
    let shot_fails = ScriptedPage::new()
        .with_visible(TOAST_SELECTOR, 0)
        .fail_screenshot();
    let empty_shot = ScriptedPage::new()
        .with_visible(TOAST_SELECTOR, 0)
        .with_screenshot(&[]);

    let watcher = fast_watcher();
    assert!(watcher.capture(&probe_fails, &run).await.is_none());
    assert!(watcher.capture(&shot_fails, &run).await.is_none());
    assert!(watcher.capture(&empty_shot, &run).await.is_none());

    assert!(run.attachments().is_empty());
    assert_eq!(files_in(run.output_dir()), 0);
}

#[tokio::test]
async fn custom_selector_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let run = RunContext::new("custom", dir.path()).unwrap();
    let page = ScriptedPage::new().with_visible(".snackbar", 0);

    let watcher = ToastWatcher {
        selector: ".snackbar".to_string(),
        ..fast_watcher()
    };

    assert!(watcher.capture(&page, &run).await.is_some());
    assert!(fast_watcher().capture(&page, &run).await.is_none());
}
