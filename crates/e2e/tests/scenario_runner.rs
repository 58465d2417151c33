//! Scenario runner against the scripted browser

use std::time::Duration;

use kbqa_common::testing::{PageCall, ScriptedLauncher, ScriptedPage};
use kbqa_e2e::runner::{resolve_upload, RunnerConfig, TestSuiteResult};
use kbqa_e2e::toast::{ToastWatcher, TOAST_SELECTOR};
use kbqa_e2e::{Scenario, ScenarioRunner, ScenarioStep};

fn config(output: &std::path::Path) -> RunnerConfig {
    RunnerConfig {
        base_url: "https://console.test".to_string(),
        specs_dir: output.join("specs"),
        output_dir: output.join("results"),
        toast: ToastWatcher {
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        },
        navigation_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

const LOGIN: &str = r#"
name: login-valid-credentials
tags: [auth, smoke]
steps:
  - action: navigate
    url: /login
  - action: fill
    selector: 'input[placeholder="Email Address"]'
    value: skyqa1@yopmail.com
  - action: fill
    selector: 'input[placeholder="Password"]'
    value: ${KBQA_RUNNER_TEST_PASSWORD}
  - action: click_text
    text: Login
  - action: expect_text
    selector: '[data-sonner-toast], .toast, [role="alert"], .notification'
    contains: Logged in successfully!
    timeout_ms: 50
  - action: capture_toast
"#;

#[tokio::test]
async fn login_scenario_passes_and_attaches_toast() {
    std::env::set_var("KBQA_RUNNER_TEST_PASSWORD", "Admin@123");
    let dir = tempfile::tempdir().unwrap();
    let page = ScriptedPage::new()
        .with_label("Login")
        .with_visible(TOAST_SELECTOR, 0)
        .with_text(TOAST_SELECTOR, "Logged in successfully!");
    let launcher = ScriptedLauncher::new(page);
    let runner = ScenarioRunner::new(config(dir.path()), launcher);

    let scenario = Scenario::from_yaml(LOGIN).unwrap();
    let result = runner.run_scenario(&scenario).await.unwrap();

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.steps.len(), 6);
    assert!(result.steps.iter().all(|s| s.success));

    let names: Vec<_> = result.attachments.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["toast-screenshot", "final-screenshot"]);
    assert!(result.steps[5].attachment.is_some());

    let launcher = runner_launcher(&runner);
    let calls = launcher.page().calls();
    assert_eq!(calls[0], PageCall::SetViewport(scenario.viewport));
    assert!(calls.contains(&PageCall::Goto("https://console.test/login".to_string())));
    assert!(calls.contains(&PageCall::Fill {
        selector: r#"input[placeholder="Password"]"#.to_string(),
        value: "Admin@123".to_string(),
    }));
    assert_eq!(launcher.close_count(), 1);
}

#[tokio::test]
async fn failing_assertion_stops_the_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let page = ScriptedPage::new()
        .with_label("Login")
        .with_text(TOAST_SELECTOR, "Invalid email or password.");
    let runner = ScenarioRunner::new(config(dir.path()), ScriptedLauncher::new(page));

    let scenario = Scenario::from_yaml(
        r#"
name: login-expects-success
steps:
  - action: click_text
    text: Login
  - action: expect_text
    selector: '[data-sonner-toast], .toast, [role="alert"], .notification'
    contains: Logged in successfully!
    timeout_ms: 20
  - action: click
    selector: '#never-reached'
"#,
    )
    .unwrap();

    let result = runner.run_scenario(&scenario).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.steps.len(), 2);
    assert!(!result.steps[1].success);
    let error = result.error.unwrap();
    assert!(error.contains("Invalid email or password."), "{}", error);

    let launcher = runner_launcher(&runner);
    assert!(!launcher
        .page()
        .calls()
        .contains(&PageCall::Click("#never-reached".to_string())));
    // Final screenshot is still taken and the browser still closed.
    assert_eq!(result.attachments.len(), 1);
    assert_eq!(launcher.close_count(), 1);
}

#[tokio::test]
async fn missing_text_and_urls_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let page = ScriptedPage::new()
        .with_label("Sign Up")
        .navigates_on("Sign Up", "https://console.test/signup");
    let runner = ScenarioRunner::new(config(dir.path()), ScriptedLauncher::new(page));

    let navigates = Scenario::from_yaml(
        r#"
name: login-to-signup
steps:
  - action: click_text
    text: Sign Up
  - action: wait_url
    pattern: /signup$
    timeout_ms: 20
"#,
    )
    .unwrap();
    let no_label = Scenario::from_yaml(
        r#"
name: forgot-password-link
steps:
  - action: click_text
    text: Forgot Password
"#,
    )
    .unwrap();

    let ok = runner.run_scenario(&navigates).await.unwrap();
    let missing = runner.run_scenario(&no_label).await.unwrap();

    assert!(ok.success, "{:?}", ok.error);
    assert!(!missing.success);
    assert!(missing.error.unwrap().contains("Forgot Password"));
}

#[tokio::test]
async fn launch_failure_is_recorded_and_suite_continues() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScenarioRunner::new(config(dir.path()), ScriptedLauncher::failing());

    let scenarios = vec![
        Scenario::from_yaml(LOGIN).unwrap(),
        Scenario::from_yaml("name: second\nsteps:\n  - action: log\n    message: hi\n").unwrap(),
    ];

    let suite: TestSuiteResult = runner.run_scenarios(&scenarios).await;

    assert_eq!(suite.total, 2);
    assert_eq!(suite.failed, 2);
    assert!(suite.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("chrome executable"));
}

#[tokio::test]
async fn specs_load_from_disk_and_results_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    std::fs::create_dir_all(cfg.specs_dir.join("auth")).unwrap();
    std::fs::write(cfg.specs_dir.join("auth/login.yaml"), LOGIN).unwrap();
    std::fs::write(
        cfg.specs_dir.join("org.yml"),
        "name: create-organization\ntags: [org]\nsteps:\n  - action: log\n    message: create\n",
    )
    .unwrap();
    std::fs::write(cfg.specs_dir.join("notes.txt"), "ignored").unwrap();

    let runner = ScenarioRunner::new(cfg, ScriptedLauncher::new(ScriptedPage::new()));

    let suite = runner.run_tagged("org").await.unwrap();
    assert_eq!(suite.total, 1);
    assert_eq!(suite.passed, 1);
    assert_eq!(suite.results[0].name, "create-organization");

    let path = runner.write_results(&suite).unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(parsed["passed"], 1);
    assert_eq!(parsed["results"][0]["steps"][0]["step_name"], "log:create");

    assert!(runner.run_named("no-such-scenario").await.is_err());
}

#[tokio::test]
async fn screenshot_names_cannot_leave_the_run_dir() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let results = cfg.output_dir.clone();
    let runner = ScenarioRunner::new(cfg, ScriptedLauncher::new(ScriptedPage::new()));

    let scenario = Scenario::from_yaml(
        r#"
name: screenshot-names
steps:
  - action: screenshot
    name: ../../escaped/after login
"#,
    )
    .unwrap();

    let result = runner.run_scenario(&scenario).await.unwrap();

    assert!(result.success, "{:?}", result.error);
    let run_dir = results.join("screenshot-names");
    let shot = result.steps[0].attachment.clone().unwrap();
    assert_eq!(shot.parent(), Some(run_dir.as_path()));
    assert!(shot.exists());
    let file_name = shot.file_name().unwrap().to_str().unwrap();
    assert!(file_name.starts_with("escaped-after-login-"), "{}", file_name);
    assert!(!dir.path().join("escaped").exists());
    assert!(!results.join("escaped").exists());
    assert_eq!(result.attachments[0].name, "../../escaped/after login");
}

const DATASET_UPLOAD: &str = r#"
name: dataset-upload-and-delete
steps:
  - action: upload
    selector: 'input[type="file"]'
    path: data/sample.pdf
  - action: expect_text
    selector: '.dataset-row'
    contains: sample.pdf
    timeout_ms: 50
  - action: press
    selector: 'input[placeholder="Search"]'
    key: Enter
  - action: expect_attribute
    selector: 'a.download'
    name: href
    contains: /datasets/
    timeout_ms: 50
  - action: click_text
    text: Delete
  - action: expect_no_text
    selector: '.dataset-row'
    contains: sample.pdf
    timeout_ms: 500
"#;

#[tokio::test]
async fn upload_press_and_attribute_steps() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    std::fs::create_dir_all(cfg.specs_dir.join("data")).unwrap();
    std::fs::write(cfg.specs_dir.join("data/sample.pdf"), b"%PDF-1.4").unwrap();
    let fixture = resolve_upload(&cfg.specs_dir, "data/sample.pdf").unwrap();

    let page = ScriptedPage::new()
        .with_label("Delete")
        .with_text(".dataset-row", "sample.pdf 8 B")
        .texts_gone_after(".dataset-row", 2)
        .with_attribute("a.download", "href", "https://console.test/datasets/7/file");
    let runner = ScenarioRunner::new(cfg, ScriptedLauncher::new(page));

    let scenario = Scenario::from_yaml(DATASET_UPLOAD).unwrap();
    let result = runner.run_scenario(&scenario).await.unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.steps.len(), 6);
    let calls = runner.launcher().page().calls();
    assert!(calls.contains(&PageCall::Upload {
        selector: r#"input[type="file"]"#.to_string(),
        files: vec![fixture],
    }));
    assert!(calls.contains(&PageCall::Press {
        selector: r#"input[placeholder="Search"]"#.to_string(),
        key: "Enter".to_string(),
    }));
}

#[tokio::test]
async fn missing_upload_fixture_and_lingering_text_fail() {
    let dir = tempfile::tempdir().unwrap();
    let page = ScriptedPage::new().with_text(".dataset-row", "sample.pdf 8 B");
    let runner = ScenarioRunner::new(config(dir.path()), ScriptedLauncher::new(page));

    let upload = Scenario::from_yaml(
        r#"
name: upload-missing-file
steps:
  - action: upload
    selector: 'input[type="file"]'
    path: data/nope.pdf
"#,
    )
    .unwrap();
    let lingering = Scenario::from_yaml(
        r#"
name: row-never-goes
steps:
  - action: expect_no_text
    selector: '.dataset-row'
    contains: sample.pdf
    timeout_ms: 20
"#,
    )
    .unwrap();

    let upload = runner.run_scenario(&upload).await.unwrap();
    let lingering = runner.run_scenario(&lingering).await.unwrap();

    assert!(!upload.success);
    assert!(upload.error.unwrap().contains("data/nope.pdf"));
    assert!(!runner
        .launcher()
        .page()
        .calls()
        .iter()
        .any(|c| matches!(c, PageCall::Upload { .. })));

    assert!(!lingering.success);
    assert!(lingering.error.unwrap().contains("still contains 'sample.pdf'"));
}

#[test]
fn bundled_specs_parse() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("specs");
    let scenarios = Scenario::load_all(&dir).unwrap();

    assert!(scenarios.len() >= 8);
    let mut names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), scenarios.len(), "scenario names must be unique");
    assert!(!Scenario::filter_by_tag(&scenarios, "smoke").is_empty());

    for tag in ["auth", "org", "kb", "dataset", "users"] {
        assert!(
            !Scenario::filter_by_tag(&scenarios, tag).is_empty(),
            "no scenario tagged {}",
            tag
        );
    }

    // Upload fixtures ship with the specs
    for scenario in &scenarios {
        for step in &scenario.steps {
            if let ScenarioStep::Upload { path, .. } = step {
                assert!(
                    resolve_upload(&dir, path).is_ok(),
                    "{}: missing fixture {}",
                    scenario.name,
                    path
                );
            }
        }
    }
}

fn runner_launcher(runner: &ScenarioRunner<ScriptedLauncher>) -> &ScriptedLauncher {
    runner.launcher()
}
