//! Scenario runner: one browser session per scenario, steps in order

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use kbqa_common::poll::{
    wait_for_attribute, wait_for_text, wait_for_text_gone, wait_for_visible, DEFAULT_POLL_INTERVAL,
};
use kbqa_common::{BrowserLauncher, BrowserPage, BrowserSession, LaunchOptions, PollResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::artifact::{slug, unique_file_name, Attachment, RunContext};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Scenario, ScenarioStep};
use crate::toast::ToastWatcher;

static ENV_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env pattern"));

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub attachment: Option<PathBuf>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub attachments: Vec<Attachment>,
    pub error: Option<String>,
}

impl TestResult {
    fn infrastructure_failure(name: &str, error: &E2eError) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms: 0,
            steps: vec![],
            attachments: vec![],
            error: Some(error.to_string()),
        }
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL relative scenario URLs resolve against
    pub base_url: String,

    /// Directory holding the YAML scenarios
    pub specs_dir: PathBuf,

    /// Output directory for run artifacts and results
    pub output_dir: PathBuf,

    pub launch: LaunchOptions,

    pub toast: ToastWatcher,

    /// Bound for each `navigate` step
    pub navigation_timeout: Duration,

    /// Attach a viewport screenshot when a scenario ends, pass or fail
    pub final_screenshot: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            specs_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("test-results"),
            launch: LaunchOptions::default(),
            toast: ToastWatcher::default(),
            navigation_timeout: Duration::from_secs(30),
            final_screenshot: true,
        }
    }
}

/// Main scenario runner
pub struct ScenarioRunner<L: BrowserLauncher> {
    config: RunnerConfig,
    launcher: L,
}

impl<L: BrowserLauncher> ScenarioRunner<L> {
    pub fn new(config: RunnerConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run every scenario in the specs directory
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.specs_dir)?;
        Ok(self.run_scenarios(&scenarios).await)
    }

    /// Run scenarios carrying a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.specs_dir)?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_scenarios(&filtered).await)
    }

    /// Run one scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.specs_dir)?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;
        Ok(self.run_scenarios(std::slice::from_ref(&scenario)).await)
    }

    /// Run scenarios sequentially; a failing scenario never stops the suite
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> TestSuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = match self.run_scenario(scenario).await {
                Ok(result) => result,
                Err(e) => TestResult::infrastructure_failure(&scenario.name, &e),
            };

            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scenario results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        TestSuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run a single scenario in its own browser session.
    ///
    /// Errors are infrastructure failures (artifact directory, browser
    /// launch); step failures are reported inside the `TestResult`.
    pub async fn run_scenario(&self, scenario: &Scenario) -> E2eResult<TestResult> {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let run = RunContext::new(&scenario.name, &self.config.output_dir)?;

        let mut launch = self.config.launch.clone();
        launch.viewport = scenario.viewport;
        let mut session = self.launcher.launch(&launch).await?;

        let (steps, test_error) = self.drive(session.as_mut(), scenario, &run).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser for '{}': {}", scenario.name, e);
        }

        Ok(TestResult {
            name: scenario.name.clone(),
            success: test_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            attachments: run.attachments(),
            error: test_error,
        })
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        scenario: &Scenario,
        run: &RunContext,
    ) -> (Vec<StepResult>, Option<String>) {
        let page = match session.new_page().await {
            Ok(page) => page,
            Err(e) => return (vec![], Some(e.to_string())),
        };
        if let Err(e) = page.set_viewport(scenario.viewport).await {
            return (vec![], Some(e.to_string()));
        }

        let base_url = scenario
            .base_url
            .as_deref()
            .unwrap_or(&self.config.base_url);

        let mut step_results = Vec::with_capacity(scenario.steps.len());
        let mut test_error = None;

        for step in &scenario.steps {
            let started = Instant::now();
            let outcome = self.execute_step(page.as_ref(), base_url, step, run).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(attachment) => step_results.push(StepResult {
                    success: true,
                    step_name: step.label(),
                    duration_ms,
                    error: None,
                    attachment,
                }),
                Err(e) => {
                    test_error = Some(format!("{}: {}", step.label(), e));
                    step_results.push(StepResult {
                        success: false,
                        step_name: step.label(),
                        duration_ms,
                        error: Some(e.to_string()),
                        attachment: None,
                    });
                    break; // Stop on first failure
                }
            }
        }

        if self.config.final_screenshot {
            self.attach_final_screenshot(page.as_ref(), run).await;
        }

        (step_results, test_error)
    }

    /// Execute one step, returning the path of any artifact it produced
    async fn execute_step(
        &self,
        page: &dyn BrowserPage,
        base_url: &str,
        step: &ScenarioStep,
        run: &RunContext,
    ) -> E2eResult<Option<PathBuf>> {
        match step {
            ScenarioStep::Navigate {
                url,
                wait_for_selector,
            } => {
                let target = resolve_url(base_url, &expand_env(url)?);
                page.goto(&target, self.config.navigation_timeout).await?;
                if let Some(selector) = wait_for_selector {
                    let seen = wait_for_visible(
                        page,
                        selector,
                        self.config.navigation_timeout,
                        DEFAULT_POLL_INTERVAL,
                    )
                    .await?;
                    if seen == PollResult::TimedOut {
                        return Err(E2eError::Timeout(selector.clone()));
                    }
                }
                Ok(None)
            }
            ScenarioStep::Fill { selector, value } => {
                page.fill(selector, &expand_env(value)?).await?;
                Ok(None)
            }
            ScenarioStep::Click { selector } => {
                page.click(&expand_env(selector)?).await?;
                Ok(None)
            }
            ScenarioStep::ClickText { text } => {
                let text = expand_env(text)?;
                if page.click_text(&text).await? {
                    Ok(None)
                } else {
                    Err(E2eError::StepFailed {
                        step: step.label(),
                        reason: format!("no element with text '{}'", text),
                    })
                }
            }
            ScenarioStep::Press { selector, key } => {
                page.press(selector, key).await?;
                Ok(None)
            }
            ScenarioStep::Upload { selector, path } => {
                let file = resolve_upload(&self.config.specs_dir, &expand_env(path)?).map_err(
                    |e| E2eError::StepFailed {
                        step: step.label(),
                        reason: format!("cannot upload '{}': {}", path, e),
                    },
                )?;
                page.upload(selector, &[file]).await?;
                Ok(None)
            }
            ScenarioStep::ExpectNoText {
                selector,
                contains,
                timeout_ms,
            } => {
                let needle = expand_env(contains)?;
                let gone = wait_for_text_gone(
                    page,
                    selector,
                    &needle,
                    Duration::from_millis(*timeout_ms),
                    DEFAULT_POLL_INTERVAL,
                )
                .await?;
                if gone == PollResult::TimedOut {
                    return Err(E2eError::AssertionFailed(format!(
                        "'{}' still contains '{}'",
                        selector, needle
                    )));
                }
                Ok(None)
            }
            ScenarioStep::ExpectAttribute {
                selector,
                name,
                contains,
                timeout_ms,
            } => {
                let needle = expand_env(contains)?;
                let found = wait_for_attribute(
                    page,
                    selector,
                    name,
                    &needle,
                    Duration::from_millis(*timeout_ms),
                    DEFAULT_POLL_INTERVAL,
                )
                .await?;
                if found == PollResult::TimedOut {
                    let actual = page.attribute(selector, name).await.ok().flatten();
                    return Err(E2eError::AssertionFailed(format!(
                        "{} of '{}' never contained '{}' (saw {:?})",
                        name, selector, needle, actual
                    )));
                }
                Ok(None)
            }
            ScenarioStep::ExpectText {
                selector,
                contains,
                timeout_ms,
            } => {
                let needle = expand_env(contains)?;
                let found = wait_for_text(
                    page,
                    selector,
                    &needle,
                    Duration::from_millis(*timeout_ms),
                    DEFAULT_POLL_INTERVAL,
                )
                .await?;
                if found == PollResult::TimedOut {
                    let actual = page.texts(selector).await.unwrap_or_default();
                    return Err(E2eError::AssertionFailed(format!(
                        "'{}' never contained '{}' (saw {:?})",
                        selector, needle, actual
                    )));
                }
                Ok(None)
            }
            ScenarioStep::ExpectVisible {
                selector,
                timeout_ms,
            } => {
                let seen = wait_for_visible(
                    page,
                    selector,
                    Duration::from_millis(*timeout_ms),
                    DEFAULT_POLL_INTERVAL,
                )
                .await?;
                if seen == PollResult::TimedOut {
                    return Err(E2eError::AssertionFailed(format!("'{}' is not visible", selector)));
                }
                Ok(None)
            }
            ScenarioStep::WaitUrl {
                pattern,
                timeout_ms,
            } => {
                let re = Regex::new(pattern)?;
                wait_for_url(page, &re, Duration::from_millis(*timeout_ms)).await?;
                Ok(None)
            }
            ScenarioStep::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(None)
            }
            ScenarioStep::CaptureToast => Ok(self
                .config
                .toast
                .capture(page, run)
                .await
                .map(|attachment| attachment.path)),
            ScenarioStep::Screenshot { name, full_page } => {
                let png = page.screenshot(*full_page).await?;
                let file_name = unique_file_name(&slug(name), "png");
                let attachment = run.attach_bytes(name, &file_name, "image/png", &png)?;
                Ok(Some(attachment.path))
            }
            ScenarioStep::Log { message } => {
                info!("[SCENARIO LOG] {}", message);
                Ok(None)
            }
        }
    }

    async fn attach_final_screenshot(&self, page: &dyn BrowserPage, run: &RunContext) {
        let result = match page.screenshot(false).await {
            Ok(png) => run
                .attach_bytes(
                    "final-screenshot",
                    &unique_file_name("final", "png"),
                    "image/png",
                    &png,
                )
                .map(|_| ()),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            debug!("No final screenshot for '{}': {}", run.name(), e);
        }
    }

    /// Write the suite summary as `test-results.json` in the output directory
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

async fn wait_for_url(page: &dyn BrowserPage, pattern: &Regex, limit: Duration) -> E2eResult<()> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let url = page.current_url().await?;
        if pattern.is_match(&url) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(E2eError::Timeout(format!(
                "URL matching '{}' (at {})",
                pattern.as_str(),
                url
            )));
        }
        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

/// Absolute path of an upload fixture; relative paths are taken from the
/// specs directory. The file must exist.
pub fn resolve_upload(specs_dir: &Path, path: &str) -> std::io::Result<PathBuf> {
    let path = Path::new(path);
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        specs_dir.join(path)
    };
    std::fs::canonicalize(full)
}

/// Join a scenario URL onto the base unless it is already absolute
pub fn resolve_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("about:") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

/// Replace `${NAME}` references with environment values
pub fn expand_env(value: &str) -> E2eResult<String> {
    let mut missing = None;
    let expanded = ENV_REF.replace_all(value, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(E2eError::MissingEnv(name)),
        None => Ok(expanded.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        assert_eq!(resolve_url("https://app.test/", "/login"), "https://app.test/login");
        assert_eq!(resolve_url("https://app.test", "signup"), "https://app.test/signup");
        assert_eq!(
            resolve_url("https://app.test", "https://accounts.google.com/o/oauth2"),
            "https://accounts.google.com/o/oauth2"
        );
    }

    #[test]
    fn test_expand_env() {
        std::env::set_var("KBQA_UNIT_EXPAND", "s3cret");
        assert_eq!(expand_env("pw=${KBQA_UNIT_EXPAND}!").unwrap(), "pw=s3cret!");
        assert_eq!(expand_env("plain $HOME").unwrap(), "plain $HOME");
        assert!(matches!(
            expand_env("${KBQA_UNIT_DEFINITELY_UNSET}"),
            Err(E2eError::MissingEnv(name)) if name == "KBQA_UNIT_DEFINITELY_UNSET"
        ));
    }

    #[test]
    fn test_resolve_upload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/sample.pdf"), b"%PDF-1.4").unwrap();

        let resolved = resolve_upload(dir.path(), "data/sample.pdf").unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("data/sample.pdf"));
        assert_eq!(resolve_upload(dir.path(), resolved.to_str().unwrap()).unwrap(), resolved);
        assert!(resolve_upload(dir.path(), "data/missing.pdf").is_err());
    }

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert_eq!(config.specs_dir, PathBuf::from("specs"));
        assert!(config.final_screenshot);
        assert_eq!(config.toast.timeout, Duration::from_secs(5));
    }
}
