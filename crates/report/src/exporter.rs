//! Report export: serve the Allure results, walk the report, print it

use std::path::PathBuf;
use std::time::Duration;

use kbqa_common::{BrowserError, BrowserLauncher, BrowserSession};
use tracing::{info, warn};

use crate::config::ExporterConfig;
use crate::error::{ExportError, ExportResult};
use crate::expand::{expand_all, pause, traverse_sections};
use crate::pdf::report_pdf_options;
use crate::server::ReportServer;

/// A PDF written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    /// On-disk size
    pub bytes: u64,
}

impl ExportReport {
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / 1024.0 / 1024.0
    }

    pub fn summary(&self) -> String {
        format!(
            "PDF report generated: {} ({} bytes, {:.2} MB)",
            self.path.display(),
            self.bytes,
            self.megabytes()
        )
    }
}

/// Drives one export from results directory to PDF
pub struct ReportExporter<L: BrowserLauncher> {
    config: ExporterConfig,
    launcher: L,
}

impl<L: BrowserLauncher> ReportExporter<L> {
    pub fn new(config: ExporterConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Fails before anything is started when there are no results to serve
    pub fn check_results(&self) -> ExportResult<()> {
        if self.config.results_dir.is_dir() {
            Ok(())
        } else {
            Err(ExportError::ResultsMissing(self.config.results_dir.clone()))
        }
    }

    /// Full export: check results, start the server, capture, tear down
    pub async fn run(&self) -> ExportResult<ExportReport> {
        info!("Checking {} ...", self.config.results_dir.display());
        self.check_results()?;

        let server = ReportServer::spawn(&self.config.server, &self.config.results_dir)?;
        self.run_with_server(server).await
    }

    /// Export against an already spawned server. The server is always shut
    /// down before this returns, and so is the browser if one was launched.
    pub async fn run_with_server(&self, mut server: ReportServer) -> ExportResult<ExportReport> {
        let server_cfg = &self.config.server;
        let warmup = server
            .wait_until_listening(
                Duration::from_millis(server_cfg.warmup_ms),
                Duration::from_millis(server_cfg.probe_interval_ms),
            )
            .await;

        let result = match warmup {
            Ok(_) => {
                let base_url = server.base_url().to_string();
                let mut session: Option<Box<dyn BrowserSession>> = None;

                let timeout = self.config.capture_timeout();
                let outcome =
                    match tokio::time::timeout(timeout, self.capture(&base_url, &mut session)).await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ExportError::Timeout(timeout.as_secs())),
                    };

                if let Some(mut session) = session.take() {
                    if let Err(e) = session.close().await {
                        warn!("Failed to close browser: {}", e);
                    }
                }
                outcome
            }
            Err(e) => Err(e),
        };

        server
            .shutdown(Duration::from_millis(server_cfg.kill_grace_ms))
            .await;

        result
    }

    /// Launch, load, traverse, expand and print. The launched session is
    /// left in `session` for the caller to close.
    async fn capture(
        &self,
        base_url: &str,
        session: &mut Option<Box<dyn BrowserSession>>,
    ) -> ExportResult<ExportReport> {
        let config = &self.config;

        info!("Launching browser...");
        let session = session.insert(
            self.launcher
                .launch(&config.browser.launch_options())
                .await?,
        );
        let page = session.new_page().await?;
        page.set_viewport(config.browser.viewport).await?;

        info!("Loading report from {}", base_url);
        page.goto(base_url, config.browser.navigation_timeout())
            .await?;

        info!("Waiting for the report to render...");
        pause(Duration::from_millis(config.delays.content_ms)).await;

        info!("Navigating through report sections...");
        let visited = traverse_sections(
            page.as_ref(),
            &config.sections,
            Duration::from_millis(config.delays.section_ms),
        )
        .await;
        info!("Visited {}/{} sections", visited.len(), config.sections.len());

        info!("Expanding all test details...");
        let summary = expand_all(page.as_ref(), &config.expand, &config.delays).await;
        info!(
            "Expanded {}/{} nodes, opened {}/{} test links",
            summary.expanded.clicked,
            summary.expanded.found,
            summary.links.clicked,
            summary.links.attempted
        );

        info!("Final wait for content...");
        pause(Duration::from_millis(config.delays.final_ms)).await;

        info!("Generating PDF...");
        let options = report_pdf_options(&config.pdf, chrono::Local::now().date_naive());
        let pdf = page.print_pdf(&options).await?;
        if pdf.is_empty() {
            return Err(BrowserError::Script("browser returned an empty PDF".to_string()).into());
        }

        let path = config.output_path.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &pdf)?;
        let bytes = std::fs::metadata(&path)?.len();

        Ok(ExportReport { path, bytes })
    }
}
