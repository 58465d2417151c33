//! report-pdf: export the Allure report as a PDF

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use kbqa_common::ChromiumLauncher;
use kbqa_report::{ExportReport, ExporterConfig, ReportExporter};

#[derive(Parser)]
#[command(name = "report-pdf")]
#[command(author, version, about = "Export the Allure test report to a paginated PDF")]
struct Cli {
    /// Exporter configuration file (TOML)
    #[arg(short, long, env = "KBQA_REPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Allure results directory
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Output PDF path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Chrome/Chromium binary (auto-detected when omitted)
    #[arg(long, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(Some(report)) => println!("{}", report.summary()),
        Ok(None) => {}
        Err(e) => {
            error!("PDF generation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Option<ExportReport>> {
    let mut config = match &cli.config {
        Some(path) => ExporterConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExporterConfig::default(),
    };

    if let Some(dir) = cli.results_dir {
        config.results_dir = dir;
    }
    if let Some(output) = cli.output {
        config.output_path = output;
    }
    if cli.chrome.is_some() {
        config.browser.chrome_executable = cli.chrome;
    }
    if cli.headed {
        config.browser.headless = false;
    }

    if let Some(path) = cli.write_config {
        config
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Configuration written to {}", path.display());
        return Ok(None);
    }

    let exporter = ReportExporter::new(config, ChromiumLauncher);
    let report = exporter.run().await.context("report export")?;
    Ok(Some(report))
}
