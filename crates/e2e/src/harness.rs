//! Command line of the `e2e` test binary

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::Parser;
use kbqa_common::{LaunchOptions, Viewport};

use crate::runner::RunnerConfig;

#[derive(Parser, Debug)]
#[command(name = "kbqa-e2e")]
#[command(about = "E2E scenario runner for the knowledge-base admin console")]
pub struct HarnessArgs {
    /// Path to scenario specs directory
    #[arg(short, long, default_value = "specs")]
    pub specs: PathBuf,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Base URL of the console under test
    #[arg(long, env = "KBQA_BASE_URL", default_value = "http://localhost:3000")]
    pub base_url: String,

    /// Chrome/Chromium binary (auto-detected when omitted)
    #[arg(long, env = "CHROME_PATH")]
    pub chrome: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Viewport width
    #[arg(long, default_value = "1280")]
    pub viewport_width: u32,

    /// Viewport height
    #[arg(long, default_value = "720")]
    pub viewport_height: u32,

    /// Skip the screenshot taken at the end of every scenario
    #[arg(long)]
    pub no_final_screenshot: bool,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    pub output: PathBuf,

    /// Drive the browser; without it the harness only validates the specs.
    /// `KBQA_E2E` accepts 1/0, true/false, yes/no and on/off.
    #[arg(long, env = "KBQA_E2E", value_parser = BoolishValueParser::new())]
    pub live: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl HarnessArgs {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            base_url: self.base_url.clone(),
            specs_dir: self.specs.clone(),
            output_dir: self.output.clone(),
            launch: LaunchOptions {
                headless: !self.headed,
                chrome_executable: self.chrome.clone(),
                viewport: Viewport {
                    width: self.viewport_width,
                    height: self.viewport_height,
                },
                ..Default::default()
            },
            final_screenshot: !self.no_final_screenshot,
            ..Default::default()
        }
    }
}
