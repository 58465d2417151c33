//! kbqa Report Exporter
//!
//! Turns an Allure results directory into a single paginated PDF:
//!
//! ```text
//! allure-results/ ──▶ ReportServer (allure serve) ──▶ headless browser
//!                                                      │ sections, expand, links
//!                                                      ▼
//!                                                test-report.pdf
//! ```
//!
//! The server and the browser are always torn down, whatever step fails.

pub mod config;
pub mod error;
pub mod expand;
pub mod exporter;
pub mod pdf;
pub mod server;

pub use config::{Delays, ExporterConfig};
pub use error::{ExportError, ExportResult};
pub use expand::BatchOutcome;
pub use exporter::{ExportReport, ReportExporter};
pub use server::ReportServer;
