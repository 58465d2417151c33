//! Error types for the report exporter

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`ExportError`]
pub type ExportResult<T> = std::result::Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Allure results directory not found: {}", .0.display())]
    ResultsMissing(PathBuf),

    #[error("Report server failed to start: {0}")]
    ServerStartup(String),

    #[error("Browser error: {0}")]
    Browser(#[from] kbqa_common::BrowserError),

    #[error("Report capture timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
