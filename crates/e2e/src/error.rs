//! Error types for E2E testing

use std::path::PathBuf;

use kbqa_common::BrowserError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Environment variable not set: {0}")]
    MissingEnv(String),

    #[error("Artifact already exists: {0}")]
    ArtifactExists(PathBuf),

    #[error("Empty artifact payload: {0}")]
    EmptyArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
