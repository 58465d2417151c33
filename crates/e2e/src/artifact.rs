//! Run records and their file attachments

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};

/// A file produced during a run and recorded against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Label shown in reports (e.g. `toast-screenshot`)
    pub name: String,
    pub path: PathBuf,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

/// Per-scenario run record: an artifact directory plus the attachments
/// recorded so far.
#[derive(Debug)]
pub struct RunContext {
    name: String,
    output_dir: PathBuf,
    attachments: Mutex<Vec<Attachment>>,
}

impl RunContext {
    /// Create the run directory `<results_root>/<slug of name>`
    pub fn new(name: &str, results_root: &Path) -> E2eResult<Self> {
        let output_dir = results_root.join(slug(name));
        std::fs::create_dir_all(&output_dir)?;

        Ok(Self {
            name: name.to_string(),
            output_dir,
            attachments: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Persist `bytes` as `file_name` in the run directory and attach it.
    ///
    /// Artifacts are write-once: an existing file is never overwritten.
    pub fn attach_bytes(
        &self,
        name: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> E2eResult<Attachment> {
        if bytes.is_empty() {
            return Err(E2eError::EmptyArtifact(file_name.to_string()));
        }

        let path = self.output_path(file_name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => E2eError::ArtifactExists(path.clone()),
                _ => E2eError::Io(e),
            })?;
        let written = file.write_all(bytes).and_then(|_| file.sync_all());
        drop(file);
        discard_on_error(&path, written)?;

        let attachment = Attachment {
            name: name.to_string(),
            path,
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
        };

        debug!(
            "Attached '{}' to '{}' ({})",
            attachment.name,
            self.name,
            attachment.path.display()
        );
        self.attachments.lock().push(attachment.clone());
        Ok(attachment)
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.attachments.lock().clone()
    }
}

/// A failed write leaves no partial artifact behind, so the write-once
/// name stays free for a retry.
fn discard_on_error(path: &Path, written: std::io::Result<()>) -> E2eResult<()> {
    if let Err(e) = written {
        if let Err(rm) = std::fs::remove_file(path) {
            warn!("Could not remove partial artifact {}: {}", path.display(), rm);
        }
        return Err(E2eError::Io(e));
    }
    Ok(())
}

static ARTIFACT_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<prefix>-<unix millis>-<seq>.<ext>`, unique within the process
pub fn unique_file_name(prefix: &str, ext: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = ARTIFACT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}.{}", prefix, millis, seq, ext)
}

/// Lowercase, filesystem-safe name for a scenario directory or artifact
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "run".to_string()
    } else {
        trimmed.to_string()
    }
}
