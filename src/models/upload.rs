use crate::models::config::SyncContext;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A single file about to be POSTed to the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    pub relative_path: String,
    pub destination: String,
}

impl UploadRequest {
    /// Builds the request for an absolute `path` under the context's source root.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not live under `ctx.base_path`.
    pub fn new(ctx: &SyncContext, path: &Path) -> Result<Self> {
        let relative = path.strip_prefix(&ctx.base_path).with_context(|| {
            format!(
                "{} is not under {}",
                path.display(),
                ctx.base_path.display()
            )
        })?;
        let relative_path = relative.to_string_lossy().into_owned();

        Ok(Self {
            local_path: path.to_path_buf(),
            destination: ctx.profile.destination(&relative_path),
            relative_path,
        })
    }
}

/// Why a path produced no upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Directory,
    Hidden,
    EditorTempFile,
}

/// Result of handing one path to the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Uploaded { destination: String },
    Skipped(SkipReason),
}

impl SyncOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, SyncOutcome::Uploaded { .. })
    }

    pub fn description(&self) -> String {
        match self {
            SyncOutcome::Uploaded { destination } => format!("uploaded to {}", destination),
            SyncOutcome::Skipped(SkipReason::Directory) => "skipped directory".to_string(),
            SyncOutcome::Skipped(SkipReason::Hidden) => "skipped hidden entry".to_string(),
            SyncOutcome::Skipped(SkipReason::EditorTempFile) => {
                "skipped editor temp file".to_string()
            }
        }
    }
}
