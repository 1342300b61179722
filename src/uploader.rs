use crate::models::config::SyncContext;
use crate::models::upload::{SkipReason, SyncOutcome, UploadRequest};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Suffixes JetBrains IDEs use for their safe-write scratch files.
pub const EDITOR_TEMP_SUFFIXES: [&str; 2] = ["___jb_tmp___", "___jb_old___"];

/// Decides whether `path` should be mirrored and, if so, hands an
/// [`UploadRequest`] to `post`.
///
/// This function:
/// 1. Stats the path; directories and dot-files are skipped.
/// 2. Skips editor temp files.
/// 3. Maps the path under the remote root.
/// 4. Calls `post` exactly once.
///
/// # Errors
///
/// Returns an error if the stat fails, the path is outside the source root,
/// or `post` fails. Nothing is retried.
pub fn sync_file<P>(ctx: &SyncContext, path: &Path, post: P) -> Result<SyncOutcome>
where
    P: Fn(&UploadRequest) -> Result<()>,
{
    let metadata = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if metadata.is_dir() {
        return Ok(SyncOutcome::Skipped(SkipReason::Directory));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.starts_with('.') {
        return Ok(SyncOutcome::Skipped(SkipReason::Hidden));
    }
    if EDITOR_TEMP_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        debug!("ignoring editor temp file {}", path.display());
        return Ok(SyncOutcome::Skipped(SkipReason::EditorTempFile));
    }

    let request = UploadRequest::new(ctx, path).inspect_err(|e| warn!("{:#}", e))?;
    info!("{} >> {}", request.relative_path, request.destination);

    post(&request)?;

    Ok(SyncOutcome::Uploaded {
        destination: request.destination,
    })
}

/// Sends upload requests to the profile's receiver as `multipart/form-data`.
pub struct HttpPoster {
    client: Client,
    receiver: String,
}

impl HttpPoster {
    pub fn new(receiver: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            receiver: receiver.into(),
        }
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Builds the two-part form (`to`, then `file`) and POSTs it.
    ///
    /// The file is read into memory first, so a file that changes mid-upload
    /// still yields a well-formed body. Any HTTP status is accepted; only
    /// transport failures are errors.
    pub fn post(&self, request: &UploadRequest) -> Result<()> {
        let content = fs::read(&request.local_path)
            .with_context(|| format!("reading {}", request.local_path.display()))?;

        let part = Part::bytes(content)
            .file_name(request.relative_path.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("to", request.destination.clone())
            .part("file", part);

        let res = self
            .client
            .post(self.receiver.as_str())
            .multipart(form)
            .send()
            .with_context(|| {
                format!(
                    "failed to POST {} to {}",
                    request.relative_path, self.receiver
                )
            })?;

        if !res.status().is_success() {
            warn!(
                "receiver responded with {} for {}",
                res.status(),
                request.destination
            );
        }

        Ok(())
    }
}
