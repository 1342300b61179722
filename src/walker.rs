use crate::models::config::SyncContext;
use crate::models::upload::UploadRequest;
use crate::uploader;
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// True for dot-files and dot-directories.
pub fn is_hidden_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Walks `root` depth-first, never yielding or descending into hidden entries.
///
/// `root` itself is always yielded.
fn visible_entries(root: &Path) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden_name(entry.file_name()))
}

/// Registers every visible file and directory under `root` with `register`.
///
/// Stops at the first walk or registration error.
pub fn register_tree<F>(root: &Path, mut register: F) -> Result<usize>
where
    F: FnMut(&Path) -> Result<()>,
{
    let mut registered = 0;
    for entry in visible_entries(root) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        register(entry.path())
            .with_context(|| format!("watching {}", entry.path().display()))?;
        registered += 1;
    }

    debug!("registered {} paths under {}", registered, root.display());
    Ok(registered)
}

/// Per-walk upload tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Uploads every visible file under `root`.
///
/// Upload failures are counted and dropped; only a failure to walk the tree
/// is returned as an error.
pub fn initial_sync<P>(ctx: &SyncContext, root: &Path, post: P) -> Result<SyncSummary>
where
    P: Fn(&UploadRequest) -> Result<()>,
{
    let mut summary = SyncSummary::default();

    for entry in visible_entries(root) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        match uploader::sync_file(ctx, entry.path(), &post) {
            Ok(outcome) if outcome.is_uploaded() => summary.uploaded += 1,
            Ok(_) => summary.skipped += 1,
            Err(e) => {
                debug!("initial sync of {} failed: {:#}", entry.path().display(), e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "synced {}: {} uploaded, {} skipped, {} failed",
        root.display(),
        summary.uploaded,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}
