use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// One named "app" entry of the JSON config.
///
/// ```json
/// { "dev": { "receiver": "http://host/upload", "root": "/srv/www/", "path": "./src" } }
/// ```
///
/// Missing fields fall back to empty values.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Profile {
    pub receiver: String,
    pub root: String,
    #[serde(rename = "path")]
    pub source_path: PathBuf,
}

impl Profile {
    /// Remote destination for a path relative to the local source root.
    ///
    /// The two halves are joined verbatim, so `root` should carry its own
    /// trailing separator.
    pub fn destination(&self, relative_path: &str) -> String {
        format!("{}{}", self.root, relative_path)
    }
}

/// The selected profile plus its resolved absolute source root.
///
/// Built once at startup and shared read-only by the walker, the uploader
/// and the event loop.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub profile: Profile,
    pub base_path: PathBuf,
}

impl SyncContext {
    pub fn new(profile: Profile) -> Result<Self> {
        let base_path = if profile.source_path.is_absolute() {
            profile.source_path.clone()
        } else {
            env::current_dir()
                .context("resolving current directory")?
                .join(&profile.source_path)
        };

        Ok(Self {
            profile,
            base_path: normalize(base_path),
        })
    }
}

/// Lexically drops `.` components and resolves `..` without touching the
/// filesystem, so `./src` under `/work` becomes `/work/src`.
fn normalize(path: PathBuf) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
