use crate::models::config::{MirrorConfig, Profile};
use anyhow::Result;
use std::path::Path;
use tracing::debug;

pub fn debug_print_config(app: &str, profile: &Profile) {
    debug!("🔧 Loaded Configuration:");
    debug!("  [{}]", app);
    debug!("    receiver = {}", profile.receiver);
    debug!("    root = {}", profile.root);
    debug!("    path = {}", profile.source_path.display());
}

/// Loads the config file at `path` and returns the profile named `app`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if it has no
/// profile called `app`.
pub fn load_profile(path: &Path, app: &str) -> Result<Profile> {
    let cfg = MirrorConfig::load(path)?;
    let profile = cfg.profile(app)?.clone();
    debug_print_config(app, &profile);
    Ok(profile)
}
