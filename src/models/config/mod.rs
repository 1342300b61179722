mod profile;

pub use profile::*;

use anyhow::{Context, Result, bail};
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Every profile declared in the JSON config file, keyed by app name.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct MirrorConfig {
    pub profiles: HashMap<String, Profile>,
}

/// Fields set through `FSMIRROR__<APP>__<FIELD>` environment variables.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
struct ProfileOverride {
    receiver: Option<String>,
    root: Option<String>,
    path: Option<PathBuf>,
}

/// The environment source for profile overrides.
pub fn env_overrides() -> Environment {
    Environment::with_prefix("FSMIRROR")
        .prefix_separator("__")
        .separator("__")
}

impl MirrorConfig {
    /// Loads the JSON config at `path` and applies `FSMIRROR__<APP>__<FIELD>`
    /// environment overrides on top.
    ///
    /// A missing, unreadable or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = Self::read_file(path)?;
        cfg.apply_overrides(env_overrides())?;
        Ok(cfg)
    }

    /// Parses the JSON file as a flat name → profile map. Profile names are
    /// taken verbatim, dots and case included.
    pub fn read_file(path: &Path) -> Result<Self> {
        debug!("FSMIRROR config => {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing profiles in {}", path.display()))
    }

    /// Merges per-field overrides from `env` into the loaded profiles.
    ///
    /// Environment keys come back lowercased, so they are matched against
    /// profile names case-insensitively; an override for an unknown name adds
    /// a new profile.
    pub fn apply_overrides(&mut self, env: Environment) -> Result<()> {
        let overrides: HashMap<String, ProfileOverride> = Config::builder()
            .add_source(env)
            .build()
            .context("reading environment overrides")?
            .try_deserialize()
            .context("parsing environment overrides")?;

        for (name, fields) in overrides {
            let key = self
                .find_key(&name)
                .map(str::to_string)
                .unwrap_or_else(|| name.clone());
            debug!("applying environment overrides to profile '{}'", key);

            let profile = self.profiles.entry(key).or_default();
            if let Some(receiver) = fields.receiver {
                profile.receiver = receiver;
            }
            if let Some(root) = fields.root {
                profile.root = root;
            }
            if let Some(path) = fields.path {
                profile.source_path = path;
            }
        }
        Ok(())
    }

    fn find_key(&self, app: &str) -> Option<&str> {
        if let Some((name, _)) = self.profiles.get_key_value(app) {
            return Some(name.as_str());
        }
        self.profiles
            .keys()
            .find(|name| name.eq_ignore_ascii_case(app))
            .map(String::as_str)
    }

    /// Returns the profile registered under `app`.
    pub fn profile(&self, app: &str) -> Result<&Profile> {
        match self.profiles.get(app) {
            Some(profile) => Ok(profile),
            None => {
                let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
                names.sort_unstable();
                bail!(
                    "profile '{}' not found (available: {})",
                    app,
                    if names.is_empty() {
                        "none".to_string()
                    } else {
                        names.join(", ")
                    }
                )
            }
        }
    }

    pub fn with_profile(mut self, app: impl Into<String>, profile: Profile) -> Self {
        self.profiles.insert(app.into(), profile);
        self
    }
}
