//! Runtime configuration.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! JSON file, and the environment (`DOCSEAL_DATA_DIR`,
//! `DOCSEAL_COLLISION_POLICY`, `RUST_LOG`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::issuer::CollisionPolicy;

pub const ENV_DATA_DIR: &str = "DOCSEAL_DATA_DIR";
pub const ENV_COLLISION_POLICY: &str = "DOCSEAL_COLLISION_POLICY";
pub const ENV_LOG_FILTER: &str = "RUST_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the `keys/`, `certs/` and `signed_docs/` directories.
    pub data_dir: PathBuf,
    pub collision_policy: CollisionPolicy,
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            collision_policy: CollisionPolicy::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// File (if given) then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let base = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        base.merge_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn merge_env<F>(mut self, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(policy) = lookup(ENV_COLLISION_POLICY) {
            self.collision_policy = policy
                .parse()
                .map_err(|e| Error::Config(format!("{}: {}", ENV_COLLISION_POLICY, e)))?;
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER).filter(|v| !v.is_empty()) {
            self.log_filter = filter;
        }
        Ok(self)
    }
}
