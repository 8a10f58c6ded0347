//! Delegation configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `CCS_DELEGATION__*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::decoder::DEFAULT_MAX_LINE_BYTES;

const ENV_PREFIX: &str = "CCS_DELEGATION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// CLI agent executable.
    pub executable: String,
    /// Arguments placed before the generated ones (e.g. a wrapper script).
    pub executable_args: Vec<String>,
    /// Run timeout in seconds when the caller does not set one.
    pub default_timeout_secs: u64,
    /// Permission mode passed to the agent, if any.
    pub permission_mode: Option<String>,
    /// Cap on captured stdout and on any single stream line.
    pub max_output_bytes: usize,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            executable: "claude".to_string(),
            executable_args: Vec::new(),
            default_timeout_secs: 600,
            permission_mode: Some("acceptEdits".to_string()),
            max_output_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl DelegationConfig {
    /// Load from `path` (or the default location) plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };

        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("executable", defaults.executable.clone())?
            .set_default("default_timeout_secs", defaults.default_timeout_secs as i64)?
            .set_default("max_output_bytes", defaults.max_output_bytes as i64)?;

        if let Some(ref path) = path {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let built = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("building delegation config")?;

        built
            .try_deserialize()
            .with_context(|| match path {
                Some(path) => format!("parsing delegation config {}", path.display()),
                None => "parsing delegation config".to_string(),
            })
    }
}

/// `$XDG_CONFIG_HOME/ccs/delegation.toml`, when a config dir is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ccs").join("delegation.toml"))
}
