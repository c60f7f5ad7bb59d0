//! User configuration loading.
//!
//! The config file lives at `<config-dir>/invowk/config.toml`. A missing
//! file at the default path yields defaults plus a warning diagnostic; a
//! malformed file at the default path yields defaults plus an error
//! diagnostic; any failure on an explicitly requested path is fatal.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diag::Diagnostic;
use crate::error::InvowkError;
use crate::invowkfile::RuntimeKind;

/// Environment-inheritance mode for execution contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InheritMode {
    /// Pass the whole captured user environment through.
    #[default]
    All,
    /// Start from an empty environment.
    None,
    /// Keep only a fixed baseline (PATH, HOME, USER, SHELL, TERM, LANG,
    /// LC_*, TMPDIR).
    System,
}

/// Container-engine section of the user config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSection {
    /// Preferred engine binary (`podman`/`docker`). Autodetected when unset.
    #[serde(default)]
    pub engine: Option<String>,
}

/// Environment-inheritance section of the user config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvSection {
    #[serde(default)]
    pub inherit_mode: InheritMode,
    #[serde(default)]
    pub inherit_allow: Vec<String>,
    #[serde(default)]
    pub inherit_deny: Vec<String>,
}

/// UI defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSection {
    /// Colored output (auto-disabled when stdout is not a terminal).
    #[serde(default = "default_true")]
    pub color: bool,
}

impl Default for UiSection {
    fn default() -> Self {
        Self { color: true }
    }
}

fn default_true() -> bool {
    true
}

/// The user configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Default runtime used when the command permits it and the CLI does
    /// not override.
    #[serde(default)]
    pub default_runtime: Option<RuntimeKind>,
    #[serde(default)]
    pub container: ContainerSection,
    /// Additional declaration roots (directories holding an invowk.toml).
    #[serde(default)]
    pub includes: Vec<PathBuf>,
    /// Per-user commands directory override.
    #[serde(default)]
    pub user_commands_dir: Option<PathBuf>,
    /// Source identifier of the per-user commands directory.
    #[serde(default = "default_user_source_id")]
    pub user_source_id: String,
    #[serde(default)]
    pub env: EnvSection,
    #[serde(default)]
    pub ui: UiSection,
}

fn default_user_source_id() -> String {
    "user".to_string()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            default_runtime: None,
            container: ContainerSection::default(),
            includes: Vec::new(),
            user_commands_dir: None,
            user_source_id: default_user_source_id(),
            env: EnvSection::default(),
            ui: UiSection::default(),
        }
    }
}

/// How config loading was requested.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit `--config <path>`; failures are fatal when set.
    pub explicit_path: Option<PathBuf>,
}

impl UserConfig {
    /// Default config file path under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "invowk").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Per-user commands directory (declaration root #4).
    pub fn user_commands_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.user_commands_dir {
            return Some(dir.clone());
        }
        ProjectDirs::from("", "", "invowk").map(|dirs| dirs.config_dir().join("commands"))
    }

    /// Load configuration per `options`.
    ///
    /// Returns the effective config plus at most one diagnostic. The only
    /// `Err` cases are failures on an explicitly requested path.
    pub fn load(options: &LoadOptions) -> Result<(UserConfig, Option<Diagnostic>), InvowkError> {
        match &options.explicit_path {
            Some(path) => {
                let config = Self::read_file(path)?;
                Ok((config, None))
            }
            None => {
                let Some(path) = Self::default_path() else {
                    return Ok((UserConfig::default(), None));
                };
                if !path.exists() {
                    debug!(path = %path.display(), "No user config; using defaults");
                    return Ok((
                        UserConfig::default(),
                        Some(
                            Diagnostic::warning(
                                "config_load_failed",
                                "no user config file; using defaults",
                            )
                            .with_path(&path),
                        ),
                    ));
                }
                match Self::read_file(&path) {
                    Ok(config) => Ok((config, None)),
                    Err(err) => Ok((
                        UserConfig::default(),
                        Some(
                            Diagnostic::error("config_load_failed", err.to_string())
                                .with_path(&path),
                        ),
                    )),
                }
            }
        }
    }

    fn read_file(path: &Path) -> Result<UserConfig, InvowkError> {
        let text = std::fs::read_to_string(path).map_err(|e| InvowkError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| InvowkError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
