//! The request handed to the orchestrator by the CLI layer.

use std::path::PathBuf;

use crate::execute::context::InheritOverrides;
use crate::invowkfile::RuntimeKind;

/// Every accepted option of one execution, enumerated explicitly.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    /// Raw tokens: command name (possibly `@source`-prefixed) followed by
    /// the command's own flags and positionals.
    pub tokens: Vec<String>,
    /// `--from <source>`; wins over a positional `@source` prefix.
    pub from: Option<String>,
    /// `--runtime`: a hard override.
    pub runtime: Option<RuntimeKind>,
    /// `--env KEY=VALUE` pairs, applied after dotenv files.
    pub env: Vec<(String, String)>,
    /// `--env-file` paths, applied in order.
    pub env_files: Vec<PathBuf>,
    pub inherit: InheritOverrides,
    /// `--workdir` override.
    pub workdir: Option<PathBuf>,
    pub interactive: bool,
    pub verbose: bool,
    pub force_rebuild: bool,
    pub dry_run: bool,
    /// Explicit `--config` path, if any.
    pub config_path: Option<PathBuf>,
}

impl ExecuteRequest {
    /// Request for a recursively executed dependency.
    ///
    /// Only `verbose`, `force_rebuild`, `config_path` and `dry_run`
    /// propagate; env overrides, workdir and interactivity stay with the
    /// parent so each dep derives its environment from its own
    /// declaration.
    pub fn child_for(&self, dep_name: &str) -> ExecuteRequest {
        ExecuteRequest {
            tokens: vec![dep_name.to_string()],
            verbose: self.verbose,
            force_rebuild: self.force_rebuild,
            dry_run: self.dry_run,
            config_path: self.config_path.clone(),
            ..Default::default()
        }
    }
}
