//! Typed in-memory model of a declaration file ("invowkfile").
//!
//! An invowkfile declares an ordered tree of commands, each with argument
//! and flag schemas, implementations keyed by (platform, runtime), and
//! dependency declarations. The TOML parser is an external collaborator;
//! everything past deserialization is enforced here.

pub mod args;
pub mod deps;
pub mod implementation;

pub use args::{ArgSpec, FlagSpec, ValueType};
pub use deps::{
    CapabilityDep, CheckAlternative, CheckDep, CommandDep, DependencySet, EnvVarDep, FileAccess,
    FileDep, ToolDep,
};
pub use implementation::{ContainerConfig, Implementation, Platform, RuntimeKind};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InvowkError;

/// File name of a declaration file inside a declaration root.
pub const INVOWKFILE_NAME: &str = "invowk.toml";

/// Optional file-level metadata block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(default)]
    pub min_version: Option<String>,
}

/// Watch configuration of a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSpec {
    pub paths: Vec<String>,
    /// Debounce window, humantime syntax. Defaults to 300ms.
    #[serde(default)]
    pub debounce: Option<String>,
}

impl WatchSpec {
    pub fn debounce_duration(&self) -> Duration {
        self.debounce
            .as_deref()
            .and_then(|raw| humantime::parse_duration(raw).ok())
            .unwrap_or(Duration::from_millis(300))
    }
}

/// One command declaration, possibly with nested children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Platform allow-list. Empty means all.
    #[serde(default)]
    pub platforms: Vec<Platform>,
    /// Working directory, relative to the declaring file's directory.
    #[serde(default)]
    pub workdir: Option<String>,
    /// Per-invocation timeout, humantime syntax (e.g. "500ms", "30s").
    #[serde(default)]
    pub timeout: Option<String>,
    /// Static environment exported to the script.
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub flags: Vec<FlagSpec>,
    #[serde(default, rename = "impl")]
    pub implementations: Vec<Implementation>,
    #[serde(default)]
    pub deps: Option<DependencySet>,
    #[serde(default)]
    pub watch: Option<WatchSpec>,
    #[serde(default, rename = "subcmd")]
    pub subcommands: Vec<CommandSpec>,
}

impl CommandSpec {
    pub fn has_subcommands(&self) -> bool {
        !self.subcommands.is_empty()
    }

    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&platform)
    }

    /// Implementations compatible with `platform`, in declaration order.
    pub fn implementations_for(&self, platform: Platform) -> impl Iterator<Item = &Implementation> {
        self.implementations
            .iter()
            .filter(move |imp| imp.supports_platform(platform))
    }

    /// The implementation matching (platform, runtime), if any.
    pub fn implementation(
        &self,
        platform: Platform,
        runtime: RuntimeKind,
    ) -> Option<&Implementation> {
        self.implementations
            .iter()
            .find(|imp| imp.supports(platform, runtime))
    }

    /// Runtimes permitted on `platform`, deduplicated, declaration order.
    pub fn allowed_runtimes(&self, platform: Platform) -> Vec<RuntimeKind> {
        let mut out = Vec::new();
        for imp in self.implementations_for(platform) {
            for runtime in &imp.runtimes {
                if !out.contains(runtime) {
                    out.push(*runtime);
                }
            }
        }
        out
    }

    /// Parsed per-invocation timeout; `None` when not declared.
    pub fn parse_timeout(&self, qualified_name: &str) -> Result<Option<Duration>, InvowkError> {
        match &self.timeout {
            None => Ok(None),
            Some(raw) => humantime::parse_duration(raw).map(Some).map_err(|e| {
                InvowkError::InvalidTimeout {
                    command: qualified_name.to_string(),
                    value: raw.clone(),
                    message: e.to_string(),
                }
            }),
        }
    }

    /// Structural validity of this command alone (nested commands are
    /// walked by the caller; the args-vs-subcommand conflict is reported
    /// at discovery validation with the qualified name).
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || !is_valid_name(&self.name) {
            return Err(format!("invalid command name '{}'", self.name));
        }
        let variadic_count = self.args.iter().filter(|a| a.variadic).count();
        if variadic_count > 1 {
            return Err(format!(
                "command '{}' declares {} variadic arguments; at most one is allowed",
                self.name, variadic_count
            ));
        }
        if let Some(pos) = self.args.iter().position(|a| a.variadic) {
            if pos != self.args.len() - 1 {
                return Err(format!(
                    "command '{}': variadic argument '{}' must be last",
                    self.name, self.args[pos].name
                ));
            }
        }
        // Required args must precede optional ones so positional binding
        // stays unambiguous.
        let mut seen_optional = false;
        for arg in &self.args {
            if arg.required && seen_optional {
                return Err(format!(
                    "command '{}': required argument '{}' follows an optional one",
                    self.name, arg.name
                ));
            }
            if !arg.required {
                seen_optional = true;
            }
        }
        for imp in &self.implementations {
            imp.validate()
                .map_err(|e| format!("command '{}': {e}", self.name))?;
        }
        // At most one implementation per (platform, runtime) pair.
        for platform in [Platform::Linux, Platform::Macos, Platform::Windows] {
            for runtime in [
                RuntimeKind::Native,
                RuntimeKind::Virtual,
                RuntimeKind::Container,
            ] {
                let n = self
                    .implementations
                    .iter()
                    .filter(|imp| imp.supports(platform, runtime))
                    .count();
                if n > 1 {
                    return Err(format!(
                        "command '{}': {n} implementations match ({platform}, {runtime}); at most one is allowed",
                        self.name
                    ));
                }
            }
        }
        if let Some(deps) = &self.deps {
            deps.validate()
                .map_err(|e| format!("command '{}': {e}", self.name))?;
        }
        for imp in &self.implementations {
            if let Some(deps) = &imp.deps {
                deps.validate()
                    .map_err(|e| format!("command '{}': {e}", self.name))?;
            }
        }
        Ok(())
    }
}

/// A parsed declaration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invowkfile {
    #[serde(default)]
    pub invowk: Option<FileMeta>,
    /// Root-level dependency set applied to every command in this file.
    #[serde(default)]
    pub deps: Option<DependencySet>,
    #[serde(default, rename = "cmd")]
    pub commands: Vec<CommandSpec>,
    /// Absolute path of the declaring file; set by the loader.
    #[serde(skip)]
    pub path: PathBuf,
}

impl Invowkfile {
    /// Load and structurally validate a declaration file.
    pub fn load(path: &Path) -> Result<Invowkfile, InvowkError> {
        let text = std::fs::read_to_string(path).map_err(|e| InvowkError::InvokefileParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut file: Invowkfile =
            toml::from_str(&text).map_err(|e| InvowkError::InvokefileParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        file.path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        file.validate()?;
        Ok(file)
    }

    /// Directory of the declaring file; base for relative paths.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Walk all commands depth-first, yielding dotted qualified names.
    pub fn walk(&self) -> Vec<(String, &CommandSpec)> {
        let mut out = Vec::new();
        for cmd in &self.commands {
            walk_into(cmd, None, &mut out);
        }
        out
    }

    /// Look up a command by dotted path.
    pub fn lookup(&self, dotted: &str) -> Option<&CommandSpec> {
        let mut segments = dotted.split('.');
        let first = segments.next()?;
        let mut current = self.commands.iter().find(|c| c.name == first)?;
        for segment in segments {
            current = current.subcommands.iter().find(|c| c.name == segment)?;
        }
        Some(current)
    }

    fn validate(&self) -> Result<(), InvowkError> {
        let err = |message: String| InvowkError::InvokefileParse {
            path: self.path.clone(),
            message,
        };
        if let Some(deps) = &self.deps {
            deps.validate().map_err(&err)?;
        }
        for (qualified, cmd) in self.walk() {
            cmd.validate()
                .map_err(|e| err(format!("{qualified}: {e}")))?;
        }
        // Duplicate names at the same tree level shadow each other.
        let mut seen = std::collections::BTreeSet::new();
        for (qualified, _) in self.walk() {
            if !seen.insert(qualified.clone()) {
                return Err(err(format!("duplicate command '{qualified}'")));
            }
        }
        Ok(())
    }
}

fn walk_into<'a>(
    cmd: &'a CommandSpec,
    prefix: Option<&str>,
    out: &mut Vec<(String, &'a CommandSpec)>,
) {
    let qualified = match prefix {
        Some(p) => format!("{p}.{}", cmd.name),
        None => cmd.name.clone(),
    };
    out.push((qualified.clone(), cmd));
    for sub in &cmd.subcommands {
        walk_into(sub, Some(&qualified), out);
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
