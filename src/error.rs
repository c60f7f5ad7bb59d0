//! Custom error types for invowk.
//!
//! Every failure the execution pipeline can produce is a variant here, each
//! carrying a stable diagnostic code (rendered to users and asserted by
//! tests) and an exit-code class: user-correctable errors exit 1,
//! infrastructure errors exit 2. A clean nonzero child exit is not an error
//! and passes through as the process exit code.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::invowkfile::RuntimeKind;

/// Exit code for user-correctable pipeline errors.
pub const EXIT_USER_ERROR: i32 = 1;
/// Exit code for infrastructure errors (engine missing, I/O, timeout).
pub const EXIT_INFRA_ERROR: i32 = 2;

#[derive(Error, Debug)]
pub enum InvowkError {
    #[error("Command not found: '{name}'")]
    CommandNotFound { name: String },

    #[error(
        "Ambiguous command '{name}': declared by sources [{}]\n\
         Disambiguate with '@<source> {name}' or '--from <source>'",
        sources.join(", ")
    )]
    AmbiguousCommand { name: String, sources: Vec<String> },

    #[error("Unknown source '{name}'")]
    UnknownSource { name: String },

    #[error("Failed to load config from {path}: {message}")]
    ConfigLoad { path: PathBuf, message: String },

    #[error("Failed to parse invowkfile {path}: {message}")]
    InvokefileParse { path: PathBuf, message: String },

    #[error(
        "Command '{command}' declares positional arguments but also has subcommands; \
         arguments and subcommands are mutually exclusive"
    )]
    ArgsSubcommandConflict { command: String },

    #[error("Execute-dependency cycle: {}", cycle.join(" -> "))]
    ExecuteDepCycle { cycle: Vec<String> },

    #[error("{0}")]
    Input(#[from] InputError),

    #[error(
        "Runtime '{requested}' is not allowed for command '{command}' on this platform; \
         allowed: [{}]",
        allowed.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
    )]
    RuntimeNotAllowed {
        command: String,
        requested: RuntimeKind,
        allowed: Vec<RuntimeKind>,
    },

    #[error("Command '{command}' has no implementation for platform '{platform}'{}",
        runtime.map(|r| format!(" and runtime '{r}'")).unwrap_or_default())]
    PlatformNotSupported {
        command: String,
        platform: String,
        runtime: Option<RuntimeKind>,
    },

    #[error("{0}")]
    Dependency(#[from] DependencyError),

    #[error("Invalid timeout '{value}' on command '{command}': {message}")]
    InvalidTimeout {
        command: String,
        value: String,
        message: String,
    },

    #[error("Command '{command}' timed out after {limit:?}")]
    Timeout { command: String, limit: Duration },

    #[error("Command '{command}' was cancelled")]
    Cancelled { command: String },

    #[error("Failed to launch command '{command}': {message}")]
    Launch { command: String, message: String },

    #[error("Execute-dependency '{dep}' failed: {source}")]
    DepFailed {
        dep: String,
        #[source]
        source: Box<InvowkError>,
    },

    #[error("Execute-dependency '{dep}' exited with code {code}")]
    DepExit { dep: String, code: i32 },

    #[error("No container engine available (tried: {})", tried.join(", "))]
    EngineUnavailable { tried: Vec<String> },

    #[error("Container engine reported a transient failure (exit {code}); retry may succeed")]
    EngineTransient { code: i32 },

    #[error("Host SSH server failed to start: {message}")]
    SshStartup { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InvowkError {
    /// Stable diagnostic code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            InvowkError::CommandNotFound { .. } => "command_not_found",
            InvowkError::AmbiguousCommand { .. } => "ambiguous_command",
            InvowkError::UnknownSource { .. } => "command_not_found",
            InvowkError::ConfigLoad { .. } => "config_load_failed",
            InvowkError::InvokefileParse { .. } => "invokefile_parse_failed",
            InvowkError::ArgsSubcommandConflict { .. } => "args_subcommand_conflict",
            InvowkError::ExecuteDepCycle { .. } => "execute_dep_cycle",
            InvowkError::Input(e) => e.code(),
            InvowkError::RuntimeNotAllowed { .. } => "runtime_not_allowed",
            InvowkError::PlatformNotSupported { .. } => "platform_not_supported",
            InvowkError::Dependency(_) => "dependency_unsatisfied",
            InvowkError::InvalidTimeout { .. } => "invalid_timeout",
            InvowkError::Timeout { .. } => "execution_timeout",
            InvowkError::Cancelled { .. } => "execution_cancelled",
            InvowkError::Launch { .. } => "launch_failed",
            InvowkError::DepFailed { source, .. } => source.code(),
            InvowkError::DepExit { .. } => "dependency_unsatisfied",
            InvowkError::EngineUnavailable { .. } => "engine_unavailable",
            InvowkError::EngineTransient { .. } => "engine_transient",
            InvowkError::SshStartup { .. } => "ssh_startup_failed",
            InvowkError::Io(_) => "io_error",
        }
    }

    /// Process exit code class for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            InvowkError::Timeout { .. }
            | InvowkError::Launch { .. }
            | InvowkError::EngineUnavailable { .. }
            | InvowkError::EngineTransient { .. }
            | InvowkError::SshStartup { .. }
            | InvowkError::Io(_) => EXIT_INFRA_ERROR,
            InvowkError::DepFailed { source, .. } => source.exit_code(),
            _ => EXIT_USER_ERROR,
        }
    }
}

/// Typed input-validation failures (positional args and flag values).
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Missing required argument '{arg}' for command '{command}'")]
    MissingRequired { command: String, arg: String },

    #[error(
        "Too many arguments for command '{command}': expected at most {expected}, got {got}"
    )]
    TooMany {
        command: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid value '{value}' for argument '{arg}' of command '{command}': {message}")]
    InvalidValue {
        command: String,
        arg: String,
        value: String,
        message: String,
    },

    #[error("Invalid value '{value}' for flag '--{flag}' of command '{command}': {message}")]
    InvalidFlagValue {
        command: String,
        flag: String,
        value: String,
        message: String,
    },

    #[error("Unknown flag '--{flag}' for command '{command}'")]
    UnknownFlag { command: String, flag: String },
}

impl InputError {
    pub fn code(&self) -> &'static str {
        match self {
            InputError::MissingRequired { .. }
            | InputError::TooMany { .. }
            | InputError::InvalidValue { .. } => "invalid_argument",
            InputError::InvalidFlagValue { .. } | InputError::UnknownFlag { .. } => {
                "invalid_flag_value"
            }
        }
    }
}

/// Aggregate of every unsatisfied dependency, grouped by kind.
///
/// Validation never short-circuits across kinds: each failing dependency
/// lands in its kind's list with the full alternative set that was tried.
#[derive(Debug, Default)]
pub struct DependencyError {
    pub missing_tools: Vec<DependencyFailure>,
    pub missing_commands: Vec<DependencyFailure>,
    pub missing_files: Vec<DependencyFailure>,
    pub missing_capabilities: Vec<DependencyFailure>,
    pub failed_checks: Vec<DependencyFailure>,
    pub missing_env: Vec<DependencyFailure>,
}

/// One unsatisfied dependency: every alternative that was tried, in
/// declaration order, plus an optional detail from the last probe.
#[derive(Debug, Clone)]
pub struct DependencyFailure {
    pub alternatives: Vec<String>,
    pub detail: Option<String>,
}

impl DependencyFailure {
    pub fn new(alternatives: Vec<String>) -> Self {
        Self {
            alternatives,
            detail: None,
        }
    }

    pub fn with_detail(alternatives: Vec<String>, detail: impl Into<String>) -> Self {
        Self {
            alternatives,
            detail: Some(detail.into()),
        }
    }
}

impl DependencyError {
    pub fn is_empty(&self) -> bool {
        self.missing_tools.is_empty()
            && self.missing_commands.is_empty()
            && self.missing_files.is_empty()
            && self.missing_capabilities.is_empty()
            && self.failed_checks.is_empty()
            && self.missing_env.is_empty()
    }

    fn sections(&self) -> [(&'static str, &Vec<DependencyFailure>); 6] {
        [
            ("tools", &self.missing_tools),
            ("commands", &self.missing_commands),
            ("files", &self.missing_files),
            ("capabilities", &self.missing_capabilities),
            ("checks", &self.failed_checks),
            ("environment variables", &self.missing_env),
        ]
    }
}

impl std::error::Error for DependencyError {}

impl std::fmt::Display for DependencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Unsatisfied dependencies:")?;
        for (kind, failures) in self.sections() {
            for failure in failures {
                write!(f, "  {}: none of [{}]", kind, failure.alternatives.join(", "))?;
                if let Some(detail) = &failure.detail {
                    write!(f, " ({detail})")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
