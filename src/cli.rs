//! CLI argument definitions for invowk.
//!
//! This module contains the clap-derived `Cli` and `Commands` types.
//! Separated from `main.rs` so library code can build requests from them.
//!
//! Invowkfile commands are invoked either explicitly (`invowk run build`)
//! or bare (`invowk build`); bare tokens arrive as an external subcommand
//! and are re-parsed through the `run` parser. Execution flags precede the
//! command name; tokens after it belong to the invoked command's own
//! declared flags and positionals.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::InheritMode;
use crate::execute::ExecuteRequest;
use crate::execute::context::InheritOverrides;
use crate::invowkfile::RuntimeKind;

#[derive(Debug, Parser)]
#[command(name = "invowk")]
#[command(about = "Declarative command runner - execute invowkfile commands")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the user config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose logging (repeat for more detail)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Prefer an interactive session when the backend supports it
    #[arg(long, short = 'i', global = true)]
    pub interactive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a command by name
    Run(RunArgs),

    /// List discovered commands grouped by source
    List(ListArgs),

    /// Bare invocation: `invowk <command> [args...]`
    #[command(external_subcommand)]
    External(Vec<OsString>),
}

#[derive(Debug, Args, Default)]
pub struct RunArgs {
    /// Execution backend override
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeKind>,

    /// Only consider commands from this source
    #[arg(long, value_name = "SOURCE")]
    pub from: Option<String>,

    /// Force-refresh backend state (container image pull)
    #[arg(long)]
    pub force_rebuild: bool,

    /// Show the execution plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Re-run the command when its watched paths change
    #[arg(long)]
    pub watch: bool,

    /// Extra dotenv file(s) merged into the environment
    #[arg(long = "env-file", value_name = "PATH")]
    pub env_files: Vec<PathBuf>,

    /// Extra environment variable(s), KEY=VALUE
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Environment inheritance mode
    #[arg(long = "env-inherit-mode", value_enum)]
    pub env_inherit_mode: Option<InheritMode>,

    /// Always inherit this variable (repeatable)
    #[arg(long = "env-inherit-allow", value_name = "NAME")]
    pub env_inherit_allow: Vec<String>,

    /// Never inherit this variable (repeatable)
    #[arg(long = "env-inherit-deny", value_name = "NAME")]
    pub env_inherit_deny: Vec<String>,

    /// Working directory override
    #[arg(long, value_name = "PATH")]
    pub workdir: Option<PathBuf>,

    /// Command name, optionally `@source`-prefixed or dotted
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Arguments and flags of the invoked command
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only list commands from this source
    #[arg(long, value_name = "SOURCE")]
    pub from: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

impl RunArgs {
    /// Build the orchestrator request.
    pub fn to_request(
        &self,
        cli_interactive: bool,
        cli_verbose: u8,
        config_path: Option<PathBuf>,
    ) -> ExecuteRequest {
        let mut tokens = Vec::with_capacity(1 + self.args.len());
        tokens.push(self.command.clone());
        tokens.extend(self.args.iter().cloned());
        ExecuteRequest {
            tokens,
            from: self.from.clone(),
            runtime: self.runtime,
            env: self.env.clone(),
            env_files: self.env_files.clone(),
            inherit: InheritOverrides {
                mode: self.env_inherit_mode,
                allow: self.env_inherit_allow.clone(),
                deny: self.env_inherit_deny.clone(),
            },
            workdir: self.workdir.clone(),
            interactive: cli_interactive,
            verbose: cli_verbose > 0,
            force_rebuild: self.force_rebuild,
            dry_run: self.dry_run,
            config_path,
        }
    }

    /// Re-parse bare-invocation tokens through the `run` parser.
    pub fn from_external(tokens: &[OsString]) -> Result<RunArgs, clap::Error> {
        #[derive(Parser)]
        struct Shim {
            #[command(flatten)]
            run: RunArgs,
        }
        let mut argv: Vec<OsString> = vec![OsString::from("invowk")];
        argv.extend(tokens.iter().cloned());
        Shim::try_parse_from(argv).map(|shim| shim.run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parses_execution_flags_before_command() {
        let cli = Cli::try_parse_from([
            "invowk", "run", "--runtime", "container", "--env", "K=V", "build", "--target=prod",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(run) => {
                assert_eq!(run.runtime, Some(RuntimeKind::Container));
                assert_eq!(run.env, vec![("K".to_string(), "V".to_string())]);
                assert_eq!(run.command, "build");
                assert_eq!(run.args, vec!["--target=prod".to_string()]);
            }
            other => panic!("expected Run, got {other:?}"),
        }
    }

    #[test]
    fn bare_invocation_lands_in_external() {
        let cli = Cli::try_parse_from(["invowk", "build", "--target=prod"]).unwrap();
        match cli.command {
            Commands::External(tokens) => {
                let run = RunArgs::from_external(&tokens).unwrap();
                assert_eq!(run.command, "build");
                assert_eq!(run.args, vec!["--target=prod".to_string()]);
            }
            other => panic!("expected External, got {other:?}"),
        }
    }

    #[test]
    fn source_prefix_stays_a_positional() {
        let cli = Cli::try_parse_from(["invowk", "@foo", "deploy"]).unwrap();
        match cli.command {
            Commands::External(tokens) => {
                let run = RunArgs::from_external(&tokens).unwrap();
                assert_eq!(run.command, "@foo");
                assert_eq!(run.args, vec!["deploy".to_string()]);
                let request = run.to_request(false, 0, None);
                assert_eq!(request.tokens, vec!["@foo", "deploy"]);
            }
            other => panic!("expected External, got {other:?}"),
        }
    }

    #[test]
    fn malformed_env_pair_is_rejected() {
        let result = Cli::try_parse_from(["invowk", "run", "--env", "NOEQUALS", "build"]);
        assert!(result.is_err());
    }

    #[test]
    fn request_carries_inherit_overrides() {
        let cli = Cli::try_parse_from([
            "invowk",
            "run",
            "--env-inherit-mode",
            "none",
            "--env-inherit-allow",
            "PATH",
            "build",
        ])
        .unwrap();
        let Commands::Run(run) = cli.command else {
            panic!("expected Run");
        };
        let request = run.to_request(false, 1, None);
        assert_eq!(request.inherit.mode, Some(InheritMode::None));
        assert_eq!(request.inherit.allow, vec!["PATH".to_string()]);
        assert!(request.verbose);
    }
}
