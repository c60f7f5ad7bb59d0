//! invowk - declarative command runner.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use invowk::cli::{Cli, Commands, ListArgs, RunArgs};
use invowk::config::{LoadOptions, UserConfig};
use invowk::diag;
use invowk::discovery::{DiscoveryCache, DiscoveryService, SourceFilter};
use invowk::error::InvowkError;
use invowk::execute::cancel::{self, CancelToken};
use invowk::execute::{CommandService, ExecuteRequest};
use invowk::output::Output;
use invowk::watch;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            Output::error(err.to_string());
            err.exit_code()
        }
    };
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("INVOWK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<i32, InvowkError> {
    let load_options = LoadOptions {
        explicit_path: cli.config.clone(),
    };
    let (config, config_diag) = UserConfig::load(&load_options)?;
    if let Some(diag) = config_diag {
        diag.render();
    }

    let config = Arc::new(config);
    let cwd = std::env::current_dir().map_err(InvowkError::Io)?;
    let discovery = DiscoveryService::new(
        Arc::clone(&config),
        cwd,
        Arc::new(DiscoveryCache::new()),
    );
    let service = CommandService::new(Arc::clone(&config), discovery);

    let cancel = CancelToken::new();
    cancel::install_interrupt_handler(&cancel);

    match cli.command {
        Commands::Run(args) => run_command(&service, &cancel, args, &cli.config, cli.interactive, cli.verbose),
        Commands::List(args) => list_commands(&service, args),
        Commands::External(tokens) => {
            let args = RunArgs::from_external(&tokens).map_err(|e| InvowkError::Input(
                invowk::error::InputError::InvalidValue {
                    command: String::new(),
                    arg: "command-line".to_string(),
                    value: tokens
                        .iter()
                        .map(|t| t.to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join(" "),
                    message: e.to_string(),
                },
            ))?;
            run_command(&service, &cancel, args, &cli.config, cli.interactive, cli.verbose)
        }
    }
}

fn run_command(
    service: &CommandService,
    cancel: &CancelToken,
    args: RunArgs,
    config_path: &Option<PathBuf>,
    interactive: bool,
    verbose: u8,
) -> Result<i32, InvowkError> {
    let watch_requested = args.watch;
    let request: ExecuteRequest = args.to_request(interactive, verbose, config_path.clone());
    let mut diagnostics = Vec::new();

    let result = if watch_requested {
        let parsed =
            invowk::discovery::parse_target(&request.tokens, request.from.as_deref());
        service
            .discovery()
            .find(parsed.filter.as_ref(), &parsed.rest)
            .and_then(|(info, _)| {
                watch::run_with_watch(service, &info, &request, cancel, &mut diagnostics)
            })
    } else {
        service.execute(&request, cancel, &mut diagnostics)
    };

    // Set-level diagnostics render here on a non-error discovery; the
    // validator has already rendered them when validation failed.
    if let Some(set) = service.discovery().cached_validated() {
        diag::render_all(&set.diagnostics);
    }
    diag::render_all(&diagnostics);

    result
}

fn list_commands(service: &CommandService, args: ListArgs) -> Result<i32, InvowkError> {
    let set = service.discovery().discover_validated()?;
    diag::render_all(&set.diagnostics);

    let filter = args.from.map(SourceFilter::new);

    if args.format == "json" {
        let rows: Vec<_> = set
            .iter()
            .filter(|info| {
                filter
                    .as_ref()
                    .is_none_or(|f| f.canonical == info.source)
            })
            .map(|info| {
                serde_json::json!({
                    "source": info.source,
                    "name": info.qualified_name,
                    "description": info.command.description,
                    "ambiguous": set.ambiguous_names().contains(info.root_segment()),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).map_err(|e| InvowkError::Launch {
                command: "list".to_string(),
                message: e.to_string(),
            })?
        );
        return Ok(0);
    }

    let mut shown_any = false;
    for source in set.source_ids() {
        if let Some(filter) = &filter {
            if filter.canonical != source {
                continue;
            }
        }
        let Some(commands) = set.commands_of(source) else {
            continue;
        };
        if commands.is_empty() {
            continue;
        }
        shown_any = true;
        Output::header(format!("@{source}"));
        for info in commands {
            let marker = if info.simple_name.is_none() && set.ambiguous_names().contains(info.root_segment()) {
                " (ambiguous; use @source)"
            } else {
                ""
            };
            match &info.command.description {
                Some(description) => {
                    Output::list_item(format!("{:<24} {description}{marker}", info.qualified_name));
                }
                None => Output::list_item(format!("{}{marker}", info.qualified_name)),
            }
        }
    }
    if !shown_any {
        Output::info("No commands discovered");
        if let Some(filter) = &filter {
            return Err(InvowkError::UnknownSource {
                source: filter.raw.clone(),
            });
        }
    }
    Ok(0)
}
