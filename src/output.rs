//! Human-facing output for command execution.
//!
//! Everything the tool prints about an invocation goes through here:
//! status lines, dry-run plan rows, the shell-quoted argv echoed before a
//! backend dispatch, and the spinner shown while the host SSH bridge comes
//! up. Structured logging goes through `tracing`; nothing here is for
//! machines.

use std::borrow::Cow;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

pub struct Output;

impl Output {
    /// Print a success line (watch-mode re-run results and the like).
    pub fn success(msg: impl AsRef<str>) {
        println!("{} {}", "ok".green().bold(), msg.as_ref());
    }

    /// Print an error line to stderr.
    pub fn error(msg: impl AsRef<str>) {
        eprintln!("{} {}", "error:".red().bold(), msg.as_ref());
    }

    /// Print a warning line to stderr (diagnostics render through this).
    pub fn warning(msg: impl AsRef<str>) {
        eprintln!("{} {}", "warning:".yellow().bold(), msg.as_ref());
    }

    /// Print a status line (watch-mode triggers, empty listings).
    pub fn info(msg: impl AsRef<str>) {
        println!("{} {}", "→".cyan(), msg.as_ref());
    }

    /// Print a source header for the command listing.
    pub fn header(msg: impl AsRef<str>) {
        println!("\n{}", msg.as_ref().cyan().bold());
    }

    /// Print one command row under a source header.
    pub fn list_item(msg: impl AsRef<str>) {
        println!("  {}", msg.as_ref());
    }

    /// Print one row of the dry-run plan.
    pub fn kv(key: impl AsRef<str>, value: impl AsRef<str>) {
        println!(
            "  {:<16} {}",
            format!("{}:", key.as_ref()).cyan(),
            value.as_ref()
        );
    }

    /// Print a dry-run plan line.
    pub fn dry_run(msg: impl AsRef<str>) {
        println!("{} {}", "[dry-run]".dimmed(), msg.as_ref());
    }

    /// Echo the argv a backend is about to spawn, shell-quoted so the
    /// line can be copied back into a terminal.
    pub fn running(program: impl AsRef<str>, args: &[String]) {
        let line = shlex::try_join(
            std::iter::once(program.as_ref()).chain(args.iter().map(|a| a.as_str())),
        )
        .unwrap_or_else(|_| format!("{} {}", program.as_ref(), args.join(" ")));
        println!("{} {}", "running".dimmed().bold(), line.dimmed());
    }

    /// Spinner for operations that block the pipeline (SSH bridge
    /// startup, engine warm-up).
    pub fn spinner(msg: impl Into<Cow<'static, str>>) -> Spinner {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("valid template"),
        );
        pb.set_message(msg);
        pb.enable_steady_tick(Duration::from_millis(100));
        Spinner(pb)
    }
}

/// A spinner handle; the pipeline clears it on success and leaves an
/// error line behind on failure.
pub struct Spinner(ProgressBar);

impl Spinner {
    /// Remove the spinner line entirely.
    pub fn finish_clear(self) {
        self.0.finish_and_clear();
    }

    /// Replace the spinner with an error line.
    pub fn finish_error(self, msg: impl AsRef<str>) {
        self.0
            .finish_with_message(format!("{} {}", "error:".red().bold(), msg.as_ref()));
    }
}
