//! Virtual backend: in-process POSIX shell interpreter.
//!
//! Scripts run inside a `brush-core` shell hosted on a module-local tokio
//! runtime; no child process is spawned for the script itself (external
//! commands the script calls still fork). The context environment, working
//! directory and positional parameters are applied through a generated
//! preamble so the interpreter sees exactly what a native child would.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::Runtime;
use crate::deps::quote::single_quote;
use crate::error::InvowkError;
use crate::execute::cancel::CancelToken;
use crate::execute::context::ExecContext;
use crate::invowkfile::RuntimeKind;

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

pub struct VirtualRuntime;

impl VirtualRuntime {
    pub fn new() -> Self {
        Self
    }

    /// Compose the preamble that reproduces the execution context inside
    /// the interpreter: working directory, environment, positionals.
    fn compose_script(cx: &ExecContext) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "cd {} || exit 1\n",
            single_quote(&cx.workdir.to_string_lossy())
        ));
        for (key, value) in &cx.env {
            if ENV_NAME.is_match(key) {
                out.push_str(&format!("export {key}={}\n", single_quote(value)));
            }
        }
        if !cx.positionals.is_empty() {
            out.push_str("set --");
            for arg in &cx.positionals {
                out.push(' ');
                out.push_str(&single_quote(arg));
            }
            out.push('\n');
        }
        out.push_str(&cx.script);
        out
    }

    async fn run_in_shell(script: String, cancel: CancelToken) -> Result<i32, ShellOutcome> {
        let options = brush_core::CreateOptions {
            no_profile: true,
            no_rc: true,
            sh_mode: true,
            shell_name: Some("invowk".to_string()),
            ..Default::default()
        };
        let mut shell = brush_core::Shell::new(&options)
            .await
            .map_err(|e| ShellOutcome::Failed(e.to_string()))?;
        let params = shell.default_exec_params();

        let exec = shell.run_string(script, &params);
        tokio::pin!(exec);
        let mut poll = tokio::time::interval(std::time::Duration::from_millis(50));
        loop {
            tokio::select! {
                result = &mut exec => {
                    return match result {
                        Ok(outcome) => Ok(i32::from(outcome.exit_code)),
                        Err(e) => Err(ShellOutcome::Failed(e.to_string())),
                    };
                }
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        // Dropping the execution future stops the
                        // interpreter at its next await point.
                        return Err(ShellOutcome::Cancelled);
                    }
                }
            }
        }
    }
}

enum ShellOutcome {
    Cancelled,
    Failed(String),
}

impl Default for VirtualRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for VirtualRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Virtual
    }

    fn execute(&self, cx: &ExecContext) -> Result<i32, InvowkError> {
        let script = Self::compose_script(cx);
        debug!(
            command = %cx.command.qualified_name,
            execution_id = cx.execution_id,
            "Entering in-process shell"
        );
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(InvowkError::Io)?;
        match runtime.block_on(Self::run_in_shell(script, cx.cancel.clone())) {
            Ok(code) => Ok(code),
            Err(ShellOutcome::Cancelled) => Err(cx
                .cancel
                .error_for(&cx.command.qualified_name, cx.cancel.remaining())),
            Err(ShellOutcome::Failed(message)) => Err(InvowkError::Launch {
                command: cx.command.qualified_name.clone(),
                message,
            }),
        }
    }
}
