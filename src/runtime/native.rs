//! Native backend: the host shell.
//!
//! Scripts run under `$SHELL` (falling back to `sh`) with the merged
//! context environment replacing the process environment entirely; the
//! inherit policy already decided what passes through. Positional args
//! arrive as `$1..$n` in addition to their projections.

use std::process::Command;

use is_terminal::IsTerminal;
use tracing::debug;

use super::Runtime;
use crate::error::InvowkError;
use crate::execute::context::ExecContext;
use crate::invowkfile::RuntimeKind;
use crate::proc::{self, WaitOutcome};

pub struct NativeRuntime {
    shell: String,
}

impl NativeRuntime {
    pub fn new() -> Self {
        let shell = std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "sh".to_string());
        // Resolve to an absolute path now: the child env is rebuilt from
        // the merged context and may carry no PATH to search.
        let shell = which::which(&shell)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(shell);
        Self { shell }
    }

    fn command_for(&self, cx: &ExecContext) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&cx.script)
            .arg(&cx.command.qualified_name)
            .args(&cx.positionals)
            .current_dir(&cx.workdir)
            .env_clear()
            .envs(&cx.env);
        cmd
    }
}

impl Default for NativeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for NativeRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Native
    }

    fn execute(&self, cx: &ExecContext) -> Result<i32, InvowkError> {
        let mut cmd = self.command_for(cx);
        debug!(
            command = %cx.command.qualified_name,
            execution_id = cx.execution_id,
            shell = %self.shell,
            "Spawning native child"
        );
        let mut child = cmd.spawn().map_err(|e| InvowkError::Launch {
            command: cx.command.qualified_name.clone(),
            message: format!("failed to spawn {}: {e}", self.shell),
        })?;
        match proc::wait_cancellable(&mut child, &cx.cancel)? {
            WaitOutcome::Exited(code) => Ok(code),
            WaitOutcome::Cancelled => Err(cx
                .cancel
                .error_for(&cx.command.qualified_name, cx.cancel.remaining())),
        }
    }

    fn supports_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }
}
