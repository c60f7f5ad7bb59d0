//! Container backend: dispatches scripts through a container engine CLI.
//!
//! Engine selection: implementation override, then configured engine, then
//! first of podman/docker found on PATH. Engine absence is an
//! infrastructure error. The working directory is bind-mounted and entered
//! so scripts see their project files.

use std::process::Command;

use is_terminal::IsTerminal;
use tracing::debug;

use super::Runtime;
use crate::config::UserConfig;
use crate::error::InvowkError;
use crate::execute::context::ExecContext;
use crate::invowkfile::RuntimeKind;
use crate::output::Output;
use crate::proc::{self, WaitOutcome};

/// Engine exit code for engine-side failures.
const ENGINE_ERROR_CODE: i32 = 125;

/// Mount point of the working directory inside the container.
const WORKDIR_MOUNT: &str = "/invowk/work";

pub struct ContainerRuntime {
    engine: String,
}

impl ContainerRuntime {
    /// Pick a usable engine, honoring the configured preference.
    pub fn detect(config: &UserConfig) -> Result<Self, InvowkError> {
        let mut candidates: Vec<String> = Vec::new();
        if let Some(engine) = &config.container.engine {
            candidates.push(engine.clone());
        }
        candidates.push("podman".to_string());
        candidates.push("docker".to_string());
        candidates.dedup();

        for candidate in &candidates {
            if which::which(candidate).is_ok() {
                debug!(engine = %candidate, "Selected container engine");
                return Ok(Self {
                    engine: candidate.clone(),
                });
            }
        }
        Err(InvowkError::EngineUnavailable { tried: candidates })
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Hostname under which containerized scripts reach the host.
    pub fn host_alias(&self) -> &'static str {
        if self.engine.contains("podman") {
            "host.containers.internal"
        } else {
            "host.docker.internal"
        }
    }

    fn command_for(&self, cx: &ExecContext, interactive: bool) -> Result<Command, InvowkError> {
        let container = cx.implementation.container.as_ref().ok_or_else(|| {
            InvowkError::Launch {
                command: cx.command.qualified_name.clone(),
                message: "container runtime selected without container config".to_string(),
            }
        })?;

        let mut cmd = Command::new(&self.engine);
        cmd.arg("run").arg("--rm");
        if interactive {
            cmd.arg("-it");
        }
        if cx.force_rebuild {
            cmd.arg("--pull=always");
        }
        cmd.arg("-v").arg(format!(
            "{}:{}",
            cx.workdir.display(),
            WORKDIR_MOUNT
        ));
        cmd.arg("-w").arg(WORKDIR_MOUNT);
        for (key, value) in &cx.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&container.image);
        cmd.arg("sh").arg("-c").arg(&cx.script);
        cmd.arg(&cx.command.qualified_name).args(&cx.positionals);
        Ok(cmd)
    }

    fn run(&self, cx: &ExecContext, interactive: bool) -> Result<i32, InvowkError> {
        let mut cmd = self.command_for(cx, interactive)?;
        // Echo the engine invocation (image only; env flags may carry
        // credentials).
        if let Some(container) = &cx.implementation.container {
            Output::running(
                &self.engine,
                &[
                    "run".to_string(),
                    "--rm".to_string(),
                    container.image.clone(),
                ],
            );
        }
        debug!(
            command = %cx.command.qualified_name,
            execution_id = cx.execution_id,
            engine = %self.engine,
            "Spawning container child"
        );
        let mut child = cmd.spawn().map_err(|e| InvowkError::Launch {
            command: cx.command.qualified_name.clone(),
            message: format!("failed to spawn {}: {e}", self.engine),
        })?;
        match proc::wait_cancellable(&mut child, &cx.cancel)? {
            WaitOutcome::Exited(ENGINE_ERROR_CODE) => Err(InvowkError::EngineTransient {
                code: ENGINE_ERROR_CODE,
            }),
            WaitOutcome::Exited(code) => Ok(code),
            WaitOutcome::Cancelled => Err(cx
                .cancel
                .error_for(&cx.command.qualified_name, cx.cancel.remaining())),
        }
    }
}

impl Runtime for ContainerRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Container
    }

    fn execute(&self, cx: &ExecContext) -> Result<i32, InvowkError> {
        self.run(cx, false)
    }

    fn supports_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn container_engine(&self) -> Option<String> {
        Some(self.engine.clone())
    }

    fn execute_interactive(&self, cx: &ExecContext) -> Result<i32, InvowkError> {
        self.run(cx, true)
    }
}
