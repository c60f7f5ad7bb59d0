//! The command execution pipeline.
//!
//! [`CommandService`] composes discovery, input validation, runtime
//! resolution, dependency validation, execute-dep recursion and backend
//! dispatch into one sequential pipeline. It returns a typed error plus a
//! diagnostic list; the CLI layer renders both.

pub mod cancel;
pub mod context;
pub mod dep_run;
pub mod inputs;
pub mod request;
pub mod runtime_select;

pub use cancel::CancelToken;
pub use request::ExecuteRequest;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::UserConfig;
use crate::deps::{self, ProbeEnv, ValidationContext};
use crate::diag::Diagnostic;
use crate::discovery::{DiscoveryService, parse_target};
use crate::error::InvowkError;
use crate::invowkfile::{DependencySet, Platform, RuntimeKind};
use crate::output::Output;
use crate::runtime::RuntimeRegistry;
use crate::ssh::SshController;
use context::{ContextInputs, ExecContext};
use dep_run::DepStack;

/// Orchestrator for command execution.
pub struct CommandService {
    config: Arc<UserConfig>,
    discovery: DiscoveryService,
    registry: Arc<RuntimeRegistry>,
    ssh: Arc<SshController>,
}

impl CommandService {
    pub fn new(config: Arc<UserConfig>, discovery: DiscoveryService) -> Self {
        let registry = Arc::new(RuntimeRegistry::new(Arc::clone(&config)));
        Self {
            config,
            discovery,
            registry,
            ssh: Arc::new(SshController::new()),
        }
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    /// Execute one request to completion.
    ///
    /// Returns the exit code to surface (the child's own code on a clean
    /// nonzero exit). Pipeline failures come back as typed errors; the
    /// diagnostics list carries warnings produced along the way.
    pub fn execute(
        &self,
        request: &ExecuteRequest,
        cancel: &CancelToken,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<i32, InvowkError> {
        self.execute_with_stack(request, DepStack::new(), cancel, diagnostics)
    }

    fn execute_with_stack(
        &self,
        request: &ExecuteRequest,
        stack: DepStack,
        cancel: &CancelToken,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<i32, InvowkError> {
        // Immutable snapshot of the user environment, captured before any
        // step that might touch process env.
        let user_env: BTreeMap<String, String> = std::env::vars().collect();

        // Resolve the target command through the shared discovery cache.
        let parsed = parse_target(&request.tokens, request.from.as_deref());
        let (info, consumed) = self.discovery.find(parsed.filter.as_ref(), &parsed.rest)?;
        let input_tokens = parsed.rest[consumed..].to_vec();
        debug!(command = %info.full_id(), "Resolved target command");

        // Validate flags, positional arguments, platform compatibility.
        let inputs = inputs::resolve(&info.qualified_name, &info.command, &input_tokens)
            .map_err(InvowkError::Input)?;
        let platform = Platform::current();
        let resolution =
            runtime_select::resolve(&info, request.runtime, &self.config, platform)?;
        let runtime_kind = resolution.runtime;
        let implementation = resolution.implementation.clone();

        // Build the execution context with the caller's token so Ctrl+C
        // propagates into the backend; the declared timeout narrows the
        // token after the dry-run gate.
        let mut cx = context::build(ContextInputs {
            command: &info,
            implementation: &implementation,
            runtime: runtime_kind,
            inputs: &inputs,
            user_env: &user_env,
            declared_env: &info.command.env,
            env_files: &request.env_files,
            cli_env: &request.env,
            inherit_mode: self.config.env.inherit_mode,
            inherit_overrides: &request.inherit,
            workdir_override: request.workdir.as_deref(),
            interactive: request.interactive,
            force_rebuild: request.force_rebuild,
            cancel: cancel.clone(),
        })?;

        let merged_deps = DependencySet::merged(&[
            info.model.deps.as_ref(),
            info.command.deps.as_ref(),
            implementation.deps.as_ref(),
        ]);

        // Dry run renders the plan and stops before any side effect: no
        // child process, no SSH server, no dependency probes. A malformed
        // timeout string does not affect it either.
        if request.dry_run {
            self.render_plan(&cx, &merged_deps);
            return Ok(0);
        }

        // Per-invocation timeout narrows the caller's cancellation token;
        // malformed durations fail fast.
        let timeout = info.command.parse_timeout(&info.qualified_name)?;
        let cancel = match timeout {
            Some(duration) => cancel.with_timeout(duration),
            None => cancel.clone(),
        };
        cx.cancel = cancel.clone();

        // The SSH lease is held by the frame that started the server; a
        // recursive chain shares one instance and only the starter's drop
        // stops it.
        let needs_ssh = runtime_kind == RuntimeKind::Container
            && implementation
                .container
                .as_ref()
                .is_some_and(|c| c.host_ssh);
        let _ssh_lease = if needs_ssh {
            let lease = self.ssh.acquire(&cancel)?;
            let backend = self.registry.get(runtime_kind)?;
            let host = backend
                .container_engine()
                .map(|engine| {
                    if engine.contains("podman") {
                        "host.containers.internal"
                    } else {
                        "host.docker.internal"
                    }
                })
                .unwrap_or("host.containers.internal");
            cx.env
                .insert("INVOWK_SSH_HOST".to_string(), host.to_string());
            cx.env
                .insert("INVOWK_SSH_PORT".to_string(), lease.coords.port.to_string());
            cx.env
                .insert("INVOWK_SSH_USER".to_string(), lease.coords.user.clone());
            cx.env
                .insert("INVOWK_SSH_TOKEN".to_string(), lease.coords.token.clone());
            Some(lease)
        } else {
            None
        };

        cx.execution_id = self.registry.next_execution_id();

        // Validate dependencies with the runtime-aware probe strategy.
        let probe = self.probe_env(runtime_kind, &implementation)?;
        let validation = ValidationContext {
            probe,
            base_dir: info.model.base_dir(),
            user_env: &user_env,
            discovery: &self.discovery,
            cancel: &cancel,
        };
        deps::validate(&merged_deps, &validation, diagnostics)?;

        // Run execute-deps through the full pipeline, then dispatch.
        dep_run::run_execute_deps(
            &merged_deps,
            &info.qualified_name,
            &self.discovery,
            request,
            &stack,
            &cancel,
            diagnostics,
            &|child_request, child_stack, diags| {
                self.execute_with_stack(&child_request, child_stack, &cancel, diags)
            },
        )?;

        cancel.check(&info.qualified_name, timeout)?;

        let backend = self.registry.get(runtime_kind)?;
        info!(
            command = %info.full_id(),
            runtime = %runtime_kind,
            execution_id = cx.execution_id,
            "Dispatching"
        );
        let code = if cx.interactive && backend.supports_interactive() {
            backend.execute_interactive(&cx)?
        } else {
            backend.execute(&cx)?
        };
        Ok(code)
    }

    fn probe_env(
        &self,
        runtime: RuntimeKind,
        implementation: &crate::invowkfile::Implementation,
    ) -> Result<ProbeEnv, InvowkError> {
        match (runtime, &implementation.container) {
            (RuntimeKind::Container, Some(container)) => {
                let backend = self.registry.get(RuntimeKind::Container)?;
                let engine = backend
                    .container_engine()
                    .unwrap_or_else(|| "podman".to_string());
                Ok(ProbeEnv::Container {
                    engine,
                    image: container.image.clone(),
                })
            }
            _ => Ok(ProbeEnv::Host),
        }
    }

    fn render_plan(&self, cx: &ExecContext, deps: &DependencySet) {
        Output::dry_run(format!(
            "Would run {} via {} runtime",
            cx.command.full_id(),
            cx.runtime
        ));
        Output::kv("workdir", cx.workdir.display().to_string());
        if let Some(container) = &cx.implementation.container {
            Output::kv("image", &container.image);
        }
        if !cx.positionals.is_empty() {
            Output::kv("args", cx.positionals.join(" "));
        }
        let env_names: Vec<&str> = cx.env.keys().map(|s| s.as_str()).collect();
        Output::kv("env", env_names.join(" "));
        let execute_deps: Vec<String> = deps
            .commands
            .iter()
            .filter(|d| d.execute)
            .map(|d| d.alternatives.join("|"))
            .collect();
        if !execute_deps.is_empty() {
            Output::kv("execute-deps", execute_deps.join(", "));
        }
        if !deps.tools.is_empty() || !deps.files.is_empty() || !deps.env.is_empty() {
            Output::kv(
                "deps",
                format!(
                    "{} tools, {} files, {} env vars",
                    deps.tools.len(),
                    deps.files.len(),
                    deps.env.len()
                ),
            );
        }
    }
}
