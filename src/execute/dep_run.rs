//! Recursive execution of `execute:true` command dependencies.
//!
//! Each execute-dep runs through the full orchestrator pipeline as its own
//! request before the owning command runs. Resolution picks the first
//! alternative that resolves to a discoverable command; once selected
//! there is no fallback. Names already executed in the batch are skipped
//! (first occurrence under root → command → implementation merge order
//! wins). Cycles that survive static validation are caught by the
//! execution stack threaded through the call chain.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::diag::Diagnostic;
use crate::discovery::DiscoveryService;
use crate::error::InvowkError;
use crate::execute::cancel::CancelToken;
use crate::execute::request::ExecuteRequest;
use crate::invowkfile::DependencySet;

/// Copy-on-write execution stack: pushing clones the spine so sibling
/// chains never observe each other's frames.
#[derive(Debug, Clone, Default)]
pub struct DepStack {
    frames: Arc<Vec<String>>,
}

impl DepStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frames.iter().any(|f| f == name)
    }

    /// A new stack with `name` pushed; the receiver is untouched.
    pub fn pushed(&self, name: &str) -> DepStack {
        let mut frames = (*self.frames).clone();
        frames.push(name.to_string());
        DepStack {
            frames: Arc::new(frames),
        }
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// The cycle path for an error report: existing frames plus the
    /// re-entered name.
    pub fn cycle_through(&self, name: &str) -> Vec<String> {
        let mut cycle: Vec<String> = self
            .frames
            .iter()
            .skip_while(|f| f.as_str() != name)
            .cloned()
            .collect();
        cycle.push(name.to_string());
        cycle
    }
}

/// Callback into the orchestrator for one dependency execution.
pub type RunDep<'a> =
    dyn Fn(ExecuteRequest, DepStack, &mut Vec<Diagnostic>) -> Result<i32, InvowkError> + 'a;

/// Run every `execute:true` command dependency of `deps`, in merge order.
pub fn run_execute_deps(
    deps: &DependencySet,
    owner: &str,
    discovery: &DiscoveryService,
    parent_request: &ExecuteRequest,
    stack: &DepStack,
    cancel: &CancelToken,
    diagnostics: &mut Vec<Diagnostic>,
    run: &RunDep<'_>,
) -> Result<(), InvowkError> {
    let mut executed: BTreeSet<String> = BTreeSet::new();
    let set = discovery.discover_validated()?;

    for dep in deps.commands.iter().filter(|d| d.execute) {
        cancel.check(owner, None)?;

        // First alternative that resolves is selected; no fallback later.
        let resolved = dep
            .alternatives
            .iter()
            .find_map(|name| set.resolve(name).ok().map(|info| (name.clone(), info)));
        let Some((name, info)) = resolved else {
            return Err(InvowkError::DepFailed {
                dep: dep.alternatives.join("|"),
                source: Box::new(InvowkError::CommandNotFound {
                    name: dep.alternatives.first().cloned().unwrap_or_default(),
                }),
            });
        };

        let dep_id = info.full_id();
        if !executed.insert(dep_id.clone()) {
            debug!(dep = %dep_id, "Skipping already-executed dependency");
            continue;
        }

        if stack.contains(&dep_id) {
            return Err(InvowkError::ExecuteDepCycle {
                cycle: stack.cycle_through(&dep_id),
            });
        }

        debug!(owner, dep = %dep_id, "Running execute-dependency");
        let child_request = parent_request.child_for(&name);
        let child_stack = stack.pushed(&dep_id);
        match run(child_request, child_stack, diagnostics) {
            Ok(0) => {}
            Ok(code) => {
                return Err(InvowkError::DepExit {
                    dep: info.qualified_name.clone(),
                    code,
                });
            }
            Err(err @ InvowkError::ExecuteDepCycle { .. }) => return Err(err),
            Err(err) => {
                return Err(InvowkError::DepFailed {
                    dep: info.qualified_name.clone(),
                    source: Box::new(err),
                });
            }
        }
    }
    Ok(())
}
