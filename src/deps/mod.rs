//! Dependency validation.
//!
//! For each of the six dependency kinds the validator iterates declared
//! dependencies (AND) and evaluates alternatives in declaration order (OR),
//! stopping at the first success. Failures aggregate into one
//! [`DependencyError`] with per-kind lists; kinds never short-circuit each
//! other. Checks are runtime-aware: host probes ask the host directly,
//! container probes run scripts through the engine.

pub mod capability;
pub mod probe;
pub mod quote;

pub use probe::ProbeEnv;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::diag::Diagnostic;
use crate::discovery::DiscoveryService;
use crate::error::{DependencyError, DependencyFailure, InvowkError};
use crate::execute::cancel::CancelToken;
use crate::invowkfile::{CheckAlternative, DependencySet, FileAccess};
use capability::Capability;
use quote::{is_safe_name, single_quote};

/// Everything a validation pass needs.
pub struct ValidationContext<'a> {
    pub probe: ProbeEnv,
    /// Directory of the declaring invowkfile; base for relative paths.
    pub base_dir: &'a Path,
    /// Immutable snapshot of the user environment at pipeline entry.
    pub user_env: &'a BTreeMap<String, String>,
    pub discovery: &'a DiscoveryService,
    pub cancel: &'a CancelToken,
}

/// Validate a merged dependency set. Warnings (unknown capabilities) are
/// appended to `diagnostics`; unsatisfied dependencies aggregate into the
/// returned error. Transient engine failures abort immediately.
pub fn validate(
    set: &DependencySet,
    cx: &ValidationContext<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), InvowkError> {
    let mut failures = DependencyError::default();

    for dep in &set.tools {
        cx.cancel.check("dependency validation", None)?;
        if !check_tool(&dep.alternatives, cx)? {
            failures
                .missing_tools
                .push(DependencyFailure::new(dep.alternatives.clone()));
        }
    }

    for dep in &set.commands {
        cx.cancel.check("dependency validation", None)?;
        if !check_command(&dep.alternatives, cx)? {
            failures
                .missing_commands
                .push(DependencyFailure::new(dep.alternatives.clone()));
        }
    }

    for dep in &set.files {
        cx.cancel.check("dependency validation", None)?;
        if !check_file(&dep.alternatives, &dep.access, cx)? {
            failures.missing_files.push(DependencyFailure::with_detail(
                dep.alternatives.clone(),
                access_label(&dep.access),
            ));
        }
    }

    let mut seen_caps: BTreeSet<Vec<String>> = BTreeSet::new();
    for dep in &set.capabilities {
        cx.cancel.check("dependency validation", None)?;
        let key: Vec<String> = dep.alternatives.clone();
        if !seen_caps.insert(key) {
            continue;
        }
        match check_capability(&dep.alternatives, cx, diagnostics)? {
            CapabilityOutcome::Satisfied | CapabilityOutcome::Skipped => {}
            CapabilityOutcome::Missing => {
                failures
                    .missing_capabilities
                    .push(DependencyFailure::new(dep.alternatives.clone()));
            }
        }
    }

    for dep in &set.checks {
        cx.cancel.check("dependency validation", None)?;
        if !check_custom(&dep.alternatives, cx)? {
            let labels = dep
                .alternatives
                .iter()
                .map(|alt| {
                    alt.description
                        .clone()
                        .unwrap_or_else(|| alt.script.clone())
                })
                .collect();
            failures
                .failed_checks
                .push(DependencyFailure::new(labels));
        }
    }

    for dep in &set.env {
        // Execute-deps inherit the parent's captured environment; container
        // validation intentionally does not re-check inside the container.
        let satisfied = dep
            .alternatives
            .iter()
            .any(|name| cx.user_env.contains_key(name));
        if !satisfied {
            failures
                .missing_env
                .push(DependencyFailure::new(dep.alternatives.clone()));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(InvowkError::Dependency(failures))
    }
}

fn check_tool(alternatives: &[String], cx: &ValidationContext<'_>) -> Result<bool, InvowkError> {
    for name in alternatives {
        match &cx.probe {
            ProbeEnv::Host => {
                if which::which(name).is_ok() {
                    return Ok(true);
                }
            }
            env @ ProbeEnv::Container { .. } => {
                if !is_safe_name(name) {
                    debug!(%name, "Refusing to probe unsafe tool name in container");
                    continue;
                }
                let quoted = single_quote(name);
                let script = format!(
                    "command -v {quoted} >/dev/null 2>&1 || which {quoted} >/dev/null 2>&1"
                );
                if env.run_script(&script, cx.cancel)?.code == 0 {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn check_command(
    alternatives: &[String],
    cx: &ValidationContext<'_>,
) -> Result<bool, InvowkError> {
    // Sibling commands resolve through discovery in both environments.
    let set = cx.discovery.discover()?;
    for name in alternatives {
        if set.resolve(name).is_ok() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn check_file(
    alternatives: &[String],
    access: &[FileAccess],
    cx: &ValidationContext<'_>,
) -> Result<bool, InvowkError> {
    for raw in alternatives {
        match &cx.probe {
            ProbeEnv::Host => {
                let path = resolve_path(raw, cx.base_dir);
                if host_file_check(&path, access) {
                    return Ok(true);
                }
            }
            env @ ProbeEnv::Container { .. } => {
                if !is_safe_name(raw) {
                    debug!(path = %raw, "Refusing to probe unsafe path in container");
                    continue;
                }
                let quoted = single_quote(raw);
                let mut tests = vec![format!("test -e {quoted}")];
                for bit in access {
                    let flag = match bit {
                        FileAccess::Read => "-r",
                        FileAccess::Write => "-w",
                        FileAccess::Exec => "-x",
                    };
                    tests.push(format!("test {flag} {quoted}"));
                }
                let script = tests.join(" && ");
                if env.run_script(&script, cx.cancel)?.code == 0 {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn resolve_path(raw: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn host_file_check(path: &Path, access: &[FileAccess]) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    for bit in access {
        let ok = match bit {
            FileAccess::Read => readable(path, &metadata),
            FileAccess::Write => writable(path, &metadata),
            FileAccess::Exec => executable(path, &metadata),
        };
        if !ok {
            return false;
        }
    }
    true
}

fn readable(path: &Path, metadata: &std::fs::Metadata) -> bool {
    if metadata.is_dir() {
        std::fs::read_dir(path).is_ok()
    } else {
        std::fs::File::open(path).is_ok()
    }
}

fn writable(path: &Path, metadata: &std::fs::Metadata) -> bool {
    if metadata.is_dir() {
        // Probe with a uniquely named temp file, removed best-effort.
        let probe = path.join(format!(
            ".invowk-probe-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos())
                .unwrap_or(0)
        ));
        match std::fs::File::create(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                true
            }
            Err(_) => false,
        }
    } else {
        !metadata.permissions().readonly()
            && std::fs::OpenOptions::new().append(true).open(path).is_ok()
    }
}

#[cfg(unix)]
fn executable(_path: &Path, metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(windows)]
fn executable(path: &Path, _metadata: &std::fs::Metadata) -> bool {
    const BUILTIN: &[&str] = &["exe", "bat", "cmd", "com"];
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    if BUILTIN.contains(&ext.as_str()) {
        return true;
    }
    std::env::var("PATHEXT")
        .map(|pathext| {
            pathext
                .split(';')
                .filter_map(|entry| entry.strip_prefix('.'))
                .any(|entry| entry.eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

enum CapabilityOutcome {
    Satisfied,
    Missing,
    /// Every alternative named an unknown capability.
    Skipped,
}

fn check_capability(
    alternatives: &[String],
    cx: &ValidationContext<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<CapabilityOutcome, InvowkError> {
    let mut any_known = false;
    for name in alternatives {
        let Some(cap) = Capability::parse(name) else {
            diagnostics.push(Diagnostic::warning(
                "unknown_capability",
                format!("unknown capability '{name}'; skipping"),
            ));
            continue;
        };
        any_known = true;
        let available = match (&cx.probe, cap.host_shortcut()) {
            (ProbeEnv::Host, Some(answer)) => answer,
            (env, _) => env.run_script(cap.probe_script(), cx.cancel)?.code == 0,
        };
        if available {
            return Ok(CapabilityOutcome::Satisfied);
        }
    }
    if any_known {
        Ok(CapabilityOutcome::Missing)
    } else {
        Ok(CapabilityOutcome::Skipped)
    }
}

fn check_custom(
    alternatives: &[CheckAlternative],
    cx: &ValidationContext<'_>,
) -> Result<bool, InvowkError> {
    for alt in alternatives {
        let out = cx.probe.run_script(&alt.script, cx.cancel)?;
        if out.code != alt.expect_code {
            continue;
        }
        if let Some(pattern) = &alt.stdout_regex {
            match regex::Regex::new(pattern) {
                Ok(re) if re.is_match(&out.stdout) => return Ok(true),
                Ok(_) | Err(_) => continue,
            }
        }
        return Ok(true);
    }
    Ok(false)
}

fn access_label(access: &[FileAccess]) -> String {
    if access.is_empty() {
        return "exists".to_string();
    }
    access
        .iter()
        .map(|a| match a {
            FileAccess::Read => "read",
            FileAccess::Write => "write",
            FileAccess::Exec => "exec",
        })
        .collect::<Vec<_>>()
        .join("+")
}
