//! Execution-context building: environment merge and input projection.
//!
//! The merged environment is assembled in a fixed order (later wins):
//! inherited process env filtered by policy, declared static env, dotenv
//! files, CLI `--env` pairs, and finally the projected inputs. Projection
//! is a pure function of declarations and inputs; the variables it emits
//! are a stable interface user scripts depend on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::InheritMode;
use crate::discovery::CommandInfo;
use crate::error::InvowkError;
use crate::execute::cancel::CancelToken;
use crate::execute::inputs::{ArgValue, ResolvedInputs};
use crate::invowkfile::{Implementation, RuntimeKind};

/// Prefix of every projected variable.
pub const ENV_PREFIX: &str = "INVOWK";

/// Baseline kept by the `system` inherit mode.
const SYSTEM_BASELINE: &[&str] = &[
    "PATH", "HOME", "USER", "LOGNAME", "SHELL", "TERM", "LANG", "TMPDIR",
];

/// Environment-inheritance overrides of one request.
#[derive(Debug, Clone, Default)]
pub struct InheritOverrides {
    pub mode: Option<InheritMode>,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

/// The fully built execution context handed to a backend.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub command: std::sync::Arc<CommandInfo>,
    pub implementation: Implementation,
    pub runtime: RuntimeKind,
    /// Resolved script body.
    pub script: String,
    pub workdir: PathBuf,
    /// Merged environment (policy-filtered inherit + declared + dotenv +
    /// CLI + projections).
    pub env: BTreeMap<String, String>,
    /// Positional args as provided, in order.
    pub positionals: Vec<String>,
    /// Monotonic id assigned by the runtime registry.
    pub execution_id: u64,
    pub interactive: bool,
    pub force_rebuild: bool,
    pub cancel: CancelToken,
}

/// Inputs to context building, gathered by the orchestrator.
pub struct ContextInputs<'a> {
    pub command: &'a std::sync::Arc<CommandInfo>,
    pub implementation: &'a Implementation,
    pub runtime: RuntimeKind,
    pub inputs: &'a ResolvedInputs,
    pub user_env: &'a BTreeMap<String, String>,
    pub declared_env: &'a BTreeMap<String, String>,
    pub env_files: &'a [PathBuf],
    pub cli_env: &'a [(String, String)],
    pub inherit_mode: InheritMode,
    pub inherit_overrides: &'a InheritOverrides,
    pub workdir_override: Option<&'a Path>,
    pub interactive: bool,
    pub force_rebuild: bool,
    pub cancel: CancelToken,
}

/// Build the execution context for one command invocation.
pub fn build(cx: ContextInputs<'_>) -> Result<ExecContext, InvowkError> {
    let base_dir = cx.command.model.base_dir().to_path_buf();

    let workdir = match cx.workdir_override {
        Some(path) => path.to_path_buf(),
        None => match &cx.command.command.workdir {
            Some(declared) => {
                let p = Path::new(declared);
                if p.is_absolute() {
                    p.to_path_buf()
                } else {
                    base_dir.join(p)
                }
            }
            None => base_dir.clone(),
        },
    };

    let mut env = inherited_env(
        cx.user_env,
        cx.inherit_mode,
        cx.inherit_overrides,
    );
    env.extend(cx.declared_env.clone());
    for file in cx.env_files {
        for item in dotenvy::from_path_iter(file).map_err(|e| InvowkError::Launch {
            command: cx.command.qualified_name.clone(),
            message: format!("failed to read env file {}: {e}", file.display()),
        })? {
            let (key, value) = item.map_err(|e| InvowkError::Launch {
                command: cx.command.qualified_name.clone(),
                message: format!("malformed env file {}: {e}", file.display()),
            })?;
            env.insert(key, value);
        }
    }
    for (key, value) in cx.cli_env {
        env.insert(key.clone(), value.clone());
    }
    env.extend(project_inputs(cx.inputs));

    let script = cx
        .implementation
        .resolve_script(&base_dir)
        .map_err(|e| InvowkError::Launch {
            command: cx.command.qualified_name.clone(),
            message: e.to_string(),
        })?;

    Ok(ExecContext {
        command: std::sync::Arc::clone(cx.command),
        implementation: cx.implementation.clone(),
        runtime: cx.runtime,
        script,
        workdir,
        env,
        positionals: cx.inputs.positionals.clone(),
        execution_id: 0,
        interactive: cx.interactive,
        force_rebuild: cx.force_rebuild,
        cancel: cx.cancel,
    })
}

/// Apply the inherit policy to the captured user environment.
/// Deny beats allow beats mode.
pub fn inherited_env(
    user_env: &BTreeMap<String, String>,
    mode: InheritMode,
    overrides: &InheritOverrides,
) -> BTreeMap<String, String> {
    let mode = overrides.mode.unwrap_or(mode);
    user_env
        .iter()
        .filter(|(key, _)| {
            if overrides.deny.iter().any(|d| d == *key) {
                return false;
            }
            if overrides.allow.iter().any(|a| a == *key) {
                return true;
            }
            match mode {
                InheritMode::All => true,
                InheritMode::None => false,
                InheritMode::System => {
                    SYSTEM_BASELINE.contains(&key.as_str()) || key.starts_with("LC_")
                }
            }
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Project validated inputs into the well-known variables.
///
/// Pure: the same declarations and inputs always produce the same map.
pub fn project_inputs(inputs: &ResolvedInputs) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    for (idx, value) in inputs.positionals.iter().enumerate() {
        env.insert(format!("ARG{}", idx + 1), value.clone());
    }
    env.insert("ARGC".to_string(), inputs.positionals.len().to_string());

    for (name, value) in &inputs.args {
        let key = format!("{ENV_PREFIX}_ARG_{}", env_fragment(name));
        match value {
            ArgValue::Single(Some(v)) => {
                env.insert(key, v.clone());
            }
            ArgValue::Single(None) => {}
            ArgValue::Variadic(values) => {
                env.insert(format!("{key}_COUNT"), values.len().to_string());
                for (idx, v) in values.iter().enumerate() {
                    env.insert(format!("{key}_{}", idx + 1), v.clone());
                }
                env.insert(key, values.join(" "));
            }
        }
    }

    for (name, value) in &inputs.flags {
        env.insert(
            format!("{ENV_PREFIX}_FLAG_{}", env_fragment(name)),
            value.clone(),
        );
    }

    env
}

/// Uppercase a declared name for env projection, mapping hyphens to
/// underscores.
fn env_fragment(name: &str) -> String {
    name.replace('-', "_").to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs_with(
        positionals: &[&str],
        args: Vec<(String, ArgValue)>,
        flags: &[(&str, &str)],
    ) -> ResolvedInputs {
        ResolvedInputs {
            positionals: positionals.iter().map(|s| s.to_string()).collect(),
            args,
            flags: flags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn flag_projection_uppercases_and_prefixes() {
        let inputs = inputs_with(&[], vec![], &[("target", "prod"), ("log-level", "debug")]);
        let env = project_inputs(&inputs);
        assert_eq!(env.get("INVOWK_FLAG_TARGET").unwrap(), "prod");
        assert_eq!(env.get("INVOWK_FLAG_LOG_LEVEL").unwrap(), "debug");
        assert_eq!(env.get("ARGC").unwrap(), "0");
    }

    #[test]
    fn variadic_projection_expands_count_and_items() {
        let inputs = inputs_with(
            &["alpha", "one", "two", "three"],
            vec![
                (
                    "name".to_string(),
                    ArgValue::Single(Some("alpha".to_string())),
                ),
                (
                    "rest".to_string(),
                    ArgValue::Variadic(vec![
                        "one".to_string(),
                        "two".to_string(),
                        "three".to_string(),
                    ]),
                ),
            ],
            &[],
        );
        let env = project_inputs(&inputs);
        assert_eq!(env.get("INVOWK_ARG_NAME").unwrap(), "alpha");
        assert_eq!(env.get("INVOWK_ARG_REST_COUNT").unwrap(), "3");
        assert_eq!(env.get("INVOWK_ARG_REST_1").unwrap(), "one");
        assert_eq!(env.get("INVOWK_ARG_REST_2").unwrap(), "two");
        assert_eq!(env.get("INVOWK_ARG_REST_3").unwrap(), "three");
        assert_eq!(env.get("INVOWK_ARG_REST").unwrap(), "one two three");
        assert_eq!(env.get("ARGC").unwrap(), "4");
        assert_eq!(env.get("ARG1").unwrap(), "alpha");
        assert_eq!(env.get("ARG4").unwrap(), "three");
    }

    #[test]
    fn projection_is_pure() {
        let inputs = inputs_with(&["x"], vec![], &[("a", "1")]);
        assert_eq!(project_inputs(&inputs), project_inputs(&inputs));
    }

    fn user_env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn inherit_mode_none_drops_everything() {
        let env = user_env(&[("PATH", "/bin"), ("SECRET", "x")]);
        let out = inherited_env(&env, InheritMode::None, &InheritOverrides::default());
        assert!(out.is_empty());
    }

    #[test]
    fn inherit_mode_system_keeps_baseline() {
        let env = user_env(&[("PATH", "/bin"), ("LC_ALL", "C"), ("SECRET", "x")]);
        let out = inherited_env(&env, InheritMode::System, &InheritOverrides::default());
        assert!(out.contains_key("PATH"));
        assert!(out.contains_key("LC_ALL"));
        assert!(!out.contains_key("SECRET"));
    }

    #[test]
    fn deny_beats_allow_beats_mode() {
        let env = user_env(&[("A", "1"), ("B", "2")]);
        let overrides = InheritOverrides {
            mode: None,
            allow: vec!["A".to_string(), "B".to_string()],
            deny: vec!["B".to_string()],
        };
        let out = inherited_env(&env, InheritMode::None, &overrides);
        assert!(out.contains_key("A"));
        assert!(!out.contains_key("B"));
    }

    #[test]
    fn unset_optional_arg_projects_nothing() {
        let inputs = inputs_with(
            &[],
            vec![("target".to_string(), ArgValue::Single(None))],
            &[],
        );
        let env = project_inputs(&inputs);
        assert!(!env.contains_key("INVOWK_ARG_TARGET"));
    }
}
