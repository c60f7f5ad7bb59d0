//! Structural validation of a discovered command set.
//!
//! Two checks run on top of per-file validation: the args-vs-subcommand
//! conflict, and acyclicity of the execute-dependency graph. Failures are
//! attached to the set as error diagnostics and returned as the overall
//! validation error.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use super::set::{CommandInfo, CommandSet};
use crate::diag::Diagnostic;
use crate::error::InvowkError;
use crate::invowkfile::DependencySet;

/// Run structural validation, appending diagnostics to the set.
pub fn validate_set(set: &mut CommandSet) -> Result<(), InvowkError> {
    let mut first_error = None;
    let mut diagnostics = Vec::new();

    // Args-vs-subcommand conflict: a command with nested children must not
    // declare positional arguments.
    for info in set.iter() {
        if info.command.has_subcommands() && !info.command.args.is_empty() {
            let err = InvowkError::ArgsSubcommandConflict {
                command: info.full_id(),
            };
            diagnostics.push(
                Diagnostic::error("args_subcommand_conflict", err.to_string())
                    .with_path(&info.file),
            );
            first_error.get_or_insert(err);
        }
    }

    // Execute-dep DAG acyclicity over the first-resolvable-alternative graph.
    match check_execute_dep_dag(set, &mut diagnostics) {
        Ok(()) => {}
        Err(err) => {
            first_error.get_or_insert(err);
        }
    }

    set.diagnostics.extend(diagnostics);
    match first_error {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// Effective dependency set of a command for static analysis: root-file
/// level, command level, and every implementation level concatenated.
fn static_deps(info: &CommandInfo) -> DependencySet {
    let mut levels: Vec<Option<&DependencySet>> = vec![
        info.model.deps.as_ref(),
        info.command.deps.as_ref(),
    ];
    for imp in &info.command.implementations {
        levels.push(imp.deps.as_ref());
    }
    DependencySet::merged(&levels)
}

fn check_execute_dep_dag(
    set: &CommandSet,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), InvowkError> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();

    for info in set.iter() {
        let idx = graph.add_node(info.full_id());
        nodes.insert(info.full_id(), idx);
    }

    let mut unresolved = None;
    for info in set.iter() {
        let deps = static_deps(info);
        for dep in deps.commands.iter().filter(|d| d.execute) {
            // Static analysis follows the first alternative that resolves;
            // an execute-dep none of whose alternatives resolve is an error.
            let target = dep.alternatives.iter().find_map(|name| {
                set.find_in_source(&info.source, name)
                    .map(Arc::clone)
                    .or_else(|| set.resolve(name).ok())
            });
            match target {
                Some(target) => {
                    let from = nodes[&info.full_id()];
                    let to = nodes[&target.full_id()];
                    graph.add_edge(from, to, ());
                }
                None => {
                    let err = InvowkError::CommandNotFound {
                        name: dep.alternatives.first().cloned().unwrap_or_default(),
                    };
                    diagnostics.push(
                        Diagnostic::error(
                            "command_not_found",
                            format!(
                                "execute-dependency of '{}' resolves to no known command (alternatives: [{}])",
                                info.full_id(),
                                dep.alternatives.join(", ")
                            ),
                        )
                        .with_path(&info.file),
                    );
                    unresolved.get_or_insert(err);
                }
            }
        }
    }

    if let Some(err) = unresolved {
        return Err(err);
    }

    if toposort(&graph, None).is_ok() {
        return Ok(());
    }

    // Name the cycle for the diagnostic: any strongly connected component
    // with more than one node, or a self-loop.
    let cycle: Vec<String> = tarjan_scc(&graph)
        .into_iter()
        .find(|scc| {
            scc.len() > 1
                || scc
                    .first()
                    .is_some_and(|&n| graph.find_edge(n, n).is_some())
        })
        .map(|scc| scc.into_iter().map(|n| graph[n].clone()).collect())
        .unwrap_or_default();

    let err = InvowkError::ExecuteDepCycle { cycle };
    diagnostics.push(Diagnostic::error("execute_dep_cycle", err.to_string()));
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invowkfile::Invowkfile;
    use std::path::Path;

    fn set_from(toml_src: &str) -> CommandSet {
        let mut model: Invowkfile = toml::from_str(toml_src).unwrap();
        model.path = Path::new("/work/invowk.toml").to_path_buf();
        let mut set = CommandSet::new();
        set.add_file("invowkfile", Arc::new(model));
        set.finalize();
        set
    }

    #[test]
    fn args_with_subcommands_is_a_hard_error() {
        let mut set = set_from(
            r#"
            [[cmd]]
            name = "ops"
              [[cmd.args]]
              name = "env"
              [[cmd.subcmd]]
              name = "deploy"
                [[cmd.subcmd.impl]]
                runtimes = ["native"]
                script = "true"
            "#,
        );
        let err = validate_set(&mut set).unwrap_err();
        assert_eq!(err.code(), "args_subcommand_conflict");
        assert!(set
            .diagnostics
            .iter()
            .any(|d| d.code == "args_subcommand_conflict"));
    }

    #[test]
    fn execute_dep_cycle_is_detected() {
        let mut set = set_from(
            r#"
            [[cmd]]
            name = "a"
            [[cmd.deps.commands]]
            alternatives = ["b"]
            execute = true
            [[cmd.impl]]
            runtimes = ["native"]
            script = "true"

            [[cmd]]
            name = "b"
            [[cmd.deps.commands]]
            alternatives = ["a"]
            execute = true
            [[cmd.impl]]
            runtimes = ["native"]
            script = "true"
            "#,
        );
        let err = validate_set(&mut set).unwrap_err();
        assert_eq!(err.code(), "execute_dep_cycle");
        match err {
            InvowkError::ExecuteDepCycle { cycle } => {
                assert_eq!(cycle.len(), 2);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn acyclic_chain_passes() {
        let mut set = set_from(
            r#"
            [[cmd]]
            name = "a"
            [[cmd.deps.commands]]
            alternatives = ["b"]
            execute = true
            [[cmd.impl]]
            runtimes = ["native"]
            script = "true"

            [[cmd]]
            name = "b"
            [[cmd.impl]]
            runtimes = ["native"]
            script = "true"
            "#,
        );
        assert!(validate_set(&mut set).is_ok());
        assert!(set.diagnostics.is_empty());
    }

    #[test]
    fn non_execute_command_deps_do_not_form_edges() {
        // Validation-only command deps may be mutual without forming a cycle.
        let mut set = set_from(
            r#"
            [[cmd]]
            name = "a"
            [[cmd.deps.commands]]
            alternatives = ["b"]
            [[cmd.impl]]
            runtimes = ["native"]
            script = "true"

            [[cmd]]
            name = "b"
            [[cmd.deps.commands]]
            alternatives = ["a"]
            [[cmd.impl]]
            runtimes = ["native"]
            script = "true"
            "#,
        );
        assert!(validate_set(&mut set).is_ok());
    }

    #[test]
    fn unresolvable_execute_dep_is_an_error() {
        let mut set = set_from(
            r#"
            [[cmd]]
            name = "a"
            [[cmd.deps.commands]]
            alternatives = ["ghost"]
            execute = true
            [[cmd.impl]]
            runtimes = ["native"]
            script = "true"
            "#,
        );
        let err = validate_set(&mut set).unwrap_err();
        assert_eq!(err.code(), "command_not_found");
    }
}
