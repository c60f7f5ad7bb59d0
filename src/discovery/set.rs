//! The merged command namespace produced by discovery.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::diag::Diagnostic;
use crate::error::InvowkError;
use crate::invowkfile::{CommandSpec, Invowkfile};

/// A discovered command.
#[derive(Debug, Clone)]
pub struct CommandInfo {
    /// Dotted path inside the declaring file.
    pub qualified_name: String,
    /// Identifier of the declaration root that supplied this command.
    pub source: String,
    /// Absolute path of the declaring invowkfile.
    pub file: PathBuf,
    pub command: Arc<CommandSpec>,
    pub model: Arc<Invowkfile>,
    /// Collision-free simple name, set on validated sets when the first
    /// path segment is unambiguous across sources.
    pub simple_name: Option<String>,
}

impl CommandInfo {
    /// `@source/qualified` form used in diagnostics and dedup keys.
    pub fn full_id(&self) -> String {
        format!("@{}/{}", self.source, self.qualified_name)
    }

    /// First segment of the dotted path.
    pub fn root_segment(&self) -> &str {
        self.qualified_name
            .split('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

/// Mapping from source identifier to its ordered commands, plus the set of
/// simple names that are ambiguous across sources.
#[derive(Debug, Default, Clone)]
pub struct CommandSet {
    sources: IndexMap<String, Vec<Arc<CommandInfo>>>,
    ambiguous: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the commands of one parsed file under `source`. The
    /// `(source, qualified-name)` pair must be unique; a duplicate from a
    /// later file of the same source is dropped with a diagnostic.
    pub fn add_file(&mut self, source: &str, model: Arc<Invowkfile>) {
        let entries = self.sources.entry(source.to_string()).or_default();
        for (qualified, command) in model.walk() {
            if entries.iter().any(|e| e.qualified_name == qualified) {
                self.diagnostics.push(
                    Diagnostic::warning(
                        "invokefile_parse_failed",
                        format!("duplicate command '{qualified}' in source '{source}'; first declaration wins"),
                    )
                    .with_path(&model.path),
                );
                continue;
            }
            entries.push(Arc::new(CommandInfo {
                qualified_name: qualified,
                source: source.to_string(),
                file: model.path.clone(),
                command: Arc::new(command.clone()),
                model: Arc::clone(&model),
                simple_name: None,
            }));
        }
    }

    /// Compute cross-source ambiguity and collision-free simple names.
    /// Called once after all sources are added.
    pub fn finalize(&mut self) {
        let mut owners: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (source, entries) in &self.sources {
            for info in entries {
                owners
                    .entry(info.root_segment().to_string())
                    .or_default()
                    .insert(source.clone());
            }
        }
        self.ambiguous = owners
            .iter()
            .filter(|(_, sources)| sources.len() > 1)
            .map(|(name, _)| name.clone())
            .collect();

        for entries in self.sources.values_mut() {
            for info in entries.iter_mut() {
                let root = info.root_segment().to_string();
                if !self.ambiguous.contains(&root) {
                    Arc::make_mut(info).simple_name = Some(info.qualified_name.clone());
                }
            }
        }
    }

    /// Source identifiers in priority order.
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|s| s.as_str())
    }

    /// Commands of one source, in declaration order.
    pub fn commands_of(&self, source: &str) -> Option<&[Arc<CommandInfo>]> {
        self.sources.get(source).map(|v| v.as_slice())
    }

    /// All commands, source-priority order then declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CommandInfo>> {
        self.sources.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.values().all(|v| v.is_empty())
    }

    /// Simple names that occur in more than one source.
    pub fn ambiguous_names(&self) -> &BTreeSet<String> {
        &self.ambiguous
    }

    /// Sources declaring a command whose root segment is `name`.
    pub fn sources_declaring(&self, name: &str) -> Vec<String> {
        self.sources
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.root_segment() == name))
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// Look up a dotted path inside one source.
    pub fn find_in_source(&self, source: &str, dotted: &str) -> Option<&Arc<CommandInfo>> {
        self.sources
            .get(source)?
            .iter()
            .find(|info| info.qualified_name == dotted)
    }

    /// Resolve a dotted path without a source filter.
    ///
    /// Ambiguity of the root segment across sources fails lookup; otherwise
    /// the first source in priority order that declares the path wins.
    pub fn resolve(&self, dotted: &str) -> Result<Arc<CommandInfo>, InvowkError> {
        let root = dotted.split('.').next().unwrap_or(dotted);
        if self.ambiguous.contains(root) {
            return Err(InvowkError::AmbiguousCommand {
                name: root.to_string(),
                sources: self.sources_declaring(root),
            });
        }
        for entries in self.sources.values() {
            if let Some(info) = entries.iter().find(|e| e.qualified_name == dotted) {
                return Ok(Arc::clone(info));
            }
        }
        Err(InvowkError::CommandNotFound {
            name: dotted.to_string(),
        })
    }
}
