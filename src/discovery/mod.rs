//! Layered, cache-aware command discovery.
//!
//! Merges all declaration roots into one namespaced [`CommandSet`],
//! detects cross-source ambiguity, validates structure, and resolves
//! dotted command paths. All operations memoize through the
//! request-scoped [`DiscoveryCache`].

pub mod cache;
pub mod filter;
pub mod set;
pub mod source;
pub mod validate;

pub use cache::DiscoveryCache;
pub use filter::{ParsedTarget, SourceFilter, parse_target, resolve_target};
pub use set::{CommandInfo, CommandSet};
pub use source::{CWD_SOURCE_ID, MODULE_SUFFIX, SourceRoot, canonical_source_id};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::UserConfig;
use crate::diag::Diagnostic;
use crate::error::InvowkError;
use crate::invowkfile::Invowkfile;

/// Discovery front-end shared by the whole invocation.
#[derive(Clone)]
pub struct DiscoveryService {
    config: Arc<UserConfig>,
    cwd: PathBuf,
    cache: Arc<DiscoveryCache>,
}

impl DiscoveryService {
    pub fn new(config: Arc<UserConfig>, cwd: PathBuf, cache: Arc<DiscoveryCache>) -> Self {
        Self { config, cwd, cache }
    }

    pub fn config(&self) -> &UserConfig {
        &self.config
    }

    /// Enumerate and parse every declaration root into a command set.
    /// Per-file parse failures become error diagnostics on the set and do
    /// not abort discovery of the remaining sources.
    pub fn discover(&self) -> Result<Arc<CommandSet>, InvowkError> {
        if let Some(cached) = self.cache.get_discover() {
            return Ok(cached);
        }
        let set = Arc::new(self.scan()?);
        self.cache.put_discover(Arc::clone(&set));
        Ok(set)
    }

    /// Discover plus structural validation (args-vs-subcommand conflicts,
    /// execute-dep DAG). On success the plain discover cache entry is
    /// seeded too; on failure the diagnostics travel on the returned set.
    pub fn discover_validated(&self) -> Result<Arc<CommandSet>, InvowkError> {
        if let Some(cached) = self.cache.get_validated() {
            return Ok(cached);
        }
        let mut set = self.scan()?;
        match validate::validate_set(&mut set) {
            Ok(()) => {
                let set = Arc::new(set);
                self.cache.put_validated(Arc::clone(&set));
                Ok(set)
            }
            Err(err) => {
                // Render here so the diagnostics are not swallowed by the
                // early error return.
                crate::diag::render_all(&set.diagnostics);
                Err(err)
            }
        }
    }

    /// The validated set, if this request has already produced one.
    /// Lets callers render set-level diagnostics without re-scanning.
    pub fn cached_validated(&self) -> Option<Arc<CommandSet>> {
        self.cache.get_validated()
    }

    /// Resolve one command by name through the validated set.
    ///
    /// `tokens` starts with the command token (longest-match consumes
    /// subcommand segments); returns the command plus consumed count.
    pub fn find(
        &self,
        filter: Option<&SourceFilter>,
        tokens: &[String],
    ) -> Result<(Arc<CommandInfo>, usize), InvowkError> {
        let key = format!(
            "{}::{}",
            filter.map(|f| f.canonical.as_str()).unwrap_or(""),
            tokens.join("\u{1f}")
        );
        if let Some(hit) = self.cache.get_find(&key) {
            return Ok(hit);
        }
        let discovered = self.discover_validated()?;
        let (info, consumed) = resolve_target(&discovered, filter, tokens)?;
        self.cache.put_find(key, Arc::clone(&info), consumed);
        Ok((info, consumed))
    }

    fn scan(&self) -> Result<CommandSet, InvowkError> {
        let mut set = CommandSet::new();
        let roots = source::enumerate_roots(&self.cwd, &self.config);
        debug!(roots = roots.len(), "Enumerated declaration roots");
        for root in roots {
            for file in &root.files {
                match Invowkfile::load(file) {
                    Ok(model) => set.add_file(&root.id, Arc::new(model)),
                    Err(err) => {
                        set.diagnostics.push(
                            Diagnostic::error("invokefile_parse_failed", err.to_string())
                                .with_path(file),
                        );
                    }
                }
            }
        }
        set.finalize();
        Ok(set)
    }
}
