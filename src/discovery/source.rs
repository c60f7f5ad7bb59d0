//! Declaration-root enumeration.
//!
//! Four source families, in priority order: the current-directory
//! invowkfile, sibling module directories (`*.invowk/`), configured include
//! paths, and the per-user commands directory. The first source in priority
//! order that supplies a simple name wins bare-name lookups when no
//! cross-source ambiguity exists.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::UserConfig;
use crate::invowkfile::INVOWKFILE_NAME;

/// Directory-name suffix marking a sibling module.
pub const MODULE_SUFFIX: &str = ".invowk";

/// Source identifier of the current-directory invowkfile.
pub const CWD_SOURCE_ID: &str = "invowkfile";

/// A declaration root: a stable source id plus the files it contributes.
#[derive(Debug, Clone)]
pub struct SourceRoot {
    pub id: String,
    pub files: Vec<PathBuf>,
}

/// Canonicalize a user-supplied source reference: strip a leading `@` and
/// a module-directory suffix.
pub fn canonical_source_id(raw: &str) -> String {
    let stripped = raw.strip_prefix('@').unwrap_or(raw);
    stripped
        .strip_suffix(MODULE_SUFFIX)
        .unwrap_or(stripped)
        .to_string()
}

/// Enumerate declaration roots for `cwd` under `config`, in priority order.
pub fn enumerate_roots(cwd: &Path, config: &UserConfig) -> Vec<SourceRoot> {
    let mut roots = Vec::new();

    // 1. Current-directory invowkfile. Missing is not an error.
    let cwd_file = cwd.join(INVOWKFILE_NAME);
    if cwd_file.is_file() {
        roots.push(SourceRoot {
            id: CWD_SOURCE_ID.to_string(),
            files: vec![cwd_file],
        });
    }

    // 2. Sibling module directories, sorted by name for determinism.
    if let Some(parent) = cwd.parent() {
        let mut modules: Vec<(String, PathBuf)> = Vec::new();
        if let Ok(entries) = std::fs::read_dir(parent) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() || path == cwd {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(module_id) = name.strip_suffix(MODULE_SUFFIX) else {
                    continue;
                };
                if module_id.is_empty() {
                    continue;
                }
                let file = path.join(INVOWKFILE_NAME);
                if file.is_file() {
                    modules.push((module_id.to_string(), file));
                }
            }
        }
        modules.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, file) in modules {
            roots.push(SourceRoot {
                id,
                files: vec![file],
            });
        }
    }

    // 3. Configured include paths: each a directory holding an invowkfile
    //    (or a direct file path).
    for include in &config.includes {
        let (id, file) = if include.is_dir() {
            let name = include
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("include");
            (canonical_source_id(name), include.join(INVOWKFILE_NAME))
        } else {
            let name = include
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("include");
            (canonical_source_id(name), include.clone())
        };
        if file.is_file() {
            roots.push(SourceRoot {
                id,
                files: vec![file],
            });
        } else {
            debug!(path = %file.display(), "Include path has no invowkfile; skipping");
        }
    }

    // 4. Per-user commands directory, non-recursive, one logical source.
    if let Some(dir) = config.user_commands_dir() {
        if dir.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
                .into_iter()
                .flatten()
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file() && path.extension().is_some_and(|ext| ext == "toml")
                })
                .collect();
            files.sort();
            if !files.is_empty() {
                roots.push(SourceRoot {
                    id: config.user_source_id.clone(),
                    files,
                });
            }
        }
    }

    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_source_references() {
        assert_eq!(canonical_source_id("@tools"), "tools");
        assert_eq!(canonical_source_id("tools.invowk"), "tools");
        assert_eq!(canonical_source_id("@tools.invowk"), "tools");
        assert_eq!(canonical_source_id("invowkfile"), "invowkfile");
    }

    #[test]
    fn enumerates_cwd_and_sibling_modules() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(project.join(INVOWKFILE_NAME), "").unwrap();

        let module = tmp.path().join("tools.invowk");
        std::fs::create_dir(&module).unwrap();
        std::fs::write(module.join(INVOWKFILE_NAME), "").unwrap();

        // A sibling without the suffix is not a module.
        std::fs::create_dir(tmp.path().join("misc")).unwrap();

        let config = UserConfig {
            user_commands_dir: Some(tmp.path().join("no-such-dir")),
            ..Default::default()
        };
        let roots = enumerate_roots(&project, &config);
        let ids: Vec<&str> = roots.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![CWD_SOURCE_ID, "tools"]);
    }

    #[test]
    fn missing_cwd_file_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = UserConfig {
            user_commands_dir: Some(tmp.path().join("no-such-dir")),
            ..Default::default()
        };
        let roots = enumerate_roots(tmp.path(), &config);
        assert!(roots.iter().all(|r| r.id != CWD_SOURCE_ID));
    }

    #[test]
    fn include_paths_follow_modules() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(project.join(INVOWKFILE_NAME), "").unwrap();

        let include = tmp.path().join("shared");
        std::fs::create_dir(&include).unwrap();
        std::fs::write(include.join(INVOWKFILE_NAME), "").unwrap();

        let config = UserConfig {
            includes: vec![include],
            user_commands_dir: Some(tmp.path().join("no-such-dir")),
            ..Default::default()
        };
        let roots = enumerate_roots(&project, &config);
        let ids: Vec<&str> = roots.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![CWD_SOURCE_ID, "shared"]);
    }

    #[test]
    fn user_dir_contributes_single_source() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir(&project).unwrap();

        let user_dir = tmp.path().join("commands");
        std::fs::create_dir(&user_dir).unwrap();
        std::fs::write(user_dir.join("a.toml"), "").unwrap();
        std::fs::write(user_dir.join("b.toml"), "").unwrap();
        std::fs::write(user_dir.join("notes.txt"), "").unwrap();

        let config = UserConfig {
            user_commands_dir: Some(user_dir),
            ..Default::default()
        };
        let roots = enumerate_roots(&project, &config);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, "user");
        assert_eq!(roots[0].files.len(), 2);
    }
}
