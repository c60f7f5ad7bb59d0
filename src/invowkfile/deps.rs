//! Dependency declarations.
//!
//! A dependency set has six orthogonal slots. Within a slot, each entry is
//! AND-ed; within an entry, the `alternatives` list is OR-ed in declaration
//! order. Root-file, command and implementation sets merge by concatenation,
//! root first, preserving order inside each level.

use serde::{Deserialize, Serialize};

/// Requested access bits for a filepath dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAccess {
    Read,
    Write,
    Exec,
}

/// A tool that must be resolvable (host PATH or in-container).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDep {
    pub alternatives: Vec<String>,
}

/// A sibling command that must exist; with `execute`, it must also run
/// successfully before the owning command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDep {
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub execute: bool,
}

/// A filesystem path that must exist with the requested access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDep {
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub access: Vec<FileAccess>,
}

/// A built-in host capability (internet, lan, containers, tty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDep {
    pub alternatives: Vec<String>,
}

/// One alternative of a custom probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAlternative {
    pub script: String,
    #[serde(default)]
    pub expect_code: i32,
    #[serde(default)]
    pub stdout_regex: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A user-provided probe script dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDep {
    pub alternatives: Vec<CheckAlternative>,
}

/// An environment variable that must be present in the captured user env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVarDep {
    pub alternatives: Vec<String>,
}

/// The six dependency slots of one declaration level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencySet {
    #[serde(default)]
    pub tools: Vec<ToolDep>,
    #[serde(default)]
    pub commands: Vec<CommandDep>,
    #[serde(default)]
    pub files: Vec<FileDep>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDep>,
    #[serde(default)]
    pub checks: Vec<CheckDep>,
    #[serde(default)]
    pub env: Vec<EnvVarDep>,
}

impl DependencySet {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
            && self.commands.is_empty()
            && self.files.is_empty()
            && self.capabilities.is_empty()
            && self.checks.is_empty()
            && self.env.is_empty()
    }

    /// Concatenate `other` onto `self`, preserving declaration order.
    fn extend_from(&mut self, other: &DependencySet) {
        self.tools.extend(other.tools.iter().cloned());
        self.commands.extend(other.commands.iter().cloned());
        self.files.extend(other.files.iter().cloned());
        self.capabilities.extend(other.capabilities.iter().cloned());
        self.checks.extend(other.checks.iter().cloned());
        self.env.extend(other.env.iter().cloned());
    }

    /// Merge declaration levels into one effective set. Order is
    /// root-file, then command, then implementation.
    pub fn merged(levels: &[Option<&DependencySet>]) -> DependencySet {
        let mut out = DependencySet::default();
        for level in levels.iter().flatten() {
            out.extend_from(level);
        }
        out
    }

    /// Every entry must carry at least one alternative.
    pub fn validate(&self) -> Result<(), String> {
        let empties = self.tools.iter().any(|d| d.alternatives.is_empty())
            || self.commands.iter().any(|d| d.alternatives.is_empty())
            || self.files.iter().any(|d| d.alternatives.is_empty())
            || self.capabilities.iter().any(|d| d.alternatives.is_empty())
            || self.checks.iter().any(|d| d.alternatives.is_empty())
            || self.env.iter().any(|d| d.alternatives.is_empty());
        if empties {
            return Err("dependency with empty alternatives list".to_string());
        }
        Ok(())
    }
}
