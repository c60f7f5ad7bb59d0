//! Implementations: the concrete script + runtime-config pair for a
//! (platform, runtime) tuple within a command.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::invowkfile::DependencySet;

/// Target platform of an implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> Platform {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
        };
        write!(f, "{s}")
    }
}

/// Execution backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Host shell (`$SHELL`, falling back to `sh`).
    Native,
    /// In-process POSIX shell interpreter.
    Virtual,
    /// Container engine (podman/docker).
    Container,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeKind::Native => "native",
            RuntimeKind::Virtual => "virtual",
            RuntimeKind::Container => "container",
        };
        write!(f, "{s}")
    }
}

/// Container runtime configuration of an implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub image: String,
    /// Engine override (`podman`/`docker`); defaults to autodetection.
    #[serde(default)]
    pub engine: Option<String>,
    /// Expose the host SSH bridge to the containerized script.
    #[serde(default)]
    pub host_ssh: bool,
}

/// One implementation of a command, keyed by (platform, runtime).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Platforms this implementation supports. Empty means all.
    #[serde(default)]
    pub platforms: Vec<Platform>,
    /// Runtimes this implementation supports, in preference order.
    pub runtimes: Vec<RuntimeKind>,
    /// Inline script body. Exactly one of `script`/`script_file` is set.
    #[serde(default)]
    pub script: Option<String>,
    /// Script file path, relative to the declaring invowkfile.
    #[serde(default)]
    pub script_file: Option<String>,
    #[serde(default)]
    pub container: Option<ContainerConfig>,
    /// Dependency set local to this implementation.
    #[serde(default)]
    pub deps: Option<DependencySet>,
}

impl Implementation {
    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&platform)
    }

    pub fn supports(&self, platform: Platform, runtime: RuntimeKind) -> bool {
        self.supports_platform(platform) && self.runtimes.contains(&runtime)
    }

    /// Resolve the script body, reading `script_file` relative to the
    /// declaring invowkfile's directory when no inline script is given.
    pub fn resolve_script(&self, base_dir: &Path) -> Result<String> {
        if let Some(script) = &self.script {
            return Ok(script.clone());
        }
        if let Some(file) = &self.script_file {
            let path = base_dir.join(file);
            return std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read script file {}", path.display()));
        }
        anyhow::bail!("implementation declares neither script nor script_file")
    }

    /// Structural validity: script XOR script_file, at least one runtime,
    /// container config present iff the container runtime is declared.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.script, &self.script_file) {
            (None, None) => return Err("neither script nor script_file set".to_string()),
            (Some(_), Some(_)) => {
                return Err("script and script_file are mutually exclusive".to_string());
            }
            _ => {}
        }
        if self.runtimes.is_empty() {
            return Err("implementation declares no runtimes".to_string());
        }
        if self.runtimes.contains(&RuntimeKind::Container) && self.container.is_none() {
            return Err("container runtime requires a [container] block with an image".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native_impl(script: &str) -> Implementation {
        Implementation {
            platforms: vec![],
            runtimes: vec![RuntimeKind::Native],
            script: Some(script.to_string()),
            script_file: None,
            container: None,
            deps: None,
        }
    }

    #[test]
    fn empty_platforms_means_all() {
        let imp = native_impl("true");
        assert!(imp.supports(Platform::Linux, RuntimeKind::Native));
        assert!(imp.supports(Platform::Macos, RuntimeKind::Native));
        assert!(!imp.supports(Platform::Linux, RuntimeKind::Container));
    }

    #[test]
    fn script_xor_script_file() {
        let mut imp = native_impl("true");
        assert!(imp.validate().is_ok());

        imp.script_file = Some("run.sh".to_string());
        assert!(imp.validate().is_err());

        imp.script = None;
        assert!(imp.validate().is_ok());

        imp.script_file = None;
        assert!(imp.validate().is_err());
    }

    #[test]
    fn container_runtime_requires_image() {
        let mut imp = native_impl("true");
        imp.runtimes = vec![RuntimeKind::Container];
        assert!(imp.validate().is_err());

        imp.container = Some(ContainerConfig {
            image: "alpine:3.20".to_string(),
            engine: None,
            host_ssh: false,
        });
        assert!(imp.validate().is_ok());
    }

    #[test]
    fn resolve_script_prefers_inline() {
        let imp = native_impl("echo hi");
        let script = imp.resolve_script(Path::new("/nonexistent")).unwrap();
        assert_eq!(script, "echo hi");
    }
}
