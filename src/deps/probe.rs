//! Runtime-aware probe strategies.
//!
//! A dependency check runs either on the host or inside the container the
//! selected implementation targets. The strategy is chosen once per
//! validation pass from the resolved runtime.

use std::process::Command;

use tracing::debug;

use crate::error::InvowkError;
use crate::execute::cancel::CancelToken;
use crate::proc::{self, CapturedOutput};

/// Engine exit code for engine-side failures (image pull, daemon down).
const ENGINE_ERROR_CODE: i32 = 125;

/// Where probe scripts execute.
#[derive(Debug, Clone)]
pub enum ProbeEnv {
    Host,
    Container { engine: String, image: String },
}

impl ProbeEnv {
    pub fn is_container(&self) -> bool {
        matches!(self, ProbeEnv::Container { .. })
    }

    /// Run a POSIX sh script in this environment and capture its outcome.
    ///
    /// Transient engine failures (exit 125) surface as retryable
    /// infrastructure errors, never as dependency failures.
    pub fn run_script(
        &self,
        script: &str,
        cancel: &CancelToken,
    ) -> Result<CapturedOutput, InvowkError> {
        let cmd = match self {
            ProbeEnv::Host => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(script);
                cmd
            }
            ProbeEnv::Container { engine, image } => {
                let mut cmd = Command::new(engine);
                cmd.args(["run", "--rm", image.as_str(), "sh", "-c", script]);
                cmd
            }
        };
        debug!(env = ?self, script, "Running dependency probe");
        let out = proc::run_captured(cmd, cancel)?;
        if self.is_container() && out.code == ENGINE_ERROR_CODE {
            return Err(InvowkError::EngineTransient {
                code: ENGINE_ERROR_CODE,
            });
        }
        Ok(out)
    }
}
