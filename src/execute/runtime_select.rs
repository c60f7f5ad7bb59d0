//! Runtime resolution under the 3-tier precedence policy.
//!
//! 1. A runtime named by the request is a hard override; if the command
//!    does not permit it on this platform the resolution fails.
//! 2. Otherwise the configured default runtime applies when permitted.
//! 3. Otherwise the first runtime declared by the first compatible
//!    implementation wins.

use crate::config::UserConfig;
use crate::discovery::CommandInfo;
use crate::error::InvowkError;
use crate::invowkfile::{Implementation, Platform, RuntimeKind};

/// The selected runtime plus its implementation.
pub struct Resolution<'a> {
    pub runtime: RuntimeKind,
    pub implementation: &'a Implementation,
}

pub fn resolve<'a>(
    info: &'a CommandInfo,
    requested: Option<RuntimeKind>,
    config: &UserConfig,
    platform: Platform,
) -> Result<Resolution<'a>, InvowkError> {
    let command = &info.command;

    if !command.supports_platform(platform) {
        return Err(InvowkError::PlatformNotSupported {
            command: info.qualified_name.clone(),
            platform: platform.to_string(),
            runtime: None,
        });
    }

    let allowed = command.allowed_runtimes(platform);
    if allowed.is_empty() {
        return Err(InvowkError::PlatformNotSupported {
            command: info.qualified_name.clone(),
            platform: platform.to_string(),
            runtime: None,
        });
    }

    let runtime = match requested {
        Some(runtime) => {
            if !allowed.contains(&runtime) {
                return Err(InvowkError::RuntimeNotAllowed {
                    command: info.qualified_name.clone(),
                    requested: runtime,
                    allowed,
                });
            }
            runtime
        }
        None => match config.default_runtime {
            Some(default) if allowed.contains(&default) => default,
            _ => allowed[0],
        },
    };

    let implementation = command.implementation(platform, runtime).ok_or_else(|| {
        InvowkError::PlatformNotSupported {
            command: info.qualified_name.clone(),
            platform: platform.to_string(),
            runtime: Some(runtime),
        }
    })?;

    Ok(Resolution {
        runtime,
        implementation,
    })
}
