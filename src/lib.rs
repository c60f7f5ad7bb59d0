//! invowk - declarative command runner.
//!
//! Users declare commands in typed invowkfiles; the tool discovers them
//! from layered sources (project file, sibling modules, includes, user
//! directory), resolves one by name, validates its dependencies and runs
//! its script under the selected backend: the host shell, an in-process
//! POSIX shell, or a container engine.

pub mod cli;
pub mod config;
pub mod deps;
pub mod diag;
pub mod discovery;
pub mod error;
pub mod execute;
pub mod invowkfile;
pub mod output;
pub mod proc;
pub mod runtime;
pub mod ssh;
pub mod watch;

pub use cli::{Cli, Commands};
pub use error::InvowkError;
pub use execute::{CancelToken, CommandService, ExecuteRequest};
