//! Execution backends.
//!
//! Backends are a closed variant: native host shell, in-process POSIX
//! shell, container engine. Interactive support is a capability probed on
//! the selected instance; callers fall back to plain execution when it is
//! absent. The registry caches instances per kind and assigns monotonic
//! execution ids.

pub mod container;
pub mod native;
pub mod virt;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::UserConfig;
use crate::error::InvowkError;
use crate::execute::context::ExecContext;
use crate::invowkfile::RuntimeKind;

/// An execution backend.
pub trait Runtime: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    /// Run the context's script to completion, returning the child's exit
    /// code. Cancellation and timeout arrive via the context token.
    fn execute(&self, cx: &ExecContext) -> Result<i32, InvowkError>;

    /// Whether this instance can run an interactive session.
    fn supports_interactive(&self) -> bool {
        false
    }

    /// Engine binary backing a container instance, when applicable.
    fn container_engine(&self) -> Option<String> {
        None
    }

    /// Interactive execution; only called when `supports_interactive`.
    fn execute_interactive(&self, cx: &ExecContext) -> Result<i32, InvowkError> {
        self.execute(cx)
    }
}

/// Factory and cache for backend instances.
pub struct RuntimeRegistry {
    config: Arc<UserConfig>,
    instances: Mutex<HashMap<RuntimeKind, Arc<dyn Runtime>>>,
    next_execution_id: AtomicU64,
}

impl RuntimeRegistry {
    pub fn new(config: Arc<UserConfig>) -> Self {
        Self {
            config,
            instances: Mutex::new(HashMap::new()),
            next_execution_id: AtomicU64::new(1),
        }
    }

    /// Backend instance for `kind`, constructed once per registry.
    pub fn get(&self, kind: RuntimeKind) -> Result<Arc<dyn Runtime>, InvowkError> {
        let mut instances = self.instances.lock().expect("registry lock");
        if let Some(instance) = instances.get(&kind) {
            return Ok(Arc::clone(instance));
        }
        let instance: Arc<dyn Runtime> = match kind {
            RuntimeKind::Native => Arc::new(native::NativeRuntime::new()),
            RuntimeKind::Virtual => Arc::new(virt::VirtualRuntime::new()),
            RuntimeKind::Container => {
                Arc::new(container::ContainerRuntime::detect(&self.config)?)
            }
        };
        instances.insert(kind, Arc::clone(&instance));
        Ok(instance)
    }

    /// Monotonic execution id, unique within this invocation.
    pub fn next_execution_id(&self) -> u64 {
        self.next_execution_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_ids_are_monotonic() {
        let registry = RuntimeRegistry::new(Arc::new(UserConfig::default()));
        let a = registry.next_execution_id();
        let b = registry.next_execution_id();
        let c = registry.next_execution_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn instances_are_cached_per_kind() {
        let registry = RuntimeRegistry::new(Arc::new(UserConfig::default()));
        let first = registry.get(RuntimeKind::Native).unwrap();
        let second = registry.get(RuntimeKind::Native).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
