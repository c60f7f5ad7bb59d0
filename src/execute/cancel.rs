//! Cancellation for the execution pipeline.
//!
//! One token threads through every suspension point: discovery I/O,
//! dependency probes, child-process waits, SSH startup. The interrupt flag
//! is shared across the whole chain (Ctrl+C cancels everything); deadlines
//! narrow per frame, so a dep invoked under a timeout inherits the tighter
//! of the two.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::InvowkError;

/// Why a token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Interrupted,
    TimedOut,
}

/// A cancellable deadline-carrying token.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Derive a token sharing the interrupt flag with a (possibly tighter)
    /// deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(candidate)),
            None => Some(candidate),
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline,
        }
    }

    /// Trip the interrupt flag for the whole chain.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reason(&self) -> Option<CancelReason> {
        if self.flag.load(Ordering::SeqCst) {
            return Some(CancelReason::Interrupted);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(CancelReason::TimedOut);
        }
        None
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Remaining time until the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Error for the current cancellation state of `command`.
    pub fn error_for(&self, command: &str, limit: Option<Duration>) -> InvowkError {
        match self.reason() {
            Some(CancelReason::TimedOut) => InvowkError::Timeout {
                command: command.to_string(),
                limit: limit.unwrap_or_default(),
            },
            _ => InvowkError::Cancelled {
                command: command.to_string(),
            },
        }
    }

    /// Check the token between pipeline steps.
    pub fn check(&self, command: &str, limit: Option<Duration>) -> Result<(), InvowkError> {
        if self.is_cancelled() {
            Err(self.error_for(command, limit))
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the process-wide Ctrl+C handler tripping `token`. Safe to call
/// once per process; later calls are ignored.
pub fn install_interrupt_handler(token: &CancelToken) {
    let flag = Arc::clone(&token.flag);
    let _ = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.remaining().is_none());
    }

    #[test]
    fn cancel_propagates_to_derived_tokens() {
        let parent = CancelToken::new();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert_eq!(child.reason(), Some(CancelReason::Interrupted));
    }

    #[test]
    fn deadline_narrows_never_widens() {
        let parent = CancelToken::new().with_timeout(Duration::from_millis(1));
        let child = parent.with_timeout(Duration::from_secs(3600));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(child.reason(), Some(CancelReason::TimedOut));
    }

    #[test]
    fn timeout_maps_to_typed_error() {
        let token = CancelToken::new().with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(1));
        let err = token.error_for("slow", Some(Duration::from_millis(500)));
        assert_eq!(err.code(), "execution_timeout");
        assert_eq!(err.exit_code(), crate::error::EXIT_INFRA_ERROR);
    }

    #[test]
    fn interrupt_wins_over_deadline_in_reporting() {
        let token = CancelToken::new().with_timeout(Duration::from_millis(0));
        token.cancel();
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(token.reason(), Some(CancelReason::Interrupted));
    }
}
