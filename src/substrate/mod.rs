//! Substrate invocation boundary
//!
//! The interpreter never runs operations itself. Every activity becomes an
//! [`InvokeRequest`] handed to a [`Substrate`], which owns delivery, the
//! per-attempt timeout and the retry policy. Delivery is at-least-once: a
//! timed-out attempt may have partially run before it is retried, so every
//! operation behind this boundary must tolerate re-invocation.

pub mod local;
pub mod operations;

use serde_json::Value as JsonValue;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use local::LocalSubstrate;
pub use operations::{InvalidArguments, Operation, OperationRegistry};

/// Boxed, sendable future used at the object-safe trait seams
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default per-attempt timeout for activity invocations
pub const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Retry policy handed to the substrate with every invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(100),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) failed, before the next one
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_coefficient.max(1.0).powi(exponent);
        let delay_nanos = self.initial_interval.as_nanos() as f64 * factor;
        if !delay_nanos.is_finite() || delay_nanos >= self.max_interval.as_nanos() as f64 {
            self.max_interval
        } else {
            Duration::from_nanos(delay_nanos.round() as u64)
        }
    }
}

/// Identity of the run an invocation belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub workflow_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub operation: String,
    pub args: Vec<JsonValue>,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub context: InvocationContext,
}

/// An invocation that exhausted its retry policy, or could not be retried
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("operation '{operation}' failed after {attempts} attempt(s): {kind}")]
pub struct OperationError {
    pub operation: String,
    pub attempts: u32,
    pub kind: OperationErrorKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperationErrorKind {
    #[error("no operation registered under this name")]
    NotRegistered,

    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("{message}")]
    Failed { message: String },

    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },
}

impl OperationErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperationErrorKind::Timeout { .. } | OperationErrorKind::Failed { .. }
        )
    }
}

/// Executes named operations durably on behalf of the interpreter
pub trait Substrate: Send + Sync {
    fn invoke(&self, request: InvokeRequest) -> BoxFuture<'_, Result<JsonValue, OperationError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(DEFAULT_ACTIVITY_TIMEOUT, Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_interval: Duration::from_millis(100),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_millis(500),
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(OperationErrorKind::Failed { message: "boom".into() }.is_retryable());
        assert!(OperationErrorKind::Timeout {
            timeout: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!OperationErrorKind::NotRegistered.is_retryable());
        assert!(!OperationErrorKind::InvalidArguments { message: "x".into() }.is_retryable());
    }
}
