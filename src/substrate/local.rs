//! In-process substrate
//!
//! Runs registered operations on the current tokio runtime while honouring
//! the invocation contract: a timeout per attempt, and retries with
//! exponential backoff until the policy's attempt budget is spent. There is
//! no persistence here; a process crash loses in-flight work.

use anyhow::Error as AnyError;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::operations::{InvalidArguments, Operation, OperationRegistry};
use super::{BoxFuture, InvokeRequest, OperationError, OperationErrorKind, Substrate};

#[derive(Debug, Clone, Default)]
pub struct LocalSubstrate {
    registry: OperationRegistry,
}

impl LocalSubstrate {
    pub fn new(registry: OperationRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    async fn invoke_with_retries(&self, request: InvokeRequest) -> Result<JsonValue, OperationError> {
        let InvokeRequest {
            operation: name,
            args,
            timeout,
            retry_policy,
            context,
        } = request;

        let Some(operation) = self.registry.get(&name) else {
            error!(operation = %name, workflow_id = %context.workflow_id, "Operation not registered");
            return Err(OperationError {
                operation: name,
                attempts: 1,
                kind: OperationErrorKind::NotRegistered,
            });
        };

        let max_attempts = retry_policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(
                operation = %name,
                attempt,
                max_attempts,
                workflow_id = %context.workflow_id,
                run_id = %context.run_id,
                "Invoking operation"
            );

            let kind = match run_attempt(operation.clone(), args.clone(), timeout).await {
                Ok(value) => return Ok(value),
                Err(kind) => kind,
            };

            if !kind.is_retryable() || attempt >= max_attempts {
                error!(
                    operation = %name,
                    attempts = attempt,
                    workflow_id = %context.workflow_id,
                    error = %kind,
                    "Operation failed, retry policy exhausted"
                );
                return Err(OperationError {
                    operation: name,
                    attempts: attempt,
                    kind,
                });
            }

            let delay = retry_policy.delay_after(attempt);
            warn!(
                operation = %name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %kind,
                "Operation attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Substrate for LocalSubstrate {
    fn invoke(&self, request: InvokeRequest) -> BoxFuture<'_, Result<JsonValue, OperationError>> {
        Box::pin(self.invoke_with_retries(request))
    }
}

/// Run one attempt on its own task
///
/// A panicking operation fails the attempt instead of unwinding the caller.
/// The task is aborted on timeout, and when the attempt future is dropped.
async fn run_attempt(
    operation: Arc<dyn Operation>,
    args: Vec<JsonValue>,
    timeout: Duration,
) -> Result<JsonValue, OperationErrorKind> {
    let mut attempt = JoinSet::new();
    attempt.spawn(async move { operation.call(args).await });

    match tokio::time::timeout(timeout, attempt.join_next()).await {
        Ok(Some(Ok(Ok(value)))) => Ok(value),
        Ok(Some(Ok(Err(err)))) => Err(classify(err)),
        Ok(Some(Err(join_err))) => Err(OperationErrorKind::Failed {
            message: format!("operation aborted: {join_err}"),
        }),
        Ok(None) => Err(OperationErrorKind::Failed {
            message: "operation task was not started".to_string(),
        }),
        Err(_) => Err(OperationErrorKind::Timeout { timeout }),
    }
}

fn classify(err: AnyError) -> OperationErrorKind {
    match err.downcast_ref::<InvalidArguments>() {
        Some(InvalidArguments(message)) => OperationErrorKind::InvalidArguments {
            message: message.clone(),
        },
        None => OperationErrorKind::Failed {
            message: format!("{err:#}"),
        },
    }
}
