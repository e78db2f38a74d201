//! Statement interpreter
//!
//! Walks a statement tree against one run's variable store. Activities go
//! to the substrate (or, for `start_child_workflow`, to the engine as a
//! child run), sequences run their elements in order, and parallels fan out
//! onto tokio tasks and join before completing.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::errors::ExecutionError;
use super::resolver::lookup;
use super::store::VariableStore;
use crate::definition::{ActivityStatement, ParallelStatement, SequenceStatement, Statement};
use crate::engine::{CompositionError, Engine};
use crate::substrate::{
    BoxFuture, InvocationContext, InvokeRequest, RetryPolicy, DEFAULT_ACTIVITY_TIMEOUT,
};

/// Activity name routed to the engine instead of the substrate
pub const CHILD_WORKFLOW_ACTIVITY: &str = "start_child_workflow";

/// Invocation options applied to every activity of a run
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    /// Per-attempt timeout
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ACTIVITY_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Executes statements for a single run
///
/// Cheap to clone; parallel branches each get their own clone.
#[derive(Clone)]
pub struct Interpreter {
    engine: Engine,
    context: InvocationContext,
    cancel: CancellationToken,

    /// Definition names of this run and the runs that started it
    lineage: Arc<[String]>,
}

impl Interpreter {
    pub fn new(
        engine: Engine,
        context: InvocationContext,
        cancel: CancellationToken,
        lineage: Arc<[String]>,
    ) -> Self {
        Self {
            engine,
            context,
            cancel,
            lineage,
        }
    }

    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    /// Execute a statement, writing activity results into `store`
    ///
    /// Boxed so sequences and parallels can recurse.
    pub fn execute<'a>(
        &'a self,
        statement: &'a Statement,
        store: &'a mut VariableStore,
    ) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }

            match statement {
                Statement::Activity(activity) => self.execute_activity(activity, store).await,
                Statement::Sequence(sequence) => self.execute_sequence(sequence, store).await,
                Statement::Parallel(parallel) => self.execute_parallel(parallel, store).await,
            }
        })
    }

    /* ===================== Activity ===================== */

    async fn execute_activity(
        &self,
        activity: &ActivityStatement,
        store: &mut VariableStore,
    ) -> Result<(), ExecutionError> {
        let args: Vec<JsonValue> = activity
            .arguments
            .iter()
            .map(|reference| self.resolve_argument(reference, store))
            .collect();

        info!(
            activity = %activity.name,
            workflow_id = %self.context.workflow_id,
            args = ?args,
            "Executing activity"
        );

        let result = if activity.name == CHILD_WORKFLOW_ACTIVITY {
            self.start_child(args).await?
        } else {
            self.invoke(&activity.name, args).await?
        };

        info!(
            activity = %activity.name,
            workflow_id = %self.context.workflow_id,
            result = %result,
            "Activity completed"
        );

        if let Some(name) = &activity.result_name {
            store.set(name.clone(), result);
        }
        Ok(())
    }

    fn resolve_argument(&self, reference: &str, store: &VariableStore) -> JsonValue {
        match lookup(reference, store.as_map()) {
            Some(value) => value.clone(),
            None => {
                info!(
                    reference = %reference,
                    workflow_id = %self.context.workflow_id,
                    "ResolutionFallback: reference not found in variable store, passing it as a literal"
                );
                JsonValue::String(reference.to_string())
            }
        }
    }

    async fn invoke(&self, operation: &str, args: Vec<JsonValue>) -> Result<JsonValue, ExecutionError> {
        let options = &self.engine.settings().activity;
        let request = InvokeRequest {
            operation: operation.to_string(),
            args,
            timeout: options.timeout,
            retry_policy: options.retry_policy.clone(),
            context: self.context.clone(),
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutionError::Cancelled),
            result = self.engine.substrate().invoke(request) => Ok(result?),
        }
    }

    async fn start_child(&self, args: Vec<JsonValue>) -> Result<JsonValue, ExecutionError> {
        let locator = match args.into_iter().next() {
            Some(JsonValue::String(locator)) => locator,
            Some(other) => {
                return Err(CompositionError::InvalidLocator {
                    found: other.to_string(),
                }
                .into())
            }
            None => {
                return Err(CompositionError::InvalidLocator {
                    found: "no arguments".to_string(),
                }
                .into())
            }
        };

        let result = self
            .engine
            .start_child_run(locator, &self.cancel, self.lineage.clone())
            .await;
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        Ok(result?)
    }

    /* ===================== Sequence ===================== */

    async fn execute_sequence(
        &self,
        sequence: &SequenceStatement,
        store: &mut VariableStore,
    ) -> Result<(), ExecutionError> {
        info!(
            elements = sequence.elements.len(),
            workflow_id = %self.context.workflow_id,
            "Executing sequence with {} elements",
            sequence.elements.len()
        );

        for (index, element) in sequence.elements.iter().enumerate() {
            debug!(index, workflow_id = %self.context.workflow_id, "Executing sequence element");
            self.execute(element, store).await?;
        }
        Ok(())
    }

    /* ===================== Parallel ===================== */

    /// Run every branch on its own task against a fork of the store
    ///
    /// Waits for all branches. On success the forks are merged back in
    /// branch order; if any branch failed, the first failure in branch order
    /// is returned and nothing is merged.
    async fn execute_parallel(
        &self,
        parallel: &ParallelStatement,
        store: &mut VariableStore,
    ) -> Result<(), ExecutionError> {
        let count = parallel.branches.len();
        info!(
            branches = count,
            workflow_id = %self.context.workflow_id,
            "Executing {} branches in parallel",
            count
        );

        let mut tasks = JoinSet::new();
        for (index, branch) in parallel.branches.iter().enumerate() {
            let interpreter = self.clone();
            let branch = branch.clone();
            let mut branch_store = store.fork();
            tasks.spawn(async move {
                let result = interpreter.execute(&branch, &mut branch_store).await;
                (index, result.map(|()| branch_store))
            });
        }

        let mut outcomes: Vec<Option<Result<VariableStore, ExecutionError>>> =
            (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            // A task that panicked leaves its slot empty
            if let Ok((index, outcome)) = joined {
                debug!(
                    branch = index,
                    ok = outcome.is_ok(),
                    workflow_id = %self.context.workflow_id,
                    "Parallel branch finished"
                );
                outcomes[index] = Some(outcome);
            }
        }

        let mut branch_stores = Vec::with_capacity(count);
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(branch_store)) => branch_stores.push(branch_store),
                Some(Err(err)) => return Err(err),
                None => return Err(ExecutionError::BranchPanicked { index }),
            }
        }

        for branch_store in branch_stores {
            store.merge(branch_store);
        }

        info!(workflow_id = %self.context.workflow_id, "All parallel branches completed");
        Ok(())
    }
}
