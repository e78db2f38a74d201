//! Run engine
//!
//! Owns everything a run needs (definition loader, substrate, run settings)
//! and implements the run contract: seed the store, apply run metadata,
//! execute the root statement fail-fast, mark the run completed and hand back
//! the final variables. Child runs started by `start_child_workflow` go
//! through the same path with a fresh store and identity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::definition::{Definition, DefinitionLoader, LoadError};
use crate::interpreter::{ActivityOptions, ExecutionError, Interpreter, VariableStore};
use crate::substrate::{BoxFuture, InvocationContext, LocalSubstrate, OperationRegistry, Substrate};
use crate::types::{
    Variables, WorkflowStatus, ATTEMPT_KEY, DEFAULT_WORKFLOW_TYPE, RUN_ID_KEY, WORKFLOW_ID_KEY,
    WORKFLOW_STATUS_KEY, WORKFLOW_TYPE_KEY,
};

/* ===================== Errors ===================== */

/// A child run could not be started or did not complete
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("start_child_workflow expects a definition locator as its first argument, got {found}")]
    InvalidLocator { found: String },

    #[error("child workflow '{locator}' failed: {source}")]
    ChildFailed {
        locator: String,
        #[source]
        source: Box<RunError>,
    },

    #[error("child workflow '{locator}' would start a cycle: {}", .chain.join(" -> "))]
    Cycle { locator: String, chain: Vec<String> },
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl RunError {
    /// Terminal status this failure leaves the run in
    pub fn status(&self) -> WorkflowStatus {
        match self {
            RunError::Execution(err) if err.is_cancelled() => WorkflowStatus::Cancelled,
            _ => WorkflowStatus::Failed,
        }
    }
}

/* ===================== Run types ===================== */

/// Run settings shared by every run an engine starts
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub activity: ActivityOptions,

    /// Tag written under `workflow_type`
    pub workflow_type: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            activity: ActivityOptions::default(),
            workflow_type: DEFAULT_WORKFLOW_TYPE.to_string(),
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            activity: ActivityOptions {
                timeout: config.substrate.default_timeout(),
                retry_policy: config.substrate.retry_policy(),
            },
            workflow_type: config.runs.workflow_type.clone(),
        }
    }
}

/// What to run: a definition to load, or one already in memory
#[derive(Debug, Clone)]
pub enum RunSource {
    Locator(String),
    Inline(Definition),
}

impl From<&str> for RunSource {
    fn from(locator: &str) -> Self {
        RunSource::Locator(locator.to_string())
    }
}

impl From<String> for RunSource {
    fn from(locator: String) -> Self {
        RunSource::Locator(locator)
    }
}

impl From<Definition> for RunSource {
    fn from(definition: Definition) -> Self {
        RunSource::Inline(definition)
    }
}

/// A completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub workflow_id: String,
    pub run_id: String,
    pub definition_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Final variable snapshot
    pub variables: Variables,
}

/* ===================== Engine ===================== */

struct EngineInner {
    loader: DefinitionLoader,
    substrate: Arc<dyn Substrate>,
    settings: RunSettings,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(loader: DefinitionLoader, substrate: Arc<dyn Substrate>, settings: RunSettings) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                loader,
                substrate,
                settings,
            }),
        }
    }

    pub fn from_config(config: &Config, substrate: Arc<dyn Substrate>) -> Self {
        Self::new(
            DefinitionLoader::new(config.definitions.paths.clone()),
            substrate,
            RunSettings::from_config(config),
        )
    }

    /// Engine backed by an in-process [`LocalSubstrate`]
    pub fn local(config: &Config, registry: OperationRegistry) -> Self {
        Self::from_config(config, Arc::new(LocalSubstrate::new(registry)))
    }

    pub fn loader(&self) -> &DefinitionLoader {
        &self.inner.loader
    }

    pub fn substrate(&self) -> &dyn Substrate {
        self.inner.substrate.as_ref()
    }

    pub fn settings(&self) -> &RunSettings {
        &self.inner.settings
    }

    /// Start a run and wait for it to finish
    ///
    /// `overrides` are layered over the definition's variables before run
    /// metadata is written.
    pub async fn start_run(
        &self,
        source: impl Into<RunSource>,
        overrides: Variables,
    ) -> Result<RunOutcome, RunError> {
        self.start_run_with_cancel(source, overrides, CancellationToken::new())
            .await
    }

    /// Same as [`Engine::start_run`], cancellable through `cancel`
    pub async fn start_run_with_cancel(
        &self,
        source: impl Into<RunSource>,
        overrides: Variables,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        // Inline definitions have no locator a child could name, so they
        // start with an empty lineage
        let (definition, lineage): (Definition, Arc<[String]>) = match source.into() {
            RunSource::Locator(locator) => {
                let definition = self.inner.loader.load(&locator)?;
                let lineage = vec![definition.name.clone()];
                (definition, lineage.into())
            }
            RunSource::Inline(definition) => (definition, Arc::from([])),
        };

        self.execute_definition(&definition, overrides, cancel, lineage)
            .await
    }

    /// Run a definition to completion and return its final variables
    pub async fn run(&self, definition: &Definition) -> Result<Variables, RunError> {
        let outcome = self
            .execute_definition(
                definition,
                Variables::new(),
                CancellationToken::new(),
                Arc::from([]),
            )
            .await?;
        Ok(outcome.variables)
    }

    /// Start an independent child run and describe its outcome
    ///
    /// The child gets a fresh store and identity and is cancelled along with
    /// `parent`. It is never retried. `lineage` names the definitions of the
    /// runs above it; a child whose definition is already among them is
    /// rejected before it starts.
    pub fn start_child_run(
        &self,
        locator: String,
        parent: &CancellationToken,
        lineage: Arc<[String]>,
    ) -> BoxFuture<'static, Result<JsonValue, CompositionError>> {
        let engine = self.clone();
        let cancel = parent.child_token();
        Box::pin(async move {
            info!(locator = %locator, "Starting child workflow");

            let definition = match engine.inner.loader.load(&locator) {
                Ok(definition) => definition,
                Err(err) => {
                    return Err(CompositionError::ChildFailed {
                        locator,
                        source: Box::new(err.into()),
                    })
                }
            };

            let mut chain = lineage.to_vec();
            let repeated = chain.contains(&definition.name);
            chain.push(definition.name.clone());
            if repeated {
                warn!(locator = %locator, chain = ?chain, "Refusing to start child workflow cycle");
                return Err(CompositionError::Cycle { locator, chain });
            }

            let result = engine
                .execute_definition(&definition, Variables::new(), cancel, Arc::from(chain))
                .await;
            match result {
                Ok(outcome) => Ok(json!({
                    "child_workflow_id": outcome.workflow_id,
                    "child_workflow_name": outcome.definition_name,
                    "child_result": outcome.variables,
                    "status": WorkflowStatus::Completed.as_str(),
                })),
                Err(err) => Err(CompositionError::ChildFailed {
                    locator,
                    source: Box::new(err),
                }),
            }
        })
    }

    async fn execute_definition(
        &self,
        definition: &Definition,
        overrides: Variables,
        cancel: CancellationToken,
        lineage: Arc<[String]>,
    ) -> Result<RunOutcome, RunError> {
        let workflow_id = format!("{}-{}", definition.name, Uuid::new_v4());
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        let mut vars = definition.variables.clone();
        vars.extend(overrides);
        let mut store = VariableStore::from_variables(vars);

        // Metadata is written last and wins over same-named user variables
        store.set(WORKFLOW_ID_KEY, json!(workflow_id));
        store.set(RUN_ID_KEY, json!(run_id));
        store.set(WORKFLOW_TYPE_KEY, json!(self.inner.settings.workflow_type));
        store.set(ATTEMPT_KEY, json!(1));

        info!(
            workflow_id = %workflow_id,
            run_id = %run_id,
            definition = %definition.name,
            version = %definition.version_hash,
            statements = definition.root.node_count(),
            "Starting workflow run"
        );

        let interpreter = Interpreter::new(
            self.clone(),
            InvocationContext {
                workflow_id: workflow_id.clone(),
                run_id: run_id.clone(),
            },
            cancel,
            lineage,
        );

        if let Err(err) = interpreter.execute(&definition.root, &mut store).await {
            let err = RunError::from(err);
            error!(
                workflow_id = %workflow_id,
                run_id = %run_id,
                status = %err.status(),
                error = %err,
                "Workflow run failed"
            );
            return Err(err);
        }

        store.set(WORKFLOW_STATUS_KEY, json!(WorkflowStatus::Completed.as_str()));
        let completed_at = Utc::now();

        info!(
            workflow_id = %workflow_id,
            run_id = %run_id,
            elapsed_ms = (completed_at - started_at).num_milliseconds(),
            "Workflow run completed"
        );

        Ok(RunOutcome {
            workflow_id,
            run_id,
            definition_name: definition.name.clone(),
            started_at,
            completed_at,
            variables: store.into_variables(),
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("loader", &self.inner.loader)
            .field("settings", &self.inner.settings)
            .finish()
    }
}
