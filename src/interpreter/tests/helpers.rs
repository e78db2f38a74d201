//! Test helpers for interpreter tests
//!
//! Operations are registered on a real `LocalSubstrate` and record every
//! call (name, arguments, start and end time) into a shared log, so tests
//! can assert on invocation order, arguments and overlap.

use serde_json::{json, Value as JsonValue};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::definition::{Definition, DefinitionLoader, Statement};
use crate::engine::{Engine, RunSettings};
use crate::interpreter::ActivityOptions;
use crate::substrate::{LocalSubstrate, OperationRegistry, RetryPolicy};
use crate::types::Variables;

#[derive(Debug, Clone)]
pub struct Call {
    pub operation: String,
    pub args: Vec<JsonValue>,
    pub started: Instant,
    pub finished: Instant,
}

/// Shared invocation log
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Operation names in the order their calls finished
    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Registry plus recorder, with builders for scripted operations
pub struct TestOperations {
    pub registry: OperationRegistry,
    pub recorder: Recorder,
}

impl TestOperations {
    pub fn new() -> Self {
        Self {
            registry: OperationRegistry::new(),
            recorder: Recorder::default(),
        }
    }

    /// Operation that returns `value` immediately
    pub fn returning(self, name: &str, value: JsonValue) -> Self {
        self.delayed(name, value, Duration::ZERO)
    }

    /// Operation that returns `value` after `delay`
    pub fn delayed(mut self, name: &str, value: JsonValue, delay: Duration) -> Self {
        let recorder = self.recorder.clone();
        let operation = name.to_string();
        self.registry.register(name, move |args: Vec<JsonValue>| {
            let recorder = recorder.clone();
            let operation = operation.clone();
            let value = value.clone();
            async move {
                let started = Instant::now();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                recorder.push(Call {
                    operation,
                    args,
                    started,
                    finished: Instant::now(),
                });
                Ok::<_, anyhow::Error>(value)
            }
        });
        self
    }

    /// Operation that returns its arguments (single argument unwrapped)
    pub fn echoing(mut self, name: &str) -> Self {
        let recorder = self.recorder.clone();
        let operation = name.to_string();
        self.registry.register(name, move |args: Vec<JsonValue>| {
            let recorder = recorder.clone();
            let operation = operation.clone();
            async move {
                let started = Instant::now();
                let value = if args.len() == 1 {
                    args[0].clone()
                } else {
                    JsonValue::Array(args.clone())
                };
                recorder.push(Call {
                    operation,
                    args,
                    started,
                    finished: Instant::now(),
                });
                Ok::<_, anyhow::Error>(value)
            }
        });
        self
    }

    /// Operation that always fails after `delay`; returns its attempt counter
    pub fn failing(mut self, name: &str, delay: Duration) -> (Self, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let recorder = self.recorder.clone();
        let operation = name.to_string();
        self.registry.register(name, move |args: Vec<JsonValue>| {
            counter.fetch_add(1, Ordering::SeqCst);
            let recorder = recorder.clone();
            let operation = operation.clone();
            async move {
                let started = Instant::now();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                recorder.push(Call {
                    operation: operation.clone(),
                    args,
                    started,
                    finished: Instant::now(),
                });
                Err::<JsonValue, _>(anyhow::anyhow!("{operation} is down"))
            }
        });
        (self, attempts)
    }
}

/// Activity options with millisecond retry intervals
pub fn fast_options() -> ActivityOptions {
    ActivityOptions {
        timeout: Duration::from_secs(5),
        retry_policy: RetryPolicy {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_millis(5),
        },
    }
}

pub fn engine(registry: OperationRegistry) -> Engine {
    engine_with_definitions(registry, None)
}

/// Engine whose loader searches `dir` for definitions
pub fn engine_with_definitions(registry: OperationRegistry, dir: Option<&Path>) -> Engine {
    let loader = DefinitionLoader::new(dir.map(|d| vec![d.to_path_buf()]).unwrap_or_default());
    Engine::new(
        loader,
        Arc::new(LocalSubstrate::new(registry)),
        RunSettings {
            activity: fast_options(),
            ..RunSettings::default()
        },
    )
}

pub fn activity(name: &str, arguments: &[&str], result: Option<&str>) -> Statement {
    Statement::activity(
        name,
        arguments.iter().map(|a| a.to_string()).collect(),
        result.map(str::to_string),
    )
}

pub fn vars(value: JsonValue) -> Variables {
    match value {
        JsonValue::Object(map) => map,
        other => unreachable!("variables must be an object, got {:?}", other),
    }
}

pub fn definition(root: Statement, variables: JsonValue) -> Definition {
    Definition::inline(root, vars(variables))
}

pub fn empty_vars() -> JsonValue {
    json!({})
}
