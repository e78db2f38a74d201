//! Operation registry
//!
//! Operations are the concrete request/response bodies behind activity
//! names. The embedding application registers them (usually as async
//! closures); two built-ins ship with the crate.

use anyhow::Result;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::BoxFuture;

/// Marks an operation failure that retrying cannot fix
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct InvalidArguments(pub String);

/// A named request/response operation
pub trait Operation: Send + Sync {
    fn call(&self, args: Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue>>;
}

impl<F, Fut> Operation for F
where
    F: Fn(Vec<JsonValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue>> + Send + 'static,
{
    fn call(&self, args: Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue>> {
        Box::pin(self(args))
    }
}

#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `sleep_activity` and `echo`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("sleep_activity", sleep_activity)
            .register("echo", echo);
        registry
    }

    /// Register (or replace) an operation under `name`
    pub fn register<O>(&mut self, name: impl Into<String>, operation: O) -> &mut Self
    where
        O: Operation + 'static,
    {
        self.operations.insert(name.into(), Arc::new(operation));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}

/* ===================== Built-in operations ===================== */

/// sleep_activity(seconds) - pause, then report how long
///
/// Accepts a number or a numeric string.
pub async fn sleep_activity(args: Vec<JsonValue>) -> Result<JsonValue> {
    let seconds = match args.first() {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|secs| secs.is_finite() && *secs >= 0.0)
    .ok_or_else(|| {
        InvalidArguments(format!(
            "sleep_activity expects a non-negative number of seconds, got {:?}",
            args.first()
        ))
    })?;

    let duration = Duration::try_from_secs_f64(seconds).map_err(|_| {
        InvalidArguments(format!(
            "sleep_activity cannot sleep for {seconds} seconds: out of range"
        ))
    })?;

    info!(seconds, "Sleeping");
    tokio::time::sleep(duration).await;

    Ok(json!(format!("slept for {} seconds", format_seconds(seconds))))
}

/// echo(args...) - return the single argument, or the whole list
pub async fn echo(mut args: Vec<JsonValue>) -> Result<JsonValue> {
    if args.len() == 1 {
        return Ok(args.remove(0));
    }
    Ok(JsonValue::Array(args))
}

fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as u64)
    } else {
        format!("{seconds}")
    }
}
