//! Workflow interpreter
//!
//! - `store`: the per-run variable store, with fork/merge for parallel branches
//! - `resolver`: argument references (plain names and dotted paths)
//! - `executor`: statement execution

pub mod errors;
pub mod executor;
pub mod resolver;
pub mod store;

#[cfg(test)]
mod tests;

pub use errors::ExecutionError;
pub use executor::{ActivityOptions, Interpreter, CHILD_WORKFLOW_ACTIVITY};
pub use resolver::{lookup, resolve, PATH_SEPARATOR};
pub use store::VariableStore;
