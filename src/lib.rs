pub mod cli;
pub mod config;
pub mod definition;
pub mod engine;
pub mod interpreter;
pub mod substrate;
pub mod types;

// Re-export main types
pub use types::*;

pub use self::config::Config;
pub use definition::{Definition, DefinitionLoader, LoadError, ParseError, Statement};
pub use engine::{CompositionError, Engine, RunError, RunOutcome, RunSettings, RunSource};
pub use interpreter::{ExecutionError, Interpreter, VariableStore};
pub use substrate::{LocalSubstrate, OperationError, OperationRegistry, Substrate};
