//! Workflow definitions: the statement model and how it is loaded

pub mod loader;
pub mod model;
pub mod parser;

pub use loader::{load_file, parse_definition, DefinitionLoader, LoadError, SourceFormat};
pub use model::{ActivityStatement, Definition, ParallelStatement, SequenceStatement, Statement};
pub use parser::{parse_statement, ParseError};
