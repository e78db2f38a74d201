//! Statement model
//!
//! A definition is a finite tree of statements. Leaves are activities (one
//! named remote operation each); inner nodes compose children either in order
//! (`Sequence`) or concurrently (`Parallel`).

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::types::Variables;

/// Statement node
///
/// Serializes to the same externally tagged shape the loader reads:
/// `{activity: {...}}`, `{sequence: {...}}` or `{parallel: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Statement {
    Activity(ActivityStatement),
    Sequence(SequenceStatement),
    Parallel(ParallelStatement),
}

/// A single named operation invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityStatement {
    /// Operation name handed to the substrate
    pub name: String,

    /// Argument references, resolved against the variable store at execution time
    pub arguments: Vec<String>,

    /// Variable that receives the operation result, if any
    #[serde(rename = "result", skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceStatement {
    pub elements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelStatement {
    pub branches: Vec<Statement>,
}

impl Statement {
    /// Shorthand for building an activity leaf
    pub fn activity(
        name: impl Into<String>,
        arguments: Vec<String>,
        result_name: Option<String>,
    ) -> Self {
        Statement::Activity(ActivityStatement {
            name: name.into(),
            arguments,
            result_name,
        })
    }

    pub fn sequence(elements: Vec<Statement>) -> Self {
        Statement::Sequence(SequenceStatement { elements })
    }

    pub fn parallel(branches: Vec<Statement>) -> Self {
        Statement::Parallel(ParallelStatement { branches })
    }

    /// Total number of nodes in this subtree, including itself
    pub fn node_count(&self) -> usize {
        match self {
            Statement::Activity(_) => 1,
            Statement::Sequence(seq) => 1 + seq.elements.iter().map(Self::node_count).sum::<usize>(),
            Statement::Parallel(par) => 1 + par.branches.iter().map(Self::node_count).sum::<usize>(),
        }
    }

    /// Names of all activities in this subtree, in tree order
    pub fn activity_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_activity_names(&mut names);
        names
    }

    fn collect_activity_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Statement::Activity(activity) => names.push(&activity.name),
            Statement::Sequence(seq) => {
                for element in &seq.elements {
                    element.collect_activity_names(names);
                }
            }
            Statement::Parallel(par) => {
                for branch in &par.branches {
                    branch.collect_activity_names(names);
                }
            }
        }
    }
}

/// A loaded workflow definition
///
/// Immutable once loaded. `variables` seed the variable store of every run
/// started from this definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    /// Definition name (file stem, or `inline` for definitions built in code)
    pub name: String,

    /// SHA-256 of the source text the definition was parsed from
    pub version_hash: String,

    pub root: Statement,

    pub variables: Variables,
}

impl Definition {
    /// Build a definition directly from a statement tree
    pub fn inline(root: Statement, variables: Variables) -> Self {
        Self {
            name: "inline".to_string(),
            version_hash: String::new(),
            root,
            variables,
        }
    }

    /// Look up an initial variable
    pub fn variable(&self, name: &str) -> Option<&JsonValue> {
        self.variables.get(name)
    }
}
