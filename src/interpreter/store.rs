//! Variable store
//!
//! One store per run. Parallel branches never share it directly: each branch
//! works on a fork and the forks are merged back at the join, in branch
//! order, so same-name writes from different branches resolve the same way
//! on every run (the highest branch index wins).

use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

use crate::types::Variables;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    vars: Variables,

    /// Names written since this store was created or forked
    written: BTreeSet<String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with initial variables (not counted as writes)
    pub fn from_variables(vars: Variables) -> Self {
        Self {
            vars,
            written: BTreeSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Write a variable; the last write for a name wins
    pub fn set(&mut self, name: impl Into<String>, value: JsonValue) {
        let name = name.into();
        self.vars.insert(name.clone(), value);
        self.written.insert(name);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn as_map(&self) -> &Variables {
        &self.vars
    }

    /// Names written since creation or fork, in name order
    pub fn written(&self) -> impl Iterator<Item = &str> {
        self.written.iter().map(String::as_str)
    }

    /// Private copy for a parallel branch
    ///
    /// The fork sees everything the parent holds at fork time and records
    /// only its own writes.
    pub fn fork(&self) -> Self {
        Self {
            vars: self.vars.clone(),
            written: BTreeSet::new(),
        }
    }

    /// Apply a branch's writes to this store
    ///
    /// Only names the branch wrote are copied; values it merely inherited
    /// from the fork point are left alone.
    pub fn merge(&mut self, branch: VariableStore) {
        let VariableStore { mut vars, written } = branch;
        for name in written {
            if let Some(value) = vars.remove(&name) {
                self.set(name, value);
            }
        }
    }

    pub fn snapshot(&self) -> Variables {
        self.vars.clone()
    }

    pub fn into_variables(self) -> Variables {
        self.vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> VariableStore {
        let mut vars = Variables::new();
        vars.insert("shipper_id".into(), json!("S1"));
        vars.insert("count".into(), json!(1));
        VariableStore::from_variables(vars)
    }

    #[test]
    fn test_seed_is_not_a_write() {
        let store = seeded();

        assert_eq!(store.len(), 2);
        assert_eq!(store.written().count(), 0);
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = seeded();
        store.set("count", json!(2));
        store.set("count", json!(3));

        assert_eq!(store.get("count"), Some(&json!(3)));
        assert_eq!(store.written().collect::<Vec<_>>(), vec!["count"]);
    }

    #[test]
    fn test_fork_sees_parent_but_records_only_own_writes() {
        let mut parent = seeded();
        parent.set("found", json!(7));

        let mut branch = parent.fork();
        assert_eq!(branch.get("found"), Some(&json!(7)));
        assert_eq!(branch.written().count(), 0);

        branch.set("notified", json!(true));
        assert!(!parent.contains("notified"));
        assert_eq!(branch.written().collect::<Vec<_>>(), vec!["notified"]);
    }

    #[test]
    fn test_merge_applies_branches_in_call_order() {
        let mut parent = seeded();

        let mut first = parent.fork();
        let mut second = parent.fork();
        first.set("winner", json!("first"));
        first.set("only_first", json!(1));
        second.set("winner", json!("second"));

        parent.merge(first);
        parent.merge(second);

        assert_eq!(parent.get("winner"), Some(&json!("second")));
        assert_eq!(parent.get("only_first"), Some(&json!(1)));
    }

    #[test]
    fn test_merge_does_not_clobber_with_inherited_values() {
        let mut parent = seeded();
        let mut first = parent.fork();
        let second = parent.fork();

        first.set("count", json!(10));
        parent.merge(first);
        // second inherited count=1 but never wrote it
        parent.merge(second);

        assert_eq!(parent.get("count"), Some(&json!(10)));
    }

    #[test]
    fn test_merged_writes_propagate_through_nested_forks() {
        let mut root = seeded();
        let mut outer = root.fork();
        let mut inner = outer.fork();

        inner.set("deep", json!("value"));
        outer.merge(inner);
        root.merge(outer);

        assert_eq!(root.get("deep"), Some(&json!("value")));
    }
}
