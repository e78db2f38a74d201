//! Tests for sequence execution

use super::helpers::{activity, definition, empty_vars, engine, TestOperations};
use crate::definition::Statement;
use crate::engine::RunError;
use crate::interpreter::ExecutionError;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_elements_run_strictly_in_order() {
    let ops = TestOperations::new()
        .delayed("first", json!(1), Duration::from_millis(30))
        .returning("second", json!(2))
        .delayed("third", json!(3), Duration::from_millis(10));
    let recorder = ops.recorder.clone();
    let engine = engine(ops.registry);

    let def = definition(
        Statement::sequence(vec![
            activity("first", &[], None),
            activity("second", &[], None),
            activity("third", &[], None),
        ]),
        empty_vars(),
    );
    engine.run(&def).await.unwrap();

    let calls = recorder.calls();
    assert_eq!(recorder.operations(), vec!["first", "second", "third"]);
    assert!(calls[0].finished <= calls[1].started);
    assert!(calls[1].finished <= calls[2].started);
}

#[tokio::test]
async fn test_later_element_sees_earlier_result() {
    let ops = TestOperations::new()
        .returning("a", json!({"id": "L-9"}))
        .echoing("b");
    let recorder = ops.recorder.clone();
    let engine = engine(ops.registry);

    let def = definition(
        Statement::sequence(vec![
            activity("a", &[], Some("r1")),
            activity("b", &["r1", "r1.id"], None),
        ]),
        empty_vars(),
    );
    engine.run(&def).await.unwrap();

    assert_eq!(recorder.operations(), vec!["a", "b"]);
    assert_eq!(
        recorder.calls_to("b")[0].args,
        vec![json!({"id": "L-9"}), json!("L-9")]
    );
}

#[tokio::test]
async fn test_failure_skips_remaining_elements() {
    let (ops, _) = TestOperations::new()
        .returning("before", json!("ok"))
        .failing("broken", Duration::ZERO);
    let ops = ops.returning("after", json!("never"));
    let recorder = ops.recorder.clone();
    let engine = engine(ops.registry);

    let def = definition(
        Statement::sequence(vec![
            activity("before", &[], Some("b")),
            activity("broken", &[], None),
            activity("after", &[], Some("a")),
        ]),
        empty_vars(),
    );
    let err = engine.run(&def).await.unwrap_err();

    let RunError::Execution(ExecutionError::Operation(op_err)) = &err else {
        unreachable!("Expected OperationError, got {:?}", err);
    };
    assert_eq!(op_err.operation, "broken");
    assert_eq!(op_err.attempts, 3);
    assert!(recorder.calls_to("after").is_empty());
}

#[tokio::test]
async fn test_empty_sequence_is_a_no_op() {
    let engine = engine(TestOperations::new().registry);

    let def = definition(Statement::sequence(vec![]), json!({"x": 1}));
    let vars = engine.run(&def).await.unwrap();

    assert_eq!(vars["x"], json!(1));
    assert_eq!(vars["workflow_status"], json!("completed"));
}

#[tokio::test]
async fn test_nested_sequences_flatten_in_order() {
    let ops = TestOperations::new()
        .returning("a", json!(1))
        .returning("b", json!(2))
        .returning("c", json!(3));
    let recorder = ops.recorder.clone();
    let engine = engine(ops.registry);

    let def = definition(
        Statement::sequence(vec![
            Statement::sequence(vec![activity("a", &[], None), activity("b", &[], None)]),
            Statement::sequence(vec![]),
            activity("c", &[], None),
        ]),
        empty_vars(),
    );
    engine.run(&def).await.unwrap();

    assert_eq!(recorder.operations(), vec!["a", "b", "c"]);
}
