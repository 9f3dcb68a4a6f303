// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::{json, Value};

fn context() -> Value {
    json!({
        "t1": {"output": {"data": {"seed": 4, "speed": 6, "name": "winter"}}},
        "w1": {"output": {"metadata": {"code": 200}}}
    })
}

#[test]
fn literal_passthrough() {
    assert_eq!(Pipe::resolve(&json!(42), &context()).unwrap(), json!(42));
    assert_eq!(Pipe::resolve(&json!(true), &context()).unwrap(), json!(true));
}

#[test]
fn lone_reference_keeps_type() {
    assert_eq!(
        Pipe::resolve(&json!("{t1.output.data.seed}"), &context()).unwrap(),
        json!(4)
    );
}

#[test]
fn mixed_string_interpolates() {
    assert_eq!(
        Pipe::resolve(&json!("job-{t1.output.data.name}"), &context()).unwrap(),
        json!("job-winter")
    );
}

#[test]
fn pipe_multiplies_seed_by_speed() {
    let expr = json!({
        "@pipe": [
            ["{t1.output.data.seed}", "{t1.output.data.speed}"],
            ["{@number.multiply}"]
        ]
    });
    assert_eq!(Pipe::resolve(&expr, &context()).unwrap(), json!(24));
}

#[test]
fn pipe_chains_function_rows() {
    let expr = json!({
        "@pipe": [
            ["{t1.output.data.seed}", "{t1.output.data.speed}"],
            ["{@number.add}"],
            ["{@number.to_string}"]
        ]
    });
    assert_eq!(Pipe::resolve(&expr, &context()).unwrap(), json!("10"));
}

#[test]
fn pipe_value_row_after_function_restarts() {
    let expr = json!({
        "@pipe": [
            ["{w1.output.metadata.code}", 200],
            ["{@conditional.equality}"]
        ]
    });
    assert_eq!(Pipe::resolve(&expr, &context()).unwrap(), json!(true));
}

#[test]
fn malformed_pipe_errors() {
    assert!(Pipe::resolve(&json!({"@pipe": "no"}), &context()).is_err());
    assert!(Pipe::resolve(&json!({"@pipe": ["not-a-row"]}), &context()).is_err());
}

#[test]
fn empty_pipe_resolves_null() {
    assert_eq!(
        Pipe::resolve(&json!({"@pipe": []}), &context()).unwrap(),
        json!(null)
    );
}
