// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::{json, Value};

fn context() -> Value {
    json!({
        "t1": {"output": {"data": {"id": "ord_1002", "qty": 3, "price": 5}}}
    })
}

#[test]
fn maps_objects_key_by_key() {
    let rules = json!({
        "order_id": "{t1.output.data.id}",
        "label": "order {t1.output.data.id}",
        "fixed": 7
    });
    let out = Mapper::apply(&rules, &context()).unwrap();
    assert_eq!(
        out,
        json!({"order_id": "ord_1002", "label": "order ord_1002", "fixed": 7})
    );
}

#[test]
fn maps_nested_structures() {
    let rules = json!({
        "line": {"qty": "{t1.output.data.qty}", "tags": ["{t1.output.data.id}", "x"]}
    });
    let out = Mapper::apply(&rules, &context()).unwrap();
    assert_eq!(out["line"]["qty"], json!(3));
    assert_eq!(out["line"]["tags"], json!(["ord_1002", "x"]));
}

#[test]
fn pipe_objects_are_expressions_not_containers() {
    let rules = json!({
        "total": {
            "@pipe": [
                ["{t1.output.data.qty}", "{t1.output.data.price}"],
                ["{@number.multiply}"]
            ]
        }
    });
    let out = Mapper::apply(&rules, &context()).unwrap();
    assert_eq!(out["total"], json!(15));
}

#[test]
fn apply_onto_merges_top_level_keys() {
    let mut target = json!({"existing": 1, "kept": true});
    Mapper::apply_onto(
        &json!({"existing": "{t1.output.data.qty}", "added": "{t1.output.data.id}"}),
        &context(),
        &mut target,
    )
    .unwrap();
    assert_eq!(
        target,
        json!({"existing": 3, "kept": true, "added": "ord_1002"})
    );
}

#[test]
fn apply_onto_replaces_non_objects() {
    let mut target = json!(null);
    Mapper::apply_onto(&json!({"a": 1}), &context(), &mut target).unwrap();
    assert_eq!(target, json!({"a": 1}));
}
