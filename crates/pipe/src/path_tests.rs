// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::{json, Value};

fn context() -> Value {
    json!({
        "t1": {"output": {"data": {"id": "ord_1002", "count": 3, "tags": ["a", "b"]}}},
        "flag": true
    })
}

#[test]
fn resolves_nested_objects() {
    assert_eq!(
        resolve_path("t1.output.data.id", &context()),
        json!("ord_1002")
    );
}

#[test]
fn resolves_array_indices() {
    assert_eq!(resolve_path("t1.output.data.tags.1", &context()), json!("b"));
}

#[test]
fn missing_paths_resolve_null() {
    assert_eq!(resolve_path("t1.output.data.missing", &context()), json!(null));
    assert_eq!(resolve_path("zz.deep", &context()), json!(null));
    assert_eq!(resolve_path("t1.output.data.tags.9", &context()), json!(null));
}

#[test]
fn lone_reference_detection() {
    assert!(is_lone_reference("{t1.output.data.id}"));
    assert!(!is_lone_reference("order {t1.output.data.id}"));
    assert!(!is_lone_reference("{a}{b}"));
    assert!(!is_lone_reference("plain"));
}

#[test]
fn interpolates_mixed_text() {
    assert_eq!(
        interpolate("order {t1.output.data.id} x{t1.output.data.count}", &context()),
        "order ord_1002 x3"
    );
}

#[test]
fn interpolates_non_strings_via_json() {
    assert_eq!(interpolate("flag={flag}", &context()), "flag=true");
    assert_eq!(interpolate("gone={nope}", &context()), "gone=");
}

#[test]
fn unterminated_brace_passes_through() {
    assert_eq!(interpolate("broken {a.b", &context()), "broken {a.b");
}
