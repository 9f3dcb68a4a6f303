// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::PipeError;
use serde_json::json;
use yare::parameterized;

#[test]
fn ternary_picks_branch() {
    assert_eq!(
        apply("conditional.ternary", &[json!(true), json!("y"), json!("n")]).unwrap(),
        json!("y")
    );
    assert_eq!(
        apply("conditional.ternary", &[json!(0), json!("y"), json!("n")]).unwrap(),
        json!("n")
    );
}

#[test]
fn equality_compares_values() {
    assert_eq!(
        apply("conditional.equality", &[json!(5), json!(5)]).unwrap(),
        json!(true)
    );
    assert_eq!(
        apply("conditional.equality", &[json!("a"), json!("b")]).unwrap(),
        json!(false)
    );
}

#[parameterized(
    add = { "number.add", 7 },
    math_alias = { "math.add", 7 },
)]
fn add_variants(name: &str, expected: i64) {
    assert_eq!(apply(name, &[json!(3), json!(4)]).unwrap(), json!(expected));
}

#[test]
fn add_folds_variadic() {
    assert_eq!(
        apply("number.add", &[json!(1), json!(2), json!(3)]).unwrap(),
        json!(6)
    );
}

#[test]
fn subtract_and_multiply() {
    assert_eq!(apply("number.subtract", &[json!(10), json!(4)]).unwrap(), json!(6));
    assert_eq!(apply("number.multiply", &[json!(4), json!(6)]).unwrap(), json!(24));
}

#[test]
fn divide_rejects_zero() {
    assert!(apply("number.divide", &[json!(1), json!(0)]).is_err());
    assert_eq!(apply("number.divide", &[json!(9), json!(2)]).unwrap(), json!(4.5));
}

#[test]
fn numeric_strings_coerce() {
    assert_eq!(apply("number.add", &[json!("3"), json!(4)]).unwrap(), json!(7));
}

#[test]
fn whole_results_stay_integral() {
    assert_eq!(apply("number.divide", &[json!(8), json!(2)]).unwrap(), json!(4));
}

#[test]
fn string_concat_and_case() {
    assert_eq!(
        apply("string.concat", &[json!("a-"), json!("b"), json!(1)]).unwrap(),
        json!("a-b1")
    );
    assert_eq!(apply("string.uppercase", &[json!("ab")]).unwrap(), json!("AB"));
}

#[test]
fn string_split_and_slice() {
    assert_eq!(
        apply("string.split", &[json!("a,b,c"), json!(",")]).unwrap(),
        json!(["a", "b", "c"])
    );
    assert_eq!(
        apply("string.slice", &[json!("abcdef"), json!(1), json!(3)]).unwrap(),
        json!("bc")
    );
}

#[test]
fn json_roundtrip() {
    let encoded = apply("json.stringify", &[json!({"a": 1})]).unwrap();
    assert_eq!(apply("json.parse", &[encoded]).unwrap(), json!({"a": 1}));
}

#[test]
fn array_and_object_access() {
    assert_eq!(
        apply("array.get", &[json!(["x", "y"]), json!(1)]).unwrap(),
        json!("y")
    );
    assert_eq!(apply("array.length", &[json!([1, 2, 3])]).unwrap(), json!(3));
    assert_eq!(
        apply("array.join", &[json!([1, 2]), json!("-")]).unwrap(),
        json!("1-2")
    );
    assert_eq!(
        apply("object.get", &[json!({"k": 9}), json!("k")]).unwrap(),
        json!(9)
    );
}

#[test]
fn unknown_function_errors() {
    assert!(matches!(
        apply("nope.nothing", &[]),
        Err(PipeError::UnknownFunction(_))
    ));
}

#[test]
fn bad_arity_errors() {
    assert!(matches!(
        apply("conditional.ternary", &[json!(true)]),
        Err(PipeError::BadArity { .. })
    ));
}
