// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `{@domain.fn}` function registry.
//!
//! All functions are pure and deterministic; anything time- or
//! randomness-dependent belongs to the workflow runtime, not the mapper.

use crate::error::PipeError;
use serde_json::{json, Value};

/// Apply a registered function to resolved arguments.
pub fn apply(name: &str, args: &[Value]) -> Result<Value, PipeError> {
    match name {
        // -- conditional --
        "conditional.ternary" => {
            let [cond, when_true, when_false] = take::<3>(name, args)?;
            Ok(if truthy(cond) {
                when_true.clone()
            } else {
                when_false.clone()
            })
        }
        "conditional.equality" => {
            let [a, b] = take::<2>(name, args)?;
            Ok(json!(a == b))
        }
        "conditional.greater_than" => {
            let [a, b] = take::<2>(name, args)?;
            Ok(json!(number(name, 0, a)? > number(name, 1, b)?))
        }
        "conditional.less_than" => {
            let [a, b] = take::<2>(name, args)?;
            Ok(json!(number(name, 0, a)? < number(name, 1, b)?))
        }
        "conditional.nullish" => {
            let [a, fallback] = take::<2>(name, args)?;
            Ok(if a.is_null() { fallback.clone() } else { a.clone() })
        }

        // -- number / math --
        "number.add" | "math.add" => fold_numbers(name, args, |a, b| a + b),
        "number.subtract" | "math.subtract" => fold_numbers(name, args, |a, b| a - b),
        "number.multiply" | "math.multiply" => fold_numbers(name, args, |a, b| a * b),
        "number.divide" | "math.divide" => {
            let [a, b] = take::<2>(name, args)?;
            let divisor = number(name, 1, b)?;
            if divisor == 0.0 {
                return Err(PipeError::BadArgument {
                    function: name.to_string(),
                    index: 1,
                    message: "division by zero".to_string(),
                });
            }
            Ok(number_value(number(name, 0, a)? / divisor))
        }
        "number.gte" => {
            let [a, b] = take::<2>(name, args)?;
            Ok(json!(number(name, 0, a)? >= number(name, 1, b)?))
        }
        "number.lte" => {
            let [a, b] = take::<2>(name, args)?;
            Ok(json!(number(name, 0, a)? <= number(name, 1, b)?))
        }
        "number.to_string" => {
            let [a] = take::<1>(name, args)?;
            Ok(json!(number(name, 0, a)?.to_string()))
        }

        // -- string --
        "string.concat" => {
            let mut out = String::new();
            for arg in args {
                out.push_str(&stringify(arg));
            }
            Ok(json!(out))
        }
        "string.split" => {
            let [text, sep] = take::<2>(name, args)?;
            let parts: Vec<Value> = stringify(text)
                .split(&stringify(sep))
                .map(|p| json!(p))
                .collect();
            Ok(Value::Array(parts))
        }
        "string.slice" => {
            let [text, start, end] = take::<3>(name, args)?;
            let s = stringify(text);
            let from = number(name, 1, start)? as usize;
            let to = (number(name, 2, end)? as usize).min(s.len());
            Ok(json!(s.get(from..to).unwrap_or_default()))
        }
        "string.length" => {
            let [text] = take::<1>(name, args)?;
            Ok(json!(stringify(text).len()))
        }
        "string.uppercase" => {
            let [text] = take::<1>(name, args)?;
            Ok(json!(stringify(text).to_uppercase()))
        }
        "string.lowercase" => {
            let [text] = take::<1>(name, args)?;
            Ok(json!(stringify(text).to_lowercase()))
        }

        // -- json --
        "json.stringify" => {
            let [v] = take::<1>(name, args)?;
            Ok(json!(serde_json::to_string(v)?))
        }
        "json.parse" => {
            let [v] = take::<1>(name, args)?;
            Ok(serde_json::from_str(&stringify(v))?)
        }

        // -- array --
        "array.get" => {
            let [arr, index] = take::<2>(name, args)?;
            let i = number(name, 1, index)? as usize;
            Ok(arr.get(i).cloned().unwrap_or(Value::Null))
        }
        "array.length" => {
            let [arr] = take::<1>(name, args)?;
            Ok(json!(arr.as_array().map(Vec::len).unwrap_or(0)))
        }
        "array.join" => {
            let [arr, sep] = take::<2>(name, args)?;
            let joined = arr
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(stringify)
                        .collect::<Vec<_>>()
                        .join(&stringify(sep))
                })
                .unwrap_or_default();
            Ok(json!(joined))
        }

        // -- object --
        "object.get" => {
            let [obj, key] = take::<2>(name, args)?;
            Ok(obj.get(stringify(key)).cloned().unwrap_or(Value::Null))
        }
        "object.create" => {
            let [key, value] = take::<2>(name, args)?;
            Ok(json!({ stringify(key): value.clone() }))
        }

        // -- symbol --
        "symbol.null" => Ok(Value::Null),
        "symbol.undefined" => Ok(Value::Null),

        other => Err(PipeError::UnknownFunction(other.to_string())),
    }
}

fn take<'a, const N: usize>(name: &str, args: &'a [Value]) -> Result<&'a [Value; N], PipeError> {
    args.try_into().map_err(|_| PipeError::BadArity {
        function: name.to_string(),
        expected: N,
        got: args.len(),
    })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn number(name: &str, index: usize, v: &Value) -> Result<f64, PipeError> {
    match v {
        Value::Number(n) => n.as_f64().ok_or_else(|| bad_number(name, index)),
        Value::String(s) => s.parse().map_err(|_| bad_number(name, index)),
        _ => Err(bad_number(name, index)),
    }
}

fn bad_number(name: &str, index: usize) -> PipeError {
    PipeError::BadArgument {
        function: name.to_string(),
        index,
        message: "expected a number".to_string(),
    }
}

fn fold_numbers(name: &str, args: &[Value], op: fn(f64, f64) -> f64) -> Result<Value, PipeError> {
    if args.len() < 2 {
        return Err(PipeError::BadArity {
            function: name.to_string(),
            expected: 2,
            got: args.len(),
        });
    }
    let mut acc = number(name, 0, &args[0])?;
    for (i, arg) in args.iter().enumerate().skip(1) {
        acc = op(acc, number(name, i, arg)?);
    }
    Ok(number_value(acc))
}

/// Keep whole results as integers so mapped counters stay integral.
fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        json!(f as i64)
    } else {
        json!(f)
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "functions_tests.rs"]
mod tests;
