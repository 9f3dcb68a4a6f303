// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `{path}` reference resolution against a JSON context.

use serde_json::Value;

/// Resolve a dotted path (`a.b.0.c`) against the context.
///
/// Missing segments resolve to `Null`; numeric segments index arrays.
pub fn resolve_path(path: &str, context: &Value) -> Value {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return Value::Null,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    current.clone()
}

/// True when the whole string is a single `{...}` reference (no
/// surrounding text), meaning the resolved value keeps its JSON type.
pub fn is_lone_reference(text: &str) -> bool {
    text.starts_with('{')
        && text.ends_with('}')
        && text[1..text.len() - 1].find(['{', '}']).is_none()
}

/// Interpolate every `{path}` occurrence into a string.
///
/// Non-string resolved values render via their JSON encoding; `Null`
/// renders as the empty string.
pub fn interpolate(text: &str, context: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close_rel) => {
                let close = open + close_rel;
                let inner = &rest[open + 1..close];
                out.push_str(&render(&resolve_path(inner, context)));
                rest = &rest[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
