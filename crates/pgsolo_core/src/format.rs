//! Helpers for splicing values into SQL text.
//!
//! These guard against a stray quote terminating a literal early. They are not a
//! substitute for parameterized queries and do not make untrusted input safe.
//!
//! Values are `serde_json::Value`, so the string/non-string distinction is explicit:
//! only strings are rewritten, everything else passes through untouched.

use serde_json::Value;

/// SQL `NULL` literal.
pub const NULL: &str = "NULL";

/// Escape every `"` in a string value as `\"`. Non-strings are returned unchanged.
pub fn escape_double_quotes(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace('"', "\\\"")),
        other => other,
    }
}

/// Double every `'` in a string value. Non-strings are returned unchanged.
pub fn escape_single_quotes(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace('\'', "''")),
        other => other,
    }
}

/// Wrap text in single quotes, doubling any quotes inside.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render a value as a SQL string literal, or `NULL` when it is empty.
///
/// Null, `false`, `0`, NaN and `""` all count as empty. Other non-string values are
/// rendered as their JSON text.
pub fn string_or_null(value: &Value) -> String {
    match value {
        v if is_empty_value(v) => NULL.to_string(),
        Value::String(s) => quote_literal(s),
        other => other.to_string(),
    }
}

/// Return the value unchanged, or the text `NULL` when it is empty.
///
/// Note that `0` counts as empty and becomes `NULL`. Callers that need a literal zero
/// must render it themselves.
pub fn number_or_null(value: Value) -> Value {
    if is_empty_value(&value) {
        Value::String(NULL.to_string())
    } else {
        value
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0 || f.is_nan()),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
