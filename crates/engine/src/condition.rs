//! Condition evaluation against an execution context.

use serde_json::{Map, Value};

use crate::models::{Condition, ConditionOperator};
use crate::template::lookup_in_map;

/// Evaluate `context[condition.field] <operator> condition.value`.
///
/// A missing field evaluates as `null`.
pub fn evaluate(condition: &Condition, context: &Map<String, Value>) -> bool {
    let actual = lookup_in_map(context, &condition.field).unwrap_or(&Value::Null);
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => loosely_equal(actual, expected),
        ConditionOperator::NotEquals => !loosely_equal(actual, expected),
        ConditionOperator::GreaterThan => compare_numbers(actual, expected, |a, b| a > b),
        ConditionOperator::LessThan => compare_numbers(actual, expected, |a, b| a < b),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::IsEmpty => is_empty(actual),
        ConditionOperator::IsNotEmpty => !is_empty(actual),
    }
}

/// Equality that tolerates the string/number/bool mixing form builders produce.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }

    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            match s.to_ascii_lowercase().as_str() {
                "true" => *b,
                "false" => !*b,
                _ => false,
            }
        }
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Numeric comparison; anything that is not a number compares false.
fn compare_numbers(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Substring for strings, membership for arrays, key presence for objects.
fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => match expected {
            Value::String(t) => s.contains(t.as_str()),
            Value::Number(n) => s.contains(&n.to_string()),
            _ => false,
        },
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        Value::Object(obj) => expected.as_str().is_some_and(|key| obj.contains_key(key)),
        _ => false,
    }
}

/// Null, empty string, or empty collection.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
