//! `{{path.to.field}}` placeholder resolution for action params.
//!
//! Paths are looked up in the execution context first, then in the payload
//! of the entity that triggered the execution (e.g. `{{agent.email}}`).
//! A string that is exactly one placeholder resolves to the raw JSON value;
//! placeholders embedded in longer text are interpolated as strings, and
//! unresolved ones render as the empty string.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

fn full_template_regex() -> &'static Regex {
    static FULL: OnceLock<Regex> = OnceLock::new();
    FULL.get_or_init(|| Regex::new(r"^\s*\{\{\s*([^{}]+?)\s*\}\}\s*$").expect("valid regex"))
}

fn template_regex() -> &'static Regex {
    static TEMPLATE: OnceLock<Regex> = OnceLock::new();
    TEMPLATE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid regex"))
}

/// Where placeholders are looked up.
#[derive(Debug, Clone, Copy)]
pub struct TemplateScope<'a> {
    pub context: &'a Map<String, Value>,
    pub trigger: &'a Value,
}

impl<'a> TemplateScope<'a> {
    pub fn lookup(&self, path: &str) -> Option<&'a Value> {
        lookup_in_map(self.context, path).or_else(|| match self.trigger {
            Value::Object(map) => lookup_in_map(map, path),
            _ => None,
        })
    }
}

/// Resolve placeholders in every value of `params`, recursively.
pub fn resolve_params(params: &Map<String, Value>, scope: TemplateScope<'_>) -> Map<String, Value> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), render_value(v, scope)))
        .collect()
}

fn render_value(value: &Value, scope: TemplateScope<'_>) -> Value {
    match value {
        Value::String(s) => render_string(s, scope),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, scope)).collect()),
        Value::Object(obj) => Value::Object(resolve_params(obj, scope)),
        other => other.clone(),
    }
}

fn render_string(template: &str, scope: TemplateScope<'_>) -> Value {
    if let Some(caps) = full_template_regex().captures(template) {
        return scope.lookup(&caps[1]).cloned().unwrap_or(Value::Null);
    }

    let rendered = template_regex().replace_all(template, |caps: &Captures| {
        match scope.lookup(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    });
    Value::String(rendered.into_owned())
}

/// Follow a dotted path through objects (by key) and arrays (by index).
///
/// A key that itself contains dots is matched before the path is split.
pub fn lookup_in_map<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(v) = map.get(path) {
        return Some(v);
    }
    let (head, rest) = path.split_once('.')?;
    let mut current = map.get(head)?;
    for segment in rest.split('.') {
        current = match current {
            Value::Object(obj) => obj.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at a dotted path, creating intermediate objects.
pub fn set_in_map(map: &mut Map<String, Value>, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else { return };

    let mut current = map;
    for segment in parents {
        let entry = current
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else { return };
        current = next;
    }
    current.insert((*last).to_owned(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn whole_placeholder_keeps_json_type() {
        let context = obj(json!({ "premium": 1200.5, "policy": { "ids": ["P-1", "P-2"] } }));
        let trigger = Value::Null;
        let scope = TemplateScope { context: &context, trigger: &trigger };

        let out = resolve_params(
            &obj(json!({ "amount": "{{premium}}", "first": "{{ policy.ids.0 }}" })),
            scope,
        );
        assert_eq!(out["amount"], json!(1200.5));
        assert_eq!(out["first"], json!("P-1"));
    }

    #[test]
    fn falls_back_to_trigger_payload() {
        let context = obj(json!({ "stage": "quoted" }));
        let trigger = json!({ "agent": { "email": "ana@broker.test", "name": "Ana" } });
        let scope = TemplateScope { context: &context, trigger: &trigger };

        let out = resolve_params(
            &obj(json!({
                "to": "{{agent.email}}",
                "body": "Hi {{agent.name}}, quote is {{stage}}{{missing}}.",
                "nested": [{ "cc": "{{agent.email}}" }]
            })),
            scope,
        );
        assert_eq!(out["to"], "ana@broker.test");
        assert_eq!(out["body"], "Hi Ana, quote is quoted.");
        assert_eq!(out["nested"][0]["cc"], "ana@broker.test");
    }

    #[test]
    fn unresolved_whole_placeholder_is_null() {
        let context = Map::new();
        let trigger = Value::Null;
        let scope = TemplateScope { context: &context, trigger: &trigger };
        let out = resolve_params(&obj(json!({ "to": "{{nobody.email}}" })), scope);
        assert_eq!(out["to"], Value::Null);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut map = obj(json!({ "quote": "scalar" }));
        set_in_map(&mut map, "customer.status", json!("renewed"));
        set_in_map(&mut map, "quote.state", json!("won"));
        assert_eq!(Value::Object(map), json!({
            "customer": { "status": "renewed" },
            "quote": { "state": "won" }
        }));
    }
}
