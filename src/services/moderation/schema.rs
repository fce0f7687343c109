// Structured Output Schema
// Builds the strict JSON schema sent with schema-constrained completions

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

use crate::models::PolicyJudgement;

pub const POLICY_JUDGEMENT_SCHEMA_NAME: &str = "PolicyJudgement";

/// Strict-mode JSON schema for `T`: every object closed with
/// `additionalProperties: false`, every property required, all refs inlined.
pub fn strict_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    let definitions = value.get("definitions").cloned().unwrap_or(Value::Null);
    inline_refs(&mut value, &definitions);
    close_objects(&mut value);

    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }
    value
}

pub fn policy_judgement_schema() -> Value {
    strict_schema::<PolicyJudgement>()
}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
                if let Some(Value::Object(props)) = map.get("properties") {
                    let keys: Vec<Value> = props.keys().cloned().map(Value::String).collect();
                    map.insert("required".to_string(), Value::Array(keys));
                }
            }
            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(target) = resolve_ref(map, definitions) {
                // Sibling keys (e.g. a field description) win over the definition's own.
                let mut merged: Map<String, Value> = match target {
                    Value::Object(def) => def,
                    other => {
                        *value = other;
                        return;
                    }
                };
                for (k, v) in map.iter() {
                    if k != "$ref" && k != "allOf" {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                *value = Value::Object(merged);
                inline_refs(value, definitions);
                return;
            }
            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| inline_refs(v, definitions)),
        _ => {}
    }
}

/// Definition referenced directly via `$ref` or through a single-element `allOf`.
fn resolve_ref(map: &Map<String, Value>, definitions: &Value) -> Option<Value> {
    let reference = map.get("$ref").and_then(Value::as_str).or_else(|| {
        match map.get("allOf") {
            Some(Value::Array(all_of)) if all_of.len() == 1 => {
                all_of[0].get("$ref").and_then(Value::as_str)
            }
            _ => None,
        }
    })?;
    let name = reference.strip_prefix("#/definitions/")?;
    definitions.get(name).cloned()
}
