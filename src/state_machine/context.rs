//! Dotted-path helpers over JSON object contexts.

use super::errors::{invalid_context_path, StateMachineError, StateMachineResult};
use serde_json::{Map, Value};

pub type Context = Map<String, Value>;

/// Convert a JSON value into a context object; `null` becomes an empty context
pub fn into_context(value: Value) -> StateMachineResult<Context> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Context::new()),
        other => Err(StateMachineError::ContextNotObject {
            found: json_type_name(&other).to_string(),
        }),
    }
}

/// Read `a.b.c` from the context
pub fn get_path<'a>(context: &'a Context, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = context.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write `a.b.c` into the context, creating intermediate objects as needed
pub fn set_path(context: &mut Context, path: &str, value: Value) -> StateMachineResult<()> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid_context_path(path, "empty segment"));
    }

    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| invalid_context_path(path, "empty path"))?;

    let mut current = context;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Context::new()));
        current = match entry {
            Value::Object(map) => map,
            other => {
                return Err(invalid_context_path(
                    path,
                    format!("'{segment}' holds a {} value", json_type_name(other)),
                ))
            }
        };
    }

    current.insert(last.to_string(), value);
    Ok(())
}

/// Shallow merge: top-level keys in `updates` overwrite those in `context`
pub fn merge_shallow(context: &mut Context, updates: &Context) {
    for (key, value) in updates {
        context.insert(key.clone(), value.clone());
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
