//! mapping between items and remote json bodies, driven by the schema descriptor.

use crate::ir::{Item, ItemSchema, JsonMap};
use serde_json::{Map, Value};
use thiserror::Error;

/// errors raised while decoding a remote object.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BodyError {
    #[error("expected json object, got {0}")]
    NotAnObject(String),
    #[error("remote object has no id")]
    MissingId,
    #[error("remote object {0} has no name")]
    MissingName(String),
}

/// build the request body for an item.
pub fn to_body(schema: &ItemSchema, item: &Item, with_id: bool) -> Value {
    let mut body = Map::new();
    if with_id {
        if let Some(id) = item.id() {
            body.insert("id".to_string(), Value::String(id.to_string()));
        }
    }
    if schema.send_name {
        body.insert("name".to_string(), Value::String(item.name.clone()));
    }
    if let Some(object_type) = &schema.object_type {
        body.insert("type".to_string(), Value::String(object_type.clone()));
    }
    for (field, field_schema) in schema.managed_fields() {
        let Some(value) = item.fields.get(field) else {
            continue;
        };
        set_path(&mut body, field_schema.remote_path(field), value.clone());
    }
    Value::Object(body)
}

/// serialized size of the item's request body in bytes.
pub fn body_len(schema: &ItemSchema, item: &Item) -> usize {
    to_body(schema, item, false).to_string().len()
}

/// decode a remote object into an item.
///
/// The name is left empty for schemas whose names are local labels; callers
/// assign one.
pub fn from_body(schema: &ItemSchema, value: &Value) -> Result<Item, BodyError> {
    let object = value
        .as_object()
        .ok_or_else(|| BodyError::NotAnObject(value_kind(value).to_string()))?;
    let id = match object.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(BodyError::MissingId),
    };
    let name = match object.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None if schema.send_name => return Err(BodyError::MissingName(id)),
        None => String::new(),
    };

    let mut fields = JsonMap::new();
    for (field, field_schema) in &schema.fields {
        if let Some(found) = get_path(value, field_schema.remote_path(field)) {
            if !found.is_null() {
                fields.insert(field.clone(), found.clone());
            }
        }
    }

    Ok(Item {
        name,
        id: Some(id),
        section: None,
        fields,
    })
}

/// look up a dotted path in a json value.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = current.get(segment)?;
    }
    Some(current)
}

fn set_path(body: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = body;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
