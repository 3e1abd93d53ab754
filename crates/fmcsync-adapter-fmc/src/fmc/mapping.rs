use fmcsync_core::{from_body, to_body, FmcVersion, Item, ItemSchema};
use fmcsync_engine::StoreError;
use serde_json::Value;
use std::collections::BTreeMap;

/// `items` array of a list or bulk response; absent means empty.
pub(super) fn items_of(body: &Value) -> &[Value] {
    body.get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// decode every entry of `items` against the schema.
pub(super) fn decode_items(schema: &ItemSchema, body: &Value) -> Result<Vec<Item>, StoreError> {
    items_of(body)
        .iter()
        .map(|value| from_body(schema, value).map_err(StoreError::from))
        .collect()
}

/// decode a single object response (create or update).
pub(super) fn decode_item(schema: &ItemSchema, body: &Value) -> Result<Item, StoreError> {
    from_body(schema, body).map_err(StoreError::from)
}

/// request body for a bulk create.
pub(super) fn encode_batch(schema: &ItemSchema, items: &[Item]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| to_body(schema, item, false))
            .collect(),
    )
}

/// ids reported by a bulk delete response.
pub(super) fn deleted_ids(body: &Value) -> Vec<String> {
    items_of(body)
        .iter()
        .filter_map(|value| match value.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        })
        .collect()
}

/// true when the listing announces another page.
pub(super) fn has_next_page(body: &Value) -> bool {
    match body.pointer("/paging/next") {
        Some(Value::Array(next)) => !next.is_empty(),
        Some(Value::String(next)) => !next.is_empty(),
        _ => false,
    }
}

pub(super) fn server_version(body: &Value) -> Result<FmcVersion, StoreError> {
    let raw = items_of(body)
        .first()
        .and_then(|item| item.get("serverVersion"))
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Decode("server version response lacks serverVersion".to_string()))?;
    raw.parse()
        .map_err(|err: fmcsync_core::VersionError| StoreError::Decode(err.to_string()))
}

/// domain name -> uuid from the domain info listing.
pub(super) fn domain_map(body: &Value) -> BTreeMap<String, String> {
    items_of(body)
        .iter()
        .filter_map(|domain| {
            let name = domain.get("name")?.as_str()?;
            let uuid = domain.get("uuid")?.as_str()?;
            Some((name.to_string(), uuid.to_string()))
        })
        .collect()
}
