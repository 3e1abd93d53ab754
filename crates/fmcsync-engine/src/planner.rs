//! diff of desired items against recorded state.

use fmcsync_core::{Collection, Item, ItemSchema, JsonMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// field-level change for an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// field name within the item.
    pub field: String,
    /// previous value from recorded state.
    pub from: Value,
    /// desired value from the plan.
    pub to: Value,
}

/// id-matched pair whose managed fields differ.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub prior: Item,
    pub desired: Item,
    pub changes: Vec<FieldChange>,
}

/// create / update / delete partitions of one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    pub create: Vec<Item>,
    pub update: Vec<ItemUpdate>,
    pub delete: Vec<Item>,
    /// plan items that need no remote call.
    pub unchanged: Vec<String>,
    /// recorded items without an id; removed locally without a remote call.
    pub dropped: Vec<String>,
}

impl Diff {
    /// true when no remote call is needed.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// copy recorded ids onto same-named plan items that have none.
pub fn carry_ids(plan: &mut Collection, state: &Collection) {
    for item in plan.iter_mut() {
        if item.id.is_some() {
            continue;
        }
        if let Some(recorded) = state.get(&item.name) {
            item.id.clone_from(&recorded.id);
        }
    }
}

/// partition plan and state into create, update and delete sets.
pub fn diff(plan: &Collection, state: &Collection, schema: &ItemSchema) -> Diff {
    let mut result = Diff::default();
    let plan_ids = plan.ids();

    for recorded in state.iter() {
        match recorded.id() {
            None => result.dropped.push(recorded.name.clone()),
            Some(id) if !plan_ids.contains(id) => result.delete.push(recorded.clone()),
            Some(_) => {}
        }
    }

    for desired in plan.iter() {
        let Some(id) = desired.id() else {
            result.create.push(desired.clone());
            continue;
        };
        let prior = state
            .find_by_id(id)
            .cloned()
            .unwrap_or_else(|| Item::new(desired.name.clone(), JsonMap::new()).with_id(id));
        let changes = diff_fields(&prior.fields, &desired.fields, schema);
        if changes.is_empty() {
            result.unchanged.push(desired.name.clone());
        } else {
            result.update.push(ItemUpdate {
                prior,
                desired: desired.clone(),
                changes,
            });
        }
    }

    result
}

/// compare only fields the plan sets; computed fields never count.
pub fn diff_fields(existing: &JsonMap, desired: &JsonMap, schema: &ItemSchema) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    for (field, to) in desired {
        if schema.is_computed(field) {
            continue;
        }
        let from = existing.get(field).cloned().unwrap_or(Value::Null);
        if &from != to {
            changes.push(FieldChange {
                field: field.clone(),
                from,
                to: to.clone(),
            });
        }
    }
    changes
}
