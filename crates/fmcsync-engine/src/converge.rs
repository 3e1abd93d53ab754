//! merge confirmed remote results into recorded state.

use crate::types::{AppliedItem, Outcome};
use fmcsync_core::{Collection, Item, ItemSchema, RuleList};
use std::collections::BTreeSet;

/// what a single remote call reported.
#[derive(Debug, Clone, Copy)]
pub enum ChunkResult<'a> {
    /// bulk create answered with the objects it created.
    Created {
        requested: &'a [Item],
        confirmed: &'a [Item],
    },
    /// bulk (or single) delete answered with the ids it removed.
    Deleted {
        requested: &'a [Item],
        confirmed_ids: &'a [String],
    },
    /// update of one object succeeded.
    Updated { desired: &'a Item, confirmed: &'a Item },
    /// the call failed as a whole.
    Failed { requested: &'a [Item] },
}

/// recorded state that converged results are written into.
pub trait ItemSet {
    /// insert a confirmed item.
    fn record(&mut self, item: Item);
    /// forget the item with a remote id; returns whether one was present.
    fn forget_id(&mut self, id: &str) -> bool;
}

impl ItemSet for Collection {
    fn record(&mut self, item: Item) {
        self.insert(item);
    }

    fn forget_id(&mut self, id: &str) -> bool {
        self.remove_by_id(id).is_some()
    }
}

impl ItemSet for RuleList {
    fn record(&mut self, item: Item) {
        self.push(item);
    }

    fn forget_id(&mut self, id: &str) -> bool {
        let before = self.len();
        self.retain(|rule| rule.id() != Some(id));
        before != self.len()
    }
}

/// apply one chunk result to `state` and return per-item outcomes.
pub fn converge<S: ItemSet>(
    state: &mut S,
    schema: &ItemSchema,
    result: ChunkResult<'_>,
) -> Vec<AppliedItem> {
    match result {
        ChunkResult::Created {
            requested,
            confirmed,
        } => requested
            .iter()
            .enumerate()
            .map(|(index, item)| {
                match match_created(schema, item, index, confirmed).and_then(Item::id) {
                    Some(id) => {
                        let mut created = item.clone();
                        created.id = Some(id.to_string());
                        state.record(created);
                        applied(item, Outcome::Created, Some(id.to_string()))
                    }
                    None => applied(item, Outcome::Failed, None),
                }
            })
            .collect(),
        ChunkResult::Deleted {
            requested,
            confirmed_ids,
        } => {
            let confirmed: BTreeSet<&str> = confirmed_ids.iter().map(String::as_str).collect();
            for id in &confirmed {
                state.forget_id(id);
            }
            requested
                .iter()
                .map(|item| match item.id() {
                    Some(id) if confirmed.contains(id) => applied(item, Outcome::Deleted, None),
                    _ => applied(item, Outcome::Failed, item.id.clone()),
                })
                .collect()
        }
        ChunkResult::Updated { desired, confirmed } => {
            let mut updated = desired.clone();
            if let Some(id) = confirmed.id() {
                updated.id = Some(id.to_string());
            }
            let id = updated.id.clone();
            state.record(updated);
            vec![applied(desired, Outcome::Updated, id)]
        }
        ChunkResult::Failed { requested } => requested
            .iter()
            .map(|item| applied(item, Outcome::Failed, item.id.clone()))
            .collect(),
    }
}

/// [`converge`] for a position-significant rule list: created rules are
/// appended in request order.
pub fn converge_ordered(
    state: &mut RuleList,
    schema: &ItemSchema,
    result: ChunkResult<'_>,
) -> Vec<AppliedItem> {
    converge(state, schema, result)
}

/// find the confirmed object for a requested item: by name when names are
/// remote attributes, otherwise by position.
///
/// Local names never reach the remote, so any name it echoes back is its own
/// and says nothing about which request it answers.
fn match_created<'a>(
    schema: &ItemSchema,
    item: &Item,
    index: usize,
    confirmed: &'a [Item],
) -> Option<&'a Item> {
    if !schema.send_name {
        return confirmed.get(index);
    }
    confirmed.iter().find(|c| c.name == item.name).or_else(|| {
        confirmed
            .get(index)
            .filter(|c| c.name.is_empty() || c.name == item.name)
    })
}

fn applied(item: &Item, outcome: Outcome, id: Option<String>) -> AppliedItem {
    AppliedItem {
        name: item.name.clone(),
        outcome,
        id,
    }
}
