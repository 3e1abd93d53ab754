//! engine orchestration: load, diff, chunk, converge, apply.

mod chunker;
mod converge;
mod gate;
mod loader;
mod ordered;
mod pipeline;
mod planner;
mod registry;
mod state;
mod types;

use anyhow::{anyhow, Result};
use fmcsync_core::ValidationReport;

#[cfg(test)]
mod tests;

pub use chunker::{
    chunk, create_chunks, delete_chunks, encode_id, id_filter, Chunk, ChunkLimits, OpSize,
    BULK_SIZE_CREATE, BULK_SIZE_DELETE, MAX_PAYLOAD_SIZE, MAX_URL_PARAM_LENGTH,
};
pub use converge::{converge, converge_ordered, ChunkResult, ItemSet};
pub use gate::{require_version, select_delete_mode, DeleteMode};
pub use loader::{load_config, Desired, DesiredConfig, DesiredResource};
pub use ordered::rules_match;
pub use pipeline::{ApplyOptions, BatchLimits, Reconciler};
pub use planner::{carry_ids, diff, diff_fields, Diff, FieldChange, ItemUpdate};
pub use registry::builtin_registry;
pub use state::{RecordedItems, ResourceState, StateData, StateStore};
pub use types::{
    AppliedItem, ApplyError, ApplyReport, ItemStore, Outcome, Scope, StoreError,
};

/// helper to format a validation report into a Result.
pub fn report_to_result(report: ValidationReport) -> Result<()> {
    if report.is_ok() {
        return Ok(());
    }

    let mut message = String::from("validation failed:\n");
    for error in report.errors {
        message.push_str(&format!("- {error}\n"));
    }
    Err(anyhow!(message))
}
