//! server-version gates.

use crate::types::{ApplyError, Scope};
use fmcsync_core::{BulkDelete, FmcVersion, ItemSchema};

/// how deletions are issued for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// chunked `?bulk=true&filter=ids:` requests.
    Bulk,
    /// one request per id; not-found counts as deleted.
    Sequential,
}

/// pick the delete mode for a type on the connected server.
pub fn select_delete_mode(schema: &ItemSchema, version: FmcVersion) -> DeleteMode {
    match schema.bulk_delete {
        BulkDelete::Always => DeleteMode::Bulk,
        BulkDelete::Unsupported => DeleteMode::Sequential,
        BulkDelete::Since(minimum) if version >= minimum => DeleteMode::Bulk,
        BulkDelete::Since(_) => DeleteMode::Sequential,
    }
}

/// fail before any remote call when the type needs a newer server.
pub fn require_version(scope: Scope<'_>, version: FmcVersion) -> Result<(), ApplyError> {
    match scope.schema.min_version {
        Some(required) if version < required => Err(ApplyError::Unsupported {
            resource: scope.resource.to_string(),
            type_name: scope.type_name.to_string(),
            required,
            actual: version,
        }),
        _ => Ok(()),
    }
}
