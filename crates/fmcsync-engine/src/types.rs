//! core engine types and item-store contract.

use async_trait::async_trait;
use fmcsync_core::{BodyError, FmcVersion, Item, ItemSchema, Section};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// target of one remote call: the item type plus its domain and parent.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// resource name used in diagnostics.
    pub resource: &'a str,
    pub type_name: &'a str,
    pub schema: &'a ItemSchema,
    /// domain name; `None` selects the login domain.
    pub domain: Option<&'a str>,
    /// parent object id for nested paths.
    pub parent: Option<&'a str>,
}

/// failure reported by an item store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{method} {path} returned {status}: {message}")]
    Status {
        method: String,
        path: String,
        status: u16,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0}")]
    Config(String),
}

impl StoreError {
    /// http status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<BodyError> for StoreError {
    fn from(err: BodyError) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// contract for the remote system holding the canonical objects.
///
/// Calls either fully succeed, returning what the remote confirmed, or fail
/// for the whole batch.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn server_version(&self) -> Result<FmcVersion, StoreError>;
    async fn list(&self, scope: Scope<'_>) -> Result<Vec<Item>, StoreError>;
    /// bulk create; returns the created objects with their remote ids.
    async fn create_batch(
        &self,
        scope: Scope<'_>,
        items: &[Item],
        section: Option<&Section>,
    ) -> Result<Vec<Item>, StoreError>;
    async fn update_one(&self, scope: Scope<'_>, item: &Item) -> Result<Item, StoreError>;
    /// bulk delete; returns the ids the remote reports as deleted.
    async fn delete_batch(&self, scope: Scope<'_>, ids: &[String])
        -> Result<Vec<String>, StoreError>;
    async fn delete_one(&self, scope: Scope<'_>, id: &str) -> Result<(), StoreError>;
}

/// per-item reconciliation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
    Failed,
}

/// result for a single item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedItem {
    pub name: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// remote id after the operation, if any.
    pub id: Option<String>,
}

/// aggregated apply report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied: Vec<AppliedItem>,
}

impl ApplyReport {
    pub fn record(&mut self, name: impl Into<String>, outcome: Outcome, id: Option<String>) {
        self.applied.push(AppliedItem {
            name: name.into(),
            outcome,
            id,
        });
    }

    pub fn extend(&mut self, items: Vec<AppliedItem>) {
        self.applied.extend(items);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.applied.iter().filter(|a| a.outcome == outcome).count()
    }

    pub fn failed(&self) -> Vec<String> {
        self.applied
            .iter()
            .filter(|a| a.outcome == Outcome::Failed)
            .map(|a| a.name.clone())
            .collect()
    }

    /// true when nothing was created, updated or deleted.
    pub fn is_noop(&self) -> bool {
        self.applied
            .iter()
            .all(|a| a.outcome == Outcome::Unchanged)
    }
}

/// failure of a reconciliation operation.
///
/// State mutated before the failure stays consistent with the remote and must
/// still be persisted by the caller.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{resource}: {action} failed: {source}")]
    Remote {
        resource: String,
        action: &'static str,
        report: ApplyReport,
        source: StoreError,
    },
    #[error("{resource}: remote did not confirm {}", .unconfirmed.join(", "))]
    Incomplete {
        resource: String,
        report: ApplyReport,
        unconfirmed: Vec<String>,
    },
    #[error("{resource}: {type_name} requires FMC {required} or newer (connected: {actual})")]
    Unsupported {
        resource: String,
        type_name: String,
        required: FmcVersion,
        actual: FmcVersion,
    },
    #[error("{resource}: plan deletes {count} item(s); re-run with --allow-delete")]
    DeleteNotAllowed { resource: String, count: usize },
    #[error("{resource}: {names:?} not found on the remote")]
    Missing { resource: String, names: Vec<String> },
}

impl ApplyError {
    /// partial report collected before the failure.
    pub fn report(&self) -> Option<&ApplyReport> {
        match self {
            ApplyError::Remote { report, .. } | ApplyError::Incomplete { report, .. } => {
                Some(report)
            }
            _ => None,
        }
    }
}
