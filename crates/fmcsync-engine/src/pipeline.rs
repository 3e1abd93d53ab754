//! per-resource reconciliation entry points: read, apply, destroy, import.

use crate::chunker::{create_chunks, delete_chunks, ChunkLimits};
use crate::converge::{converge, ChunkResult, ItemSet};
use crate::gate::{require_version, select_delete_mode, DeleteMode};
use crate::planner::{carry_ids, diff};
use crate::types::{ApplyError, ApplyReport, ItemStore, Outcome, Scope, StoreError};
use fmcsync_core::{Collection, FmcVersion, ImportId, Item};
use tracing::{debug, info, warn};

/// chunk ceilings used by a reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub create: ChunkLimits,
    pub delete: ChunkLimits,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            create: ChunkLimits::create(),
            delete: ChunkLimits::delete(),
        }
    }
}

/// knobs for apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// permit remote deletions of items missing from the plan.
    pub allow_delete: bool,
}

/// drives one item store; every remote call is awaited before the next.
pub struct Reconciler<'a> {
    pub(crate) store: &'a dyn ItemStore,
    pub(crate) limits: BatchLimits,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn ItemStore) -> Self {
        Self {
            store,
            limits: BatchLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// refresh recorded state from the remote listing.
    ///
    /// Returns the names of recorded items that no longer exist remotely.
    pub async fn read(
        &self,
        scope: Scope<'_>,
        state: &mut Collection,
    ) -> Result<Vec<String>, ApplyError> {
        let Some(remote) = self.list_or_gone(scope).await? else {
            let gone = state.names().map(str::to_string).collect();
            *state = Collection::new();
            return Ok(gone);
        };
        let mut gone = Vec::new();
        state.retain(|item| match item.id() {
            Some(id) if !remote.iter().any(|r| r.id() == Some(id)) => {
                gone.push(item.name.clone());
                false
            }
            _ => true,
        });
        for item in state.iter_mut() {
            if let Some(found) = item.id().and_then(|id| remote.iter().find(|r| r.id() == Some(id))) {
                refresh_fields(scope, item, found);
            }
        }
        for name in &gone {
            warn!(resource = scope.resource, name = %name, "item vanished from remote");
        }
        Ok(gone)
    }

    /// reconcile a named collection towards `plan`.
    ///
    /// `state` reflects every confirmed remote change, also when an error is
    /// returned.
    pub async fn apply(
        &self,
        scope: Scope<'_>,
        plan: &Collection,
        state: &mut Collection,
        options: ApplyOptions,
    ) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        let version = self.version(scope, &mut report).await?;
        require_version(scope, version)?;

        let mut plan = plan.clone();
        carry_ids(&mut plan, state);
        let diff = diff(&plan, state, scope.schema);
        if !options.allow_delete && !diff.delete.is_empty() {
            return Err(ApplyError::DeleteNotAllowed {
                resource: scope.resource.to_string(),
                count: diff.delete.len(),
            });
        }
        info!(
            resource = scope.resource,
            create = diff.create.len(),
            update = diff.update.len(),
            delete = diff.delete.len(),
            "applying"
        );

        for name in &diff.dropped {
            debug!(resource = scope.resource, name = %name, "dropping item without id");
            state.remove(name);
        }
        for name in &diff.unchanged {
            let id = plan.get(name).and_then(|item| item.id.clone());
            report.record(name.clone(), Outcome::Unchanged, id);
        }

        let mode = select_delete_mode(scope.schema, version);
        self.delete_items(scope, mode, diff.delete, state, &mut report)
            .await?;
        self.create_items(scope, diff.create, state, &mut report)
            .await?;

        for update in &diff.update {
            let fields: Vec<&str> = update.changes.iter().map(|c| c.field.as_str()).collect();
            debug!(resource = scope.resource, name = %update.desired.name, ?fields, "updating");
            match self.store.update_one(scope, &update.desired).await {
                Ok(confirmed) => report.extend(converge(
                    state,
                    scope.schema,
                    ChunkResult::Updated {
                        desired: &update.desired,
                        confirmed: &confirmed,
                    },
                )),
                Err(source) => {
                    report.extend(converge(
                        state,
                        scope.schema,
                        ChunkResult::Failed {
                            requested: std::slice::from_ref(&update.desired),
                        },
                    ));
                    return Err(remote_error(scope, "update", &mut report, source));
                }
            }
        }

        finish(scope, report)
    }

    /// delete every recorded item of a named collection.
    pub async fn destroy(
        &self,
        scope: Scope<'_>,
        state: &mut Collection,
    ) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        let version = self.version(scope, &mut report).await?;
        state.retain(|item| item.id().is_some());
        let recorded: Vec<Item> = state.iter().cloned().collect();
        let mode = select_delete_mode(scope.schema, version);
        self.delete_items(scope, mode, recorded, state, &mut report)
            .await?;
        finish(scope, report)
    }

    /// build recorded state for existing remote objects.
    pub async fn import(
        &self,
        scope: Scope<'_>,
        import: &ImportId,
    ) -> Result<Collection, ApplyError> {
        let remote = self.store.list(scope).await.map_err(|source| {
            remote_error(scope, "import", &mut ApplyReport::default(), source)
        })?;

        let mut imported = Collection::new();
        let mut missing = Vec::new();
        match import {
            ImportId::Names { names, .. } => {
                for name in names {
                    match remote.iter().find(|item| &item.name == name) {
                        Some(found) => {
                            imported.insert(found.clone());
                        }
                        None => missing.push(name.clone()),
                    }
                }
            }
            ImportId::Id { id, .. } => match remote.iter().find(|item| item.id() == Some(id)) {
                Some(found) => {
                    imported.insert(found.clone());
                }
                None => missing.push(id.clone()),
            },
        }

        if !missing.is_empty() {
            return Err(ApplyError::Missing {
                resource: scope.resource.to_string(),
                names: missing,
            });
        }
        info!(resource = scope.resource, count = imported.len(), "imported");
        Ok(imported)
    }

    pub(crate) async fn version(
        &self,
        scope: Scope<'_>,
        report: &mut ApplyReport,
    ) -> Result<FmcVersion, ApplyError> {
        let version = self
            .store
            .server_version()
            .await
            .map_err(|source| remote_error(scope, "version lookup", report, source))?;
        debug!(%version, "server version");
        Ok(version)
    }

    /// list remote objects; `None` when the collection itself is gone.
    pub(crate) async fn list_or_gone(
        &self,
        scope: Scope<'_>,
    ) -> Result<Option<Vec<Item>>, ApplyError> {
        match self.store.list(scope).await {
            Ok(items) => Ok(Some(items)),
            Err(err) if err.is_not_found() => {
                warn!(resource = scope.resource, "remote collection not found");
                Ok(None)
            }
            Err(source) => Err(remote_error(
                scope,
                "read",
                &mut ApplyReport::default(),
                source,
            )),
        }
    }

    pub(crate) async fn delete_items<S: ItemSet>(
        &self,
        scope: Scope<'_>,
        mode: DeleteMode,
        items: Vec<Item>,
        state: &mut S,
        report: &mut ApplyReport,
    ) -> Result<(), ApplyError> {
        if items.is_empty() {
            return Ok(());
        }
        match mode {
            DeleteMode::Bulk => {
                for chunk in delete_chunks(items, &self.limits.delete) {
                    let ids: Vec<String> = chunk.ops.iter().filter_map(|i| i.id.clone()).collect();
                    info!(resource = scope.resource, count = ids.len(), "bulk delete");
                    let confirmed = match self.store.delete_batch(scope, &ids).await {
                        Ok(confirmed) => confirmed,
                        Err(err) if err.is_not_found() => {
                            warn!(resource = scope.resource, "bulk delete found nothing; treating as absent");
                            ids.clone()
                        }
                        Err(source) => {
                            report.extend(converge(
                                state,
                                scope.schema,
                                ChunkResult::Failed {
                                    requested: &chunk.ops,
                                },
                            ));
                            return Err(remote_error(scope, "delete", report, source));
                        }
                    };
                    if confirmed.len() < ids.len() {
                        warn!(
                            resource = scope.resource,
                            requested = ids.len(),
                            confirmed = confirmed.len(),
                            "bulk delete partially confirmed"
                        );
                    }
                    report.extend(converge(
                        state,
                        scope.schema,
                        ChunkResult::Deleted {
                            requested: &chunk.ops,
                            confirmed_ids: &confirmed,
                        },
                    ));
                }
            }
            DeleteMode::Sequential => {
                for item in &items {
                    let Some(id) = item.id() else {
                        continue;
                    };
                    debug!(resource = scope.resource, name = %item.name, id, "delete");
                    match self.store.delete_one(scope, id).await {
                        Ok(()) => {}
                        Err(err) if err.is_not_found() => {
                            warn!(resource = scope.resource, name = %item.name, "already absent");
                        }
                        Err(source) => {
                            report.extend(converge(
                                state,
                                scope.schema,
                                ChunkResult::Failed {
                                    requested: std::slice::from_ref(item),
                                },
                            ));
                            return Err(remote_error(scope, "delete", report, source));
                        }
                    }
                    report.extend(converge(
                        state,
                        scope.schema,
                        ChunkResult::Deleted {
                            requested: std::slice::from_ref(item),
                            confirmed_ids: &[id.to_string()],
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn create_items<S: ItemSet>(
        &self,
        scope: Scope<'_>,
        items: Vec<Item>,
        state: &mut S,
        report: &mut ApplyReport,
    ) -> Result<(), ApplyError> {
        for chunk in create_chunks(scope.schema, items, &self.limits.create) {
            info!(
                resource = scope.resource,
                count = chunk.ops.len(),
                section = chunk.section.as_ref().map(|s| s.as_str()),
                "bulk create"
            );
            match self
                .store
                .create_batch(scope, &chunk.ops, chunk.section.as_ref())
                .await
            {
                Ok(confirmed) => report.extend(converge(
                    state,
                    scope.schema,
                    ChunkResult::Created {
                        requested: &chunk.ops,
                        confirmed: &confirmed,
                    },
                )),
                Err(source) => {
                    report.extend(converge(
                        state,
                        scope.schema,
                        ChunkResult::Failed {
                            requested: &chunk.ops,
                        },
                    ));
                    return Err(remote_error(scope, "create", report, source));
                }
            }
        }
        Ok(())
    }
}

/// copy remote values for the fields this item records plus computed ones.
pub(crate) fn refresh_fields(scope: Scope<'_>, item: &mut Item, remote: &Item) {
    let tracked: Vec<String> = item
        .fields
        .keys()
        .cloned()
        .chain(
            scope
                .schema
                .fields
                .iter()
                .filter(|(_, field)| field.computed)
                .map(|(name, _)| name.clone()),
        )
        .collect();
    for field in tracked {
        match remote.fields.get(&field) {
            Some(value) => {
                item.fields.insert(field, value.clone());
            }
            None => {
                item.fields.remove(&field);
            }
        }
    }
}

pub(crate) fn remote_error(
    scope: Scope<'_>,
    action: &'static str,
    report: &mut ApplyReport,
    source: StoreError,
) -> ApplyError {
    warn!(resource = scope.resource, action, error = %source, "remote call failed");
    ApplyError::Remote {
        resource: scope.resource.to_string(),
        action,
        report: std::mem::take(report),
        source,
    }
}

/// turn unconfirmed items into an error carrying the report.
pub(crate) fn finish(scope: Scope<'_>, report: ApplyReport) -> Result<ApplyReport, ApplyError> {
    let unconfirmed = report.failed();
    if unconfirmed.is_empty() {
        info!(
            resource = scope.resource,
            created = report.count(Outcome::Created),
            updated = report.count(Outcome::Updated),
            deleted = report.count(Outcome::Deleted),
            "applied"
        );
        return Ok(report);
    }
    Err(ApplyError::Incomplete {
        resource: scope.resource.to_string(),
        report,
        unconfirmed,
    })
}
