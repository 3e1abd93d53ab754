//! position-significant rule lists: delete every recorded rule, then
//! recreate the plan in order, one bulk insert per section run.

use crate::gate::{require_version, select_delete_mode};
use crate::pipeline::{finish, refresh_fields, remote_error, ApplyOptions, Reconciler};
use crate::planner::diff_fields;
use crate::types::{ApplyError, ApplyReport, Outcome, Scope};
use fmcsync_core::{Item, ItemSchema, RuleList};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// true when recorded rules already equal the plan, position by position.
pub fn rules_match(plan: &RuleList, state: &RuleList, schema: &ItemSchema) -> bool {
    plan.len() == state.len()
        && plan.iter().zip(state.iter()).all(|(desired, recorded)| {
            recorded.id().is_some()
                && desired.name == recorded.name
                && desired.section == recorded.section
                && diff_fields(&recorded.fields, &desired.fields, schema).is_empty()
        })
}

impl Reconciler<'_> {
    /// refresh recorded rules; rules gone remotely are forgotten.
    pub async fn read_rules(
        &self,
        scope: Scope<'_>,
        state: &mut RuleList,
    ) -> Result<Vec<String>, ApplyError> {
        let Some(remote) = self.list_or_gone(scope).await? else {
            let gone = state.iter().map(|rule| rule.name.clone()).collect();
            *state = RuleList::new();
            return Ok(gone);
        };
        let mut gone = Vec::new();
        state.retain(|rule| match rule.id() {
            Some(id) if !remote.iter().any(|r| r.id() == Some(id)) => {
                gone.push(rule.name.clone());
                false
            }
            _ => true,
        });
        for rule in state.iter_mut() {
            if let Some(found) = rule.id().and_then(|id| remote.iter().find(|r| r.id() == Some(id))) {
                refresh_fields(scope, rule, found);
            }
        }
        for name in &gone {
            warn!(resource = scope.resource, name = %name, "rule vanished from remote");
        }
        Ok(gone)
    }

    /// replace the remote rule list with `plan` unless it already matches.
    pub async fn apply_rules(
        &self,
        scope: Scope<'_>,
        plan: &RuleList,
        state: &mut RuleList,
        options: ApplyOptions,
    ) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        let version = self.version(scope, &mut report).await?;
        require_version(scope, version)?;

        if rules_match(plan, state, scope.schema) {
            for rule in plan.iter().zip(state.iter()) {
                report.record(rule.0.name.clone(), Outcome::Unchanged, rule.1.id.clone());
            }
            return Ok(report);
        }

        let planned: BTreeSet<&str> = plan.iter().map(|rule| rule.name.as_str()).collect();
        let removed = state
            .iter()
            .filter(|rule| !planned.contains(rule.name.as_str()))
            .count();
        if !options.allow_delete && removed > 0 {
            return Err(ApplyError::DeleteNotAllowed {
                resource: scope.resource.to_string(),
                count: removed,
            });
        }

        state.retain(|rule| rule.id().is_some());
        let recorded: Vec<Item> = state.iter().cloned().collect();
        info!(
            resource = scope.resource,
            delete = recorded.len(),
            create = plan.len(),
            "rewriting rule list"
        );
        let mode = select_delete_mode(scope.schema, version);
        self.delete_items(scope, mode, recorded, state, &mut report)
            .await?;
        if !state.is_empty() {
            // recreating on top of leftovers would duplicate rules
            return finish(scope, report);
        }

        let rules: Vec<Item> = plan.iter().cloned().collect();
        self.create_items(scope, rules, state, &mut report).await?;
        finish(scope, report)
    }

    /// delete every recorded rule.
    pub async fn destroy_rules(
        &self,
        scope: Scope<'_>,
        state: &mut RuleList,
    ) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        let version = self.version(scope, &mut report).await?;
        state.retain(|rule| rule.id().is_some());
        let recorded: Vec<Item> = state.iter().cloned().collect();
        let mode = select_delete_mode(scope.schema, version);
        self.delete_items(scope, mode, recorded, state, &mut report)
            .await?;
        finish(scope, report)
    }

    /// adopt the remote rules under `scope.parent` in listing order.
    ///
    /// Names are local only, so rules are labelled `rule_1`, `rule_2`, ... and
    /// placed in the first declared section.
    pub async fn import_rules(&self, scope: Scope<'_>) -> Result<RuleList, ApplyError> {
        let remote = self.store.list(scope).await.map_err(|source| {
            remote_error(scope, "import", &mut ApplyReport::default(), source)
        })?;
        let section = scope.schema.sections.first().cloned();
        let rules: RuleList = remote
            .into_iter()
            .enumerate()
            .map(|(index, mut rule)| {
                rule.name = format!("rule_{}", index + 1);
                rule.section.clone_from(&section);
                rule
            })
            .collect();
        info!(resource = scope.resource, count = rules.len(), "imported rules");
        Ok(rules)
    }
}
