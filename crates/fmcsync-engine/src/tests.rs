use super::*;
use async_trait::async_trait;
use fmcsync_core::{
    BulkDelete, FieldSchema, FieldType, FmcVersion, ImportId, Item, ItemSchema, JsonMap,
    RuleList, Section,
};
use fmcsync_core::Collection;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    List,
    Create {
        names: Vec<String>,
        section: Option<String>,
    },
    Update(String),
    DeleteBatch(Vec<String>),
    DeleteOne(String),
}

/// in-memory remote with call recording and injectable failures.
struct FakeStore {
    version: FmcVersion,
    remote: Mutex<Vec<Item>>,
    calls: Mutex<Vec<Call>>,
    next_id: Mutex<u32>,
    /// index of the mutating call that fails with a 500.
    fail_at: Option<usize>,
    mutations: Mutex<usize>,
    /// ids a bulk delete removes without reporting them back.
    unreported: BTreeSet<String>,
    list_not_found: bool,
}

impl FakeStore {
    fn new(version: FmcVersion) -> Self {
        Self {
            version,
            remote: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
            fail_at: None,
            mutations: Mutex::new(0),
            unreported: BTreeSet::new(),
            list_not_found: false,
        }
    }

    fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    fn with_remote(self, items: Vec<Item>) -> Self {
        *self.remote.lock().unwrap() = items;
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::List)
            .collect()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn remote(&self) -> Vec<Item> {
        self.remote.lock().unwrap().clone()
    }

    fn mutate(&self, call: Call, path: &str) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(call);
        let mut count = self.mutations.lock().unwrap();
        let index = *count;
        *count += 1;
        if self.fail_at == Some(index) {
            return Err(StoreError::Status {
                method: "POST".to_string(),
                path: path.to_string(),
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(())
    }

    fn not_found(path: &str) -> StoreError {
        StoreError::Status {
            method: "DELETE".to_string(),
            path: path.to_string(),
            status: 404,
            message: "not found".to_string(),
        }
    }
}

#[async_trait]
impl ItemStore for FakeStore {
    async fn server_version(&self) -> Result<FmcVersion, StoreError> {
        Ok(self.version)
    }

    async fn list(&self, scope: Scope<'_>) -> Result<Vec<Item>, StoreError> {
        self.calls.lock().unwrap().push(Call::List);
        if self.list_not_found {
            return Err(Self::not_found(&scope.schema.path));
        }
        Ok(self.remote())
    }

    async fn create_batch(
        &self,
        scope: Scope<'_>,
        items: &[Item],
        section: Option<&Section>,
    ) -> Result<Vec<Item>, StoreError> {
        self.mutate(
            Call::Create {
                names: items.iter().map(|i| i.name.clone()).collect(),
                section: section.map(|s| s.to_string()),
            },
            &scope.schema.path,
        )?;
        let mut created = Vec::new();
        for item in items {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let mut remote = item.clone().with_id(format!("id-{}", *next));
            remote.section = None;
            if !scope.schema.send_name {
                remote.name = String::new();
            }
            self.remote.lock().unwrap().push(remote.clone());
            created.push(remote);
        }
        // answer in reverse to prove matching is not positional
        if scope.schema.send_name {
            created.reverse();
        }
        Ok(created)
    }

    async fn update_one(&self, scope: Scope<'_>, item: &Item) -> Result<Item, StoreError> {
        let id = item.id().unwrap_or_default().to_string();
        self.mutate(Call::Update(id.clone()), &scope.schema.path)?;
        let mut remote = self.remote.lock().unwrap();
        let Some(slot) = remote.iter_mut().find(|r| r.id() == Some(id.as_str())) else {
            return Err(Self::not_found(&scope.schema.path));
        };
        *slot = item.clone();
        Ok(item.clone())
    }

    async fn delete_batch(
        &self,
        scope: Scope<'_>,
        ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        self.mutate(Call::DeleteBatch(ids.to_vec()), &scope.schema.path)?;
        let mut remote = self.remote.lock().unwrap();
        let present: Vec<String> = ids
            .iter()
            .filter(|id| remote.iter().any(|r| r.id() == Some(id.as_str())))
            .cloned()
            .collect();
        if present.is_empty() {
            return Err(Self::not_found(&scope.schema.path));
        }
        remote.retain(|r| !r.id().is_some_and(|id| present.iter().any(|p| p == id)));
        Ok(present
            .into_iter()
            .filter(|id| !self.unreported.contains(id))
            .collect())
    }

    async fn delete_one(&self, scope: Scope<'_>, id: &str) -> Result<(), StoreError> {
        self.mutate(Call::DeleteOne(id.to_string()), &scope.schema.path)?;
        let mut remote = self.remote.lock().unwrap();
        let before = remote.len();
        remote.retain(|r| r.id() != Some(id));
        if remote.len() == before {
            return Err(Self::not_found(&scope.schema.path));
        }
        Ok(())
    }
}

const V74: FmcVersion = FmcVersion::new(7, 4, 0);
const V72: FmcVersion = FmcVersion::new(7, 2, 0);

fn hosts_schema() -> ItemSchema {
    builtin_registry().get("hosts").unwrap().clone()
}

fn nat_schema() -> ItemSchema {
    builtin_registry().get("ftd_manual_nat_rules").unwrap().clone()
}

fn scope(schema: &ItemSchema) -> Scope<'_> {
    Scope {
        resource: "test",
        type_name: "test",
        schema,
        domain: None,
        parent: Some("policy-1"),
    }
}

fn host(name: &str, value: &str) -> Item {
    let fields: JsonMap = serde_json::from_value(json!({ "value": value })).unwrap();
    Item::new(name, fields)
}

fn hosts(count: usize) -> Collection {
    (0..count)
        .map(|n| host(&format!("h{n:04}"), &format!("10.0.{}.{}", n / 256, n % 256)))
        .collect()
}

fn rule(name: &str, section: &str, nat_type: &str) -> Item {
    let fields: JsonMap = serde_json::from_value(json!({ "nat_type": nat_type })).unwrap();
    Item::new(name, fields).with_section(Section::new(section))
}

fn allow() -> ApplyOptions {
    ApplyOptions { allow_delete: true }
}

#[tokio::test]
async fn apply_creates_then_is_idempotent() {
    let store = FakeStore::new(V74);
    let schema = hosts_schema();
    let plan = hosts(3);
    let mut state = Collection::new();
    let reconciler = Reconciler::new(&store);

    let report = reconciler
        .apply(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.count(Outcome::Created), 3);
    assert_eq!(state.len(), 3);
    for item in state.iter() {
        let remote = store.remote();
        let found = remote.iter().find(|r| r.id() == item.id()).unwrap();
        assert_eq!(found.name, item.name);
    }

    store.clear_calls();
    let again = reconciler
        .apply(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap();
    assert!(again.is_noop());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn apply_chunks_large_creates() {
    let store = FakeStore::new(V74);
    let schema = hosts_schema();
    let mut state = Collection::new();

    Reconciler::new(&store)
        .apply(scope(&schema), &hosts(2500), &mut state, ApplyOptions::default())
        .await
        .unwrap();

    let sizes: Vec<usize> = store
        .mutating_calls()
        .into_iter()
        .map(|call| match call {
            Call::Create { names, .. } => names.len(),
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(sizes, vec![1000, 1000, 500]);
    assert_eq!(state.len(), 2500);
}

#[tokio::test]
async fn failed_chunk_keeps_earlier_progress() {
    let store = FakeStore::new(V74).failing_at(1);
    let schema = hosts_schema();
    let mut state = Collection::new();

    let err = Reconciler::new(&store)
        .apply(scope(&schema), &hosts(1500), &mut state, ApplyOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ApplyError::Remote { action: "create", .. }));
    let report = err.report().unwrap();
    assert_eq!(report.count(Outcome::Created), 1000);
    assert_eq!(report.count(Outcome::Failed), 500);
    assert_eq!(state.len(), 1000);
    assert!(state.iter().all(|item| item.id().is_some()));
}

#[tokio::test]
async fn update_sends_only_changed_items() {
    let store = FakeStore::new(V74);
    let schema = hosts_schema();
    let mut state = Collection::new();
    let reconciler = Reconciler::new(&store);
    reconciler
        .apply(scope(&schema), &hosts(2), &mut state, ApplyOptions::default())
        .await
        .unwrap();
    let changed_id = state.get("h0001").unwrap().id.clone().unwrap();
    store.clear_calls();

    let mut plan = hosts(2);
    plan.insert(host("h0001", "192.0.2.1"));
    let report = reconciler
        .apply(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap();

    assert_eq!(store.mutating_calls(), vec![Call::Update(changed_id.clone())]);
    assert_eq!(report.count(Outcome::Updated), 1);
    assert_eq!(report.count(Outcome::Unchanged), 1);
    let recorded = state.get("h0001").unwrap();
    assert_eq!(recorded.fields["value"], json!("192.0.2.1"));
    assert_eq!(recorded.id(), Some(changed_id.as_str()));
}

#[tokio::test]
async fn deletes_need_permission() {
    let store = FakeStore::new(V74);
    let schema = hosts_schema();
    let mut state = Collection::new();
    let reconciler = Reconciler::new(&store);
    reconciler
        .apply(scope(&schema), &hosts(3), &mut state, ApplyOptions::default())
        .await
        .unwrap();
    store.clear_calls();
    let before = state.clone();

    let err = reconciler
        .apply(scope(&schema), &hosts(1), &mut state, ApplyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApplyError::DeleteNotAllowed { count: 2, .. }));
    assert!(store.mutating_calls().is_empty());
    assert_eq!(state, before);
}

#[tokio::test]
async fn bulk_delete_on_new_servers() {
    let store = FakeStore::new(V74);
    let schema = hosts_schema();
    let mut state = Collection::new();
    let reconciler = Reconciler::new(&store);
    reconciler
        .apply(scope(&schema), &hosts(3), &mut state, ApplyOptions::default())
        .await
        .unwrap();
    store.clear_calls();

    let report = reconciler
        .apply(scope(&schema), &hosts(1), &mut state, allow())
        .await
        .unwrap();

    let calls = store.mutating_calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], Call::DeleteBatch(ids) if ids.len() == 2));
    assert_eq!(report.count(Outcome::Deleted), 2);
    assert_eq!(state.names().collect::<Vec<_>>(), vec!["h0000"]);
}

#[tokio::test]
async fn sequential_delete_below_minimum_version() {
    let store = FakeStore::new(V72);
    let schema = hosts_schema();
    let mut state = Collection::new();
    let reconciler = Reconciler::new(&store);
    reconciler
        .apply(scope(&schema), &hosts(3), &mut state, ApplyOptions::default())
        .await
        .unwrap();
    // one object already vanished behind our back
    let gone = state.get("h0002").unwrap().id.clone().unwrap();
    store.remote.lock().unwrap().retain(|r| r.id() != Some(gone.as_str()));
    store.clear_calls();

    let report = reconciler
        .apply(scope(&schema), &Collection::new(), &mut state, allow())
        .await
        .unwrap();

    let calls = store.mutating_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|call| matches!(call, Call::DeleteOne(_))));
    assert_eq!(report.count(Outcome::Deleted), 3);
    assert!(state.is_empty());
}

#[tokio::test]
async fn bulk_delete_not_found_means_absent() {
    let store = FakeStore::new(V74);
    let schema = hosts_schema();
    let mut state: Collection = vec![host("ghost", "10.9.9.9").with_id("missing")]
        .into_iter()
        .collect();

    let report = Reconciler::new(&store)
        .destroy(scope(&schema), &mut state)
        .await
        .unwrap();

    assert_eq!(report.count(Outcome::Deleted), 1);
    assert!(state.is_empty());
}

#[tokio::test]
async fn unconfirmed_bulk_deletes_stay_recorded() {
    let mut store = FakeStore::new(V74);
    let schema = hosts_schema();
    let mut state = Collection::new();
    Reconciler::new(&store)
        .apply(scope(&schema), &hosts(2), &mut state, ApplyOptions::default())
        .await
        .unwrap();
    let stubborn = state.get("h0001").unwrap().id.clone().unwrap();
    store.unreported.insert(stubborn.clone());

    let err = Reconciler::new(&store)
        .destroy(scope(&schema), &mut state)
        .await
        .unwrap_err();

    match err {
        ApplyError::Incomplete { unconfirmed, .. } => assert_eq!(unconfirmed, vec!["h0001"]),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(state.names().collect::<Vec<_>>(), vec!["h0001"]);
    assert_eq!(state.get("h0001").unwrap().id(), Some(stubborn.as_str()));
}

#[tokio::test]
async fn delete_chunks_respect_url_limit() {
    let store = FakeStore::new(V74);
    let schema = hosts_schema();
    let mut state = Collection::new();
    let limits = BatchLimits {
        create: ChunkLimits::create(),
        delete: ChunkLimits {
            max_count: 1000,
            max_payload_bytes: usize::MAX,
            max_url_bytes: 13,
        },
    };
    let reconciler = Reconciler::new(&store).with_limits(limits);
    reconciler
        .apply(scope(&schema), &hosts(4), &mut state, ApplyOptions::default())
        .await
        .unwrap();
    store.clear_calls();

    reconciler.destroy(scope(&schema), &mut state).await.unwrap();

    // `ids:` plus two 4-byte ids and a comma is exactly 13 bytes
    let batches: Vec<Vec<String>> = store
        .mutating_calls()
        .into_iter()
        .map(|call| match call {
            Call::DeleteBatch(ids) => ids,
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2]);
    assert!(batches.iter().all(|ids| id_filter(ids).len() <= 13));
}

#[test]
fn delete_filter_prefix_counts_against_url_limit() {
    let limits = ChunkLimits {
        max_count: 1000,
        max_payload_bytes: usize::MAX,
        max_url_bytes: 10,
    };
    let items: Vec<Item> = (0..4)
        .map(|n| Item::new(format!("h{n}"), JsonMap::new()).with_id(format!("id-{n}")))
        .collect();

    let chunks = delete_chunks(items, &limits);

    assert_eq!(chunks.len(), 4);
    for chunk in &chunks {
        let ids: Vec<String> = chunk.ops.iter().filter_map(|i| i.id.clone()).collect();
        assert!(id_filter(&ids).len() <= 10, "{}", id_filter(&ids));
    }
}

#[tokio::test]
async fn version_gate_fails_before_remote_calls() {
    let store = FakeStore::new(FmcVersion::new(6, 2, 3));
    let schema = nat_schema();
    let plan: RuleList = vec![rule("r1", "before_auto", "STATIC")].into_iter().collect();
    let mut state = RuleList::new();

    let err = Reconciler::new(&store)
        .apply_rules(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("6.3.0"));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn read_forgets_vanished_and_refreshes_fields() {
    let schema = hosts_schema();
    let store = FakeStore::new(V74).with_remote(vec![host("a", "10.1.1.1").with_id("1")]);
    let mut state: Collection = vec![
        host("a", "10.0.0.1").with_id("1"),
        host("b", "10.0.0.2").with_id("2"),
    ]
    .into_iter()
    .collect();

    let gone = Reconciler::new(&store)
        .read(scope(&schema), &mut state)
        .await
        .unwrap();

    assert_eq!(gone, vec!["b"]);
    assert_eq!(state.len(), 1);
    assert_eq!(state.get("a").unwrap().fields["value"], json!("10.1.1.1"));
}

#[tokio::test]
async fn read_of_missing_collection_clears_state() {
    let schema = nat_schema();
    let mut store = FakeStore::new(V74);
    store.list_not_found = true;
    let mut state: RuleList = vec![rule("r1", "before_auto", "STATIC").with_id("1")]
        .into_iter()
        .collect();

    let gone = Reconciler::new(&store)
        .read_rules(scope(&schema), &mut state)
        .await
        .unwrap();

    assert_eq!(gone, vec!["r1"]);
    assert!(state.is_empty());
}

#[tokio::test]
async fn rules_are_inserted_per_section_in_order() {
    let store = FakeStore::new(V74);
    let schema = nat_schema();
    let plan: RuleList = vec![
        rule("r1", "before_auto", "STATIC"),
        rule("r2", "before_auto", "DYNAMIC"),
        rule("r3", "after_auto", "STATIC"),
    ]
    .into_iter()
    .collect();
    let mut state = RuleList::new();

    Reconciler::new(&store)
        .apply_rules(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap();

    assert_eq!(
        store.mutating_calls(),
        vec![
            Call::Create {
                names: vec!["r1".to_string(), "r2".to_string()],
                section: Some("before_auto".to_string()),
            },
            Call::Create {
                names: vec!["r3".to_string()],
                section: Some("after_auto".to_string()),
            },
        ]
    );
    let recorded: Vec<_> = state
        .iter()
        .map(|r| (r.name.as_str(), r.id().unwrap()))
        .collect();
    assert_eq!(recorded, vec![("r1", "id-1"), ("r2", "id-2"), ("r3", "id-3")]);
    assert!(rules_match(&plan, &state, &schema));
}

#[tokio::test]
async fn changed_rule_list_is_rewritten() {
    let store = FakeStore::new(V74);
    let schema = nat_schema();
    let plan: RuleList = vec![
        rule("r1", "before_auto", "STATIC"),
        rule("r2", "before_auto", "STATIC"),
    ]
    .into_iter()
    .collect();
    let mut state = RuleList::new();
    let reconciler = Reconciler::new(&store);
    reconciler
        .apply_rules(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap();
    store.clear_calls();

    let unchanged = reconciler
        .apply_rules(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap();
    assert!(unchanged.is_noop());
    assert!(store.calls().is_empty());

    let reordered: RuleList = vec![
        rule("r2", "before_auto", "STATIC"),
        rule("r1", "before_auto", "STATIC"),
    ]
    .into_iter()
    .collect();
    let report = reconciler
        .apply_rules(scope(&schema), &reordered, &mut state, ApplyOptions::default())
        .await
        .unwrap();

    let calls = store.mutating_calls();
    assert!(matches!(&calls[0], Call::DeleteBatch(ids) if ids.len() == 2));
    assert!(matches!(&calls[1], Call::Create { names, .. } if names == &["r2", "r1"]));
    assert_eq!(report.count(Outcome::Deleted), 2);
    assert_eq!(report.count(Outcome::Created), 2);
    let names: Vec<_> = state.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["r2", "r1"]);
    assert_eq!(store.remote().len(), 2);
}

#[tokio::test]
async fn dropping_a_rule_needs_permission() {
    let store = FakeStore::new(V74);
    let schema = nat_schema();
    let plan: RuleList = vec![
        rule("r1", "before_auto", "STATIC"),
        rule("r2", "after_auto", "STATIC"),
    ]
    .into_iter()
    .collect();
    let mut state = RuleList::new();
    let reconciler = Reconciler::new(&store);
    reconciler
        .apply_rules(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap();

    let smaller: RuleList = vec![rule("r1", "before_auto", "STATIC")].into_iter().collect();
    let err = reconciler
        .apply_rules(scope(&schema), &smaller, &mut state, ApplyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApplyError::DeleteNotAllowed { count: 1, .. }));
    assert_eq!(state.len(), 2);
}

#[tokio::test]
async fn failed_rule_delete_stops_before_recreate() {
    let store = FakeStore::new(V74).failing_at(2);
    let schema = nat_schema();
    let plan: RuleList = vec![
        rule("r1", "before_auto", "STATIC"),
        rule("r2", "after_auto", "STATIC"),
    ]
    .into_iter()
    .collect();
    let mut state = RuleList::new();
    let reconciler = Reconciler::new(&store);
    reconciler
        .apply_rules(scope(&schema), &plan, &mut state, ApplyOptions::default())
        .await
        .unwrap();

    let changed: RuleList = vec![
        rule("r1", "before_auto", "DYNAMIC"),
        rule("r2", "after_auto", "STATIC"),
    ]
    .into_iter()
    .collect();
    let err = reconciler
        .apply_rules(scope(&schema), &changed, &mut state, ApplyOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ApplyError::Remote { action: "delete", .. }));
    assert_eq!(state.len(), 2);
    assert_eq!(store.mutating_calls().len(), 3);
}

#[tokio::test]
async fn import_resolves_names_and_ids() {
    let schema = hosts_schema();
    let store = FakeStore::new(V74).with_remote(vec![
        host("a", "10.0.0.1").with_id("1"),
        host("b", "10.0.0.2").with_id("2"),
    ]);
    let reconciler = Reconciler::new(&store);

    let by_names: ImportId = "Global,[a,b]".parse().unwrap();
    let imported = reconciler.import(scope(&schema), &by_names).await.unwrap();
    assert_eq!(imported.len(), 2);
    assert_eq!(imported.get("b").unwrap().id(), Some("2"));

    let by_id: ImportId = "2".parse().unwrap();
    let imported = reconciler.import(scope(&schema), &by_id).await.unwrap();
    assert_eq!(imported.names().collect::<Vec<_>>(), vec!["b"]);

    let missing: ImportId = "[a,zzz]".parse().unwrap();
    let err = reconciler.import(scope(&schema), &missing).await.unwrap_err();
    assert!(matches!(err, ApplyError::Missing { names, .. } if names == vec!["zzz"]));
}

#[tokio::test]
async fn imported_rules_get_local_labels() {
    let schema = nat_schema();
    let store = FakeStore::new(V74).with_remote(vec![
        Item::new("", JsonMap::new()).with_id("n1"),
        Item::new("", JsonMap::new()).with_id("n2"),
    ]);

    let rules = Reconciler::new(&store)
        .import_rules(scope(&schema))
        .await
        .unwrap();

    let labels: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(labels, vec!["rule_1", "rule_2"]);
    assert!(rules
        .iter()
        .all(|r| r.section == Some(Section::new("before_auto"))));
}

#[test]
fn diff_ignores_unset_and_computed_fields() {
    let schema = ItemSchema::new("/object/hosts")
        .field("value", FieldSchema::new(FieldType::String))
        .field("description", FieldSchema::new(FieldType::String))
        .field("metadata", FieldSchema::new(FieldType::Json).computed());
    let mut recorded = host("a", "10.0.0.1").with_id("1");
    recorded
        .fields
        .insert("description".to_string(), json!("set remotely"));
    recorded
        .fields
        .insert("metadata".to_string(), json!({"lastUser": "x"}));
    let state: Collection = vec![recorded].into_iter().collect();

    let mut plan: Collection = vec![host("a", "10.0.0.1")].into_iter().collect();
    carry_ids(&mut plan, &state);
    let result = diff(&plan, &state, &schema);

    assert!(result.is_empty());
    assert_eq!(result.unchanged, vec!["a"]);
}

#[test]
fn diff_partitions_by_id() {
    let schema = hosts_schema();
    let state: Collection = vec![
        host("keep", "10.0.0.1").with_id("1"),
        host("old", "10.0.0.2").with_id("2"),
        host("orphan", "10.0.0.3"),
    ]
    .into_iter()
    .collect();
    let mut plan: Collection = vec![host("keep", "10.0.0.9"), host("new", "10.0.0.4")]
        .into_iter()
        .collect();
    carry_ids(&mut plan, &state);

    let result = diff(&plan, &state, &schema);
    assert_eq!(
        result.create.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        vec!["new"]
    );
    assert_eq!(
        result.delete.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        vec!["old"]
    );
    assert_eq!(result.update.len(), 1);
    assert_eq!(result.update[0].changes[0].field, "value");
    assert_eq!(result.dropped, vec!["orphan"]);
}

#[test]
fn chunker_partitions_without_empty_chunks() {
    let limits = ChunkLimits {
        max_count: 3,
        max_payload_bytes: 20,
        max_url_bytes: usize::MAX,
    };
    let ops: Vec<usize> = vec![5, 5, 5, 5, 30, 1, 1, 1, 1];
    let chunks = chunk(
        ops.clone(),
        &limits,
        |size| OpSize {
            payload: *size,
            url: 0,
        },
        |_| None,
    );

    assert!(chunks.iter().all(|c| !c.ops.is_empty()));
    let flattened: Vec<usize> = chunks.iter().flat_map(|c| c.ops.clone()).collect();
    assert_eq!(flattened, ops);
    let shapes: Vec<Vec<usize>> = chunks.into_iter().map(|c| c.ops).collect();
    // [5,5,5] is 2 + 15 + 2 = 19 bytes; the oversized op stands alone
    assert_eq!(
        shapes,
        vec![vec![5, 5, 5], vec![5], vec![30], vec![1, 1, 1], vec![1]]
    );
}

#[test]
fn create_chunks_split_on_section_change() {
    let schema = nat_schema();
    let rules = vec![
        rule("a", "before_auto", "STATIC"),
        rule("b", "after_auto", "STATIC"),
        rule("c", "before_auto", "STATIC"),
    ];
    let chunks = create_chunks(&schema, rules, &ChunkLimits::create());
    let sections: Vec<_> = chunks
        .iter()
        .map(|c| c.section.as_ref().map(|s| s.to_string()))
        .collect();
    assert_eq!(
        sections,
        vec![
            Some("before_auto".to_string()),
            Some("after_auto".to_string()),
            Some("before_auto".to_string())
        ]
    );
}

#[test]
fn id_filter_percent_encodes() {
    assert_eq!(
        id_filter(&["a b".to_string(), "c,d".to_string()]),
        "ids:a+b,c%2Cd"
    );
}

#[test]
fn bulk_delete_mode_reads_schema() {
    let schema = hosts_schema();
    assert_eq!(schema.bulk_delete, BulkDelete::Since(V74));
    assert_eq!(select_delete_mode(&schema, V72), DeleteMode::Sequential);
    assert_eq!(select_delete_mode(&schema, V74), DeleteMode::Bulk);
}
