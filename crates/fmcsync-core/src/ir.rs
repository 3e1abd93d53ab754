//! item model and schema descriptors for fmcsync.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// json attribute map keyed by local field name.
pub type JsonMap = BTreeMap<String, Value>;

/// ordering partition of a position-significant rule list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Section(String);

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// one remote object, keyed by name within its collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// local key, unique within the collection.
    pub name: String,
    /// remote identifier; only ever taken from a remote response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// ordering partition for rule lists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<Section>,
    /// field values keyed by local field name.
    #[serde(default)]
    pub fields: JsonMap,
}

impl Item {
    pub fn new(name: impl Into<String>, fields: JsonMap) -> Self {
        Self {
            name: name.into(),
            id: None,
            section: None,
            fields,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.section = Some(section);
        self
    }

    /// return the remote id, if the item was ever created.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// name-keyed collection of items (desired plan or recorded state).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection {
    items: BTreeMap<String, Item>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// insert or overwrite an item under its name.
    pub fn insert(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.name.clone(), item)
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.items.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Item> {
        self.items.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// find the item recorded under a remote id.
    pub fn find_by_id(&self, id: &str) -> Option<&Item> {
        self.items.values().find(|item| item.id() == Some(id))
    }

    /// remove the item recorded under a remote id.
    pub fn remove_by_id(&mut self, id: &str) -> Option<Item> {
        let name = self.find_by_id(id)?.name.clone();
        self.items.remove(&name)
    }

    /// all remote ids present in this collection.
    pub fn ids(&self) -> BTreeSet<&str> {
        self.items.values().filter_map(Item::id).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.items.values_mut()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Item) -> bool) {
        self.items.retain(|_, item| keep(item));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Item> for Collection {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        let mut collection = Collection::new();
        for item in iter {
            collection.insert(item);
        }
        collection
    }
}

impl IntoIterator for Collection {
    type Item = Item;
    type IntoIter = btree_map::IntoValues<String, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_values()
    }
}

/// position-significant list of rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleList {
    rules: Vec<Item>,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Item) {
        self.rules.push(rule);
    }

    pub fn as_slice(&self) -> &[Item] {
        &self.rules
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.rules.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.rules.iter_mut()
    }

    pub fn retain(&mut self, keep: impl FnMut(&Item) -> bool) {
        self.rules.retain(keep);
    }

    pub fn ids(&self) -> BTreeSet<&str> {
        self.rules.iter().filter_map(Item::id).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<Item> for RuleList {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RuleList {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

/// error raised when a server version string cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid fmc version {0:?}")]
pub struct VersionError(pub String);

/// management center software version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FmcVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FmcVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for FmcVersion {
    type Err = VersionError;

    /// accepts `7.4`, `7.4.1` and server strings such as `7.4.1 (build 172)`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let head = raw
            .trim()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default();
        let mut parts = [0u32; 3];
        let mut seen = 0;
        for (index, segment) in head.split('.').enumerate() {
            if index >= parts.len() {
                break;
            }
            parts[index] = segment
                .parse()
                .map_err(|_| VersionError(raw.to_string()))?;
            seen += 1;
        }
        if seen == 0 {
            return Err(VersionError(raw.to_string()));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for FmcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for FmcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FmcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// value type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldType", into = "RawFieldType")]
pub enum FieldType {
    String,
    Int,
    Bool,
    Enum(Vec<String>),
    List(Box<FieldType>),
    /// any json value, passed through untouched.
    Json,
}

impl FieldType {
    pub fn label(&self) -> String {
        match self {
            FieldType::String => "string".to_string(),
            FieldType::Int => "int".to_string(),
            FieldType::Bool => "bool".to_string(),
            FieldType::Enum(values) => format!("enum({})", values.join("|")),
            FieldType::List(item) => format!("list({})", item.label()),
            FieldType::Json => "json".to_string(),
        }
    }
}

/// on-disk form: `string`, `{enum: [a, b]}` or `{list: int}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawFieldType {
    Scalar(String),
    Enum {
        #[serde(rename = "enum")]
        values: Vec<String>,
    },
    List {
        list: Box<FieldType>,
    },
}

impl TryFrom<RawFieldType> for FieldType {
    type Error = String;

    fn try_from(raw: RawFieldType) -> Result<Self, Self::Error> {
        match raw {
            RawFieldType::Scalar(name) => match name.as_str() {
                "string" => Ok(FieldType::String),
                "int" => Ok(FieldType::Int),
                "bool" => Ok(FieldType::Bool),
                "json" => Ok(FieldType::Json),
                other => Err(format!("unknown field type {other}")),
            },
            RawFieldType::Enum { values } => Ok(FieldType::Enum(values)),
            RawFieldType::List { list } => Ok(FieldType::List(list)),
        }
    }
}

impl From<FieldType> for RawFieldType {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::String => RawFieldType::Scalar("string".to_string()),
            FieldType::Int => RawFieldType::Scalar("int".to_string()),
            FieldType::Bool => RawFieldType::Scalar("bool".to_string()),
            FieldType::Json => RawFieldType::Scalar("json".to_string()),
            FieldType::Enum(values) => RawFieldType::Enum { values },
            FieldType::List(list) => RawFieldType::List { list },
        }
    }
}

/// schema for one field of an item type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub r#type: FieldType,
    /// dotted path in the remote body; defaults to the field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// set by the remote system, never by the user.
    #[serde(default)]
    pub computed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSchema {
    pub fn new(r#type: FieldType) -> Self {
        Self {
            r#type,
            remote: None,
            required: false,
            computed: false,
            description: None,
        }
    }

    pub fn remote(mut self, path: impl Into<String>) -> Self {
        self.remote = Some(path.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// remote json path for a field stored under `name`.
    pub fn remote_path<'a>(&'a self, name: &'a str) -> &'a str {
        self.remote.as_deref().unwrap_or(name)
    }
}

/// bulk delete capability of an item type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BulkDelete {
    #[default]
    Always,
    Unsupported,
    /// available from the given version on.
    Since(FmcVersion),
}

impl TryFrom<String> for BulkDelete {
    type Error = VersionError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.as_str() {
            "always" => Ok(BulkDelete::Always),
            "unsupported" => Ok(BulkDelete::Unsupported),
            version => Ok(BulkDelete::Since(version.parse()?)),
        }
    }
}

impl From<BulkDelete> for String {
    fn from(value: BulkDelete) -> Self {
        match value {
            BulkDelete::Always => "always".to_string(),
            BulkDelete::Unsupported => "unsupported".to_string(),
            BulkDelete::Since(version) => version.to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// declarative descriptor for one remote item type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSchema {
    /// rest path below the domain prefix; may contain `{parent}`.
    pub path: String,
    /// value of the `type` attribute sent with every body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// whether the item name is a remote attribute or a local label only.
    #[serde(default = "default_true")]
    pub send_name: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSchema>,
    /// position-significant rule list instead of a named map.
    #[serde(default)]
    pub ordered: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<FmcVersion>,
    #[serde(default)]
    pub bulk_delete: BulkDelete,
    /// retry creates that fail transiently right after a dependency appears.
    #[serde(default)]
    pub settle_retries: bool,
}

impl ItemSchema {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            object_type: None,
            send_name: true,
            fields: BTreeMap::new(),
            ordered: false,
            sections: Vec::new(),
            min_version: None,
            bulk_delete: BulkDelete::Always,
            settle_retries: false,
        }
    }

    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: FieldSchema) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// make this an ordered rule list partitioned into `sections`.
    pub fn ordered(mut self, sections: &[&str]) -> Self {
        self.ordered = true;
        self.sections = sections.iter().map(|s| Section::new(*s)).collect();
        self
    }

    pub fn local_names(mut self) -> Self {
        self.send_name = false;
        self
    }

    pub fn min_version(mut self, version: FmcVersion) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn bulk_delete(mut self, bulk_delete: BulkDelete) -> Self {
        self.bulk_delete = bulk_delete;
        self
    }

    pub fn settle_retries(mut self) -> Self {
        self.settle_retries = true;
        self
    }

    /// fields the user manages (everything not computed remotely).
    pub fn managed_fields(&self) -> impl Iterator<Item = (&String, &FieldSchema)> {
        self.fields.iter().filter(|(_, field)| !field.computed)
    }

    pub fn is_computed(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|f| f.computed)
    }

    pub fn needs_parent(&self) -> bool {
        self.path.contains("{parent}")
    }

    /// expand the path template for a parent id.
    pub fn expand_path(&self, parent: Option<&str>) -> Option<String> {
        match (self.needs_parent(), parent) {
            (true, Some(parent)) => Some(self.path.replace("{parent}", parent)),
            (true, None) => None,
            (false, _) => Some(self.path.clone()),
        }
    }
}

/// item type descriptors keyed by type name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    pub types: BTreeMap<String, ItemSchema>,
}

impl SchemaRegistry {
    pub fn get(&self, type_name: &str) -> Option<&ItemSchema> {
        self.types.get(type_name)
    }

    pub fn insert(&mut self, type_name: impl Into<String>, schema: ItemSchema) -> Option<ItemSchema> {
        self.types.insert(type_name.into(), schema)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_parses_server_string() {
        let version: FmcVersion = "7.4.1 (build 172)".parse().unwrap();
        assert_eq!(version, FmcVersion::new(7, 4, 1));
        let short: FmcVersion = "7.2".parse().unwrap();
        assert_eq!(short, FmcVersion::new(7, 2, 0));
        let long: FmcVersion = "7.0.1.1".parse().unwrap();
        assert_eq!(long, FmcVersion::new(7, 0, 1));
    }

    #[test]
    fn version_rejects_garbage() {
        assert!("latest".parse::<FmcVersion>().is_err());
        assert!("".parse::<FmcVersion>().is_err());
    }

    #[test]
    fn version_orders_numerically() {
        let older: FmcVersion = "7.2.9".parse().unwrap();
        let newer: FmcVersion = "7.10".parse().unwrap();
        assert!(older < newer);
    }

    #[test]
    fn collection_finds_and_removes_by_id() {
        let mut collection: Collection = vec![
            Item::new("a", JsonMap::new()).with_id("1"),
            Item::new("b", JsonMap::new()),
        ]
        .into_iter()
        .collect();

        assert_eq!(collection.find_by_id("1").unwrap().name, "a");
        assert_eq!(collection.ids().into_iter().collect::<Vec<_>>(), vec!["1"]);
        let removed = collection.remove_by_id("1").unwrap();
        assert_eq!(removed.name, "a");
        assert_eq!(collection.len(), 1);
        assert!(collection.remove_by_id("1").is_none());
    }

    #[test]
    fn collection_serializes_as_map() {
        let collection: Collection = vec![Item::new("a", JsonMap::new()).with_id("1")]
            .into_iter()
            .collect();
        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value, json!({"a": {"name": "a", "id": "1", "fields": {}}}));
    }

    #[test]
    fn field_type_accepts_compact_forms() {
        let parsed: FieldSchema =
            serde_json::from_value(json!({"type": {"enum": ["TCP", "UDP"]}, "required": true}))
                .unwrap();
        assert_eq!(
            parsed.r#type,
            FieldType::Enum(vec!["TCP".to_string(), "UDP".to_string()])
        );
        let list: FieldSchema = serde_json::from_value(json!({"type": {"list": "int"}})).unwrap();
        assert_eq!(list.r#type, FieldType::List(Box::new(FieldType::Int)));
        let bad = serde_json::from_value::<FieldSchema>(json!({"type": "float"}));
        assert!(bad.is_err());
    }

    #[test]
    fn bulk_delete_parses_version_gate() {
        let schema: ItemSchema = serde_json::from_value(json!({
            "path": "/object/hosts",
            "bulk_delete": "7.4",
        }))
        .unwrap();
        assert_eq!(schema.bulk_delete, BulkDelete::Since(FmcVersion::new(7, 4, 0)));
        assert!(schema.send_name);
    }

    #[test]
    fn path_template_requires_parent() {
        let schema = ItemSchema::new("/policy/ftdnatpolicies/{parent}/manualnatrules");
        assert!(schema.needs_parent());
        assert_eq!(schema.expand_path(None), None);
        assert_eq!(
            schema.expand_path(Some("abc")).unwrap(),
            "/policy/ftdnatpolicies/abc/manualnatrules"
        );
    }
}
