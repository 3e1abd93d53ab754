//! desired-state file loading with include support.

use crate::registry::builtin_registry;
use crate::report_to_result;
use anyhow::{anyhow, Context, Result};
use fmcsync_core::{
    validate_collection, validate_rules, Collection, Item, ItemSchema, JsonMap, RuleList,
    SchemaRegistry, Section, ValidationError, ValidationReport,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// raw on-disk representation of a config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    schemas: BTreeMap<String, ItemSchema>,
    #[serde(default)]
    resources: BTreeMap<String, ResourceSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceSpec {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    items: Option<BTreeMap<String, JsonMap>>,
    #[serde(default)]
    rules: Option<Vec<RuleSpec>>,
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    name: String,
    #[serde(default)]
    section: Option<Section>,
    #[serde(flatten)]
    fields: JsonMap,
}

/// desired items of one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Desired {
    Named(Collection),
    Rules(RuleList),
}

/// one validated resource block.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredResource {
    pub type_name: String,
    pub domain: Option<String>,
    pub parent: Option<String>,
    pub desired: Desired,
}

/// validated configuration plus the registry it was checked against.
#[derive(Debug, Clone)]
pub struct DesiredConfig {
    pub schemas: SchemaRegistry,
    pub resources: BTreeMap<String, DesiredResource>,
}

impl DesiredConfig {
    pub fn schema(&self, type_name: &str) -> Result<&ItemSchema> {
        self.schemas
            .get(type_name)
            .ok_or_else(|| anyhow!("unknown type {type_name}"))
    }
}

/// load a config file (yaml or json), merge includes and validate.
pub fn load_config(path: impl AsRef<Path>) -> Result<DesiredConfig> {
    let mut visited = BTreeSet::new();
    let mut schemas = builtin_registry();
    let mut specs = BTreeMap::new();
    load_recursive(path.as_ref(), &mut visited, &mut schemas, &mut specs)?;

    let mut report = ValidationReport::default();
    let mut resources = BTreeMap::new();
    for (name, spec) in specs {
        if let Some(resource) = build_resource(&name, spec, &schemas, &mut report) {
            resources.insert(name, resource);
        }
    }
    report_to_result(report)?;
    Ok(DesiredConfig { schemas, resources })
}

/// recursive loader with cycle-safe include handling.
fn load_recursive(
    path: &Path,
    visited: &mut BTreeSet<PathBuf>,
    schemas: &mut SchemaRegistry,
    specs: &mut BTreeMap<String, ResourceSpec>,
) -> Result<()> {
    let canonical =
        fs::canonicalize(path).with_context(|| format!("load config: {}", path.display()))?;
    if !visited.insert(canonical.clone()) {
        return Ok(());
    }

    let content = fs::read_to_string(&canonical)
        .with_context(|| format!("read config: {}", canonical.display()))?;
    let file: ConfigFile = if canonical.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(&content)
            .with_context(|| format!("parse json: {}", canonical.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("parse yaml: {}", canonical.display()))?
    };

    let base = canonical
        .parent()
        .ok_or_else(|| anyhow!("missing parent dir for {}", canonical.display()))?;
    for entry in &file.include {
        load_recursive(&base.join(entry), visited, schemas, specs)?;
    }

    for (name, schema) in file.schemas {
        if schemas.get(&name).is_some() {
            return Err(anyhow!("duplicate schema type {name}"));
        }
        schemas.insert(name, schema);
    }
    for (name, spec) in file.resources {
        if specs.contains_key(&name) {
            return Err(anyhow!(
                "duplicate resource {name} in {}",
                canonical.display()
            ));
        }
        specs.insert(name, spec);
    }
    Ok(())
}

fn build_resource(
    name: &str,
    spec: ResourceSpec,
    schemas: &SchemaRegistry,
    report: &mut ValidationReport,
) -> Option<DesiredResource> {
    let Some(schema) = schemas.get(&spec.type_name) else {
        report.push(ValidationError::UnknownType {
            resource: name.to_string(),
            type_name: spec.type_name,
        });
        return None;
    };
    if schema.needs_parent() && spec.parent.is_none() {
        report.push(ValidationError::MissingParent {
            resource: name.to_string(),
            type_name: spec.type_name.clone(),
        });
    }

    let desired = match (schema.ordered, spec.items, spec.rules) {
        (false, Some(items), None) => {
            let collection: Collection = items
                .into_iter()
                .map(|(item_name, fields)| Item::new(item_name, fields))
                .collect();
            report.extend(validate_collection(name, schema, &collection));
            Desired::Named(collection)
        }
        (true, None, Some(rules)) => {
            let rules: RuleList = rules
                .into_iter()
                .map(|rule| Item {
                    name: rule.name,
                    id: None,
                    section: rule.section,
                    fields: rule.fields,
                })
                .collect();
            report.extend(validate_rules(name, schema, &rules));
            Desired::Rules(rules)
        }
        (ordered, _, _) => {
            report.push(ValidationError::ShapeMismatch {
                resource: name.to_string(),
                type_name: spec.type_name,
                expected: if ordered {
                    "a rules list".to_string()
                } else {
                    "an items map".to_string()
                },
            });
            return None;
        }
    };

    Some(DesiredResource {
        type_name: spec.type_name,
        domain: spec.domain,
        parent: spec.parent,
        desired,
    })
}
