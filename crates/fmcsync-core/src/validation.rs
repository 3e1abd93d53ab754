//! validation of desired items against their schema descriptor.

use crate::ir::{Collection, FieldType, Item, ItemSchema, RuleList};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// validation errors emitted for a desired resource.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{resource}: unknown type {type_name}")]
    UnknownType { resource: String, type_name: String },
    #[error("{resource}: item with empty name")]
    EmptyName { resource: String },
    #[error("{resource}: duplicate item name {name}")]
    DuplicateName { resource: String, name: String },
    #[error("{resource}.{name}: id {id} cannot be set in configuration")]
    FabricatedId {
        resource: String,
        name: String,
        id: String,
    },
    #[error("{resource}.{name}: missing field {field}")]
    MissingField {
        resource: String,
        name: String,
        field: String,
    },
    #[error("{resource}.{name}: unknown field {field}")]
    ExtraField {
        resource: String,
        name: String,
        field: String,
    },
    #[error("{resource}.{name}: field {field} is computed by the server")]
    ComputedField {
        resource: String,
        name: String,
        field: String,
    },
    #[error("{resource}.{name}: invalid value for {field}: expected {expected}, got {actual}")]
    InvalidValue {
        resource: String,
        name: String,
        field: String,
        expected: String,
        actual: String,
    },
    #[error("{resource}.{name}: missing section")]
    MissingSection { resource: String, name: String },
    #[error("{resource}.{name}: unknown section {section}")]
    UnknownSection {
        resource: String,
        name: String,
        section: String,
    },
    #[error("{resource}.{name}: sections are only valid for ordered rule lists")]
    UnexpectedSection { resource: String, name: String },
    #[error("{resource}: type {type_name} expects {expected}")]
    ShapeMismatch {
        resource: String,
        type_name: String,
        expected: String,
    },
    #[error("{resource}: path of type {type_name} requires a parent id")]
    MissingParent { resource: String, type_name: String },
}

/// aggregated validation report.
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// return true when no errors are present.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// return true when errors are present.
    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
    }
}

/// validate a named collection of desired items.
pub fn validate_collection(
    resource: &str,
    schema: &ItemSchema,
    items: &Collection,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    for item in items.iter() {
        validate_item(resource, schema, item, false, &mut report);
    }
    report
}

/// validate an ordered list of desired rules.
pub fn validate_rules(resource: &str, schema: &ItemSchema, rules: &RuleList) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen = BTreeSet::new();
    for rule in rules.iter() {
        if !rule.name.is_empty() && !seen.insert(rule.name.as_str()) {
            report.push(ValidationError::DuplicateName {
                resource: resource.to_string(),
                name: rule.name.clone(),
            });
        }
        validate_item(resource, schema, rule, true, &mut report);
    }
    report
}

fn validate_item(
    resource: &str,
    schema: &ItemSchema,
    item: &Item,
    ordered: bool,
    report: &mut ValidationReport,
) {
    if item.name.is_empty() {
        report.push(ValidationError::EmptyName {
            resource: resource.to_string(),
        });
    }
    if let Some(id) = item.id() {
        report.push(ValidationError::FabricatedId {
            resource: resource.to_string(),
            name: item.name.clone(),
            id: id.to_string(),
        });
    }

    validate_section(resource, schema, item, ordered, report);

    for (field, field_schema) in &schema.fields {
        if field_schema.computed {
            if item.fields.contains_key(field) {
                report.push(ValidationError::ComputedField {
                    resource: resource.to_string(),
                    name: item.name.clone(),
                    field: field.clone(),
                });
            }
            continue;
        }
        match item.fields.get(field) {
            Some(value) => {
                if let Err((expected, actual)) = check_value(&field_schema.r#type, value) {
                    report.push(ValidationError::InvalidValue {
                        resource: resource.to_string(),
                        name: item.name.clone(),
                        field: field.clone(),
                        expected,
                        actual,
                    });
                }
            }
            None if field_schema.required => {
                report.push(ValidationError::MissingField {
                    resource: resource.to_string(),
                    name: item.name.clone(),
                    field: field.clone(),
                });
            }
            None => {}
        }
    }

    for field in item.fields.keys() {
        if !schema.fields.contains_key(field) {
            report.push(ValidationError::ExtraField {
                resource: resource.to_string(),
                name: item.name.clone(),
                field: field.clone(),
            });
        }
    }
}

fn validate_section(
    resource: &str,
    schema: &ItemSchema,
    item: &Item,
    ordered: bool,
    report: &mut ValidationReport,
) {
    match (&item.section, ordered && !schema.sections.is_empty()) {
        (Some(section), true) => {
            if !schema.sections.contains(section) {
                report.push(ValidationError::UnknownSection {
                    resource: resource.to_string(),
                    name: item.name.clone(),
                    section: section.to_string(),
                });
            }
        }
        (None, true) => report.push(ValidationError::MissingSection {
            resource: resource.to_string(),
            name: item.name.clone(),
        }),
        (Some(_), false) => report.push(ValidationError::UnexpectedSection {
            resource: resource.to_string(),
            name: item.name.clone(),
        }),
        (None, false) => {}
    }
}

fn check_value(field_type: &FieldType, value: &Value) -> Result<(), (String, String)> {
    let mismatch = || Err((field_type.label(), value_type_label(value)));
    match field_type {
        FieldType::Json => Ok(()),
        FieldType::String if value.is_string() => Ok(()),
        FieldType::Int if value.is_i64() || value.is_u64() => Ok(()),
        FieldType::Bool if value.is_boolean() => Ok(()),
        FieldType::Enum(values) => match value.as_str() {
            Some(raw) if values.iter().any(|v| v == raw) => Ok(()),
            Some(raw) => Err((field_type.label(), raw.to_string())),
            None => mismatch(),
        },
        FieldType::List(inner) => match value.as_array() {
            Some(entries) => entries
                .iter()
                .try_for_each(|entry| check_value(inner, entry)),
            None => mismatch(),
        },
        _ => mismatch(),
    }
}

fn value_type_label(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
    .to_string()
}
