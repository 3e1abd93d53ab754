//! core item model, schema descriptors and validation primitives for fmcsync.

pub mod body;
pub mod import;
pub mod ir;
pub mod validation;

pub use body::{body_len, from_body, get_path, to_body, BodyError};
pub use import::{ImportId, ImportIdError};
pub use ir::{
    BulkDelete, Collection, FieldSchema, FieldType, FmcVersion, Item, ItemSchema, JsonMap,
    RuleList, SchemaRegistry, Section, VersionError,
};
pub use validation::{validate_collection, validate_rules, ValidationError, ValidationReport};
