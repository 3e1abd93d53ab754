//! import identifier parsing.

use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// parsed import identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportId {
    /// `<domain>,[<name1>,<name2>,...]`: named items of a collection.
    Names {
        domain: Option<String>,
        names: Vec<String>,
    },
    /// `<domain>,<id>`: a single remote object (or the parent of a rule list).
    Id { domain: Option<String>, id: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportIdError {
    #[error("invalid import id {0:?}: expected <domain>,[<name>,...] or <domain>,<id>")]
    Malformed(String),
    #[error("import id {0:?} lists no names")]
    EmptyNames(String),
}

impl ImportId {
    pub fn domain(&self) -> Option<&str> {
        match self {
            ImportId::Names { domain, .. } | ImportId::Id { domain, .. } => domain.as_deref(),
        }
    }
}

fn names_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?P<domain>[^,\[\]]*),)?\[(?P<names>[^\[\]]*)\]$")
            .expect("names import pattern")
    })
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?P<domain>[^,\[\]]*),)?(?P<id>[^,\[\]\s]+)$").expect("id import pattern")
    })
}

fn domain_of(captures: &regex::Captures<'_>) -> Option<String> {
    captures
        .name("domain")
        .map(|m| m.as_str().trim())
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

impl FromStr for ImportId {
    type Err = ImportIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Some(captures) = names_pattern().captures(raw) {
            let names: Vec<String> = captures
                .name("names")
                .map(|m| m.as_str())
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            if names.is_empty() {
                return Err(ImportIdError::EmptyNames(raw.to_string()));
            }
            return Ok(ImportId::Names {
                domain: domain_of(&captures),
                names,
            });
        }
        if let Some(captures) = id_pattern().captures(raw) {
            if let Some(id) = captures.name("id") {
                return Ok(ImportId::Id {
                    domain: domain_of(&captures),
                    id: id.as_str().to_string(),
                });
            }
        }
        Err(ImportIdError::Malformed(raw.to_string()))
    }
}
