//! recorded remote state, persisted as json between runs.

use fmcsync_core::{Collection, RuleList};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// recorded items of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedItems {
    Rules(RuleList),
    Named(Collection),
}

impl RecordedItems {
    pub fn len(&self) -> usize {
        match self {
            RecordedItems::Rules(rules) => rules.len(),
            RecordedItems::Named(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// one managed resource as last confirmed by the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub items: RecordedItems,
}

/// on-disk state schema.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
}

/// state store wrapper with load/save helpers.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    data: StateData,
}

impl StateStore {
    /// load state from disk (or create empty when absent).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("read state: {}", path.display()))?;
            let data = serde_json::from_str::<StateData>(&raw)
                .with_context(|| format!("parse state: {}", path.display()))?;
            Ok(Self { path, data })
        } else {
            Ok(Self {
                path,
                data: StateData::default(),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// persist state to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create state dir: {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("write state: {}", self.path.display()))?;
        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceState> {
        self.data.resources.get(name)
    }

    pub fn set_resource(&mut self, name: impl Into<String>, resource: ResourceState) {
        self.data.resources.insert(name.into(), resource);
    }

    pub fn remove_resource(&mut self, name: &str) -> Option<ResourceState> {
        self.data.resources.remove(name)
    }

    /// all recorded resources, by name.
    pub fn resources(&self) -> &BTreeMap<String, ResourceState> {
        &self.data.resources
    }
}
