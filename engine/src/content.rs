use std::{fs, path::Path};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::reward::RewardTable;
use crate::snapshot::{AdversaryRecord, ProtagonistStats};

const BUILTIN_CATALOG: &str = include_str!("../content/catalog.json");
const BUILTIN_PROTAGONIST: &str = include_str!("../content/protagonist.json");

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    adversaries: Vec<AdversaryRecord>,
    #[serde(default)]
    reward_tables: Vec<RewardTable>,
}

/// Authored adversaries and reward tables, keyed by id in authoring order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    adversaries: IndexMap<String, AdversaryRecord>,
    reward_tables: IndexMap<String, RewardTable>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(text)?;
        Ok(Self::from_file(file))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(text)?;
        Ok(Self::from_file(file))
    }

    /// Load a `.json`, `.yaml` or `.yml` catalog from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Format::of(path)? {
            Format::Json => Self::from_json_str(&fs::read_to_string(path)?),
            Format::Yaml => Self::from_yaml_str(&fs::read_to_string(path)?),
        }
    }

    fn from_file(file: CatalogFile) -> Self {
        let mut catalog = Self::new();
        for record in file.adversaries {
            catalog.insert_adversary(record);
        }
        for table in file.reward_tables {
            catalog.insert_reward_table(table);
        }
        info!(
            adversaries = catalog.adversaries.len(),
            reward_tables = catalog.reward_tables.len(),
            "catalog loaded"
        );
        catalog
    }

    /// Register an adversary. The first record for an id wins; later
    /// duplicates are logged and dropped.
    pub fn insert_adversary(&mut self, record: AdversaryRecord) -> bool {
        if self.adversaries.contains_key(&record.id) {
            warn!(id = %record.id, "duplicate adversary id ignored");
            return false;
        }
        self.adversaries.insert(record.id.clone(), record);
        true
    }

    /// Register a reward table. Tables without an id are skipped; a later
    /// table replaces an earlier one with the same id.
    pub fn insert_reward_table(&mut self, table: RewardTable) -> bool {
        if table.id.is_empty() {
            warn!("reward table without an id skipped");
            return false;
        }
        self.reward_tables.insert(table.id.clone(), table);
        true
    }

    /// Fold `other` into this catalog under the same insertion rules.
    pub fn merge(&mut self, other: Catalog) {
        for (_, record) in other.adversaries {
            self.insert_adversary(record);
        }
        for (_, table) in other.reward_tables {
            self.insert_reward_table(table);
        }
    }

    pub fn adversary(&self, id: &str) -> Option<&AdversaryRecord> {
        self.adversaries.get(id)
    }

    pub fn reward_table(&self, id: &str) -> Option<&RewardTable> {
        self.reward_tables.get(id)
    }

    pub fn adversaries(&self) -> impl Iterator<Item = &AdversaryRecord> {
        self.adversaries.values()
    }

    pub fn reward_tables(&self) -> impl Iterator<Item = &RewardTable> {
        self.reward_tables.values()
    }
}

pub fn builtin_protagonist() -> Result<ProtagonistStats> {
    protagonist_from_json_str(BUILTIN_PROTAGONIST)
}

pub fn protagonist_from_json_str(text: &str) -> Result<ProtagonistStats> {
    Ok(serde_json::from_str(text)?)
}

pub fn protagonist_from_yaml_str(text: &str) -> Result<ProtagonistStats> {
    Ok(serde_yaml::from_str(text)?)
}

/// Load a protagonist sheet from a JSON or YAML file.
pub fn load_protagonist(path: impl AsRef<Path>) -> Result<ProtagonistStats> {
    let path = path.as_ref();
    match Format::of(path)? {
        Format::Json => protagonist_from_json_str(&fs::read_to_string(path)?),
        Format::Yaml => protagonist_from_yaml_str(&fs::read_to_string(path)?),
    }
}

enum Format {
    Json,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(Format::Json),
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            _ => Err(EngineError::UnsupportedFormat(path.display().to_string())),
        }
    }
}
