use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{CollectionSpec, NodeMap, Record};
use crate::snapshot::DEFAULT_SNAPSHOT_PATH;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub firestore: FirestoreConfig,
    #[serde(default)]
    pub offline: OfflineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub types: Vec<TypeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FirestoreConfig {
    /// Path to the service-account key JSON.
    pub credential: PathBuf,
    #[serde(default = "default_database")]
    pub database: String,
    /// `host:port` of a Firestore emulator. `FIRESTORE_EMULATOR_HOST` is used
    /// when this is unset.
    #[serde(default)]
    pub emulator_host: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_database() -> String {
    "(default)".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct OfflineConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_env_var")]
    pub env_var: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            env_var: default_env_var(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(DEFAULT_SNAPSHOT_PATH)
}
fn default_env_var() -> String {
    "OFFLINE_FIRESTORE".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// One `[[types]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct TypeConfig {
    pub collection: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Keep only these source fields. Applied before `rename`.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Rename fields: `{ from = "to" }`.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
}

impl TypeConfig {
    /// Build the runtime spec. Without `fields` or `rename` the map is the identity.
    pub fn to_spec(&self) -> CollectionSpec {
        let spec = CollectionSpec::new(&self.collection, &self.node_type);
        if self.fields.is_none() && self.rename.is_empty() {
            return spec;
        }

        let fields = self.fields.clone();
        let rename = self.rename.clone();
        spec.with_map(NodeMap::new(move |record| {
            let projected: Record = match &fields {
                Some(keep) => record
                    .into_iter()
                    .filter(|(k, _)| keep.iter().any(|f| f == k))
                    .collect(),
                None => record,
            };
            projected
                .into_iter()
                .map(|(k, v)| match rename.get(&k) {
                    Some(to) => (to.clone(), v),
                    None => (k, v),
                })
                .collect()
        }))
    }
}

impl Config {
    pub fn collection_specs(&self) -> Vec<CollectionSpec> {
        self.types.iter().map(TypeConfig::to_spec).collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.types.is_empty() {
        anyhow::bail!("at least one [[types]] entry is required");
    }

    for (i, t) in config.types.iter().enumerate() {
        if t.collection.trim().is_empty() {
            anyhow::bail!("types[{}].collection must not be empty", i);
        }
        if t.node_type.trim().is_empty() {
            anyhow::bail!("types[{}].type must not be empty", i);
        }
    }

    if config.offline.env_var.trim().is_empty() {
        anyhow::bail!("offline.env_var must not be empty");
    }

    if config.firestore.timeout_secs == 0 {
        anyhow::bail!("firestore.timeout_secs must be > 0");
    }

    Ok(())
}
