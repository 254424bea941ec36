use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_MODEL: &str = "intfloat/multilingual-e5-base";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION_PREFIX: &str = "nb";
pub const DEFAULT_PROJECT_ID: &str = "nb-1";

const APP_DIR: &str = "nbindex";
const ENV_PREFIX: &str = "NBINDEX_";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub projects: ProjectsConfig,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join(APP_DIR))
    }

    pub fn models_dir() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("models"))
    }

    pub fn metrics_db_path() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("metrics.db"))
    }

    fn runtime_dir() -> PathBuf {
        dirs::runtime_dir()
            .or_else(Self::data_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.daemon
            .socket_path
            .clone()
            .unwrap_or_else(|| Self::runtime_dir().join("nbindex.sock"))
    }

    pub fn pid_path(&self) -> PathBuf {
        self.socket_path().with_extension("pid")
    }

    /// Load the config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Apply `NBINDEX_*` overrides. Values that fail to parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model_id = v;
        }
        if let Some(v) = get("EMBEDDING_PROFILE").and_then(|v| v.parse().ok()) {
            self.embedding.profile = Some(v);
        }
        if let Some(v) = get("EMBEDDING_DEVICE").and_then(|v| v.parse().ok()) {
            self.embedding.device = v;
        }
        if let Some(v) = get("EMBEDDING_DIMENSION").and_then(|v| v.parse().ok()) {
            self.embedding.dimension = v;
        }
        if let Some(v) = get("CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.indexing.chunk_size = v;
        }
        if let Some(v) = get("CHUNK_OVERLAP").and_then(|v| v.parse().ok()) {
            self.indexing.chunk_overlap = v;
        }
        if let Some(v) = get("MAX_SOURCE_CHARS").and_then(|v| v.parse().ok()) {
            self.indexing.max_source_chars = v;
        }
        if let Some(v) = get("SEARCH_TOP_K").and_then(|v| v.parse().ok()) {
            self.search.default_top_k = v;
        }
        if let Some(v) = get("VECTOR_DRIVER").and_then(|v| v.parse().ok()) {
            self.vector_store.driver = v;
        }
        if let Some(v) = get("QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Some(v) = get("DEFAULT_PROJECT") {
            self.projects.default_project_id = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.indexing.chunk_size == 0 {
            return invalid("indexing.chunk_size must be greater than 0");
        }
        if self.indexing.chunk_overlap >= self.indexing.chunk_size {
            return invalid("indexing.chunk_overlap must be smaller than indexing.chunk_size");
        }
        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension must be greater than 0");
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be greater than 0");
        }
        if self.search.default_top_k == 0 {
            return invalid("search.default_top_k must be at least 1");
        }
        if self.projects.default_project_id.trim().is_empty() {
            return invalid("projects.default_project_id must not be empty");
        }
        Ok(())
    }
}

/// Query/passage prefixing convention of an embedding model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProfile {
    /// `query: ` / `passage: ` prefixes (E5 family)
    E5,
    /// Instruction prefix on queries only (Qwen3-Embedding and similar)
    Instruct,
    /// No prefixes
    Plain,
}

impl std::str::FromStr for EmbeddingProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "e5" => Ok(EmbeddingProfile::E5),
            "instruct" => Ok(EmbeddingProfile::Instruct),
            "plain" | "none" => Ok(EmbeddingProfile::Plain),
            _ => Err(format!("unknown embedding profile: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProfile::E5 => write!(f, "e5"),
            EmbeddingProfile::Instruct => write!(f, "instruct"),
            EmbeddingProfile::Plain => write!(f, "plain"),
        }
    }
}

/// Token pooling strategy applied to transformer outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    Mean,
    Cls,
    LastToken,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl std::str::FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            _ => Err(format!("unknown device: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model_id: String,

    /// Explicit prefixing profile. When absent the profile is derived from `model_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<EmbeddingProfile>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default)]
    pub device: Device,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pooling: Option<Pooling>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_max_tokens() -> u32 {
    512
}

fn default_batch_size() -> u32 {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_embedding_model(),
            profile: None,
            dimension: default_dimension(),
            device: Device::Cpu,
            max_tokens: default_max_tokens(),
            batch_size: default_batch_size(),
            pooling: None,
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Memory,
    Qdrant,
}

impl std::str::FromStr for VectorDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(VectorDriver::Memory),
            "qdrant" => Ok(VectorDriver::Qdrant),
            _ => Err(format!("unknown vector driver: {}", s)),
        }
    }
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Memory => write!(f, "memory"),
            VectorDriver::Qdrant => write!(f, "qdrant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection_prefix() -> String {
    DEFAULT_COLLECTION_PREFIX.to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::Memory,
            url: default_qdrant_url(),
            api_key: None,
            collection_prefix: default_collection_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: u32,

    #[serde(default = "default_true")]
    pub auto_reindex: bool,
}

fn default_chunk_size() -> u32 {
    1500
}

fn default_chunk_overlap() -> u32 {
    200
}

fn default_max_source_chars() -> u32 {
    200_000
}

fn default_true() -> bool {
    true
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_source_chars: default_max_source_chars(),
            auto_reindex: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: u32,

    #[serde(default)]
    pub default_format: OutputFormat,

    #[serde(default)]
    pub default_min_score: Option<f32>,
}

fn default_top_k() -> u32 {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            default_format: OutputFormat::Text,
            default_min_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectsConfig {
    #[serde(default = "default_project_id")]
    pub default_project_id: String,

    #[serde(default = "default_project_name")]
    pub default_project_name: String,
}

fn default_project_id() -> String {
    DEFAULT_PROJECT_ID.to_string()
}

fn default_project_name() -> String {
    "Default".to_string()
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            default_project_id: default_project_id(),
            default_project_name: default_project_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_max_bundle_mb")]
    pub max_bundle_mb: u64,

    #[serde(default = "default_max_unpacked_mb")]
    pub max_unpacked_mb: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_bundle_mb() -> u64 {
    200
}

fn default_max_unpacked_mb() -> u64 {
    600
}

fn default_max_entries() -> usize {
    4000
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_bundle_mb: default_max_bundle_mb(),
            max_unpacked_mb: default_max_unpacked_mb(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_true")]
    pub auto_start: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            socket_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.model_id, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.vector_store.driver, VectorDriver::Memory);
        assert_eq!(config.indexing.chunk_size, 1500);
        assert_eq!(config.indexing.chunk_overlap, 200);
        assert_eq!(config.indexing.max_source_chars, 200_000);
        assert_eq!(config.search.default_top_k, 5);
        assert_eq!(config.projects.default_project_id, DEFAULT_PROJECT_ID);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            model_id = "Qwen/Qwen3-Embedding-0.6B"
            profile = "instruct"

            [indexing]
            chunk_size = 800
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.profile, Some(EmbeddingProfile::Instruct));
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.indexing.chunk_size, 800);
        assert_eq!(config.indexing.chunk_overlap, 200);
        assert_eq!(config.vector_store.collection_prefix, "nb");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("NBINDEX_EMBEDDING_MODEL", "BAAI/bge-small-en"),
            ("NBINDEX_EMBEDDING_PROFILE", "plain"),
            ("NBINDEX_CHUNK_SIZE", "400"),
            ("NBINDEX_CHUNK_OVERLAP", "not-a-number"),
            ("NBINDEX_VECTOR_DRIVER", "qdrant"),
            ("NBINDEX_DEFAULT_PROJECT", "  "),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.embedding.model_id, "BAAI/bge-small-en");
        assert_eq!(config.embedding.profile, Some(EmbeddingProfile::Plain));
        assert_eq!(config.indexing.chunk_size, 400);
        assert_eq!(config.indexing.chunk_overlap, 200);
        assert_eq!(config.vector_store.driver, VectorDriver::Qdrant);
        assert_eq!(config.projects.default_project_id, DEFAULT_PROJECT_ID);
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_size() {
        let mut config = Config::default();
        config.indexing.chunk_size = 100;
        config.indexing.chunk_overlap = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_pid_path_next_to_socket() {
        let mut config = Config::default();
        config.daemon.socket_path = Some(PathBuf::from("/tmp/nbx/test.sock"));
        assert_eq!(config.pid_path(), PathBuf::from("/tmp/nbx/test.pid"));
    }
}
