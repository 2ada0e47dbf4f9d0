use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_INDEX_NAME: &str = "symptoms";
pub const DEFAULT_INTER_RECORD_DELAY_MS: u64 = 1500;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY_ENV: &str = "PINECONE_API_KEY";
pub const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";
pub const PINECONE_INDEX_HOST_ENV: &str = "PINECONE_INDEX_HOST";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vecingest").join("config.toml"))
    }

    /// Load from an explicit path, or the default location if it exists,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Overlay credentials and endpoints from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup(OPENAI_API_KEY_ENV) {
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = lookup("VECINGEST_EMBEDDING_URL") {
            self.embedding.url = url;
        }
        if let Some(model) = lookup("VECINGEST_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        let index_key_env = match self.index.driver {
            IndexDriver::Qdrant => Some(QDRANT_API_KEY_ENV),
            IndexDriver::Pinecone => Some(PINECONE_API_KEY_ENV),
            IndexDriver::Memory => None,
        };
        if let Some(key) = index_key_env.and_then(|env| lookup(env)) {
            self.index.api_key = Some(key);
        }
        if self.index.driver == IndexDriver::Pinecone
            && let Some(host) = lookup(PINECONE_INDEX_HOST_ENV)
        {
            self.index.url = host;
        }
        if let Some(name) = lookup("PINECONE_INDEX_NAME") {
            self.index.name = name;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "embedding.model must not be empty".to_string(),
            ));
        }
        let retry = &self.embedding.retry;
        if retry.max_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.retry.max_delay_ms must be greater than 0".to_string(),
            ));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "embedding.retry.base_delay_ms ({}) exceeds max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }
        if self.index.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "index.name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    /// Send `dimensions` in the request, for models that support shortening.
    #[serde(default)]
    pub send_dimensions: bool,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            send_dimensions: false,
            timeout_secs: default_timeout(),
            retry: RetrySettings::default(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub honor_retry_after: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            honor_retry_after: true,
        }
    }
}

/// Vector index backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDriver {
    #[default]
    Pinecone,
    Qdrant,
    /// In-process index, nothing leaves the machine.
    Memory,
}

impl std::str::FromStr for IndexDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pinecone" => Ok(IndexDriver::Pinecone),
            "qdrant" => Ok(IndexDriver::Qdrant),
            "memory" => Ok(IndexDriver::Memory),
            _ => Err(format!("unknown index driver: {}", s)),
        }
    }
}

impl std::fmt::Display for IndexDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexDriver::Pinecone => write!(f, "pinecone"),
            IndexDriver::Qdrant => write!(f, "qdrant"),
            IndexDriver::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub driver: IndexDriver,

    /// Index host for Pinecone, gRPC endpoint for Qdrant.
    /// Empty means the driver's default; Pinecone has none.
    #[serde(default)]
    pub url: String,

    /// Pinecone index name or Qdrant collection.
    #[serde(default = "default_index_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

impl IndexConfig {
    /// Configured url, or the driver default when unset.
    pub fn effective_url(&self) -> &str {
        let url = self.url.trim();
        match self.driver {
            IndexDriver::Qdrant if url.is_empty() => DEFAULT_QDRANT_URL,
            _ => url,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            driver: IndexDriver::default(),
            url: String::new(),
            name: default_index_name(),
            namespace: None,
            timeout_secs: default_timeout(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_inter_record_delay_ms")]
    pub inter_record_delay_ms: u64,
}

fn default_inter_record_delay_ms() -> u64 {
    DEFAULT_INTER_RECORD_DELAY_MS
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            inter_record_delay_ms: default_inter_record_delay_ms(),
        }
    }
}
