use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_COLLECTION: &str = "financial_data";
const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_LLM_MODEL: &str = "deepseek-coder:1.3b-instruct";
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_MAX_NEW_TOKENS: u32 = 200;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the statement QA server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores row embeddings.
    pub qdrant_url: String,
    /// Name of the collection holding the indexed statement rows.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate row and query vectors.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Causal language model used to answer questions.
    pub llm_model: String,
    /// Compute device requested for model inference.
    pub device: Device,
    /// Number of nearest rows retrieved per query.
    pub retrieval_top_k: usize,
    /// Whether every query shares one context or receives its own.
    pub context_mode: ContextMode,
    /// How generation failures affect the rest of a batch.
    pub generation_failure_policy: FailurePolicy,
    /// Upper bound on generated tokens per answer.
    pub generation_max_new_tokens: u32,
    /// Drop every stored row before indexing a new table.
    pub index_clear_before_upsert: bool,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hashing embeddings, useful offline and in tests.
    Hash,
}

/// Compute device for local inference, resolved once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Pick an accelerator when one is present, otherwise the CPU.
    Auto,
    /// Force CPU inference.
    Cpu,
    /// NVIDIA GPU.
    Cuda,
    /// Apple Metal.
    Mps,
}

/// Context composition strategy for a batch of queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Each query is answered from the rows retrieved for it.
    #[default]
    PerQuery,
    /// Rows retrieved for every query are merged into one shared context.
    Shared,
}

/// Failure handling for batched answer generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// A failed entry only affects itself.
    #[default]
    PerItem,
    /// Any failure replaces every answer in the batch with the error placeholder.
    Batch,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: parse_optional("EMBEDDING_PROVIDER")?
                .unwrap_or(EmbeddingProvider::Ollama),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            device: parse_optional::<Device>("DEVICE")?
                .unwrap_or(Device::Auto)
                .resolve(),
            retrieval_top_k: parse_optional("RETRIEVAL_TOP_K")?.unwrap_or(DEFAULT_TOP_K),
            context_mode: parse_optional("CONTEXT_MODE")?.unwrap_or_default(),
            generation_failure_policy: parse_optional("GENERATION_FAILURE_POLICY")?
                .unwrap_or_default(),
            generation_max_new_tokens: parse_optional("GENERATION_MAX_NEW_TOKENS")?
                .unwrap_or(DEFAULT_MAX_NEW_TOKENS),
            index_clear_before_upsert: parse_optional("INDEX_CLEAR_BEFORE_UPSERT")?
                .unwrap_or(true),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "mps" | "metal" => Ok(Self::Mps),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ContextMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "per_query" => Ok(Self::PerQuery),
            "shared" => Ok(Self::Shared),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "per_item" => Ok(Self::PerItem),
            "batch" => Ok(Self::Batch),
            _ => Err(()),
        }
    }
}

impl Device {
    /// Replace [`Device::Auto`] with the accelerator detected on this host.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto => detect_device(),
            explicit => explicit,
        }
    }

    /// Whether inference should stay off accelerators.
    pub fn is_cpu(self) -> bool {
        matches!(self, Self::Cpu)
    }
}

fn detect_device() -> Device {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        Device::Mps
    } else if std::path::Path::new("/dev/nvidia0").exists() {
        Device::Cuda
    } else {
        Device::Cpu
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        device = ?config.device,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_names_case_insensitively() {
        assert_eq!("Shared".parse::<ContextMode>(), Ok(ContextMode::Shared));
        assert_eq!("per-query".parse::<ContextMode>(), Ok(ContextMode::PerQuery));
        assert_eq!("BATCH".parse::<FailurePolicy>(), Ok(FailurePolicy::Batch));
        assert_eq!("per_item".parse::<FailurePolicy>(), Ok(FailurePolicy::PerItem));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn explicit_devices_survive_resolution() {
        assert_eq!(Device::Cpu.resolve(), Device::Cpu);
        assert_eq!(Device::Cuda.resolve(), Device::Cuda);
        assert_ne!(Device::Auto.resolve(), Device::Auto);
        assert!(Device::Cpu.is_cpu());
        assert_eq!("metal".parse::<Device>(), Ok(Device::Mps));
    }
}
