//! Configuration for the question-answering engine.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. API keys are never stored here, only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};

use docqa_documents::ReaderConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::generation::DEFAULT_CHAT_MODEL;
use crate::query::DEFAULT_TOP_K;
use crate::synthesizer::{DEFAULT_ASSISTANT_ROLE, DEFAULT_MIN_RELEVANCE};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Corpus location and reader settings.
    pub corpus: CorpusConfig,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Generation backend configuration.
    pub generation: GenerationConfig,

    /// Durable embedding cache configuration.
    pub cache: CacheConfig,

    /// Query processing configuration.
    pub query: QueryConfig,
}

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else `docqa.toml` if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.top_k == 0 {
            return Err(ConfigError::Invalid("query.top_k must be > 0".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.query.min_relevance) {
            return Err(ConfigError::Invalid(
                "query.min_relevance must be within [-1, 1]".to_string(),
            ));
        }
        if self.embedding.timeout_secs == 0 || self.generation.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(
                "generation.temperature must be within [0, 2]".to_string(),
            ));
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_tokens must be > 0".to_string(),
            ));
        }
        if self.cache.backend == CacheBackend::Http && self.cache.url.is_none() {
            return Err(ConfigError::Invalid(
                "cache.url is required for the http cache backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the corpus lives and how it is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Corpus directory.
    pub dir: PathBuf,

    /// Reader settings (extensions, id scheme, depth).
    #[serde(flatten)]
    pub reader: ReaderConfig,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./word"),
            reader: ReaderConfig::default(),
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings.
    pub model: String,

    /// API base URL.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Expected dimension, if the model supports choosing one.
    pub dimensions: Option<usize>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: docqa_embeddings::provider::DEFAULT_MODEL.to_string(),
            base_url: docqa_embeddings::provider::DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimensions: None,
            timeout_secs: 30,
        }
    }
}

/// Configuration for the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Chat model.
    pub model: String,

    /// API base URL.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Upper bound on generated tokens.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Who the assistant is, used in the system instruction.
    pub assistant_role: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            base_url: docqa_embeddings::provider::DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 300,
            temperature: 0.7,
            timeout_secs: 60,
            assistant_role: DEFAULT_ASSISTANT_ROLE.to_string(),
        }
    }
}

/// Which durable cache backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// No caching.
    None,
    /// JSON file on local disk.
    #[default]
    File,
    /// JSON blob behind an HTTP URL.
    Http,
}

/// Configuration for the durable embedding cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which backend to use.
    pub backend: CacheBackend,

    /// File path for the `file` backend.
    pub path: PathBuf,

    /// Blob URL for the `http` backend.
    pub url: Option<String>,

    /// Environment variable holding a bearer token for the `http` backend.
    pub token_env: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File,
            path: dirs::cache_dir()
                .map(|dir| dir.join("docqa"))
                .unwrap_or_else(|| PathBuf::from("."))
                .join("embedding_cache.json"),
            url: None,
            token_env: None,
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of documents retrieved per query.
    pub top_k: usize,

    /// Minimum cosine similarity for a document to count as context.
    pub min_relevance: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_relevance: DEFAULT_MIN_RELEVANCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_documents::IdScheme;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [corpus]
            dir = "/srv/docs"
            id_scheme = "path"
            extensions = ["docx"]

            [query]
            min_relevance = 0.45
            "#,
        )
        .unwrap();

        assert_eq!(config.corpus.dir, PathBuf::from("/srv/docs"));
        assert_eq!(config.corpus.reader.id_scheme, IdScheme::Path);
        assert_eq!(config.corpus.reader.extensions, vec!["docx"]);
        assert_eq!(config.query.top_k, 5);
        assert_eq!(config.query.min_relevance, 0.45);
        assert_eq!(config.generation, GenerationConfig::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(AppConfig::from_toml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_validation() {
        let zero_k = "[query]\ntop_k = 0\n";
        assert!(matches!(
            AppConfig::from_toml_str(zero_k),
            Err(ConfigError::Invalid(_))
        ));

        let bad_threshold = "[query]\nmin_relevance = 1.5\n";
        assert!(matches!(
            AppConfig::from_toml_str(bad_threshold),
            Err(ConfigError::Invalid(_))
        ));

        let http_without_url = "[cache]\nbackend = \"http\"\n";
        assert!(matches!(
            AppConfig::from_toml_str(http_without_url),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[cache]\nbackend = \"redis\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docqa.toml");
        std::fs::write(
            &path,
            "[cache]\nbackend = \"http\"\nurl = \"https://blobs.example/cache.json\"\n",
        )
        .unwrap();

        let config = AppConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Http);
        assert_eq!(
            config.cache.url.as_deref(),
            Some("https://blobs.example/cache.json")
        );
    }
}
