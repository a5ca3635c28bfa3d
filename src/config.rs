use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Default user-facing message when no retrieved chunk clears the
/// relevance threshold. Kept configurable; this wording is what callers
/// show verbatim.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "I can only provide information based on the provided \
legal documents. Your question appears to be outside my knowledge base. Please ask about a \
relevant topic.";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"memory"` or `"chroma"`.
    #[serde(default = "default_index_provider")]
    pub provider: String,
    /// Base URL of the Chroma server (chroma provider only).
    #[serde(default = "default_chroma_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            url: default_chroma_url(),
            collection: default_collection(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_index_provider() -> String {
    "memory".to_string()
}
fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_collection() -> String {
    "legal_documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in words for the fallback chunking mode.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words shared between consecutive windows. Must be `< chunk_size`.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Documents written per index round trip. Also the resumability unit:
    /// a crash mid-ingestion loses at most one batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Results returned by default when the caller does not ask for a count.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Plain-retrieval cutoff: keep candidates with `similarity >= threshold`.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Context-assembly cutoff: keep candidates with `distance <= threshold`.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    /// The index is asked for `k * candidate_multiplier` raw hits so the
    /// filter has headroom before truncation.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Character budget for the assembled context string.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Answer returned when no chunk clears the relevance threshold.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            distance_threshold: default_distance_threshold(),
            candidate_multiplier: default_candidate_multiplier(),
            max_context_chars: default_max_context_chars(),
            fallback_message: default_fallback_message(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f64 {
    0.4
}
fn default_distance_threshold() -> f64 {
    1.1
}
fn default_candidate_multiplier() -> usize {
    2
}
fn default_max_context_chars() -> usize {
    4000
}
fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"hash"`, `"openai"`, or `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for the ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"disabled"` or `"openai"` (any OpenAI-compatible chat endpoint).
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MemoryConfig {
    /// Maximum retained turns per session. Unset means unbounded; set this
    /// in any long-lived deployment.
    #[serde(default)]
    pub max_turns: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7420".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Validate a configuration regardless of where it came from.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    // Window stepping is chunk_size - overlap; equal values would never advance.
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.ingestion.batch_size == 0 {
        anyhow::bail!("ingestion.batch_size must be > 0");
    }

    if !(1..=20).contains(&config.retrieval.top_k) {
        anyhow::bail!("retrieval.top_k must be in [1, 20]");
    }
    if config.retrieval.candidate_multiplier < 1 {
        anyhow::bail!("retrieval.candidate_multiplier must be >= 1");
    }
    if !config.retrieval.similarity_threshold.is_finite()
        || !config.retrieval.distance_threshold.is_finite()
    {
        anyhow::bail!("retrieval thresholds must be finite numbers");
    }
    if config.retrieval.distance_threshold < 0.0 {
        anyhow::bail!("retrieval.distance_threshold must be >= 0");
    }

    match config.index.provider.as_str() {
        "memory" | "chroma" => {}
        other => anyhow::bail!(
            "Unknown index provider: '{}'. Must be memory or chroma.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "hash" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or ollama.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.provider == "openai" && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be specified for the openai provider");
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        validate(&config).unwrap();
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.similarity_threshold - 0.4).abs() < 1e-9);
        assert!((config.retrieval.distance_threshold - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let mut config = Config::default();
        config.chunking.chunk_size = 50;
        config.chunking.overlap = 50;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("overlap"), "unexpected error: {}", err);
    }

    #[test]
    fn test_top_k_range() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(validate(&config).is_err());
        config.retrieval.top_k = 21;
        assert!(validate(&config).is_err());
        config.retrieval.top_k = 20;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let mut config = Config::default();
        config.index.provider = "faiss".to_string();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.embedding.provider = "magic".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[chunking]
chunk_size = 256
overlap = 32

[retrieval]
top_k = 3
distance_threshold = 0.9

[server]
bind = "127.0.0.1:9000"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 256);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        // Untouched sections keep their defaults.
        assert_eq!(config.ingestion.batch_size, 50);
    }

    #[test]
    fn test_load_config_rejects_bad_chunking() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[chunking]
chunk_size = 10
overlap = 12
"#
        )
        .unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
