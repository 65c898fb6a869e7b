use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Path of the persisted index: a single SQLite file, replaced atomically
    /// on every ingest.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Root of the source tree to ingest.
    pub root: PathBuf,
    /// File extension allow-list. Files with any other extension are skipped.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_extensions() -> Vec<String> {
    [
        "py", "txt", "md", "json", "html", "cshtml", "sql", "cs", "js", "xml", "rs", "ts", "go",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
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
    1000
}
fn default_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_candidate_k_vector")]
    pub candidate_k_vector: usize,
    #[serde(default = "default_candidate_k_lexical")]
    pub candidate_k_lexical: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            lexical_weight: default_lexical_weight(),
            candidate_k_vector: default_candidate_k_vector(),
            candidate_k_lexical: default_candidate_k_lexical(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_vector_weight() -> f64 {
    0.5
}
fn default_lexical_weight() -> f64 {
    0.5
}
fn default_candidate_k_vector() -> usize {
    5
}
fn default_candidate_k_lexical() -> usize {
    4
}
fn default_final_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Maximum number of (question, answer) turns kept in a conversation.
    /// Older turns are dropped FIFO so the assembled prompt stays bounded.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
        }
    }
}

fn default_history_cap() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hash` (deterministic, offline) or `openai` (HTTP API).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embeddings_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            endpoint: default_embeddings_endpoint(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    128
}
fn default_embeddings_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `static` (fixed offline reply) or `openai` (HTTP chat completions).
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_static_reply")]
    pub static_reply: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            endpoint: default_chat_endpoint(),
            static_reply: default_static_reply(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "static".to_string()
}
fn default_chat_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_static_reply() -> String {
    "No generation provider is configured; this is a canned reply.".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocatorConfig {
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Inner-text excerpt length used when building element descriptors.
    #[serde(default = "default_text_excerpt_chars")]
    pub text_excerpt_chars: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            max_matches: default_max_matches(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            text_excerpt_chars: default_text_excerpt_chars(),
        }
    }
}

fn default_min_similarity() -> f64 {
    0.2
}
fn default_max_matches() -> usize {
    3
}
fn default_fetch_timeout_secs() -> u64 {
    5
}
fn default_text_excerpt_chars() -> usize {
    500
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    for (name, w) in [
        ("retrieval.vector_weight", config.retrieval.vector_weight),
        ("retrieval.lexical_weight", config.retrieval.lexical_weight),
    ] {
        if !(0.0..=1.0).contains(&w) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if config.retrieval.vector_weight + config.retrieval.lexical_weight <= 0.0 {
        anyhow::bail!("retrieval weights must not both be zero");
    }

    // Validate session
    if config.session.history_cap < 1 {
        anyhow::bail!("session.history_cap must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "hash" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.provider == "openai" && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be specified when provider is 'openai'");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "static" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be static or openai.",
            other
        ),
    }
    if config.generation.provider == "openai" && config.generation.model.is_none() {
        anyhow::bail!("generation.model must be specified when provider is 'openai'");
    }

    // Validate locator
    if !(0.0..=1.0).contains(&config.locator.min_similarity) {
        anyhow::bail!("locator.min_similarity must be in [0.0, 1.0]");
    }
    if config.locator.max_matches < 1 {
        anyhow::bail!("locator.max_matches must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("codeask.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let (_tmp, path) = write_config(
            r#"
            [index]
            path = "data/index.sqlite"

            [ingest]
            root = "src"
            "#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 150);
        assert_eq!(config.retrieval.vector_weight, 0.5);
        assert_eq!(config.retrieval.candidate_k_vector, 5);
        assert_eq!(config.retrieval.candidate_k_lexical, 4);
        assert_eq!(config.retrieval.final_limit, 5);
        assert_eq!(config.session.history_cap, 10);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.generation.provider, "static");
        assert!((config.locator.min_similarity - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.locator.max_matches, 3);
        assert!(config.ingest.extensions.iter().any(|e| e == "py"));
    }

    #[test]
    fn test_rejects_overlap_ge_chunk_size() {
        let (_tmp, path) = write_config(
            r#"
            [index]
            path = "data/index.sqlite"

            [ingest]
            root = "src"

            [chunking]
            chunk_size = 100
            overlap = 100
            "#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_unknown_embedding_provider() {
        let (_tmp, path) = write_config(
            r#"
            [index]
            path = "data/index.sqlite"

            [ingest]
            root = "src"

            [embedding]
            provider = "quantum"
            "#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_weight() {
        let (_tmp, path) = write_config(
            r#"
            [index]
            path = "data/index.sqlite"

            [ingest]
            root = "src"

            [retrieval]
            vector_weight = 1.5
            "#,
        );
        assert!(load_config(&path).is_err());
    }
}
