use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub feed: FeedConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Directory for lexical/vector index snapshots.
    pub index_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// Base URL of the publication change feed.
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_page_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

fn default_overlap() -> usize {
    0
}

/// BM25 parameters. `k1` controls term-frequency saturation, `b` controls
/// length-normalization strength.
#[derive(Debug, Deserialize, Clone)]
pub struct LexicalConfig {
    #[serde(default = "default_k1")]
    pub k1: f64,
    #[serde(default = "default_b")]
    pub b: f64,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
        }
    }
}

fn default_k1() -> f64 {
    1.2
}
fn default_b() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// Similarity measure: `cosine` or `dot`.
    #[serde(default = "default_metric")]
    pub metric: String,
    /// Candidate-list width during graph construction.
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    /// Candidate-list width at query time: the explicit recall/latency
    /// knob. Raising it never decreases recall.
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
        }
    }
}

fn default_metric() -> String {
    "cosine".to_string()
}
fn default_ef_construction() -> usize {
    200
}
fn default_ef_search() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled` or `http`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Environment variable holding the bearer token, if the endpoint
    /// requires one.
    #[serde(default)]
    pub api_key_env: Option<String>,
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
            provider: "disabled".to_string(),
            endpoint: None,
            model: None,
            dims: None,
            api_key_env: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
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
pub struct RetrievalConfig {
    /// Lexical weight in the fused score: `alpha·bm25 + (1-alpha)·ann`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Candidate pool per signal, as a multiple of the requested result
    /// count.
    #[serde(default = "default_oversample")]
    pub oversample: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    /// Per-signal score normalization before fusion: `minmax` or `zscore`.
    #[serde(default = "default_normalization")]
    pub normalization: String,
    /// Bound on each retrieval signal; a signal that misses the deadline
    /// degrades the response to partial instead of failing it.
    #[serde(default = "default_signal_timeout_ms")]
    pub signal_timeout_ms: u64,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_snippet_overlap")]
    pub snippet_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            oversample: default_oversample(),
            final_limit: default_final_limit(),
            normalization: default_normalization(),
            signal_timeout_ms: default_signal_timeout_ms(),
            snippet_chars: default_snippet_chars(),
            snippet_overlap: default_snippet_overlap(),
        }
    }
}

fn default_alpha() -> f64 {
    0.5
}
fn default_oversample() -> usize {
    4
}
fn default_final_limit() -> usize {
    8
}
fn default_normalization() -> String {
    "minmax".to_string()
}
fn default_signal_timeout_ms() -> u64 {
    2_000
}
fn default_snippet_chars() -> usize {
    250
}
fn default_snippet_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Parallel document workers; backpressure against the feed and the
    /// embedding provider.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Documents per index batch; the index cursor advances per batch.
    #[serde(default = "default_batch")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_batch() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Facets at or above this confidence become authoritative and usable
    /// for hard filtering; below it they are stored but flagged.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_confidence_threshold() -> f32 {
    0.7
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
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
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.lexical.k1 <= 0.0 {
        anyhow::bail!("lexical.k1 must be > 0");
    }
    if !(0.0..=1.0).contains(&config.lexical.b) {
        anyhow::bail!("lexical.b must be in [0.0, 1.0]");
    }

    match config.vector.metric.as_str() {
        "cosine" | "dot" => {}
        other => anyhow::bail!("Unknown vector.metric: '{}'. Must be cosine or dot.", other),
    }
    if config.vector.ef_search == 0 {
        anyhow::bail!("vector.ef_search must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.alpha) {
        anyhow::bail!("retrieval.alpha must be in [0.0, 1.0]");
    }
    if config.retrieval.oversample == 0 {
        anyhow::bail!("retrieval.oversample must be >= 1");
    }
    if config.retrieval.final_limit == 0 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    match config.retrieval.normalization.as_str() {
        "minmax" | "zscore" => {}
        other => anyhow::bail!(
            "Unknown retrieval.normalization: '{}'. Must be minmax or zscore.",
            other
        ),
    }

    if config.ingest.concurrency == 0 {
        anyhow::bail!("ingest.concurrency must be >= 1");
    }
    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.provider != "http" {
            anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled or http.",
                config.embedding.provider
            );
        }
        if config.embedding.endpoint.is_none() {
            anyhow::bail!("embedding.endpoint required when provider is 'http'");
        }
        if config.embedding.model.is_none() {
            anyhow::bail!("embedding.model required when provider is 'http'");
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0 when provider is 'http'");
        }
    }

    if !(0.0..=1.0).contains(&config.enrichment.confidence_threshold) {
        anyhow::bail!("enrichment.confidence_threshold must be in [0.0, 1.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> String {
        r#"
[store]
path = "/tmp/dagsorden.sqlite"
index_dir = "/tmp/dagsorden-index"

[feed]
base_url = "https://publication.example.dk/api"

[chunking]
max_tokens = 256
"#
        .to_string()
    }

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(&minimal_toml()).unwrap();
        assert_eq!(config.lexical.k1, 1.2);
        assert_eq!(config.lexical.b, 0.75);
        assert_eq!(config.vector.metric, "cosine");
        assert_eq!(config.retrieval.alpha, 0.5);
        assert_eq!(config.retrieval.oversample, 4);
        assert_eq!(config.retrieval.normalization, "minmax");
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.ingest.concurrency, 4);
    }

    #[test]
    fn test_alpha_out_of_range_rejected() {
        let toml_str = format!("{}\n[retrieval]\nalpha = 1.5\n", minimal_toml());
        assert!(parse(&toml_str).is_err());
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let toml_str = format!("{}\n[vector]\nmetric = \"euclid\"\n", minimal_toml());
        assert!(parse(&toml_str).is_err());
    }

    #[test]
    fn test_http_embedding_requires_endpoint_and_dims() {
        let toml_str = format!("{}\n[embedding]\nprovider = \"http\"\n", minimal_toml());
        assert!(parse(&toml_str).is_err());

        let toml_str = format!(
            "{}\n[embedding]\nprovider = \"http\"\nendpoint = \"https://e.example/v1/embeddings\"\nmodel = \"bge-m3\"\ndims = 1024\n",
            minimal_toml()
        );
        assert!(parse(&toml_str).is_ok());
    }

    #[test]
    fn test_bm25_overrides() {
        let toml_str = format!("{}\n[lexical]\nk1 = 0.9\nb = 0.3\n", minimal_toml());
        let config = parse(&toml_str).unwrap();
        assert_eq!(config.lexical.k1, 0.9);
        assert_eq!(config.lexical.b, 0.3);
    }
}
