use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
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
    "127.0.0.1:3001".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// SQLite file backing the durable tier.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// When false the durable tier is skipped entirely and only the
    /// in-process store is used.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            enabled: true,
            ttl: CacheTtlConfig::default(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/stackindex.sqlite")
}

fn default_true() -> bool {
    true
}

/// Per-source TTLs in seconds. High-churn sources get short TTLs, scraped
/// documentation gets a long one, finished analyses sit in between.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheTtlConfig {
    #[serde(default = "default_ttl_github")]
    pub github_metrics: u64,
    #[serde(default = "default_ttl_docs")]
    pub docs_content: u64,
    #[serde(default = "default_ttl_stackoverflow")]
    pub community_stackoverflow: u64,
    #[serde(default = "default_ttl_reddit")]
    pub community_reddit: u64,
    #[serde(default = "default_ttl_npm")]
    pub community_npm: u64,
    #[serde(default = "default_ttl_analysis")]
    pub analysis: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            github_metrics: default_ttl_github(),
            docs_content: default_ttl_docs(),
            community_stackoverflow: default_ttl_stackoverflow(),
            community_reddit: default_ttl_reddit(),
            community_npm: default_ttl_npm(),
            analysis: default_ttl_analysis(),
        }
    }
}

fn default_ttl_github() -> u64 {
    15 * 60
}
fn default_ttl_docs() -> u64 {
    24 * 60 * 60
}
fn default_ttl_stackoverflow() -> u64 {
    60 * 60
}
fn default_ttl_reddit() -> u64 {
    30 * 60
}
fn default_ttl_npm() -> u64 {
    60 * 60
}
fn default_ttl_analysis() -> u64 {
    6 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Maximum concurrent per-tool fetch pipelines across the process.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,
    #[serde(default = "default_summarize_timeout")]
    pub summarize_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent(),
            api_timeout_secs: default_api_timeout(),
            scrape_timeout_secs: default_scrape_timeout(),
            summarize_timeout_secs: default_summarize_timeout(),
        }
    }
}

fn default_max_concurrent() -> usize {
    10
}
fn default_api_timeout() -> u64 {
    10
}
fn default_scrape_timeout() -> u64 {
    15
}
fn default_summarize_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}

/// Secrets supplied through the environment rather than the config file.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub anthropic_api_key: String,
    pub github_token: Option<String>,
    pub stackexchange_key: Option<String>,
}

impl Credentials {
    /// Read credentials from the environment. The summarization key is the
    /// only hard requirement; everything else degrades gracefully.
    pub fn from_env() -> Result<Self> {
        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .context("ANTHROPIC_API_KEY environment variable not set")?;

        Ok(Self {
            anthropic_api_key,
            github_token: std::env::var("GITHUB_TOKEN").ok().filter(|v| !v.is_empty()),
            stackexchange_key: std::env::var("STACKEXCHANGE_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
        })
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
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.limits.max_concurrent_fetches == 0 {
        anyhow::bail!("limits.max_concurrent_fetches must be >= 1");
    }

    let ttls = [
        ("cache.ttl.github_metrics", config.cache.ttl.github_metrics),
        ("cache.ttl.docs_content", config.cache.ttl.docs_content),
        (
            "cache.ttl.community_stackoverflow",
            config.cache.ttl.community_stackoverflow,
        ),
        (
            "cache.ttl.community_reddit",
            config.cache.ttl.community_reddit,
        ),
        ("cache.ttl.community_npm", config.cache.ttl.community_npm),
        ("cache.ttl.analysis", config.cache.ttl.analysis),
    ];
    for (name, value) in ttls {
        if value == 0 {
            anyhow::bail!("{} must be > 0", name);
        }
    }

    if config.analysis.model.trim().is_empty() {
        anyhow::bail!("analysis.model must not be empty");
    }

    Ok(())
}

impl Config {
    /// A default configuration for tests and one-off commands that do not
    /// read a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}
