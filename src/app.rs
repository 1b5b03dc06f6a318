//! Process-scoped application context.
//!
//! All long-lived components (the tiered cache, the three source adapters,
//! the summarization client, the orchestrator with its shared limiter) are
//! constructed exactly once at startup and passed explicitly to whatever
//! needs them — no global singletons.

use std::sync::Arc;

use crate::cache::TieredCache;
use crate::claude::SummarizerClient;
use crate::community::CommunityAdapter;
use crate::config::{Config, Credentials};
use crate::docs::DocsAdapter;
use crate::github::GitHubAdapter;
use crate::orchestrator::Orchestrator;

pub struct AppContext {
    pub config: Config,
    pub cache: Arc<TieredCache>,
    pub orchestrator: Arc<Orchestrator>,
    /// Whether a repository-API token was supplied (health reporting only —
    /// the adapter works unauthenticated at a lower quota).
    pub github_configured: bool,
}

impl AppContext {
    pub async fn init(config: Config, credentials: Credentials) -> Self {
        let cache = Arc::new(TieredCache::connect(&config.cache).await);

        let github = GitHubAdapter::new(
            cache.clone(),
            credentials.github_token.as_deref(),
            config.limits.api_timeout_secs,
            config.cache.ttl.github_metrics,
        );
        let docs = DocsAdapter::new(
            cache.clone(),
            config.limits.scrape_timeout_secs,
            config.cache.ttl.docs_content,
        );
        let community = CommunityAdapter::new(
            cache.clone(),
            credentials.stackexchange_key.clone(),
            config.limits.api_timeout_secs,
            &config.cache.ttl,
        );
        let summarizer = SummarizerClient::new(
            &credentials.anthropic_api_key,
            &config.analysis.model,
            config.analysis.max_tokens,
            config.limits.summarize_timeout_secs,
        );

        let orchestrator = Arc::new(Orchestrator::new(
            cache.clone(),
            github,
            docs,
            community,
            summarizer,
            config.limits.max_concurrent_fetches,
            config.cache.ttl.analysis,
        ));

        Self {
            github_configured: credentials.github_token.is_some(),
            config,
            cache,
            orchestrator,
        }
    }
}
