//! Analysis orchestration.
//!
//! Parses the request into an ordered tool list, fans out per-tool fetches
//! across the three source adapters under a shared concurrency limiter,
//! merges the results into bundles, hands them to the summarization client
//! exactly once, enriches the output positionally with live metrics, and
//! owns the whole-response cache.
//!
//! Adapter failures never surface here — a request where every source came
//! back empty still succeeds, with metadata recording that nothing
//! contributed. The only fatal failure is the summarization call itself.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::cache::{self, TieredCache};
use crate::claude::SummarizerClient;
use crate::community::CommunityAdapter;
use crate::docs::DocsAdapter;
use crate::error::AnalysisError;
use crate::github::GitHubAdapter;
use crate::models::{
    format_number, AnalysisKind, AnalysisMetadata, AnalysisReport, AnalysisResponse,
    ComparisonAnalysis, DataAge, DeepDiveAnalysis, SourceFlags, ToolBundle, ToolMetrics,
};

/// Separator precedence for splitting a query into tool names. The first
/// separator found in the lower-cased input wins and splits the whole
/// string.
const SEPARATORS: [&str; 6] = [" vs ", " vs. ", ",", " and ", " or ", " versus "];

/// Longest accepted query, shared with the HTTP validation layer.
pub const MAX_INPUT_LEN: usize = 200;

fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    find_ignore_ascii_case(haystack, needle, 0).is_some()
}

fn find_ignore_ascii_case(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Split `input` by every case-insensitive occurrence of `separator`.
/// Separators are ASCII, so byte offsets into the original string line up.
fn split_ignore_ascii_case<'a>(input: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(pos) = find_ignore_ascii_case(input, separator, start) {
        parts.push(&input[start..pos]);
        start = pos + separator.len();
    }
    parts.push(&input[start..]);
    parts
}

/// Detect the analysis kind from raw input: any recognized separator means
/// a comparison, otherwise a deep dive.
pub fn detect_analysis_kind(input: &str) -> AnalysisKind {
    if SEPARATORS
        .iter()
        .any(|sep| contains_ignore_ascii_case(input, sep))
    {
        AnalysisKind::Comparison
    } else {
        AnalysisKind::DeepDive
    }
}

/// Parse raw input into an ordered list of tool names. Deterministic: the
/// first separator (in precedence order) present in the input splits the
/// whole string; without one, the trimmed input is the single tool.
pub fn parse_tools(input: &str) -> Vec<String> {
    for separator in SEPARATORS {
        if contains_ignore_ascii_case(input, separator) {
            return split_ignore_ascii_case(input, separator)
                .into_iter()
                .map(str::trim)
                .filter(|tool| !tool.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    vec![input.trim().to_string()]
}

/// Per-request options accepted by [`Orchestrator::analyze`].
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Bypass the whole-response cache read (the fresh result is still
    /// written back).
    pub skip_cache: bool,
    /// When false, enrichment leaves the `metrics` field unset.
    pub include_metrics: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            skip_cache: false,
            include_metrics: true,
        }
    }
}

pub struct Orchestrator {
    cache: Arc<TieredCache>,
    github: GitHubAdapter,
    docs: DocsAdapter,
    community: CommunityAdapter,
    summarizer: SummarizerClient,
    limiter: Arc<Semaphore>,
    analysis_ttl: u64,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<TieredCache>,
        github: GitHubAdapter,
        docs: DocsAdapter,
        community: CommunityAdapter,
        summarizer: SummarizerClient,
        max_concurrent_fetches: usize,
        analysis_ttl: u64,
    ) -> Self {
        Self {
            cache,
            github,
            docs,
            community,
            summarizer,
            limiter: Arc::new(Semaphore::new(max_concurrent_fetches)),
            analysis_ttl,
        }
    }

    /// Run a full analysis for the given input and kind.
    pub async fn analyze(
        &self,
        input: &str,
        kind: AnalysisKind,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResponse, AnalysisError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AnalysisError::Validation("input must not be empty".into()));
        }
        if trimmed.len() > MAX_INPUT_LEN {
            return Err(AnalysisError::Validation(format!(
                "input exceeds {} characters",
                MAX_INPUT_LEN
            )));
        }

        let key = cache::analysis_key(input, kind);
        if !options.skip_cache {
            if let Some(cached) = self.cache.get_json::<AnalysisResponse>(&key).await {
                info!(input, kind = kind.as_str(), "analysis cache hit");
                return Ok(cached);
            }
        }

        let tools = parse_tools(input);
        if tools.is_empty() {
            return Err(AnalysisError::Validation(
                "no tool names found in input".into(),
            ));
        }
        info!(?tools, kind = kind.as_str(), "starting analysis");

        let started = std::time::Instant::now();
        let bundles = self.fetch_all(&tools).await;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "data fetch complete");

        let (analysis, tokens_used) = match kind {
            AnalysisKind::Comparison => {
                let (mut comparison, tokens) =
                    self.summarizer.analyze_comparison(&bundles).await?;
                enrich_comparison(&mut comparison, &bundles, options.include_metrics);
                (AnalysisReport::Comparison(comparison), tokens)
            }
            AnalysisKind::DeepDive => {
                // parse_tools returned at least one name, so the first
                // bundle always exists.
                let bundle = &bundles[0];
                let (mut deep_dive, tokens) = self.summarizer.analyze_deep_dive(bundle).await?;
                enrich_deep_dive(&mut deep_dive, bundle, options.include_metrics);
                (AnalysisReport::DeepDive(deep_dive), tokens)
            }
        };

        let response = AnalysisResponse {
            metadata: build_metadata(&bundles, tokens_used),
            analysis,
        };

        self.cache
            .set_json(&key, &response, self.analysis_ttl)
            .await;

        Ok(response)
    }

    /// Fetch bundles for every tool, preserving input order. Each per-tool
    /// pipeline holds one limiter permit; pipelines beyond the limit queue
    /// in FIFO order.
    async fn fetch_all(&self, tools: &[String]) -> Vec<ToolBundle> {
        join_all(tools.iter().map(|tool| async move {
            let _permit = self.limiter.acquire().await.ok();
            self.fetch_tool(tool).await
        }))
        .await
    }

    /// Fetch one tool's bundle. Repository metrics and community signals
    /// are independent and run concurrently; documentation follows so it
    /// can fall back to the fetched README.
    async fn fetch_tool(&self, tool: &str) -> ToolBundle {
        let (github, community) = tokio::join!(
            self.github.fetch_data(tool),
            self.community.fetch_data(tool),
        );

        let readme = github
            .as_ref()
            .and_then(|g| g.readme.as_ref())
            .map(|r| r.content.as_str());
        let docs = self.docs.fetch_data(tool, readme).await;

        ToolBundle {
            tool: tool.to_string(),
            github,
            docs,
            community,
        }
    }

    /// Warm the cache for a list of tools: data fetch only, no
    /// summarization. Per-tool failures are logged, never surfaced.
    pub async fn prefetch(&self, tools: &[String]) {
        info!(count = tools.len(), "prefetching tools");
        join_all(tools.iter().map(|tool| async move {
            let _permit = self.limiter.acquire().await.ok();
            let bundle = self.fetch_tool(tool).await;
            if bundle.github.is_none() && bundle.docs.is_none() && bundle.community.is_none() {
                warn!(tool, "prefetch produced no data");
            } else {
                info!(tool, "prefetched");
            }
        }))
        .await;
        info!("prefetch complete");
    }
}

/// Built-in warming list used when a prefetch request names no tools.
pub fn default_prefetch_tools() -> Vec<String> {
    [
        "React",
        "Vue",
        "Next.js",
        "Angular",
        "Svelte",
        "TypeScript",
        "Vite",
        "Express",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

// ============ Enrichment ============
//
// Enrichment only ever writes the designated live-data fields; everything
// the summarizer authored is left untouched.

fn build_metrics(bundle: &ToolBundle) -> Option<ToolMetrics> {
    let github = bundle.github.as_ref()?;
    let downloads = bundle
        .community
        .as_ref()
        .and_then(|c| c.npm.as_ref())
        .map(|npm| format!("{}/month", format_number(npm.downloads.last_month)));
    let recent_activity = match github.activity.recent_commits {
        0 => None,
        commits => Some(format!("{} commits (30 days)", commits)),
    };

    Some(ToolMetrics {
        stars: github.repository.stars,
        forks: github.repository.forks,
        downloads,
        recent_activity,
    })
}

/// Enrich each comparison entry with live data from the bundle at the same
/// position.
pub fn enrich_comparison(
    comparison: &mut ComparisonAnalysis,
    bundles: &[ToolBundle],
    include_metrics: bool,
) {
    let now = Utc::now();
    for (entry, bundle) in comparison.tools.iter_mut().zip(bundles.iter()) {
        entry.github_url = bundle.github.as_ref().map(|g| g.repository.url.clone());
        entry.github_repo = bundle
            .github
            .as_ref()
            .map(|g| g.repository.full_name.clone());
        if include_metrics {
            entry.metrics = build_metrics(bundle);
        }
        entry.documentation_url = bundle.docs.as_ref().map(|d| d.url.clone());
        entry.last_updated = Some(now);
    }
}

/// Enrich a deep-dive result with live data from its sole bundle.
pub fn enrich_deep_dive(
    deep_dive: &mut DeepDiveAnalysis,
    bundle: &ToolBundle,
    include_metrics: bool,
) {
    deep_dive.github_url = bundle.github.as_ref().map(|g| g.repository.url.clone());
    deep_dive.github_repo = bundle
        .github
        .as_ref()
        .map(|g| g.repository.full_name.clone());
    if include_metrics {
        deep_dive.metrics = build_metrics(bundle);
    }
    deep_dive.documentation_url = bundle.docs.as_ref().map(|d| d.url.clone());
    deep_dive.last_updated = Some(Utc::now());
}

// ============ Metadata ============

/// Summarize which sources contributed and how fresh their data is.
/// Repository and community data are fetched synchronously per request, so
/// they are always reported fresh; documentation carries its scrape age.
pub fn build_metadata(bundles: &[ToolBundle], tokens_used: u64) -> AnalysisMetadata {
    let has_github = bundles.iter().any(|b| b.github.is_some());
    let has_docs = bundles.iter().any(|b| b.docs.is_some());
    let has_community = bundles.iter().any(|b| b.community.is_some());

    let mut data_age = DataAge::default();
    if has_github {
        data_age.github = Some("just now".to_string());
    }
    if let Some(docs) = bundles.iter().find_map(|b| b.docs.as_ref()) {
        data_age.docs = Some(age_string(docs.scraped_at));
    }
    if has_community {
        data_age.community = Some("just now".to_string());
    }

    AnalysisMetadata {
        sources: SourceFlags {
            github: has_github,
            documentation: has_docs,
            community: has_community,
        },
        fetched_at: Utc::now(),
        tokens_used,
        data_age,
    }
}

/// Approximate age of a timestamp: minutes under an hour, hours otherwise.
fn age_string(at: DateTime<Utc>) -> String {
    let minutes = (Utc::now() - at).num_minutes().max(0);
    if minutes < 60 {
        format!("{} minutes ago", minutes)
    } else {
        format!("{} hours ago", minutes / 60)
    }
}
