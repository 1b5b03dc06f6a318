//! Core data types flowing through the aggregation pipeline.
//!
//! Everything here serializes camelCase on the wire. Fields an adapter could
//! not populate are `Option` and omitted from JSON rather than nulled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two kinds of analysis a request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Comparison,
    #[serde(rename = "deepdive")]
    DeepDive,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Comparison => "comparison",
            AnalysisKind::DeepDive => "deepdive",
        }
    }
}

impl std::str::FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comparison" => Ok(AnalysisKind::Comparison),
            "deepdive" => Ok(AnalysisKind::DeepDive),
            other => Err(format!(
                "unknown analysis kind '{}', expected comparison or deepdive",
                other
            )),
        }
    }
}

// ============ Repository metrics ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub full_name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub language: Option<String>,
    pub license: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub pushed_at: String,
    pub url: String,
    pub homepage: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readme {
    pub content: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub tag_name: String,
    pub published_at: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoActivity {
    /// Commits in the last 30 days, counted from a single result page and
    /// therefore capped at 100. A value of 100 is a floor, not an exact
    /// count.
    pub recent_commits: u32,
    pub contributors: u32,
    pub releases: Vec<ReleaseInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubData {
    pub repository: RepositoryInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<Readme>,
    pub activity: RepoActivity,
}

// ============ Documentation ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationData {
    pub introduction: String,
    pub key_features: Vec<String>,
    pub url: String,
    pub scraped_at: DateTime<Utc>,
}

// ============ Community signals ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagStats {
    pub question_count: u64,
    pub answer_count: u64,
    pub watch_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopQuestion {
    pub title: String,
    pub score: i64,
    pub view_count: u64,
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOverflowData {
    pub tag_stats: TagStats,
    pub top_questions: Vec<TopQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubredditStats {
    pub subscribers: u64,
    pub active_users: u64,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDiscussion {
    pub title: String,
    pub score: i64,
    pub num_comments: u64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditData {
    pub subreddit_stats: SubredditStats,
    pub top_discussions: Vec<TopDiscussion>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmDownloads {
    pub last_week: u64,
    pub last_month: u64,
    pub trend: DownloadTrend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpmVersions {
    pub latest: String,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpmDependencies {
    pub count: usize,
    pub dependents: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpmData {
    pub downloads: NpmDownloads,
    pub versions: NpmVersions,
    pub dependencies: NpmDependencies,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stackoverflow: Option<StackOverflowData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reddit: Option<RedditData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm: Option<NpmData>,
}

impl CommunityData {
    /// True when no panel produced anything.
    pub fn is_empty(&self) -> bool {
        self.stackoverflow.is_none() && self.reddit.is_none() && self.npm.is_none()
    }
}

// ============ Per-tool bundle ============

/// Merged per-tool result of the three source adapters. Assembled fresh per
/// request; any field an adapter could not produce is simply absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBundle {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<DocumentationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<CommunityData>,
}

// ============ Analysis output ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProsCons {
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

/// Live metrics attached to an analysis entry during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetrics {
    pub stars: u64,
    pub forks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_activity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnalysis {
    pub name: String,
    pub technical_summary: String,
    pub use_cases: Vec<String>,
    pub strengths: Vec<String>,
    pub community_rating: f64,
    pub top_pros_cons: ProsCons,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architectural_insights: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gotchas: Option<Vec<String>>,

    // Populated by enrichment, never by the summarizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ToolMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonAnalysis {
    pub tools: Vec<ToolAnalysis>,
    pub comparison_summary: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepDiveAnalysis {
    pub name: String,
    pub technical_summary: String,
    pub use_cases: Vec<String>,
    pub strengths: Vec<String>,
    pub community_rating: f64,
    pub top_pros_cons: ProsCons,
    pub architectural_design: String,
    pub best_practices: Vec<String>,
    pub common_pitfalls: Vec<String>,
    #[serde(default)]
    pub gotchas: Vec<String>,
    pub learning_resources: Vec<LearningResource>,

    // Populated by enrichment, never by the summarizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ToolMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Analysis output, discriminated by kind so enrichment and serialization
/// handle each shape exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AnalysisReport {
    #[serde(rename = "comparison")]
    Comparison(ComparisonAnalysis),
    #[serde(rename = "deepdive")]
    DeepDive(DeepDiveAnalysis),
}

// ============ Response metadata ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFlags {
    pub github: bool,
    pub documentation: bool,
    pub community: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataAge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
}

/// Derived, read-only summary of which sources contributed and how old
/// their data is. Computed fresh per request, never cached on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub sources: SourceFlags,
    pub fetched_at: DateTime<Utc>,
    pub tokens_used: u64,
    pub data_age: DataAge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: AnalysisReport,
    pub metadata: AnalysisMetadata,
}

/// Compact display form for large counts: `999`, `1.5K`, `2.3M`.
pub fn format_number(value: u64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}M", value as f64 / 1_000_000.0)
    } else if value >= 1_000 {
        format!("{:.1}K", value as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}
