//! Summarization client for the Anthropic messages API.
//!
//! Takes the orchestrator's merged bundles, renders them into a data-heavy
//! prompt, and parses the model's JSON reply into the typed analysis shape.
//! Infrastructure failures (status, timeout, auth, quota) and unparseable
//! model output are distinct error variants — both fatal for the request,
//! neither retried here.

use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use tracing::error;

use crate::error::SummarizeError;
use crate::models::{format_number, ComparisonAnalysis, DeepDiveAnalysis, ToolBundle};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct SummarizerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl SummarizerClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, max_tokens: u32, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        }
    }

    /// Point the client at a different API root (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Compare several tools. Returns the parsed analysis and the total
    /// token usage of the call.
    pub async fn analyze_comparison(
        &self,
        bundles: &[ToolBundle],
    ) -> Result<(ComparisonAnalysis, u64), SummarizeError> {
        let (system, user) = comparison_prompt(bundles);
        let (text, tokens) = self.complete(&system, &user).await?;
        let analysis = parse_reply(&text)?;
        Ok((analysis, tokens))
    }

    /// Deep-dive on a single tool.
    pub async fn analyze_deep_dive(
        &self,
        bundle: &ToolBundle,
    ) -> Result<(DeepDiveAnalysis, u64), SummarizeError> {
        let (system, user) = deep_dive_prompt(bundle);
        let (text, tokens) = self.complete(&system, &user).await?;
        let analysis = parse_reply(&text)?;
        Ok((analysis, tokens))
    }

    async fn complete(&self, system: &str, user: &str) -> Result<(String, u64), SummarizeError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<ApiErrorBody>().await {
                Ok(body) => format!("{}: {}", body.error.error_type, body.error.message),
                Err(_) => "unreadable error body".to_string(),
            };
            error!(status = status.as_u16(), detail, "summarization API error");
            return Err(SummarizeError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let body: MessagesResponse = response.json().await?;
        let text = body
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| SummarizeError::Parse {
                detail: "response contained no text block".to_string(),
            })?;

        let tokens = body.usage.input_tokens + body.usage.output_tokens;
        Ok((text, tokens))
    }
}

fn parse_reply<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, SummarizeError> {
    serde_json::from_str(text).map_err(|e| {
        error!("summarization output failed to parse: {e}");
        SummarizeError::Parse {
            detail: e.to_string(),
        }
    })
}

// ============ Wire types ============

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

// ============ Prompts ============

const SYSTEM_PREAMBLE: &str = "You are a technical analyst with access to REAL-TIME DATA \
from GitHub, official documentation, and community platforms. Your task is to provide \
data-driven analysis using this fresh information to help developers make informed \
decisions about tools and technologies.\n\n\
CRITICAL: You must respond with ONLY valid JSON. No markdown, no code blocks, no \
additional text - just the JSON object.";

fn comparison_prompt(bundles: &[ToolBundle]) -> (String, String) {
    let names: Vec<&str> = bundles.iter().map(|b| b.tool.as_str()).collect();
    let context: Vec<String> = bundles.iter().map(format_tool_context).collect();

    let user = format!(
        r#"Compare the following tools: {names}

REAL-TIME DATA:
{context}

Provide a comprehensive comparison focusing on:
1. Technical architecture and implementation
2. Developer Experience (DX)
3. Performance and scalability
4. Community adoption and ecosystem
5. Use cases and ideal scenarios

Respond with ONLY valid JSON matching this structure:
{{
  "tools": [
    {{
      "name": "Tool Name",
      "technicalSummary": "Brief technical overview",
      "useCases": ["Use case 1", "Use case 2"],
      "strengths": ["Strength 1", "Strength 2"],
      "communityRating": 4.5,
      "topProsCons": {{
        "pros": ["Pro 1", "Pro 2"],
        "cons": ["Con 1", "Con 2"]
      }},
      "architecturalInsights": "Architecture details",
      "gotchas": ["Gotcha 1", "Gotcha 2"]
    }}
  ],
  "comparisonSummary": "Overall comparison summary",
  "recommendation": "When to use each tool"
}}"#,
        names = names.join(" vs "),
        context = context.join("\n\n---\n\n"),
    );

    (SYSTEM_PREAMBLE.to_string(), user)
}

fn deep_dive_prompt(bundle: &ToolBundle) -> (String, String) {
    let user = format!(
        r#"Provide an in-depth analysis of: {tool}

REAL-TIME DATA:
{context}

Provide a comprehensive deep-dive covering:
1. Architectural design and technical implementation
2. Core use cases and ideal scenarios
3. Strengths and unique features
4. Common gotchas and pitfalls
5. Best practices and recommendations
6. Learning resources

Respond with ONLY valid JSON matching this structure:
{{
  "name": "Tool Name",
  "technicalSummary": "Comprehensive technical overview",
  "useCases": ["Use case 1", "Use case 2"],
  "strengths": ["Strength 1", "Strength 2"],
  "communityRating": 4.5,
  "topProsCons": {{
    "pros": ["Pro 1", "Pro 2"],
    "cons": ["Con 1", "Con 2"]
  }},
  "architecturalDesign": "Detailed architecture explanation",
  "bestPractices": ["Practice 1", "Practice 2"],
  "commonPitfalls": ["Pitfall 1", "Pitfall 2"],
  "gotchas": ["Gotcha 1", "Gotcha 2"],
  "learningResources": [
    {{"type": "Documentation", "title": "Title", "url": "URL"}},
    {{"type": "Tutorial", "title": "Title", "url": "URL"}}
  ]
}}"#,
        tool = bundle.tool,
        context = format_tool_context(bundle),
    );

    (SYSTEM_PREAMBLE.to_string(), user)
}

/// Render one tool's bundle as markdown context for the prompt.
fn format_tool_context(bundle: &ToolBundle) -> String {
    let mut context = format!("## {}\n\n", bundle.tool);

    if let Some(github) = &bundle.github {
        let repo = &github.repository;
        context.push_str(&format!("### GitHub Repository: {}\n", repo.full_name));
        context.push_str(&format!("- **Stars:** {}\n", format_number(repo.stars)));
        context.push_str(&format!("- **Forks:** {}\n", format_number(repo.forks)));
        context.push_str(&format!("- **Open Issues:** {}\n", repo.open_issues));
        context.push_str(&format!(
            "- **Language:** {}\n",
            repo.language.as_deref().unwrap_or("N/A")
        ));
        context.push_str(&format!(
            "- **License:** {}\n",
            repo.license.as_deref().unwrap_or("N/A")
        ));
        context.push_str(&format!("- **Last Pushed:** {}\n", repo.pushed_at));
        context.push_str(&format!(
            "- **Recent Activity:** {} commits (last 30 days)\n",
            github.activity.recent_commits
        ));
        context.push_str(&format!(
            "- **Contributors:** {}\n",
            github.activity.contributors
        ));
        if let Some(latest) = github.activity.releases.first() {
            context.push_str(&format!(
                "- **Latest Release:** {} ({})\n",
                latest.tag_name,
                latest.published_at.as_deref().unwrap_or("unpublished")
            ));
        }
        context.push_str(&format!(
            "\n**Description:** {}\n",
            repo.description.as_deref().unwrap_or("No description available")
        ));
        if let Some(readme) = &github.readme {
            if readme.content.len() > 100 {
                let excerpt: String = readme.content.chars().take(1000).collect();
                let ellipsis = if readme.content.chars().count() > 1000 {
                    "..."
                } else {
                    ""
                };
                context.push_str(&format!("\n**README Excerpt:**\n{}{}\n", excerpt, ellipsis));
            }
        }
        context.push('\n');
    }

    if let Some(docs) = &bundle.docs {
        context.push_str("### Documentation\n");
        context.push_str(&format!("**Source:** {}\n\n", docs.url));
        context.push_str(&format!("**Introduction:**\n{}\n\n", docs.introduction));
        if !docs.key_features.is_empty() {
            context.push_str("**Key Features:**\n");
            for feature in &docs.key_features {
                context.push_str(&format!("- {}\n", feature));
            }
            context.push('\n');
        }
    }

    if let Some(community) = &bundle.community {
        context.push_str("### Community Metrics\n");
        if let Some(so) = &community.stackoverflow {
            context.push_str("**Stack Overflow:**\n");
            context.push_str(&format!(
                "- Questions: {}\n",
                format_number(so.tag_stats.question_count)
            ));
            if let Some(top) = so.top_questions.first() {
                context.push_str(&format!(
                    "- Top Question: \"{}\" ({} score)\n",
                    top.title, top.score
                ));
            }
            context.push('\n');
        }
        if let Some(npm) = &community.npm {
            context.push_str("**npm:**\n");
            context.push_str(&format!(
                "- Downloads (last month): {}\n",
                format_number(npm.downloads.last_month)
            ));
            context.push_str(&format!("- Latest Version: {}\n", npm.versions.latest));
            context.push('\n');
        }
        if let Some(reddit) = &community.reddit {
            if reddit.subreddit_stats.exists {
                context.push_str("**Reddit:**\n");
                context.push_str(&format!(
                    "- Subscribers: {}\n",
                    format_number(reddit.subreddit_stats.subscribers)
                ));
                context.push_str(&format!(
                    "- Active Users: {}\n",
                    reddit.subreddit_stats.active_users
                ));
                context.push('\n');
            }
        }
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use chrono::Utc;

    fn bundle_with_github() -> ToolBundle {
        ToolBundle {
            tool: "react".to_string(),
            github: Some(GithubData {
                repository: RepositoryInfo {
                    full_name: "facebook/react".to_string(),
                    description: Some("A declarative UI library".to_string()),
                    stars: 230_000,
                    forks: 47_000,
                    watchers: 230_000,
                    open_issues: 800,
                    language: Some("JavaScript".to_string()),
                    license: Some("MIT".to_string()),
                    created_at: "2013-05-24T16:15:54Z".to_string(),
                    updated_at: "2025-01-01T00:00:00Z".to_string(),
                    pushed_at: "2025-01-01T00:00:00Z".to_string(),
                    url: "https://github.com/facebook/react".to_string(),
                    homepage: None,
                    topics: vec![],
                },
                readme: None,
                activity: RepoActivity {
                    recent_commits: 42,
                    contributors: 100,
                    releases: vec![],
                },
            }),
            docs: Some(DocumentationData {
                introduction: "React lets you build user interfaces.".to_string(),
                key_features: vec!["Components".to_string()],
                url: "https://react.dev/learn".to_string(),
                scraped_at: Utc::now(),
            }),
            community: None,
        }
    }

    #[test]
    fn context_includes_formatted_metrics() {
        let context = format_tool_context(&bundle_with_github());
        assert!(context.contains("## react"));
        assert!(context.contains("**Stars:** 230.0K"));
        assert!(context.contains("42 commits (last 30 days)"));
        assert!(context.contains("### Documentation"));
        assert!(context.contains("- Components"));
    }

    #[test]
    fn comparison_prompt_lists_all_tools() {
        let a = bundle_with_github();
        let mut b = bundle_with_github();
        b.tool = "vue".to_string();
        let (system, user) = comparison_prompt(&[a, b]);
        assert!(system.contains("ONLY valid JSON"));
        assert!(user.contains("react vs vue"));
        assert!(user.contains("comparisonSummary"));
    }

    #[test]
    fn deep_dive_prompt_targets_single_tool() {
        let (_, user) = deep_dive_prompt(&bundle_with_github());
        assert!(user.contains("in-depth analysis of: react"));
        assert!(user.contains("architecturalDesign"));
    }

    #[test]
    fn parse_reply_rejects_non_json() {
        let result: Result<ComparisonAnalysis, _> = parse_reply("Here is your analysis: {}");
        assert!(matches!(result, Err(SummarizeError::Parse { .. })));
    }
}
