//! Community-signal adapter.
//!
//! Gathers three independent panels per tool: Stack Overflow tag statistics
//! and top-voted questions, subreddit activity (tried against several
//! name-variant guesses), and npm download/version counts. The panels run
//! concurrently and are individually fault-tolerant — one panel's absence
//! never blocks the other two. Each panel owns its own cache entry and TTL.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::cache::{self, TieredCache};
use crate::config::CacheTtlConfig;
use crate::error::SourceError;
use crate::models::{
    CommunityData, DownloadTrend, NpmData, NpmDependencies, NpmDownloads, NpmVersions,
    RedditData, StackOverflowData, SubredditStats, TagStats, TopDiscussion, TopQuestion,
};

/// Normalize a tool name into a Stack Overflow tag: lower-cased, spaces
/// become hyphens, dots dropped (`next.js` → `nextjs`).
pub fn normalize_tag(tool: &str) -> String {
    tool.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .replace('.', "")
}

/// Map a tool name to its npm package via a static alias table, falling
/// back to the normalized input.
pub fn normalize_package_name(tool: &str) -> String {
    let normalized = tool.trim().to_lowercase();
    let mapped = match normalized.as_str() {
        "vue.js" => "vue",
        "angular" => "@angular/core",
        "next.js" | "nextjs" => "next",
        "express.js" => "express",
        "tailwind" | "tailwind css" => "tailwindcss",
        "nest" | "nest.js" | "nestjs" => "@nestjs/core",
        _ => return normalized,
    };
    mapped.to_string()
}

/// Subreddit handle guesses tried in order: bare name, `<name>js`,
/// `<name>dev` (dots and spaces stripped throughout).
pub fn subreddit_variants(tool: &str) -> Vec<String> {
    let base: String = tool
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .collect();
    vec![base.clone(), format!("{base}js"), format!("{base}dev")]
}

pub struct CommunityAdapter {
    client: reqwest::Client,
    cache: Arc<TieredCache>,
    stackexchange_key: Option<String>,
    stackoverflow_base: String,
    reddit_base: String,
    npm_registry_base: String,
    npm_downloads_base: String,
    ttl_stackoverflow: u64,
    ttl_reddit: u64,
    ttl_npm: u64,
}

impl CommunityAdapter {
    pub fn new(
        cache: Arc<TieredCache>,
        stackexchange_key: Option<String>,
        timeout_secs: u64,
        ttl: &CacheTtlConfig,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .user_agent("stackindex/0.3")
            .build()
            .unwrap_or_default();

        Self {
            client,
            cache,
            stackexchange_key,
            stackoverflow_base: "https://api.stackexchange.com/2.3".to_string(),
            reddit_base: "https://www.reddit.com".to_string(),
            npm_registry_base: "https://registry.npmjs.org".to_string(),
            npm_downloads_base: "https://api.npmjs.org".to_string(),
            ttl_stackoverflow: ttl.community_stackoverflow,
            ttl_reddit: ttl.community_reddit,
            ttl_npm: ttl.community_npm,
        }
    }

    /// Redirect every upstream at one mock root (tests).
    pub fn with_base_urls(mut self, base: &str) -> Self {
        self.stackoverflow_base = format!("{base}/so");
        self.reddit_base = format!("{base}/reddit");
        self.npm_registry_base = format!("{base}/npm");
        self.npm_downloads_base = format!("{base}/npm-dl");
        self
    }

    /// Fetch all community panels for a tool. Returns `None` only when
    /// every panel came back empty.
    pub async fn fetch_data(&self, tool: &str) -> Option<CommunityData> {
        let normalized = tool.trim().to_lowercase();

        let (stackoverflow, reddit, npm) = tokio::join!(
            self.fetch_stackoverflow(&normalized),
            self.fetch_reddit(&normalized),
            self.fetch_npm(&normalized),
        );

        let data = CommunityData {
            stackoverflow,
            reddit,
            npm,
        };

        if data.is_empty() {
            debug!(tool, "no community signals found");
            None
        } else {
            Some(data)
        }
    }

    async fn fetch_stackoverflow(&self, tool: &str) -> Option<StackOverflowData> {
        let key = cache::community_key(tool, "stackoverflow");
        if let Some(cached) = self.cache.get_json::<StackOverflowData>(&key).await {
            debug!(tool, "stackoverflow cache hit");
            return Some(cached);
        }

        let tag = normalize_tag(tool);
        match self.fetch_stackoverflow_fresh(&tag).await {
            Ok(Some(data)) => {
                self.cache
                    .set_json(&key, &data, self.ttl_stackoverflow)
                    .await;
                Some(data)
            }
            Ok(None) => {
                debug!(tool, tag, "stackoverflow tag not found");
                None
            }
            Err(e) => {
                warn!(tool, "stackoverflow fetch failed: {e}");
                let stale = self.cache.get_stale_json::<StackOverflowData>(&key).await;
                if stale.is_some() {
                    info!(tool, "serving stale stackoverflow data");
                }
                stale
            }
        }
    }

    async fn fetch_stackoverflow_fresh(
        &self,
        tag: &str,
    ) -> Result<Option<StackOverflowData>, SourceError> {
        let mut info_params = vec![
            ("tags".to_string(), tag.to_string()),
            ("site".to_string(), "stackoverflow".to_string()),
        ];
        let mut search_params = vec![
            ("tagged".to_string(), tag.to_string()),
            ("sort".to_string(), "votes".to_string()),
            ("order".to_string(), "desc".to_string()),
            ("pagesize".to_string(), "5".to_string()),
            ("site".to_string(), "stackoverflow".to_string()),
        ];
        if let Some(api_key) = &self.stackexchange_key {
            info_params.push(("key".to_string(), api_key.clone()));
            search_params.push(("key".to_string(), api_key.clone()));
        }

        let tags_info_url = format!("{}/tags/info", self.stackoverflow_base);
        let search_url = format!("{}/search", self.stackoverflow_base);
        let (tag_info, questions) = tokio::join!(
            get_json(
                &self.client,
                "stackoverflow",
                &tags_info_url,
                &info_params,
            ),
            get_json(
                &self.client,
                "stackoverflow",
                &search_url,
                &search_params,
            ),
        );

        let tag_info = tag_info?;
        let tag_data = match tag_info["items"].get(0) {
            Some(item) => item.clone(),
            None => return Ok(None),
        };

        // Top questions are optional; the tag stats alone are worth keeping.
        let top_questions = match questions {
            Ok(body) => body["items"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .take(5)
                        .map(|q| TopQuestion {
                            title: q["title"].as_str().unwrap_or_default().to_string(),
                            score: q["score"].as_i64().unwrap_or(0),
                            view_count: q["view_count"].as_u64().unwrap_or(0),
                            link: q["link"].as_str().unwrap_or_default().to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                debug!(tag, "top questions unavailable: {e}");
                Vec::new()
            }
        };

        Ok(Some(StackOverflowData {
            tag_stats: TagStats {
                question_count: tag_data["count"].as_u64().unwrap_or(0),
                answer_count: 0, // not exposed by the tag info endpoint
                watch_count: tag_data["watch_count"].as_u64().unwrap_or(0),
            },
            top_questions,
        }))
    }

    async fn fetch_reddit(&self, tool: &str) -> Option<RedditData> {
        let key = cache::community_key(tool, "reddit");
        if let Some(cached) = self.cache.get_json::<RedditData>(&key).await {
            debug!(tool, "reddit cache hit");
            return Some(cached);
        }

        for subreddit in subreddit_variants(tool) {
            match self.fetch_subreddit(&subreddit).await {
                Ok(data) => {
                    self.cache.set_json(&key, &data, self.ttl_reddit).await;
                    return Some(data);
                }
                Err(e) => {
                    debug!(tool, subreddit, "subreddit variant failed: {e}");
                }
            }
        }

        let stale = self.cache.get_stale_json::<RedditData>(&key).await;
        if stale.is_some() {
            info!(tool, "serving stale reddit data");
        } else {
            debug!(tool, "no subreddit found");
        }
        stale
    }

    async fn fetch_subreddit(&self, subreddit: &str) -> Result<RedditData, SourceError> {
        let about_url = format!("{}/r/{}/about.json", self.reddit_base, subreddit);
        let hot_url = format!("{}/r/{}/hot.json", self.reddit_base, subreddit);
        let hot_params = [("limit".to_string(), "10".to_string())];
        let (about, hot) = tokio::join!(
            get_json(
                &self.client,
                "reddit",
                &about_url,
                &[],
            ),
            get_json(
                &self.client,
                "reddit",
                &hot_url,
                &hot_params,
            ),
        );

        let about = about?;
        let hot = hot?;

        let stats = &about["data"];
        if stats.is_null() {
            return Err(SourceError::NotFound {
                service: "reddit",
                tool: subreddit.to_string(),
            });
        }

        let top_discussions = hot["data"]["children"]
            .as_array()
            .map(|posts| {
                posts
                    .iter()
                    .take(5)
                    .map(|post| {
                        let data = &post["data"];
                        TopDiscussion {
                            title: data["title"].as_str().unwrap_or_default().to_string(),
                            score: data["score"].as_i64().unwrap_or(0),
                            num_comments: data["num_comments"].as_u64().unwrap_or(0),
                            url: format!(
                                "https://reddit.com{}",
                                data["permalink"].as_str().unwrap_or_default()
                            ),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(RedditData {
            subreddit_stats: SubredditStats {
                subscribers: stats["subscribers"].as_u64().unwrap_or(0),
                active_users: stats["active_user_count"].as_u64().unwrap_or(0),
                exists: true,
            },
            top_discussions,
        })
    }

    async fn fetch_npm(&self, tool: &str) -> Option<NpmData> {
        let key = cache::community_key(tool, "npm");
        if let Some(cached) = self.cache.get_json::<NpmData>(&key).await {
            debug!(tool, "npm cache hit");
            return Some(cached);
        }

        let package = normalize_package_name(tool);
        match self.fetch_npm_fresh(&package).await {
            Ok(data) => {
                self.cache.set_json(&key, &data, self.ttl_npm).await;
                Some(data)
            }
            Err(e) => {
                debug!(tool, package, "npm fetch failed: {e}");
                let stale = self.cache.get_stale_json::<NpmData>(&key).await;
                if stale.is_some() {
                    info!(tool, "serving stale npm data");
                }
                stale
            }
        }
    }

    async fn fetch_npm_fresh(&self, package: &str) -> Result<NpmData, SourceError> {
        let package_url = format!("{}/{}", self.npm_registry_base, package);
        let (package_info, weekly, monthly) = tokio::join!(
            get_json(
                &self.client,
                "npm",
                &package_url,
                &[],
            ),
            self.fetch_download_count(package, "last-week"),
            self.fetch_download_count(package, "last-month"),
        );

        // The registry document is required; download counts degrade to 0.
        let package_info = package_info?;

        let latest = package_info["dist-tags"]["latest"]
            .as_str()
            .unwrap_or("0.0.0")
            .to_string();
        let total_versions = package_info["versions"]
            .as_object()
            .map(|v| v.len())
            .unwrap_or(0);
        let dependency_count = package_info["versions"][&latest]["dependencies"]
            .as_object()
            .map(|d| d.len())
            .unwrap_or(0);

        Ok(NpmData {
            downloads: NpmDownloads {
                last_week: weekly.unwrap_or_else(|e| {
                    debug!(package, "weekly downloads unavailable: {e}");
                    0
                }),
                last_month: monthly.unwrap_or_else(|e| {
                    debug!(package, "monthly downloads unavailable: {e}");
                    0
                }),
                trend: DownloadTrend::Stable,
            },
            versions: NpmVersions {
                latest,
                total: total_versions,
            },
            dependencies: NpmDependencies {
                count: dependency_count,
                dependents: 0, // not available without extra API calls
            },
        })
    }

    async fn fetch_download_count(&self, package: &str, period: &str) -> Result<u64, SourceError> {
        let body = get_json(
            &self.client,
            "npm",
            &format!(
                "{}/downloads/point/{}/{}",
                self.npm_downloads_base, period, package
            ),
            &[],
        )
        .await?;

        #[derive(Deserialize)]
        struct Downloads {
            downloads: u64,
        }

        let parsed: Downloads =
            serde_json::from_value(body).map_err(|e| SourceError::Decode {
                service: "npm",
                message: e.to_string(),
            })?;
        Ok(parsed.downloads)
    }
}

async fn get_json(
    client: &reqwest::Client,
    service: &'static str,
    url: &str,
    params: &[(String, String)],
) -> Result<Value, SourceError> {
    let mut request = client.get(url);
    if !params.is_empty() {
        request = request.query(params);
    }

    let response = request.send().await.map_err(|e| SourceError::Http {
        service,
        source: e,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            service,
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }

    response.json().await.map_err(|e| SourceError::Decode {
        service,
        message: e.to_string(),
    })
}
