//! Repository-metrics adapter.
//!
//! Resolves a free-text tool name to a canonical `owner/repo` slug (static
//! alias table → mechanical normalization variants → live search by stars)
//! and fetches repository metadata, README, contributor count, recent
//! releases, and a 30-day commit-activity approximation — all concurrently,
//! with per-sub-request failure isolation.
//!
//! [`GitHubAdapter::fetch_data`] never fails: upstream errors collapse to a
//! previously cached value when one exists (regardless of nominal expiry),
//! otherwise to `None`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::cache::{self, TieredCache};
use crate::error::SourceError;
use crate::models::{GithubData, Readme, ReleaseInfo, RepoActivity, RepositoryInfo};

const SERVICE: &str = "github";
const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Static tool → repository aliases for well-known tools. Checked before
/// any normalization or live search.
fn static_repo(tool: &str) -> Option<&'static str> {
    match tool {
        // JavaScript/TypeScript frameworks
        "react" => Some("facebook/react"),
        "vue" | "vue.js" => Some("vuejs/core"),
        "angular" => Some("angular/angular"),
        "svelte" => Some("sveltejs/svelte"),
        "solid" | "solid.js" => Some("solidjs/solid"),
        "preact" => Some("preactjs/preact"),
        // Meta frameworks
        "next.js" | "nextjs" | "next" => Some("vercel/next.js"),
        "nuxt" | "nuxt.js" => Some("nuxt/nuxt"),
        "remix" => Some("remix-run/remix"),
        "astro" => Some("withastro/astro"),
        "gatsby" => Some("gatsbyjs/gatsby"),
        // Build tools
        "vite" => Some("vitejs/vite"),
        "webpack" => Some("webpack/webpack"),
        "rollup" => Some("rollup/rollup"),
        "parcel" => Some("parcel-bundler/parcel"),
        "esbuild" => Some("evanw/esbuild"),
        "turbopack" => Some("vercel/turbo"),
        // State management
        "redux" => Some("reduxjs/redux"),
        "mobx" => Some("mobxjs/mobx"),
        "zustand" => Some("pmndrs/zustand"),
        "jotai" => Some("pmndrs/jotai"),
        "recoil" => Some("facebookexperimental/Recoil"),
        // Backend frameworks
        "express" | "express.js" => Some("expressjs/express"),
        "fastify" => Some("fastify/fastify"),
        "nest" | "nest.js" | "nestjs" => Some("nestjs/nest"),
        "koa" => Some("koajs/koa"),
        "hapi" => Some("hapijs/hapi"),
        // Databases & ORMs
        "prisma" => Some("prisma/prisma"),
        "drizzle" | "drizzle-orm" => Some("drizzle-team/drizzle-orm"),
        "typeorm" => Some("typeorm/typeorm"),
        "mongoose" => Some("Automattic/mongoose"),
        "sequelize" => Some("sequelize/sequelize"),
        // Testing
        "jest" => Some("jestjs/jest"),
        "vitest" => Some("vitest-dev/vitest"),
        "playwright" => Some("microsoft/playwright"),
        "cypress" => Some("cypress-io/cypress"),
        // DevOps & infrastructure
        "docker" => Some("docker/docker-ce"),
        "kubernetes" => Some("kubernetes/kubernetes"),
        "terraform" => Some("hashicorp/terraform"),
        "ansible" => Some("ansible/ansible"),
        // Other popular tools
        "typescript" => Some("microsoft/TypeScript"),
        "tailwind" | "tailwind css" | "tailwindcss" => Some("tailwindlabs/tailwindcss"),
        _ => None,
    }
}

/// Normalization variants tried in order against the alias table:
/// as-is, whitespace stripped, dots stripped, `.js` suffix stripped.
pub fn normalization_variants(tool: &str) -> Vec<String> {
    let normalized = tool.trim().to_lowercase();
    vec![
        normalized.clone(),
        normalized.split_whitespace().collect::<String>(),
        normalized.replace('.', ""),
        normalized
            .strip_suffix(".js")
            .unwrap_or(&normalized)
            .to_string(),
    ]
}

/// Resolve a tool name against the static alias table, trying each
/// normalization variant in order. `None` is a valid "unknown" outcome.
pub fn detect_repository(tool: &str) -> Option<&'static str> {
    normalization_variants(tool)
        .iter()
        .find_map(|variant| static_repo(variant))
}

pub struct GitHubAdapter {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<TieredCache>,
    ttl_secs: u64,
}

impl GitHubAdapter {
    pub fn new(
        cache: Arc<TieredCache>,
        token: Option<&str>,
        timeout_secs: u64,
        ttl_secs: u64,
    ) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("stackindex/0.3"),
        );
        if let Some(token) = token {
            if let Ok(value) =
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(StdDuration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            cache,
            ttl_secs,
        }
    }

    /// Point the adapter at a different API root (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch repository metrics for a tool. Never fails: resolution misses
    /// and upstream errors collapse to a stale cached value or `None`.
    pub async fn fetch_data(&self, tool: &str) -> Option<GithubData> {
        let repo = match self.resolve(tool).await {
            Some(repo) => repo,
            None => {
                debug!(tool, "no repository identity resolved");
                return None;
            }
        };

        let key = cache::github_key(&repo);
        if let Some(cached) = self.cache.get_json::<GithubData>(&key).await {
            debug!(%repo, "github cache hit");
            return Some(cached);
        }

        match self.fetch_fresh(&repo).await {
            Ok(data) => {
                self.cache.set_json(&key, &data, self.ttl_secs).await;
                Some(data)
            }
            Err(e) => {
                match &e {
                    SourceError::RateLimited { reset, .. } => {
                        warn!(%repo, %reset, "github rate limit exceeded")
                    }
                    other => warn!(%repo, "github fetch failed: {other}"),
                }
                let stale = self.cache.get_stale_json::<GithubData>(&key).await;
                if stale.is_some() {
                    info!(%repo, "serving stale github data after fetch failure");
                }
                stale
            }
        }
    }

    /// Resolve a tool to an `owner/repo` slug: alias table first, live
    /// search as last resort.
    async fn resolve(&self, tool: &str) -> Option<String> {
        if let Some(repo) = detect_repository(tool) {
            return Some(repo.to_string());
        }
        debug!(tool, "repository not in alias table, searching");
        match self.search_repository(tool).await {
            Ok(repo) => repo,
            Err(e) => {
                warn!(tool, "github search failed: {e}");
                None
            }
        }
    }

    /// Search for a repository by query relevance, most-starred first,
    /// taking the top match.
    async fn search_repository(&self, tool: &str) -> Result<Option<String>, SourceError> {
        let response = self
            .client
            .get(format!("{}/search/repositories", self.base_url))
            .query(&[
                ("q", tool),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", "5"),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Http {
                service: SERVICE,
                source: e,
            })?;

        let response = check_status(response).await?;
        let body: SearchResponse = response.json().await.map_err(|e| SourceError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;

        Ok(body.items.into_iter().next().map(|item| item.full_name))
    }

    /// Fetch everything for a resolved repository. All five sub-requests
    /// run concurrently; only the core metadata request is required —
    /// missing sub-parts are omitted from the result.
    pub async fn fetch_fresh(&self, repo: &str) -> Result<GithubData, SourceError> {
        let (repository, readme, contributors, releases, recent_commits) = tokio::join!(
            self.fetch_repository(repo),
            self.fetch_readme(repo),
            self.fetch_contributors(repo),
            self.fetch_releases(repo),
            self.fetch_recent_commits(repo),
        );

        let repository = repository?;

        let readme = readme.unwrap_or_else(|e| {
            debug!(%repo, "readme unavailable: {e}");
            None
        });
        let contributors = contributors.unwrap_or_else(|e| {
            debug!(%repo, "contributors unavailable: {e}");
            0
        });
        let releases = releases.unwrap_or_else(|e| {
            debug!(%repo, "releases unavailable: {e}");
            Vec::new()
        });
        let recent_commits = recent_commits.unwrap_or_else(|e| {
            debug!(%repo, "commit activity unavailable: {e}");
            0
        });

        Ok(GithubData {
            repository,
            readme: readme.map(|content| Readme {
                size: content.len(),
                content,
            }),
            activity: RepoActivity {
                recent_commits,
                contributors,
                releases,
            },
        })
    }

    async fn fetch_repository(&self, repo: &str) -> Result<RepositoryInfo, SourceError> {
        let response = self
            .client
            .get(format!("{}/repos/{}", self.base_url, repo))
            .send()
            .await
            .map_err(|e| SourceError::Http {
                service: SERVICE,
                source: e,
            })?;

        let response = check_status(response).await?;
        let api: ApiRepository = response.json().await.map_err(|e| SourceError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;

        Ok(RepositoryInfo {
            full_name: api.full_name,
            description: api.description,
            stars: api.stargazers_count,
            forks: api.forks_count,
            watchers: api.watchers_count,
            open_issues: api.open_issues_count,
            language: api.language,
            license: api.license.map(|l| l.name),
            created_at: api.created_at,
            updated_at: api.updated_at,
            pushed_at: api.pushed_at,
            url: api.html_url,
            homepage: api.homepage.filter(|h| !h.is_empty()),
            topics: api.topics.unwrap_or_default(),
        })
    }

    async fn fetch_readme(&self, repo: &str) -> Result<Option<String>, SourceError> {
        let response = self
            .client
            .get(format!("{}/repos/{}/readme", self.base_url, repo))
            .send()
            .await
            .map_err(|e| SourceError::Http {
                service: SERVICE,
                source: e,
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(response).await?;
        let api: ApiReadme = response.json().await.map_err(|e| SourceError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;

        Ok(Some(decode_readme(&api.content)))
    }

    /// Contributor count from the first result page, capped at 100.
    async fn fetch_contributors(&self, repo: &str) -> Result<u32, SourceError> {
        let response = self
            .client
            .get(format!("{}/repos/{}/contributors", self.base_url, repo))
            .query(&[("per_page", "100")])
            .send()
            .await
            .map_err(|e| SourceError::Http {
                service: SERVICE,
                source: e,
            })?;

        let response = check_status(response).await?;
        let items: Vec<serde_json::Value> =
            response.json().await.map_err(|e| SourceError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })?;

        Ok(items.len() as u32)
    }

    /// Fetches up to 10 releases, keeps the most recent 5.
    async fn fetch_releases(&self, repo: &str) -> Result<Vec<ReleaseInfo>, SourceError> {
        let response = self
            .client
            .get(format!("{}/repos/{}/releases", self.base_url, repo))
            .query(&[("per_page", "10")])
            .send()
            .await
            .map_err(|e| SourceError::Http {
                service: SERVICE,
                source: e,
            })?;

        let response = check_status(response).await?;
        let items: Vec<ApiRelease> =
            response.json().await.map_err(|e| SourceError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })?;

        Ok(items
            .into_iter()
            .take(5)
            .map(|r| ReleaseInfo {
                tag_name: r.tag_name,
                published_at: r.published_at,
                url: r.html_url,
            })
            .collect())
    }

    /// Commits since a rolling 30-day cutoff, counted from one page of at
    /// most 100 results. A count of 100 means "at least 100".
    async fn fetch_recent_commits(&self, repo: &str) -> Result<u32, SourceError> {
        let since = (Utc::now() - Duration::days(30)).to_rfc3339();
        let response = self
            .client
            .get(format!("{}/repos/{}/commits", self.base_url, repo))
            .query(&[("since", since.as_str()), ("per_page", "100")])
            .send()
            .await
            .map_err(|e| SourceError::Http {
                service: SERVICE,
                source: e,
            })?;

        let response = check_status(response).await?;
        let items: Vec<serde_json::Value> =
            response.json().await.map_err(|e| SourceError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })?;

        Ok(items.len() as u32)
    }
}

/// Map a non-success response to a [`SourceError`], detecting the quota
/// exhaustion signal (403 with `x-ratelimit-remaining: 0`) and carrying the
/// reset time separately from generic failures.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let remaining = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if status.as_u16() == 403 && remaining.as_deref() == Some("0") {
        let reset = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);
        return Err(SourceError::RateLimited {
            service: SERVICE,
            reset,
        });
    }

    let message = response.text().await.unwrap_or_default();
    Err(SourceError::Status {
        service: SERVICE,
        status: status.as_u16(),
        message,
    })
}

/// Decode a README from its base64 transport encoding. The payload contains
/// embedded newlines which must be stripped first.
pub fn decode_readme(content: &str) -> String {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    match BASE64.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => content.to_string(),
    }
}

// GitHub API payload shapes (only the fields we read).

#[derive(Deserialize)]
struct ApiRepository {
    full_name: String,
    description: Option<String>,
    stargazers_count: u64,
    forks_count: u64,
    watchers_count: u64,
    open_issues_count: u64,
    language: Option<String>,
    license: Option<ApiLicense>,
    created_at: String,
    updated_at: String,
    pushed_at: String,
    html_url: String,
    homepage: Option<String>,
    topics: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ApiLicense {
    name: String,
}

#[derive(Deserialize)]
struct ApiReadme {
    content: String,
}

#[derive(Deserialize)]
struct ApiRelease {
    tag_name: String,
    published_at: Option<String>,
    html_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    full_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_table_direct_hits() {
        assert_eq!(detect_repository("react"), Some("facebook/react"));
        assert_eq!(detect_repository("Next.js"), Some("vercel/next.js"));
        assert_eq!(detect_repository("  Vue.js  "), Some("vuejs/core"));
        assert_eq!(
            detect_repository("tailwind css"),
            Some("tailwindlabs/tailwindcss")
        );
    }

    #[test]
    fn alias_table_variant_hits() {
        // "svelte.js" is not in the table; the `.js` suffix variant is.
        assert_eq!(detect_repository("Svelte.js"), Some("sveltejs/svelte"));
        // whitespace-stripped variant
        assert_eq!(
            detect_repository("tailwind  css"),
            Some("tailwindlabs/tailwindcss")
        );
    }

    #[test]
    fn unknown_tool_resolves_to_none() {
        assert_eq!(detect_repository("definitely-not-a-tool-xyz"), None);
    }

    #[test]
    fn variants_preserve_order() {
        let variants = normalization_variants("Next.js");
        assert_eq!(variants[0], "next.js");
        assert_eq!(variants[1], "next.js");
        assert_eq!(variants[2], "nextjs");
        assert_eq!(variants[3], "next");
    }

    #[test]
    fn readme_decodes_with_embedded_newlines() {
        // "# Hello\nWorld" split across base64 lines as the API returns it
        let encoded = "IyBIZWxsbwpX\nb3JsZA==\n";
        assert_eq!(decode_readme(encoded), "# Hello\nWorld");
    }

    #[test]
    fn undecodable_readme_passes_through() {
        let garbage = "not valid base64!!!";
        assert_eq!(decode_readme(garbage), garbage);
    }
}
