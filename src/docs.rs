//! Documentation adapter.
//!
//! Scrapes a tool's official documentation page using a static per-tool
//! scraping configuration (URL + introduction selector). When no
//! configuration exists, the scrape fails, or the page yields too little
//! content, the adapter falls back to heuristically extracting an
//! introduction and feature list from the repository README supplied by the
//! caller.

use chrono::Utc;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::cache::{self, TieredCache};
use crate::error::SourceError;
use crate::models::DocumentationData;

const SERVICE: &str = "docs";

/// Introduction text is capped at this many characters.
const MAX_INTRO_CHARS: usize = 2000;
/// A scraped introduction below this length counts as insufficient.
const MIN_INTRO_CHARS: usize = 50;
/// Feature lists are capped at this many entries.
const MAX_FEATURES: usize = 10;

struct DocSource {
    url: &'static str,
    intro_selector: &'static str,
}

/// Static scraping configuration for tools with known documentation sites.
fn doc_source(tool: &str) -> Option<DocSource> {
    let (url, intro_selector) = match tool {
        "react" => ("https://react.dev/learn", "article"),
        "vue" | "vue.js" => ("https://vuejs.org/guide/introduction.html", ".content"),
        "angular" => ("https://angular.dev/overview", "article"),
        "next.js" | "nextjs" => ("https://nextjs.org/docs", "article"),
        "svelte" => ("https://svelte.dev/docs/introduction", "article"),
        "typescript" => ("https://www.typescriptlang.org/docs/", "article"),
        "tailwindcss" => ("https://tailwindcss.com/docs", "article"),
        "express" => ("https://expressjs.com/en/starter/installing.html", "#content"),
        "fastify" => ("https://fastify.dev/docs/latest/", "article"),
        _ => return None,
    };
    Some(DocSource {
        url,
        intro_selector,
    })
}

pub struct DocsAdapter {
    client: reqwest::Client,
    cache: Arc<TieredCache>,
    ttl_secs: u64,
}

impl DocsAdapter {
    pub fn new(cache: Arc<TieredCache>, timeout_secs: u64, ttl_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; StackIndexBot/1.0)")
            .build()
            .unwrap_or_default();

        Self {
            client,
            cache,
            ttl_secs,
        }
    }

    /// Fetch documentation for a tool, using `github_readme` as the
    /// fallback source. Never fails; total failure is `None`.
    pub async fn fetch_data(
        &self,
        tool: &str,
        github_readme: Option<&str>,
    ) -> Option<DocumentationData> {
        let normalized = tool.trim().to_lowercase();
        let key = cache::docs_key(&normalized);

        if let Some(cached) = self.cache.get_json::<DocumentationData>(&key).await {
            debug!(tool, "docs cache hit");
            return Some(cached);
        }

        let source = match doc_source(&normalized) {
            Some(source) => source,
            None => {
                debug!(tool, "no documentation source configured");
                return github_readme.map(|readme| extract_from_readme(readme, tool));
            }
        };

        match self.scrape(&source).await {
            Ok(Some(data)) => {
                self.cache.set_json(&key, &data, self.ttl_secs).await;
                Some(data)
            }
            Ok(None) => {
                // Page answered but had too little content under the
                // configured selector.
                debug!(tool, url = source.url, "insufficient scraped content");
                github_readme.map(|readme| extract_from_readme(readme, tool))
            }
            Err(e) => {
                warn!(tool, url = source.url, "docs scrape failed: {e}");
                if let Some(stale) = self.cache.get_stale_json::<DocumentationData>(&key).await {
                    info!(tool, "serving stale docs after scrape failure");
                    return Some(stale);
                }
                github_readme.map(|readme| extract_from_readme(readme, tool))
            }
        }
    }

    async fn scrape(&self, source: &DocSource) -> Result<Option<DocumentationData>, SourceError> {
        let response = self
            .client
            .get(source.url)
            .send()
            .await
            .map_err(|e| SourceError::Http {
                service: SERVICE,
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                message: String::new(),
            });
        }

        let html = response.text().await.map_err(|e| SourceError::Http {
            service: SERVICE,
            source: e,
        })?;

        Ok(extract_from_html(&html, source.intro_selector, source.url))
    }
}

/// Extract an introduction and feature bullets from a documentation page.
///
/// The introduction is the collapsed text of the first element matching
/// `intro_selector`, capped at [`MAX_INTRO_CHARS`]. Features come from list
/// items inside that element, falling back to `h2`/`h3` headings when the
/// page has no lists. Returns `None` when the introduction is shorter than
/// [`MIN_INTRO_CHARS`].
pub fn extract_from_html(html: &str, intro_selector: &str, url: &str) -> Option<DocumentationData> {
    let document = Html::parse_document(html);
    let intro_sel = Selector::parse(intro_selector).ok()?;

    let intro_element = document.select(&intro_sel).next()?;
    let introduction = truncate_chars(&collapse_whitespace(
        &intro_element.text().collect::<Vec<_>>().join(" "),
    ));

    let mut key_features = Vec::new();
    if let Ok(item_sel) = Selector::parse("ul li, ol li") {
        for item in intro_element.select(&item_sel).take(MAX_FEATURES) {
            let feature = collapse_whitespace(&item.text().collect::<Vec<_>>().join(" "));
            if feature.len() > 10 && feature.len() < 200 {
                key_features.push(feature);
            }
        }
    }

    if key_features.is_empty() {
        if let Ok(heading_sel) = Selector::parse("h2, h3") {
            for heading in document.select(&heading_sel).take(5) {
                let text = collapse_whitespace(&heading.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() && !text.to_lowercase().contains("table of contents") {
                    key_features.push(text);
                }
            }
        }
    }

    if introduction.len() < MIN_INTRO_CHARS {
        return None;
    }

    Some(DocumentationData {
        introduction,
        key_features,
        url: url.to_string(),
        scraped_at: Utc::now(),
    })
}

/// Heuristic README extraction: the introduction is the prose between the
/// first and second top-level heading; features are later heading titles
/// and bullet items inside the introduction region. Collection stops early
/// once both bounds are comfortably met.
pub fn extract_from_readme(readme: &str, tool: &str) -> DocumentationData {
    let mut introduction = String::new();
    let mut key_features: Vec<String> = Vec::new();

    let mut in_intro = false;
    let mut found_first_heading = false;

    for line in readme.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('#') {
            if !found_first_heading {
                found_first_heading = true;
                in_intro = true;
                continue;
            } else if in_intro {
                in_intro = false;
            }

            let heading = trimmed.trim_start_matches('#').trim();
            if heading.len() > 5
                && heading.len() < 100
                && !heading.to_lowercase().contains("table of contents")
            {
                key_features.push(heading.to_string());
            }
        } else if in_intro {
            if trimmed.starts_with('-') || trimmed.starts_with('*') {
                let feature = trimmed.trim_start_matches(['-', '*']).trim();
                if feature.len() > 10 && feature.len() < 200 {
                    key_features.push(feature.to_string());
                }
            } else {
                if !introduction.is_empty() {
                    introduction.push(' ');
                }
                introduction.push_str(trimmed);
            }
        }

        if introduction.len() > 1000 && key_features.len() > 5 {
            break;
        }
    }

    if introduction.chars().count() > MAX_INTRO_CHARS {
        introduction = introduction.chars().take(MAX_INTRO_CHARS).collect();
        introduction.push_str("...");
    }

    if introduction.is_empty() {
        introduction = format!(
            "{} is a developer tool. See the project README for details.",
            tool
        );
    }

    key_features.truncate(MAX_FEATURES);

    DocumentationData {
        introduction,
        key_features,
        url: "GitHub README".to_string(),
        scraped_at: Utc::now(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str) -> String {
    text.chars().take(MAX_INTRO_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PAGE: &str = r#"
        <html><body>
            <nav>Site navigation</nav>
            <article>
                <h1>Getting started</h1>
                <p>This framework renders user interfaces from declarative
                components and keeps them in sync with application state.</p>
                <ul>
                    <li>Declarative component model</li>
                    <li>Reactive state management built in</li>
                    <li>x</li>
                </ul>
            </article>
            <h2>Installation guide</h2>
        </body></html>
    "#;

    #[test]
    fn html_extraction_reads_intro_and_list_features() {
        let data = extract_from_html(SAMPLE_PAGE, "article", "https://example.dev").unwrap();
        assert!(data.introduction.contains("declarative"));
        assert!(!data.introduction.contains("Site navigation"));
        assert_eq!(
            data.key_features,
            vec![
                "Declarative component model".to_string(),
                "Reactive state management built in".to_string(),
            ]
        );
        assert_eq!(data.url, "https://example.dev");
    }

    #[test]
    fn html_extraction_falls_back_to_headings() {
        let html = r#"
            <html><body>
                <article>
                    <p>A long enough introduction paragraph describing what the
                    tool does and why anyone might want to use it at all.</p>
                </article>
                <h2>Core concepts</h2>
                <h3>Table of Contents</h3>
                <h3>Routing</h3>
            </body></html>
        "#;
        let data = extract_from_html(html, "article", "https://example.dev").unwrap();
        assert_eq!(
            data.key_features,
            vec!["Core concepts".to_string(), "Routing".to_string()]
        );
    }

    #[test]
    fn html_extraction_rejects_thin_pages() {
        let html = "<html><body><article>Too short.</article></body></html>";
        assert!(extract_from_html(html, "article", "https://example.dev").is_none());
    }

    #[test]
    fn html_extraction_caps_introduction_length() {
        let body = "word ".repeat(1000);
        let html = format!("<html><body><article><p>{}</p></article></body></html>", body);
        let data = extract_from_html(&html, "article", "https://example.dev").unwrap();
        assert!(data.introduction.chars().count() <= MAX_INTRO_CHARS);
    }

    const SAMPLE_README: &str = "\
# Acme Framework

Acme is a batteries-included web framework.
It focuses on developer velocity.

- Zero-configuration builds
- First-class test runner
- ok

## Quick start guide

Run the installer.

## Table of Contents

## Deployment targets
";

    #[test]
    fn readme_extraction_intro_between_headings() {
        let data = extract_from_readme(SAMPLE_README, "acme");
        assert_eq!(
            data.introduction,
            "Acme is a batteries-included web framework. It focuses on developer velocity."
        );
        assert_eq!(data.url, "GitHub README");
    }

    #[test]
    fn readme_extraction_collects_bullets_and_headings() {
        let data = extract_from_readme(SAMPLE_README, "acme");
        assert!(data
            .key_features
            .contains(&"Zero-configuration builds".to_string()));
        assert!(data
            .key_features
            .contains(&"First-class test runner".to_string()));
        assert!(data
            .key_features
            .contains(&"Quick start guide".to_string()));
        assert!(data
            .key_features
            .contains(&"Deployment targets".to_string()));
        // too-short bullet and the table of contents heading are dropped
        assert!(!data.key_features.iter().any(|f| f == "ok"));
        assert!(!data
            .key_features
            .iter()
            .any(|f| f.to_lowercase().contains("table of contents")));
    }

    #[test]
    fn readme_extraction_synthesizes_intro_when_empty() {
        let data = extract_from_readme("# Title only\n\n## Next section heading\n", "mytool");
        assert!(data.introduction.starts_with("mytool is a developer tool"));
    }

    #[test]
    fn readme_extraction_truncates_long_intros() {
        let long = format!("# T\n\n{}\n\n## Next\n", "intro ".repeat(1000));
        let data = extract_from_readme(&long, "t");
        assert!(data.introduction.chars().count() <= MAX_INTRO_CHARS + 3);
        assert!(data.introduction.ends_with("..."));
    }
}
