//! End-to-end orchestrator tests: parse → fan-out → merge → summarize →
//! enrich → cache, against mocked upstreams.

use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stackindex::cache::TieredCache;
use stackindex::claude::SummarizerClient;
use stackindex::community::CommunityAdapter;
use stackindex::config::CacheTtlConfig;
use stackindex::docs::DocsAdapter;
use stackindex::error::{AnalysisError, SummarizeError};
use stackindex::github::GitHubAdapter;
use stackindex::models::{AnalysisKind, AnalysisReport};
use stackindex::orchestrator::{AnalyzeOptions, Orchestrator};

fn build_orchestrator(upstreams: &MockServer, claude: &MockServer) -> Orchestrator {
    let cache = Arc::new(TieredCache::memory_only());
    let github =
        GitHubAdapter::new(cache.clone(), None, 5, 300).with_base_url(upstreams.uri());
    let docs = DocsAdapter::new(cache.clone(), 5, 300);
    let community = CommunityAdapter::new(cache.clone(), None, 5, &CacheTtlConfig::default())
        .with_base_urls(&upstreams.uri());
    let summarizer =
        SummarizerClient::new("test-key", "claude-test", 1024, 10).with_base_url(claude.uri());
    Orchestrator::new(cache, github, docs, community, summarizer, 10, 3600)
}

fn repo_body(full_name: &str, stars: u64) -> serde_json::Value {
    serde_json::json!({
        "full_name": full_name,
        "description": "A test repository",
        "stargazers_count": stars,
        "forks_count": 12,
        "watchers_count": stars,
        "open_issues_count": 3,
        "language": "TypeScript",
        "license": {"name": "MIT"},
        "created_at": "2020-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z",
        "pushed_at": "2025-01-01T00:00:00Z",
        "html_url": format!("https://github.com/{full_name}"),
        "homepage": null,
        "topics": []
    })
}

fn analysis_entry(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "technicalSummary": format!("{name} is a capable tool"),
        "useCases": ["building things"],
        "strengths": ["well tested"],
        "communityRating": 4.2,
        "topProsCons": {"pros": ["fast"], "cons": ["young"]}
    })
}

fn claude_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "content": [{"type": "text", "text": text}],
        "usage": {"input_tokens": 1200, "output_tokens": 800}
    })
}

/// Mounts a working set of upstreams for "alphatool": a searchable repo
/// with a README, npm stats, nothing on Stack Overflow or Reddit.
async fn mount_alphatool(upstreams: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", "alphatool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"full_name": "acme/alphatool"}]
        })))
        .mount(upstreams)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/alphatool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_body("acme/alphatool", 1500)))
        .expect(1)
        .mount(upstreams)
        .await;
    // "# Alphatool\n\nAlphatool builds asset pipelines with zero configuration.\n\n## Usage\n"
    let readme = "IyBBbHBoYXRvb2wKCkFscGhhdG9vbCBidWlsZHMgYXNzZXQgcGlwZWxpbmVzIHdpdGgg\nemVybyBjb25maWd1cmF0aW9uLgoKIyMgVXNhZ2UK";
    Mock::given(method("GET"))
        .and(path("/repos/acme/alphatool/readme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": readme,
            "encoding": "base64"
        })))
        .mount(upstreams)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/alphatool/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{}, {}])))
        .mount(upstreams)
        .await;
    Mock::given(method("GET"))
        .and(path("/npm/alphatool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "dist-tags": {"latest": "2.0.0"},
            "versions": {"2.0.0": {"dependencies": {}}}
        })))
        .mount(upstreams)
        .await;
    Mock::given(method("GET"))
        .and(path("/npm-dl/downloads/point/last-week/alphatool"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"downloads": 600_000})),
        )
        .mount(upstreams)
        .await;
    Mock::given(method("GET"))
        .and(path("/npm-dl/downloads/point/last-month/alphatool"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"downloads": 2_300_000})),
        )
        .mount(upstreams)
        .await;
}

#[tokio::test]
async fn comparison_flow_enriches_positionally_and_caches() {
    let upstreams = MockServer::start().await;
    let claude = MockServer::start().await;

    mount_alphatool(&upstreams).await;
    // betatool resolves nowhere
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", "betatool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&upstreams)
        .await;

    let reply = serde_json::json!({
        "tools": [analysis_entry("Alphatool"), analysis_entry("Betatool")],
        "comparisonSummary": "Both are fine",
        "recommendation": "Pick either"
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_reply(&reply.to_string())))
        .expect(1)
        .mount(&claude)
        .await;

    let orchestrator = build_orchestrator(&upstreams, &claude);
    let options = AnalyzeOptions::default();

    let first = orchestrator
        .analyze("alphatool vs betatool", AnalysisKind::Comparison, &options)
        .await
        .unwrap();

    let comparison = match &first.analysis {
        AnalysisReport::Comparison(c) => c,
        other => panic!("expected comparison, got {other:?}"),
    };

    // positional enrichment: entry 0 ← alphatool bundle, entry 1 ← betatool
    assert_eq!(comparison.tools[0].github_repo.as_deref(), Some("acme/alphatool"));
    let metrics = comparison.tools[0].metrics.as_ref().unwrap();
    assert_eq!(metrics.stars, 1500);
    assert_eq!(metrics.downloads.as_deref(), Some("2.3M/month"));
    assert_eq!(metrics.recent_activity.as_deref(), Some("2 commits (30 days)"));
    assert!(comparison.tools[1].github_repo.is_none());
    assert!(comparison.tools[1].metrics.is_none());
    // summarizer-authored content untouched
    assert_eq!(comparison.tools[0].technical_summary, "Alphatool is a capable tool");

    // docs came from the README fallback
    assert_eq!(
        comparison.tools[0].documentation_url.as_deref(),
        Some("GitHub README")
    );

    assert!(first.metadata.sources.github);
    assert!(first.metadata.sources.documentation);
    assert!(first.metadata.sources.community);
    assert_eq!(first.metadata.tokens_used, 2000);
    assert_eq!(first.metadata.data_age.github.as_deref(), Some("just now"));
    assert_eq!(first.metadata.data_age.docs.as_deref(), Some("0 minutes ago"));

    // Second identical request: served byte-identically from the response
    // cache with zero upstream calls (the mocks' expect(1) verifies this
    // when the servers drop).
    let second = orchestrator
        .analyze("alphatool vs betatool", AnalysisKind::Comparison, &options)
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn deep_dive_flow_enriches_single_bundle() {
    let upstreams = MockServer::start().await;
    let claude = MockServer::start().await;

    mount_alphatool(&upstreams).await;

    let reply = serde_json::json!({
        "name": "Alphatool",
        "technicalSummary": "Alphatool is a capable tool",
        "useCases": ["building things"],
        "strengths": ["well tested"],
        "communityRating": 4.2,
        "topProsCons": {"pros": ["fast"], "cons": ["young"]},
        "architecturalDesign": "Pipeline-based",
        "bestPractices": ["keep configs small"],
        "commonPitfalls": ["ignoring the cache"],
        "gotchas": ["watch the defaults"],
        "learningResources": [
            {"type": "Documentation", "title": "Alphatool docs", "url": "https://alphatool.dev"}
        ]
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_reply(&reply.to_string())))
        .mount(&claude)
        .await;

    let orchestrator = build_orchestrator(&upstreams, &claude);
    let result = orchestrator
        .analyze("alphatool", AnalysisKind::DeepDive, &AnalyzeOptions::default())
        .await
        .unwrap();

    let deep_dive = match &result.analysis {
        AnalysisReport::DeepDive(d) => d,
        other => panic!("expected deep dive, got {other:?}"),
    };

    assert_eq!(deep_dive.github_repo.as_deref(), Some("acme/alphatool"));
    assert_eq!(deep_dive.metrics.as_ref().unwrap().stars, 1500);
    assert_eq!(deep_dive.architectural_design, "Pipeline-based");
    assert!(deep_dive.last_updated.is_some());
}

#[tokio::test]
async fn request_succeeds_when_every_source_fails() {
    let upstreams = MockServer::start().await;
    let claude = MockServer::start().await;

    // all upstreams 404 (wiremock default); search finds nothing
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&upstreams)
        .await;

    let reply = serde_json::json!({
        "name": "Ghosttool",
        "technicalSummary": "Analysis from background knowledge",
        "useCases": [],
        "strengths": [],
        "communityRating": 3.0,
        "topProsCons": {"pros": [], "cons": []},
        "architecturalDesign": "Unknown",
        "bestPractices": [],
        "commonPitfalls": [],
        "gotchas": [],
        "learningResources": []
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_reply(&reply.to_string())))
        .mount(&claude)
        .await;

    let orchestrator = build_orchestrator(&upstreams, &claude);
    let result = orchestrator
        .analyze("ghosttool", AnalysisKind::DeepDive, &AnalyzeOptions::default())
        .await
        .unwrap();

    // degraded but successful: nothing contributed, analysis still present
    assert!(!result.metadata.sources.github);
    assert!(!result.metadata.sources.documentation);
    assert!(!result.metadata.sources.community);
    match &result.analysis {
        AnalysisReport::DeepDive(d) => {
            assert!(d.metrics.is_none());
            assert!(d.github_url.is_none());
        }
        other => panic!("expected deep dive, got {other:?}"),
    }
}

#[tokio::test]
async fn summarization_failure_is_fatal_and_distinct() {
    let upstreams = MockServer::start().await;
    let claude = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&upstreams)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&claude)
        .await;

    let orchestrator = build_orchestrator(&upstreams, &claude);
    let err = orchestrator
        .analyze("ghosttool", AnalysisKind::DeepDive, &AnalyzeOptions::default())
        .await
        .unwrap_err();

    match err {
        AnalysisError::Summarization(SummarizeError::Api { status, detail }) => {
            assert_eq!(status, 529);
            assert!(detail.contains("overloaded_error"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn unparseable_summarizer_output_is_a_parse_error() {
    let upstreams = MockServer::start().await;
    let claude = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&upstreams)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_reply(
            "Sure! Here is the JSON you asked for: {\"name\": \"oops\"",
        )))
        .mount(&claude)
        .await;

    let orchestrator = build_orchestrator(&upstreams, &claude);
    let err = orchestrator
        .analyze("ghosttool", AnalysisKind::DeepDive, &AnalyzeOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::Summarization(SummarizeError::Parse { .. })
    ));
}

#[tokio::test]
async fn skip_cache_bypasses_the_read_but_still_writes() {
    let upstreams = MockServer::start().await;
    let claude = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&upstreams)
        .await;

    let reply = serde_json::json!({
        "name": "Ghosttool",
        "technicalSummary": "v1",
        "useCases": [],
        "strengths": [],
        "communityRating": 3.0,
        "topProsCons": {"pros": [], "cons": []},
        "architecturalDesign": "Unknown",
        "bestPractices": [],
        "commonPitfalls": [],
        "gotchas": [],
        "learningResources": []
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_reply(&reply.to_string())))
        .expect(2)
        .mount(&claude)
        .await;

    let orchestrator = build_orchestrator(&upstreams, &claude);
    let skip = AnalyzeOptions {
        skip_cache: true,
        include_metrics: true,
    };

    // both skip-cache calls reach the summarizer (expect(2) above)
    orchestrator
        .analyze("ghosttool", AnalysisKind::DeepDive, &skip)
        .await
        .unwrap();
    orchestrator
        .analyze("ghosttool", AnalysisKind::DeepDive, &skip)
        .await
        .unwrap();

    // but the result was written back: a normal call is served from cache
    orchestrator
        .analyze("ghosttool", AnalysisKind::DeepDive, &AnalyzeOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn prefetch_warms_adapter_caches() {
    let upstreams = MockServer::start().await;
    let claude = MockServer::start().await;

    mount_alphatool(&upstreams).await;

    let reply = serde_json::json!({
        "name": "Alphatool",
        "technicalSummary": "warmed",
        "useCases": [],
        "strengths": [],
        "communityRating": 4.0,
        "topProsCons": {"pros": [], "cons": []},
        "architecturalDesign": "Pipeline-based",
        "bestPractices": [],
        "commonPitfalls": [],
        "gotchas": [],
        "learningResources": []
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_reply(&reply.to_string())))
        .mount(&claude)
        .await;

    let orchestrator = build_orchestrator(&upstreams, &claude);
    orchestrator.prefetch(&["alphatool".to_string()]).await;

    // The analysis that follows is served from the warmed adapter caches:
    // the repo endpoint's expect(1) verifies it is not hit a second time.
    let result = orchestrator
        .analyze("alphatool", AnalysisKind::DeepDive, &AnalyzeOptions::default())
        .await
        .unwrap();
    match &result.analysis {
        AnalysisReport::DeepDive(d) => {
            assert_eq!(d.metrics.as_ref().unwrap().stars, 1500)
        }
        other => panic!("expected deep dive, got {other:?}"),
    }
}
