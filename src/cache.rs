//! Two-tier key-value cache.
//!
//! The durable tier is a shared SQLite table with a per-key expiry; the
//! volatile tier is an in-process map with the same semantic surface. Every
//! write lands in the volatile tier unconditionally and additionally in the
//! durable tier when it is reachable, so a `set` is never silently lost
//! during a durable-store outage. Reads try the durable tier first and fall
//! through to the volatile tier on miss or error.
//!
//! Caching here is a performance optimization, not a correctness dependency:
//! every error talking to the durable store is swallowed at this layer and
//! logged, never propagated.
//!
//! Entries are immutable once written — they are overwritten wholesale on
//! refetch and removed only by an administrative [`TieredCache::flush`].
//! Expired entries are therefore still present on disk, which is what makes
//! the serve-stale-on-error path ([`TieredCache::get_stale`]) possible.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::models::AnalysisKind;

/// Storage contract shared by both cache tiers.
///
/// `get` treats entries past their expiry as absent; `get_stale` returns
/// them anyway and is the basis of the serve-stale-on-error policy.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn get_stale(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn flush(&self) -> Result<()>;
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============ Volatile tier ============

struct MemoryEntry {
    value: String,
    expires_at: i64,
}

/// Process-local fallback store.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now_ts())
            .map(|e| e.value.clone()))
    }

    async fn get_stale(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: now_ts() + ttl_secs as i64,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .get(key)
            .map(|e| e.expires_at > now_ts())
            .unwrap_or(false))
    }

    async fn flush(&self) -> Result<()> {
        self.entries.write().unwrap().clear();
        Ok(())
    }
}

// ============ Durable tier ============

/// Shared SQLite-backed store, safe for concurrent access from multiple
/// in-flight requests.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM cache_entries WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn get_stale(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now_ts() + ttl_secs as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cache_entries WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now_ts())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn flush(&self) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============ Tiered facade ============

/// Durable store with transparent volatile fallback.
pub struct TieredCache {
    durable: Option<SqliteStore>,
    volatile: MemoryStore,
}

impl TieredCache {
    /// Connect to the durable tier if enabled. A failure to open it is
    /// downgraded to a warning — the process runs volatile-only.
    pub async fn connect(config: &CacheConfig) -> Self {
        let durable = if config.enabled {
            match SqliteStore::connect(config).await {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!("durable cache unavailable, using in-memory fallback: {e:#}");
                    None
                }
            }
        } else {
            debug!("durable cache disabled by configuration");
            None
        };

        Self {
            durable,
            volatile: MemoryStore::new(),
        }
    }

    /// Volatile-only cache for tests and `cache.enabled = false`.
    pub fn memory_only() -> Self {
        Self {
            durable: None,
            volatile: MemoryStore::new(),
        }
    }

    pub fn durable_ready(&self) -> bool {
        self.durable.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(durable) = &self.durable {
            match durable.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!(key, "durable cache read failed: {e:#}"),
            }
        }
        self.volatile.get(key).await.ok().flatten()
    }

    /// Read ignoring expiry, durable tier first. Used by adapters to serve
    /// a previously fetched value when a live refetch fails.
    pub async fn get_stale(&self, key: &str) -> Option<String> {
        if let Some(durable) = &self.durable {
            match durable.get_stale(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!(key, "durable cache stale read failed: {e:#}"),
            }
        }
        self.volatile.get_stale(key).await.ok().flatten()
    }

    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        // Volatile tier first so the value survives a durable-store outage.
        if let Err(e) = self.volatile.set(key, value, ttl_secs).await {
            warn!(key, "volatile cache write failed: {e:#}");
        }
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.set(key, value, ttl_secs).await {
                warn!(key, "durable cache write failed: {e:#}");
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.delete(key).await {
                warn!(key, "durable cache delete failed: {e:#}");
            }
        }
        let _ = self.volatile.delete(key).await;
    }

    pub async fn exists(&self, key: &str) -> bool {
        if let Some(durable) = &self.durable {
            match durable.exists(key).await {
                Ok(found) => return found,
                Err(e) => warn!(key, "durable cache exists failed: {e:#}"),
            }
        }
        self.volatile.exists(key).await.unwrap_or(false)
    }

    /// Administrative flush of both tiers.
    pub async fn flush(&self) {
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.flush().await {
                warn!("durable cache flush failed: {e:#}");
            }
        }
        let _ = self.volatile.flush().await;
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, "discarding undecodable cache entry: {e}");
                None
            }
        }
    }

    pub async fn get_stale_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_stale(key).await?;
        serde_json::from_str(&raw).ok()
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl_secs).await,
            Err(e) => warn!(key, "failed to encode cache value: {e}"),
        }
    }
}

// ============ Key builders ============
//
// Keys are namespaced by source and tool so staleness can be reasoned about
// per source: `github:vercel/next.js:metrics`, `docs:react:content`,
// `community:vue:npm`, `analysis:comparison:react-vs-vue`.

pub fn github_key(repo: &str) -> String {
    format!("github:{}:metrics", repo)
}

pub fn docs_key(tool: &str) -> String {
    format!("docs:{}:content", tool)
}

pub fn community_key(tool: &str, panel: &str) -> String {
    format!("community:{}:{}", tool, panel)
}

pub fn analysis_key(input: &str, kind: AnalysisKind) -> String {
    let normalized = input
        .to_lowercase()
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    format!("analysis:{}:{}", kind.as_str(), normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_roundtrip() {
        let store = MemoryStore::new();
        store.set("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_expiry_is_absent_but_stale_readable() {
        let store = MemoryStore::new();
        store.set("k", "v", 0).await.unwrap();
        // ttl 0 expires immediately relative to a strictly-greater check
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.get_stale("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn tiered_set_always_lands_in_volatile() {
        let cache = TieredCache::memory_only();
        cache.set("a", "1", 60).await;
        assert_eq!(cache.get("a").await, Some("1".to_string()));
        assert!(cache.exists("a").await);
    }

    #[tokio::test]
    async fn tiered_flush_clears_everything() {
        let cache = TieredCache::memory_only();
        cache.set("a", "1", 60).await;
        cache.flush().await;
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn json_helpers_roundtrip() {
        let cache = TieredCache::memory_only();
        cache.set_json("nums", &vec![1, 2, 3], 60).await;
        let back: Option<Vec<i32>> = cache.get_json("nums").await;
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn analysis_key_normalizes_input() {
        assert_eq!(
            analysis_key("  React vs Vue ", AnalysisKind::Comparison),
            "analysis:comparison:react-vs-vue"
        );
        assert_eq!(
            analysis_key("Next.js", AnalysisKind::DeepDive),
            "analysis:deepdive:next.js"
        );
    }

    #[test]
    fn keys_are_namespaced_per_source() {
        assert_eq!(github_key("facebook/react"), "github:facebook/react:metrics");
        assert_eq!(docs_key("vue"), "docs:vue:content");
        assert_eq!(community_key("vue", "npm"), "community:vue:npm");
    }
}
