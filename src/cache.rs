//! Completion cache keyed by prompt fingerprint.
//!
//! The fingerprint is a SHA-256 over the raw prompt bytes, so byte-identical
//! prompts from different call sites collapse to one cached completion and
//! any byte difference (including whitespace) is a different key. Entries
//! are immutable once written; overwrites for the same key are idempotent.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default time-to-live for cached completions.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A cache store failure.
///
/// Never fatal to callers: the completion service treats it as a forced miss
/// and logs it.
#[derive(Error, Debug)]
#[error("cache store error: {0}")]
pub struct CacheError(pub String);

/// Hex-encoded SHA-256 of the exact prompt text.
pub fn fingerprint(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Key-value store mapping a prompt fingerprint to a completion text.
#[async_trait]
pub trait PromptCache: Send + Sync {
    /// Look up a previously cached completion.
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, CacheError>;

    /// Store a completion under `fingerprint` for `ttl`.
    async fn set(&self, fingerprint: &str, completion: &str, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct CachedCompletion {
    text: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedCompletion> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedCompletion,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process prompt cache with per-entry TTL.
pub struct MokaPromptCache {
    cache: Cache<String, CachedCompletion>,
}

impl MokaPromptCache {
    /// Create a cache holding at most `max_entries` completions.
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MokaPromptCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl PromptCache for MokaPromptCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(fingerprint).await.map(|entry| entry.text))
    }

    async fn set(&self, fingerprint: &str, completion: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = CachedCompletion {
            text: completion.to_string(),
            ttl,
        };
        self.cache.insert(fingerprint.to_string(), entry).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = fingerprint("hello");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint("same prompt"), fingerprint("same prompt"));
    }

    #[test]
    fn fingerprint_hashes_raw_bytes() {
        // Whitespace-only differences are different requests.
        assert_ne!(fingerprint("select a"), fingerprint("select  a"));
        assert_ne!(fingerprint("prompt"), fingerprint("prompt "));
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = MokaPromptCache::new(16);
        cache.set("key", "completion text", DEFAULT_TTL).await.unwrap();
        assert_eq!(
            cache.get("key").await.unwrap(),
            Some("completion text".to_string())
        );
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = MokaPromptCache::new(16);
        assert_eq!(cache.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let cache = MokaPromptCache::new(16);
        cache
            .set("short", "v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn overwrite_is_idempotent() {
        let cache = MokaPromptCache::new(16);
        cache.set("k", "same", DEFAULT_TTL).await.unwrap();
        cache.set("k", "same", DEFAULT_TTL).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("same".to_string()));
    }
}
