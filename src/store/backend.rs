//! Key/value backends behind the state store
//!
//! Two backends share one contract: a networked redis server (preferred,
//! enforces TTLs) and an in-process map used when redis is unreachable at
//! startup. The fallback does not expire keys on a timer; reads drop
//! entries whose deadline has passed, which is sufficient for
//! single-process operation.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::info;

/// Uniform contract over the networked and in-process backends.
///
/// All operations are atomic per key. `keys` accepts a redis-style glob
/// pattern; only `*` wildcards are required by the callers.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Redis-backed store using a multiplexed connection manager
pub struct RedisBackend {
    conn: redis::aio::ConnectionManager,
}

impl RedisBackend {
    /// Connect and verify the server responds to PING
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::store(format!("Invalid redis URL: {}", e)))?;
        let mut conn = redis::aio::ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to redis at {}", url);
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl_secs {
            Some(secs) => {
                let _: () = conn.set_ex(key, value, secs).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// In-process fallback backend
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl_secs.map(|secs| Instant::now() + Duration::from_secs(secs)),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired entry observed under the read lock; drop it.
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// Minimal glob matcher supporting `*` wildcards, mirroring the subset of
/// redis KEYS patterns the store uses.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remainder = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return remainder.ends_with(part);
        } else {
            match remainder.find(part) {
                Some(pos) => remainder = &remainder[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_wildcards() {
        assert!(glob_match("worker:*", "worker:http://10.0.0.1:8000"));
        assert!(glob_match("job:*", "job:abc"));
        assert!(!glob_match("job:*", "worker:abc"));
        assert!(glob_match("user_pref:*:use_purifier", "user_pref:default_user:use_purifier"));
        assert!(!glob_match("user_pref:*:use_purifier", "user_pref:default_user:theme"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn test_memory_backend_set_get_delete() {
        let backend = MemoryBackend::new();

        backend.set("k", "v", None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));

        backend.delete("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_expiry_on_read() {
        let backend = MemoryBackend::new();

        backend.set("gone", "v", Some(0)).await.unwrap();
        assert_eq!(backend.get("gone").await.unwrap(), None);

        backend.set("kept", "v", Some(3600)).await.unwrap();
        assert_eq!(backend.get("kept").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_memory_backend_keys_filters_by_pattern() {
        let backend = MemoryBackend::new();

        backend.set("worker:a", "1", None).await.unwrap();
        backend.set("worker:b", "2", None).await.unwrap();
        backend.set("job:x", "3", None).await.unwrap();

        let mut keys = backend.keys("worker:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["worker:a", "worker:b"]);
    }
}
