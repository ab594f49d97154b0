use crate::{CitycastError, Result};
use fjall::Keyspace;
use serde::Deserialize;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task;

#[derive(Serialize, Deserialize)]
struct StoredEntry<T> {
    value: T,
    expires_at: u64, // Unix timestamp (seconds)
}

/// Persistent TTL cache for forecast responses.
///
/// Constructed once at startup and injected into the forecast client;
/// there is no process-global instance.
#[derive(Clone)]
pub struct ResponseCache {
    store: Keyspace,
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
    let value = store
        .get(key)
        .map_err(|e| CitycastError::cache(e.to_string()))?;
    Ok(value.map(|v| v.to_vec()))
}

impl ResponseCache {
    /// Open (or create) the cache at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path)
            .open()
            .map_err(|e| CitycastError::cache(e.to_string()))?;
        let items = db
            .keyspace("forecasts", fjall::KeyspaceCreateOptions::default)
            .map_err(|e| CitycastError::cache(e.to_string()))?;
        Ok(ResponseCache { store: items })
    }

    /// Stores a serializable value with a time-to-live (TTL).
    #[tracing::instrument(name = "put_cache", level = "debug", skip(self, value))]
    pub async fn put<T: Serialize + Send + Debug + 'static>(
        &self,
        key: &str,
        value: T,
        ttl: Duration,
    ) -> Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        // Calculate expiry time
        let expires_at = SystemTime::now()
            .checked_add(ttl)
            .ok_or_else(|| CitycastError::cache("TTL overflow"))?
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CitycastError::cache(e.to_string()))?
            .as_secs();
        let entry = StoredEntry { value, expires_at };
        let bytes = postcard::to_stdvec(&entry).map_err(|e| CitycastError::cache(e.to_string()))?;

        task::spawn_blocking(move || {
            store
                .insert(key, bytes)
                .map_err(|e| CitycastError::cache(e.to_string()))
        })
        .await
        .map_err(|e| CitycastError::cache(e.to_string()))??;
        Ok(())
    }

    /// Retrieves a value if it exists and has not expired.
    /// Returns `None` for cache misses or expired entries.
    #[tracing::instrument(name = "query_cache", level = "debug", skip(self))]
    pub async fn get<T: DeserializeOwned + Send + 'static>(&self, key: &str) -> Result<Option<T>> {
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();

        let maybe_bytes: Option<Vec<u8>> =
            task::spawn_blocking(move || get_from_store(store, key_bytes))
                .await
                .map_err(|e| CitycastError::cache(e.to_string()))??;

        if let Some(bytes) = maybe_bytes {
            let entry: StoredEntry<T> =
                postcard::from_bytes(&bytes).map_err(|e| CitycastError::cache(e.to_string()))?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| CitycastError::cache(e.to_string()))?
                .as_secs();

            if now < entry.expires_at {
                tracing::debug!("Key found and still fresh");
                Ok(Some(entry.value))
            } else {
                tracing::debug!("Key found but expired");
                self.remove(key).await?;
                Ok(None)
            }
        } else {
            tracing::debug!("Key not found");
            Ok(None)
        }
    }

    /// Manually removes a key from the cache.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let key = key.as_bytes().to_vec();
        let store = self.store.clone();
        task::spawn_blocking(move || {
            store
                .remove(key)
                .map_err(|e| CitycastError::cache(e.to_string()))
        })
        .await
        .map_err(|e| CitycastError::cache(e.to_string()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache() -> (tempfile::TempDir, ResponseCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let (_dir, cache) = temp_cache();
        cache
            .put("k", "hello".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let got: Option<String> = cache.get("k").await.unwrap();
        assert_eq!(got, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let (_dir, cache) = temp_cache();
        let got: Option<String> = cache.get("absent").await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_none() {
        let (_dir, cache) = temp_cache();
        cache
            .put("k", 42u64, Duration::from_secs(0))
            .await
            .unwrap();
        let got: Option<u64> = cache.get("k").await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn remove_deletes_entry() {
        let (_dir, cache) = temp_cache();
        cache
            .put("k", 1u8, Duration::from_secs(60))
            .await
            .unwrap();
        cache.remove("k").await.unwrap();
        let got: Option<u8> = cache.get("k").await.unwrap();
        assert!(got.is_none());
    }
}
