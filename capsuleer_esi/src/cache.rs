use std::{collections::HashMap, sync::Mutex, time::Duration};

use async_trait::async_trait;
use capsuleer_core::{Timestamp, TypeId};
use serde_json::Value;
use thiserror::Error;

pub const PRICE_CACHE_NAMESPACE: &str = "capsuleer";
pub const PRICE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cached value could not be decoded")]
    Decode(#[from] serde_json::Error),
}

/// Best-effort key/value store with per-entry TTL. Callers treat every error as a miss.
#[async_trait]
pub trait PriceCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError>;
}

pub fn price_cache_key(namespace: &str, type_id: TypeId) -> String {
    format!("{namespace}:price:{type_id}")
}

#[derive(Default)]
pub struct MemoryPriceCache {
    entries: Mutex<HashMap<String, (Value, Timestamp)>>,
}

impl MemoryPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (Value, Timestamp)>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("memory cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl PriceCache for MemoryPriceCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut entries = self.entries()?;
        let Some((value, expires_at)) = entries.get(key) else {
            return Ok(None);
        };

        if *expires_at <= Timestamp::now() {
            entries.remove(key);
            return Ok(None);
        }
        Ok(Some(value.clone()))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Timestamp::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Unavailable(format!("ttl out of range: {ttl:?}")))?;
        self.entries()?
            .insert(key.to_owned(), (value.clone(), expires_at));
        Ok(())
    }
}
