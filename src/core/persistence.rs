use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{Result, TrackerError};

pub const KEY_SELECTION: &str = "selection";
pub const KEY_HISTORY: &str = "history";
pub const KEY_LAST_KNOWN_RATES: &str = "last_known_rates";
pub const KEY_REFRESH_STATUS: &str = "refresh_status";
pub const KEY_LAST_QUOTE: &str = "last_quote";

/// Durable key/value storage for the tracker state.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Reads and decodes `key`. Missing, unreadable or malformed entries yield `None`
/// so startup falls back to defaults.
pub async fn load_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Option<T> {
    let raw = match store.load(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read persisted state");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding malformed persisted state");
            None
        }
    }
}

pub async fn save_json<T: Serialize + ?Sized>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.save(key, &raw).await
}

/// In-process store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok().and_then(|m| m.get(key).cloned())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| TrackerError::Persistence(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TrackerError::Persistence(format!("write to '{}' rejected", key)));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| TrackerError::Persistence(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
