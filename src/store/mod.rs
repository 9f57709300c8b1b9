//! Durable key-value storage for the coordinator.
//!
//! The [`KeyValueStore`] trait is the storage primitive: untyped get/set/remove
//! over JSON values, no transactions. [`DurableStore`] layers the three
//! logical keys on top of it and serializes every write to a given key
//! through an async mutex, so the history read-modify-write (prepend,
//! truncate, persist) runs as one unit even when captures arrive from
//! several tabs at once.
//!
//! | Key | Value |
//! |-----|-------|
//! | `browsingHistory` | `HistoryItem[]`, newest first |
//! | `settings` | [`Settings`] record |
//! | `authToken` | opaque string |
//!
//! Nothing here caches values in memory between calls. Every accessor
//! reads through to the underlying store.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::models::{HistoryItem, Settings};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

pub const HISTORY_KEY: &str = "browsingHistory";
pub const SETTINGS_KEY: &str = "settings";
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Untyped durable storage primitive.
///
/// Implementations must be `Send + Sync`; callers may interleave reads and
/// writes freely, so any atomicity beyond a single call is the caller's job.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` when the key was never set.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Deletes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// One async mutex per key, created on first use.
#[derive(Default)]
struct KeyLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Typed access to history, settings and the auth token.
///
/// Cheap to clone; clones share the same underlying store and key locks.
#[derive(Clone)]
pub struct DurableStore {
    kv: Arc<dyn KeyValueStore>,
    locks: Arc<KeyLocks>,
    /// Returned by [`settings`](DurableStore::settings) when nothing is stored yet.
    fallback_settings: Settings,
}

impl DurableStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, fallback_settings: Settings) -> Self {
        Self {
            kv,
            locks: Arc::new(KeyLocks::default()),
            fallback_settings,
        }
    }

    /// A store over a fresh [`InMemoryStore`] with default settings.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), Settings::default())
    }

    /// First-install initialization.
    ///
    /// Writes `defaults` and an empty history only when no settings record
    /// exists yet. Returns `true` when this call performed the install.
    pub async fn initialize(&self, defaults: &Settings) -> Result<bool> {
        let _settings_guard = self.locks.acquire(SETTINGS_KEY).await;
        if self.kv.get(SETTINGS_KEY).await?.is_some() {
            return Ok(false);
        }

        let _history_guard = self.locks.acquire(HISTORY_KEY).await;
        self.kv
            .set(SETTINGS_KEY, serde_json::to_value(defaults)?)
            .await?;
        if self.kv.get(HISTORY_KEY).await?.is_none() {
            self.kv.set(HISTORY_KEY, Value::Array(Vec::new())).await?;
        }
        debug!("store initialized with default settings");
        Ok(true)
    }

    pub async fn settings(&self) -> Result<Settings> {
        match self.kv.get(SETTINGS_KEY).await? {
            Some(value) => {
                serde_json::from_value(value).context("stored settings record is malformed")
            }
            None => Ok(self.fallback_settings.clone()),
        }
    }

    /// Replaces the settings record wholesale.
    pub async fn set_settings(&self, settings: &Settings) -> Result<()> {
        let _guard = self.locks.acquire(SETTINGS_KEY).await;
        self.kv
            .set(SETTINGS_KEY, serde_json::to_value(settings)?)
            .await
    }

    pub async fn history(&self) -> Result<Vec<HistoryItem>> {
        match self.kv.get(HISTORY_KEY).await? {
            Some(value) => {
                serde_json::from_value(value).context("stored browsing history is malformed")
            }
            None => Ok(Vec::new()),
        }
    }

    /// Atomically rewrites the history list.
    ///
    /// `f` receives the current list and returns the list to persist. No
    /// other write to the history key can interleave between the read and
    /// the write.
    pub async fn update_history<F>(&self, f: F) -> Result<Vec<HistoryItem>>
    where
        F: FnOnce(Vec<HistoryItem>) -> Vec<HistoryItem> + Send,
    {
        let _guard = self.locks.acquire(HISTORY_KEY).await;
        let current = self.history().await?;
        let updated = f(current);
        self.kv
            .set(HISTORY_KEY, serde_json::to_value(&updated)?)
            .await?;
        Ok(updated)
    }

    pub async fn clear_history(&self) -> Result<()> {
        let _guard = self.locks.acquire(HISTORY_KEY).await;
        self.kv.set(HISTORY_KEY, Value::Array(Vec::new())).await
    }

    pub async fn auth_token(&self) -> Result<Option<String>> {
        Ok(self
            .kv
            .get(AUTH_TOKEN_KEY)
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|t| !t.is_empty()))
    }

    pub async fn set_auth_token(&self, token: &str) -> Result<()> {
        let _guard = self.locks.acquire(AUTH_TOKEN_KEY).await;
        self.kv
            .set(AUTH_TOKEN_KEY, Value::String(token.to_string()))
            .await
    }

    pub async fn clear_auth_token(&self) -> Result<()> {
        let _guard = self.locks.acquire(AUTH_TOKEN_KEY).await;
        self.kv.remove(AUTH_TOKEN_KEY).await
    }
}
