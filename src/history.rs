//! Bounded, most-recent-first history of captured pages.
//!
//! Each insert caps the item's content, prepends it, drops the oldest
//! entries beyond `settings.max_history_items` and persists the result, all
//! while holding the store's history-key lock. Duplicate URLs are allowed;
//! a revisit is simply prepended again.
//!
//! [`HistoryCache::clear`] empties the persisted list. The UI's chat
//! transcript is a separate thing that this module never touches.

use anyhow::Result;
use tracing::debug;

use crate::models::{HistoryItem, Settings};
use crate::store::DurableStore;

#[derive(Clone)]
pub struct HistoryCache {
    store: DurableStore,
    content_cap: usize,
}

impl HistoryCache {
    pub fn new(store: DurableStore, content_cap: usize) -> Self {
        Self { store, content_cap }
    }

    /// Inserts `item` under `settings` and returns the persisted list.
    ///
    /// Only the stored copy is capped; `item` itself is left untouched so
    /// the caller can forward the full content.
    pub async fn insert(
        &self,
        item: &HistoryItem,
        settings: &Settings,
    ) -> Result<Vec<HistoryItem>> {
        let stored = item.capped(self.content_cap);
        let max = settings.max_history_items;
        let list = self
            .store
            .update_history(move |current| prepend_bounded(current, stored, max))
            .await?;
        debug!(url = %item.url, len = list.len(), max, "history updated");
        Ok(list)
    }

    pub async fn get_all(&self) -> Result<Vec<HistoryItem>> {
        self.store.history().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear_history().await
    }
}

/// Puts `item` at the head of `list` and truncates the tail to `max`.
pub fn prepend_bounded(
    mut list: Vec<HistoryItem>,
    item: HistoryItem,
    max: usize,
) -> Vec<HistoryItem> {
    list.insert(0, item);
    list.truncate(max);
    list
}
