//! Query answering: remote search with a local fallback.
//!
//! [`SearchCoordinator::search`] always resolves to a non-empty string. The
//! remote path runs only when `useServerStorage` is on; a transport error,
//! an error status, an undecodable reply or an empty plain-text answer all
//! fall through to a case-insensitive substring scan of the local history.
//!
//! # Answer formats
//!
//! Ranked remote results:
//!
//! ```text
//! I found 5 relevant pages in your browsing history:
//!
//! 1. Rust Book
//!    Ownership is Rust's most unique feature...
//! ```
//!
//! Local matches:
//!
//! ```text
//! Found 4 results in your local history:
//! 1. Rust Book
//! 2. https://doc.rust-lang.org/std
//! 3. Tokio tutorial
//! ...and 1 more.
//! ```

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Backend, RankedResult, SearchAnswer};
use crate::config::SearchConfig;
use crate::models::{HistoryItem, Settings};
use crate::store::DurableStore;

pub const EMPTY_QUERY: &str = "Please enter a search query.";
pub const NO_RELEVANT_INFORMATION: &str =
    "I couldn't find any relevant information in your browsing history.";
pub const NO_LOCAL_RESULTS: &str = "No results found in your local history.";

#[derive(Clone)]
pub struct SearchCoordinator {
    backend: Arc<dyn Backend>,
    store: DurableStore,
    config: SearchConfig,
}

impl SearchCoordinator {
    pub fn new(backend: Arc<dyn Backend>, store: DurableStore, config: SearchConfig) -> Self {
        Self {
            backend,
            store,
            config,
        }
    }

    /// Answers `query` from fresh settings and history.
    pub async fn search(&self, query: &str) -> String {
        if query.trim().is_empty() {
            return EMPTY_QUERY.to_string();
        }

        let settings = match self.store.settings().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "settings unreadable; searching locally only");
                Settings {
                    use_server_storage: false,
                    ..Settings::default()
                }
            }
        };
        let history = match self.store.history().await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "history unreadable; local fallback will find nothing");
                Vec::new()
            }
        };

        self.search_with(query, &settings, &history).await
    }

    /// Answers `query` against the given settings and local history.
    pub async fn search_with(
        &self,
        query: &str,
        settings: &Settings,
        local_history: &[HistoryItem],
    ) -> String {
        if query.trim().is_empty() {
            return EMPTY_QUERY.to_string();
        }

        if settings.use_server_storage {
            match self.backend.search(query).await {
                Ok(SearchAnswer::PlainText(text)) if !text.trim().is_empty() => return text,
                Ok(SearchAnswer::PlainText(_)) => {
                    debug!("remote search returned no text; using local history");
                }
                Ok(SearchAnswer::RankedResults(results)) => {
                    return format_ranked(&results, &self.config);
                }
                Err(e) => {
                    warn!(error = %e, "remote search failed; using local history");
                }
            }
        }

        format_local(&local_matches(query, local_history), &self.config)
    }
}

/// Items whose content or title contains `query`, ignoring case.
pub fn local_matches<'a>(query: &str, history: &'a [HistoryItem]) -> Vec<&'a HistoryItem> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    history
        .iter()
        .filter(|item| {
            item.content.to_lowercase().contains(&needle)
                || item
                    .title
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
        })
        .collect()
}

fn format_ranked(results: &[RankedResult], config: &SearchConfig) -> String {
    if results.is_empty() {
        return NO_RELEVANT_INFORMATION.to_string();
    }

    let noun = if results.len() == 1 { "page" } else { "pages" };
    let mut out = format!(
        "I found {} relevant {} in your browsing history:\n",
        results.len(),
        noun
    );
    for (i, result) in results.iter().take(config.top_results).enumerate() {
        let body = match result.snippets.iter().find(|s| !s.trim().is_empty()) {
            Some(snippet) => snippet.trim().to_string(),
            None => format!("{}...", preview(&result.content, config.preview_chars)),
        };
        let _ = write!(out, "\n{}. {}\n   {}", i + 1, result.label(), body);
    }
    out
}

fn format_local(matches: &[&HistoryItem], config: &SearchConfig) -> String {
    if matches.is_empty() {
        return NO_LOCAL_RESULTS.to_string();
    }

    let noun = if matches.len() == 1 { "result" } else { "results" };
    let mut out = format!("Found {} {} in your local history:", matches.len(), noun);
    for (i, item) in matches.iter().take(config.top_results).enumerate() {
        let _ = write!(out, "\n{}. {}", i + 1, item.label());
    }
    let rest = matches.len().saturating_sub(config.top_results);
    if rest > 0 {
        let _ = write!(out, "\n...and {} more.", rest);
    }
    out
}

/// First `max` characters of `text` with whitespace runs collapsed.
fn preview(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max).collect()
}
