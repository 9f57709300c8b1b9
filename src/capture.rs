//! Capture gate: decides whether a finished page load should be extracted.
//!
//! Settings are read from the store on every decision. Internal pages
//! (browser and extension schemes) are never captured, whatever the
//! settings say. Allowed loads produce a fire-and-forget `extractContent`
//! request through an [`ExtractionRequester`]; if the extraction context
//! never answers, no history item appears and nothing else happens.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::store::DurableStore;

/// Navigation-completion event for one tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub tab_id: u64,
    pub url: String,
    pub status: String,
}

impl NavigationEvent {
    pub fn complete(tab_id: u64, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            url: url.into(),
            status: "complete".to_string(),
        }
    }
}

/// Message sent to the extraction context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename = "extractContent", rename_all = "camelCase")]
pub struct ExtractRequest {
    pub tab_id: u64,
}

/// Delivers extraction requests to whichever context owns the tab.
#[async_trait]
pub trait ExtractionRequester: Send + Sync {
    async fn request_extraction(&self, request: ExtractRequest) -> Result<()>;
}

/// Outcome of one gate decision, mostly for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Requested,
    NotComplete,
    InternalPage,
    AutoCaptureDisabled,
    SettingsUnavailable,
}

#[derive(Clone)]
pub struct CaptureGate {
    store: DurableStore,
    requester: Arc<dyn ExtractionRequester>,
    internal_schemes: Vec<String>,
    load_delay: Duration,
}

impl CaptureGate {
    pub fn new(
        store: DurableStore,
        requester: Arc<dyn ExtractionRequester>,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            store,
            requester,
            internal_schemes: config.internal_schemes.clone(),
            load_delay: Duration::from_millis(config.load_delay_ms),
        }
    }

    /// Handles a navigation-completion event.
    pub async fn on_navigation(&self, event: &NavigationEvent) -> GateDecision {
        if event.status != "complete" {
            return GateDecision::NotComplete;
        }
        self.check_and_request(event.tab_id, &event.url).await
    }

    /// Load-time trigger: waits for the configured delay so late content can
    /// render, then applies the same checks as a navigation event.
    pub fn on_page_loaded(&self, tab_id: u64, url: impl Into<String>) -> JoinHandle<GateDecision> {
        let gate = self.clone();
        let url = url.into();
        tokio::spawn(async move {
            tokio::time::sleep(gate.load_delay).await;
            gate.check_and_request(tab_id, &url).await
        })
    }

    pub fn is_internal(&self, url: &str) -> bool {
        let url = url.trim_start();
        self.internal_schemes
            .iter()
            .any(|scheme| {
                url.get(..scheme.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
            })
    }

    async fn check_and_request(&self, tab_id: u64, url: &str) -> GateDecision {
        if self.is_internal(url) {
            debug!(tab_id, url, "skipping internal page");
            return GateDecision::InternalPage;
        }

        let settings = match self.store.settings().await {
            Ok(s) => s,
            Err(e) => {
                warn!(tab_id, error = %e, "cannot read settings; not capturing");
                return GateDecision::SettingsUnavailable;
            }
        };
        if !settings.enable_auto_capture {
            return GateDecision::AutoCaptureDisabled;
        }

        if let Err(e) = self.requester.request_extraction(ExtractRequest { tab_id }).await {
            warn!(tab_id, error = %e, "extraction request not delivered");
        } else {
            debug!(tab_id, url, "extraction requested");
        }
        GateDecision::Requested
    }
}

/// Requester that parks requests until the extraction context polls for them.
///
/// Holds at most `capacity` requests; the oldest are dropped first.
pub struct QueuedRequester {
    pending: Mutex<VecDeque<ExtractRequest>>,
    capacity: usize,
}

impl QueuedRequester {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Removes and returns every queued request, oldest first.
    pub fn drain(&self) -> Vec<ExtractRequest> {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExtractionRequester for QueuedRequester {
    async fn request_extraction(&self, request: ExtractRequest) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if pending.len() >= self.capacity {
            if let Some(dropped) = pending.pop_front() {
                warn!(tab_id = dropped.tab_id, "extraction queue full; dropping oldest request");
            }
        }
        pending.push_back(request);
        Ok(())
    }
}
