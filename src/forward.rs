//! Best-effort mirroring of captured items to the backend.
//!
//! A forward is attempted once. Any failure is logged, counted in
//! [`ForwardStatus`] and dropped: there is no retry queue and no
//! reconciliation, so a failed item exists locally but not remotely.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::models::HistoryItem;

/// Counters describing the mirror gap since the process started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForwardStatus {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<String>,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

#[derive(Clone)]
pub struct SyncForwarder {
    backend: Arc<dyn Backend>,
    status: Arc<Mutex<ForwardStatus>>,
    in_flight: Arc<InFlight>,
}

impl SyncForwarder {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            status: Arc::new(Mutex::new(ForwardStatus::default())),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Sends `item` to the backend. Never fails.
    pub async fn forward(&self, item: &HistoryItem) {
        self.update(|s| s.attempted += 1);

        match self.backend.ingest(item).await {
            Ok(()) => {
                debug!(url = %item.url, bytes = item.content.len(), "item mirrored");
                self.update(|s| s.succeeded += 1);
            }
            Err(e) => {
                warn!(url = %item.url, error = %e, "mirroring failed; item kept locally only");
                let message = e.to_string();
                self.update(move |s| {
                    s.failed += 1;
                    s.last_error = Some(message);
                    s.last_failure_at =
                        Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
                });
            }
        }
    }

    /// Runs [`forward`](Self::forward) on its own task.
    pub fn spawn_forward(&self, item: HistoryItem) -> JoinHandle<()> {
        let forwarder = self.clone();
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            forwarder.forward(&item).await;
            if forwarder.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
                forwarder.in_flight.idle.notify_waiters();
            }
        })
    }

    /// Waits until every spawned forward has finished.
    ///
    /// Used by short-lived callers (the CLI) that would otherwise exit with
    /// a mirror still in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn status(&self) -> ForwardStatus {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut ForwardStatus)) {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut status);
    }
}
