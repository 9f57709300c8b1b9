//! Wiring: builds every component from a [`Config`] and shares them.
//!
//! The CLI and the HTTP server both go through a [`Coordinator`]; tests
//! build one over an in-memory store and a fake backend with
//! [`Coordinator::from_parts`].

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::backend::{Backend, HttpBackend};
use crate::capture::{CaptureGate, QueuedRequester};
use crate::config::Config;
use crate::forward::SyncForwarder;
use crate::history::HistoryCache;
use crate::router::Router;
use crate::search::SearchCoordinator;
use crate::store::{DurableStore, KeyValueStore, SqliteStore};

/// Pending extraction requests kept for the extraction context to poll.
const EXTRACTION_QUEUE_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Coordinator {
    pub store: DurableStore,
    pub router: Router,
    pub gate: CaptureGate,
    pub extractions: Arc<QueuedRequester>,
    pub http: Option<HttpBackend>,
}

impl Coordinator {
    /// Opens the SQLite store, runs first-install initialization and builds
    /// the HTTP backend client.
    pub async fn open(config: &Config) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(config).await?);
        let store = DurableStore::new(kv, config.defaults.to_settings());
        if store.initialize(&config.defaults.to_settings()).await? {
            info!(path = %config.store.path.display(), "first run: default settings written");
        }

        let http = HttpBackend::new(config.backend.clone(), store.clone())?;
        let mut coordinator = Self::assemble(config, store, Arc::new(http.clone()));
        coordinator.http = Some(http);
        Ok(coordinator)
    }

    /// Builds a coordinator over any key-value store and backend.
    pub fn from_parts(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        let store = DurableStore::new(kv, config.defaults.to_settings());
        Self::assemble(config, store, backend)
    }

    fn assemble(config: &Config, store: DurableStore, backend: Arc<dyn Backend>) -> Self {
        let history = HistoryCache::new(store.clone(), config.capture.content_cap);
        let forwarder = SyncForwarder::new(backend.clone());
        let search = SearchCoordinator::new(backend, store.clone(), config.search.clone());
        let router = Router::new(store.clone(), history, forwarder, search);

        let extractions = Arc::new(QueuedRequester::new(EXTRACTION_QUEUE_CAPACITY));
        let gate = CaptureGate::new(store.clone(), extractions.clone(), &config.capture);

        Self {
            store,
            router,
            gate,
            extractions,
            http: None,
        }
    }
}
