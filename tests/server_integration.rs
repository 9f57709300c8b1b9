//! Integration tests for the HTTP boundary and the router's reply contract.
//!
//! The app is served on an ephemeral port and driven with `reqwest`, the
//! same way the browser-side contexts talk to it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use page_recall::backend::{Backend, BackendError, SearchAnswer};
use page_recall::config::Config;
use page_recall::coordinator::Coordinator;
use page_recall::models::{HistoryItem, Settings};
use page_recall::router::{Reply, Request, Responder};
use page_recall::search::NO_LOCAL_RESULTS;
use page_recall::server::build_app;
use page_recall::store::{InMemoryStore, KeyValueStore, HISTORY_KEY};
use serde_json::{json, Value};

// ─── Test doubles ───────────────────────────────────────────────────

/// Backend that is always down.
struct OfflineBackend;

#[async_trait]
impl Backend for OfflineBackend {
    async fn ingest(&self, _item: &HistoryItem) -> Result<(), BackendError> {
        Err(BackendError::Rejected("offline".into()))
    }

    async fn search(&self, _query: &str) -> Result<SearchAnswer, BackendError> {
        Err(BackendError::Rejected("offline".into()))
    }
}

/// Backend whose search handler panics.
struct PanickingBackend;

#[async_trait]
impl Backend for PanickingBackend {
    async fn ingest(&self, _item: &HistoryItem) -> Result<(), BackendError> {
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<SearchAnswer, BackendError> {
        panic!("search handler blew up on {:?}", query)
    }
}

/// Store whose every operation fails.
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        bail!("disk unavailable reading {}", key)
    }

    async fn set(&self, key: &str, _value: Value) -> Result<()> {
        bail!("disk unavailable writing {}", key)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        bail!("disk unavailable removing {}", key)
    }
}

fn test_config() -> Config {
    let mut cfg = Config::with_store_path("unused.sqlite");
    cfg.capture.load_delay_ms = 20;
    cfg
}

fn offline_coordinator(kv: Arc<dyn KeyValueStore>) -> Coordinator {
    Coordinator::from_parts(&test_config(), kv, Arc::new(OfflineBackend))
}

async fn serve(coordinator: Coordinator) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_app(coordinator)).await.unwrap();
    });
    format!("http://{}", addr)
}

// ─── HTTP boundary ──────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let base = serve(offline_coordinator(Arc::new(InMemoryStore::new()))).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_capture_then_history_over_http() {
    let coordinator = offline_coordinator(Arc::new(InMemoryStore::new()));
    let forwarder = coordinator.router.forwarder().clone();
    let base = serve(coordinator).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/messages", base))
        .json(&json!({
            "action": "contentExtracted",
            "data": {
                "url": "https://fox.example",
                "content": "The quick brown fox",
                "timestamp": 1700000000000i64,
                "title": "Fox"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    forwarder.wait_idle().await;

    let body: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "action": "getHistory" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["url"], "https://fox.example");
    assert_eq!(history[0]["timestamp"], "2023-11-14T22:13:20.000Z");

    let body: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "action": "search", "query": "fox" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"], "Found 1 result in your local history:\n1. Fox");

    let status: Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["attempted"], 1);
    assert_eq!(status["failed"], 1);
}

#[tokio::test]
async fn test_legacy_item_shape_is_accepted() {
    let base = serve(offline_coordinator(Arc::new(InMemoryStore::new()))).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/messages", base))
        .json(&json!({
            "action": "contentExtracted",
            "data": {
                "timestamp": "2024-03-01T10:00:00Z",
                "data": { "userId": "u1", "scrapedTextData": "legacy body", "url": "https://old.example" }
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let body: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "action": "getHistory" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["history"][0]["content"], "legacy body");
    assert_eq!(body["history"][0]["url"], "https://old.example");
}

#[tokio::test]
async fn test_update_settings_then_clear() {
    let base = serve(offline_coordinator(Arc::new(InMemoryStore::new()))).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({
            "action": "updateSettings",
            "settings": { "maxHistoryItems": 2, "enableAutoCapture": false, "useServerStorage": false }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "success": true }));

    for i in 0..3 {
        client
            .post(format!("{}/messages", base))
            .json(&json!({
                "action": "contentExtracted",
                "data": { "url": format!("https://{}.example", i), "content": "c", "timestamp": 1 }
            }))
            .send()
            .await
            .unwrap();
    }

    let body: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "action": "getHistory" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let urls: Vec<&str> = body["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, vec!["https://2.example", "https://1.example"]);

    let body: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "action": "clearHistory" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "success": true }));

    let body: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "action": "getHistory" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "history": [] }));
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let base = serve(offline_coordinator(Arc::new(InMemoryStore::new()))).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/messages", base))
        .json(&json!({ "action": "launchRockets" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_navigation_gate_and_pending_extractions() {
    let base = serve(offline_coordinator(Arc::new(InMemoryStore::new()))).await;
    let client = reqwest::Client::new();

    let decide = |event: Value| {
        let client = client.clone();
        let url = format!("{}/navigation", base);
        async move {
            let body: Value = client
                .post(url)
                .json(&event)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            body["decision"].as_str().unwrap().to_string()
        }
    };

    assert_eq!(
        decide(json!({ "tabId": 1, "url": "chrome://settings", "status": "complete" })).await,
        "InternalPage"
    );
    assert_eq!(
        decide(json!({ "tabId": 2, "url": "https://a.example", "status": "loading" })).await,
        "NotComplete"
    );
    assert_eq!(
        decide(json!({ "tabId": 7, "url": "https://a.example", "status": "complete" })).await,
        "Requested"
    );

    let resp = client
        .post(format!("{}/page-loaded", base))
        .json(&json!({ "tabId": 8, "url": "https://b.example" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let body: Value = client
        .get(format!("{}/extract/pending", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body["requests"],
        json!([
            { "action": "extractContent", "tabId": 7 },
            { "action": "extractContent", "tabId": 8 }
        ])
    );

    let body: Value = client
        .get(format!("{}/extract/pending", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["requests"], json!([]));
}

// ─── Reply contract ─────────────────────────────────────────────────

#[tokio::test]
async fn test_store_failures_become_error_replies() {
    let coordinator = offline_coordinator(Arc::new(BrokenStore));

    let reply = coordinator.router.handle(Request::GetHistory).await.unwrap();
    assert!(reply.is_error(), "got {:?}", reply);

    let reply = coordinator
        .router
        .handle(Request::UpdateSettings {
            settings: Settings::default(),
        })
        .await
        .unwrap();
    assert!(reply.is_error(), "got {:?}", reply);

    let reply = coordinator.router.handle(Request::ClearHistory).await.unwrap();
    assert!(reply.is_error(), "got {:?}", reply);
}

#[tokio::test]
async fn test_search_answers_even_when_store_fails() {
    let coordinator = offline_coordinator(Arc::new(BrokenStore));
    let reply = coordinator
        .router
        .handle(Request::Search {
            query: "anything".into(),
        })
        .await;
    assert_eq!(
        reply,
        Some(Reply::Answer {
            data: NO_LOCAL_RESULTS.to_string()
        })
    );
}

#[tokio::test]
async fn test_panicking_handler_gets_one_error_reply() {
    let coordinator = Coordinator::from_parts(
        &test_config(),
        Arc::new(InMemoryStore::new()),
        Arc::new(PanickingBackend),
    );

    let reply = coordinator
        .router
        .handle(Request::Search {
            query: "boom".into(),
        })
        .await;
    assert!(
        matches!(reply, Some(Reply::Error { ref error }) if error.contains("search")),
        "got {:?}",
        reply
    );

    let (responder, rx) = Responder::channel();
    coordinator
        .router
        .dispatch(
            Request::Search {
                query: "again".into(),
            },
            Some(responder),
        )
        .await
        .unwrap();
    assert!(rx.await.unwrap().is_error());

    // The router keeps serving after a handler panic.
    let reply = coordinator.router.handle(Request::GetHistory).await;
    assert_eq!(reply, Some(Reply::History { history: vec![] }));
}

#[tokio::test]
async fn test_capture_reports_store_failure_and_still_mirrors() {
    let kv = Arc::new(InMemoryStore::new());
    kv.set(HISTORY_KEY, json!({ "bad": 1 })).await.unwrap();
    let coordinator = offline_coordinator(kv);

    let result = coordinator
        .router
        .capture(HistoryItem::new("https://x.example", "x", Utc::now()))
        .await;
    assert!(result.is_err());

    let forwarder = coordinator.router.forwarder();
    forwarder.wait_idle().await;
    assert_eq!(forwarder.status().attempted, 1);
}

#[tokio::test]
async fn test_dispatch_replies_exactly_once() {
    let coordinator = offline_coordinator(Arc::new(InMemoryStore::new()));

    let (responder, rx) = Responder::channel();
    coordinator
        .router
        .dispatch(Request::GetHistory, Some(responder))
        .await
        .unwrap();
    assert_eq!(rx.await.unwrap(), Reply::History { history: vec![] });

    let (responder, rx) = Responder::channel();
    coordinator
        .router
        .dispatch(
            Request::ContentExtracted {
                data: HistoryItem::new("https://a.example", "a", Utc::now()),
            },
            Some(responder),
        )
        .await
        .unwrap();
    assert!(rx.await.is_err(), "contentExtracted must close without replying");
}

#[tokio::test]
async fn test_concurrent_captures_are_all_kept() {
    let coordinator = offline_coordinator(Arc::new(InMemoryStore::new()));

    let mut handles = Vec::new();
    for i in 0..25 {
        handles.push(coordinator.router.dispatch(
            Request::ContentExtracted {
                data: HistoryItem::new(format!("https://{}.example", i), "body", Utc::now()),
            },
            None,
        ));
    }
    for h in handles {
        h.await.unwrap();
    }

    let history = coordinator.store.history().await.unwrap();
    assert_eq!(history.len(), 25);
}
