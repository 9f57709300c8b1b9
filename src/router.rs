//! Message router: the single entry point for the extraction and UI contexts.
//!
//! Every inbound [`Request`] runs on its own tokio task, so a slow backend
//! call only stalls the request waiting on it. Requests that promise a
//! reply get exactly one, delivered through a [`Responder`]:
//!
//! - `send` consumes the responder, so a second reply cannot be written;
//! - a responder dropped without replying sends an error reply from `Drop`;
//! - a handler that returns an error, or panics, is answered with
//!   [`Reply::Error`].
//!
//! | Action | Payload | Reply |
//! |--------|---------|-------|
//! | `contentExtracted` | `{ data: HistoryItem }` | none |
//! | `getHistory` | none | `{ history }` |
//! | `search` | `{ query }` | `{ data }` |
//! | `updateSettings` | `{ settings }` | `{ success }` |
//! | `clearHistory` | none | `{ success }` |
//! | `getStatus` | none | `{ status }` |

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::forward::{ForwardStatus, SyncForwarder};
use crate::history::HistoryCache;
use crate::models::{HistoryItem, Settings};
use crate::search::SearchCoordinator;
use crate::store::DurableStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    ContentExtracted { data: HistoryItem },
    GetHistory,
    Search { query: String },
    UpdateSettings { settings: Settings },
    ClearHistory,
    GetStatus,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::ContentExtracted { .. } => "contentExtracted",
            Request::GetHistory => "getHistory",
            Request::Search { .. } => "search",
            Request::UpdateSettings { .. } => "updateSettings",
            Request::ClearHistory => "clearHistory",
            Request::GetStatus => "getStatus",
        }
    }

    /// Whether the sender is waiting for a reply.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Request::ContentExtracted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    History { history: Vec<HistoryItem> },
    Answer { data: String },
    Ack { success: bool },
    Status { status: ForwardStatus },
    Error { error: String },
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

/// One-shot reply handle. Guarantees the waiting side hears back once.
pub struct Responder {
    tx: Option<oneshot::Sender<Reply>>,
    request_id: Uuid,
}

impl Responder {
    pub fn channel() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Some(tx),
                request_id: Uuid::new_v4(),
            },
            rx,
        )
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn send(mut self, reply: Reply) {
        if let Some(tx) = self.tx.take() {
            if tx.send(reply).is_err() {
                debug!(request_id = %self.request_id, "requester went away before the reply");
            }
        }
    }

    /// Closes the channel without replying, for requests that promise none.
    fn finish_silently(mut self) {
        self.tx.take();
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(request_id = %self.request_id, "responder dropped without a reply");
            let _ = tx.send(Reply::error("request was dropped before it could be answered"));
        }
    }
}

#[derive(Clone)]
pub struct Router {
    store: DurableStore,
    history: HistoryCache,
    forwarder: SyncForwarder,
    search: SearchCoordinator,
}

impl Router {
    pub fn new(
        store: DurableStore,
        history: HistoryCache,
        forwarder: SyncForwarder,
        search: SearchCoordinator,
    ) -> Self {
        Self {
            store,
            history,
            forwarder,
            search,
        }
    }

    pub fn forwarder(&self) -> &SyncForwarder {
        &self.forwarder
    }

    /// Handles `request` and waits for it to finish.
    ///
    /// Returns the reply for kinds that promise one and `None` otherwise.
    pub async fn handle(&self, request: Request) -> Option<Reply> {
        let expects_reply = request.expects_reply();
        let (responder, rx) = Responder::channel();
        self.dispatch(request, Some(responder));

        match rx.await {
            Ok(reply) => Some(reply),
            Err(_) if expects_reply => Some(Reply::error(
                "request was dropped before it could be answered",
            )),
            Err(_) => None,
        }
    }

    /// Spawns a task for `request`. The reply, if any, goes to `responder`.
    pub fn dispatch(&self, request: Request, responder: Option<Responder>) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move {
            let action = request.action();
            let expects_reply = request.expects_reply();
            let request_id = responder
                .as_ref()
                .map(Responder::request_id)
                .unwrap_or_else(Uuid::new_v4);
            debug!(%request_id, action, "request received");

            // The handler runs on its own task so a panic is caught at the
            // join handle instead of taking the responder down with it.
            let worker = tokio::spawn({
                let router = router.clone();
                async move { router.process(request).await }
            });

            let reply = match worker.await {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    error!(%request_id, action, error = %format!("{:#}", e), "request failed");
                    expects_reply
                        .then(|| Reply::error(format!("failed to process {}: {}", action, e)))
                }
                Err(join_err) => {
                    error!(%request_id, action, error = %join_err, "request handler panicked");
                    expects_reply.then(|| Reply::error(format!("failed to process {}", action)))
                }
            };

            match (responder, reply) {
                (Some(responder), Some(reply)) => responder.send(reply),
                (Some(responder), None) => responder.finish_silently(),
                (None, _) => {}
            }
        })
    }

    async fn process(&self, request: Request) -> Result<Option<Reply>> {
        match request {
            Request::ContentExtracted { data } => {
                self.capture(data).await?;
                Ok(None)
            }
            Request::GetHistory => {
                let history = self.history.get_all().await?;
                Ok(Some(Reply::History { history }))
            }
            Request::Search { query } => {
                let data = self.search.search(&query).await;
                Ok(Some(Reply::Answer { data }))
            }
            Request::UpdateSettings { settings } => {
                self.store.set_settings(&settings).await?;
                debug!(?settings, "settings replaced");
                Ok(Some(Reply::Ack { success: true }))
            }
            Request::ClearHistory => {
                self.history.clear().await?;
                Ok(Some(Reply::Ack { success: true }))
            }
            Request::GetStatus => Ok(Some(Reply::Status {
                status: self.forwarder.status(),
            })),
        }
    }

    /// Stores the capped copy, then mirrors the full item when enabled.
    ///
    /// The mirror runs on its own task and is attempted even when the local
    /// write failed, so the item is not lost on both sides at once. Returns
    /// the persisted history, or the local write error.
    pub async fn capture(&self, item: HistoryItem) -> Result<Vec<HistoryItem>> {
        let settings = self.store.settings().await?;
        let inserted = self.history.insert(&item, &settings).await;

        if settings.use_server_storage {
            self.forwarder.spawn_forward(item);
        }

        inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_names() {
        let req: Request = serde_json::from_value(json!({
            "action": "contentExtracted",
            "data": {"url": "https://a.example", "content": "c", "timestamp": 5}
        }))
        .unwrap();
        assert_eq!(req.action(), "contentExtracted");
        assert!(!req.expects_reply());

        let req: Request =
            serde_json::from_value(json!({"action": "search", "query": "fox"})).unwrap();
        assert!(matches!(req, Request::Search { ref query } if query == "fox"));

        let req: Request = serde_json::from_value(json!({"action": "getHistory"})).unwrap();
        assert!(req.expects_reply());

        let req: Request = serde_json::from_value(json!({
            "action": "updateSettings",
            "settings": {"maxHistoryItems": 3, "enableAutoCapture": true, "useServerStorage": false}
        }))
        .unwrap();
        assert_eq!(req.action(), "updateSettings");
    }

    #[test]
    fn test_reply_wire_shapes() {
        assert_eq!(
            serde_json::to_value(Reply::Answer { data: "x".into() }).unwrap(),
            json!({"data": "x"})
        );
        assert_eq!(
            serde_json::to_value(Reply::Ack { success: true }).unwrap(),
            json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(Reply::History { history: vec![] }).unwrap(),
            json!({"history": []})
        );
    }

    #[tokio::test]
    async fn test_dropped_responder_sends_error() {
        let (responder, rx) = Responder::channel();
        drop(responder);
        assert!(rx.await.unwrap().is_error());
    }

    #[tokio::test]
    async fn test_send_delivers_once() {
        let (responder, rx) = Responder::channel();
        responder.send(Reply::Ack { success: true });
        assert_eq!(rx.await.unwrap(), Reply::Ack { success: true });
    }

    #[tokio::test]
    async fn test_finish_silently_sends_nothing() {
        let (responder, rx) = Responder::channel();
        responder.finish_silently();
        assert!(rx.await.is_err());
    }
}
