//! # page-recall
//!
//! A coordinator that records the pages a user visits, keeps a bounded
//! local history, mirrors captured pages to a remote backend, and answers
//! natural-language questions about that history.
//!
//! The coordinator sits between three parties that never talk to each
//! other directly: an extraction context that reads page content, a UI
//! context that asks questions, and the remote backend. Every exchange
//! goes through the [`router`].
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  navigation  ┌──────────────┐  extractContent  ┌────────────┐
//! │  Browser   │─────────────▶│ Capture Gate │─────────────────▶│ Extraction │
//! │  events    │              └──────────────┘                  │  context   │
//! └────────────┘                                                └─────┬──────┘
//!                                                   contentExtracted  │
//!                         ┌───────────────────────────────────────────┘
//!                         ▼
//! ┌────────────┐    ┌───────────┐   ┌───────────────┐   ┌────────────────┐
//! │ UI context │───▶│  Router   │──▶│ History Cache │──▶│ Durable Store  │
//! └────────────┘    └─────┬─────┘   └───────────────┘   │ (SQLite / mem) │
//!                         │                             └────────────────┘
//!                         ├──▶ Sync Forwarder ──▶ backend ingest
//!                         └──▶ Search Coordinator ──▶ backend search
//!                                                  └─▶ local fallback
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recall init                                  # create the store
//! recall capture --url https://example.com < page.txt
//! recall search "what did I read about foxes"
//! recall serve                                 # start the HTTP boundary
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | History items, settings, timestamp normalization |
//! | [`store`] | Durable key-value adapter (SQLite and in-memory) |
//! | [`capture`] | Capture gate and extraction requests |
//! | [`history`] | Bounded, newest-first history cache |
//! | [`forward`] | Best-effort mirroring to the backend |
//! | [`search`] | Remote search with local fallback |
//! | [`router`] | Request/reply message routing |
//! | [`backend`] | Remote backend client and response translation |
//! | [`auth`] | Backend session management |
//! | [`coordinator`] | Component wiring |
//! | [`server`] | HTTP boundary |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod backend;
pub mod capture;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod forward;
pub mod history;
pub mod migrate;
pub mod models;
pub mod router;
pub mod search;
pub mod server;
pub mod store;
