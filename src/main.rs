//! # page-recall CLI (`recall`)
//!
//! Runs the coordinator as a server, or drives it directly from the shell
//! for inspection and scripting.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the store and write first-install settings |
//! | `recall serve` | Start the coordinator HTTP server |
//! | `recall history` | Print the stored history, newest first |
//! | `recall search "<query>"` | Answer a query (remote, then local fallback) |
//! | `recall capture --url <url>` | Record a page from a file or stdin |
//! | `recall settings show` / `set` | Inspect or replace settings |
//! | `recall clear` | Empty the stored history |
//! | `recall login` / `register` / `logout` | Manage the backend session |

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use page_recall::config::{self, Config};
use page_recall::coordinator::Coordinator;
use page_recall::migrate;
use page_recall::models::{HistoryItem, Settings};
use page_recall::router::{Reply, Request};
use page_recall::server;

#[derive(Parser)]
#[command(
    name = "recall",
    about = "page-recall: bounded page history with remote mirroring and fallback search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and write default settings on first run.
    ///
    /// Idempotent: existing settings and history are left alone.
    Init,

    /// Start the coordinator HTTP server.
    Serve,

    /// Print stored history, newest first.
    History {
        /// Show at most this many items.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a query.
    Search {
        query: String,
    },

    /// Record a page visit as if the extraction context had sent it.
    ///
    /// Content is read from `--file`, or from stdin when no file is given.
    Capture {
        #[arg(long)]
        url: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Inspect or replace settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Empty the stored history. Settings and session are kept.
    Clear,

    /// Log in to the backend and store the session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create a backend account and store the session token.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
    },

    /// Forget the stored session token.
    Logout,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings as JSON.
    Show,

    /// Replace settings. Unspecified fields keep their current value.
    Set {
        #[arg(long)]
        max_history_items: Option<usize>,
        #[arg(long)]
        auto_capture: Option<bool>,
        #[arg(long)]
        server_storage: Option<bool>,
        /// Backend URL override; pass an empty string to remove it.
        #[arg(long)]
        server_url: Option<String>,
    },
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let installed = migrate::run_migrations(&cfg).await?;
            if installed {
                println!("Store initialized at {}", cfg.store.path.display());
            } else {
                println!("Store already initialized at {}", cfg.store.path.display());
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::History { limit } => {
            let coordinator = Coordinator::open(&cfg).await?;
            let history = match coordinator.router.handle(Request::GetHistory).await {
                Some(Reply::History { history }) => history,
                other => bail!("unexpected reply: {:?}", other),
            };
            print_history(&history, limit);
        }
        Commands::Search { query } => {
            let coordinator = Coordinator::open(&cfg).await?;
            match coordinator.router.handle(Request::Search { query }).await {
                Some(Reply::Answer { data }) => println!("{}", data),
                other => bail!("unexpected reply: {:?}", other),
            }
        }
        Commands::Capture { url, title, file } => {
            run_capture(&cfg, url, title, file).await?;
        }
        Commands::Settings { action } => {
            run_settings(&cfg, action).await?;
        }
        Commands::Clear => {
            let coordinator = Coordinator::open(&cfg).await?;
            expect_ack(coordinator.router.handle(Request::ClearHistory).await)?;
            println!("History cleared.");
        }
        Commands::Login { email, password } => {
            let coordinator = Coordinator::open(&cfg).await?;
            let http = coordinator.http.context("no HTTP backend configured")?;
            if !http.login(&email, &password).await {
                bail!("login failed");
            }
            println!("Logged in.");
        }
        Commands::Register {
            email,
            password,
            name,
        } => {
            let coordinator = Coordinator::open(&cfg).await?;
            let http = coordinator.http.context("no HTTP backend configured")?;
            if !http.register(&email, &password, &name).await {
                bail!("registration failed");
            }
            println!("Registered and logged in.");
        }
        Commands::Logout => {
            let coordinator = Coordinator::open(&cfg).await?;
            let http = coordinator.http.context("no HTTP backend configured")?;
            http.logout().await;
            println!("Logged out.");
        }
    }

    Ok(())
}

async fn run_capture(
    cfg: &Config,
    url: String,
    title: Option<String>,
    file: Option<PathBuf>,
) -> Result<()> {
    let content = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let content = content.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut item = HistoryItem::new(url, content, Utc::now());
    item.title = title;

    let coordinator = Coordinator::open(cfg).await?;
    let stored = coordinator.router.capture(item).await;
    coordinator.router.forwarder().wait_idle().await;
    let history = stored.context("Failed to store captured page")?;

    let status = coordinator.router.forwarder().status();
    println!("Captured. ({} items in history)", history.len());
    if status.attempted > 0 {
        println!(
            "  mirrored: {}",
            if status.failed == 0 { "yes" } else { "no (kept locally)" }
        );
    }
    Ok(())
}

async fn run_settings(cfg: &Config, action: SettingsAction) -> Result<()> {
    let coordinator = Coordinator::open(cfg).await?;
    let current = coordinator.store.settings().await?;

    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        SettingsAction::Set {
            max_history_items,
            auto_capture,
            server_storage,
            server_url,
        } => {
            let settings = Settings {
                max_history_items: max_history_items.unwrap_or(current.max_history_items),
                enable_auto_capture: auto_capture.unwrap_or(current.enable_auto_capture),
                use_server_storage: server_storage.unwrap_or(current.use_server_storage),
                server_url: match server_url {
                    Some(u) if u.is_empty() => None,
                    Some(u) => Some(u),
                    None => current.server_url,
                },
            };
            expect_ack(
                coordinator
                    .router
                    .handle(Request::UpdateSettings {
                        settings: settings.clone(),
                    })
                    .await,
            )?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}

fn expect_ack(reply: Option<Reply>) -> Result<()> {
    match reply {
        Some(Reply::Ack { success: true }) => Ok(()),
        Some(Reply::Error { error }) => bail!("{}", error),
        other => bail!("unexpected reply: {:?}", other),
    }
}

fn print_history(history: &[HistoryItem], limit: Option<usize>) {
    if history.is_empty() {
        println!("No history.");
        return;
    }

    let shown = limit.unwrap_or(history.len());
    for (i, item) in history.iter().take(shown).enumerate() {
        println!("{}. {}", i + 1, item.label());
        println!("    url: {}", item.url);
        println!("    captured: {}", item.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        let excerpt: String = item.content.chars().take(120).collect();
        println!("    excerpt: \"{}\"", excerpt);
        println!();
    }
    if shown < history.len() {
        println!("({} more)", history.len() - shown);
    }
}
