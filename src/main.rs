mod cache;
mod config;
mod db;
mod event;
mod host;
mod net;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::cache::{CacheStorage, SqliteStorage};
use crate::db::{Database, LocalStorage};
use crate::event::{Event, EventSender, Outcome, Runner};
use crate::host::{JsonNotifier, LogClients};
use crate::net::HttpClient;
use crate::worker::notify::PRIMARY_KEY;
use crate::worker::sync::PENDING_TRANSACTIONS_KEY;
use crate::worker::{Dispatcher, Host, PendingQueue, Worker};

#[derive(Parser, Debug)]
#[command(name = "payworker")]
#[command(about = "Offline cache, push and transaction sync worker for the HaqPay web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/payworker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to a daily rolling file in this directory instead of stderr
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Prime the cache with the precache list
  Install,
  /// Drop caches from older versions and claim clients
  Activate,
  /// Answer a request the way the worker would
  Fetch {
    /// Path or absolute URL
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Show a notification for a push message
  Push {
    /// Text payload; omitted means no payload
    #[arg(long)]
    body: Option<String>,
  },
  /// Click a notification
  Click {
    #[arg(long)]
    action: Option<String>,
  },
  /// Fire a background sync
  Sync {
    #[arg(long, default_value = "sync-transactions")]
    tag: String,
  },
  /// Queue a transaction for the next sync, as the page does when offline
  Enqueue {
    /// Transaction record as JSON
    record: String,
  },
  /// Print queued transactions
  Queue {
    /// Discard every queued transaction
    #[arg(long)]
    clear: bool,
  },
  /// List caches
  Caches,
  /// Dispatch newline-delimited JSON events read from stdin
  Replay,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_dir.as_deref())?;

  let config = config::Config::load(args.config.as_deref())?;
  let db = Arc::new(Database::open(&config.database_path()?)?);
  let storage = Arc::new(SqliteStorage::new(Arc::clone(&db)));
  let local = Arc::new(LocalStorage::new(db));

  let event = match args.command {
    // Page-side helpers work on storage directly
    Command::Enqueue { record } => {
      let record = serde_json::from_str(&record)
        .map_err(|e| eyre!("Transaction record is not valid JSON: {}", e))?;
      let pending = PendingQueue::enqueue(local.as_ref(), record)?;
      println!("{} pending", pending);
      return Ok(());
    }
    Command::Queue { clear: true } => {
      local.remove_item(PENDING_TRANSACTIONS_KEY)?;
      return Ok(());
    }
    Command::Queue { clear: false } => {
      for record in PendingQueue::load(local.as_ref())?.records() {
        println!("{}", record);
      }
      return Ok(());
    }
    Command::Caches => {
      for info in storage.info()? {
        println!("{}\t{}\t{} entries", info.name, info.created_at, info.entries);
      }
      return Ok(());
    }
    Command::Install => Some(Event::Install),
    Command::Activate => Some(Event::Activate),
    Command::Fetch { url, method } => Some(Event::Fetch { url, method }),
    Command::Push { body } => Some(Event::Push { data: body }),
    Command::Click { action } => Some(Event::NotificationClick {
      action,
      primary_key: PRIMARY_KEY,
    }),
    Command::Sync { tag } => Some(Event::Sync { tag }),
    Command::Replay => None,
  };

  let host = Host {
    network: Arc::new(HttpClient::new(config.origin_url()?, config.timeout())?),
    notifier: Arc::new(JsonNotifier::new(std::io::stdout())),
    clients: Arc::new(LogClients),
  };
  let worker = Arc::new(Worker::new(config, storage, local, host)?);
  let (runner, sender) = Runner::new(worker, Dispatcher::default());
  let running = tokio::spawn(runner.run());

  match event {
    Some(event) => report(sender.dispatch(event).await?)?,
    None => {
      let failed = replay(&sender, std::io::stdin().lock()).await?;
      if failed > 0 {
        warn!("{} replayed events failed", failed);
      }
    }
  }

  drop(sender);
  running
    .await
    .map_err(|e| eyre!("Worker runner panicked: {}", e))?;

  Ok(())
}

/// Dispatch one event per input line. A line that fails to parse or
/// dispatch is reported and the rest still run; returns how many failed.
async fn replay(sender: &EventSender, input: impl BufRead) -> Result<usize> {
  let mut failed = 0;
  for (number, line) in input.lines().enumerate() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }

    let event: Event = match serde_json::from_str(&line) {
      Ok(event) => event,
      Err(err) => {
        eprintln!("line {}: invalid event: {}", number + 1, err);
        failed += 1;
        continue;
      }
    };
    match sender.dispatch(event).await {
      Ok(outcome) => report(outcome)?,
      Err(err) => {
        eprintln!("line {}: {:#}", number + 1, err);
        failed += 1;
      }
    }
  }
  Ok(failed)
}

fn report(outcome: Outcome) -> Result<()> {
  match outcome {
    Outcome::Installed(r) => {
      eprintln!("cached {} pages", r.cached.len());
      for path in r.failed {
        eprintln!("failed: {}", path);
      }
    }
    Outcome::Activated(r) => {
      for name in r.deleted {
        eprintln!("deleted cache: {}", name);
      }
    }
    Outcome::Responded(mut result) => {
      eprintln!("{} ({}, {})", result.data.status, result.data.kind, result.source);
      let body = result.data.take_body()?;
      let mut out = std::io::stdout().lock();
      out.write_all(&body)?;
      out.flush()?;
    }
    // The notifier already printed it
    Outcome::Notified(_) => {}
    Outcome::Clicked { opened } => {
      if let Some(url) = opened {
        eprintln!("opened {}", url);
      }
    }
    Outcome::Synced(None) => eprintln!("sync tag ignored"),
    Outcome::Synced(Some(r)) => eprintln!(
      "submitted {}, failed {}, pending {}",
      r.submitted, r.failed, r.remaining
    ),
  }
  Ok(())
}

fn init_logging(log_dir: Option<&Path>) -> Result<WorkerGuard> {
  let filter =
    EnvFilter::try_from_env("PAYWORKER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  let (writer, guard) = match log_dir {
    Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "payworker.log")),
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(log_dir.is_none())
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
