mod cache;
mod classify;
mod config;
mod db;
mod error;
mod host;
mod http;
mod lifecycle;
mod logging;
mod notify;
mod sync;
#[cfg(test)]
mod testing;
mod transport;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::cache::{PartitionStore, SqlitePartitions};
use crate::db::Database;
use crate::host::ConsoleHost;
use crate::http::{Request, Response};
use crate::sync::SqliteQueue;
use crate::transport::{HttpTransport, Transport};
use crate::worker::{FetchOutcome, Worker};

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline-first request interception and caching for web applications")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// SQLite database holding partitions and pending actions
  #[arg(short, long)]
  database: Option<PathBuf>,

  /// Cache version, overriding the config file
  #[arg(long = "version-tag")]
  version_tag: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache static assets; activates right away when install succeeds
  Install,
  /// Delete partitions left over from previous versions
  Activate,
  /// Route a request through the cache strategies
  Fetch {
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Accept header value
    #[arg(long)]
    accept: Option<String>,
  },
  /// Run a named sync task
  Sync {
    #[arg(long, default_value = "background-sync")]
    tag: String,
  },
  /// Queue a write for replay at the next background sync
  Defer {
    url: String,
    #[arg(short = 'X', long, default_value = "POST")]
    method: String,
    #[arg(long)]
    body: Option<String>,
  },
  /// Show the notification for a push payload
  Push { payload: Option<String> },
  /// Click a notification action
  Click {
    #[arg(long)]
    action: Option<String>,
  },
  /// Post a control message, e.g. '{"type":"SKIP_WAITING"}'
  Message { json: String },
  /// List partitions
  Partitions,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(database) = args.database {
    config.database = Some(database);
  }
  if let Some(version) = args.version_tag {
    config.cache.version = version;
  }

  let _log_guard = logging::init(&config.logging)?;

  let settings = Arc::new(config.settings()?);
  let db = Database::open(config.database.as_deref())?;
  let store = Arc::new(SqlitePartitions::new(db.connection()));
  let queue = Arc::new(SqliteQueue::new(db.connection()));
  let transport = Arc::new(HttpTransport::new()?);
  let host = Arc::new(ConsoleHost::new());

  let worker = Worker::new(
    Arc::clone(&settings),
    store.clone(),
    queue,
    transport.clone(),
    host.clone(),
  );

  match args.command {
    Command::Install => {
      let report = worker.on_install().await?;
      println!(
        "cached {} assets in {}",
        report.cached.len(),
        report.partition
      );

      if host.skip_waiting_requested() {
        let report = worker.on_activate().await?;
        print_activation(&report.deleted);
      }
    }
    Command::Activate => {
      let report = worker.on_activate().await?;
      print_activation(&report.deleted);
    }
    Command::Fetch {
      url,
      method,
      accept,
    } => {
      let mut request = Request::new(parse_method(&method)?, resolve(&settings.origin, &url)?);
      if let Some(accept) = accept {
        request = request.with_header("Accept", &accept);
      }

      match worker.on_fetch(&request).await {
        FetchOutcome::Respond(served) => print_response(&served.response, served.source.as_str()),
        FetchOutcome::PassThrough => {
          let response = transport.fetch(&request).await?;
          print_response(&response, "pass-through");
        }
      }
    }
    Command::Sync { tag } => match worker.on_sync(&tag).await? {
      Some(report) => println!(
        "replayed {}, failed {}, discarded {}",
        report.replayed, report.failed, report.discarded
      ),
      None => println!("no sync task named '{}'", tag),
    },
    Command::Defer { url, method, body } => {
      let mut request = Request::new(parse_method(&method)?, resolve(&settings.origin, &url)?);
      if let Some(body) = body {
        request = request
          .with_header("Content-Type", "application/json")
          .with_body(body);
      }
      let id = worker.defer(&request)?;
      println!("queued action {}", id);
    }
    Command::Push { payload } => {
      worker.on_push(payload.as_deref());
    }
    Command::Click { action } => worker.on_notification_click(action.as_deref()),
    Command::Message { json } => match worker.on_message(&json) {
      Some(message) => {
        println!("accepted {:?}", message);
        if host.skip_waiting_requested() {
          let report = worker.on_activate().await?;
          print_activation(&report.deleted);
        }
      }
      None => println!("ignored"),
    },
    Command::Partitions => {
      for name in store.list_partition_names()? {
        let marker = if settings.names.is_current(&name) {
          "current"
        } else {
          "stale"
        };
        println!("{}\t{}", name, marker);
      }
    }
  }

  Ok(())
}

fn parse_method(method: &str) -> Result<Method> {
  Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))
}

/// Resolve a CLI URL, which may be a path relative to the app origin.
fn resolve(origin: &Url, url: &str) -> Result<Url> {
  origin
    .join(url)
    .map_err(|e| eyre!("Invalid url '{}': {}", url, e))
}

fn print_activation(deleted: &[String]) {
  if deleted.is_empty() {
    println!("activated, no stale partitions");
  } else {
    println!("activated, deleted {}", deleted.join(", "));
  }
}

fn print_response(response: &Response, source: &str) {
  println!("{} {} ({})", response.status, response.status_text, source);
  for (name, value) in &response.headers {
    println!("{}: {}", name, value);
  }
  println!();
  println!("{}", String::from_utf8_lossy(&response.body));
}
