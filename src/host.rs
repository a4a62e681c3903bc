//! Hosting environment adapter.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use url::Url;

use crate::notify::Notification;

/// Capabilities the hosting environment offers the worker.
pub trait Host: Send + Sync {
  /// Supersede the active instance without waiting for its clients to close.
  fn skip_waiting(&self);

  /// Take control of every open client context.
  fn claim_clients(&self);

  fn show_notification(&self, notification: &Notification);

  fn close_notification(&self);

  fn open_window(&self, url: &Url);
}

/// Host for the command-line adapter: prints to stdout and remembers
/// whether skip-waiting was requested.
#[derive(Default)]
pub struct ConsoleHost {
  skip_waiting: AtomicBool,
}

impl ConsoleHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }
}

impl Host for ConsoleHost {
  fn skip_waiting(&self) {
    info!("skip waiting requested");
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  fn claim_clients(&self) {
    info!("claimed clients");
  }

  fn show_notification(&self, notification: &Notification) {
    match serde_json::to_string_pretty(notification) {
      Ok(json) => println!("{}", json),
      Err(_) => println!("{}: {}", notification.title, notification.body),
    }
  }

  fn close_notification(&self) {
    info!("notification closed");
  }

  fn open_window(&self, url: &Url) {
    println!("open {}", url);
  }
}
