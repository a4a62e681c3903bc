//! Strategy engine: decides between network and partitions for each request.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classify::RoutingClass;
use crate::config::WorkerSettings;
use crate::http::{Request, Response};
use crate::transport::Transport;

use super::key::{CachedResponse, RequestKey};
use super::storage::PartitionStore;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  /// Live response from the network
  Network,
  /// Snapshot from a partition
  Cache,
  /// Synthesized or pre-cached offline response
  Fallback,
  /// Neither network nor cache had it
  NotFound,
}

impl ServedFrom {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Fallback => "fallback",
      Self::NotFound => "not-found",
    }
  }
}

/// Response handed back to the hosting environment.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ServedFrom,
}

impl Served {
  fn new(response: Response, source: ServedFrom) -> Self {
    Self { response, source }
  }

  fn from_cache(cached: CachedResponse) -> Self {
    Self::new(cached.response, ServedFrom::Cache)
  }
}

/// Runs one of the caching strategies against the partition store.
///
/// Each request gets one network attempt and at most one fallback lookup.
/// Storage failures are logged and treated as a miss or a skipped write;
/// they never fail the request.
pub struct StrategyEngine {
  settings: Arc<WorkerSettings>,
  store: Arc<dyn PartitionStore>,
  transport: Arc<dyn Transport>,
}

impl StrategyEngine {
  pub fn new(
    settings: Arc<WorkerSettings>,
    store: Arc<dyn PartitionStore>,
    transport: Arc<dyn Transport>,
  ) -> Self {
    Self {
      settings,
      store,
      transport,
    }
  }

  /// Serve a classified request.
  pub async fn handle(&self, request: &Request, class: RoutingClass) -> Served {
    match class {
      RoutingClass::StaticAsset => self.cache_first(request).await,
      RoutingClass::Api | RoutingClass::HtmlPage | RoutingClass::Other => {
        self.network_first(request, class).await
      }
    }
  }

  /// Cache-first against the static partition.
  ///
  /// 1. Static partition hit: return it, no network call
  /// 2. Miss: fetch, storing a 200 in the static partition
  /// 3. Network failure: plain-text 404
  async fn cache_first(&self, request: &Request) -> Served {
    let key = RequestKey::for_request(request);
    let partition = &self.settings.names.static_name;

    if let Some(key) = &key {
      if let Some(cached) = self.lookup(partition, key) {
        debug!(url = %request.url, stored_at = %cached.stored_at, "static asset served from cache");
        return Served::from_cache(cached);
      }
    }

    match self.transport.fetch(request).await {
      Ok(response) => {
        if let Some(key) = &key {
          self.store_if_cacheable(partition, key, &response);
        }
        Served::new(response, ServedFrom::Network)
      }
      Err(e) => {
        info!(url = %request.url, error = %e, "static asset not cached and network failed");
        Served::new(Response::not_found_text(), ServedFrom::NotFound)
      }
    }
  }

  /// Network-first with the dynamic partition as fallback.
  ///
  /// Non-200 responses are returned as-is and never stored. When the network
  /// fails and nothing is cached, the routing class picks the fallback.
  async fn network_first(&self, request: &Request, class: RoutingClass) -> Served {
    let key = RequestKey::for_request(request);

    let error = match self.transport.fetch(request).await {
      Ok(response) => {
        if let Some(key) = &key {
          self.store_if_cacheable(&self.settings.names.dynamic_name, key, &response);
        }
        return Served::new(response, ServedFrom::Network);
      }
      Err(e) => e,
    };

    info!(url = %request.url, class = %class, error = %error, "network failed, trying cache");

    if let Some(cached) = key.as_ref().and_then(|k| self.match_any(k)) {
      return Served::from_cache(cached);
    }

    match class {
      RoutingClass::Api => Served::new(Response::offline_api(), ServedFrom::Fallback),
      RoutingClass::HtmlPage => self.offline_page(),
      RoutingClass::StaticAsset | RoutingClass::Other => {
        Served::new(Response::not_found(), ServedFrom::NotFound)
      }
    }
  }

  fn offline_page(&self) -> Served {
    let page = &self.settings.offline_page;
    let cached = self.match_any(&RequestKey::get(page));

    match cached {
      Some(cached) => Served::new(cached.response, ServedFrom::Fallback),
      None => {
        warn!(page = %page, "offline page missing from cache, serving built-in page");
        Served::new(Response::offline_document(), ServedFrom::Fallback)
      }
    }
  }

  fn lookup(&self, partition: &str, key: &RequestKey) -> Option<CachedResponse> {
    match self.store.lookup(partition, key) {
      Ok(cached) => cached,
      Err(e) => {
        warn!(partition, key = %key, error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  fn match_any(&self, key: &RequestKey) -> Option<CachedResponse> {
    match self.store.match_any(key) {
      Ok(cached) => cached,
      Err(e) => {
        warn!(key = %key, error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  fn store_if_cacheable(&self, partition: &str, key: &RequestKey, response: &Response) {
    if !response.is_cacheable() {
      debug!(key = %key, status = response.status, "not caching non-200 response");
      return;
    }

    let result = self
      .store
      .open(partition)
      .and_then(|handle| self.store.put(&handle, key, response));

    if let Err(e) = result {
      warn!(partition, key = %key, error = %e, "cache write failed, response served uncached");
    }
  }
}

impl Clone for StrategyEngine {
  fn clone(&self) -> Self {
    Self {
      settings: Arc::clone(&self.settings),
      store: Arc::clone(&self.store),
      transport: Arc::clone(&self.transport),
    }
  }
}
