//! Cache keys and stored response snapshots.

use chrono::{DateTime, Utc};
use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::{Request, Response};

/// Identity of a cacheable request: method plus absolute URL, query included.
///
/// Only GET requests have a key, so nothing else can ever be written to a
/// partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  url: String,
}

impl RequestKey {
  /// Build a key, or `None` when the method is not cacheable.
  pub fn new(method: &Method, url: &Url) -> Option<Self> {
    if *method != Method::GET {
      return None;
    }

    Some(Self::get(url))
  }

  /// Key for a GET of `url`.
  pub fn get(url: &Url) -> Self {
    // Fragments never reach the server and do not distinguish entries
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      url: url.to_string(),
    }
  }

  pub fn for_request(request: &Request) -> Option<Self> {
    Self::new(&request.method, &request.url)
  }

  pub fn method(&self) -> &'static str {
    "GET"
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable fixed-length hash used as the storage primary key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method(), self.url)
  }
}

/// A response as it was when stored. Replaced wholesale on re-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  pub stored_at: DateTime<Utc>,
}
