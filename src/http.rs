//! Request and response values exchanged with the hosting environment.

use reqwest::Method;
use url::Url;

/// Body returned to API callers when both the network and the cache fail.
pub const OFFLINE_API_MESSAGE: &str =
  "You are offline. Please check your connection and try again.";

const OFFLINE_DOCUMENT: &str = "<!DOCTYPE html>\n<html>\n<head><title>Offline</title></head>\n\
<body><h1>You are offline</h1><p>Please check your connection and try again.</p></body>\n</html>\n";

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  /// Case-insensitive header lookup. Returns the first value.
  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }
}

/// A response snapshot: status line, headers and fully-read body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_status_text(mut self, text: &str) -> Self {
    self.status_text = text.to_string();
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  #[cfg(test)]
  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  /// Only exact 200 responses are written to a partition.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Structured 503 for API requests made while offline.
  pub fn offline_api() -> Self {
    let body = serde_json::json!({
      "error": OFFLINE_API_MESSAGE,
      "offline": true,
    });
    Self::new(503, body.to_string())
      .with_status_text("Service Unavailable")
      .with_header("Content-Type", "application/json")
  }

  /// Plain-text 404 for static assets that are neither cached nor reachable.
  pub fn not_found_text() -> Self {
    Self::new(404, "Not found")
      .with_status_text("Not Found")
      .with_header("Content-Type", "text/plain;charset=UTF-8")
  }

  /// Bare 404 with no body.
  pub fn not_found() -> Self {
    Self::new(404, Vec::new()).with_status_text("Not Found")
  }

  /// Built-in page served when even the pre-cached offline page is missing.
  pub fn offline_document() -> Self {
    Self::new(503, OFFLINE_DOCUMENT)
      .with_status_text("Service Unavailable")
      .with_header("Content-Type", "text/html;charset=UTF-8")
  }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
  headers
    .iter()
    .find(|(k, _)| k.eq_ignore_ascii_case(name))
    .map(|(_, v)| v.as_str())
}
