//! Network transport used by the strategies, install and background sync.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

use crate::error::NetworkError;
use crate::http::{Request, Response};

/// Opaque fetch capability.
///
/// A returned `Response` means the server answered, whatever the status.
/// `Err` means no response was obtained at all.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self, NetworkError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("swcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| NetworkError::Http {
        url: String::new(),
        source: e,
      })?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let url = request.url.to_string();
    let mut builder = self.client.request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| NetworkError::unreachable(&url, format!("invalid header name: {}", e)))?;
      let value = HeaderValue::from_str(value)
        .map_err(|e| NetworkError::unreachable(&url, format!("invalid header value: {}", e)))?;
      builder = builder.header(name, value);
    }

    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| NetworkError::Http {
      url: url.clone(),
      source: e,
    })?;

    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|v| (k.as_str().to_string(), v.to_string()))
      })
      .collect();

    // The body is part of the snapshot, so a failure reading it is a failed fetch.
    let body = response
      .bytes()
      .await
      .map_err(|e| NetworkError::Http {
        url: url.clone(),
        source: e,
      })?
      .to_vec();

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body,
    })
  }
}
