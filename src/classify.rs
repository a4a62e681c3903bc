//! Request classification.

use reqwest::Method;

use crate::http::Request;

/// Routing bucket for an intercepted GET request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingClass {
  Api,
  StaticAsset,
  HtmlPage,
  Other,
}

impl RoutingClass {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Api => "api",
      Self::StaticAsset => "static",
      Self::HtmlPage => "html",
      Self::Other => "other",
    }
  }
}

impl std::fmt::Display for RoutingClass {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Classify a request. `None` means the request must not be intercepted.
///
/// Checks run in a fixed order and the first match wins:
/// 1. non-GET: not intercepted
/// 2. path under `/api/`
/// 3. path under `/static/`, or an allow-listed asset origin
/// 4. `Accept` mentions `text/html` (a missing header is not HTML)
/// 5. everything else
pub fn classify(request: &Request, asset_origins: &[String]) -> Option<RoutingClass> {
  if request.method != Method::GET {
    return None;
  }

  let path = request.url.path();

  if path.starts_with("/api/") {
    return Some(RoutingClass::Api);
  }

  let origin = request.url.origin().ascii_serialization();
  if path.starts_with("/static/") || asset_origins.iter().any(|o| *o == origin) {
    return Some(RoutingClass::StaticAsset);
  }

  let wants_html = request
    .header("accept")
    .is_some_and(|accept| accept.contains("text/html"));
  if wants_html {
    return Some(RoutingClass::HtmlPage);
  }

  Some(RoutingClass::Other)
}
