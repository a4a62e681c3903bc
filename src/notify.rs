//! Push notification payloads and click handling.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::NotificationConfig;

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// Milliseconds since the Unix epoch
  pub date_of_arrival: i64,
  pub primary_key: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

impl Notification {
  /// Build the notification for a push. A missing payload uses the
  /// configured default body.
  pub fn for_push(config: &NotificationConfig, payload: Option<&str>, now: DateTime<Utc>) -> Self {
    let body = payload.unwrap_or(config.default_body.as_str()).to_string();

    let action = |action: &str, title: &str| NotificationAction {
      action: action.to_string(),
      title: title.to_string(),
      icon: config.badge.clone(),
    };

    Self {
      title: config.title.clone(),
      body,
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      vibrate: config.vibrate.clone(),
      data: NotificationData {
        date_of_arrival: now.timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![action(ACTION_EXPLORE, "View"), action(ACTION_CLOSE, "Close")],
    }
  }
}

/// Path to open for a clicked action, if any.
pub fn click_target<'a>(config: &'a NotificationConfig, action: Option<&str>) -> Option<&'a str> {
  match action {
    Some(ACTION_EXPLORE) => Some(config.default_view.as_str()),
    _ => None,
  }
}
