use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Folder grouping feeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
  pub id: String,
  pub name: String,
  pub created_at: DateTime<Utc>,
}

/// Ingester kind used by the store to poll a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
  Rss,
  Custom,
  #[serde(other)]
  Unknown,
}

/// Feed subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
  pub id: String,
  pub name: String,
  #[serde(rename = "url")]
  pub source_url: String,
  pub plugin_type: PluginType,
  #[serde(default, deserialize_with = "deserialize_optional_id")]
  pub folder_id: Option<String>,
  /// Minutes between polls
  #[serde(default)]
  pub update_interval: u32,
  #[serde(default, deserialize_with = "deserialize_optional_time")]
  pub last_updated: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl Feed {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(u64::from(self.update_interval) * 60)
  }
}

/// Fields accepted when creating or updating a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedInput {
  pub name: String,
  #[serde(rename = "url")]
  pub source_url: String,
  pub plugin_type: PluginType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub folder_id: Option<String>,
  pub update_interval: u32,
}

/// Article as seen by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
  pub id: String,
  pub feed_id: String,
  pub title: String,
  #[serde(default)]
  pub content: Option<String>,
  pub url: String,
  #[serde(default, deserialize_with = "deserialize_optional_time")]
  pub published_at: Option<DateTime<Utc>>,
  pub is_read: bool,
  pub is_later: bool,
  pub created_at: DateTime<Utc>,
}

impl Article {
  /// Read/later flags as a pair
  pub fn status(&self) -> ArticleStatus {
    ArticleStatus {
      is_read: self.is_read,
      is_later: self.is_later,
    }
  }
}

/// The two independent per-article flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleStatus {
  pub is_read: bool,
  pub is_later: bool,
}

/// The store encodes "unset" timestamps as the zero time (year 1).
fn deserialize_optional_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  let value: Option<DateTime<Utc>> = Option::deserialize(deserializer)?;
  Ok(value.filter(|t| t.year() > 1))
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let value: Option<String> = Option::deserialize(deserializer)?;
  Ok(value.filter(|s| !s.is_empty()))
}
