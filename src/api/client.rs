use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{SyncError, SyncResult};

use super::store::RemoteStore;
use super::types::{Article, Feed, FeedInput, Folder};

/// Remote store reached over the JSON HTTP API
#[derive(Clone)]
pub struct HttpStore {
  http: reqwest::Client,
  base_url: Url,
}

impl HttpStore {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    // Url::join drops the last segment unless the base ends with a slash
    let mut base = config.base_url.trim_end_matches('/').to_string();
    base.push('/');
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  fn url(&self, path: &str) -> SyncResult<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| SyncError::unknown(format!("invalid request path {}: {}", path, e)))
  }

  async fn send(&self, req: RequestBuilder) -> SyncResult<String> {
    let response = req.send().await?;
    let status = response.status();
    let body = response.text().await?;
    debug!(status = status.as_u16(), "remote store responded");
    if !status.is_success() {
      return Err(SyncError::from_status(status.as_u16(), &error_message(&body)));
    }
    Ok(body)
  }

  async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> SyncResult<T> {
    let body = self.send(req).await?;
    serde_json::from_str(&body)
      .map_err(|e| SyncError::unknown(format!("failed to decode response: {}", e)))
  }

  /// The server encodes an empty collection as `null`.
  async fn send_list<T: DeserializeOwned>(&self, req: RequestBuilder) -> SyncResult<Vec<T>> {
    let list: Option<Vec<T>> = self.send_json(req).await?;
    Ok(list.unwrap_or_default())
  }
}

/// Pull the `error` field out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
  serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
    .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl RemoteStore for HttpStore {
  async fn list_articles(&self) -> SyncResult<Vec<Article>> {
    let url = self.url("articles")?;
    self.send_list(self.http.get(url)).await
  }

  async fn list_later_articles(&self) -> SyncResult<Vec<Article>> {
    let url = self.url("articles/later")?;
    self.send_list(self.http.get(url)).await
  }

  async fn get_article(&self, id: &str) -> SyncResult<Article> {
    let url = self.url(&format!("articles/{}", id))?;
    self.send_json(self.http.get(url)).await
  }

  async fn update_article_status(
    &self,
    id: &str,
    is_read: bool,
    is_later: bool,
  ) -> SyncResult<Article> {
    let url = self.url(&format!("articles/{}/status", id))?;
    let body = json!({ "is_read": is_read, "is_later": is_later });
    self.send_json(self.http.put(url).json(&body)).await
  }

  async fn list_folders(&self) -> SyncResult<Vec<Folder>> {
    let url = self.url("folders")?;
    self.send_list(self.http.get(url)).await
  }

  async fn get_folder(&self, id: &str) -> SyncResult<Folder> {
    let url = self.url(&format!("folders/{}", id))?;
    self.send_json(self.http.get(url)).await
  }

  async fn create_folder(&self, name: &str) -> SyncResult<Folder> {
    let url = self.url("folders")?;
    self
      .send_json(self.http.post(url).json(&json!({ "name": name })))
      .await
  }

  async fn update_folder(&self, id: &str, name: &str) -> SyncResult<Folder> {
    let url = self.url(&format!("folders/{}", id))?;
    self
      .send_json(self.http.put(url).json(&json!({ "name": name })))
      .await
  }

  async fn delete_folder(&self, id: &str) -> SyncResult<()> {
    let url = self.url(&format!("folders/{}", id))?;
    self.send(self.http.delete(url)).await.map(|_| ())
  }

  async fn list_feeds(&self, folder_id: Option<&str>) -> SyncResult<Vec<Feed>> {
    let url = self.url("feeds")?;
    let feeds: Vec<Feed> = self.send_list(self.http.get(url)).await?;
    // The API has no folder filter; narrow the full list locally
    Ok(match folder_id {
      Some(folder) => feeds
        .into_iter()
        .filter(|f| f.folder_id.as_deref() == Some(folder))
        .collect(),
      None => feeds,
    })
  }

  async fn get_feed(&self, id: &str) -> SyncResult<Feed> {
    let url = self.url(&format!("feeds/{}", id))?;
    self.send_json(self.http.get(url)).await
  }

  async fn create_feed(&self, feed: &FeedInput) -> SyncResult<Feed> {
    let url = self.url("feeds")?;
    self.send_json(self.http.post(url).json(feed)).await
  }

  async fn update_feed(&self, id: &str, feed: &FeedInput) -> SyncResult<Feed> {
    let url = self.url(&format!("feeds/{}", id))?;
    self.send_json(self.http.put(url).json(feed)).await
  }

  async fn delete_feed(&self, id: &str) -> SyncResult<()> {
    let url = self.url(&format!("feeds/{}", id))?;
    self.send(self.http.delete(url)).await.map(|_| ())
  }
}
