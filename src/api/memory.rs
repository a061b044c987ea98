//! In-process remote store for exercising the cache and synchronizer.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};

use super::store::RemoteStore;
use super::types::{Article, Feed, FeedInput, Folder};

#[derive(Default)]
struct State {
  folders: Vec<Folder>,
  feeds: Vec<Feed>,
  articles: Vec<Article>,
  next_id: u64,
}

impl State {
  fn next_id(&mut self, prefix: &str) -> String {
    self.next_id += 1;
    format!("{}-{}", prefix, self.next_id)
  }
}

/// Store backed by vectors, with per-operation call counts, injected
/// failures and artificial latency.
#[derive(Default)]
pub struct MemoryStore {
  state: Mutex<State>,
  calls: Mutex<HashMap<&'static str, usize>>,
  failures: Mutex<HashMap<&'static str, SyncError>>,
  delays: Mutex<HashMap<&'static str, Duration>>,
}

/// Article fixture with fixed timestamps.
pub fn article(id: &str, is_read: bool, is_later: bool) -> Article {
  Article {
    id: id.to_string(),
    feed_id: "feed-1".to_string(),
    title: format!("Article {}", id),
    content: None,
    url: format!("https://example.com/{}", id),
    published_at: None,
    is_read,
    is_later,
    created_at: Utc::now(),
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_articles(articles: Vec<Article>) -> Self {
    let store = Self::new();
    store.state().articles = articles;
    store
  }

  fn state(&self) -> std::sync::MutexGuard<'_, State> {
    self
      .state
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
  }

  /// Number of times `op` has been called.
  pub fn calls(&self, op: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .get(op)
      .copied()
      .unwrap_or(0)
  }

  /// Make every call to `op` fail with `err` until cleared.
  pub fn fail(&self, op: &'static str, err: SyncError) {
    self
      .failures
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .insert(op, err);
  }

  pub fn clear_failure(&self, op: &'static str) {
    self
      .failures
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .remove(op);
  }

  /// Delay every call to `op` before it touches state.
  pub fn delay(&self, op: &'static str, delay: Duration) {
    self
      .delays
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .insert(op, delay);
  }

  /// Change flags behind the client's back, as another session would.
  pub fn set_status_directly(&self, id: &str, is_read: bool, is_later: bool) {
    if let Some(a) = self.state().articles.iter_mut().find(|a| a.id == id) {
      a.is_read = is_read;
      a.is_later = is_later;
    }
  }

  async fn begin(&self, op: &'static str) -> SyncResult<()> {
    *self
      .calls
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .entry(op)
      .or_default() += 1;

    let delay = self
      .delays
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .get(op)
      .copied();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let failure = self
      .failures
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .get(op)
      .cloned();
    match failure {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

fn validate_name(name: &str) -> SyncResult<()> {
  if name.trim().is_empty() {
    return Err(SyncError::Validation("name must not be empty".to_string()));
  }
  Ok(())
}

#[async_trait]
impl RemoteStore for MemoryStore {
  async fn list_articles(&self) -> SyncResult<Vec<Article>> {
    self.begin("list_articles").await?;
    Ok(self.state().articles.clone())
  }

  async fn list_later_articles(&self) -> SyncResult<Vec<Article>> {
    self.begin("list_later_articles").await?;
    Ok(
      self
        .state()
        .articles
        .iter()
        .filter(|a| a.is_later)
        .cloned()
        .collect(),
    )
  }

  async fn get_article(&self, id: &str) -> SyncResult<Article> {
    self.begin("get_article").await?;
    self
      .state()
      .articles
      .iter()
      .find(|a| a.id == id)
      .cloned()
      .ok_or_else(|| SyncError::NotFound(format!("article {}", id)))
  }

  async fn update_article_status(
    &self,
    id: &str,
    is_read: bool,
    is_later: bool,
  ) -> SyncResult<Article> {
    self.begin("update_article_status").await?;
    let mut state = self.state();
    let article = state
      .articles
      .iter_mut()
      .find(|a| a.id == id)
      .ok_or_else(|| SyncError::NotFound(format!("article {}", id)))?;
    article.is_read = is_read;
    article.is_later = is_later;
    Ok(article.clone())
  }

  async fn list_folders(&self) -> SyncResult<Vec<Folder>> {
    self.begin("list_folders").await?;
    Ok(self.state().folders.clone())
  }

  async fn get_folder(&self, id: &str) -> SyncResult<Folder> {
    self.begin("get_folder").await?;
    self
      .state()
      .folders
      .iter()
      .find(|f| f.id == id)
      .cloned()
      .ok_or_else(|| SyncError::NotFound(format!("folder {}", id)))
  }

  async fn create_folder(&self, name: &str) -> SyncResult<Folder> {
    self.begin("create_folder").await?;
    validate_name(name)?;
    let mut state = self.state();
    let folder = Folder {
      id: state.next_id("folder"),
      name: name.to_string(),
      created_at: Utc::now(),
    };
    state.folders.push(folder.clone());
    Ok(folder)
  }

  async fn update_folder(&self, id: &str, name: &str) -> SyncResult<Folder> {
    self.begin("update_folder").await?;
    validate_name(name)?;
    let mut state = self.state();
    let folder = state
      .folders
      .iter_mut()
      .find(|f| f.id == id)
      .ok_or_else(|| SyncError::NotFound(format!("folder {}", id)))?;
    folder.name = name.to_string();
    Ok(folder.clone())
  }

  async fn delete_folder(&self, id: &str) -> SyncResult<()> {
    self.begin("delete_folder").await?;
    let mut state = self.state();
    let before = state.folders.len();
    state.folders.retain(|f| f.id != id);
    if state.folders.len() == before {
      return Err(SyncError::NotFound(format!("folder {}", id)));
    }
    // Feeds are detached, not deleted
    for feed in state.feeds.iter_mut() {
      if feed.folder_id.as_deref() == Some(id) {
        feed.folder_id = None;
      }
    }
    Ok(())
  }

  async fn list_feeds(&self, folder_id: Option<&str>) -> SyncResult<Vec<Feed>> {
    self.begin("list_feeds").await?;
    Ok(
      self
        .state()
        .feeds
        .iter()
        .filter(|f| folder_id.is_none() || f.folder_id.as_deref() == folder_id)
        .cloned()
        .collect(),
    )
  }

  async fn get_feed(&self, id: &str) -> SyncResult<Feed> {
    self.begin("get_feed").await?;
    self
      .state()
      .feeds
      .iter()
      .find(|f| f.id == id)
      .cloned()
      .ok_or_else(|| SyncError::NotFound(format!("feed {}", id)))
  }

  async fn create_feed(&self, input: &FeedInput) -> SyncResult<Feed> {
    self.begin("create_feed").await?;
    validate_name(&input.name)?;
    let mut state = self.state();
    let feed = Feed {
      id: state.next_id("feed"),
      name: input.name.clone(),
      source_url: input.source_url.clone(),
      plugin_type: input.plugin_type.clone(),
      folder_id: input.folder_id.clone(),
      update_interval: input.update_interval,
      last_updated: None,
      created_at: Utc::now(),
    };
    state.feeds.push(feed.clone());
    Ok(feed)
  }

  async fn update_feed(&self, id: &str, input: &FeedInput) -> SyncResult<Feed> {
    self.begin("update_feed").await?;
    validate_name(&input.name)?;
    let mut state = self.state();
    let feed = state
      .feeds
      .iter_mut()
      .find(|f| f.id == id)
      .ok_or_else(|| SyncError::NotFound(format!("feed {}", id)))?;
    feed.name = input.name.clone();
    feed.source_url = input.source_url.clone();
    feed.plugin_type = input.plugin_type.clone();
    feed.folder_id = input.folder_id.clone();
    feed.update_interval = input.update_interval;
    Ok(feed.clone())
  }

  async fn delete_feed(&self, id: &str) -> SyncResult<()> {
    self.begin("delete_feed").await?;
    let mut state = self.state();
    let before = state.feeds.len();
    state.feeds.retain(|f| f.id != id);
    if state.feeds.len() == before {
      return Err(SyncError::NotFound(format!("feed {}", id)));
    }
    state.articles.retain(|a| a.feed_id != id);
    Ok(())
  }
}
