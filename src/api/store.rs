//! Contract of the remote source of truth.

use async_trait::async_trait;

use crate::error::SyncResult;

use super::types::{Article, Feed, FeedInput, Folder};

/// Canonical store for folders, feeds and articles.
///
/// Every call crosses a network boundary and may fail. Invariants such as
/// non-empty folder names and cascade policy are enforced on the far side.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// All articles in server order
  async fn list_articles(&self) -> SyncResult<Vec<Article>>;

  /// Articles with `is_later` set
  async fn list_later_articles(&self) -> SyncResult<Vec<Article>>;

  async fn get_article(&self, id: &str) -> SyncResult<Article>;

  /// Set both flags and return the post-mutation record
  async fn update_article_status(&self, id: &str, is_read: bool, is_later: bool)
    -> SyncResult<Article>;

  async fn list_folders(&self) -> SyncResult<Vec<Folder>>;

  async fn get_folder(&self, id: &str) -> SyncResult<Folder>;

  async fn create_folder(&self, name: &str) -> SyncResult<Folder>;

  async fn update_folder(&self, id: &str, name: &str) -> SyncResult<Folder>;

  async fn delete_folder(&self, id: &str) -> SyncResult<()>;

  /// Feeds, restricted to one folder when `folder_id` is given
  async fn list_feeds(&self, folder_id: Option<&str>) -> SyncResult<Vec<Feed>>;

  async fn get_feed(&self, id: &str) -> SyncResult<Feed>;

  async fn create_feed(&self, feed: &FeedInput) -> SyncResult<Feed>;

  async fn update_feed(&self, id: &str, feed: &FeedInput) -> SyncResult<Feed>;

  async fn delete_feed(&self, id: &str) -> SyncResult<()>;
}
