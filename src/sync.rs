//! Synchronizer: writes to the remote store followed by targeted
//! invalidation of every cached view that depends on the written record.
//!
//! A mutation is all-or-nothing from the cache's point of view. The store
//! call is awaited first; only on success are the affected keys (taken from
//! the static table in `api::cache::DEPENDENCIES`) invalidated as one batch,
//! and any of them a view is subscribed to is refetched before the call
//! returns. On failure nothing in the cache is touched and the error goes
//! back to the caller untouched. Mutations are never queued, retried or
//! merged; concurrent writes to one article race at the store.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::api::cache::{Mutation, QueryKey};
use crate::api::cached_client::CachedClient;
use crate::api::types::{Article, Feed, FeedInput, Folder};
use crate::error::SyncResult;

#[derive(Clone)]
pub struct Synchronizer {
  client: CachedClient,
}

impl Synchronizer {
  pub fn new(client: CachedClient) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &CachedClient {
    &self.client
  }

  /// Set both flags of an article.
  ///
  /// The request is sent even if the flags already hold these values;
  /// another session may have changed them since our last read.
  pub async fn update_article_status(
    &self,
    id: &str,
    is_read: bool,
    is_later: bool,
  ) -> SyncResult<Article> {
    info!(article = id, is_read, is_later, "updating article status");
    let article = self
      .client
      .store()
      .update_article_status(id, is_read, is_later)
      .await
      .inspect_err(|e| warn!(article = id, error = %e, "status update failed"))?;

    self
      .settle(Mutation::ArticleStatus { id: id.to_string() })
      .await;
    Ok(article)
  }

  /// Flip `is_read`, keeping `is_later`.
  pub async fn toggle_read(&self, id: &str) -> SyncResult<Article> {
    let current = self.snapshot(id).await?;
    self
      .update_article_status(id, !current.is_read, current.is_later)
      .await
  }

  /// Flip `is_later`, keeping `is_read`.
  pub async fn toggle_later(&self, id: &str) -> SyncResult<Article> {
    let current = self.snapshot(id).await?;
    self
      .update_article_status(id, current.is_read, !current.is_later)
      .await
  }

  /// Current copy of an article: any fresh entry holding it, else a load
  /// of the single article. Stale copies may predate a mutation.
  pub async fn snapshot(&self, id: &str) -> SyncResult<Article> {
    let detail = QueryKey::article(id);
    let resident = self
      .client
      .cache()
      .peek(&detail)
      .filter(|entry| entry.is_fresh())
      .and_then(|entry| entry.value)
      .and_then(|data| data.find_article(id).cloned())
      .or_else(|| {
        self
          .client
          .cache()
          .find_map(|_, data| data.find_article(id).cloned())
      });

    match resident {
      Some(article) => Ok(article),
      None => self.client.article(id).await,
    }
  }

  pub async fn create_folder(&self, name: &str) -> SyncResult<Folder> {
    info!(name, "creating folder");
    let folder = self.client.store().create_folder(name).await?;
    self.settle(Mutation::FolderCreate).await;
    Ok(folder)
  }

  pub async fn update_folder(&self, id: &str, name: &str) -> SyncResult<Folder> {
    info!(folder = id, name, "renaming folder");
    let folder = self.client.store().update_folder(id, name).await?;
    self
      .settle(Mutation::FolderUpdate { id: id.to_string() })
      .await;
    Ok(folder)
  }

  pub async fn delete_folder(&self, id: &str) -> SyncResult<()> {
    info!(folder = id, "deleting folder");
    self.client.store().delete_folder(id).await?;
    self
      .settle(Mutation::FolderDelete { id: id.to_string() })
      .await;
    Ok(())
  }

  pub async fn create_feed(&self, feed: &FeedInput) -> SyncResult<Feed> {
    info!(name = %feed.name, url = %feed.source_url, "creating feed");
    let created = self.client.store().create_feed(feed).await?;
    self.settle(Mutation::FeedCreate).await;
    Ok(created)
  }

  pub async fn update_feed(&self, id: &str, feed: &FeedInput) -> SyncResult<Feed> {
    info!(feed = id, "updating feed");
    let updated = self.client.store().update_feed(id, feed).await?;
    self
      .settle(Mutation::FeedUpdate { id: id.to_string() })
      .await;
    Ok(updated)
  }

  pub async fn delete_feed(&self, id: &str) -> SyncResult<()> {
    info!(feed = id, "deleting feed");
    self.client.store().delete_feed(id).await?;
    self
      .settle(Mutation::FeedDelete { id: id.to_string() })
      .await;
    Ok(())
  }

  /// Invalidate every resident key the mutation affects, then refetch the
  /// ones a view is watching. Refetch failures stay on their entries.
  async fn settle(&self, mutation: Mutation) {
    let cache = self.client.cache();
    let affected: Vec<QueryKey> = cache
      .keys()
      .into_iter()
      .filter(|key| mutation.affects(key))
      .collect();
    debug!(?mutation, keys = affected.len(), "invalidating dependents");
    cache.invalidate_all(&affected);

    let refreshes: Vec<_> = cache
      .subscribed(&affected)
      .iter()
      .filter_map(|key| cache.revalidate(key))
      .collect();
    for result in join_all(refreshes).await {
      if let Err(e) = result {
        warn!(error = %e, "refetch after mutation failed");
      }
    }
  }
}
