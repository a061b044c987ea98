//! Remote store reads routed through the shared fetch cache.

use futures::FutureExt;
use std::sync::Arc;

use crate::cache::{FetchCache, Fetcher};
use crate::error::SyncResult;
use crate::query::ViewQuery;

use super::cache::{QueryData, QueryKey};
use super::store::RemoteStore;
use super::types::{Article, Feed, Folder};

/// Cache type shared by every view of the feed store.
pub type QueryCache = FetchCache<QueryKey, QueryData>;

/// Remote store with transparent caching.
///
/// Exposes the same reads as the store, but every result lands in the
/// shared cache under its query key and concurrent reads are coalesced.
#[derive(Clone)]
pub struct CachedClient {
  inner: Arc<dyn RemoteStore>,
  cache: QueryCache,
}

impl CachedClient {
  pub fn new(inner: Arc<dyn RemoteStore>, cache: QueryCache) -> Self {
    Self { inner, cache }
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  pub fn store(&self) -> &Arc<dyn RemoteStore> {
    &self.inner
  }

  /// Fetch function for `key`, registered with the cache so invalidated
  /// entries can be refetched without the original caller.
  pub fn fetcher(&self, key: &QueryKey) -> Fetcher<QueryData> {
    let store = Arc::clone(&self.inner);
    let key = key.clone();
    Arc::new(move || {
      let store = Arc::clone(&store);
      let key = key.clone();
      async move {
        match key {
          QueryKey::AllArticles => store.list_articles().await.map(QueryData::Articles),
          QueryKey::LaterArticles => store.list_later_articles().await.map(QueryData::Articles),
          QueryKey::Article { id } => store.get_article(&id).await.map(QueryData::Article),
          QueryKey::Folders => store.list_folders().await.map(QueryData::Folders),
          QueryKey::Folder { id } => store.get_folder(&id).await.map(QueryData::Folder),
          QueryKey::Feeds { folder_id } => store
            .list_feeds(folder_id.as_deref())
            .await
            .map(QueryData::Feeds),
          QueryKey::Feed { id } => store.get_feed(&id).await.map(QueryData::Feed),
        }
      }
      .boxed()
    })
  }

  /// Bind a polling view to `key`.
  pub fn watch(&self, key: QueryKey) -> ViewQuery<QueryKey, QueryData> {
    let fetcher = self.fetcher(&key);
    ViewQuery::new(self.cache.clone(), key, fetcher)
  }

  /// Load any query through the cache.
  pub async fn load(&self, key: QueryKey) -> SyncResult<QueryData> {
    let fetcher = self.fetcher(&key);
    self.cache.load_with(key, fetcher).await
  }

  pub async fn articles(&self) -> SyncResult<Vec<Article>> {
    self.load(QueryKey::AllArticles).await?.into_articles()
  }

  pub async fn later_articles(&self) -> SyncResult<Vec<Article>> {
    self.load(QueryKey::LaterArticles).await?.into_articles()
  }

  pub async fn article(&self, id: &str) -> SyncResult<Article> {
    self.load(QueryKey::article(id)).await?.into_article()
  }

  pub async fn folders(&self) -> SyncResult<Vec<Folder>> {
    self.load(QueryKey::Folders).await?.into_folders()
  }

  pub async fn folder(&self, id: &str) -> SyncResult<Folder> {
    self
      .load(QueryKey::Folder { id: id.to_string() })
      .await?
      .into_folder()
  }

  pub async fn feeds(&self, folder_id: Option<&str>) -> SyncResult<Vec<Feed>> {
    self
      .load(QueryKey::Feeds {
        folder_id: folder_id.map(String::from),
      })
      .await?
      .into_feeds()
  }

  pub async fn feed(&self, id: &str) -> SyncResult<Feed> {
    self
      .load(QueryKey::Feed { id: id.to_string() })
      .await?
      .into_feed()
  }
}
