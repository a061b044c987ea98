//! Query keys, cached payloads and the mutation dependency table.

use std::fmt;

use crate::error::{SyncError, SyncResult};

use super::types::{Article, Feed, Folder};

// ============================================================================
// Query keys
// ============================================================================

/// One server-backed view the client can cache.
///
/// Renders as the request path the view is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
  /// Every article
  AllArticles,
  /// Articles flagged "later"
  LaterArticles,
  /// A single article
  Article { id: String },
  /// Every folder
  Folders,
  /// A single folder
  Folder { id: String },
  /// Feeds, optionally restricted to one folder
  Feeds { folder_id: Option<String> },
  /// A single feed
  Feed { id: String },
}

impl QueryKey {
  pub fn article(id: impl Into<String>) -> Self {
    Self::Article { id: id.into() }
  }

  pub fn kind(&self) -> KeyKind {
    match self {
      Self::AllArticles => KeyKind::AllArticles,
      Self::LaterArticles => KeyKind::LaterArticles,
      Self::Article { .. } => KeyKind::ArticleDetail,
      Self::Folders => KeyKind::Folders,
      Self::Folder { .. } => KeyKind::FolderDetail,
      Self::Feeds { .. } => KeyKind::Feeds,
      Self::Feed { .. } => KeyKind::FeedDetail,
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::AllArticles => write!(f, "/articles"),
      Self::LaterArticles => write!(f, "/articles/later"),
      Self::Article { id } => write!(f, "/articles/{}", id),
      Self::Folders => write!(f, "/folders"),
      Self::Folder { id } => write!(f, "/folders/{}", id),
      Self::Feeds { folder_id: None } => write!(f, "/feeds"),
      Self::Feeds {
        folder_id: Some(folder),
      } => write!(f, "/feeds?folder_id={}", folder),
      Self::Feed { id } => write!(f, "/feeds/{}", id),
    }
  }
}

/// Shape of a query key with its parameters erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
  AllArticles,
  LaterArticles,
  ArticleDetail,
  Folders,
  FolderDetail,
  Feeds,
  FeedDetail,
}

impl KeyKind {
  pub const ALL: [KeyKind; 7] = [
    KeyKind::AllArticles,
    KeyKind::LaterArticles,
    KeyKind::ArticleDetail,
    KeyKind::Folders,
    KeyKind::FolderDetail,
    KeyKind::Feeds,
    KeyKind::FeedDetail,
  ];

  /// Record fields whose value shows up in (or decides membership of) this view.
  pub fn reads(self) -> &'static [Field] {
    match self {
      KeyKind::AllArticles | KeyKind::LaterArticles | KeyKind::ArticleDetail => {
        &[Field::IsRead, Field::IsLater, Field::ArticleSet]
      }
      KeyKind::Folders => &[Field::FolderSet, Field::FolderRecord],
      KeyKind::FolderDetail => &[Field::FolderRecord],
      KeyKind::Feeds => &[Field::FeedSet, Field::FeedRecord],
      KeyKind::FeedDetail => &[Field::FeedRecord],
    }
  }
}

/// Server-side state a view can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
  IsRead,
  IsLater,
  /// Which articles exist
  ArticleSet,
  /// Which folders exist
  FolderSet,
  /// Contents of an existing folder
  FolderRecord,
  /// Which feeds exist and where they are filed
  FeedSet,
  /// Contents of an existing feed
  FeedRecord,
}

// ============================================================================
// Cached payloads
// ============================================================================

/// Value stored in a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
  Articles(Vec<Article>),
  Article(Article),
  Folders(Vec<Folder>),
  Folder(Folder),
  Feeds(Vec<Feed>),
  Feed(Feed),
}

impl QueryData {
  /// Copy of an article held by this payload, if any.
  pub fn find_article(&self, id: &str) -> Option<&Article> {
    match self {
      Self::Articles(articles) => articles.iter().find(|a| a.id == id),
      Self::Article(article) if article.id == id => Some(article),
      _ => None,
    }
  }

  pub fn into_articles(self) -> SyncResult<Vec<Article>> {
    match self {
      Self::Articles(articles) => Ok(articles),
      other => Err(mismatch("article list", &other)),
    }
  }

  pub fn into_article(self) -> SyncResult<Article> {
    match self {
      Self::Article(article) => Ok(article),
      other => Err(mismatch("article", &other)),
    }
  }

  pub fn into_folders(self) -> SyncResult<Vec<Folder>> {
    match self {
      Self::Folders(folders) => Ok(folders),
      other => Err(mismatch("folder list", &other)),
    }
  }

  pub fn into_folder(self) -> SyncResult<Folder> {
    match self {
      Self::Folder(folder) => Ok(folder),
      other => Err(mismatch("folder", &other)),
    }
  }

  pub fn into_feeds(self) -> SyncResult<Vec<Feed>> {
    match self {
      Self::Feeds(feeds) => Ok(feeds),
      other => Err(mismatch("feed list", &other)),
    }
  }

  pub fn into_feed(self) -> SyncResult<Feed> {
    match self {
      Self::Feed(feed) => Ok(feed),
      other => Err(mismatch("feed", &other)),
    }
  }

  fn label(&self) -> &'static str {
    match self {
      Self::Articles(_) => "article list",
      Self::Article(_) => "article",
      Self::Folders(_) => "folder list",
      Self::Folder(_) => "folder",
      Self::Feeds(_) => "feed list",
      Self::Feed(_) => "feed",
    }
  }
}

fn mismatch(expected: &str, found: &QueryData) -> SyncError {
  SyncError::unknown(format!(
    "cache entry holds a {} where a {} was expected",
    found.label(),
    expected
  ))
}

// ============================================================================
// Mutation dependency table
// ============================================================================

/// A single logical write against the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  ArticleStatus { id: String },
  FolderCreate,
  FolderUpdate { id: String },
  FolderDelete { id: String },
  FeedCreate,
  FeedUpdate { id: String },
  FeedDelete { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  ArticleStatus,
  FolderCreate,
  FolderUpdate,
  FolderDelete,
  FeedCreate,
  FeedUpdate,
  FeedDelete,
}

impl MutationKind {
  pub const ALL: [MutationKind; 7] = [
    MutationKind::ArticleStatus,
    MutationKind::FolderCreate,
    MutationKind::FolderUpdate,
    MutationKind::FolderDelete,
    MutationKind::FeedCreate,
    MutationKind::FeedUpdate,
    MutationKind::FeedDelete,
  ];

  /// Server-side state this mutation may change.
  ///
  /// Folder deletion can detach feeds and feed deletion can drop articles;
  /// cascades are the store's business, so both are assumed.
  pub fn writes(self) -> &'static [Field] {
    match self {
      MutationKind::ArticleStatus => &[Field::IsRead, Field::IsLater],
      MutationKind::FolderCreate => &[Field::FolderSet],
      MutationKind::FolderUpdate => &[Field::FolderRecord],
      MutationKind::FolderDelete => &[Field::FolderSet, Field::FolderRecord, Field::FeedRecord],
      MutationKind::FeedCreate => &[Field::FeedSet],
      MutationKind::FeedUpdate => &[Field::FeedRecord],
      MutationKind::FeedDelete => &[Field::FeedSet, Field::FeedRecord, Field::ArticleSet],
    }
  }
}

/// Views to invalidate after each kind of mutation.
///
/// A status change always invalidates both article lists, whichever flag
/// moved. New key kinds must be added here by hand.
pub const DEPENDENCIES: &[(MutationKind, &[KeyKind])] = &[
  (
    MutationKind::ArticleStatus,
    &[
      KeyKind::AllArticles,
      KeyKind::LaterArticles,
      KeyKind::ArticleDetail,
    ],
  ),
  (MutationKind::FolderCreate, &[KeyKind::Folders]),
  (
    MutationKind::FolderUpdate,
    &[KeyKind::Folders, KeyKind::FolderDetail],
  ),
  (
    MutationKind::FolderDelete,
    &[
      KeyKind::Folders,
      KeyKind::FolderDetail,
      KeyKind::Feeds,
      KeyKind::FeedDetail,
    ],
  ),
  (MutationKind::FeedCreate, &[KeyKind::Feeds]),
  (MutationKind::FeedUpdate, &[KeyKind::Feeds, KeyKind::FeedDetail]),
  (
    MutationKind::FeedDelete,
    &[
      KeyKind::Feeds,
      KeyKind::FeedDetail,
      KeyKind::AllArticles,
      KeyKind::LaterArticles,
      KeyKind::ArticleDetail,
    ],
  ),
];

/// Key kinds listed in the dependency table for a mutation kind.
pub fn dependents(kind: MutationKind) -> &'static [KeyKind] {
  DEPENDENCIES
    .iter()
    .find(|(k, _)| *k == kind)
    .map(|(_, kinds)| *kinds)
    .unwrap_or(&[])
}

impl Mutation {
  pub fn kind(&self) -> MutationKind {
    match self {
      Self::ArticleStatus { .. } => MutationKind::ArticleStatus,
      Self::FolderCreate => MutationKind::FolderCreate,
      Self::FolderUpdate { .. } => MutationKind::FolderUpdate,
      Self::FolderDelete { .. } => MutationKind::FolderDelete,
      Self::FeedCreate => MutationKind::FeedCreate,
      Self::FeedUpdate { .. } => MutationKind::FeedUpdate,
      Self::FeedDelete { .. } => MutationKind::FeedDelete,
    }
  }

  /// Whether the cached view under `key` may be out of date after this mutation.
  ///
  /// Detail views of the mutated entity only match on its own id; every
  /// other listed kind matches regardless of parameters.
  pub fn affects(&self, key: &QueryKey) -> bool {
    if !dependents(self.kind()).contains(&key.kind()) {
      return false;
    }
    match (self, key) {
      (Self::ArticleStatus { id }, QueryKey::Article { id: other }) => id == other,
      (
        Self::FolderUpdate { id } | Self::FolderDelete { id },
        QueryKey::Folder { id: other },
      ) => id == other,
      (Self::FeedUpdate { id } | Self::FeedDelete { id }, QueryKey::Feed { id: other }) => {
        id == other
      }
      _ => true,
    }
  }
}
