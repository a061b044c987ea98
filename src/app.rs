use crate::api::cache::{QueryData, QueryKey};
use crate::api::types::{Article, ArticleStatus, Feed, FeedInput, Folder, PluginType};
use crate::api::{CachedClient, HttpStore, QueryCache, RemoteStore};
use crate::commands::Command;
use crate::config::Config;
use crate::error::SyncResult;
use crate::query::{QueryState, ViewQuery};
use crate::sync::Synchronizer;
use color_eyre::{eyre::eyre, Result};
use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// How often a watching view drains its pending entry changes.
const WATCH_TICK: Duration = Duration::from_millis(100);

/// Application wiring.
///
/// The cache is created once here and handed to the cached client; the
/// synchronizer shares that same instance.
pub struct App {
  client: CachedClient,
  sync: Synchronizer,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let store = HttpStore::new(&config.api)?;
    debug!(base_url = %config.api.base_url, "using HTTP store");
    Ok(Self::with_store(config, Arc::new(store)))
  }

  pub fn with_store(config: &Config, store: Arc<dyn RemoteStore>) -> Self {
    let cache = QueryCache::new(config.cache.capacity);
    let client = CachedClient::new(store, cache);
    let sync = Synchronizer::new(client.clone());
    Self { client, sync }
  }

  /// Run one command, printing its output. Failures are reported to the
  /// caller as an error.
  pub async fn run(&self, command: Command) -> Result<()> {
    match self.execute(command).await {
      Ok(output) => {
        print!("{}", output);
        Ok(())
      }
      Err(e) => {
        error!(error = %e, "command failed");
        Err(eyre!(e))
      }
    }
  }

  /// Run one command and render its result as text.
  pub async fn execute(&self, command: Command) -> SyncResult<String> {
    let out = match command {
      Command::Articles { later } => {
        let articles = if later {
          self.client.later_articles().await?
        } else {
          self.client.articles().await?
        };
        render_articles(&articles)
      }
      Command::Article { id } => render_article(&self.client.article(&id).await?),
      Command::Read { id } => render_status(&self.sync.toggle_read(&id).await?),
      Command::Later { id } => render_status(&self.sync.toggle_later(&id).await?),
      Command::Status { id, read, later } => {
        render_status(&self.sync.update_article_status(&id, read, later).await?)
      }
      Command::Folders => render_folders(&self.client.folders().await?),
      Command::Folder { id } => render_folders(&[self.client.folder(&id).await?]),
      Command::FolderAdd { name } => render_folders(&[self.sync.create_folder(&name).await?]),
      Command::FolderRename { id, name } => {
        render_folders(&[self.sync.update_folder(&id, &name).await?])
      }
      Command::FolderRm { id } => {
        self.sync.delete_folder(&id).await?;
        format!("deleted folder {}\n", id)
      }
      Command::Feeds { folder } => render_feeds(&self.client.feeds(folder.as_deref()).await?),
      Command::Feed { id } => render_feeds(&[self.client.feed(&id).await?]),
      Command::FeedAdd {
        name,
        url,
        plugin,
        folder,
        interval,
      } => {
        let input = feed_input(name, url, &plugin, folder, interval);
        render_feeds(&[self.sync.create_feed(&input).await?])
      }
      Command::FeedUpdate {
        id,
        name,
        url,
        plugin,
        folder,
        interval,
      } => {
        let input = feed_input(name, url, &plugin, folder, interval);
        render_feeds(&[self.sync.update_feed(&id, &input).await?])
      }
      Command::FeedRm { id } => {
        self.sync.delete_feed(&id).await?;
        format!("deleted feed {}\n", id)
      }
      Command::Watch { later, refresh } => {
        let key = if later {
          QueryKey::LaterArticles
        } else {
          QueryKey::AllArticles
        };
        let shutdown = async {
          let _ = tokio::signal::ctrl_c().await;
        };
        self
          .watch(key, Duration::from_secs(refresh.max(1)), shutdown, |frame| {
            print!("{}", frame)
          })
          .await;
        String::new()
      }
    };
    Ok(out)
  }

  /// Keep a view bound to `key` until `shutdown` resolves.
  ///
  /// Every tick drains the view and hands `emit` a new frame when the
  /// rendering changed. Mutations made elsewhere through the shared cache
  /// show up without a manual refresh; `refresh` additionally forces a
  /// refetch on a fixed period.
  pub async fn watch<F>(&self, key: QueryKey, refresh: Duration, shutdown: F, mut emit: impl FnMut(String))
  where
    F: Future<Output = ()>,
  {
    let mut view = self.client.watch(key);
    view.fetch();
    debug!(key = %view.key(), "watching");

    let mut tick = time::interval(WATCH_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut refetch = time::interval_at(Instant::now() + refresh, refresh);
    tokio::pin!(shutdown);

    let mut last = String::new();
    loop {
      tokio::select! {
        _ = &mut shutdown => break,
        _ = refetch.tick() => view.refetch(),
        _ = tick.tick() => {}
      }
      view.poll();
      let frame = render_view(&view);
      if frame != last {
        emit(frame.clone());
        last = frame;
      }
    }
  }
}

fn feed_input(name: String, url: String, plugin: &str, folder: Option<String>, interval: u32) -> FeedInput {
  FeedInput {
    name,
    source_url: url,
    plugin_type: parse_plugin(plugin),
    folder_id: folder,
    update_interval: interval,
  }
}

fn parse_plugin(name: &str) -> PluginType {
  match name {
    "custom" => PluginType::Custom,
    _ => PluginType::Rss,
  }
}

fn flags(status: ArticleStatus) -> String {
  format!(
    "[{}{}]",
    if status.is_read { 'R' } else { '-' },
    if status.is_later { 'L' } else { '-' }
  )
}

fn render_articles(articles: &[Article]) -> String {
  if articles.is_empty() {
    return "no articles\n".to_string();
  }
  let mut out = String::new();
  for a in articles {
    let _ = writeln!(out, "{} {:>6}  {}", flags(a.status()), a.id, a.title);
  }
  out
}

fn render_article(a: &Article) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{} {}", flags(a.status()), a.title);
  let _ = writeln!(out, "id:        {}", a.id);
  let _ = writeln!(out, "feed:      {}", a.feed_id);
  let _ = writeln!(out, "url:       {}", a.url);
  if let Some(published) = a.published_at {
    let _ = writeln!(out, "published: {}", published.format("%Y-%m-%d %H:%M"));
  }
  if let Some(content) = a.content.as_deref().filter(|c| !c.is_empty()) {
    let _ = writeln!(out, "\n{}", content);
  }
  out
}

fn render_view(view: &ViewQuery<QueryKey, QueryData>) -> String {
  match view.state() {
    QueryState::Idle => String::new(),
    // Keep showing the previous value while a refresh is outstanding
    QueryState::Loading => view
      .data()
      .map(render_data)
      .unwrap_or_else(|| "loading...\n".to_string()),
    QueryState::Success(data) => render_data(data),
    QueryState::Error(e) => format!(
      "{}error: {}\n",
      view.data().map(render_data).unwrap_or_default(),
      e
    ),
  }
}

fn render_data(data: &QueryData) -> String {
  match data {
    QueryData::Articles(articles) => render_articles(articles),
    QueryData::Article(article) => render_article(article),
    QueryData::Folders(folders) => render_folders(folders),
    QueryData::Folder(folder) => render_folders(std::slice::from_ref(folder)),
    QueryData::Feeds(feeds) => render_feeds(feeds),
    QueryData::Feed(feed) => render_feeds(std::slice::from_ref(feed)),
  }
}

fn render_status(a: &Article) -> String {
  format!("{} {}  {}\n", flags(a.status()), a.id, a.title)
}

fn render_folders(folders: &[Folder]) -> String {
  if folders.is_empty() {
    return "no folders\n".to_string();
  }
  let mut out = String::new();
  for f in folders {
    let _ = writeln!(out, "{:>6}  {}", f.id, f.name);
  }
  out
}

fn render_feeds(feeds: &[Feed]) -> String {
  if feeds.is_empty() {
    return "no feeds\n".to_string();
  }
  let mut out = String::new();
  for f in feeds {
    let _ = writeln!(
      out,
      "{:>6}  {}  {}  every {}m{}",
      f.id,
      f.name,
      f.source_url,
      f.interval().as_secs() / 60,
      f.folder_id
        .as_deref()
        .map(|id| format!("  (folder {})", id))
        .unwrap_or_default()
    );
  }
  out
}
