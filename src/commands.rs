//! Available commands

use clap::Subcommand;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
  /// List articles
  #[command(alias = "a")]
  Articles {
    /// Only articles flagged for later
    #[arg(long)]
    later: bool,
  },
  /// Show one article
  Article { id: String },
  /// Toggle the read flag of an article
  Read { id: String },
  /// Toggle the later flag of an article
  Later { id: String },
  /// Set both flags of an article
  Status {
    id: String,
    #[arg(long, action = clap::ArgAction::Set)]
    read: bool,
    #[arg(long, action = clap::ArgAction::Set)]
    later: bool,
  },
  /// List folders
  #[command(alias = "f")]
  Folders,
  /// Show one folder
  Folder { id: String },
  /// Create a folder
  FolderAdd { name: String },
  /// Rename a folder
  FolderRename { id: String, name: String },
  /// Delete a folder; its feeds are kept without a folder
  FolderRm { id: String },
  /// List feeds
  Feeds {
    /// Only feeds in this folder
    #[arg(long)]
    folder: Option<String>,
  },
  /// Show one feed
  Feed { id: String },
  /// Subscribe to a feed
  FeedAdd {
    name: String,
    url: String,
    #[arg(long, default_value = "rss", value_parser = ["rss", "custom"])]
    plugin: String,
    #[arg(long)]
    folder: Option<String>,
    /// Refresh interval in minutes
    #[arg(long, default_value_t = 60)]
    interval: u32,
  },
  /// Replace a feed's settings
  FeedUpdate {
    id: String,
    name: String,
    url: String,
    #[arg(long, default_value = "rss", value_parser = ["rss", "custom"])]
    plugin: String,
    #[arg(long)]
    folder: Option<String>,
    /// Refresh interval in minutes
    #[arg(long, default_value_t = 60)]
    interval: u32,
  },
  /// Delete a feed and its articles
  FeedRm { id: String },
  /// Keep an article list on screen, redrawing whenever it changes
  #[command(alias = "w")]
  Watch {
    /// Watch the later list instead of all articles
    #[arg(long)]
    later: bool,
    /// Seconds between refetches
    #[arg(long, default_value_t = 30)]
    refresh: u64,
  },
}
