//! Error taxonomy shared by the remote store, the fetch cache and the synchronizer.

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Failures surfaced by remote store calls.
///
/// Cloneable so one fetch outcome can be handed to every coalesced waiter
/// and kept on the cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
  /// Transport unreachable or timed out
  #[error("network error: {0}")]
  Network(String),

  /// Input rejected by the store (e.g. empty folder name)
  #[error("validation failed: {0}")]
  Validation(String),

  /// Referenced id does not exist
  #[error("not found: {0}")]
  NotFound(String),

  /// Any other non-success outcome
  #[error("unexpected response{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
  ConflictOrUnknown {
    status: Option<u16>,
    message: String,
  },
}

impl SyncError {
  pub fn unknown(message: impl Into<String>) -> Self {
    Self::ConflictOrUnknown {
      status: None,
      message: message.into(),
    }
  }

  /// Map a non-success HTTP status onto the taxonomy.
  pub fn from_status(status: u16, body: &str) -> Self {
    let message = if body.is_empty() {
      format!("status {status}")
    } else {
      body.to_string()
    };
    match status {
      400 | 422 => Self::Validation(message),
      404 => Self::NotFound(message),
      _ => Self::ConflictOrUnknown {
        status: Some(status),
        message,
      },
    }
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      return Self::unknown(format!("failed to decode response: {err}"));
    }
    if let Some(status) = err.status() {
      return Self::from_status(status.as_u16(), &err.to_string());
    }
    Self::Network(err.to_string())
  }
}
