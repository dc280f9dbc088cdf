use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("storage error at {}: {source}", path.display())]
  Storage {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("encode snapshot: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("not found: {0}")]
  NotFound(String),

  // Only the strict decoder returns this.
  #[error("malformed cursor: {0}")]
  Cursor(String),
}

impl FeedError {
  pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    FeedError::Storage {
      path: path.into(),
      source,
    }
  }

  pub fn is_client_error(&self) -> bool {
    matches!(self, FeedError::Config(_) | FeedError::NotFound(_))
  }
}

pub type Result<T> = std::result::Result<T, FeedError>;
