//! Error type shared by the Harvest client, cache and token handling.

use thiserror::Error;

pub type Result<T, E = HarvestError> = std::result::Result<T, E>;

/// Failures surfaced by the Harvest client.
///
/// The type is `Clone` so one failed pending computation in the cache can be
/// handed to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HarvestError {
  /// No authorization code on record.
  #[error("not logged in")]
  NotLoggedIn,

  /// The access token was rejected and could not be renewed.
  #[error("authentication expired: {0}")]
  AuthenticationExpired(String),

  /// Network or HTTP failure, passed through unchanged.
  #[error("request to {path} failed: {message}")]
  Transport {
    path: String,
    status: Option<u16>,
    message: String,
  },

  #[error("{0}")]
  NotFound(String),

  /// A remote field could not be parsed.
  #[error("invalid {field}: {value}")]
  DataQuality { field: String, value: String },

  #[error("option store: {0}")]
  Storage(String),

  #[error("cache entry {0} holds a value of another type")]
  CacheType(String),

  #[error("background fetch failed: {0}")]
  Join(String),
}

impl HarvestError {
  pub fn transport(path: impl Into<String>, status: Option<u16>, message: impl ToString) -> Self {
    Self::Transport {
      path: path.into(),
      status,
      message: message.to_string(),
    }
  }

  pub fn data_quality(field: impl Into<String>, value: impl ToString) -> Self {
    Self::DataQuality {
      field: field.into(),
      value: value.to_string(),
    }
  }
}
