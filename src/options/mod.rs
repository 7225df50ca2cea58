//! Durable key-value options: client credentials and OAuth token state.

#[cfg(test)]
mod memory;
mod sqlite;

#[cfg(test)]
pub use memory::MemoryOptions;
pub use sqlite::SqliteOptions;

use crate::error::Result;

/// Option keys written by the client.
pub mod keys {
  pub const CODE: &str = "oauth.code";
  pub const ACCESS_TOKEN: &str = "oauth.access_token";
  pub const REFRESH_TOKEN: &str = "oauth.refresh_token";
  pub const EXPIRES_IN: &str = "oauth.expires_in";
  pub const CLIENT_ID: &str = "harvest.client_id";
  pub const CLIENT_SECRET: &str = "harvest.client_secret";
  pub const REDIRECT_URI: &str = "harvest.redirect_uri";
}

/// Key-value store for options.
///
/// `set` and `remove` only stage a change; `save` makes every staged change
/// durable at once.
pub trait OptionStore: Send + Sync {
  fn get(&self, key: &str) -> Option<String>;

  fn set(&self, key: &str, value: &str);

  fn remove(&self, key: &str);

  /// Flush staged changes to durable storage.
  fn save(&self) -> Result<()>;

  /// Value of `key`, treating an empty string as unset.
  fn get_non_empty(&self, key: &str) -> Option<String> {
    self.get(key).filter(|v| !v.is_empty())
  }
}
