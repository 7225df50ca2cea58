use color_eyre::{
  eyre::{eyre, WrapErr},
  Result,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_HARVEST_URL: &str = "https://api.harvestapp.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub harvest: HarvestConfig,
  #[serde(default)]
  pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
  #[serde(default = "default_url")]
  pub url: String,
  /// OAuth client id of the registered application
  pub client_id: Option<String>,
  /// Redirect URI registered with the application
  pub redirect_uri: Option<String>,
}

fn default_url() -> String {
  DEFAULT_HARVEST_URL.to_string()
}

/// Lookback windows, in business days before today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
  /// Days scanned for timers shown alongside today's
  #[serde(default = "default_timer_days")]
  pub timer_days: usize,
  /// Days scanned for recently used projects and tasks
  #[serde(default = "default_project_days")]
  pub project_days: usize,
}

fn default_timer_days() -> usize {
  5
}

fn default_project_days() -> usize {
  3
}

impl Default for HistoryConfig {
  fn default() -> Self {
    Self {
      timer_days: default_timer_days(),
      project_days: default_project_days(),
    }
  }
}

impl Config {
  /// Read the configuration from `explicit_path`, or from the first search
  /// path that exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if !p.exists() => return Err(eyre!("Config file not found: {}", p.display())),
      Some(p) => p.to_path_buf(),
      None => Self::search_paths()
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| {
          eyre!(
            "No configuration file found. Create one at ~/.config/hrvst/config.yaml \
             with at least a `harvest:` section holding client_id and redirect_uri."
          )
        })?,
    };

    std::fs::read_to_string(&path)
      .map_err(|e| eyre!(e))
      .and_then(|contents| Self::parse(&contents).map_err(|e| eyre!(e)))
      .wrap_err_with(|| format!("Cannot load config from {}", path.display()))
  }

  /// `./hrvst.yaml`, then `$XDG_CONFIG_HOME/hrvst/config.yaml`.
  fn search_paths() -> Vec<PathBuf> {
    let user = dirs::config_dir().map(|dir| dir.join("hrvst").join("config.yaml"));
    std::iter::once(PathBuf::from("hrvst.yaml")).chain(user).collect()
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the OAuth client secret from environment variables.
  ///
  /// Checks HRVST_CLIENT_SECRET first, then HARVEST_CLIENT_SECRET as fallback.
  pub fn get_client_secret() -> Option<String> {
    std::env::var("HRVST_CLIENT_SECRET")
      .or_else(|_| std::env::var("HARVEST_CLIENT_SECRET"))
      .ok()
  }
}
