//! Serde-deserializable types matching Harvest API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{HarvestError, Result};

/// Decode a JSON payload returned for `path` into a typed response.
pub fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
  serde_json::from_value(value).map_err(|e| HarvestError::data_quality(path, e))
}

/// Ids arrive as numbers or as numeric strings depending on the endpoint.
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Number(u64),
    Text(String),
  }

  match RawId::deserialize(deserializer)? {
    RawId::Number(n) => Ok(n),
    RawId::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
  }
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  struct Id(#[serde(deserialize_with = "deserialize_id")] u64);

  Ok(Option::<Id>::deserialize(deserializer)?.map(|Id(id)| id))
}

// ============================================================================
// Daily endpoint response
// ============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DailyResponse {
  #[serde(default)]
  pub day_entries: Vec<DayEntry>,
  #[serde(default)]
  pub projects: Vec<DailyProject>,
}

/// One logged entry for a project/task on a single day.
#[derive(Debug, Clone, Deserialize)]
pub struct DayEntry {
  #[serde(default, deserialize_with = "deserialize_optional_id")]
  pub id: Option<u64>,
  #[serde(deserialize_with = "deserialize_id")]
  pub project_id: u64,
  #[serde(deserialize_with = "deserialize_id")]
  pub task_id: u64,
  #[serde(default)]
  pub project: String,
  #[serde(default)]
  pub task: String,
  /// Number or numeric string; validated when merged
  #[serde(default)]
  pub hours: Value,
  #[serde(default)]
  pub updated_at: String,
  #[serde(default)]
  pub timer_started_at: Option<String>,
}

impl DayEntry {
  pub fn has_running_timer(&self) -> bool {
    self.timer_started_at.is_some()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyProject {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: u64,
}

// ============================================================================
// Tasks and projects
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TaskEnvelope {
  pub task: ApiTask,
}

#[derive(Debug, Deserialize)]
pub struct ApiTask {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub is_default: bool,
  #[serde(default)]
  pub deactivated: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProjectEnvelope {
  pub project: ApiProject,
}

#[derive(Debug, Deserialize)]
pub struct ApiProject {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: u64,
  pub name: Option<String>,
  #[serde(default, deserialize_with = "deserialize_optional_id")]
  pub client_id: Option<u64>,
  #[serde(default)]
  pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct TaskAssignmentEnvelope {
  pub task_assignment: ApiTaskAssignment,
}

#[derive(Debug, Deserialize)]
pub struct ApiTaskAssignment {
  #[serde(deserialize_with = "deserialize_id")]
  pub task_id: u64,
}

// ============================================================================
// Timer mutations and OAuth
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreatedEntry {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
  pub access_token: String,
  pub refresh_token: Option<String>,
  #[serde(default)]
  pub expires_in: Option<i64>,
}
