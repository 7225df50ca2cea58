//! Cache keys for the Harvest accessors.

use crate::cache::QueryKey;

pub const TIMERS_NAMESPACE: &str = "timers";
pub const PROJECTS_NAMESPACE: &str = "projects";

/// Query keys for cached Harvest lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HarvestQueryKey {
  /// Identity-only timers from past business days
  PreviousTimers { days: usize },
  /// Projects and tasks touched on past business days
  OlderProjectTaskMap { days: usize },
  /// Past business days plus today
  RecentProjectTaskMap { days: usize },
  TaskMap,
  ProjectMap,
}

impl QueryKey for HarvestQueryKey {
  fn namespace(&self) -> &'static str {
    match self {
      Self::PreviousTimers { .. } => TIMERS_NAMESPACE,
      _ => PROJECTS_NAMESPACE,
    }
  }

  fn cache_key(&self) -> String {
    match self {
      Self::PreviousTimers { days } => format!("previous_timers:{}", days),
      Self::OlderProjectTaskMap { days } => format!("older_project_task_map:{}", days),
      Self::RecentProjectTaskMap { days } => format!("recent_project_task_map:{}", days),
      Self::TaskMap => "task_map".to_string(),
      Self::ProjectMap => "project_map".to_string(),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::PreviousTimers { days } => format!("timers from the last {} business days", days),
      Self::OlderProjectTaskMap { days } => {
        format!("projects used in the last {} business days", days)
      }
      Self::RecentProjectTaskMap { days } => {
        format!("projects used today and in the last {} business days", days)
      }
      Self::TaskMap => "task map".to_string(),
      Self::ProjectMap => "project map".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_namespaces() {
    assert_eq!(HarvestQueryKey::PreviousTimers { days: 5 }.namespace(), "timers");
    assert_eq!(HarvestQueryKey::TaskMap.namespace(), "projects");
  }

  #[test]
  fn test_window_is_part_of_key() {
    let five = HarvestQueryKey::PreviousTimers { days: 5 }.cache_key();
    let three = HarvestQueryKey::PreviousTimers { days: 3 }.cache_key();
    assert_ne!(five, three);
  }
}
