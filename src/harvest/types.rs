use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of a timer: one project/task pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
  pub project_id: u64,
  pub task_id: u64,
}

impl fmt::Display for TimerKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}||{}", self.project_id, self.task_id)
  }
}

/// Accumulated time for one project/task pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerRecord {
  /// Remote entry id, 0 if never persisted
  pub id: u64,
  pub project_id: u64,
  pub project_title: String,
  pub task_id: u64,
  pub task_title: String,
  pub hours: f64,
  /// A timer is running for this entry
  pub active: bool,
  /// Epoch milliseconds, 0 if unknown
  pub updated_at: i64,
}

impl TimerRecord {
  pub fn key(&self) -> TimerKey {
    TimerKey {
      project_id: self.project_id,
      task_id: self.task_id,
    }
  }
}

/// Task as listed by the account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskModel {
  pub id: u64,
  pub name: String,
  pub is_default: bool,
}

/// Active project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectModel {
  pub id: u64,
  pub name: String,
  pub client_id: Option<u64>,
}

/// Projects and tasks touched in a recent window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentProjectTaskMap {
  /// Project id -> task ids with entries
  pub used: BTreeMap<u64, BTreeSet<u64>>,
  /// Project ids assigned to the user
  pub assigned: BTreeSet<u64>,
}

impl RecentProjectTaskMap {
  pub fn add_used(&mut self, project_id: u64, task_id: u64) {
    self.used.entry(project_id).or_default().insert(task_id);
  }

  pub fn contains_project(&self, project_id: u64) -> bool {
    self.assigned.contains(&project_id) || self.used.contains_key(&project_id)
  }
}

/// Order by name, ignoring case.
pub(crate) fn by_name_ignore_case(a: &str, b: &str) -> std::cmp::Ordering {
  a.to_lowercase().cmp(&b.to_lowercase())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_timer_key_display() {
    let key = TimerKey {
      project_id: 12,
      task_id: 3,
    };
    assert_eq!(key.to_string(), "12||3");
  }

  #[test]
  fn test_recent_map_contains_used_or_assigned() {
    let mut recent = RecentProjectTaskMap::default();
    recent.add_used(1, 10);
    recent.add_used(1, 11);
    recent.assigned.insert(2);

    assert_eq!(recent.used[&1].len(), 2);
    assert!(recent.contains_project(1));
    assert!(recent.contains_project(2));
    assert!(!recent.contains_project(3));
  }
}
