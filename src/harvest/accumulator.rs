//! Merge engine folding day entries into one timer per project/task pair.

use chrono::DateTime;
use serde_json::Value;
use std::collections::HashMap;

use super::api_types::DayEntry;
use super::types::{TimerKey, TimerRecord};
use crate::error::{HarvestError, Result};

/// Added to the timestamp of an entry with a running timer, so it sorts ahead
/// of a stopped entry updated at the same instant.
pub const RUNNING_TIMER_BIAS_MS: i64 = 60_000;

/// Which feed a batch of entries comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePass {
  /// A past day: establishes identity only, contributes no totals
  History,
  /// The live feed for today
  Today,
}

struct ParsedEntry<'a> {
  key: TimerKey,
  entry: &'a DayEntry,
  hours: f64,
  updated_at: i64,
}

/// Deduplicating set of timer records, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
  records: Vec<TimerRecord>,
  index: HashMap<TimerKey, usize>,
}

impl Accumulator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Start from a previously accumulated list. Later duplicates of a key are dropped.
  pub fn seeded(previous: impl IntoIterator<Item = TimerRecord>) -> Self {
    let mut acc = Self::new();
    for record in previous {
      let key = record.key();
      if !acc.index.contains_key(&key) {
        acc.index.insert(key, acc.records.len());
        acc.records.push(record);
      }
    }
    acc
  }

  /// Fold one batch of entries into the set.
  ///
  /// The whole batch is validated first: a bad hours or updated_at value
  /// fails the batch and leaves the set untouched.
  pub fn merge(&mut self, entries: &[DayEntry], pass: MergePass) -> Result<&[TimerRecord]> {
    let parsed = entries
      .iter()
      .map(parse_entry)
      .collect::<Result<Vec<_>>>()?;

    for p in parsed {
      match (self.index.get(&p.key).copied(), pass) {
        (None, MergePass::History) => self.insert(TimerRecord {
          id: 0,
          project_id: p.key.project_id,
          project_title: p.entry.project.clone(),
          task_id: p.key.task_id,
          task_title: p.entry.task.clone(),
          hours: 0.0,
          active: false,
          updated_at: 0,
        }),
        (None, MergePass::Today) => self.insert(TimerRecord {
          id: p.entry.id.unwrap_or(0),
          project_id: p.key.project_id,
          project_title: p.entry.project.clone(),
          task_id: p.key.task_id,
          task_title: p.entry.task.clone(),
          hours: p.hours,
          active: p.entry.has_running_timer(),
          updated_at: p.updated_at,
        }),
        (Some(i), MergePass::Today) => {
          let record = &mut self.records[i];
          record.hours += p.hours;

          // A running timer keeps its identity
          if !record.active && (record.updated_at == 0 || p.updated_at > record.updated_at) {
            record.id = p.entry.id.unwrap_or(0);
            record.active = p.entry.has_running_timer();
            record.updated_at = p.updated_at;
          }
        }
        // First occurrence wins
        (Some(_), MergePass::History) => {}
      }
    }

    Ok(self.records.as_slice())
  }

  fn insert(&mut self, record: TimerRecord) {
    self.index.insert(record.key(), self.records.len());
    self.records.push(record);
  }

  /// Records ordered by most recent update; ties keep first-seen order.
  pub fn into_sorted(self) -> Vec<TimerRecord> {
    let mut records = self.records;
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    records
  }
}

#[cfg(test)]
impl Accumulator {
  fn get(&self, key: &TimerKey) -> Option<&TimerRecord> {
    self.index.get(key).map(|&i| &self.records[i])
  }

  fn records(&self) -> &[TimerRecord] {
    &self.records
  }

  fn len(&self) -> usize {
    self.records.len()
  }

  fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  fn sorted(&self) -> Vec<TimerRecord> {
    self.clone().into_sorted()
  }
}

fn parse_entry(entry: &DayEntry) -> Result<ParsedEntry<'_>> {
  let hours = parse_hours(&entry.hours)?;
  let mut updated_at = DateTime::parse_from_rfc3339(&entry.updated_at)
    .map_err(|_| HarvestError::data_quality("updated_at", &entry.updated_at))?
    .timestamp_millis();
  if entry.has_running_timer() {
    updated_at += RUNNING_TIMER_BIAS_MS;
  }

  Ok(ParsedEntry {
    key: TimerKey {
      project_id: entry.project_id,
      task_id: entry.task_id,
    },
    entry,
    hours,
    updated_at,
  })
}

fn parse_hours(value: &Value) -> Result<f64> {
  let hours = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  };

  hours
    .filter(|h| h.is_finite())
    .ok_or_else(|| HarvestError::data_quality("hours", value))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const T0: &str = "2026-10-14T09:00:00Z";
  const T0_MS: i64 = 1_791_968_400_000;

  fn entry(project: u64, task: u64, hours: Value, updated_at: &str) -> DayEntry {
    DayEntry {
      id: None,
      project_id: project,
      task_id: task,
      project: format!("Project {}", project),
      task: format!("Task {}", task),
      hours,
      updated_at: updated_at.to_string(),
      timer_started_at: None,
    }
  }

  fn running(mut e: DayEntry, id: u64) -> DayEntry {
    e.id = Some(id);
    e.timer_started_at = Some("2026-10-14T08:00:00Z".to_string());
    e
  }

  #[test]
  fn test_timestamp_constant() {
    let parsed = DateTime::parse_from_rfc3339(T0).unwrap().timestamp_millis();
    assert_eq!(parsed, T0_MS);
  }

  #[test]
  fn test_history_establishes_identity_only() {
    let mut acc = Accumulator::new();
    let batch = vec![running(entry(1, 1, json!("3.0"), T0), 99)];

    let records = acc.merge(&batch, MergePass::History).unwrap();

    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!((r.id, r.hours, r.active, r.updated_at), (0, 0.0, false, 0));
    assert_eq!(r.project_title, "Project 1");
    assert_eq!(r.task_title, "Task 1");
  }

  #[test]
  fn test_history_merge_is_idempotent() {
    let batch = vec![
      entry(1, 1, json!("1.0"), T0),
      entry(1, 2, json!(2.5), T0),
      entry(1, 1, json!("4.0"), T0),
    ];

    let mut once = Accumulator::new();
    once.merge(&batch, MergePass::History).unwrap();

    let mut twice = Accumulator::new();
    twice.merge(&batch, MergePass::History).unwrap();
    twice.merge(&batch, MergePass::History).unwrap();

    assert_eq!(once.records(), twice.records());
    assert_eq!(twice.len(), 2);
    assert!(twice.records().iter().all(|r| r.hours == 0.0));
  }

  #[test]
  fn test_history_first_occurrence_wins() {
    let mut acc = Accumulator::new();
    let mut first = entry(1, 1, json!("1"), T0);
    first.task = "Original".to_string();
    let mut second = entry(1, 1, json!("1"), T0);
    second.task = "Renamed".to_string();

    acc.merge(&[first], MergePass::History).unwrap();
    acc.merge(&[second], MergePass::History).unwrap();

    assert_eq!(acc.records()[0].task_title, "Original");
  }

  #[test]
  fn test_today_hours_accumulate() {
    let mut acc = Accumulator::new();
    let batch = vec![
      entry(1, 1, json!("1.5"), T0),
      entry(1, 1, json!("2.0"), "2026-10-14T10:00:00Z"),
    ];

    let records = acc.merge(&batch, MergePass::Today).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].hours, 3.5);
  }

  #[test]
  fn test_today_creates_full_record() {
    let mut acc = Accumulator::new();
    let batch = vec![running(entry(4, 5, json!(0.75), T0), 77)];

    acc.merge(&batch, MergePass::Today).unwrap();

    let r = acc
      .get(&TimerKey {
        project_id: 4,
        task_id: 5,
      })
      .unwrap();
    assert_eq!(r.id, 77);
    assert!(r.active);
    assert_eq!(r.hours, 0.75);
    assert_eq!(r.updated_at, T0_MS + RUNNING_TIMER_BIAS_MS);
  }

  #[test]
  fn test_active_entry_keeps_identity() {
    let mut acc = Accumulator::new();
    let active = running(entry(1, 1, json!("1.0"), T0), 10);
    let mut later = entry(1, 1, json!("0.5"), "2026-10-14T09:05:00Z");
    later.id = Some(11);

    acc.merge(&[active, later], MergePass::Today).unwrap();

    let r = &acc.records()[0];
    assert_eq!(r.id, 10);
    assert!(r.active);
    assert_eq!(r.updated_at, T0_MS + RUNNING_TIMER_BIAS_MS);
    assert_eq!(r.hours, 1.5);
  }

  #[test]
  fn test_newer_inactive_entry_replaces_stopped_one() {
    let mut acc = Accumulator::new();
    let mut older = entry(1, 1, json!("1.0"), T0);
    older.id = Some(1);
    let mut newer = entry(1, 1, json!("1.0"), "2026-10-14T11:00:00Z");
    newer.id = Some(2);

    acc.merge(&[older, newer], MergePass::Today).unwrap();

    assert_eq!(acc.records()[0].id, 2);
  }

  #[test]
  fn test_today_fills_in_history_record() {
    let mut acc = Accumulator::new();
    acc
      .merge(&[entry(1, 1, json!("8"), T0)], MergePass::History)
      .unwrap();

    let mut today = acc.clone();
    let mut live = entry(1, 1, json!("0.25"), "2026-10-15T09:00:00Z");
    live.id = Some(5);
    today.merge(&[live], MergePass::Today).unwrap();

    let r = &today.records()[0];
    assert_eq!((r.id, r.hours), (5, 0.25));
    assert!(r.updated_at > 0);
  }

  #[test]
  fn test_running_bias_sorts_active_first() {
    let mut acc = Accumulator::new();
    let stopped = entry(1, 1, json!("1"), T0);
    let active = running(entry(2, 2, json!("1"), T0), 3);

    acc.merge(&[stopped, active], MergePass::Today).unwrap();
    let sorted = acc.into_sorted();

    assert_eq!(sorted[0].project_id, 2);
    assert!(sorted[0].updated_at > sorted[1].updated_at);
  }

  #[test]
  fn test_sorted_is_descending_and_stable() {
    let mut acc = Accumulator::new();
    acc
      .merge(
        &[
          entry(1, 1, json!("1"), T0),
          entry(2, 2, json!("1"), "2026-10-14T12:00:00Z"),
          entry(3, 3, json!("1"), T0),
        ],
        MergePass::Today,
      )
      .unwrap();

    let order: Vec<u64> = acc.sorted().iter().map(|r| r.project_id).collect();
    assert_eq!(order, vec![2, 1, 3]);
  }

  #[test]
  fn test_bad_hours_abort_batch() {
    let mut acc = Accumulator::new();
    acc
      .merge(&[entry(1, 1, json!("1"), T0)], MergePass::Today)
      .unwrap();

    let batch = vec![entry(1, 1, json!("2"), T0), entry(2, 2, json!("n/a"), T0)];
    let err = acc.merge(&batch, MergePass::Today).unwrap_err();

    assert!(matches!(err, HarvestError::DataQuality { ref field, .. } if field == "hours"));
    assert_eq!(acc.len(), 1);
    assert_eq!(acc.records()[0].hours, 1.0);
  }

  #[test]
  fn test_missing_hours_abort_batch() {
    let mut acc = Accumulator::new();
    let err = acc
      .merge(&[entry(1, 1, Value::Null, T0)], MergePass::History)
      .unwrap_err();
    assert!(matches!(err, HarvestError::DataQuality { .. }));
    assert!(acc.is_empty());
  }

  #[test]
  fn test_bad_timestamp_aborts_batch() {
    let mut acc = Accumulator::new();
    let err = acc
      .merge(&[entry(1, 1, json!("1"), "yesterday")], MergePass::Today)
      .unwrap_err();
    assert!(matches!(err, HarvestError::DataQuality { ref field, .. } if field == "updated_at"));
  }

  #[test]
  fn test_seeded_keeps_first_of_duplicates() {
    let a = TimerRecord {
      project_id: 1,
      task_id: 1,
      task_title: "first".to_string(),
      ..Default::default()
    };
    let b = TimerRecord {
      task_title: "second".to_string(),
      ..a.clone()
    };

    let acc = Accumulator::seeded(vec![a, b]);
    assert_eq!(acc.len(), 1);
    assert_eq!(acc.records()[0].task_title, "first");
  }
}
