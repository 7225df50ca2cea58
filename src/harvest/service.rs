//! Harvest client composing token handling, caching and timer accumulation.

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::accumulator::{Accumulator, MergePass};
use super::api_types::{
  decode, CreatedEntry, DailyResponse, ProjectEnvelope, TaskAssignmentEnvelope, TaskEnvelope,
};
use super::auth::{Authorized, TokenAuthority};
use super::cache::{HarvestQueryKey, PROJECTS_NAMESPACE, TIMERS_NAMESPACE};
use super::client::Transport;
use super::types::{by_name_ignore_case, ProjectModel, RecentProjectTaskMap, TaskModel, TimerRecord};
use crate::cache::{CacheLayer, Expiry, Memoized};
use crate::clock::Clock;
use crate::config::HistoryConfig;
use crate::dates;
use crate::error::{HarvestError, Result};
use crate::options::OptionStore;

const DAILY_PATH: &str = "/daily";

/// Harvest client with transparent caching of multi-day lookups.
///
/// Past business days are fetched concurrently and cached until midnight;
/// today's entries are always fetched live and merged on top.
#[derive(Clone)]
pub struct HarvestService {
  auth: Arc<TokenAuthority>,
  cache: CacheLayer,
  clock: Arc<dyn Clock>,
  history: HistoryConfig,
  tasks: Memoized<(), Vec<TaskModel>>,
  projects: Memoized<(), Vec<ProjectModel>>,
}

impl HarvestService {
  pub fn new(
    transport: Arc<dyn Transport>,
    options: Arc<dyn OptionStore>,
    clock: Arc<dyn Clock>,
    history: HistoryConfig,
  ) -> Self {
    let auth = Arc::new(TokenAuthority::new(transport, options));
    let cache = CacheLayer::new(Arc::clone(&clock));

    let tasks = {
      let auth = Arc::clone(&auth);
      cache.memoize(
        PROJECTS_NAMESPACE,
        Expiry::UNTIL_MIDNIGHT,
        |_: &()| "tasks".to_string(),
        move |()| fetch_tasks(Arc::clone(&auth)),
      )
    };
    let projects = {
      let auth = Arc::clone(&auth);
      cache.memoize(
        PROJECTS_NAMESPACE,
        Expiry::UNTIL_MIDNIGHT,
        |_: &()| "projects".to_string(),
        move |()| fetch_projects(Arc::clone(&auth)),
      )
    };

    Self {
      auth,
      cache,
      clock,
      history,
      tasks,
      projects,
    }
  }

  pub async fn authorize(&self) -> Result<Authorized> {
    self.auth.authorize().await
  }

  pub async fn login(&self, code: &str) -> Result<()> {
    self.auth.login(code).await
  }

  pub fn logout(&self) -> Result<()> {
    self.cache.reset();
    self.auth.logout()
  }

  /// Drop every cached lookup.
  pub fn reset_cache(&self) {
    self.cache.reset();
  }

  /// Drop the cached timer history so the next lookup refetches past days.
  pub fn reset_timers(&self) {
    self.cache.reset_namespace(TIMERS_NAMESPACE);
  }

  /// Timers for today merged onto the recent history, most recent first.
  pub async fn get_timers(&self) -> Result<Vec<TimerRecord>> {
    let previous = self.get_previous_timers().await?;
    let today = self.daily_today().await?;

    let mut acc = Accumulator::seeded(previous);
    acc.merge(&today.day_entries, MergePass::Today)?;
    Ok(acc.into_sorted())
  }

  pub async fn get_timer(&self, id: u64) -> Result<TimerRecord> {
    self
      .get_timers()
      .await?
      .into_iter()
      .find(|timer| timer.id == id)
      .ok_or_else(|| HarvestError::NotFound(format!("Cannot find timer with id: {}", id)))
  }

  /// Identity-only timers seen on the trailing business days.
  pub async fn get_previous_timers(&self) -> Result<Vec<TimerRecord>> {
    let days = self.history.timer_days;
    let this = self.clone();

    self
      .cache
      .fetch(
        &HarvestQueryKey::PreviousTimers { days },
        Expiry::UNTIL_MIDNIGHT,
        move || async move {
          let mut acc = Accumulator::new();
          this
            .for_each_history_day(days, |daily| {
              acc.merge(&daily.day_entries, MergePass::History).map(|_| ())
            })
            .await?;
          Ok::<_, HarvestError>(acc.into_sorted())
        },
      )
      .await
  }

  pub async fn create_timer(&self, project_id: u64, task_id: u64) -> Result<TimerRecord> {
    let path = "/daily/add";
    let body = json!({
      "project_id": project_id,
      "task_id": task_id,
    });

    let created: CreatedEntry = decode(path, self.auth.post(path, Some(body)).await?)?;
    debug!(id = created.id, project_id, task_id, "created timer");

    Ok(TimerRecord {
      id: created.id,
      project_id,
      task_id,
      ..Default::default()
    })
  }

  /// Start or stop the timer of a day entry.
  pub async fn toggle_timer(&self, entry_id: u64) -> Result<Value> {
    let path = format!("/daily/timer/{}", entry_id);
    self.auth.post(&path, None).await
  }

  /// Projects and tasks used on the trailing business days.
  pub async fn get_older_project_task_map(&self) -> Result<RecentProjectTaskMap> {
    let days = self.history.project_days;
    let this = self.clone();

    self
      .cache
      .fetch(
        &HarvestQueryKey::OlderProjectTaskMap { days },
        Expiry::UNTIL_MIDNIGHT,
        move || async move {
          let mut recent = RecentProjectTaskMap::default();
          this
            .for_each_history_day(days, |daily| {
              fold_daily(&mut recent, &daily);
              Ok(())
            })
            .await?;
          Ok::<_, HarvestError>(recent)
        },
      )
      .await
  }

  /// Projects and tasks used today or on the trailing business days.
  pub async fn get_recent_project_task_map(&self) -> Result<RecentProjectTaskMap> {
    let days = self.history.project_days;
    let this = self.clone();

    self
      .cache
      .fetch(
        &HarvestQueryKey::RecentProjectTaskMap { days },
        Expiry::hours(1),
        move || async move {
          let mut recent = this.get_older_project_task_map().await?;
          let today = this.daily_today().await?;
          fold_daily(&mut recent, &today);
          Ok::<_, HarvestError>(recent)
        },
      )
      .await
  }

  /// Active tasks, by name.
  pub async fn get_tasks(&self) -> Result<Vec<TaskModel>> {
    self.tasks.call(()).await
  }

  pub async fn get_task_map(&self) -> Result<HashMap<u64, TaskModel>> {
    let this = self.clone();
    self
      .cache
      .fetch(&HarvestQueryKey::TaskMap, Expiry::UNTIL_MIDNIGHT, move || async move {
        let tasks = this.get_tasks().await?;
        Ok::<HashMap<u64, TaskModel>, HarvestError>(tasks.into_iter().map(|t| (t.id, t)).collect())
      })
      .await
  }

  /// Active, named projects, by name.
  pub async fn get_projects(&self) -> Result<Vec<ProjectModel>> {
    self.projects.call(()).await
  }

  pub async fn get_project_map(&self) -> Result<HashMap<u64, ProjectModel>> {
    let this = self.clone();
    self
      .cache
      .fetch(&HarvestQueryKey::ProjectMap, Expiry::UNTIL_MIDNIGHT, move || async move {
        let projects = this.get_projects().await?;
        Ok::<HashMap<u64, ProjectModel>, HarvestError>(projects.into_iter().map(|p| (p.id, p)).collect())
      })
      .await
  }

  /// Projects assigned or used in the recent window, by name.
  pub async fn get_recent_projects(&self) -> Result<Vec<ProjectModel>> {
    let recent = self.get_recent_project_task_map().await?;
    let projects = self.get_projects().await?;
    Ok(
      projects
        .into_iter()
        .filter(|p| recent.contains_project(p.id))
        .collect(),
    )
  }

  /// Tasks assigned to a project: the default task first, then by name.
  pub async fn get_project_tasks(&self, project_id: u64) -> Result<Vec<TaskModel>> {
    let task_map = self.get_task_map().await?;

    let path = format!("/projects/{}/task_assignments", project_id);
    let assignments: Vec<TaskAssignmentEnvelope> = match self.auth.get(&path).await? {
      Value::Null => Vec::new(),
      body => decode(&path, body)?,
    };

    let tasks = assignments
      .iter()
      .filter_map(|a| task_map.get(&a.task_assignment.task_id).cloned())
      .collect();
    Ok(default_first(tasks))
  }

  async fn daily_today(&self) -> Result<DailyResponse> {
    decode(DAILY_PATH, self.auth.get(DAILY_PATH).await?)
  }

  /// Fetch every trailing business day at once and hand each response to
  /// `apply` in completion order.
  ///
  /// The first failure is returned immediately. Fetches still in flight run
  /// to completion in the background and their results are dropped.
  async fn for_each_history_day<F>(&self, days: usize, mut apply: F) -> Result<()>
  where
    F: FnMut(DailyResponse) -> Result<()>,
  {
    let today = self.clock.now().date_naive();

    let mut pending: FuturesUnordered<_> = dates::most_recent_business_days(today, days, 1)
      .into_iter()
      .map(|date| {
        let auth = Arc::clone(&self.auth);
        let path = dates::daily_path(date);
        tokio::spawn(async move {
          let body = auth.get(&path).await?;
          decode::<DailyResponse>(&path, body)
        })
      })
      .collect();

    debug!(days = pending.len(), "fetching history");
    while let Some(joined) = pending.next().await {
      let daily = joined.map_err(|e| HarvestError::Join(e.to_string()))??;
      apply(daily)?;
    }

    Ok(())
  }
}

async fn fetch_tasks(auth: Arc<TokenAuthority>) -> Result<Vec<TaskModel>> {
  let path = "/tasks";
  let tasks: Vec<TaskEnvelope> = decode(path, auth.get(path).await?)?;

  let mut models: Vec<TaskModel> = tasks
    .into_iter()
    .map(|t| t.task)
    .filter(|t| !t.deactivated)
    .map(|t| TaskModel {
      id: t.id,
      name: t.name,
      is_default: t.is_default,
    })
    .collect();

  models.sort_by(|a, b| by_name_ignore_case(&a.name, &b.name));
  Ok(models)
}

async fn fetch_projects(auth: Arc<TokenAuthority>) -> Result<Vec<ProjectModel>> {
  let path = "/projects";
  let projects: Vec<ProjectEnvelope> = decode(path, auth.get(path).await?)?;

  let mut models: Vec<ProjectModel> = projects
    .into_iter()
    .map(|p| p.project)
    .filter(|p| p.active)
    .filter_map(|p| {
      let name = p.name.filter(|n| !n.is_empty())?;
      Some(ProjectModel {
        id: p.id,
        name,
        client_id: p.client_id,
      })
    })
    .collect();

  models.sort_by(|a, b| by_name_ignore_case(&a.name, &b.name));
  Ok(models)
}

fn fold_daily(recent: &mut RecentProjectTaskMap, daily: &DailyResponse) {
  for entry in &daily.day_entries {
    recent.add_used(entry.project_id, entry.task_id);
  }
  for project in &daily.projects {
    recent.assigned.insert(project.id);
  }
}

fn default_first(mut tasks: Vec<TaskModel>) -> Vec<TaskModel> {
  tasks.sort_by(|a, b| by_name_ignore_case(&a.name, &b.name));
  if let Some(i) = tasks.iter().position(|t| t.is_default) {
    let default = tasks.remove(i);
    tasks.insert(0, default);
  }
  tasks
}
