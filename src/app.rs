use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::HarvestError;
use crate::harvest::types::{ProjectModel, TaskModel, TimerRecord};
use crate::harvest::{Authorized, HarvestService, HttpTransport};
use crate::options::{keys, OptionStore, SqliteOptions};
use crate::Command;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const LOGIN_HINT: &str = "Not logged in. Run `hrvst login <code>` with the code from the Harvest authorization page.";

/// Command runner around one Harvest client.
pub struct App {
  service: HarvestService,

  /// Drop cached lookups before running, and before every `watch` tick
  refresh: bool,
}

impl App {
  pub fn new(config: Config, refresh: bool) -> Result<Self> {
    let options = Arc::new(SqliteOptions::open()?);
    seed_credentials(options.as_ref(), &config, Config::get_client_secret())?;

    let transport = Arc::new(HttpTransport::new(&config.harvest.url)?);
    let service = HarvestService::new(transport, options, Arc::new(SystemClock), config.history);

    Ok(Self { service, refresh })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    if self.refresh {
      self.service.reset_cache();
    }

    match &command {
      Command::Login { code } => {
        self.service.login(code).await?;
        println!("Logged in");
        return Ok(());
      }
      Command::Logout => {
        self.service.logout()?;
        println!("Logged out");
        return Ok(());
      }
      _ => {}
    }

    let authorized = match self.service.authorize().await {
      Ok(authorized) => authorized,
      Err(HarvestError::NotLoggedIn) => return Err(eyre!(LOGIN_HINT)),
      Err(e) => return Err(e.into()),
    };

    match command {
      Command::Login { .. } | Command::Logout => {}
      Command::Status => match authorized {
        Authorized::TokenValid => println!("Token valid"),
        Authorized::Refreshed => println!("Token refreshed"),
      },
      Command::Timers => print_timers(&self.service.get_timers().await?),
      Command::Timer { id } => println!("{}", format_timer(&self.service.get_timer(id).await?)),
      Command::Projects { recent } => {
        let projects = if recent {
          self.service.get_recent_projects().await?
        } else {
          self.service.get_projects().await?
        };
        for project in &projects {
          println!("{}", format_project(project));
        }
      }
      Command::Tasks { project } => {
        let tasks = match project {
          Some(project_id) => {
            let projects = self.service.get_project_map().await?;
            match projects.get(&project_id) {
              Some(project) => println!("{}", format_project(project)),
              None => eprintln!("Project {} is not active", project_id),
            }
            self.service.get_project_tasks(project_id).await?
          }
          None => self.service.get_tasks().await?,
        };
        for task in &tasks {
          println!("{}", format_task(task));
        }
      }
      Command::Start {
        project_id,
        task_id,
      } => {
        let timer = self.service.create_timer(project_id, task_id).await?;
        println!("Started timer {}", timer.id);
      }
      Command::Toggle { entry_id } => {
        self.service.toggle_timer(entry_id).await?;
        println!("Toggled timer {}", entry_id);
      }
      Command::Watch { interval } => self.watch(Duration::from_secs(interval.max(1))).await?,
    }

    Ok(())
  }

  /// Print the timer list every `period` until interrupted.
  async fn watch(&self, period: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(period);
    info!(?period, "watching timers");

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        _ = ticker.tick() => {}
      }

      if self.refresh {
        self.service.reset_timers();
      }

      match self.service.get_timers().await {
        Ok(timers) => {
          println!("-- {}", chrono::Local::now().format("%H:%M:%S"));
          print_timers(&timers);
        }
        // Keep watching through transient failures
        Err(e) => {
          warn!(error = %e, "failed to list timers");
          eprintln!("Error: {}", e);
        }
      }
    }

    Ok(())
  }
}

/// Write configured client credentials into the option store.
fn seed_credentials(options: &dyn OptionStore, config: &Config, secret: Option<String>) -> Result<()> {
  let values = [
    (keys::CLIENT_ID, config.harvest.client_id.clone()),
    (keys::REDIRECT_URI, config.harvest.redirect_uri.clone()),
    (keys::CLIENT_SECRET, secret),
  ];

  let mut changed = false;
  for (key, value) in values {
    if let Some(value) = value {
      if options.get(key).as_deref() != Some(value.as_str()) {
        options.set(key, &value);
        changed = true;
      }
    }
  }

  if changed {
    options.save()?;
  }
  Ok(())
}

fn print_timers(timers: &[TimerRecord]) {
  if timers.is_empty() {
    println!("No timers");
  }
  for timer in timers {
    println!("{}", format_timer(timer));
  }
}

fn format_timer(timer: &TimerRecord) -> String {
  let marker = if timer.active { '>' } else { ' ' };
  let id = if timer.id == 0 {
    "-".to_string()
  } else {
    timer.id.to_string()
  };
  format!(
    "{} {:>6.2}  {} / {}  [{}]",
    marker, timer.hours, timer.project_title, timer.task_title, id
  )
}

fn format_project(project: &ProjectModel) -> String {
  format!("{:>10}  {}", project.id, project.name)
}

fn format_task(task: &TaskModel) -> String {
  let marker = if task.is_default { '*' } else { ' ' };
  format!("{:>10} {} {}", task.id, marker, task.name)
}
