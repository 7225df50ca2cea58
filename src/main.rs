mod app;
mod cache;
mod clock;
mod config;
mod dates;
mod error;
mod harvest;
mod options;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hrvst")]
#[command(about = "Harvest timers from the terminal")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hrvst/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Drop cached lookups before running (with `watch`, before every tick)
  #[arg(short, long, global = true)]
  refresh: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Exchange an authorization code for tokens
  Login { code: String },
  /// Forget the stored code and tokens
  Logout,
  /// Check that the stored token is usable
  Status,
  /// List today's timers on top of the recent history
  Timers,
  /// Show one timer by entry id
  Timer { id: u64 },
  /// List active projects
  Projects {
    /// Only projects used or assigned recently
    #[arg(long)]
    recent: bool,
  },
  /// List active tasks
  Tasks {
    /// Only tasks assigned to this project
    #[arg(short, long)]
    project: Option<u64>,
  },
  /// Start a new timer
  Start { project_id: u64, task_id: u64 },
  /// Start or stop the timer of a day entry
  Toggle { entry_id: u64 },
  /// Re-list timers periodically
  Watch {
    /// Seconds between refreshes
    #[arg(short, long, default_value_t = 60)]
    interval: u64,
  },
}

/// Send logs to a daily rolling file so stdout stays free for command output.
fn init_logging() -> Option<WorkerGuard> {
  let dir = dirs::data_dir()?.join("hrvst").join("logs");
  std::fs::create_dir_all(&dir).ok()?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "hrvst.log"));
  let filter = EnvFilter::try_from_env("HRVST_LOG").unwrap_or_else(|_| EnvFilter::new("hrvst=info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .init();

  Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let app = app::App::new(config, args.refresh)?;
  app.run(args.command).await
}
