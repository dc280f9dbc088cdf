pub mod config;
pub mod console;
pub mod cursor;
pub mod error;
pub mod feed_api;
pub mod generator;
pub mod logging;
pub mod paths;
pub mod reaper;
pub mod scheduler;
pub mod snapshot_store;
pub mod types;

use std::sync::mpsc;

pub fn run_console(args: &[String]) -> anyhow::Result<()> {
  let base = paths::base_dir()?;
  let config_path = paths::config_path(&base);
  let config::Loaded { config: cfg, warnings } = config::load_or_create_default(&config_path)?;

  logging::init(&paths::logs_dir(&base), &cfg.logging)?;
  for warning in &warnings {
    tracing::warn!(config = %config_path.display(), "{warning}");
  }

  let data_dir = cfg.data_dir(&base);
  let svc = feed_api::FeedService::new(&cfg, data_dir.clone());

  match console::run_console_command(&cfg, &svc, args)? {
    console::ConsoleAction::ExitOk => return Ok(()),
    console::ConsoleAction::RunScheduler => {}
  }

  tracing::info!(data_dir = %data_dir.display(), "starting X-GEN TI feed generator");
  let (stop_tx, stop_rx) = mpsc::channel::<()>();
  ctrlc::set_handler(move || {
    let _ = stop_tx.send(());
  })?;

  let settings = scheduler::SchedulerSettings::from_config(&cfg, data_dir);
  let handle = scheduler::Scheduler::new(settings).spawn()?;

  let _ = stop_rx.recv();
  tracing::info!(
    succeeded = handle.stats().succeeded(),
    failed = handle.stats().failed(),
    "shutdown requested"
  );
  handle.stop();
  tracing::info!("feed generator stopped");
  Ok(())
}
