use crate::config::Config;
use crate::error::Result;
use crate::generator;
use crate::snapshot_store;
use crate::types::now_rfc3339;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
  pub data_dir: PathBuf,
  pub min_count: i64,
  pub max_count: i64,
  pub interval: Duration,
  pub backoff: Duration,
  pub generate_on_start: bool,
}

impl SchedulerSettings {
  pub fn from_config(cfg: &Config, data_dir: PathBuf) -> Self {
    Self {
      data_dir,
      min_count: cfg.generator.min_count,
      max_count: cfg.generator.max_count,
      interval: cfg.scheduler.interval(),
      backoff: cfg.scheduler.backoff(),
      generate_on_start: cfg.scheduler.generate_on_start,
    }
  }
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
  pub path: PathBuf,
  pub file_name: String,
  pub count: usize,
  pub timestamp: String,
}

pub fn run_cycle(data_dir: &Path, min_count: i64, max_count: i64) -> Result<CycleOutcome> {
  let bundle = generator::generate(min_count, max_count)?;
  let path = snapshot_store::write(data_dir, &bundle)?;
  let file_name = path
    .file_name()
    .and_then(|s| s.to_str())
    .unwrap_or_default()
    .to_string();
  Ok(CycleOutcome {
    path,
    file_name,
    count: bundle.stixobjects.len(),
    timestamp: now_rfc3339(),
  })
}

#[derive(Debug, Default)]
pub struct CycleStats {
  succeeded: AtomicU64,
  failed: AtomicU64,
}

impl CycleStats {
  pub fn succeeded(&self) -> u64 {
    self.succeeded.load(Ordering::Relaxed)
  }

  pub fn failed(&self) -> u64 {
    self.failed.load(Ordering::Relaxed)
  }
}

pub struct Scheduler {
  settings: SchedulerSettings,
}

impl Scheduler {
  pub fn new(settings: SchedulerSettings) -> Self {
    Self { settings }
  }

  pub fn spawn(self) -> anyhow::Result<SchedulerHandle> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let stats = Arc::new(CycleStats::default());
    let thread_stats = Arc::clone(&stats);
    let thread = thread::Builder::new()
      .name("ti-scheduler".to_string())
      .spawn(move || self.run(stop_rx, &thread_stats))?;
    Ok(SchedulerHandle {
      stop_tx,
      thread: Some(thread),
      stats,
    })
  }

  // A failed cycle is followed by the backoff wait; the loop itself never fails.
  pub fn run(&self, stop_rx: mpsc::Receiver<()>, stats: &CycleStats) {
    let s = &self.settings;
    tracing::info!(
      data_dir = %s.data_dir.display(),
      interval_secs = s.interval.as_secs(),
      generate_on_start = s.generate_on_start,
      "regeneration scheduler started"
    );

    if s.generate_on_start && !self.cycle(stats) && wait_or_stop(&stop_rx, s.backoff) {
      tracing::info!("regeneration scheduler stopped");
      return;
    }

    loop {
      if wait_or_stop(&stop_rx, s.interval) {
        break;
      }
      if !self.cycle(stats) && wait_or_stop(&stop_rx, s.backoff) {
        break;
      }
    }

    tracing::info!("regeneration scheduler stopped");
  }

  fn cycle(&self, stats: &CycleStats) -> bool {
    let s = &self.settings;
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
      run_cycle(&s.data_dir, s.min_count, s.max_count)
    }));

    match result {
      Ok(Ok(outcome)) => {
        stats.succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::info!(file = %outcome.file_name, count = outcome.count, "generation cycle complete");
        true
      }
      Ok(Err(e)) => {
        stats.failed.fetch_add(1, Ordering::Relaxed);
        tracing::error!(error = %e, backoff_secs = s.backoff.as_secs(), "generation cycle failed");
        false
      }
      Err(_) => {
        stats.failed.fetch_add(1, Ordering::Relaxed);
        tracing::error!(backoff_secs = s.backoff.as_secs(), "generation cycle panicked");
        false
      }
    }
  }
}

// Returns true when the loop should exit.
fn wait_or_stop(stop_rx: &mpsc::Receiver<()>, wait: Duration) -> bool {
  match stop_rx.recv_timeout(wait) {
    Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
    Err(RecvTimeoutError::Timeout) => false,
  }
}

pub struct SchedulerHandle {
  stop_tx: mpsc::Sender<()>,
  thread: Option<JoinHandle<()>>,
  stats: Arc<CycleStats>,
}

impl SchedulerHandle {
  pub fn stats(&self) -> &CycleStats {
    &self.stats
  }

  pub fn stop(mut self) {
    let _ = self.stop_tx.send(());
    if let Some(t) = self.thread.take() {
      if t.join().is_err() {
        tracing::error!("regeneration scheduler thread panicked");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Instant;

  fn settings(data_dir: PathBuf) -> SchedulerSettings {
    SchedulerSettings {
      data_dir,
      min_count: 2,
      max_count: 4,
      interval: Duration::from_millis(20),
      backoff: Duration::from_millis(5),
      generate_on_start: true,
    }
  }

  fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
      if cond() {
        return true;
      }
      thread::sleep(Duration::from_millis(5));
    }
    false
  }

  #[test]
  fn run_cycle_writes_one_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_cycle(dir.path(), 3, 3).unwrap();
    assert_eq!(outcome.count, 3);
    assert!(outcome.path.exists());
    assert!(outcome.file_name.starts_with(snapshot_store::SNAPSHOT_PREFIX));
  }

  #[test]
  fn generates_on_start_and_then_periodically() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Scheduler::new(settings(dir.path().to_path_buf())).spawn().unwrap();
    assert!(wait_until(|| handle.stats().succeeded() >= 3));
    handle.stop();

    let n = snapshot_store::list_snapshots(dir.path()).unwrap().len();
    assert!(n >= 3);
  }

  #[test]
  fn start_up_cycle_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path().to_path_buf());
    s.generate_on_start = false;
    s.interval = Duration::from_secs(3600);
    let handle = Scheduler::new(s).spawn().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(handle.stats().succeeded(), 0);
    handle.stop();
    assert!(snapshot_store::list_snapshots(dir.path()).unwrap().is_empty());
  }

  #[test]
  fn failing_cycles_do_not_stop_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path().to_path_buf());
    s.min_count = 9;
    s.max_count = 1;
    let handle = Scheduler::new(s).spawn().unwrap();
    assert!(wait_until(|| handle.stats().failed() >= 3));
    assert_eq!(handle.stats().succeeded(), 0);
    handle.stop();
  }

  #[test]
  fn unwritable_data_dir_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let handle = Scheduler::new(settings(blocker)).spawn().unwrap();
    assert!(wait_until(|| handle.stats().failed() >= 2));
    handle.stop();
  }

  #[test]
  fn stop_interrupts_a_long_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path().to_path_buf());
    s.interval = Duration::from_secs(3600);
    let handle = Scheduler::new(s).spawn().unwrap();
    assert!(wait_until(|| handle.stats().succeeded() == 1));

    let started = Instant::now();
    handle.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
  }
}
