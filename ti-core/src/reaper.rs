use crate::error::Result;
use crate::snapshot_store::{self, SnapshotEntry};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_MAX_AGE_HOURS: u64 = 6;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReapReport {
  pub deleted: Vec<String>,
  // (file name, error text) for snapshots that were due but could not be removed.
  pub failed: Vec<(String, String)>,
}

impl ReapReport {
  pub fn deleted_count(&self) -> usize {
    self.deleted.len()
  }
}

// Deletes snapshots generated strictly before `now - max_age_hours`.
pub fn reap(data_dir: &Path, max_age_hours: u64) -> Result<ReapReport> {
  reap_at(data_dir, max_age_hours, Utc::now())
}

pub fn reap_at(data_dir: &Path, max_age_hours: u64, now: DateTime<Utc>) -> Result<ReapReport> {
  reap_with(data_dir, max_age_hours, now, |path| fs::remove_file(path))
}

// A failed removal is recorded and the sweep moves on to the next snapshot.
pub fn reap_with(
  data_dir: &Path,
  max_age_hours: u64,
  now: DateTime<Utc>,
  mut remove: impl FnMut(&Path) -> io::Result<()>,
) -> Result<ReapReport> {
  let hours = i64::try_from(max_age_hours).unwrap_or(i64::MAX);
  let cutoff = Duration::try_hours(hours)
    .and_then(|age| now.checked_sub_signed(age))
    .unwrap_or(DateTime::<Utc>::MIN_UTC);

  let mut report = ReapReport::default();
  for snapshot in snapshot_store::list_snapshots(data_dir)? {
    if !is_older_than(&snapshot, cutoff) {
      continue;
    }
    match remove(&snapshot.path) {
      Ok(()) => {
        tracing::info!(file = %snapshot.file_name, "snapshot reaped");
        report.deleted.push(snapshot.file_name);
      }
      Err(e) => {
        tracing::warn!(file = %snapshot.file_name, error = %e, "failed to reap snapshot");
        report.failed.push((snapshot.file_name, e.to_string()));
      }
    }
  }

  Ok(report)
}

fn is_older_than(snapshot: &SnapshotEntry, cutoff: DateTime<Utc>) -> bool {
  snapshot.generated_at().is_some_and(|ts| ts < cutoff)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Bundle;

  fn empty_bundle() -> Bundle {
    Bundle::new("bundle--t".to_string(), Utc::now(), Vec::new())
  }

  #[test]
  fn deletes_only_snapshots_past_the_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let old = snapshot_store::write_stamped(dir.path(), &empty_bundle(), now - Duration::hours(10)).unwrap();
    let fresh = snapshot_store::write_stamped(dir.path(), &empty_bundle(), now - Duration::hours(2)).unwrap();

    let report = reap_at(dir.path(), 6, now).unwrap();
    let old_name = old.file_name().unwrap().to_str().unwrap().to_string();
    assert_eq!(report.deleted, vec![old_name]);
    assert_eq!(report.deleted_count(), 1);
    assert!(report.failed.is_empty());
    assert!(!old.exists());
    assert!(fresh.exists());
  }

  #[test]
  fn leaves_unrelated_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    fs::write(dir.path().join("notes.json"), b"{}").unwrap();
    fs::write(dir.path().join("indicators_old.json"), b"{}").unwrap();
    fs::write(dir.path().join(".indicators_00000000000000000001.json.tmp"), b"{}").unwrap();
    snapshot_store::write_stamped(dir.path(), &empty_bundle(), now - Duration::hours(100)).unwrap();

    let report = reap_at(dir.path(), 1, now).unwrap();
    assert_eq!(report.deleted_count(), 1);
    assert!(dir.path().join("notes.json").exists());
    assert!(dir.path().join("indicators_old.json").exists());
    assert!(dir.path().join(".indicators_00000000000000000001.json.tmp").exists());
  }

  #[test]
  fn failed_removal_is_recorded_and_sweep_continues() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let stuck = snapshot_store::write_stamped(dir.path(), &empty_bundle(), now - Duration::hours(30)).unwrap();
    let later = snapshot_store::write_stamped(dir.path(), &empty_bundle(), now - Duration::hours(20)).unwrap();

    let report = reap_with(dir.path(), 6, now, |path| {
      if path == stuck.as_path() {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
      } else {
        fs::remove_file(path)
      }
    })
    .unwrap();

    let name = |p: &Path| p.file_name().unwrap().to_str().unwrap().to_string();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, name(&stuck));
    assert!(report.failed[0].1.contains("locked"));
    assert_eq!(report.deleted, vec![name(&later)]);
    assert!(stuck.exists());
    assert!(!later.exists());
  }

  #[test]
  fn missing_directory_reaps_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let report = reap(&dir.path().join("absent"), 6).unwrap();
    assert!(report.deleted.is_empty());
  }

  #[test]
  fn zero_hours_reaps_everything_already_written() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    snapshot_store::write_stamped(dir.path(), &empty_bundle(), now - Duration::seconds(5)).unwrap();
    let report = reap_at(dir.path(), 0, now).unwrap();
    assert_eq!(report.deleted_count(), 1);
  }
}
