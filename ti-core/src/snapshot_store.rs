use crate::error::{FeedError, Result};
use crate::types::{parse_timestamp, Bundle, IntelObject};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;
use walkdir::WalkDir;

pub const SNAPSHOT_PREFIX: &str = "indicators_";
pub const SNAPSHOT_EXT: &str = ".json";

pub const MAX_MERGED_OBJECTS: usize = 10_000;

static LAST_STAMP_MICROS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
  pub path: PathBuf,
  pub file_name: String,
  pub stamp_micros: u64,
}

impl SnapshotEntry {
  pub fn generated_at(&self) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(i64::try_from(self.stamp_micros).ok()?)
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadResult {
  pub stixobjects: Vec<IntelObject>,
}

pub fn snapshot_file_name(stamp_micros: u64) -> String {
  format!("{SNAPSHOT_PREFIX}{stamp_micros:020}{SNAPSHOT_EXT}")
}

pub fn parse_snapshot_stamp(file_name: &str) -> Option<u64> {
  let digits = file_name
    .strip_prefix(SNAPSHOT_PREFIX)?
    .strip_suffix(SNAPSHOT_EXT)?;
  if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  digits.parse().ok()
}

// Stamps are strictly increasing for the lifetime of the process and always land
// after the newest snapshot already on disk.
pub fn write(data_dir: &Path, bundle: &Bundle) -> Result<PathBuf> {
  let floor = newest_stamp(data_dir)?.map_or(0, |s| s.saturating_add(1));
  let now = micros_of(Utc::now()).max(floor);
  let mut prev = LAST_STAMP_MICROS.load(Ordering::SeqCst);
  let stamp = loop {
    let candidate = now.max(prev.saturating_add(1));
    match LAST_STAMP_MICROS.compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst) {
      Ok(_) => break candidate,
      Err(actual) => prev = actual,
    }
  };
  let path = write_at_stamp(data_dir, bundle, stamp)?;
  if let Some(published) = path.file_name().and_then(|n| n.to_str()).and_then(parse_snapshot_stamp) {
    LAST_STAMP_MICROS.fetch_max(published, Ordering::SeqCst);
  }
  Ok(path)
}

pub fn write_stamped(data_dir: &Path, bundle: &Bundle, generated_at: DateTime<Utc>) -> Result<PathBuf> {
  write_at_stamp(data_dir, bundle, micros_of(generated_at))
}

fn write_at_stamp(data_dir: &Path, bundle: &Bundle, stamp: u64) -> Result<PathBuf> {
  fs::create_dir_all(data_dir).map_err(|e| FeedError::storage(data_dir, e))?;

  let bytes = serde_json::to_vec_pretty(bundle)?;
  let tmp = data_dir.join(format!(".{SNAPSHOT_PREFIX}{}.tmp", Uuid::new_v4().simple()));
  stage_file(&tmp, &bytes)?;
  let published = publish(&tmp, data_dir, stamp);
  let _ = fs::remove_file(&tmp);
  let path = published?;

  tracing::info!(
    file = %path.file_name().and_then(|s| s.to_str()).unwrap_or_default(),
    count = bundle.stixobjects.len(),
    "snapshot written"
  );
  Ok(path)
}

fn newest_stamp(data_dir: &Path) -> Result<Option<u64>> {
  Ok(list_snapshots(data_dir)?.last().map(|e| e.stamp_micros))
}

pub fn list_snapshots(data_dir: &Path) -> Result<Vec<SnapshotEntry>> {
  if !data_dir.exists() {
    return Ok(Vec::new());
  }

  let mut out = Vec::new();
  for entry in WalkDir::new(data_dir).min_depth(0).max_depth(1).follow_links(false) {
    let entry = match entry {
      Ok(e) => e,
      Err(e) if e.depth() == 0 => {
        let source = e
          .into_io_error()
          .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
        return Err(FeedError::storage(data_dir, source));
      }
      Err(e) => {
        tracing::warn!(error = %e, "skipping unreadable data directory entry");
        continue;
      }
    };
    if entry.depth() == 0 || !entry.file_type().is_file() {
      continue;
    }

    let Some(file_name) = entry.file_name().to_str() else {
      continue;
    };
    let Some(stamp_micros) = parse_snapshot_stamp(file_name) else {
      continue;
    };
    out.push(SnapshotEntry {
      path: entry.path().to_path_buf(),
      file_name: file_name.to_string(),
      stamp_micros,
    });
  }

  out.sort_by(|a, b| {
    a.stamp_micros
      .cmp(&b.stamp_micros)
      .then_with(|| a.file_name.cmp(&b.file_name))
  });
  Ok(out)
}

pub fn read_snapshot(path: &Path) -> Result<Bundle> {
  let bytes = fs::read(path).map_err(|e| FeedError::storage(path, e))?;
  Ok(serde_json::from_slice(&bytes)?)
}

pub fn load(
  data_dir: &Path,
  since: Option<&str>,
  limit: usize,
  types: Option<&[String]>,
) -> Result<LoadResult> {
  let since = parse_since(since);
  let mut stixobjects = Vec::new();
  if limit == 0 {
    return Ok(LoadResult { stixobjects });
  }

  for snapshot in list_snapshots(data_dir)? {
    let bundle = match read_snapshot(&snapshot.path) {
      Ok(b) => b,
      Err(e) => {
        tracing::warn!(file = %snapshot.file_name, error = %e, "skipping unreadable snapshot");
        continue;
      }
    };

    for obj in bundle.stixobjects {
      if !matches_filters(&obj, since, types) {
        continue;
      }
      stixobjects.push(obj);
      if stixobjects.len() >= limit {
        return Ok(LoadResult { stixobjects });
      }
    }
  }

  Ok(LoadResult { stixobjects })
}

pub fn load_indicators(data_dir: &Path, since: Option<&str>, limit: usize) -> Result<LoadResult> {
  let types = ["indicator".to_string()];
  load(data_dir, since, limit, Some(&types[..]))
}

fn matches_filters(obj: &IntelObject, since: Option<DateTime<Utc>>, types: Option<&[String]>) -> bool {
  if let Some(types) = types {
    let t = obj.object_type();
    if !types.iter().any(|allowed| allowed == t) {
      return false;
    }
  }
  match since {
    Some(threshold) => obj.updated_at().is_some_and(|ts| ts >= threshold),
    None => true,
  }
}

// RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC). Anything else is no filter.
pub fn parse_since(raw: Option<&str>) -> Option<DateTime<Utc>> {
  let raw = raw?.trim();
  if raw.is_empty() {
    return None;
  }
  if let Some(ts) = parse_timestamp(raw) {
    return Some(ts);
  }
  if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
  {
    return Some(midnight.and_utc());
  }
  tracing::warn!(since = %raw, "ignoring unparseable time filter");
  None
}

fn micros_of(ts: DateTime<Utc>) -> u64 {
  u64::try_from(ts.timestamp_micros()).unwrap_or(0)
}

fn stage_file(tmp: &Path, bytes: &[u8]) -> Result<()> {
  if let Err(e) = fs::write(tmp, bytes) {
    let _ = fs::remove_file(tmp);
    return Err(FeedError::storage(tmp, e));
  }
  Ok(())
}

// hard_link never replaces an existing name, so concurrent writers (in this or
// another process) that picked the same stamp each end up with their own file.
fn publish(tmp: &Path, data_dir: &Path, mut stamp: u64) -> Result<PathBuf> {
  loop {
    let dst = data_dir.join(snapshot_file_name(stamp));
    match fs::hard_link(tmp, &dst) {
      Ok(()) => return Ok(dst),
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
        stamp = stamp.checked_add(1).ok_or_else(|| FeedError::storage(&dst, e))?;
      }
      Err(e) => return Err(FeedError::storage(&dst, e)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{ObjectBody, SPEC_VERSION};
  use chrono::TimeZone;

  fn obj(id: &str, kind: &str, modified: &str) -> IntelObject {
    let body = match kind {
      "indicator" => ObjectBody::Indicator {
        name: id.to_string(),
        description: String::new(),
        pattern: "[ipv4-addr:value = '10.0.0.1']".to_string(),
        pattern_type: "stix".to_string(),
        valid_from: modified.to_string(),
        labels: vec!["malicious-activity".to_string()],
        indicator_types: vec!["malicious-activity".to_string()],
        confidence: 50,
      },
      _ => ObjectBody::Malware {
        name: id.to_string(),
        description: String::new(),
        is_family: false,
        malware_types: vec!["trojan".to_string()],
      },
    };
    IntelObject {
      id: id.to_string(),
      spec_version: SPEC_VERSION.to_string(),
      created: modified.to_string(),
      modified: modified.to_string(),
      body,
    }
  }

  fn bundle(objects: Vec<IntelObject>) -> Bundle {
    Bundle::new("bundle--test".to_string(), Utc::now(), objects)
  }

  fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, h, 0, 0).unwrap()
  }

  fn ids(r: &LoadResult) -> Vec<&str> {
    r.stixobjects.iter().map(|o| o.id.as_str()).collect()
  }

  #[test]
  fn file_names_round_trip_and_reject_foreign_names() {
    let name = snapshot_file_name(1_700_000_000_123_456);
    assert_eq!(name, "indicators_00001700000000123456.json");
    assert_eq!(parse_snapshot_stamp(&name), Some(1_700_000_000_123_456));

    assert_eq!(parse_snapshot_stamp("indicators_.json"), None);
    assert_eq!(parse_snapshot_stamp("indicators_12.json.tmp"), None);
    assert_eq!(parse_snapshot_stamp(".indicators_12.json.tmp"), None);
    assert_eq!(parse_snapshot_stamp("notes.json"), None);
    assert_eq!(parse_snapshot_stamp("indicators_12a.json"), None);
  }

  #[test]
  fn writes_are_strictly_increasing() {
    let dir = tempfile::tempdir().unwrap();
    let b = bundle(vec![obj("indicator--a", "indicator", "2025-01-01T00:00:00Z")]);
    let mut last = 0;
    for _ in 0..5 {
      let p = write(dir.path(), &b).unwrap();
      let stamp = parse_snapshot_stamp(p.file_name().unwrap().to_str().unwrap()).unwrap();
      assert!(stamp > last);
      last = stamp;
    }
    assert_eq!(list_snapshots(dir.path()).unwrap().len(), 5);
  }

  #[test]
  fn write_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), &bundle(vec![])).unwrap();
    let names: Vec<String> = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .map(|e| e.file_name().to_string_lossy().to_string())
      .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with(SNAPSHOT_PREFIX));
  }

  #[test]
  fn concurrent_writers_with_one_stamp_each_get_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let b = bundle(vec![obj("indicator--a", "indicator", "2025-01-01T00:00:00Z")]);
    let paths: Vec<PathBuf> = std::thread::scope(|scope| {
      let workers: Vec<_> = (0..8)
        .map(|_| {
          scope.spawn(|| {
            (0..50)
              .map(|_| write_stamped(dir.path(), &b, at(3)).unwrap())
              .collect::<Vec<_>>()
          })
        })
        .collect();
      workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
    });

    let unique: std::collections::HashSet<&PathBuf> = paths.iter().collect();
    assert_eq!(unique.len(), 400);
    assert_eq!(list_snapshots(dir.path()).unwrap().len(), 400);
    let leftovers = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
      .count();
    assert_eq!(leftovers, 0);
  }

  #[test]
  fn new_stamp_lands_after_existing_future_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let future = Utc.with_ymd_and_hms(2200, 1, 1, 0, 0, 0).unwrap();
    let existing = write_stamped(dir.path(), &bundle(vec![]), future).unwrap();
    let fresh = write(dir.path(), &bundle(vec![])).unwrap();

    let stamp = |p: &Path| parse_snapshot_stamp(p.file_name().unwrap().to_str().unwrap()).unwrap();
    assert!(stamp(&fresh) > stamp(&existing));
    let listed = list_snapshots(dir.path()).unwrap();
    assert_eq!(listed.last().unwrap().path, fresh);
  }

  #[test]
  fn failed_staging_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let tmp = dir.path().join("missing").join(".indicators_x.tmp");
    let err = stage_file(&tmp, b"{}").unwrap_err();
    assert!(matches!(err, FeedError::Storage { .. }));
    assert!(!tmp.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
  }

  #[test]
  fn write_into_a_file_path_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"x").unwrap();
    let err = write(&blocker, &bundle(vec![])).unwrap_err();
    assert!(matches!(err, FeedError::Storage { .. }));
  }

  #[test]
  fn missing_directory_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let r = load(&dir.path().join("nope"), None, 100, None).unwrap();
    assert!(r.stixobjects.is_empty());
  }

  #[test]
  fn unfiltered_load_merges_oldest_snapshot_first() {
    let dir = tempfile::tempdir().unwrap();
    let newer = bundle(vec![
      obj("malware--3", "malware", "2025-01-02T00:00:00Z"),
      obj("indicator--4", "indicator", "2025-01-02T00:00:00Z"),
    ]);
    let older = bundle(vec![
      obj("indicator--1", "indicator", "2025-01-01T00:00:00Z"),
      obj("malware--2", "malware", "2025-01-01T00:00:00Z"),
    ]);
    // Written out of order on purpose: ordering comes from the file name stamp.
    write_stamped(dir.path(), &newer, at(5)).unwrap();
    write_stamped(dir.path(), &older, at(1)).unwrap();

    let r = load(dir.path(), None, MAX_MERGED_OBJECTS, None).unwrap();
    assert_eq!(ids(&r), vec!["indicator--1", "malware--2", "malware--3", "indicator--4"]);
  }

  #[test]
  fn type_and_since_filters_preserve_order() {
    let dir = tempfile::tempdir().unwrap();
    write_stamped(
      dir.path(),
      &bundle(vec![
        obj("indicator--1", "indicator", "2025-01-01T00:00:00Z"),
        obj("malware--2", "malware", "2025-01-03T00:00:00Z"),
        obj("indicator--3", "indicator", "2025-01-03T00:00:00Z"),
        obj("indicator--4", "indicator", "2025-01-02T00:00:00Z"),
      ]),
      at(1),
    )
    .unwrap();

    let types = vec!["indicator".to_string()];
    let r = load(dir.path(), None, 100, Some(types.as_slice())).unwrap();
    assert_eq!(ids(&r), vec!["indicator--1", "indicator--3", "indicator--4"]);

    let r = load(dir.path(), Some("2025-01-02T00:00:00Z"), 100, None).unwrap();
    assert_eq!(ids(&r), vec!["malware--2", "indicator--3", "indicator--4"]);

    let r = load_indicators(dir.path(), Some("2025-01-02"), 100).unwrap();
    assert_eq!(ids(&r), vec!["indicator--3", "indicator--4"]);
  }

  #[test]
  fn limit_applies_across_files() {
    let dir = tempfile::tempdir().unwrap();
    for h in 1..=3 {
      let objects = (0..4)
        .map(|i| obj(&format!("indicator--{h}-{i}"), "indicator", "2025-01-01T00:00:00Z"))
        .collect();
      write_stamped(dir.path(), &bundle(objects), at(h)).unwrap();
    }
    let r = load(dir.path(), None, 6, None).unwrap();
    assert_eq!(r.stixobjects.len(), 6);
    assert_eq!(r.stixobjects[4].id, "indicator--2-0");
    assert!(load(dir.path(), None, 0, None).unwrap().stixobjects.is_empty());
  }

  #[test]
  fn corrupt_snapshot_is_skipped_and_foreign_files_ignored() {
    let dir = tempfile::tempdir().unwrap();
    write_stamped(
      dir.path(),
      &bundle(vec![obj("indicator--ok", "indicator", "2025-01-01T00:00:00Z")]),
      at(2),
    )
    .unwrap();
    fs::write(dir.path().join(snapshot_file_name(micros_of(at(1)))), b"{ not json").unwrap();
    fs::write(dir.path().join("README.txt"), b"hello").unwrap();

    let r = load(dir.path(), None, 100, None).unwrap();
    assert_eq!(ids(&r), vec!["indicator--ok"]);
  }

  #[test]
  fn garbage_since_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    write_stamped(
      dir.path(),
      &bundle(vec![obj("indicator--1", "indicator", "2020-01-01T00:00:00Z")]),
      at(1),
    )
    .unwrap();
    let r = load(dir.path(), Some("yesterday-ish"), 100, None).unwrap();
    assert_eq!(r.stixobjects.len(), 1);
  }
}
