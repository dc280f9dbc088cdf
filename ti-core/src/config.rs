use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub generator: GeneratorConfig,
  pub scheduler: SchedulerConfig,
  pub storage: StorageConfig,
  pub feed: FeedConfig,
  pub logging: LoggingConfig,
}

impl Config {
  pub fn data_dir(&self, base: &Path) -> PathBuf {
    self
      .storage
      .data_dir
      .clone()
      .unwrap_or_else(|| crate::paths::data_dir(base))
  }
}

// Signed so bad values reach the generator and are reported there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
  #[serde(default = "default_min_count")]
  pub min_count: i64,

  #[serde(default = "default_max_count")]
  pub max_count: i64,
}

impl Default for GeneratorConfig {
  fn default() -> Self {
    Self {
      min_count: default_min_count(),
      max_count: default_max_count(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
  #[serde(default = "default_interval_seconds")]
  pub interval_seconds: u64,

  #[serde(default = "default_true")]
  pub generate_on_start: bool,

  #[serde(default = "default_backoff_seconds")]
  pub backoff_seconds: u64,
}

impl SchedulerConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_seconds)
  }

  pub fn backoff(&self) -> Duration {
    Duration::from_secs(self.backoff_seconds)
  }
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      interval_seconds: default_interval_seconds(),
      generate_on_start: true,
      backoff_seconds: default_backoff_seconds(),
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
  #[serde(default = "default_source_system")]
  pub source_system: String,

  #[serde(default = "default_collection_id")]
  pub collection_id: String,

  #[serde(default = "default_collection_title")]
  pub collection_title: String,

  #[serde(default)]
  pub taxii_indicators_only: bool,

  #[serde(default = "default_taxii_api_root_path")]
  pub taxii_api_root_path: String,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      source_system: default_source_system(),
      collection_id: default_collection_id(),
      collection_title: default_collection_title(),
      taxii_indicators_only: false,
      taxii_api_root_path: default_taxii_api_root_path(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_min_count() -> i64 {
  10
}

fn default_max_count() -> i64 {
  25
}

fn default_interval_seconds() -> u64 {
  2 * 60 * 60
}

fn default_backoff_seconds() -> u64 {
  10
}

fn default_source_system() -> String {
  "STEELCAGE.AI X-GEN TI PLATFORM".to_string()
}

fn default_collection_id() -> String {
  "indicators".to_string()
}

fn default_collection_title() -> String {
  "SC.AI X-GEN TI Synthetic Indicators (STIX 2.1)".to_string()
}

fn default_taxii_api_root_path() -> String {
  "/taxii2/root".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub generator: Option<GeneratorConfig>,

  #[serde(default)]
  pub scheduler: Option<SchedulerConfig>,

  #[serde(default)]
  pub storage: Option<StorageConfig>,

  #[serde(default)]
  pub feed: Option<FeedConfig>,

  #[serde(default)]
  pub logging: Option<LoggingConfig>,
}

impl ConfigFile {
  fn normalize(self) -> Config {
    let mut cfg = Config::default();
    if let Some(g) = self.generator {
      cfg.generator = g;
    }
    if let Some(s) = self.scheduler {
      cfg.scheduler = s;
    }
    if let Some(s) = self.storage {
      cfg.storage = s;
    }
    if let Some(f) = self.feed {
      cfg.feed = f;
    }
    if let Some(l) = self.logging {
      cfg.logging = l;
    }
    cfg
  }

  fn needs_upgrade(&self) -> bool {
    self.generator.is_none()
      || self.scheduler.is_none()
      || self.storage.is_none()
      || self.feed.is_none()
      || self.logging.is_none()
  }
}

// Warnings raised while resolving settings. Loading happens before logging is
// installed, so callers log these once a subscriber exists.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
  pub config: Config,
  pub warnings: Vec<String>,
}

// Writes defaults when `path` is missing and rewrites it (with a backup) when
// sections are missing or the file does not parse. Environment overrides go last.
pub fn load_or_create_default(path: &Path) -> anyhow::Result<Loaded> {
  let mut config = load_file(path)?;
  let mut warnings = apply_env_overrides(&mut config, |key| std::env::var(key).ok());
  warnings.extend(sanitize(&mut config));
  Ok(Loaded { config, warnings })
}

fn load_file(path: &Path) -> anyhow::Result<Config> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", path.display()))?;
  fs::create_dir_all(parent)?;

  if !path.exists() {
    let cfg = Config::default();
    write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
    return Ok(cfg);
  }

  let raw = fs::read_to_string(path)?;
  match toml::from_str::<ConfigFile>(&raw) {
    Ok(file) => {
      let upgrade = file.needs_upgrade();
      let cfg = file.normalize();
      if upgrade {
        let backup = parent.join(format!("config.toml.bak-{}", now_unix_s()));
        let _ = fs::copy(path, &backup);
        let _ = write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?);
        eprintln!(
          "X-GEN TI: upgraded config defaults written to {} (backup: {})",
          path.display(),
          backup.display()
        );
      }
      Ok(cfg)
    }
    Err(e) => {
      let cfg = Config::default();
      let backup = parent.join(format!("config.toml.bad-{}", now_unix_s()));
      let _ = fs::rename(path, &backup);
      write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
      eprintln!(
        "X-GEN TI: invalid config at {} (backed up to {}): {e}",
        path.display(),
        backup.display()
      );
      Ok(cfg)
    }
  }
}

// Values that do not parse are skipped and reported in the returned warnings.
pub fn apply_env_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) -> Vec<String> {
  let mut warnings = Vec::new();
  if let Some(v) = var("DATA_DIR").filter(|v| !v.trim().is_empty()) {
    cfg.storage.data_dir = Some(PathBuf::from(v.trim()));
  }
  if let Some(v) = parse_env(&var, "MIN_COUNT", &mut warnings) {
    cfg.generator.min_count = v;
  }
  if let Some(v) = parse_env(&var, "MAX_COUNT", &mut warnings) {
    cfg.generator.max_count = v;
  }
  if let Some(v) = parse_env(&var, "GENERATE_EVERY_SECONDS", &mut warnings) {
    cfg.scheduler.interval_seconds = v;
  }
  if let Some(v) = var("GENERATE_ON_START") {
    cfg.scheduler.generate_on_start = v.trim().eq_ignore_ascii_case("true");
  }
  if let Some(v) = var("TAXII_INDICATORS_ONLY") {
    cfg.feed.taxii_indicators_only = v.trim().eq_ignore_ascii_case("true");
  }
  if let Some(v) = var("SOURCE_SYSTEM").filter(|v| !v.trim().is_empty()) {
    cfg.feed.source_system = v;
  }
  if let Some(v) = var("COLLECTION_ID").filter(|v| !v.trim().is_empty()) {
    cfg.feed.collection_id = v.trim().to_string();
  }
  warnings
}

fn parse_env<T: std::str::FromStr>(
  var: &impl Fn(&str) -> Option<String>,
  key: &str,
  warnings: &mut Vec<String>,
) -> Option<T> {
  let raw = var(key)?;
  match raw.trim().parse::<T>() {
    Ok(v) => Some(v),
    Err(_) => {
      warnings.push(format!("ignoring unparseable environment override {key}={raw}"));
      None
    }
  }
}

fn sanitize(cfg: &mut Config) -> Vec<String> {
  let mut warnings = Vec::new();
  if cfg.scheduler.interval_seconds == 0 {
    cfg.scheduler.interval_seconds = default_interval_seconds();
    warnings.push(format!(
      "scheduler.interval_seconds must be > 0; using {}",
      cfg.scheduler.interval_seconds
    ));
  }
  if cfg.scheduler.backoff_seconds == 0 {
    cfg.scheduler.backoff_seconds = default_backoff_seconds();
    warnings.push(format!(
      "scheduler.backoff_seconds must be > 0; using {}",
      cfg.scheduler.backoff_seconds
    ));
  }
  warnings
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    generator: Some(cfg.generator.clone()),
    scheduler: Some(cfg.scheduler.clone()),
    storage: Some(cfg.storage.clone()),
    feed: Some(cfg.feed.clone()),
    logging: Some(cfg.logging.clone()),
  }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}

fn now_unix_s() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}
