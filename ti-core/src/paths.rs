use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "XGEN_TI_HOME";

pub fn base_dir() -> anyhow::Result<PathBuf> {
  let home = std::env::var(HOME_ENV).unwrap_or_else(|_| "/app".into());
  if home.trim().is_empty() {
    anyhow::bail!("{HOME_ENV} is set but empty");
  }
  Ok(PathBuf::from(home))
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}

pub fn data_dir(base: &Path) -> PathBuf {
  base.join("data")
}
