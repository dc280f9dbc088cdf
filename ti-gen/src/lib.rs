use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use ti_core::generator;
use ti_core::snapshot_store;
use ti_core::types::Bundle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenOptions {
  pub min_count: i64,
  pub max_count: i64,
  pub seed: Option<u64>,
  pub out: Option<PathBuf>,
}

impl GenOptions {
  pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
    let mut opts = GenOptions {
      min_count: 10,
      max_count: 25,
      seed: None,
      out: None,
    };

    let mut i = 1;
    while i < args.len() {
      let value = args.get(i + 1);
      match (args[i].as_str(), value) {
        ("--min", Some(v)) => opts.min_count = parse_arg("--min", v)?,
        ("--max", Some(v)) => opts.max_count = parse_arg("--max", v)?,
        ("--seed", Some(v)) => opts.seed = Some(parse_arg("--seed", v)?),
        ("--out", Some(v)) => opts.out = Some(PathBuf::from(v)),
        (flag @ ("--min" | "--max" | "--seed" | "--out"), None) => {
          anyhow::bail!("`{flag}` expects a value")
        }
        (other, _) => anyhow::bail!("unknown argument `{other}`"),
      }
      i += 2;
    }

    generator::validate_bounds(opts.min_count, opts.max_count)?;
    Ok(opts)
  }
}

fn parse_arg<T: std::str::FromStr>(flag: &str, raw: &str) -> anyhow::Result<T> {
  raw
    .trim()
    .parse()
    .map_err(|_| anyhow::anyhow!("invalid value `{raw}` for `{flag}`"))
}

pub fn run(opts: &GenOptions) -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_ansi(false)
    .with_target(false)
    .with_writer(std::io::stderr)
    .try_init()
    .ok();

  let bundle = build_bundle(opts)?;
  tracing::info!(
    count = bundle.stixobjects.len(),
    seed = ?opts.seed,
    "bundle generated"
  );

  match &opts.out {
    Some(dir) => {
      let path = write_snapshot(dir, &bundle)?;
      println!(
        "snapshot={} count={} sha256={}",
        path.display(),
        bundle.stixobjects.len(),
        sha256_hex(&path)?
      );
    }
    None => println!("{}", serde_json::to_string_pretty(&bundle)?),
  }
  Ok(())
}

pub fn build_bundle(opts: &GenOptions) -> anyhow::Result<Bundle> {
  let bundle = match opts.seed {
    Some(seed) => {
      let mut rng = StdRng::seed_from_u64(seed);
      generator::generate_with(&mut rng, opts.min_count, opts.max_count, Utc::now())?
    }
    None => generator::generate(opts.min_count, opts.max_count)?,
  };
  Ok(bundle)
}

pub fn write_snapshot(dir: &Path, bundle: &Bundle) -> anyhow::Result<PathBuf> {
  Ok(snapshot_store::write(dir, bundle)?)
}

fn sha256_hex(path: &Path) -> anyhow::Result<String> {
  let mut file = fs::File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buf = [0u8; 64 * 1024];
  loop {
    let n = file.read(&mut buf)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  Ok(format!("{:x}", hasher.finalize()))
}
