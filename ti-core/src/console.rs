use crate::config::Config;
use crate::feed_api::{CollectionQuery, FeedService, IndicatorQuery, TaxiiQuery, TAXII_MEDIA_TYPE};
use crate::reaper;
use serde::Serialize;

pub enum ConsoleAction {
  RunScheduler,
  ExitOk,
}

pub fn run_console_command(
  cfg: &Config,
  svc: &FeedService,
  args: &[String],
) -> anyhow::Result<ConsoleAction> {
  let args = strip_console_flag(args);

  if args.iter().any(|a| a == "--help" || a == "-h") {
    print_help(cfg);
    return Ok(ConsoleAction::ExitOk);
  }

  if args.iter().any(|a| a == "--generate") {
    print_json(&svc.trigger_generation()?)?;
    return Ok(ConsoleAction::ExitOk);
  }

  if let Some(i) = args.iter().position(|a| a == "--reap") {
    let hours = match args.get(i + 1).filter(|v| !v.starts_with("--")) {
      Some(v) => Some(
        v.parse::<u64>()
          .map_err(|_| anyhow::anyhow!("expected a whole number of hours for `--reap`, got `{v}`"))?,
      ),
      None => None,
    };
    print_json(&svc.delete_old_snapshots(hours)?)?;
    return Ok(ConsoleAction::ExitOk);
  }

  if args.iter().any(|a| a == "--indicators") {
    let q = IndicatorQuery {
      since: flag_value(&args, "--since"),
      limit: flag_number(&args, "--limit")?,
      page_size: flag_number(&args, "--page-size")?,
      next: flag_value(&args, "--next"),
    };
    print_json(&svc.list_indicators(&q)?)?;
    return Ok(ConsoleAction::ExitOk);
  }

  if args.iter().any(|a| a == "--objects") {
    let q = CollectionQuery {
      collection_id: collection_arg(cfg, &args),
      since: flag_value(&args, "--since"),
      types: flag_value(&args, "--types"),
      page_size: flag_number(&args, "--page-size")?,
      next: flag_value(&args, "--next"),
    };
    let page = svc.collection_objects(&q)?;
    print_validators(&page.validators.etag, page.validators.last_modified.as_deref(), None);
    print_json(&page)?;
    return Ok(ConsoleAction::ExitOk);
  }

  if args.iter().any(|a| a == "--taxii-objects") {
    let q = TaxiiQuery {
      collection_id: collection_arg(cfg, &args),
      added_after: flag_value(&args, "--added-after"),
      types: flag_value(&args, "--types"),
      limit: flag_number(&args, "--limit")?,
      next: flag_value(&args, "--next"),
    };
    let env = svc.taxii_objects(&q)?;
    print_validators(
      &env.validators.etag,
      env.validators.last_modified.as_deref(),
      Some(TAXII_MEDIA_TYPE),
    );
    print_json(&env)?;
    return Ok(ConsoleAction::ExitOk);
  }

  if args.iter().any(|a| a == "--collections") {
    print_json(&svc.collections())?;
    return Ok(ConsoleAction::ExitOk);
  }

  if let Some(base_url) = flag_value(&args, "--discovery") {
    print_json(&svc.discovery(&base_url))?;
    return Ok(ConsoleAction::ExitOk);
  }

  Ok(ConsoleAction::RunScheduler)
}

fn strip_console_flag(args: &[String]) -> Vec<String> {
  args
    .iter()
    .skip(1)
    .filter(|a| a.as_str() != "--console")
    .cloned()
    .collect()
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
  let i = args.iter().position(|a| a == flag)?;
  args.get(i + 1).filter(|v| !v.starts_with("--")).cloned()
}

fn flag_number(args: &[String], flag: &str) -> anyhow::Result<Option<i64>> {
  match flag_value(args, flag) {
    Some(v) => v
      .parse::<i64>()
      .map(Some)
      .map_err(|_| anyhow::anyhow!("expected an integer for `{flag}`, got `{v}`")),
    None => Ok(None),
  }
}

fn collection_arg(cfg: &Config, args: &[String]) -> String {
  flag_value(args, "--collection").unwrap_or_else(|| cfg.feed.collection_id.clone())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_validators(etag: &str, last_modified: Option<&str>, content_type: Option<&str>) {
  if let Some(ct) = content_type {
    eprintln!("Content-Type: {ct}");
  }
  eprintln!("ETag: {etag}");
  if let Some(lm) = last_modified {
    eprintln!("Last-Modified: {lm}");
  }
}

fn print_help(cfg: &Config) {
  println!(
    "X-GEN TI mock feed\n\n\
     Usage: ti-core [--console] [COMMAND]\n\n\
     With no command the regeneration scheduler runs until Ctrl+C.\n\n\
     Commands:\n\
     \x20 --generate                          generate one snapshot now\n\
     \x20 --reap [HOURS]                      delete snapshots older than HOURS (default {})\n\
     \x20 --indicators [--since TS] [--limit N] [--page-size N] [--next TOKEN]\n\
     \x20 --objects [--collection ID] [--since TS] [--types a,b] [--page-size N] [--next TOKEN]\n\
     \x20 --taxii-objects [--collection ID] [--added-after TS] [--types a,b] [--limit N] [--next TOKEN]\n\
     \x20 --collections                       list collections (default id: {})\n\
     \x20 --discovery BASE_URL                TAXII discovery document\n\
     \x20 --version",
    reaper::DEFAULT_MAX_AGE_HOURS,
    cfg.feed.collection_id
  );
}
