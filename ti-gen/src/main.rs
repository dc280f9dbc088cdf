use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();

  if args.iter().any(|a| a == "--version") {
    println!("{}", env!("CARGO_PKG_VERSION"));
    return Ok(());
  }

  let opts = ti_gen::GenOptions::from_args(&args)?;
  ti_gen::run(&opts).context("ti-gen run")
}
