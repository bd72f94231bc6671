//! Run the optimizer against a built-in benchmark problem.
//!
//! Usage: `bo-bench <run.json>`, or set `BO_BENCH_CONFIG`. The result is
//! printed to stdout as JSON; logs go to stderr and honour `RUST_LOG`.

mod problems;
mod run_file;

use anyhow::Context;

use crate::run_file::RunFile;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BO_BENCH_CONFIG").ok())
        .context("usage: bo-bench <run.json> (or set BO_BENCH_CONFIG)")?;

    let run = RunFile::load(&path).with_context(|| format!("loading run file {path}"))?;
    let result = run.execute().context("optimization failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
