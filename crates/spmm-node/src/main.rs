//! spmm-node — forms the replication groups of an in-process pool, checks
//! the sparse ring end to end and reports the resulting topology.
//!
//! ```bash
//! # 9 processes, ColumnA, groups of 3, print the groups
//! RUST_LOG=info cargo run --bin spmm-node -- -f a.mtx -s 1 -c 3 -e 4 -n 9 -p
//!
//! # 18 processes, InnerABC, JSON report
//! cargo run --bin spmm-node -- -f a.mtx -s 1 -c 3 -e 4 -n 18 -i --json
//! ```

mod options;
mod runner;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::options::ProgramOptions;

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Default log level: INFO. Override with RUST_LOG=spmm_fabric=debug etc.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = ProgramOptions::parse();
    let report  = runner::run(&options).await?;
    info!(run_id = %report.run_id, "replication groups formed and released");

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if options.print_stats {
        runner::print_stats(&report);
    }
    Ok(())
}
