// Command-line options of the node binary.
//
// Only the pool shape and the strategy reach the replication layer. The
// matrix options are carried through for the multiplication engine.

use std::path::PathBuf;

use clap::Parser;

use spmm_types::{Algorithm, ConfigError, RunConfig};

#[derive(Debug, Clone, Parser)]
#[command(
    name    = "spmm-node",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Replication-group formation for distributed sparse × dense multiplication"
)]
pub struct ProgramOptions {
    /// Sparse matrix file.
    #[arg(short = 'f', value_name = "FILE")]
    pub sparse_matrix_file: PathBuf,

    /// Seed for the generated dense matrix.
    #[arg(short = 's')]
    pub seed: u64,

    /// Replication group size (the replication factor c).
    #[arg(short = 'c', value_name = "SIZE")]
    pub replication_group_size: u32,

    /// Dense matrix width exponent.
    #[arg(short = 'e')]
    pub exponent: u32,

    /// Print result entries greater than or equal to this value.
    #[arg(short = 'g', value_name = "VALUE")]
    pub ge_value: Option<f64>,

    /// Print the result matrix.
    #[arg(short = 'v')]
    pub print_matrix: bool,

    /// Use InnerABC instead of ColumnA.
    #[arg(short = 'i')]
    pub inner: bool,

    /// Print per-group statistics after the run.
    #[arg(short = 'p')]
    pub print_stats: bool,

    /// Number of processes in the pool.
    #[arg(short = 'n', long = "processes", default_value_t = 4)]
    pub processes: u32,

    /// Emit the topology report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

impl ProgramOptions {
    pub fn algorithm(&self) -> Algorithm {
        Algorithm::from_inner_flag(self.inner)
    }

    pub fn print_greater_equal(&self) -> bool {
        self.ge_value.is_some()
    }

    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        RunConfig::new(self.processes, self.replication_group_size, self.algorithm())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
