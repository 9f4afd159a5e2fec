use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use pel_core::ir::Ir;
use pel_core::runtime::{self, RunConfig, RunMode};

use crate::output;

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Deterministic,
    MonteCarlo,
    Sensitivity,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Deterministic => RunMode::Deterministic,
            ModeArg::MonteCarlo => RunMode::MonteCarlo,
            ModeArg::Sensitivity => RunMode::Sensitivity,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the emitted `.ir.json`
    pub input: PathBuf,

    /// Execution mode
    #[arg(long, value_enum, default_value_t = ModeArg::Deterministic)]
    pub mode: ModeArg,

    /// RNG seed; determines every sampled value and replication order
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Number of replications (Monte Carlo only)
    #[arg(long, default_value_t = 1)]
    pub runs: u64,

    /// Number of timesteps to evaluate each TimeSeries variable over
    #[arg(long, default_value_t = 1)]
    pub timesteps: i64,

    /// Fractional perturbation applied per direction (sensitivity only)
    #[arg(long, default_value_t = 0.10)]
    pub sensitivity_pct: f64,

    /// Path to write the `.results.json` (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Default for ModeArg {
    fn default() -> Self {
        ModeArg::Deterministic
    }
}

impl std::fmt::Display for ModeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModeArg::Deterministic => "deterministic",
            ModeArg::MonteCarlo => "monte-carlo",
            ModeArg::Sensitivity => "sensitivity",
        };
        write!(f, "{s}")
    }
}

/// `run <model.ir.json> --mode ... --seed ... -o out.json`: a simulation
/// failure still writes a results file with `status = "failed"`, to preserve
/// observability (spec §7) — only the process exit code reflects failure.
pub fn run_run(args: RunArgs) -> Result<bool, Box<dyn Error>> {
    let raw = fs::read_to_string(&args.input)?;
    let ir: Ir = serde_json::from_str(&raw)?;

    let config = RunConfig {
        mode: args.mode.into(),
        seed: args.seed,
        runs: args.runs,
        timesteps: args.timesteps,
        sensitivity_pct: args.sensitivity_pct,
    };

    let results = runtime::run(&ir, &config)?;
    let succeeded = results.status == "success";
    output::write_json(&results, args.output.as_deref())?;
    Ok(succeeded)
}
