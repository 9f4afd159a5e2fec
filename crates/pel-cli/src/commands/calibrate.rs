use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use pel_core::calibration::csv_connector::load_csv;
use pel_core::calibration::{calibrate, CalibrationConfig, CalibrationStatus};
use pel_core::calibration::report::{to_json, to_markdown};
use pel_core::ir::Ir;

use crate::output;

#[derive(Args)]
pub struct CalibrateArgs {
    /// Path to the `.ir.json` to calibrate
    pub input: PathBuf,

    /// Path to the CSV of observed data
    #[arg(long)]
    pub csv: PathBuf,

    /// Path to a JSON file describing which params to fit against which columns
    #[arg(long)]
    pub config: PathBuf,

    /// Path to write the calibrated IR (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to write the JSON calibration report (stdout if omitted)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Path to write the human-readable Markdown calibration report
    #[arg(long)]
    pub markdown: Option<PathBuf>,
}

/// `calibrate <model.ir.json> --csv data.csv --config calib.json`: input-shape
/// errors (missing CSV, unparseable config) surface before any fitting
/// begins; numerical fit failures are recorded per-parameter without
/// aborting the run (spec §7).
pub fn run_calibrate(args: CalibrateArgs) -> Result<bool, Box<dyn Error>> {
    let raw_ir = fs::read_to_string(&args.input)?;
    let ir: Ir = serde_json::from_str(&raw_ir)?;

    let table = load_csv(&args.csv)?;

    let raw_config = fs::read_to_string(&args.config)?;
    let config: CalibrationConfig = serde_json::from_str(&raw_config)?;

    let now = chrono::Utc::now().to_rfc3339();
    let result = calibrate(&ir, &table, &config, &now)?;

    output::write_json(&result.updated_ir, args.output.as_deref())?;

    let json_report = to_json(&result)?;
    match &args.report {
        Some(path) => fs::write(path, &json_report)?,
        None => println!("{json_report}"),
    }

    if let Some(path) = &args.markdown {
        fs::write(path, to_markdown(&result))?;
    }

    let all_fitted = result.outcomes.iter().all(|(_, status)| matches!(status, CalibrationStatus::Fitted(_)));
    Ok(all_fitted)
}
