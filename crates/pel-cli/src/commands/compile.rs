use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use pel_core::error::Diagnostic;
use pel_core::ir::IrEmitter;
use pel_core::parser::parse;
use pel_core::provenance::ProvenanceChecker;
use pel_core::typeck::TypeChecker;

use crate::output;

#[derive(Args)]
pub struct CompileArgs {
    /// Path to the `.pel` source file
    pub input: PathBuf,

    /// Path to write the emitted `.ir.json` (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Minimum assumption-completeness ratio required to pass (spec §3, §4.4)
    #[arg(long, default_value_t = pel_core::provenance::DEFAULT_COMPLETENESS_THRESHOLD)]
    pub provenance_threshold: f64,
}

/// `compile <src.pel> [-o out.ir.json]`: writes no IR on failure, exits
/// non-zero with the first error's code as the reported reason (spec §6, §7).
pub fn run_compile(args: CompileArgs) -> Result<bool, Box<dyn Error>> {
    let source = fs::read_to_string(&args.input)?;

    let model = match parse(&source) {
        Ok(model) => model,
        Err(diagnostics) => return report_failure(diagnostics),
    };

    let typed = match TypeChecker::new().check_model(&model) {
        Ok(typed) => typed,
        Err(diagnostics) => return report_failure(diagnostics),
    };

    if let Err(diagnostics) = ProvenanceChecker::with_threshold(args.provenance_threshold).check(&typed) {
        return report_failure(diagnostics);
    }

    let ir = IrEmitter::new().emit(&typed);
    output::write_json(&ir, args.output.as_deref())?;
    Ok(true)
}

fn report_failure(diagnostics: Vec<Diagnostic>) -> Result<bool, Box<dyn Error>> {
    let rendered = serde_json::to_string_pretty(&diagnostics)?;
    eprintln!("{rendered}");
    Ok(false)
}
