use crate::cli::InspectArgs;
use crate::error::{CliError, Result};
use densefit::core::data::DataGmm;
use densefit::core::io::gmm_file::GmmFile;
use densefit::engine::error::EngineError;
use densefit::engine::precompute::SelfOverlaps;
use std::io::{self, Write};
use tracing::info;

pub fn run(args: InspectArgs) -> Result<()> {
    if !(args.cutoff > 0.0 && args.cutoff < 1.0) {
        return Err(CliError::Argument(format!(
            "--cutoff must lie strictly between 0 and 1, got {}",
            args.cutoff
        )));
    }

    info!("Loading mixture from {:?}", &args.gmm_file);
    let data = GmmFile::read_from_path(&args.gmm_file)
        .map_err(EngineError::from)?
        .normalized();
    let overlaps = SelfOverlaps::compute(&data, args.cutoff)?;

    write_table(&mut std::io::stdout().lock(), &data, &overlaps, args.cutoff)?;
    Ok(())
}

fn write_table(
    out: &mut impl Write,
    data: &DataGmm,
    overlaps: &SelfOverlaps,
    cutoff: f64,
) -> io::Result<()> {
    writeln!(out, "Components: {}", data.len())?;
    writeln!(out, "Neighbor-list cutoff: {}", cutoff)?;
    writeln!(
        out,
        "{:>8} {:>12} {:>14} {:>14}",
        "Id", "Weight", "SelfOverlap", "Threshold"
    )?;
    let rows = data
        .ids()
        .iter()
        .zip(data.weights())
        .zip(overlaps.totals().iter().zip(overlaps.thresholds()));
    for ((id, weight), (total, threshold)) in rows {
        writeln!(
            out,
            "{:>8} {:>12.6} {:>14.6e} {:>14.6e}",
            id, weight, total, threshold
        )?;
    }
    out.flush()
}
