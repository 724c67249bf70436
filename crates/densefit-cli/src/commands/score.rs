use crate::cli::ScoreArgs;
use crate::config::PartialRestraintConfig;
use crate::error::{CliError, Result};
use crate::structure::{self, Structure};
use crate::utils::progress::CliProgressHandler;
use densefit::engine::comm::{Communicator, ReductionScope, ThreadGroup};
use densefit::engine::config::RestraintConfig;
use densefit::engine::error::EngineError;
use densefit::engine::progress::ProgressReporter;
use densefit::engine::restraint::DensityRestraint;
use densefit::workflows::rescore::{self, Frame, ScoreRecord};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

pub fn run(args: ScoreArgs, quiet: bool) -> Result<()> {
    if args.workers == 0 {
        return Err(CliError::Argument(
            "--workers must be at least 1".to_string(),
        ));
    }

    info!("Loading input structure from {:?}", &args.structure);
    let structure = Structure::read_from_path(&args.structure)?;

    let partial_config = PartialRestraintConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args, structure.serials())?;

    let frames = match &args.trajectory {
        Some(path) => {
            info!("Loading trajectory from {:?}", path);
            structure::read_trajectory(path, &config.atoms)?
        }
        None => vec![structure.as_frame(&config.atoms)?],
    };

    let progress_handler = if quiet {
        CliProgressHandler::hidden()
    } else {
        CliProgressHandler::new()
    };
    println!(
        "Scoring {} frame(s) of {} atom(s) with {} worker(s)...",
        frames.len(),
        config.atoms.len(),
        args.workers
    );
    let records = score_frames(
        &config,
        &structure,
        &frames,
        args.workers,
        &progress_handler,
    )?;

    match &args.output {
        Some(path) => {
            info!("Writing {} record(s) to {:?}", records.len(), path);
            write_records(&records, std::fs::File::create(path)?)?;
            println!("✓ Scores written to: {}", path.display());
        }
        None => write_records(&records, std::io::stdout().lock())?,
    }

    if let Some(last) = records.last() {
        info!(
            sigma = last.sigma,
            accept = last.accept,
            score = last.score,
            "Final frame scored."
        );
    }
    Ok(())
}

/// Scores `frames` with `workers` cooperating restraint instances; rank 0 reports
/// progress and its records are returned.
pub fn score_frames(
    config: &RestraintConfig,
    structure: &Structure,
    frames: &[Frame],
    workers: usize,
    progress: &CliProgressHandler,
) -> Result<Vec<ScoreRecord>> {
    if workers <= 1 {
        let reporter = ProgressReporter::with_callback(progress.get_callback());
        return Ok(score_on(config, structure, frames, ReductionScope::serial(), &reporter)?);
    }

    let results = ThreadGroup::run(workers, |comm| {
        let reporter = if comm.rank() == 0 {
            ProgressReporter::with_callback(progress.get_callback())
        } else {
            ProgressReporter::new()
        };
        let scope = ReductionScope::new(Arc::new(comm), None);
        score_on(config, structure, frames, scope, &reporter)
    });

    let mut per_worker = results
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter();
    let records = per_worker.next().unwrap_or_default();
    if per_worker.any(|other| other != records) {
        warn!("Workers disagree on the per-frame records; reporting rank 0.");
    }
    Ok(records)
}

fn score_on(
    config: &RestraintConfig,
    structure: &Structure,
    frames: &[Frame],
    scope: ReductionScope,
    reporter: &ProgressReporter,
) -> std::result::Result<Vec<ScoreRecord>, EngineError> {
    let mut restraint =
        DensityRestraint::with_progress(config, Some(structure.names()), scope, reporter)?;
    rescore::run(&mut restraint, frames, reporter)
}

fn write_records(records: &[ScoreRecord], writer: impl Write) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};

    const GMM: &str = "\
#! FIELDS Id Weight Mean_0 Mean_1 Mean_2 Cov_00 Cov_01 Cov_02 Cov_11 Cov_12 Cov_22
0 0.5 0.0 0.0 0.0 0.02 0.0 0.0 0.02 0.0 0.02
1 0.5 1.5 0.0 0.0 0.02 0.0 0.0 0.02 0.0 0.02
2 0.3 1.5 1.4 0.0 0.03 0.0 0.0 0.02 0.0 0.02
";

    const STRUCTURE: &str = "\
serial,name,x,y,z
1,N,0.02,0.0,0.0
2,CA,1.48,0.03,0.0
3,O,1.5,1.38,0.01
";

    fn fixture(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
        let gmm = dir.join("map.gmm");
        fs::write(&gmm, GMM).unwrap();
        let structure = dir.join("atoms.csv");
        fs::write(&structure, STRUCTURE).unwrap();
        let config = dir.join("cfg.toml");
        fs::write(
            &config,
            format!(
                "[restraint]\ngmm-file = {:?}\nkbt = 2.5\nnl-cutoff = 0.01\nnl-stride = 2\n\
                 sigma0 = 0.2\nsigma-min = 0.01\nsigma-max = 1.0\nsigma-step = 0.05\n\
                 sigma-mean = 0.05\n\n[monte-carlo]\nsteps = 3\nstride = 1\nseed = 11\n",
                gmm.display().to_string()
            ),
        )
        .unwrap();
        (config, structure, gmm)
    }

    fn trajectory(dir: &Path) -> PathBuf {
        let path = dir.join("traj.csv");
        let mut content = String::from("step,serial,x,y,z\n");
        for step in 0..6 {
            let shift = 0.01 * step as f64;
            content.push_str(&format!("{step},1,{},0.0,0.0\n", 0.02 + shift));
            content.push_str(&format!("{step},2,1.48,{},0.0\n", 0.03 - shift));
            content.push_str(&format!("{step},3,1.5,1.38,{}\n", 0.01 + shift));
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn read_records(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    fn args(config: PathBuf, structure: PathBuf) -> ScoreArgs {
        ScoreArgs {
            config,
            structure,
            trajectory: None,
            output: None,
            workers: 1,
            gmm_file: None,
            seed: None,
            serial: false,
            set_values: Vec::new(),
        }
    }

    fn load(args: &ScoreArgs) -> (RestraintConfig, Structure, Vec<Frame>) {
        let structure = Structure::read_from_path(&args.structure).unwrap();
        let config = PartialRestraintConfig::from_file(&args.config)
            .unwrap()
            .merge_with_cli(args, structure.serials())
            .unwrap();
        let frames = match &args.trajectory {
            Some(path) => structure::read_trajectory(path, &config.atoms).unwrap(),
            None => vec![structure.as_frame(&config.atoms).unwrap()],
        };
        (config, structure, frames)
    }

    #[test]
    fn single_structure_is_scored_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let (config, structure, _) = fixture(dir.path());
        let output = dir.path().join("scores.csv");
        let mut args = args(config, structure);
        args.output = Some(output.clone());

        run(args, true).unwrap();

        let rows = read_records(&output);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "0");
        assert!(rows[0][3].parse::<f64>().unwrap().is_finite());
    }

    #[test]
    fn worker_count_does_not_change_scores() {
        let dir = tempfile::tempdir().unwrap();
        let (config, structure, _) = fixture(dir.path());
        let mut args = args(config, structure);
        args.trajectory = Some(trajectory(dir.path()));
        let (config, structure, frames) = load(&args);
        let handler = CliProgressHandler::hidden();

        let serial = score_frames(&config, &structure, &frames, 1, &handler).unwrap();
        let parallel = score_frames(&config, &structure, &frames, 3, &handler).unwrap();

        assert_eq!(serial.len(), 6);
        assert_eq!(parallel.len(), 6);
        for (a, b) in serial.iter().zip(&parallel) {
            assert_eq!(a.step, b.step);
            assert_eq!(a.sigma, b.sigma);
            assert_eq!(a.accept, b.accept);
            assert!((a.score - b.score).abs() <= 1e-9 * a.score.abs().max(1.0));
            assert!((a.gradient_norm - b.gradient_norm).abs() <= 1e-9 * a.gradient_norm.max(1.0));
        }
    }

    #[test]
    fn missing_mixture_file_fails_on_every_worker() {
        let dir = tempfile::tempdir().unwrap();
        let (config, structure, gmm) = fixture(dir.path());
        let args = args(config, structure);
        let (config, structure, frames) = load(&args);
        fs::remove_file(gmm).unwrap();

        let result = score_frames(&config, &structure, &frames, 2, &CliProgressHandler::hidden());
        assert!(matches!(result, Err(CliError::Core(_))));
    }

    #[test]
    fn zero_workers_is_an_argument_error() {
        let dir = tempfile::tempdir().unwrap();
        let (config, structure, _) = fixture(dir.path());
        let mut args = args(config, structure);
        args.workers = 0;
        assert!(matches!(run(args, true), Err(CliError::Argument(_))));
    }
}
