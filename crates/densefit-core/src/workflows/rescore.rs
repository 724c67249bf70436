use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::restraint::DensityRestraint;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{info, instrument};

/// Atom positions at one simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub step: u64,
    pub positions: Vec<Point3<f64>>,
    /// Whether this step follows a replica exchange.
    pub exchange: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub step: u64,
    pub sigma: f64,
    pub accept: f64,
    pub score: f64,
    /// Euclidean norm of the concatenated per-atom gradient.
    pub gradient_norm: f64,
}

/// Evaluates `restraint` on every frame in order.
///
/// When several workers share a restraint group, each must call this with the same
/// frames.
#[instrument(skip_all, name = "rescore_workflow")]
pub fn run(
    restraint: &mut DensityRestraint,
    frames: &[Frame],
    reporter: &ProgressReporter,
) -> Result<Vec<ScoreRecord>, EngineError> {
    info!(
        frames = frames.len(),
        atoms = restraint.atom_len(),
        components = restraint.data_len(),
        "Rescoring frames."
    );
    reporter.report(Progress::FramesStart {
        total_frames: frames.len() as u64,
    });

    let mut records = Vec::with_capacity(frames.len());
    for frame in frames {
        restraint.prepare(frame.exchange);
        let output = restraint.calculate(frame.step, &frame.positions, frame.exchange)?;
        let gradient_norm = output
            .gradient
            .iter()
            .map(|g| g.norm_squared())
            .sum::<f64>()
            .sqrt();

        reporter.report(Progress::FrameScored {
            step: frame.step,
            sigma: output.sigma,
            score: output.score,
        });
        records.push(ScoreRecord {
            step: frame.step,
            sigma: output.sigma,
            accept: output.accept,
            score: output.score,
            gradient_norm,
        });
    }

    reporter.report(Progress::FramesFinish);
    if let Some(last) = records.last() {
        info!(
            sigma = last.sigma,
            accept = last.accept,
            score = last.score,
            "Rescoring complete."
        );
    }
    Ok(records)
}
