use densefit::core::io::gmm_file::GmmFile;
use densefit::engine::comm::ReductionScope;
use densefit::engine::config::{RestraintConfig, RestraintConfigBuilder};
use densefit::engine::progress::ProgressReporter;
use densefit::engine::restraint::DensityRestraint;
use densefit::workflows::rescore::{self, Frame};
use nalgebra::{Matrix3, Point3, Vector3};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

const KBT: f64 = 2.5;
const SIGMA0: f64 = 0.2;
const SIGMA_MEAN: f64 = 0.05;

const GMM: &str = "\
#! FIELDS Id Weight Mean_0 Mean_1 Mean_2 Cov_00 Cov_01 Cov_02 Cov_11 Cov_12 Cov_22
0 0.6 0.0 0.0 0.0 0.020 0.002 0.000 0.025 0.001 0.030
1 0.4 3.0 0.5 0.0 0.030 0.000 0.003 0.020 0.000 0.025
";

struct Component {
    weight: f64,
    mean: Vector3<f64>,
    cov: Matrix3<f64>,
}

fn data_components() -> Vec<Component> {
    vec![
        Component {
            weight: 0.6,
            mean: Vector3::new(0.0, 0.0, 0.0),
            cov: Matrix3::new(
                0.020, 0.002, 0.000, //
                0.002, 0.025, 0.001, //
                0.000, 0.001, 0.030,
            ),
        },
        Component {
            weight: 0.4,
            mean: Vector3::new(3.0, 0.5, 0.0),
            cov: Matrix3::new(
                0.030, 0.000, 0.003, //
                0.000, 0.020, 0.000, //
                0.003, 0.000, 0.025,
            ),
        },
    ]
}

/// Carbon then oxygen, with weights normalized and spherical covariances from the
/// scattering-factor widths.
fn model_components(positions: &[Point3<f64>]) -> Vec<Component> {
    let (a_c, b_c) = (2.49982, 15.146);
    let (a_o, b_o) = (1.97692, 8.59722);
    let total = a_c + a_o;
    let spherical = |b: f64| {
        let s = (0.5 * b).sqrt() / PI * 0.1;
        Matrix3::identity() * (s * s)
    };
    vec![
        Component {
            weight: a_c / total,
            mean: positions[0].coords,
            cov: spherical(b_c),
        },
        Component {
            weight: a_o / total,
            mean: positions[1].coords,
            cov: spherical(b_o),
        },
    ]
}

fn overlap(a: &Component, b: &Component) -> (f64, Vector3<f64>) {
    let sum = a.cov + b.cov;
    let inv = sum.try_inverse().unwrap();
    let delta = a.mean - b.mean;
    let ov = a.weight * b.weight / ((2.0 * PI).powf(1.5) * sum.determinant().sqrt())
        * (-0.5 * (delta.transpose() * inv * delta)[(0, 0)]).exp();
    (ov, inv * delta * ov)
}

fn positions() -> Vec<Point3<f64>> {
    vec![Point3::new(0.05, -0.02, 0.01), Point3::new(2.96, 0.52, 0.03)]
}

fn config(gmm_file: &Path) -> RestraintConfig {
    RestraintConfigBuilder::new()
        .atoms(vec![10, 20])
        .gmm_file(gmm_file.to_path_buf())
        .kbt(KBT)
        .nl_cutoff(0.01)
        .nl_stride(100)
        .sigma0(SIGMA0)
        .sigma_min(0.01)
        .sigma_max(1.0)
        .sigma_step(0.05)
        .sigma_mean(SIGMA_MEAN)
        .mc_steps(10)
        .mc_stride(2)
        .seed(1234)
        .build()
        .unwrap()
}

fn build(dir: &Path) -> DensityRestraint {
    let path = dir.join("map.gmm");
    fs::write(&path, GMM).unwrap();
    let names: HashMap<usize, String> =
        HashMap::from([(10, "CA".to_string()), (20, "O".to_string())]);
    DensityRestraint::new(&config(&path), Some(&names), ReductionScope::serial()).unwrap()
}

fn relative_error(actual: f64, expected: f64) -> f64 {
    (actual - expected).abs() / expected.abs().max(f64::MIN_POSITIVE)
}

#[test]
fn first_step_matches_hand_computed_overlaps_energy_and_gradient() {
    let dir = tempfile::tempdir().unwrap();
    let mut restraint = build(dir.path());
    let positions = positions();

    let data = data_components();
    let model = model_components(&positions);
    let ovdd: Vec<f64> = data
        .iter()
        .map(|a| data.iter().map(|b| overlap(a, b).0).sum())
        .collect();
    let ovmd: Vec<f64> = data
        .iter()
        .map(|d| model.iter().map(|m| overlap(d, m).0).sum())
        .collect();

    let ss2 = SIGMA_MEAN * SIGMA_MEAN + SIGMA0 * SIGMA0;
    let rss: f64 = ovmd.iter().zip(&ovdd).map(|(m, d)| (m - d) * (m - d)).sum();
    let energy = KBT / (2.0 * ss2) * rss + KBT * (2.0 / 2.0 + 0.5) * ss2.ln();

    let mut gradient = vec![Vector3::zeros(); model.len()];
    for (d, component) in data.iter().enumerate() {
        let coefficient = KBT / ss2 * (ovmd[d] - ovdd[d]);
        for (m, atom) in model.iter().enumerate() {
            gradient[m] += overlap(component, atom).1 * coefficient;
        }
    }

    // Step 1 is not a Monte Carlo step (stride 2), so sigma is still sigma0.
    let output = restraint.calculate(1, &positions, false).unwrap();

    assert_eq!(restraint.replica_count(), 1);
    assert_eq!(output.sigma, SIGMA0);
    assert_eq!(output.accept, 0.0);
    for (actual, expected) in restraint.self_overlaps().iter().zip(&ovdd) {
        assert!(relative_error(*actual, *expected) < 1e-9);
    }
    for (actual, expected) in restraint.overlaps().iter().zip(&ovmd) {
        assert!(relative_error(*actual, *expected) < 1e-9);
    }
    assert!(relative_error(output.score, energy) < 1e-9);
    for (actual, expected) in output.gradient.iter().zip(&gradient) {
        assert!((actual - expected).norm() <= 1e-9 * expected.norm());
    }
}

#[test]
fn each_atom_only_interacts_with_its_own_component() {
    let dir = tempfile::tempdir().unwrap();
    let mut restraint = build(dir.path());
    restraint.calculate(0, &positions(), false).unwrap();

    let mut pairs: Vec<(usize, usize)> = restraint
        .neighbor_list()
        .pairs()
        .iter()
        .map(|p| (p.data, p.model))
        .collect();
    pairs.sort();
    assert_eq!(pairs, vec![(0, 0), (1, 1)]);
}

#[test]
fn rescoring_a_trajectory_keeps_sigma_in_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut restraint = build(dir.path());
    let frames: Vec<Frame> = (0..20u64)
        .map(|step| {
            let jitter = 0.005 * (step as f64 * 0.7).cos();
            let mut positions = positions();
            positions[0].x += jitter;
            positions[1].y -= jitter;
            Frame {
                step,
                positions,
                exchange: step == 10,
            }
        })
        .collect();

    let records = rescore::run(&mut restraint, &frames, &ProgressReporter::new()).unwrap();
    assert_eq!(records.len(), 20);
    for record in &records {
        assert!((0.01..=1.0).contains(&record.sigma));
        assert!((0.0..=1.0).contains(&record.accept));
        assert!(record.score.is_finite());
    }
}

#[test]
fn loaded_mixture_survives_a_write_read_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.gmm");
    fs::write(&path, GMM).unwrap();
    let original = GmmFile::read_from_path(&path).unwrap();

    let copy = dir.path().join("copy.gmm");
    GmmFile::write_to_path(&original, &copy).unwrap();
    assert_eq!(GmmFile::read_from_path(&copy).unwrap(), original);
}
