use crate::error::{CliError, Result};
use densefit::core::topology::AtomNameTable;
use densefit::workflows::rescore::Frame;
use nalgebra::Point3;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AtomRecord {
    serial: usize,
    name: String,
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Deserialize)]
struct TrajectoryRecord {
    step: u64,
    serial: usize,
    x: f64,
    y: f64,
    z: f64,
    #[serde(default)]
    exchange: bool,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| parsing_error(path, e))
}

fn parsing_error(path: &Path, error: csv::Error) -> CliError {
    CliError::FileParsing {
        path: path.to_path_buf(),
        source: error.into(),
    }
}

fn input_error(path: &Path, message: String) -> CliError {
    CliError::Input {
        path: path.to_path_buf(),
        message,
    }
}

/// Atom names and reference coordinates read from a `serial,name,x,y,z` CSV file.
#[derive(Debug, Clone)]
pub struct Structure {
    path: PathBuf,
    serials: Vec<usize>,
    names: AtomNameTable,
    positions: HashMap<usize, Point3<f64>>,
}

impl Structure {
    pub fn read_from_path(path: &Path) -> Result<Self> {
        debug!("Reading structure from {:?}", path);
        let mut serials = Vec::new();
        let mut names = AtomNameTable::new();
        let mut positions = HashMap::new();

        for record in reader(path)?.deserialize() {
            let atom: AtomRecord = record.map_err(|e| parsing_error(path, e))?;
            if positions
                .insert(atom.serial, Point3::new(atom.x, atom.y, atom.z))
                .is_some()
            {
                return Err(input_error(
                    path,
                    format!("atom serial {} appears more than once", atom.serial),
                ));
            }
            names.insert(atom.serial, atom.name);
            serials.push(atom.serial);
        }

        if serials.is_empty() {
            return Err(input_error(path, "no atoms found".to_string()));
        }
        debug!(atoms = serials.len(), "Structure loaded.");
        Ok(Self {
            path: path.to_path_buf(),
            serials,
            names,
            positions,
        })
    }

    /// Atom serials in file order.
    pub fn serials(&self) -> &[usize] {
        &self.serials
    }

    pub fn names(&self) -> &AtomNameTable {
        &self.names
    }

    /// Coordinates of `atoms`, in the given order.
    pub fn positions_for(&self, atoms: &[usize]) -> Result<Vec<Point3<f64>>> {
        atoms
            .iter()
            .map(|serial| {
                self.positions.get(serial).copied().ok_or_else(|| {
                    input_error(&self.path, format!("atom serial {} not found", serial))
                })
            })
            .collect()
    }

    /// The structure coordinates as a single frame at step 0.
    pub fn as_frame(&self, atoms: &[usize]) -> Result<Frame> {
        Ok(Frame {
            step: 0,
            positions: self.positions_for(atoms)?,
            exchange: false,
        })
    }
}

struct PendingFrame {
    step: u64,
    exchange: bool,
    positions: HashMap<usize, Point3<f64>>,
}

impl PendingFrame {
    fn finish(self, atoms: &[usize], path: &Path) -> Result<Frame> {
        let positions = atoms
            .iter()
            .map(|serial| {
                self.positions.get(serial).copied().ok_or_else(|| {
                    input_error(
                        path,
                        format!("step {} has no coordinates for atom {}", self.step, serial),
                    )
                })
            })
            .collect::<Result<_>>()?;
        Ok(Frame {
            step: self.step,
            positions,
            exchange: self.exchange,
        })
    }
}

/// Reads a `step,serial,x,y,z[,exchange]` CSV file into frames over `atoms`.
///
/// Rows of one step must be contiguous; atoms outside `atoms` are ignored.
pub fn read_trajectory(path: &Path, atoms: &[usize]) -> Result<Vec<Frame>> {
    debug!("Reading trajectory from {:?}", path);
    let mut frames = Vec::new();
    let mut seen = HashSet::new();
    let mut pending: Option<PendingFrame> = None;

    for record in reader(path)?.deserialize() {
        let row: TrajectoryRecord = record.map_err(|e| parsing_error(path, e))?;

        if pending.as_ref().is_none_or(|frame| frame.step != row.step) {
            if !seen.insert(row.step) {
                return Err(input_error(
                    path,
                    format!("rows of step {} are not contiguous", row.step),
                ));
            }
            if let Some(frame) = pending.take() {
                frames.push(frame.finish(atoms, path)?);
            }
            pending = Some(PendingFrame {
                step: row.step,
                exchange: false,
                positions: HashMap::new(),
            });
        }

        if let Some(frame) = pending.as_mut() {
            frame.exchange |= row.exchange;
            frame
                .positions
                .insert(row.serial, Point3::new(row.x, row.y, row.z));
        }
    }

    if let Some(frame) = pending {
        frames.push(frame.finish(atoms, path)?);
    }
    if frames.is_empty() {
        return Err(input_error(path, "no frames found".to_string()));
    }
    debug!(frames = frames.len(), "Trajectory loaded.");
    Ok(frames)
}
