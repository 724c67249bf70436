use crate::core::covariance::SymMat3;
use crate::core::data::{DataGmm, DataGmmError};
use crate::core::gaussian::{ComponentError, GaussianComponent};
use nalgebra::Point3;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column names of a GMM record, in the order producers write them.
pub const FIELD_NAMES: [&str; 11] = [
    "Id", "Weight", "Mean_0", "Mean_1", "Mean_2", "Cov_00", "Cov_01", "Cov_02", "Cov_11",
    "Cov_12", "Cov_22",
];

#[derive(Debug, Error)]
pub enum GmmFileError {
    #[error("Cannot find GMM file '{}'", path.display())]
    NotFound { path: PathBuf },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Data record on line {line} precedes the '#! FIELDS' header")]
    MissingFieldsHeader { line: usize },
    #[error("Required field '{0}' is not declared in the FIELDS header")]
    MissingField(&'static str),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: GmmParseErrorKind,
    },
    #[error("Invalid component on line {line}: {source}")]
    InvalidComponent {
        line: usize,
        #[source]
        source: ComponentError,
    },
    #[error(transparent)]
    Mixture(#[from] DataGmmError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GmmParseErrorKind {
    #[error("Invalid integer for field '{field}' (value: '{value}')")]
    InvalidInt { field: &'static str, value: String },
    #[error("Invalid float for field '{field}' (value: '{value}')")]
    InvalidFloat { field: &'static str, value: String },
    #[error("Missing value for field '{field}'")]
    MissingValue { field: &'static str },
}

/// Column index of every entry of [`FIELD_NAMES`] in the current header.
struct ColumnMap([usize; 11]);

impl ColumnMap {
    fn from_header(names: &[&str]) -> Result<Self, GmmFileError> {
        let mut columns = [0; 11];
        for (slot, field) in columns.iter_mut().zip(FIELD_NAMES) {
            *slot = names
                .iter()
                .position(|n| *n == field)
                .ok_or(GmmFileError::MissingField(field))?;
        }
        Ok(Self(columns))
    }

    fn value<'a>(
        &self,
        values: &[&'a str],
        field: usize,
        line: usize,
    ) -> Result<&'a str, GmmFileError> {
        values
            .get(self.0[field])
            .copied()
            .ok_or(GmmFileError::Parse {
                line,
                kind: GmmParseErrorKind::MissingValue {
                    field: FIELD_NAMES[field],
                },
            })
    }

    fn float(&self, values: &[&str], field: usize, line: usize) -> Result<f64, GmmFileError> {
        let raw = self.value(values, field, line)?;
        raw.parse().map_err(|_| GmmFileError::Parse {
            line,
            kind: GmmParseErrorKind::InvalidFloat {
                field: FIELD_NAMES[field],
                value: raw.to_string(),
            },
        })
    }

    fn int(&self, values: &[&str], field: usize, line: usize) -> Result<i64, GmmFileError> {
        let raw = self.value(values, field, line)?;
        raw.parse().map_err(|_| GmmFileError::Parse {
            line,
            kind: GmmParseErrorKind::InvalidInt {
                field: FIELD_NAMES[field],
                value: raw.to_string(),
            },
        })
    }
}

/// Reader and writer for the columnar GMM text format.
///
/// ```text
/// #! FIELDS Id Weight Mean_0 Mean_1 Mean_2 Cov_00 Cov_01 Cov_02 Cov_11 Cov_12 Cov_22
/// 0 0.5 1.2 0.4 -0.3 0.02 0.001 0.0 0.03 0.0 0.025
/// ```
pub struct GmmFile;

impl GmmFile {
    pub fn read_from(reader: &mut impl BufRead) -> Result<DataGmm, GmmFileError> {
        let mut columns: Option<ColumnMap> = None;
        let mut ids = Vec::new();
        let mut components = Vec::new();

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }
            if let Some(directive) = trimmed.strip_prefix("#!") {
                let tokens: Vec<&str> = directive.split_whitespace().collect();
                if tokens.first() == Some(&"FIELDS") {
                    columns = Some(ColumnMap::from_header(&tokens[1..])?);
                }
                continue;
            }
            if trimmed.starts_with('#') {
                continue;
            }

            let map = columns
                .as_ref()
                .ok_or(GmmFileError::MissingFieldsHeader { line: line_num })?;
            let values: Vec<&str> = trimmed.split_whitespace().collect();

            let id = map.int(&values, 0, line_num)?;
            let weight = map.float(&values, 1, line_num)?;
            let mean = Point3::new(
                map.float(&values, 2, line_num)?,
                map.float(&values, 3, line_num)?,
                map.float(&values, 4, line_num)?,
            );
            let mut cov = [0.0; 6];
            for (k, entry) in cov.iter_mut().enumerate() {
                *entry = map.float(&values, 5 + k, line_num)?;
            }

            let component = GaussianComponent::new(mean, weight, SymMat3(cov));
            component
                .validate()
                .map_err(|source| GmmFileError::InvalidComponent {
                    line: line_num,
                    source,
                })?;

            ids.push(id);
            components.push(component);
        }

        Ok(DataGmm::with_ids(ids, components)?)
    }

    pub fn read_from_path(path: &Path) -> Result<DataGmm, GmmFileError> {
        if !path.is_file() {
            return Err(GmmFileError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }

    pub fn write_to(gmm: &DataGmm, writer: &mut impl Write) -> Result<(), GmmFileError> {
        writeln!(writer, "#! FIELDS {}", FIELD_NAMES.join(" "))?;
        for (id, c) in gmm.ids().iter().zip(gmm.components()) {
            let cov = c.covariance.entries();
            writeln!(
                writer,
                "{} {} {} {} {} {} {} {} {} {} {}",
                id,
                c.weight,
                c.mean.x,
                c.mean.y,
                c.mean.z,
                cov[0],
                cov[1],
                cov[2],
                cov[3],
                cov[4],
                cov[5]
            )?;
        }
        Ok(())
    }

    pub fn write_to_path(gmm: &DataGmm, path: &Path) -> Result<(), GmmFileError> {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_to(gmm, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
