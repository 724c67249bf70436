use super::covariance::SymMat3;
use super::gaussian::normalize_weights;
use super::topology::AtomNameProvider;
use phf::{Map, phf_map};
use std::f64::consts::PI;
use thiserror::Error;

/// Heavy-atom element types that carry a scattering model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Carbon,
    Oxygen,
    Nitrogen,
    Sulfur,
}

static ELEMENT_SYMBOLS: Map<&'static str, ElementType> = phf_map! {
    "C" => ElementType::Carbon,
    "O" => ElementType::Oxygen,
    "N" => ElementType::Nitrogen,
    "S" => ElementType::Sulfur,
};

impl ElementType {
    pub const ALL: [ElementType; 4] = [
        ElementType::Carbon,
        ElementType::Oxygen,
        ElementType::Nitrogen,
        ElementType::Sulfur,
    ];

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        ELEMENT_SYMBOLS.get(symbol).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            ElementType::Carbon => 0,
            ElementType::Oxygen => 1,
            ElementType::Nitrogen => 2,
            ElementType::Sulfur => 3,
        }
    }

    /// Amplitude `A` of the scattering factor `f(s) = A·exp(−B·s²)`.
    pub fn scattering_weight(self) -> f64 {
        match self {
            ElementType::Carbon => 2.49982,
            ElementType::Oxygen => 1.97692,
            ElementType::Nitrogen => 2.20402,
            ElementType::Sulfur => 5.14099,
        }
    }

    /// Width `B` of the scattering factor, in Å².
    pub fn scattering_b(self) -> f64 {
        match self {
            ElementType::Carbon => 15.146,
            ElementType::Oxygen => 8.59722,
            ElementType::Nitrogen => 11.1116,
            ElementType::Sulfur => 15.8952,
        }
    }

    /// Variance of the real-space spherical Gaussian, in nm².
    ///
    /// The real-space density is the Fourier transform of the scattering factor,
    /// `f(r) ∝ exp(−π²/B·r²)`, so `σ = √(B/2)/π`, converted from Å to nm.
    pub fn variance(self) -> f64 {
        let s = (0.5 * self.scattering_b()).sqrt() / PI * 0.1;
        s * s
    }

    pub fn covariance(self) -> SymMat3 {
        SymMat3::isotropic(self.variance())
    }
}

/// Extracts the element symbol from an atom name.
///
/// The element is the first character of the name unless that is a digit
/// (as in `1HB`), in which case it is the second.
pub fn element_symbol(atom_name: &str) -> Option<char> {
    let mut chars = atom_name.chars();
    let first = chars.next()?;
    if first.is_ascii_digit() {
        chars.next()
    } else {
        Some(first)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelBuildError {
    #[error("Molecular naming metadata not found; atom names are required to assign element types")]
    MissingNameProvider,
    #[error("No name found for atom {serial}")]
    UnnamedAtom { serial: usize },
    #[error("Unsupported atom type '{symbol}' from atom name '{name}'")]
    UnsupportedElement { symbol: String, name: String },
}

/// The model mixture: one spherical Gaussian per atom, centered on the atom.
///
/// Positions are supplied per evaluation; only weights and element types are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGmm {
    weights: Vec<f64>,
    types: Vec<ElementType>,
}

impl ModelGmm {
    pub fn build(
        serials: &[usize],
        names: Option<&dyn AtomNameProvider>,
    ) -> Result<Self, ModelBuildError> {
        let names = names.ok_or(ModelBuildError::MissingNameProvider)?;

        let mut weights = Vec::with_capacity(serials.len());
        let mut types = Vec::with_capacity(serials.len());
        for &serial in serials {
            let name = names
                .atom_name(serial)
                .ok_or(ModelBuildError::UnnamedAtom { serial })?;
            let symbol = element_symbol(name).map(String::from).unwrap_or_default();
            let element = ElementType::from_symbol(&symbol).ok_or_else(|| {
                ModelBuildError::UnsupportedElement {
                    symbol: symbol.clone(),
                    name: name.to_string(),
                }
            })?;
            types.push(element);
            weights.push(element.scattering_weight());
        }

        Ok(Self { weights, types })
    }

    pub fn from_types(types: Vec<ElementType>) -> Self {
        let weights = types.iter().map(|t| t.scattering_weight()).collect();
        Self { weights, types }
    }

    /// Consumes the mixture and returns it with weights summing to one.
    pub fn normalized(mut self) -> Self {
        normalize_weights(&mut self.weights);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn types(&self) -> &[ElementType] {
        &self.types
    }
}
