use super::gaussian::{ComponentError, GaussianComponent, normalize_weights};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataGmmError {
    #[error("Data GMM contains no components")]
    Empty,
    #[error("Data GMM weights sum to zero")]
    ZeroTotalWeight,
    #[error("Invalid data GMM component {id}: {source}")]
    InvalidComponent {
        id: i64,
        #[source]
        source: ComponentError,
    },
    #[error("Component ids and components differ in length ({ids} vs {components})")]
    LengthMismatch { ids: usize, components: usize },
}

/// The experimental mixture fitted to a density map.
#[derive(Debug, Clone, PartialEq)]
pub struct DataGmm {
    ids: Vec<i64>,
    components: Vec<GaussianComponent>,
}

impl DataGmm {
    /// Builds a mixture whose component ids are their positions.
    pub fn new(components: Vec<GaussianComponent>) -> Result<Self, DataGmmError> {
        let ids = (0..components.len() as i64).collect();
        Self::with_ids(ids, components)
    }

    pub fn with_ids(
        ids: Vec<i64>,
        components: Vec<GaussianComponent>,
    ) -> Result<Self, DataGmmError> {
        if ids.len() != components.len() {
            return Err(DataGmmError::LengthMismatch {
                ids: ids.len(),
                components: components.len(),
            });
        }
        if components.is_empty() {
            return Err(DataGmmError::Empty);
        }
        for (&id, component) in ids.iter().zip(&components) {
            component
                .validate()
                .map_err(|source| DataGmmError::InvalidComponent { id, source })?;
        }
        if components.iter().map(|c| c.weight).sum::<f64>() <= 0.0 {
            return Err(DataGmmError::ZeroTotalWeight);
        }
        Ok(Self { ids, components })
    }

    /// Consumes the mixture and returns it with weights summing to one.
    pub fn normalized(mut self) -> Self {
        let mut weights: Vec<f64> = self.components.iter().map(|c| c.weight).collect();
        normalize_weights(&mut weights);
        for (c, w) in self.components.iter_mut().zip(weights) {
            c.weight = w;
        }
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    #[inline]
    pub fn component(&self, index: usize) -> &GaussianComponent {
        &self.components[index]
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.components.iter().map(|c| c.weight)
    }
}
