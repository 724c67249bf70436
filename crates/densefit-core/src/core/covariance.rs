use nalgebra::{Matrix3, Vector3};
use std::ops::Add;

/// A symmetric 3x3 matrix stored as its upper triangle.
///
/// The six entries are laid out as `[xx, xy, xz, yy, yz, zz]`, which is also the
/// column order of the `Cov_00 .. Cov_22` fields in GMM data files.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SymMat3(pub [f64; 6]);

impl SymMat3 {
    pub fn new(xx: f64, xy: f64, xz: f64, yy: f64, yz: f64, zz: f64) -> Self {
        Self([xx, xy, xz, yy, yz, zz])
    }

    /// Spherical matrix with `variance` on the diagonal.
    pub fn isotropic(variance: f64) -> Self {
        Self([variance, 0.0, 0.0, variance, 0.0, variance])
    }

    #[inline]
    pub fn entries(&self) -> &[f64; 6] {
        &self.0
    }

    /// The three leading principal minors, in increasing order of size.
    pub fn leading_minors(&self) -> [f64; 3] {
        let c = &self.0;
        [c[0], c[0] * c[3] - c[1] * c[1], self.determinant()]
    }

    /// Sylvester's criterion: every leading principal minor must be strictly positive.
    pub fn is_positive_definite(&self) -> bool {
        self.leading_minors().iter().all(|&m| m > 0.0)
    }

    /// Determinant by cofactor expansion along the first row.
    #[inline]
    pub fn determinant(&self) -> f64 {
        let s = &self.0;
        s[0] * (s[3] * s[5] - s[4] * s[4]) - s[1] * (s[1] * s[5] - s[4] * s[2])
            + s[2] * (s[1] * s[4] - s[3] * s[2])
    }

    /// Analytic inverse (adjugate over determinant).
    ///
    /// Returns `None` when the determinant is zero or not finite.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let s = &self.0;
        Some(Self([
            (s[3] * s[5] - s[4] * s[4]) / det,
            (s[2] * s[4] - s[1] * s[5]) / det,
            (s[1] * s[4] - s[2] * s[3]) / det,
            (s[0] * s[5] - s[2] * s[2]) / det,
            (s[2] * s[1] - s[0] * s[4]) / det,
            (s[0] * s[3] - s[1] * s[1]) / det,
        ]))
    }

    #[inline]
    pub fn mul_vec(&self, v: &Vector3<f64>) -> Vector3<f64> {
        let s = &self.0;
        Vector3::new(
            s[0] * v.x + s[1] * v.y + s[2] * v.z,
            s[1] * v.x + s[3] * v.y + s[4] * v.z,
            s[2] * v.x + s[4] * v.y + s[5] * v.z,
        )
    }

    /// `vᵗ·M·v`
    #[inline]
    pub fn quadratic_form(&self, v: &Vector3<f64>) -> f64 {
        v.dot(&self.mul_vec(v))
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        let s = &self.0;
        Matrix3::new(s[0], s[1], s[2], s[1], s[3], s[4], s[2], s[4], s[5])
    }
}

impl Add for SymMat3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0.iter()) {
            *o += r;
        }
        Self(out)
    }
}
