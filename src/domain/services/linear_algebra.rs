//! Dense double-precision matrix helpers on top of `nalgebra`.
//!
//! The functions here add shape checks and typed errors around nalgebra's
//! product, determinant and LU inverse.

use crate::domain::errors::ForecastError;
use nalgebra::DMatrix;

/// `a · b`, checking inner dimensions.
pub fn multiply(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, ForecastError> {
    if a.ncols() != b.nrows() {
        return Err(ForecastError::DimensionMismatch(format!(
            "cannot multiply {}x{} by {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    Ok(a * b)
}

fn ensure_square(m: &DMatrix<f64>) -> Result<(), ForecastError> {
    let (rows, cols) = m.shape();
    if rows != cols {
        return Err(ForecastError::NotSquare { rows, cols });
    }
    Ok(())
}

pub fn determinant(m: &DMatrix<f64>) -> Result<f64, ForecastError> {
    ensure_square(m)?;
    Ok(m.determinant())
}

/// Inverse through nalgebra's LU decomposition.
///
/// Fails with `NotSquare` for non-square input and `NotInvertible` when the
/// determinant is zero or the decomposition meets a zero pivot.
pub fn inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>, ForecastError> {
    let det = determinant(m)?;
    if det == 0.0 || !det.is_finite() {
        return Err(ForecastError::NotInvertible);
    }

    let inv = m.clone().try_inverse().ok_or(ForecastError::NotInvertible)?;
    if inv.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::NotInvertible);
    }
    Ok(inv)
}
