//! Matrix helpers shared by the predict/update steps.
//!
//! Vectors and matrices are ndarray arrays throughout; inversion goes through
//! nalgebra, which reports singular input instead of returning Inf/NaN.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

use crate::constants::Kalman;
use crate::error::{KalmanError, Result};

/// Column state vector `x` (n).
pub type StateVec = Array1<f64>;
/// Square or rectangular matrix (F, Q, H, R, P, K).
pub type Matrix = Array2<f64>;

/// Shape check that names the offending matrix.
pub fn expect_shape(matrix: Kalman, m: &Matrix, expected: (usize, usize)) -> Result<()> {
    if m.dim() != expected {
        return Err(KalmanError::mismatch(matrix, expected, m.dim()));
    }
    Ok(())
}

pub fn expect_len(matrix: Kalman, v: &StateVec, expected: usize) -> Result<()> {
    if v.len() != expected {
        return Err(KalmanError::mismatch(matrix, (expected, 1), (v.len(), 1)));
    }
    Ok(())
}

fn to_dmatrix(m: &Matrix) -> DMatrix<f64> {
    let (rows, cols) = m.dim();
    DMatrix::from_row_iterator(rows, cols, m.iter().copied())
}

fn from_dmatrix(m: &DMatrix<f64>) -> Matrix {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Inverse of a square matrix, or `None` when it is singular.
pub fn try_inverse(m: &Matrix) -> Option<Matrix> {
    if !m.is_square() {
        return None;
    }
    to_dmatrix(m).try_inverse().map(|inv| from_dmatrix(&inv))
}

pub fn all_finite<'a, I>(values: I) -> bool
where
    I: IntoIterator<Item = &'a f64>,
{
    values.into_iter().all(|v| v.is_finite())
}

pub fn is_symmetric(m: &Matrix, tolerance: f64) -> bool {
    m.is_square() && (m - &m.t()).iter().all(|d| d.abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_inverse_2x2() {
        let m = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = try_inverse(&m).unwrap();
        let product = m.dot(&inv);
        let identity = Array2::<f64>::eye(2);
        for (a, b) in product.iter().zip(identity.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_inverse_keeps_row_major_order() {
        // Non-symmetric input catches a transposed conversion.
        let m = array![[1.0, 2.0], [0.0, 1.0]];
        let inv = try_inverse(&m).unwrap();
        assert_eq!(inv, array![[1.0, -2.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_zero_matrix_is_singular() {
        assert!(try_inverse(&Array2::<f64>::zeros((1, 1))).is_none());
        assert!(try_inverse(&Array2::<f64>::zeros((2, 3))).is_none());
    }

    #[test]
    fn test_expect_shape_reports_matrix() {
        let f = Array2::<f64>::eye(4);
        let err = expect_shape(Kalman::F, &f, (3, 3)).unwrap_err();
        assert_eq!(err, KalmanError::mismatch(Kalman::F, (3, 3), (4, 4)));
    }

    #[test]
    fn test_symmetry_check() {
        assert!(is_symmetric(&array![[1.0, 0.5], [0.5, 2.0]], 1e-12));
        assert!(!is_symmetric(&array![[1.0, 0.5], [0.4, 2.0]], 1e-12));
    }
}
