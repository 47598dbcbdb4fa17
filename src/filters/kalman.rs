//! Linear Kalman predict/update steps.
//!
//! State is an `n` vector, measurements an `m` vector (`m = 1` for the
//! per-pixel filter). Every function checks its input shapes and returns
//! `DimensionMismatch` instead of panicking inside ndarray.

use ndarray::{Array1, Array2};

use crate::constants::Kalman;
use crate::error::{KalmanError, Result};
use crate::types::{all_finite, expect_len, expect_shape, try_inverse, Matrix, StateVec};

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub x_bar: StateVec,
    pub p_bar: Matrix,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Posterior {
    pub x: StateVec,
    pub p: Matrix,
}

/// `x_bar = F·x`, `P_bar = F·P·Fᵗ + Q`
pub fn predict(x: &StateVec, p: &Matrix, f: &Matrix, q: &Matrix) -> Result<Prediction> {
    let n = x.len();
    expect_shape(Kalman::P, p, (n, n))?;
    expect_shape(Kalman::F, f, (n, n))?;
    expect_shape(Kalman::Q, q, (n, n))?;

    let x_bar = f.dot(x);
    let p_bar = f.dot(p).dot(&f.t()) + q;

    Ok(Prediction { x_bar, p_bar })
}

/// Measurement update.
///
/// ```text
/// y = z - H·x_bar
/// S = H·P_bar·Hᵗ + R
/// K = P_bar·Hᵗ·S⁻¹
/// x = x_bar + K·y
/// P = (I - K·H)·P_bar
/// ```
///
/// Fails with `SingularMatrix` when `S` cannot be inverted or when NaN/Inf
/// shows up in `S`, `x` or `P`. The step index of the error is 0; the driver
/// rewrites it with [`KalmanError::at_step`].
pub fn update(
    x_bar: &StateVec,
    p_bar: &Matrix,
    z: &Array1<f64>,
    h: &Matrix,
    r: &Matrix,
    num_params: usize,
) -> Result<Posterior> {
    let m = z.len();
    expect_len(Kalman::X, x_bar, num_params)?;
    expect_shape(Kalman::P, p_bar, (num_params, num_params))?;
    expect_shape(Kalman::H, h, (m, num_params))?;
    expect_shape(Kalman::R, r, (m, m))?;

    let identity = Array2::<f64>::eye(num_params);

    let y = z - &h.dot(x_bar);
    let h_t = h.t();
    let s = h.dot(p_bar).dot(&h_t) + r;
    if !all_finite(s.iter()) {
        return Err(KalmanError::singular(0, "innovation covariance is not finite"));
    }

    let s_inv = try_inverse(&s)
        .ok_or_else(|| KalmanError::singular(0, "innovation covariance is singular"))?;
    let k = p_bar.dot(&h_t).dot(&s_inv);

    let x = x_bar + &k.dot(&y);
    let p = (identity - &k.dot(h)).dot(p_bar);

    if !all_finite(x.iter()) || !all_finite(p.iter()) {
        return Err(KalmanError::singular(0, "posterior is not finite"));
    }

    Ok(Posterior { x, p })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::is_symmetric;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, array};

    #[test]
    fn test_predict_identity_adds_noise() {
        let x = arr1(&[1.0, 2.0, 3.0]);
        let p = Array2::<f64>::eye(3);
        let f = Array2::<f64>::eye(3);
        let q = Array2::<f64>::eye(3) * 0.01;

        let Prediction { x_bar, p_bar } = predict(&x, &p, &f, &q).unwrap();
        assert_eq!(x_bar, x);
        assert_abs_diff_eq!(p_bar[[0, 0]], 1.01, epsilon = 1e-12);
        assert_eq!(p_bar[[0, 1]], 0.0);
    }

    #[test]
    fn test_predict_keeps_covariance_symmetric() {
        let x = arr1(&[0.5, -1.0, 2.0]);
        let p = array![[2.0, 0.3, 0.1], [0.3, 1.5, -0.2], [0.1, -0.2, 0.8]];
        let f = array![[1.0, 0.7, 0.0], [0.2, 0.9, 0.4], [-0.3, 0.0, 1.1]];
        let q = array![[0.01, 0.002, 0.0], [0.002, 0.02, 0.0], [0.0, 0.0, 0.03]];

        let prediction = predict(&x, &p, &f, &q).unwrap();
        assert!(is_symmetric(&prediction.p_bar, 1e-12));
    }

    #[test]
    fn test_predict_rejects_wrong_transition() {
        let x = arr1(&[0.0, 0.0, 0.0]);
        let p = Array2::<f64>::eye(3);
        let f = Array2::<f64>::eye(4);
        let q = Array2::<f64>::zeros((3, 3));

        let err = predict(&x, &p, &f, &q).unwrap_err();
        assert!(matches!(
            err,
            KalmanError::DimensionMismatch { matrix: Kalman::F, .. }
        ));
    }

    #[test]
    fn test_update_scalar_gain() {
        // Scalar case: K = P/(P+R) = 1/(1+1) = 0.5
        let x_bar = arr1(&[0.0]);
        let p_bar = array![[1.0]];
        let z = arr1(&[2.0]);
        let h = array![[1.0]];
        let r = array![[1.0]];

        let Posterior { x, p } = update(&x_bar, &p_bar, &z, &h, &r, 1).unwrap();
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[[0, 0]], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_update_only_moves_observed_component() {
        let x_bar = arr1(&[0.0, 5.0, -1.0]);
        let p_bar = Array2::<f64>::eye(3);
        let z = arr1(&[1.0]);
        let h = array![[1.0, 0.0, 0.0]];
        let r = array![[0.1]];

        let Posterior { x, p } = update(&x_bar, &p_bar, &z, &h, &r, 3).unwrap();
        assert_abs_diff_eq!(x[0], 1.0 / 1.1, epsilon = 1e-12);
        assert_eq!(x[1], 5.0);
        assert_eq!(x[2], -1.0);
        assert_abs_diff_eq!(p[[0, 0]], 0.1 / 1.1, epsilon = 1e-12);
        assert_eq!(p[[1, 1]], 1.0);
    }

    #[test]
    fn test_zero_innovation_covariance_is_singular() {
        // H·P_bar·Hᵗ = 0 and R = 0 gives S = [[0]].
        let x_bar = arr1(&[1.0, 0.0]);
        let p_bar = array![[0.0, 0.0], [0.0, 1.0]];
        let z = arr1(&[1.0]);
        let h = array![[1.0, 0.0]];
        let r = array![[0.0]];

        let err = update(&x_bar, &p_bar, &z, &h, &r, 2).unwrap_err();
        assert!(matches!(err, KalmanError::SingularMatrix { .. }));
    }

    #[test]
    fn test_non_finite_noise_is_reported() {
        let x_bar = arr1(&[0.0]);
        let p_bar = array![[1.0]];
        let z = arr1(&[1.0]);
        let h = array![[1.0]];
        let r = array![[f64::NAN]];

        let err = update(&x_bar, &p_bar, &z, &h, &r, 1).unwrap_err();
        assert!(matches!(err, KalmanError::SingularMatrix { .. }));
    }

    #[test]
    fn test_update_rejects_wide_observation() {
        let x_bar = arr1(&[0.0, 0.0, 0.0]);
        let p_bar = Array2::<f64>::eye(3);
        let z = arr1(&[1.0]);
        let h = array![[1.0, 0.0, 0.0, 0.0]];
        let r = array![[0.1]];

        let err = update(&x_bar, &p_bar, &z, &h, &r, 3).unwrap_err();
        assert_eq!(err, KalmanError::mismatch(Kalman::H, (1, 3), (1, 4)));
    }
}
