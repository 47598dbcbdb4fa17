//! Harmonic regression models over fractional-year time.
//!
//! State vector (coefficients, in order):
//! INTP, [SLP], COS, SIN, [COS2, SIN2], [COS3, SIN3]
//!
//! The coefficients are modelled as a random walk (`F = I`), observed through
//! `H(t) = [1, t, cos(ωt), sin(ωt), cos(2ωt), sin(2ωt), ...]`.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::constants::{Harmonic, KalmanModel, FREQUENCY};
use crate::error::{KalmanError, Result};
use crate::filters::{KalmanFilter, StateSpaceModel, StepContext};
use crate::types::{InitialState, Matrix};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarmonicModel {
    model: KalmanModel,
    /// Diagonal of Q, one entry per coefficient
    process_noise: Vec<f64>,
    /// R
    measurement_noise: f64,
    /// ω, radians per year
    frequency: f64,
}

impl HarmonicModel {
    /// Model with the same process noise on every coefficient.
    pub fn new(model: KalmanModel, q: f64, r: f64) -> Self {
        HarmonicModel {
            model,
            process_noise: vec![q; model.num_params()],
            measurement_noise: r,
            frequency: FREQUENCY,
        }
    }

    /// Per-coefficient process noise; one value per state entry.
    pub fn with_process_noise(mut self, q: Vec<f64>) -> Result<Self> {
        if q.len() != self.num_params() {
            return Err(KalmanError::InvalidParameters(format!(
                "{:?} needs {} process noise values, got {}",
                self.model,
                self.num_params(),
                q.len()
            )));
        }
        self.process_noise = q;
        Ok(self)
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn kalman_model(&self) -> KalmanModel {
        self.model
    }

    pub fn num_params(&self) -> usize {
        self.model.num_params()
    }

    /// Column names of the state vector.
    pub fn labels(&self) -> Vec<String> {
        self.model
            .harmonic_flags()
            .iter()
            .map(|h| h.tag().to_string())
            .collect()
    }

    /// `H(t)`, shape 1 x n
    pub fn observation_row(&self, t: f64) -> Matrix {
        let values: Vec<f64> = self
            .model
            .harmonic_flags()
            .iter()
            .map(|flag| {
                let w = self.frequency * t;
                match flag {
                    Harmonic::Intercept => 1.0,
                    Harmonic::Slope => t,
                    Harmonic::Cos => w.cos(),
                    Harmonic::Sin => w.sin(),
                    Harmonic::Cos2 => (2.0 * w).cos(),
                    Harmonic::Sin2 => (2.0 * w).sin(),
                    Harmonic::Cos3 => (3.0 * w).cos(),
                    Harmonic::Sin3 => (3.0 * w).sin(),
                }
            })
            .collect();
        Array1::from(values).insert_axis(Axis(0))
    }

    /// Zero coefficients with `P0 = p0 · I`.
    pub fn initial_state(&self, p0: f64) -> InitialState {
        let n = self.num_params();
        InitialState::new(Array1::zeros(n), Array2::eye(n) * p0)
    }

    /// Filter sized for this model.
    pub fn into_filter(self) -> Result<KalmanFilter<Self>> {
        let n = self.num_params();
        KalmanFilter::new(self, n)
    }
}

impl StateSpaceModel for HarmonicModel {
    fn transition(&self, _ctx: &StepContext<'_>) -> Matrix {
        Array2::eye(self.num_params())
    }

    fn process_noise(&self, _ctx: &StepContext<'_>) -> Matrix {
        Array2::from_diag(&Array1::from(self.process_noise.clone()))
    }

    fn observation(&self, ctx: &StepContext<'_>) -> Matrix {
        self.observation_row(ctx.t)
    }

    fn measurement_noise(&self, _ctx: &StepContext<'_>) -> Matrix {
        Array2::from_elem((1, 1), self.measurement_noise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;
    use approx::assert_abs_diff_eq;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_observation_row_unimodal() {
        let model = HarmonicModel::new(KalmanModel::Unimodal, 0.01, 0.1);
        let h = model.observation_row(0.25);
        assert_eq!(h.dim(), (1, 3));
        assert_eq!(h[[0, 0]], 1.0);
        assert_abs_diff_eq!(h[[0, 1]], (FREQUENCY * 0.25).cos(), epsilon = 1e-15);
        assert_abs_diff_eq!(h[[0, 2]], (FREQUENCY * 0.25).sin(), epsilon = 1e-15);
    }

    #[test]
    fn test_observation_row_with_slope_and_modes() {
        let model = HarmonicModel::new(KalmanModel::TrimodalWithSlope, 0.01, 0.1)
            .with_frequency(std::f64::consts::TAU);
        let h = model.observation_row(2016.125);
        assert_eq!(h.dim(), (1, 8));
        assert_eq!(h[[0, 1]], 2016.125);
        // 2ωt is a quarter turn past a whole number of cycles.
        assert_abs_diff_eq!(h[[0, 4]], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(h[[0, 5]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_labels_match_state() {
        let model = HarmonicModel::new(KalmanModel::Bimodal, 0.01, 0.1);
        assert_eq!(model.labels(), vec!["INTP", "COS", "SIN", "COS2", "SIN2"]);
    }

    #[test]
    fn test_process_noise_length_checked() {
        let model = HarmonicModel::new(KalmanModel::Unimodal, 0.01, 0.1);
        assert!(model.clone().with_process_noise(vec![0.1, 0.2]).is_err());
        let model = model.with_process_noise(vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(model.process_noise, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_filter_tracks_constant_signal() {
        let model = HarmonicModel::new(KalmanModel::Unimodal, 0.001, 0.01);
        let seed = model.initial_state(1.0);
        let filter = model.into_filter().unwrap();

        let records: Vec<Observation> = (0..36)
            .map(|i| {
                let ts = Utc
                    .with_ymd_and_hms(2016 + i / 12, 1 + (i % 12) as u32, 15, 0, 0, 0)
                    .unwrap()
                    .timestamp_millis();
                Observation::new(ts, &[("ndvi", 0.6)])
            })
            .collect();

        let results = filter.run(&records, &seed).unwrap();
        let last = results.last().unwrap();
        assert_abs_diff_eq!(last.estimate, 0.6, epsilon = 0.02);
        assert_abs_diff_eq!(last.x[0], 0.6, epsilon = 0.05);
    }
}
