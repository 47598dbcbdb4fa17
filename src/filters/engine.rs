//! Sequential fold of the Kalman filter over one point's records.

use log::{debug, warn};
use ndarray::arr1;

use super::context::{PostHook, PostStepContext, PreHook, StateSpaceModel, StepContext};
use super::kalman::{predict, update, Posterior, Prediction};
use crate::constants::{Kalman, MASK_VALUE, NUM_MEASURES};
use crate::dates::{self, DateFormat};
use crate::error::{KalmanError, Result};
use crate::types::{
    expect_len, expect_shape, is_symmetric, AuxOutput, InitialState, Matrix, Observation,
    StateVec, StepResult,
};

/// Relative tolerance for the covariance symmetry warning.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

pub struct KalmanFilter<M: StateSpaceModel> {
    model: M,
    num_params: usize,
    measurement_band: Option<String>,
    mask_value: f64,
    preprocess: Option<PreHook>,
    postprocess: Option<PostHook>,
}

impl<M: StateSpaceModel> KalmanFilter<M> {
    pub fn new(model: M, num_params: usize) -> Result<Self> {
        if num_params == 0 {
            return Err(KalmanError::InvalidParameters(
                "num_params must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            model,
            num_params,
            measurement_band: None,
            mask_value: MASK_VALUE,
            preprocess: None,
            postprocess: None,
        })
    }

    /// Band holding the measurement. Defaults to the first band of the first
    /// record.
    pub fn with_measurement_band(mut self, band: impl Into<String>) -> Self {
        self.measurement_band = Some(band.into());
        self
    }

    /// Measurements must be strictly greater than this value to be used.
    pub fn with_mask_value(mut self, mask_value: f64) -> Self {
        self.mask_value = mask_value;
        self
    }

    pub fn with_preprocess<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StepContext<'_>) -> Vec<AuxOutput> + Send + Sync + 'static,
    {
        self.preprocess = Some(Box::new(hook));
        self
    }

    pub fn with_postprocess<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PostStepContext<'_>) -> Vec<AuxOutput> + Send + Sync + 'static,
    {
        self.postprocess = Some(Box::new(hook));
        self
    }

    pub fn num_params(&self) -> usize {
        self.num_params
    }

    pub fn mask_value(&self) -> f64 {
        self.mask_value
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Filter `records` (time ascending) starting from `seed`.
    ///
    /// Returns one result per record; the seed itself is not part of the
    /// output. The first failing step aborts the whole series.
    pub fn run(&self, records: &[Observation], seed: &InitialState) -> Result<Vec<StepResult>> {
        let n = self.num_params;
        expect_len(Kalman::X, &seed.x, n)?;
        expect_shape(Kalman::P, &seed.p, (n, n))?;

        let band = match records.first() {
            Some(first) => self.resolve_band(first)?,
            None => return Ok(Vec::new()),
        };

        let mut results: Vec<StepResult> = Vec::with_capacity(records.len());
        for (step, record) in records.iter().enumerate() {
            let result = {
                let (x_prev, p_prev, prior_aux) = match results.last() {
                    Some(prev) => (&prev.x, &prev.p, prev.aux.as_slice()),
                    None => (&seed.x, &seed.p, seed.extra.as_slice()),
                };
                self.step(step, record, &band, x_prev, p_prev, prior_aux)?
            };
            results.push(result);
        }

        Ok(results)
    }

    fn resolve_band(&self, first: &Observation) -> Result<String> {
        match &self.measurement_band {
            Some(band) => Ok(band.clone()),
            None => first
                .first_band()
                .map(|b| b.name.clone())
                .ok_or(KalmanError::EmptyRecord(0)),
        }
    }

    /// Check F, Q, H, R against `num_params` before any arithmetic.
    fn check_parameters(&self, f: &Matrix, q: &Matrix, h: &Matrix, r: &Matrix) -> Result<()> {
        let n = self.num_params;
        expect_shape(Kalman::F, f, (n, n))?;
        expect_shape(Kalman::Q, q, (n, n))?;
        expect_shape(Kalman::H, h, (NUM_MEASURES, n))?;
        expect_shape(Kalman::R, r, (NUM_MEASURES, NUM_MEASURES))
    }

    fn step(
        &self,
        step: usize,
        record: &Observation,
        band: &str,
        x_prev: &StateVec,
        p_prev: &Matrix,
        prior_aux: &[AuxOutput],
    ) -> Result<StepResult> {
        let measurement = record.band(band).ok_or_else(|| KalmanError::UnknownBand {
            band: band.to_string(),
            step,
        })?;
        let t = dates::fractional_year(record.timestamp)?;

        let ctx = StepContext {
            step,
            x_prev,
            p_prev,
            prior_aux,
            measurement,
            timestamp: record.timestamp,
            t,
            record,
        };

        let pre_results = self
            .preprocess
            .as_ref()
            .map(|hook| hook(&ctx))
            .unwrap_or_default();

        let f = self.model.transition(&ctx);
        let q = self.model.process_noise(&ctx);
        let h = self.model.observation(&ctx);
        let r = self.model.measurement_noise(&ctx);
        self.check_parameters(&f, &q, &h, &r)?;

        let valid = measurement.is_finite() && measurement > self.mask_value;

        let Prediction { x_bar, p_bar } = predict(x_prev, p_prev, &f, &q)?;
        // NaN/Inf cannot go through the update; use a zero innovation instead.
        let z = if measurement.is_finite() {
            arr1(&[measurement])
        } else {
            h.dot(&x_bar)
        };
        let Posterior { x, p } =
            update(&x_bar, &p_bar, &z, &h, &r, self.num_params).map_err(|e| e.at_step(step))?;

        let post_results = self
            .postprocess
            .as_ref()
            .map(|hook| {
                hook(&PostStepContext {
                    ctx: &ctx,
                    x_bar: &x_bar,
                    p_bar: &p_bar,
                    x: &x,
                    p: &p,
                    h: &h,
                })
            })
            .unwrap_or_default();

        let (x, p) = if valid {
            (x, p)
        } else {
            debug!("[KALMAN] step {} masked (z = {}), carrying prior state", step, measurement);
            (x_prev.clone(), p_prev.clone())
        };

        let scale = p.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        if !is_symmetric(&p, SYMMETRY_TOLERANCE * scale) {
            warn!("[KALMAN] covariance lost symmetry at step {}", step);
        }

        let estimate = h.dot(&x)[0];
        let estimate_predicted = h.dot(&x_bar)[0];
        let frac_of_year = dates::convert_date(record.timestamp, DateFormat::FractionalYear)?;

        let mut aux = pre_results;
        aux.extend(post_results);

        Ok(StepResult {
            z: measurement,
            x,
            p,
            estimate,
            estimate_predicted,
            timestamp: record.timestamp,
            frac_of_year,
            aux,
            provenance: record.provenance.clone(),
            sensor: record.sensor,
        })
    }
}
