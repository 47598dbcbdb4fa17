//! Typed step context handed to parameter functions and hooks.

use crate::types::{AuxOutput, Matrix, Observation, StateVec};

/// Values available before predict/update run.
#[derive(Clone, Copy, Debug)]
pub struct StepContext<'a> {
    /// 0-based position in the input sequence
    pub step: usize,
    /// Previous posterior state (seed state on step 0)
    pub x_prev: &'a StateVec,
    /// Previous posterior covariance (seed covariance on step 0)
    pub p_prev: &'a Matrix,
    /// Auxiliary outputs stored on the previous snapshot (seed extras on step 0)
    pub prior_aux: &'a [AuxOutput],
    /// Selected band value for this step, sentinel included
    pub measurement: f64,
    /// Unix milliseconds
    pub timestamp: i64,
    /// Elapsed time as a fractional year
    pub t: f64,
    pub record: &'a Observation,
}

/// Values available once predict/update have run.
#[derive(Clone, Copy, Debug)]
pub struct PostStepContext<'a> {
    pub ctx: &'a StepContext<'a>,
    pub x_bar: &'a StateVec,
    pub p_bar: &'a Matrix,
    /// Updated state, before the missing-measurement mask is applied
    pub x: &'a StateVec,
    pub p: &'a Matrix,
    pub h: &'a Matrix,
}

/// Step-indexed producers of the filter matrices.
///
/// Implementations must be pure: the same context always yields the same
/// matrices.
pub trait StateSpaceModel: Send + Sync {
    /// Process model `F` (n x n)
    fn transition(&self, ctx: &StepContext<'_>) -> Matrix;
    /// Process noise `Q` (n x n)
    fn process_noise(&self, ctx: &StepContext<'_>) -> Matrix;
    /// Observation model `H` (1 x n)
    fn observation(&self, ctx: &StepContext<'_>) -> Matrix;
    /// Measurement noise `R` (1 x 1)
    fn measurement_noise(&self, ctx: &StepContext<'_>) -> Matrix;
}

pub type ParamFn = Box<dyn Fn(&StepContext<'_>) -> Matrix + Send + Sync>;

/// State-space model assembled from four closures.
pub struct FnModel {
    f: ParamFn,
    q: ParamFn,
    h: ParamFn,
    r: ParamFn,
}

impl FnModel {
    pub fn new<F, Q, H, R>(f: F, q: Q, h: H, r: R) -> Self
    where
        F: Fn(&StepContext<'_>) -> Matrix + Send + Sync + 'static,
        Q: Fn(&StepContext<'_>) -> Matrix + Send + Sync + 'static,
        H: Fn(&StepContext<'_>) -> Matrix + Send + Sync + 'static,
        R: Fn(&StepContext<'_>) -> Matrix + Send + Sync + 'static,
    {
        FnModel {
            f: Box::new(f),
            q: Box::new(q),
            h: Box::new(h),
            r: Box::new(r),
        }
    }

    /// Time-invariant model
    pub fn constant(f: Matrix, q: Matrix, h: Matrix, r: Matrix) -> Self {
        FnModel::new(
            move |_| f.clone(),
            move |_| q.clone(),
            move |_| h.clone(),
            move |_| r.clone(),
        )
    }
}

impl StateSpaceModel for FnModel {
    fn transition(&self, ctx: &StepContext<'_>) -> Matrix {
        (self.f)(ctx)
    }

    fn process_noise(&self, ctx: &StepContext<'_>) -> Matrix {
        (self.q)(ctx)
    }

    fn observation(&self, ctx: &StepContext<'_>) -> Matrix {
        (self.h)(ctx)
    }

    fn measurement_noise(&self, ctx: &StepContext<'_>) -> Matrix {
        (self.r)(ctx)
    }
}

/// Runs before predict; sees only the prior.
pub type PreHook = Box<dyn Fn(&StepContext<'_>) -> Vec<AuxOutput> + Send + Sync>;

/// Runs after update, before masking.
pub type PostHook = Box<dyn Fn(&PostStepContext<'_>) -> Vec<AuxOutput> + Send + Sync>;
