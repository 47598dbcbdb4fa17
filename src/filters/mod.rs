pub mod context;
pub mod engine;
pub mod kalman;

pub use context::{FnModel, PostStepContext, StateSpaceModel, StepContext};
pub use engine::KalmanFilter;
pub use kalman::{predict, update, Posterior, Prediction};
