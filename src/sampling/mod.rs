pub mod controller;
pub mod estimator;
pub mod loop_worker;
pub mod positioning;
pub mod state;

pub use controller::SamplingController;
pub use estimator::{estimate_period, SamplingPeriod, FAST_PERIOD, SLOW_PERIOD};
pub use loop_worker::AcquisitionTick;
pub use positioning::{PositioningService, UpdateSink};
pub use state::{CadenceDecision, SamplingState, HYSTERESIS_SECS};
