pub mod accumulator;
pub mod worker;

pub use accumulator::BatchAccumulator;
pub use worker::{batching_loop, AccumulatorInput};
