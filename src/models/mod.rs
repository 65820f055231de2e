pub mod account;
pub mod location;
pub mod sample;

pub use account::AccountKey;
pub use location::{LocationFix, PositionUpdate};
pub use sample::{Batch, RawSample, Vitals, BATCH_SIZE};
