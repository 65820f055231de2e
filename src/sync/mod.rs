pub mod engine;
pub mod error;
pub mod worker;

pub use engine::{SyncEngine, RAW_DATA_NODE};
pub use error::{SyncErrorKind, SyncResult};
pub use worker::{sync_loop, RetryPolicy, SyncStats};
