use serde::Serialize;
use thiserror::Error;

/// Why a synchronization call failed.
///
/// Engine operations never surface store errors directly; every failure is
/// reduced to one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncErrorKind {
    /// The durable per-record store failed.
    #[error("durable store operation failed")]
    NetworkError,
    /// The fast keyed store failed.
    #[error("fast store operation failed")]
    CommunicationProblem,
    /// No authenticated account to partition by.
    #[error("no authenticated account")]
    NoAccount,
}

impl SyncErrorKind {
    /// Whether trying the same call again later can succeed.
    pub fn is_transient(self) -> bool {
        !matches!(self, SyncErrorKind::NoAccount)
    }
}

/// Either the success payload or exactly one error kind.
pub type SyncResult<T = ()> = std::result::Result<T, SyncErrorKind>;
