//! Error types for the distributed row table.

use thiserror::Error;

/// Result type alias for rowmesh operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
///
/// There is no retry path for collective errors: a failed collective leaves
/// no well-defined partial state to resume from, so callers must treat any
/// [`Error::Collective`] as fatal for the whole run.
#[derive(Error, Debug)]
pub enum Error {
    /// Local misuse of the API (duplicate insert, missing key, protection
    /// violations). Fatal to the calling process.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// Divergence detected during a collective operation. Fatal to the whole
    /// run on every participating process.
    #[error("collective error: {0}")]
    Collective(#[from] CollectiveError),

    /// Invalid construction-time configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Local API misuse.
#[derive(Error, Debug)]
pub enum UsageError {
    /// The key is already present; one row per distinct key.
    #[error("key already present in table")]
    DuplicateKey,

    /// The key was required to be present but is not.
    #[error("key not found in table")]
    KeyNotFound,

    /// A slot that must be clearable still carries a positive pin count.
    #[error("row {index} is still protected at level {level}")]
    StillProtected { index: usize, level: u64 },

    /// Release called on a slot with no protection holds.
    #[error("cannot release unprotected row {index}")]
    ReleaseUnprotected { index: usize },
}

/// Collective-consistency failures.
///
/// Detection is two-sided: the local condition is checked, and the verdict is
/// AND-reduced across all processes so that no process silently proceeds
/// while a peer aborts.
#[derive(Error, Debug)]
pub enum CollectiveError {
    /// The local receive buffer could not cover the negotiated transfer.
    #[error("receive buffer not allocated for the negotiated transfer volume")]
    BufferUnallocated,

    /// Bytes this process sent to itself differ from the bytes found in its
    /// own receive segment; the transfer is structurally corrupt.
    #[error("self-addressed segment mismatch: sent {sent_bytes} bytes, received {received_bytes}")]
    SelfEchoMismatch {
        sent_bytes: usize,
        received_bytes: usize,
    },

    /// The AND-reduced consistency verdict came back false because of a
    /// failure on another process.
    #[error("a peer reported an inconsistent collective state")]
    PeerInconsistency,

    /// A received segment does not match its negotiated byte count.
    #[error("segment size mismatch from rank {source_rank}: expected {expected} bytes, got {got}")]
    SizeMismatch {
        source_rank: usize,
        expected: usize,
        got: usize,
    },

    /// A collective primitive was called with a malformed contribution.
    #[error("collective contribution has wrong length: expected {expected}, got {got}")]
    BadContribution { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(UsageError::StillProtected { index: 3, level: 2 });
        assert_eq!(
            err.to_string(),
            "usage error: row 3 is still protected at level 2"
        );

        let err = Error::from(CollectiveError::SelfEchoMismatch {
            sent_bytes: 64,
            received_bytes: 0,
        });
        assert!(err.to_string().contains("self-addressed"));
    }
}
