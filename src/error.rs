// Error taxonomy for the audit log.
//
// Write-path callers degrade on most of these (a missing or incomplete
// history entry must never fail the mutation being audited); read-path
// callers surface them, since returning wrong reconstructed content is
// worse than returning an explicit failure.

use crate::identity::ResourceIdentity;

/// All errors produced by the audit log subsystem.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Input bytes are not valid UTF-8 and cannot be diffed. The bundled
    /// write path never returns this — it degrades to a lossy snapshot —
    /// so the variant is reserved for store backends and strict validation
    /// boundaries that reject undecodable payloads outright.
    #[error("input is not valid UTF-8 text")]
    InvalidEncoding,

    /// A payload tripped a size guard, either at encode time or when a
    /// record holding a too-large sentinel delta is materialized.
    #[error("payload too large: {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// A delta could not be fully applied to its base. The reconstructed
    /// content is untrusted and is discarded rather than returned.
    #[error("delta did not apply cleanly: {detail}")]
    PartialApplyFailure { detail: String },

    /// Walking predecessors from the given record never reached a snapshot.
    /// This is a data-integrity defect, not a normal miss.
    #[error("no snapshot found in the chain behind record {sequence} for {identity}")]
    BrokenChain {
        sequence: u64,
        identity: ResourceIdentity,
    },

    /// The requested record does not exist, or is outside the caller's
    /// cluster scope.
    #[error("history record {sequence} not found")]
    NotFound { sequence: u64 },

    /// A backend-specific storage failure (connection, serialization, ...).
    #[error("storage backend error: {0}")]
    Store(String),
}
