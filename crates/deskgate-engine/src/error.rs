//! Engine errors.
//!
//! Every rejection carries a stable machine-readable reason code via
//! [`EngineError::reason_code`]; the transport layer puts that code on the
//! wire unchanged.

use deskgate_types::SessionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid or expired credentials")]
    Authentication,

    #[error("no exclusive slot or session capacity available")]
    Capacity {
        /// Current exclusive holder, when that is what blocked the request.
        holder: Option<SessionId>,
    },

    #[error("unknown session {0}")]
    NotFound(SessionId),

    #[error("version conflict: expected {expected}, actual {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out-of-order sequence: expected {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("session does not hold exclusive access")]
    ExclusiveRequired {
        /// Who does, if anyone.
        holder: Option<SessionId>,
    },

    #[error("session is terminated")]
    SessionTerminated,

    #[error("desktop halted after a broken single-writer invariant")]
    ConsistencyFailure,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable reason code for the wire.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Authentication => "authentication_error",
            Self::Capacity { .. } => "capacity_error",
            Self::NotFound(_) => "not_found",
            Self::VersionConflict { .. } => "version_conflict",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::ExclusiveRequired { .. } => "exclusive_required",
            Self::SessionTerminated => "session_terminated",
            Self::ConsistencyFailure => "consistency_failure",
            Self::Other(_) => "internal_error",
        }
    }
}
