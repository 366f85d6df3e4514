//! Error types for the bridge
//!
//! Only resource and native-runtime failures are errors. Benign races (an
//! event after teardown, a handler that no longer resolves) are silent
//! no-ops and never produce one of these values.

use crate::record::DispatchRecord;
use hostview_vm::VmError;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Failure reported by the native runtime.
///
/// Each variant carries the numeric code scripts see (see [`NativeError::code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    /// A required native library is missing
    #[error("missing dependency")]
    MissingDependency,

    /// The operation was canceled (for example the post queue is full)
    #[error("operation canceled")]
    Canceled,

    /// The runtime is not in a state that allows the operation
    #[error("invalid state")]
    InvalidState,

    /// An argument was rejected
    #[error("invalid argument")]
    InvalidArgument,

    /// Unspecified failure
    #[error("unspecified error")]
    Unspecified,

    /// The name is already bound
    #[error("duplicate")]
    Duplicate,

    /// The name or id is not known
    #[error("not found")]
    NotFound,
}

impl NativeError {
    /// Code returned to scripts for success
    pub const OK: i32 = 0;

    /// Every variant, in code order
    pub const ALL: [NativeError; 7] = [
        NativeError::MissingDependency,
        NativeError::Canceled,
        NativeError::InvalidState,
        NativeError::InvalidArgument,
        NativeError::Unspecified,
        NativeError::Duplicate,
        NativeError::NotFound,
    ];

    /// Numeric code exposed to scripts
    pub fn code(self) -> i32 {
        match self {
            NativeError::MissingDependency => -5,
            NativeError::Canceled => -4,
            NativeError::InvalidState => -3,
            NativeError::InvalidArgument => -2,
            NativeError::Unspecified => -1,
            NativeError::Duplicate => 1,
            NativeError::NotFound => 2,
        }
    }

    /// Map a numeric code back to an error; `None` for success or unknown codes
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }

    /// Lower-case identifier used in script constant names
    pub fn ident(self) -> &'static str {
        match self {
            NativeError::MissingDependency => "missing_dependency",
            NativeError::Canceled => "canceled",
            NativeError::InvalidState => "invalid_state",
            NativeError::InvalidArgument => "invalid_argument",
            NativeError::Unspecified => "unspecified",
            NativeError::Duplicate => "duplicate",
            NativeError::NotFound => "not_found",
        }
    }
}

/// A post the native runtime refused.
///
/// The record is handed back so the caller can release it; it was never
/// queued and will never run.
#[derive(Debug)]
pub struct Rejected {
    /// Why the post failed
    pub error: NativeError,
    /// The record that was not accepted
    pub record: DispatchRecord,
}

/// Errors surfaced to callers of the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Allocation of a record or its owned string failed
    #[error("out of memory")]
    OutOfMemory,

    /// The native runtime refused the operation
    #[error("native runtime error: {0}")]
    Native(#[from] NativeError),

    /// The VM reported an error
    #[error("VM error: {0}")]
    Vm(#[from] VmError),

    /// The VM this object belongs to has been dropped
    #[error("VM is no longer available")]
    VmUnavailable,
}

impl BridgeError {
    /// Numeric code for scripts, when the error came from the native runtime
    pub fn native_code(&self) -> Option<i32> {
        match self {
            BridgeError::Native(e) => Some(e.code()),
            _ => None,
        }
    }
}
