// Privacy Guard — Top-level error types
//
// Aggregates the per-layer errors (codec, transport, store, config, monitor, notify)
// into a single enum for the application boundary, and defines the stable
// integer result codes carried on the wire.

use std::fmt;

use thiserror::Error;

/// Stable result codes shared by the daemon, the client and the CLI.
///
/// The numeric values are part of the wire protocol: every RPC reply starts
/// with one of these encoded as an `I32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Success = 0,
    NotInitialized = -10,
    InvalidParameter = -11,
    OutOfMemory = -12,
    IoError = -13,
    NoData = -14,
    DbError = -15,
    IpcError = -16,
    InvalidState = -17,
    SystemError = -18,
    UserNotConsented = -19,
    Unknown = -0x99,
}

impl ResultCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a wire value back to a code. Unrecognized values become `Unknown`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Success,
            -10 => Self::NotInitialized,
            -11 => Self::InvalidParameter,
            -12 => Self::OutOfMemory,
            -13 => Self::IoError,
            -14 => Self::NoData,
            -15 => Self::DbError,
            -16 => Self::IpcError,
            -17 => Self::InvalidState,
            -18 => Self::SystemError,
            -19 => Self::UserNotConsented,
            _ => Self::Unknown,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::NotInitialized => "not initialized",
            Self::InvalidParameter => "invalid parameter",
            Self::OutOfMemory => "out of memory",
            Self::IoError => "I/O error",
            Self::NoData => "no data",
            Self::DbError => "database error",
            Self::IpcError => "IPC error",
            Self::InvalidState => "invalid state",
            Self::SystemError => "system error",
            Self::UserNotConsented => "user not consented",
            Self::Unknown => "unknown error",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

/// Top-level error type for all Privacy Guard operations.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Codec error: {0}")]
    Codec(#[from] crate::gateway::CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::gateway::TransportError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] crate::ingest::MonitorError),

    #[error("Notification error: {0}")]
    Notify(#[from] crate::notify::NotifyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The daemon answered with a non-success result code.
    #[error("Daemon returned {0}")]
    Rejected(ResultCode),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Privacy checker is not initialized")]
    NotInitialized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    /// The result code this error is reported as, on the wire and as a CLI
    /// exit status.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Codec(_) => ResultCode::IpcError,
            Self::Transport(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Config(_) => ResultCode::InvalidParameter,
            Self::Monitor(_) => ResultCode::SystemError,
            Self::Notify(_) => ResultCode::IpcError,
            Self::Io(_) => ResultCode::IoError,
            Self::Rejected(code) => *code,
            Self::InvalidParameter(_) => ResultCode::InvalidParameter,
            Self::NotInitialized => ResultCode::NotInitialized,
            Self::Internal(_) => ResultCode::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes_are_stable() {
        assert_eq!(ResultCode::Success.as_i32(), 0);
        assert_eq!(ResultCode::NoData.as_i32(), -14);
        assert_eq!(ResultCode::UserNotConsented.as_i32(), -19);
        assert_eq!(ResultCode::Unknown.as_i32(), -153);
    }

    #[test]
    fn test_from_i32_round_trips_known_codes() {
        for code in [
            ResultCode::Success,
            ResultCode::NotInitialized,
            ResultCode::InvalidParameter,
            ResultCode::OutOfMemory,
            ResultCode::IoError,
            ResultCode::NoData,
            ResultCode::DbError,
            ResultCode::IpcError,
            ResultCode::InvalidState,
            ResultCode::SystemError,
            ResultCode::UserNotConsented,
            ResultCode::Unknown,
        ] {
            assert_eq!(ResultCode::from_i32(code.as_i32()), code);
        }
    }

    #[test]
    fn test_unrecognized_code_maps_to_unknown() {
        assert_eq!(ResultCode::from_i32(42), ResultCode::Unknown);
        assert_eq!(ResultCode::from_i32(-1), ResultCode::Unknown);
    }

    #[test]
    fn test_guard_error_codes() {
        assert_eq!(
            GuardError::Rejected(ResultCode::DbError).code(),
            ResultCode::DbError
        );
        assert_eq!(
            GuardError::InvalidParameter("x".into()).code(),
            ResultCode::InvalidParameter
        );
        assert_eq!(GuardError::NotInitialized.code(), ResultCode::NotInitialized);
    }
}
