use std::io;
use thiserror::Error;

use crate::status::DeviceStatus;

/// Failure to interpret a reply frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Unexpected command byte {0:#04x}")]
    UnexpectedCommand(u8),

    /// The frame is a short status reply where a data reply was expected
    #[error("Device replied with status: {0}")]
    DeviceStatus(DeviceStatus),

    #[error("Unknown status byte {0:#04x}")]
    UnknownStatus(u8),

    #[error("Parameter id mismatch: expected {expected}, received {received}")]
    ParamIdMismatch { expected: u16, received: u16 },

    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// The primary error type for a request/response cycle on the controller link.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial write did not accept the full {requested}-byte frame")]
    WriteFailed { requested: usize },

    #[error("Timeout after {ticks} ticks without a complete reply")]
    Timeout { ticks: u32 },

    #[error("No recognizable reply before timeout ({garbage} unframed bytes received)")]
    DecodeMismatch { garbage: usize },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// True for failures that may clear up by repeating the whole request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout { .. } | TransportError::DecodeMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_timeout() {
        let e = TransportError::Timeout { ticks: 2000 };
        assert_eq!(e.to_string(), "Timeout after 2000 ticks without a complete reply");
    }

    #[test]
    fn display_param_mismatch() {
        let e = DecodeError::ParamIdMismatch { expected: 11, received: 12 };
        assert_eq!(e.to_string(), "Parameter id mismatch: expected 11, received 12");
    }

    #[test]
    fn decode_error_converts() {
        let e: TransportError = DecodeError::UnexpectedCommand(0x99).into();
        assert!(matches!(e, TransportError::Decode(DecodeError::UnexpectedCommand(0x99))));
        assert!(!e.is_retryable());
    }

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(TransportError::Timeout { ticks: 1 }.is_retryable());
        assert!(TransportError::DecodeMismatch { garbage: 3 }.is_retryable());
        assert!(!TransportError::WriteFailed { requested: 4 }.is_retryable());
        assert!(!TransportError::Cancelled.is_retryable());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransportError>();
    }
}
