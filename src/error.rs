//! Error types for the gyro logger

use thiserror::Error;

/// Error type for bus transport and recorder operations
#[derive(Error, Debug)]
pub enum GyroError {
    /// The underlying bus resource could not be acquired
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A queued write was not accepted by the bus
    #[error("transmit to 0x{address:02X} failed: {detail}")]
    Transmit { address: u8, detail: String },

    /// A read transaction returned fewer bytes than requested
    #[error("short read from 0x{address:02X}: expected {expected} bytes, got {actual}")]
    ShortRead {
        address: u8,
        expected: usize,
        actual: usize,
    },

    /// Invalid WHO_AM_I response
    #[error("invalid WHO_AM_I response from 0x{address:02X}: expected 0x6B, got 0x{found:02X}")]
    InvalidDeviceId { address: u8, found: u8 },

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Filesystem or thread error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gyro logger operations
pub type Result<T> = std::result::Result<T, GyroError>;
