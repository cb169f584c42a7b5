//! Error types for epoloader.

use std::io;
use thiserror::Error;

/// Result type for epoloader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for epoloader operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// EPO file header does not match any known layout.
    #[error("Invalid EPO file format: {0}")]
    InvalidFormat(String),

    /// EPO file size is not a whole number of sets.
    #[error("File size {size} is not a multiple of the EPO set size {set_size}")]
    SizeMismatch {
        /// Total file size in bytes.
        size: u64,
        /// Size of one EPO set for the detected file type.
        set_size: u64,
    },

    /// Terminal attribute query or restore failed.
    #[error("Port configuration error: {0}")]
    PortConfig(String),

    /// No acknowledgment after exhausting all send attempts.
    #[error("No acknowledgment for {command} after {attempts} attempts")]
    AckTimeout {
        /// The command payload that went unacknowledged.
        command: String,
        /// Total number of send attempts made.
        attempts: u32,
    },

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation stopped by an interrupt request.
    #[error("Upload interrupted")]
    Interrupted,
}
