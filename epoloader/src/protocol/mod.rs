//! Wire protocol implementations: binary upload frames and PMTK sentences.

pub mod frame;
pub mod nmea;

// Re-export common types
pub use frame::{EpoFrame, FINAL_SEQUENCE, crc8_xor};
pub use nmea::{AckStatus, checksum, scan_ack, sentence};
