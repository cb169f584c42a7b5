//! # epoloader
//!
//! A library for uploading EPO (Extended Prediction Orbit) assistance data
//! to MediaTek GNSS receivers over a serial port.
//!
//! EPO files contain precomputed satellite orbit and clock predictions that
//! a receiver consumes to speed up its first fix. This crate provides:
//!
//! - EPO file classification (Type I / Type II) and layout derivation
//! - The proprietary binary upload frame format with its XOR checksum
//! - PMTK ASCII command formatting and acknowledgment handling
//! - A background-reader command channel with timeout and retry
//! - An upload orchestrator with guaranteed port/reader cleanup
//!
//! ## Example
//!
//! ```rust,no_run
//! use epoloader::{EpoLoader, LoaderOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = LoaderOptions {
//!         device: "/dev/ttyUSB0".to_string(),
//!         speed: 115200,
//!         input: Some("MTK14.EPO".into()),
//!         ..Default::default()
//!     };
//!
//!     let mut loader = EpoLoader::new(options);
//!     let report = loader.run(&mut |set, total, valid_from| {
//!         println!("Set {set}/{total}, valid from {valid_from} UTC");
//!     })?;
//!
//!     println!("{} sets sent", report.sets_sent);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod channel;
pub mod epo;
pub mod error;
pub mod gpstime;
pub mod loader;
pub mod port;
pub mod protocol;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupt_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

/// Tests that touch the process-wide interrupt flag hold this lock so
/// they cannot observe each other's toggles.
#[cfg(test)]
pub(crate) fn interrupt_test_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
    GUARD
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
pub use {
    channel::{AckState, CommandChannel},
    epo::{EpoFile, EpoLayout, SetKind, SUBFRAMES_PER_SET},
    error::{Error, Result},
    gpstime::{format_utc, gps_hour_to_utc},
    loader::{EpoLoader, LoaderOptions, UploadReport},
    port::{GnssPort, PortConfig},
    protocol::{
        frame::{EpoFrame, crc8_xor},
        nmea::{AckStatus, scan_ack, sentence},
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        let _guard = interrupt_test_guard();
        test_set_interrupted(false);
        assert!(!is_interrupt_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        let _guard = interrupt_test_guard();
        test_set_interrupted(true);
        assert!(is_interrupt_requested());

        test_set_interrupted(false);
        assert!(!is_interrupt_requested());
    }
}
