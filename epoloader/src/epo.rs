//! EPO file format detection and layout constants.
//!
//! EPO (Extended Prediction Orbit) files are a MediaTek binary format
//! carrying precomputed satellite orbit and clock data, organized as a
//! series of fixed-size sets, one per GPS hour.
//!
//! ## Layouts
//!
//! Two generations of the format exist, distinguished by where the first
//! satellite record repeats inside the header:
//!
//! | Kind    | Set size | Sat record | Frame length | Header match  |
//! |---------|----------|------------|--------------|---------------|
//! | Type I  | 1920     | 60         | 191          | `[0,3)==[60,63)` |
//! | Type II | 2304     | 72         | 227          | `[0,3)==[72,75)` |
//!
//! Each set is transmitted as 11 sub-frames: ten carrying three satellite
//! records (`sat_set_size * 3` bytes) and a final one carrying two
//! (`sat_set_size * 2` bytes).

use crate::error::{Error, Result};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Number of header bytes inspected to classify the file.
pub const HEADER_SIZE: usize = 75;

/// Number of sub-frames transmitted per EPO set.
pub const SUBFRAMES_PER_SET: usize = 11;

/// Detected EPO file generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    /// Original format: 1920-byte sets of 60-byte satellite records.
    TypeI,
    /// Extended format: 2304-byte sets of 72-byte satellite records.
    TypeII,
}

impl SetKind {
    /// Layout constants derived from the detected kind.
    pub fn layout(self) -> EpoLayout {
        match self {
            Self::TypeI => EpoLayout {
                set_size: 1920,
                sat_set_size: 60,
                frame_length: 191,
            },
            Self::TypeII => EpoLayout {
                set_size: 2304,
                sat_set_size: 72,
                frame_length: 227,
            },
        }
    }
}

/// Sizes governing how a file of a given [`SetKind`] is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpoLayout {
    /// Bytes per EPO set (one GPS hour of data).
    pub set_size: usize,
    /// Bytes per satellite record.
    pub sat_set_size: usize,
    /// Fixed total length of one upload frame.
    pub frame_length: usize,
}

impl EpoLayout {
    /// Payload size of the sub-frame at `index` (0-based) within a set.
    ///
    /// The first ten sub-frames carry three satellite records each, the
    /// eleventh carries the remaining two.
    pub fn subframe_payload_size(&self, index: usize) -> usize {
        if index == SUBFRAMES_PER_SET - 1 {
            self.sat_set_size * 2
        } else {
            self.sat_set_size * 3
        }
    }
}

/// An analyzed EPO file: immutable once created.
#[derive(Debug, Clone)]
pub struct EpoFile {
    path: PathBuf,
    /// Total file size in bytes.
    pub size: u64,
    /// Detected file generation.
    pub kind: SetKind,
    /// Layout constants for the detected generation.
    pub layout: EpoLayout,
}

/// Classify an EPO header by comparing the first satellite record against
/// its repetition at the Type I or Type II offset.
pub fn classify(header: &[u8; HEADER_SIZE]) -> Result<SetKind> {
    if header[0..3] == header[60..63] {
        Ok(SetKind::TypeI)
    } else if header[0..3] == header[72..75] {
        Ok(SetKind::TypeII)
    } else {
        Err(Error::InvalidFormat(
            "header does not match Type I or Type II".to_string(),
        ))
    }
}

impl EpoFile {
    /// Open and analyze an EPO file.
    ///
    /// Reads the first [`HEADER_SIZE`] bytes to classify the layout, then
    /// validates that the file is a whole number of sets.
    pub fn analyze<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header)?;

        let kind = classify(&header)?;
        let layout = kind.layout();
        debug!("Detected EPO {kind:?} ({size} bytes)");

        if size % layout.set_size as u64 != 0 {
            return Err(Error::SizeMismatch {
                size,
                set_size: layout.set_size as u64,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            size,
            kind,
            layout,
        })
    }

    /// Number of EPO sets in the file.
    pub fn set_count(&self) -> u64 {
        self.size / self.layout.set_size as u64
    }

    /// Reopen the file for streaming from the first byte.
    ///
    /// The header bytes inspected during analysis are part of the first
    /// set and are transmitted like any other data.
    pub fn open_reader(&self) -> Result<BufReader<File>> {
        Ok(BufReader::new(File::open(&self.path)?))
    }
}
