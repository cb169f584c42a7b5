//! Binary EPO upload frames.
//!
//! Every frame of an upload has the same fixed length, determined by the
//! file's detected layout (191 bytes for Type I, 227 for Type II):
//!
//! ```text
//! +----------+--------+--------+-------+-----------------+-----+--------+
//! | Preamble | Length |  Cmd   |  Seq  |     Payload     | CRC |  EOW   |
//! +----------+--------+--------+-------+-----------------+-----+--------+
//! | 2 bytes  | 2 bytes| 2 bytes| 2     |    variable     | 1   | 2 bytes|
//! +----------+--------+--------+-------+-----------------+-----+--------+
//! |  0x2404  | total  | 0x02d2 | 0..N  | zero-padded     | XOR | 0x0a0d |
//! +----------+--------+--------+-------+-----------------+-----+--------+
//! ```
//!
//! All multi-byte fields are little-endian. The checksum is the plain XOR
//! of every byte between the length field and the CRC slot; the receiver
//! expects exactly this, not a polynomial CRC-8.

use byteorder::{ByteOrder, LittleEndian};

/// Frame preamble constant.
pub const PREAMBLE: u16 = 0x2404;

/// EPO data command code.
pub const EPO_CMD: u16 = 0x02d2;

/// End-of-word marker closing every frame.
pub const EOW: u16 = 0x0a0d;

/// Sequence number of the sentinel frame terminating an upload.
pub const FINAL_SEQUENCE: u16 = 0xFFFF;

/// Offset of the payload within a frame.
pub const PAYLOAD_OFFSET: usize = 8;

/// XOR of all bytes; the checksum used by both frame and sentence layers.
pub fn crc8_xor(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, b| crc ^ b)
}

/// One EPO upload frame: a sequence number and its payload.
#[derive(Debug, Clone)]
pub struct EpoFrame {
    seq: u16,
    payload: Vec<u8>,
}

impl EpoFrame {
    /// Create a data frame carrying `payload` at sequence `seq`.
    pub fn data(seq: u16, payload: &[u8]) -> Self {
        Self {
            seq,
            payload: payload.to_vec(),
        }
    }

    /// Create the sentinel frame signalling end-of-upload.
    ///
    /// Carries sequence [`FINAL_SEQUENCE`] and no payload; the layout and
    /// checksum are otherwise identical to a data frame.
    pub fn sentinel() -> Self {
        Self {
            seq: FINAL_SEQUENCE,
            payload: Vec::new(),
        }
    }

    /// Sequence number of this frame.
    pub fn sequence(&self) -> u16 {
        self.seq
    }

    /// Build the complete wire frame of exactly `frame_length` bytes.
    ///
    /// The payload is zero-padded to the reserved span, or truncated if it
    /// exceeds it.
    #[allow(clippy::cast_possible_truncation)] // frame_length is 191 or 227
    pub fn build(&self, frame_length: usize) -> Vec<u8> {
        debug_assert!(frame_length > PAYLOAD_OFFSET + 3);

        let mut buf = vec![0u8; frame_length];
        LittleEndian::write_u16(&mut buf[0..2], PREAMBLE);
        LittleEndian::write_u16(&mut buf[2..4], frame_length as u16);
        LittleEndian::write_u16(&mut buf[4..6], EPO_CMD);
        LittleEndian::write_u16(&mut buf[6..8], self.seq);

        let span = frame_length - 3 - PAYLOAD_OFFSET;
        let n = self.payload.len().min(span);
        buf[PAYLOAD_OFFSET..PAYLOAD_OFFSET + n].copy_from_slice(&self.payload[..n]);

        let crc = crc8_xor(&buf[2..frame_length - 3]);
        buf[frame_length - 3] = crc;
        LittleEndian::write_u16(&mut buf[frame_length - 2..], EOW);

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_has_exactly_the_requested_length() {
        for len in [191usize, 227] {
            let frame = EpoFrame::data(0, &[0x55; 180]);
            assert_eq!(frame.build(len).len(), len);
        }
    }

    #[test]
    fn test_frame_field_layout() {
        let frame = EpoFrame::data(0x0102, &[0xAB; 180]);
        let buf = frame.build(191);

        assert_eq!(&buf[0..2], &[0x04, 0x24]); // preamble
        assert_eq!(&buf[2..4], &[191, 0x00]); // length
        assert_eq!(&buf[4..6], &[0xd2, 0x02]); // command
        assert_eq!(&buf[6..8], &[0x02, 0x01]); // sequence
        assert_eq!(&buf[8..188], &[0xAB; 180]); // payload
        assert_eq!(&buf[189..191], &[0x0d, 0x0a]); // EOW
    }

    #[test]
    fn test_crc_is_xor_of_inner_bytes() {
        let frame = EpoFrame::data(7, &[1, 2, 3, 4, 5]);
        let buf = frame.build(191);
        assert_eq!(buf[188], crc8_xor(&buf[2..188]));
    }

    #[test]
    fn test_short_payload_is_zero_padded() {
        // The eleventh sub-frame of a Type I set carries only 120 bytes.
        let frame = EpoFrame::data(10, &[0xFF; 120]);
        let buf = frame.build(191);
        assert_eq!(&buf[8..128], &[0xFF; 120]);
        assert_eq!(&buf[128..188], &[0x00; 60]);
    }

    #[test]
    fn test_oversized_payload_is_truncated() {
        let frame = EpoFrame::data(0, &[0x11; 500]);
        let buf = frame.build(191);
        assert_eq!(buf.len(), 191);
        assert_eq!(&buf[189..191], &[0x0d, 0x0a]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = EpoFrame::data(42, &[9; 180]).build(227);
        let b = EpoFrame::data(42, &[9; 180]).build(227);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sentinel_frame() {
        let buf = EpoFrame::sentinel().build(191);
        assert_eq!(buf.len(), 191);
        assert_eq!(&buf[6..8], &[0xFF, 0xFF]);
        assert_eq!(&buf[8..188], &[0u8; 180]); // empty payload
        assert_eq!(buf[188], crc8_xor(&buf[2..188]));
        assert_eq!(&buf[189..191], &[0x0d, 0x0a]);
    }

    #[test]
    fn test_crc8_xor_basics() {
        assert_eq!(crc8_xor(&[]), 0);
        assert_eq!(crc8_xor(&[0x5A]), 0x5A);
        assert_eq!(crc8_xor(&[0xFF, 0xFF]), 0);
        assert_eq!(crc8_xor(&[0x12, 0x34]), 0x26);
    }
}
