//! PMTK ASCII command sentences and acknowledgment scanning.
//!
//! Commands travel as NMEA-style sentences: `$<payload>*<XX>\r\n` where
//! `XX` is the XOR of the payload bytes as two uppercase hex digits. The
//! receiver answers every command with a `PMTK001` acknowledgment carrying
//! the echoed command number and a status code.

use super::frame::crc8_xor;

/// Marker identifying a response as a command acknowledgment.
pub const ACK_TAG: &str = "PMTK001";

/// Status carried in a `PMTK001` acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Code 0: invalid packet.
    Invalid,
    /// Code 1: packet type not supported.
    Unsupported,
    /// Code 2: valid packet, but the action failed.
    Failed,
    /// Code 3: valid packet, action succeeded.
    Success,
}

impl AckStatus {
    /// Whether the receiver accepted and executed the command.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// XOR checksum of a command payload.
pub fn checksum(payload: &str) -> u8 {
    crc8_xor(payload.as_bytes())
}

/// Build the full wire sentence for a command payload.
pub fn sentence(payload: &str) -> String {
    format!("${payload}*{:02X}\r\n", checksum(payload))
}

/// Time-set command (PMTK740). `stamp` is `yyyymmddhhmmss`.
pub fn set_time(stamp: &str) -> String {
    format!("PMTK740,{stamp}")
}

/// Location-set command (PMTK741). `location` is `lat,lon,alt`.
pub fn set_location(location: &str, stamp: &str) -> String {
    format!("PMTK741,{location},{stamp}")
}

/// Clear stored EPO data (PMTK127).
pub fn clear_epo() -> String {
    "PMTK127".to_string()
}

/// Switch the receiver to binary frame mode at `baud` (PMTK253).
pub fn binary_mode(baud: u32) -> String {
    format!("PMTK253,1,{baud}")
}

/// Scan response text for an acknowledgment and classify its status code.
///
/// Returns `None` when no complete acknowledgment is present, including the
/// case where the tag has arrived but the status code has not.
pub fn scan_ack(text: &str) -> Option<AckStatus> {
    let tail = &text[text.find(ACK_TAG)?..];

    if tail.contains(",3*") {
        Some(AckStatus::Success)
    } else if tail.contains(",2*") {
        Some(AckStatus::Failed)
    } else if tail.contains(",1*") {
        Some(AckStatus::Unsupported)
    } else if tail.contains(",0*") {
        Some(AckStatus::Invalid)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_payload_xor() {
        // Manually: XOR of "PMTK127" bytes.
        let expected = "PMTK127".bytes().fold(0u8, |a, b| a ^ b);
        assert_eq!(checksum("PMTK127"), expected);
    }

    #[test]
    fn test_sentence_round_trip() {
        let s = sentence("PMTK127");
        assert!(s.starts_with("$PMTK127*"));
        assert!(s.ends_with("\r\n"));

        // Re-extract the checksum and compare against a fresh computation.
        let hex = &s[s.find('*').unwrap() + 1..s.len() - 2];
        assert_eq!(hex.len(), 2);
        assert_eq!(u8::from_str_radix(hex, 16).unwrap(), checksum("PMTK127"));
        assert_eq!(hex, hex.to_uppercase());
    }

    #[test]
    fn test_command_constructors() {
        assert_eq!(set_time("20260827120000"), "PMTK740,20260827120000");
        assert_eq!(
            set_location("55.47199,37.54504,180", "20260827120000"),
            "PMTK741,55.47199,37.54504,180,20260827120000"
        );
        assert_eq!(clear_epo(), "PMTK127");
        assert_eq!(binary_mode(115200), "PMTK253,1,115200");
    }

    #[test]
    fn test_scan_ack_classifies_status_codes() {
        assert_eq!(scan_ack("$PMTK001,127,3*3E\r\n"), Some(AckStatus::Success));
        assert_eq!(scan_ack("$PMTK001,127,2*3F\r\n"), Some(AckStatus::Failed));
        assert_eq!(
            scan_ack("$PMTK001,127,1*3C\r\n"),
            Some(AckStatus::Unsupported)
        );
        assert_eq!(scan_ack("$PMTK001,127,0*3D\r\n"), Some(AckStatus::Invalid));
    }

    #[test]
    fn test_scan_ack_ignores_unrelated_traffic() {
        assert_eq!(scan_ack("$GPGGA,123519,4807.038,N*47\r\n"), None);
        assert_eq!(scan_ack(""), None);
    }

    #[test]
    fn test_scan_ack_incomplete_sentence_is_not_a_match() {
        // Tag arrived but the status code is still in flight.
        assert_eq!(scan_ack("$PMTK001,127"), None);
    }

    #[test]
    fn test_scan_ack_mid_buffer() {
        let noise = "$GPRMC,x*00\r\n$PMTK001,253,3*31\r\n";
        assert_eq!(scan_ack(noise), Some(AckStatus::Success));
    }

    #[test]
    fn test_only_success_status_is_success() {
        assert!(AckStatus::Success.is_success());
        assert!(!AckStatus::Failed.is_success());
        assert!(!AckStatus::Unsupported.is_success());
        assert!(!AckStatus::Invalid.is_success());
    }
}
