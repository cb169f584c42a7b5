//! Serial transport to the GNSS receiver.
//!
//! Wraps the `serialport` crate with the small surface the uploader needs:
//! open at 8-N-1, change and restore the baud rate, clone a handle for the
//! background reader, and close idempotently.
//!
//! Opening a port through `serialport` applies new terminal settings, so
//! the device's pre-existing speed has to be captured *before* the port is
//! opened. [`GnssPort::capture_current_speed`] does that with a plain
//! termios query on Unix; there is no reader active at that point, so the
//! query cannot race with any I/O.

use {
    crate::error::{Error, Result},
    log::{debug, trace},
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Read timeout applied to the port; the background reader polls its stop
/// flag between reads at this cadence.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial port configuration for an upload session.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Device path (e.g. "/dev/ttyUSB0").
    pub device: String,
    /// Baud rate to run the upload at.
    pub baud_rate: u32,
}

impl PortConfig {
    /// Create a configuration for the given device and speed.
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
        }
    }
}

/// Serial connection to the GNSS receiver.
pub struct GnssPort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl GnssPort {
    /// Query the device's currently configured output speed without
    /// disturbing its settings.
    ///
    /// Returns `None` when the speed maps to no standard rate, or on
    /// platforms without termios.
    #[cfg(unix)]
    pub fn capture_current_speed(device: &str) -> Result<Option<u32>> {
        use nix::{
            fcntl::{OFlag, open},
            sys::{stat::Mode, termios},
        };

        let fd = open(
            std::path::Path::new(device),
            OFlag::O_RDWR | OFlag::O_NOCTTY,
            Mode::empty(),
        )
        .map_err(|e| Error::PortConfig(format!("open {device}: {e}")))?;
        let attrs = termios::tcgetattr(&fd)
            .map_err(|e| Error::PortConfig(format!("tcgetattr on {device}: {e}")))?;
        let speed = baud_value(termios::cfgetospeed(&attrs));
        debug!("Current speed on {device}: {speed:?}");
        Ok(speed)
    }

    /// Non-Unix targets have no termios to query; nothing to restore later.
    #[cfg(not(unix))]
    pub fn capture_current_speed(_device: &str) -> Result<Option<u32>> {
        Ok(None)
    }

    /// Open the device at the configured baud rate, 8-N-1, no flow control.
    pub fn open(config: &PortConfig) -> Result<Self> {
        let port = serialport::new(&config.device, config.baud_rate)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        debug!("Opened {} at {} baud", config.device, config.baud_rate);
        Ok(Self {
            port: Some(port),
            name: config.device.clone(),
        })
    }

    /// Clone a handle to the underlying port, e.g. for a background read
    /// loop or a dedicated command writer.
    pub fn try_clone(&self) -> Result<Box<dyn serialport::SerialPort>> {
        match self.port {
            Some(ref p) => Ok(p.try_clone()?),
            None => Err(closed_error().into()),
        }
    }

    /// Change the port's baud rate.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_baud_rate(baud_rate)?;
        }
        Ok(())
    }

    /// Restore a previously captured speed.
    pub fn restore(&mut self, previous_baud: u32) -> Result<()> {
        trace!("Restoring {} to {previous_baud} baud", self.name);
        self.set_baud_rate(previous_baud)
    }

    /// Close the port. Safe to call more than once.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
    }
}

impl Read for GnssPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(closed_error)
            .and_then(|p| p.read(buf))
    }
}

impl Write for GnssPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(closed_error)
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(closed_error)
            .and_then(std::io::Write::flush)
    }
}

fn closed_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed")
}

/// Map a termios speed constant to its numeric rate.
#[cfg(unix)]
fn baud_value(rate: nix::sys::termios::BaudRate) -> Option<u32> {
    use nix::sys::termios::BaudRate;

    match rate {
        BaudRate::B1200 => Some(1200),
        BaudRate::B2400 => Some(2400),
        BaudRate::B4800 => Some(4800),
        BaudRate::B9600 => Some(9600),
        BaudRate::B19200 => Some(19200),
        BaudRate::B38400 => Some(38400),
        BaudRate::B57600 => Some(57600),
        BaudRate::B115200 => Some(115200),
        BaudRate::B230400 => Some(230400),
        #[cfg(any(target_os = "linux", target_os = "android"))]
        BaudRate::B460800 => Some(460800),
        #[cfg(any(target_os = "linux", target_os = "android"))]
        BaudRate::B921600 => Some(921600),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_config_captures_device_and_speed() {
        let config = PortConfig::new("/dev/ttyUSB0", 115200);
        assert_eq!(config.device, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 115200);
    }

    #[test]
    fn test_open_missing_device_fails() {
        let config = PortConfig::new("/dev/epoloader-does-not-exist", 115200);
        assert!(GnssPort::open(&config).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_speed_missing_device_fails() {
        assert!(matches!(
            GnssPort::capture_current_speed("/dev/epoloader-does-not-exist"),
            Err(crate::Error::PortConfig(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_baud_value_common_rates() {
        use nix::sys::termios::BaudRate;
        assert_eq!(baud_value(BaudRate::B9600), Some(9600));
        assert_eq!(baud_value(BaudRate::B115200), Some(115200));
        assert_eq!(baud_value(BaudRate::B0), None);
    }
}
