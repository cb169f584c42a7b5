//! Upload orchestrator.
//!
//! Sequences a whole session: analyze the EPO file, open and configure the
//! serial port, run the optional receiver setup commands, switch the
//! receiver to binary mode, stream every set as fixed-length frames, send
//! the sentinel, and clean up. Cleanup — stopping and joining the
//! acknowledgment reader, restoring the captured baud rate, closing the
//! port — runs on every exit path, success or failure.

use {
    crate::{
        channel::CommandChannel,
        epo::{EpoFile, EpoLayout, SUBFRAMES_PER_SET},
        error::{Error, Result},
        gpstime,
        port::{GnssPort, PortConfig},
        protocol::{frame::EpoFrame, nmea},
    },
    byteorder::{ByteOrder, LittleEndian},
    chrono::{DateTime, TimeDelta, Utc},
    log::{debug, info, warn},
    std::{
        io::{Read, Write},
        path::PathBuf,
        thread,
        time::Duration,
    },
};

/// Settle time before touching the port; some adapters drop data when
/// written to immediately after enumeration.
const PORT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Acknowledgment timeout for the receiver setup commands.
const CONFIG_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Acknowledgment timeout for the binary mode switch.
const BINARY_MODE_ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after the mode switch before the first binary frame.
const BINARY_MODE_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Extra send attempts for every command.
const COMMAND_RETRIES: u32 = 1;

/// Advisory validity extension past the last set's own hour.
const VALIDITY_TAIL_HOURS: i64 = 6;

/// Options for one upload session.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Serial device path.
    pub device: String,
    /// Baud rate to run the session at.
    pub speed: u32,
    /// Keep the session baud rate instead of restoring the previous one.
    pub keep_new_speed: bool,
    /// Clear the receiver's stored EPO data before uploading.
    pub clear_epo: bool,
    /// Skip the receiver setup commands (time, location, clear).
    pub no_init: bool,
    /// EPO file to upload; `None` runs the configured commands only.
    pub input: Option<PathBuf>,
    /// Reference time `yyyymmddhhmmss`, or `-` for the current UTC time.
    pub time: Option<String>,
    /// Reference location `lat,lon,alt`.
    pub location: Option<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            device: String::new(),
            speed: 115200,
            keep_new_speed: false,
            clear_epo: false,
            no_init: false,
            input: None,
            time: None,
            location: None,
        }
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// Number of EPO sets transmitted.
    pub sets_sent: u64,
    /// Validity start: the first set's embedded hour.
    pub valid_from: Option<DateTime<Utc>>,
    /// Advisory validity end: the last set's hour plus six hours. Verify
    /// against the receiver before relying on exact bounds.
    pub valid_to: Option<DateTime<Utc>>,
}

/// Drives one upload session end to end.
pub struct EpoLoader {
    options: LoaderOptions,
    port: Option<GnssPort>,
    channel: Option<CommandChannel<Box<dyn serialport::SerialPort>>>,
    previous_baud: Option<u32>,
}

impl EpoLoader {
    /// Create a loader for the given options.
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options,
            port: None,
            channel: None,
            previous_baud: None,
        }
    }

    /// Run the session. Cleanup executes whether or not the upload
    /// succeeds.
    pub fn run(&mut self, progress: &mut dyn FnMut(u64, u64, &str)) -> Result<UploadReport> {
        let result = self.run_inner(progress);
        self.cleanup();
        result
    }

    fn run_inner(&mut self, progress: &mut dyn FnMut(u64, u64, &str)) -> Result<UploadReport> {
        let epo = match self.options.input {
            Some(ref path) => {
                let epo = EpoFile::analyze(path)?;
                info!(
                    "Opening EPO {:?} file: {} sets",
                    epo.kind,
                    epo.set_count()
                );
                Some(epo)
            },
            None => None,
        };

        self.open_port()?;
        self.configure_receiver()?;

        let Some(epo) = epo else {
            return Ok(UploadReport::default());
        };

        self.enter_binary_mode()?;
        self.stream(&epo, progress)
    }

    /// Capture the current speed, open the port, start the reader.
    fn open_port(&mut self) -> Result<()> {
        thread::sleep(PORT_SETTLE_DELAY);

        self.previous_baud = GnssPort::capture_current_speed(&self.options.device)?;
        if let Some(baud) = self.previous_baud {
            info!("Current port speed: {baud}");
        }

        let config = PortConfig {
            device: self.options.device.clone(),
            baud_rate: self.options.speed,
        };
        let port = GnssPort::open(&config)?;

        let writer = port.try_clone()?;
        let reader = port.try_clone()?;
        self.channel = Some(CommandChannel::start(writer, reader));
        self.port = Some(port);
        Ok(())
    }

    /// Send the optional time, location and clear commands.
    fn configure_receiver(&mut self) -> Result<()> {
        if self.options.no_init {
            debug!("Skipping receiver initialization");
            return Ok(());
        }

        let stamp = match self.options.time.as_deref() {
            Some("-") => Some(gpstime::current_utc_stamp()),
            Some(t) => Some(t.to_string()),
            None => None,
        };

        if let Some(ref stamp) = stamp {
            info!("Setting receiver time to {stamp}");
            self.send_command(&nmea::set_time(stamp), CONFIG_ACK_TIMEOUT)?;
        }

        if let Some(location) = self.options.location.clone() {
            info!("Setting receiver location to {location}");
            let stamp = stamp.as_deref().unwrap_or_default();
            self.send_command(&nmea::set_location(&location, stamp), CONFIG_ACK_TIMEOUT)?;
        }

        if self.options.clear_epo {
            info!("Clearing stored EPO data");
            self.send_command(&nmea::clear_epo(), CONFIG_ACK_TIMEOUT)?;
        }

        Ok(())
    }

    /// Switch the receiver to binary frame mode at the session baud.
    fn enter_binary_mode(&mut self) -> Result<()> {
        debug!("Switching receiver to binary mode");
        self.send_command(
            &nmea::binary_mode(self.options.speed),
            BINARY_MODE_ACK_TIMEOUT,
        )?;
        thread::sleep(BINARY_MODE_SETTLE_DELAY);
        Ok(())
    }

    fn send_command(&mut self, payload: &str, timeout: Duration) -> Result<()> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| Error::Protocol("command channel not started".to_string()))?;

        let status = channel.send_and_wait(payload, timeout, COMMAND_RETRIES)?;
        if !status.is_success() {
            warn!("{payload} acknowledged with {status:?}");
        }
        Ok(())
    }

    /// Stream every set plus the sentinel frame.
    fn stream(&mut self, epo: &EpoFile, progress: &mut dyn FnMut(u64, u64, &str)) -> Result<UploadReport> {
        let mut input = epo.open_reader()?;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::Protocol("port not open".to_string()))?;

        info!("Sending {} EPO sets", epo.set_count());
        let summary = stream_frames(&mut input, epo.layout, epo.size, port, progress)?;

        let valid_from = summary.first_hour.map(gpstime::gps_hour_to_utc);
        let valid_to = summary
            .last_hour
            .map(gpstime::gps_hour_to_utc)
            .map(|t| t + TimeDelta::hours(VALIDITY_TAIL_HOURS));

        if let (Some(from), Some(to)) = (valid_from, valid_to) {
            info!(
                "{} sets sent. Valid from {} to {} UTC",
                summary.sets_sent,
                gpstime::format_utc(from),
                gpstime::format_utc(to)
            );
        }

        Ok(UploadReport {
            sets_sent: summary.sets_sent,
            valid_from,
            valid_to,
        })
    }

    /// Stop the reader, restore the captured speed, close the port.
    fn cleanup(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.shutdown();
        }

        if let Some(mut port) = self.port.take() {
            if let Some(previous) =
                speed_to_restore(self.options.keep_new_speed, self.previous_baud)
            {
                match port.restore(previous) {
                    Ok(()) => info!("Restored original baud rate: {previous}"),
                    Err(e) => warn!("Failed to restore baud rate: {e}"),
                }
            }
            port.close();
        }
    }
}

/// Speed to put the port back to when the session ends, if any.
///
/// Restoration only happens when the session was asked to undo its baud
/// change and a previous speed was actually captured.
fn speed_to_restore(keep_new_speed: bool, previous_baud: Option<u32>) -> Option<u32> {
    if keep_new_speed {
        None
    } else {
        previous_baud
    }
}

/// Per-stream accounting.
#[derive(Debug, Default)]
struct StreamSummary {
    sets_sent: u64,
    first_hour: Option<u32>,
    last_hour: Option<u32>,
}

/// Frame and write the whole file, then the sentinel.
///
/// Sequence numbers increase monotonically across the file; the first
/// sub-frame of each set carries the set's 24-bit GPS-hour stamp in its
/// first four payload bytes.
fn stream_frames<R, W>(
    input: &mut R,
    layout: EpoLayout,
    total_size: u64,
    out: &mut W,
    progress: &mut dyn FnMut(u64, u64, &str),
) -> Result<StreamSummary>
where
    R: Read,
    W: Write,
{
    let total_sets = total_size / layout.set_size as u64;
    let mut summary = StreamSummary::default();
    let mut payload = vec![0u8; layout.sat_set_size * 3];
    let mut seq: u16 = 0;
    let mut total_read: u64 = 0;

    while total_read < total_size {
        if crate::is_interrupt_requested() {
            return Err(Error::Interrupted);
        }

        for subframe in 0..SUBFRAMES_PER_SET {
            let size = layout.subframe_payload_size(subframe);
            input.read_exact(&mut payload[..size])?;
            total_read += size as u64;

            if subframe == 0 {
                summary.sets_sent += 1;
                let hour = LittleEndian::read_u32(&payload[..4]) & 0x00FF_FFFF;
                summary.first_hour.get_or_insert(hour);
                summary.last_hour = Some(hour);

                let valid_from = gpstime::format_utc(gpstime::gps_hour_to_utc(hour));
                debug!(
                    "Sending set {}. Valid from {valid_from} UTC",
                    summary.sets_sent
                );
                progress(summary.sets_sent, total_sets, &valid_from);
            }

            let frame = EpoFrame::data(seq, &payload[..size]);
            out.write_all(&frame.build(layout.frame_length))?;
            seq = seq.wrapping_add(1);
        }
    }

    out.write_all(&EpoFrame::sentinel().build(layout.frame_length))?;
    out.flush()?;

    Ok(summary)
}
