//! epoloader CLI - upload EPO assistance data to a MediaTek GNSS receiver.
//!
//! ## Features
//!
//! - Type I / Type II EPO file upload over a serial port
//! - Optional receiver time, location and clear-EPO initialization
//! - Baud-rate negotiation with restoration of the previous speed
//! - Per-set progress reporting with validity timestamps

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use env_logger::Env;
use epoloader::{EpoLoader, LoaderOptions, format_utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// epoloader - upload EPO satellite prediction data to a GNSS receiver.
///
/// Environment variables:
///   EPOLOADER_BAUD   - Default interface speed (default: 115200)
#[derive(Parser)]
#[command(name = "epoloader")]
#[command(author, version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// EPO file to upload, or '-' to only run the configured commands.
    input_file: String,

    /// GNSS receiver serial device (e.g. /dev/ttyUSB0).
    output_device: String,

    /// Interface speed for the upload.
    #[arg(short, long, default_value_t = 115200, env = "EPOLOADER_BAUD")]
    speed: u32,

    /// Keep the new baud rate instead of restoring the previous one.
    #[arg(short, long)]
    keep_new_speed: bool,

    /// Clear the receiver's stored EPO data first.
    #[arg(short, long)]
    clear: bool,

    /// Skip receiver initialization (time, location, clear).
    #[arg(short, long)]
    no_init: bool,

    /// Reference UTC time, 'yyyymmddhhmmss' or '-' for the current time.
    #[arg(short, long, value_parser = parse_time_arg)]
    time: Option<String>,

    /// Reference location as 'lat,lon,alt'.
    #[arg(short, long, value_parser = parse_location_arg)]
    location: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long)]
    quiet: bool,
}

/// Validate a reference time argument: '-' or exactly fourteen digits.
fn parse_time_arg(s: &str) -> Result<String, String> {
    if s == "-" {
        return Ok(s.to_string());
    }
    if s.len() == 14 && s.chars().all(|c| c.is_ascii_digit()) {
        Ok(s.to_string())
    } else {
        Err(format!(
            "Invalid time: '{s}'. Expected 'yyyymmddhhmmss' or '-'"
        ))
    }
}

/// Validate a location argument: three comma-separated numbers.
fn parse_location_arg(s: &str) -> Result<String, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!(
            "Invalid location: '{s}'. Expected 'lat,lon,alt' (e.g. '55.47199,37.54504,180')"
        ));
    }
    for part in &parts {
        part.trim()
            .parse::<f64>()
            .map_err(|e| format!("Invalid location component '{part}': {e}"))?;
    }
    Ok(s.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    let stderr_is_tty = console::Term::stderr().is_term();
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    debug!("epoloader v{}", env!("CARGO_PKG_VERSION"));

    // Ctrl-C requests a cooperative stop; the streaming loop checks this
    // once per set.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        epoloader::set_interrupt_checker(move || flag.load(Ordering::Relaxed));
    }
    let handler_flag = Arc::clone(&interrupted);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install Ctrl-C handler: {e}");
    }

    let options = LoaderOptions {
        device: cli.output_device.clone(),
        speed: cli.speed,
        keep_new_speed: cli.keep_new_speed,
        clear_epo: cli.clear,
        no_init: cli.no_init,
        input: match cli.input_file.as_str() {
            "-" => None,
            path => Some(PathBuf::from(path)),
        },
        time: cli.time.clone(),
        location: cli.location.clone(),
    };

    let pb = if cli.quiet || !stderr_is_tty {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] set {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let mut loader = EpoLoader::new(options);
    let report = {
        let pb = pb.clone();
        loader.run(&mut move |set, total, valid_from| {
            if pb.length() != Some(total) {
                pb.set_length(total);
            }
            pb.set_position(set);
            pb.set_message(format!("valid from {valid_from} UTC"));
        })
    };
    pb.finish_and_clear();

    let report = report.with_context(|| format!("Upload to {} failed", cli.output_device))?;

    if !cli.quiet {
        if let (Some(from), Some(to)) = (report.valid_from, report.valid_to) {
            eprintln!(
                "{} {} sets sent. Valid from {} to {} UTC",
                style("✓").green(),
                report.sets_sent,
                format_utc(from),
                format_utc(to)
            );
        } else {
            eprintln!("{} Receiver configured", style("✓").green());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_all_flags() {
        let cli = Cli::parse_from([
            "epoloader",
            "-s",
            "57600",
            "-k",
            "-c",
            "-n",
            "-t",
            "-",
            "-l",
            "55.47199,37.54504,180",
            "MTK14.EPO",
            "/dev/ttyUSB0",
        ]);
        assert_eq!(cli.input_file, "MTK14.EPO");
        assert_eq!(cli.output_device, "/dev/ttyUSB0");
        assert_eq!(cli.speed, 57600);
        assert!(cli.keep_new_speed);
        assert!(cli.clear);
        assert!(cli.no_init);
        assert_eq!(cli.time.as_deref(), Some("-"));
        assert_eq!(cli.location.as_deref(), Some("55.47199,37.54504,180"));
    }

    #[test]
    fn test_time_arg_validation() {
        assert!(parse_time_arg("-").is_ok());
        assert!(parse_time_arg("20260827120000").is_ok());
        assert!(parse_time_arg("2026-08-27").is_err());
        assert!(parse_time_arg("202608271200001").is_err());
    }

    #[test]
    fn test_location_arg_validation() {
        assert!(parse_location_arg("55.47199,37.54504,180").is_ok());
        assert!(parse_location_arg("55.47199,37.54504").is_err());
        assert!(parse_location_arg("a,b,c").is_err());
    }
}
