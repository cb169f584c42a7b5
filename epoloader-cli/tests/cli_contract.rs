//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("epoloader")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("epoloader"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("epoloader"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("epoloader"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn missing_arguments_is_a_usage_error() {
    let mut cmd = cli_cmd();
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn missing_device_argument_is_a_usage_error() {
    let mut cmd = cli_cmd();
    cmd.arg("MTK14.EPO")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn invalid_time_argument_is_a_usage_error() {
    let mut cmd = cli_cmd();
    cmd.args(["--time", "2026-08-27", "-", "/dev/ttyUSB0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid time"));
}

#[test]
fn invalid_location_argument_is_a_usage_error() {
    let mut cmd = cli_cmd();
    cmd.args(["--location", "55.4,37.5", "-", "/dev/ttyUSB0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid location"));
}

#[test]
fn nonexistent_input_file_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir
        .path()
        .join("not_exists.epo");

    let mut cmd = cli_cmd();
    cmd.arg(missing.as_os_str())
        .arg("/dev/ttyUSB0")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn unclassifiable_header_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    let bad = dir
        .path()
        .join("bad.epo");

    // 1920 bytes whose first record repeats at neither the Type I nor the
    // Type II offset.
    let mut data = vec![0u8; 1920];
    data[0..3].copy_from_slice(&[1, 2, 3]);
    data[60..63].copy_from_slice(&[9, 9, 9]);
    data[72..75].copy_from_slice(&[8, 8, 8]);
    fs::write(&bad, &data).expect("write bad.epo");

    let mut cmd = cli_cmd();
    cmd.arg(bad.as_os_str())
        .arg("/dev/ttyUSB0")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid EPO"));
}

#[test]
fn partial_set_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    let short = dir
        .path()
        .join("short.epo");

    // Valid Type I header (all zeros) but not a whole number of sets.
    fs::write(&short, vec![0u8; 2000]).expect("write short.epo");

    let mut cmd = cli_cmd();
    cmd.arg(short.as_os_str())
        .arg("/dev/ttyUSB0")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not a multiple"));
}
