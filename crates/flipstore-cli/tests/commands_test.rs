//! Subcommand execution against the simulated device.

use std::fs;

use clap::Parser;
use flipstore_cli::{execute, Cli, CliError};
use flipstore_protocol::{SessionConfig, StorageError, StorageSession};
use flipstore_sim::SimulatedDevice;

fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["flipstore", "--port", "sim"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

/// Run one subcommand on an open session and return its stdout.
fn run(session: &mut StorageSession<SimulatedDevice>, args: &[&str]) -> Result<String, CliError> {
    let cli = parse(args);
    let mut out = Vec::new();
    execute(session, &cli.command, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

fn open_session(device: SimulatedDevice) -> StorageSession<SimulatedDevice> {
    let mut session = StorageSession::new(device, SessionConfig::default());
    session.open().unwrap();
    session
}

#[test]
fn test_send_then_receive_local_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let target = dir.path().join("target.bin");
    let data: Vec<u8> = (0..1300u32).map(|i| (i % 256) as u8).collect();
    fs::write(&source, &data).unwrap();

    let mut session = open_session(SimulatedDevice::new(1));
    run(
        &mut session,
        &["send", "-f", "/ext/up.bin", "-l", source.to_str().unwrap()],
    )
    .unwrap();
    assert_eq!(session.transport().file("/ext/up.bin"), Some(&data[..]));

    run(
        &mut session,
        &["receive", "-f", "/ext/up.bin", "-l", target.to_str().unwrap()],
    )
    .unwrap();
    assert_eq!(fs::read(&target).unwrap(), data);
}

#[test]
fn test_failed_receive_removes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing.bin");

    let mut session = open_session(SimulatedDevice::new(2));
    let err = run(
        &mut session,
        &["receive", "-f", "/ext/missing.bin", "-l", target.to_str().unwrap()],
    )
    .unwrap_err();

    assert!(matches!(err, CliError::Storage(StorageError::Device(_))));
    assert!(!target.exists());
}

#[test]
fn test_send_missing_local_file() {
    let mut session = open_session(SimulatedDevice::new(3));
    let err = run(
        &mut session,
        &["send", "-f", "/ext/x", "-l", "/nonexistent/source.bin"],
    )
    .unwrap_err();
    assert!(matches!(err, CliError::LocalFile { .. }));
    assert!(session.transport().commands().is_empty());
}

#[test]
fn test_read_prints_contents() {
    let mut device = SimulatedDevice::new(4);
    device.insert_file("/ext/notes.txt", b"line one\nline two\n");
    let mut session = open_session(device);

    let out = run(&mut session, &["read", "-f", "/ext/notes.txt"]).unwrap();
    assert_eq!(out, "line one\nline two\n");
}

#[test]
fn test_list_text_tree() {
    let mut device = SimulatedDevice::new(5);
    device.insert_file("/ext/tree/a.txt", b"abc");
    device.insert_file("/ext/tree/sub/b.txt", b"12345");
    device.insert_dir("/ext/tree/locked");
    device.fail_listing("/ext/tree/locked");
    let mut session = open_session(device);

    let out = run(&mut session, &["list", "-f", "/ext/tree"]).unwrap();
    assert_eq!(
        out,
        "a.txt, size 3\n/locked\n  Error: internal error\n/sub\n  b.txt, size 5\n"
    );
}

#[test]
fn test_list_json_lines() {
    let mut device = SimulatedDevice::new(6);
    device.insert_file("/int/cfg/app.conf", b"k=v");
    let mut session = open_session(device);

    let out = run(&mut session, &["list", "-f", "/int/cfg", "--json"]).unwrap();
    let lines: Vec<serde_json::Value> = out
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(
        lines,
        vec![serde_json::json!({
            "path": "/int/cfg/app.conf",
            "kind": "file",
            "size": 3,
            "depth": 0
        })]
    );
}

#[test]
fn test_single_line_commands() {
    let mut device = SimulatedDevice::new(7);
    device.insert_file("/ext/hello.txt", b"hello world");
    let mut session = open_session(device);

    assert_eq!(
        run(&mut session, &["hash", "-f", "/ext/hello.txt"]).unwrap(),
        "5eb63bbbe01eeed093cb22bb8f5acdc3\n"
    );
    assert_eq!(run(&mut session, &["exist", "-f", "/ext/hello.txt"]).unwrap(), "true\n");
    assert_eq!(run(&mut session, &["exist", "-f", "/ext/nope"]).unwrap(), "false\n");
    assert_eq!(
        run(&mut session, &["stat", "-f", "/ext/hello.txt"]).unwrap(),
        "file, 11 bytes\n"
    );

    run(&mut session, &["mkdir", "-f", "/ext/new"]).unwrap();
    assert_eq!(run(&mut session, &["stat", "-f", "/ext/new"]).unwrap(), "directory\n");
    run(&mut session, &["remove", "-f", "/ext/new"]).unwrap();
    assert_eq!(run(&mut session, &["exist", "-f", "/ext/new"]).unwrap(), "false\n");
}

#[test]
fn test_device_error_is_returned() {
    let mut session = open_session(SimulatedDevice::new(8));
    let err = run(&mut session, &["remove", "-f", "/ext/ghost"]).unwrap_err();
    match err {
        CliError::Storage(e) => {
            assert_eq!(
                e.as_device_report().map(|r| r.message.as_str()),
                Some("file/dir not exist")
            );
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
