//! Unit tests for the child process channel.
//!
//! Fake plugins are shell scripts written into temporary directories, so
//! these tests are unix-only.
#![cfg(unix)]

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use super::*;

fn script_manifest(dir: &TempDir, script: &str) -> PactPluginManifest {
    let path = dir.path().join("plugin.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("write script");
    let mut permissions = std::fs::metadata(&path).expect("script metadata").permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("make script executable");

    PactPluginManifest {
        plugin_dir: dir.path().to_path_buf(),
        plugin_interface_version: 1,
        name: "fake".to_owned(),
        version: "0.0.1".to_owned(),
        executable_type: "exec".to_owned(),
        minimum_required_version: None,
        entry_point: "plugin.sh".to_owned(),
        entry_points: HashMap::new(),
        args: Vec::new(),
        dependencies: Vec::new(),
    }
}

#[tokio::test]
async fn startup_info_parses_the_handshake_line() {
    let dir = TempDir::new().expect("temp dir");
    let manifest =
        script_manifest(&dir, r#"echo '{"port": 1234, "serverKey": "abc123"}'; sleep 10"#);
    let child = ChildProcess::spawn(&manifest).expect("spawn");

    let info = child.startup_info(Duration::from_secs(5)).await.expect("startup info");
    assert_eq!(info, RunningPluginInfo { port: 1234, server_key: "abc123".to_owned() });

    child.destroy();
    assert!(child.wait_for_exit(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn ordinary_log_lines_before_the_handshake_are_skipped() {
    let dir = TempDir::new().expect("temp dir");
    let manifest = script_manifest(
        &dir,
        concat!(
            "echo 'starting up'\n",
            "echo 'not json { either'\n",
            r#"echo '{"port": 9000, "serverKey": "k"}'"#,
            "\nsleep 10",
        ),
    );
    let child = ChildProcess::spawn(&manifest).expect("spawn");

    // "not json { either" does not start with '{' after trimming, and plain
    // log lines are never queued, so the handshake is the first message.
    let info = child.startup_info(Duration::from_secs(5)).await.expect("startup info");
    assert_eq!(info.port, 9000);

    child.destroy();
    child.wait_for_exit(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn unparseable_json_lines_are_dropped_not_fatal() {
    let dir = TempDir::new().expect("temp dir");
    let manifest = script_manifest(
        &dir,
        concat!(
            "echo '{ definitely not json'\n",
            r#"echo '{"port": 9001, "serverKey": "k2"}'"#,
            "\nsleep 10",
        ),
    );
    let child = ChildProcess::spawn(&manifest).expect("spawn");

    let info = child.startup_info(Duration::from_secs(5)).await.expect("startup info");
    assert_eq!(info.port, 9001);

    child.destroy();
    child.wait_for_exit(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn a_silent_plugin_times_out_and_is_terminated() {
    let dir = TempDir::new().expect("temp dir");
    let manifest = script_manifest(&dir, "sleep 30");
    let child = ChildProcess::spawn(&manifest).expect("spawn");

    let started = Instant::now();
    let err = child.startup_info(Duration::from_millis(250)).await.expect_err("should time out");
    assert!(matches!(err, PluginError::StartupTimeout { .. }), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(5), "must fail promptly, not hang");

    // startup_info destroys the process on failure.
    assert!(child.wait_for_exit(Duration::from_secs(2)).await, "process must be terminated");
}

#[tokio::test]
async fn a_non_object_handshake_is_an_invalid_startup() {
    let dir = TempDir::new().expect("temp dir");
    let manifest = script_manifest(&dir, r#"echo '{"unexpected": true}'; sleep 10"#);
    let child = ChildProcess::spawn(&manifest).expect("spawn");

    let err = child.startup_info(Duration::from_secs(5)).await.expect_err("should reject");
    match err {
        PluginError::InvalidStartup { message, .. } => {
            assert!(message.contains("unexpected"), "error should include the partial value");
        }
        other => panic!("expected InvalidStartup, got {other}"),
    }
    child.wait_for_exit(Duration::from_secs(2)).await;
}

#[test]
fn spawning_a_missing_executable_fails() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let manifest = PactPluginManifest {
            plugin_dir: PathBuf::from("/nonexistent"),
            plugin_interface_version: 1,
            name: "ghost".to_owned(),
            version: "0.0.1".to_owned(),
            executable_type: "exec".to_owned(),
            minimum_required_version: None,
            entry_point: "missing-binary".to_owned(),
            entry_points: HashMap::new(),
            args: Vec::new(),
            dependencies: Vec::new(),
        };
        let err = ChildProcess::spawn(&manifest).expect_err("spawn must fail");
        assert!(matches!(err, PluginError::SpawnFailed { .. }));
    });
}
