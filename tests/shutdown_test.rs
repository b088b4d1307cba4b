#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

const CHANNEL: &str = "C0BRIDGE";

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn bridge(dir: &TempDir, extra: &[&str]) -> Child {
    let claude = write_script(dir.path(), "claude", "#!/bin/sh\necho reply\n");
    Command::new(env!("CARGO_BIN_EXE_claude-bridge"))
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .args(["--channel", CHANNEL, "--log-level", "info"])
        .arg("--claude-bin")
        .arg(&claude)
        .args(extra)
        .env_remove("RUST_LOG")
        .env_remove("TARGET_CHANNEL_ID")
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

fn process_alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_none_or(|(_, rest)| !rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

async fn read_pid(path: &Path) -> i32 {
    for _ in 0..500 {
        if let Some(pid) = fs::read_to_string(path)
            .ok()
            .and_then(|text| text.trim().parse().ok())
        {
            return pid;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("inhibitor never started");
}

#[tokio::test]
async fn sigterm_stops_the_inhibitor() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("inhibitor.pid");
    let inhibitor = write_script(
        dir.path(),
        "caffeinate",
        &format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 30\n", pid_file.display()),
    );
    let mut child = bridge(&dir, &["--inhibitor-bin", inhibitor.to_str().unwrap()]);

    let inhibitor_pid = read_pid(&pid_file).await;
    assert!(process_alive(inhibitor_pid));

    let bridge_pid = child.id().expect("bridge is running").cast_signed();
    // SAFETY: the bridge has not been reaped, so the pid is still ours.
    unsafe {
        libc::kill(bridge_pid, libc::SIGTERM);
    }

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("bridge exits after SIGTERM")
        .unwrap();
    assert!(status.success(), "{status}");
    assert!(!process_alive(inhibitor_pid));
}

#[tokio::test]
async fn closed_stdout_is_logged_not_ignored() {
    let dir = TempDir::new().unwrap();
    let mut child = bridge(&dir, &["--no-awake"]);
    drop(child.stdout.take());

    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"hello\n").await.unwrap();
    drop(stdin);

    let mut stderr = String::new();
    child
        .stderr
        .take()
        .unwrap()
        .read_to_string(&mut stderr)
        .await
        .unwrap();
    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("bridge exits at end of input")
        .unwrap();

    assert!(status.success(), "{status}\n{stderr}");
    assert!(stderr.contains("failed to write to stdout"), "{stderr}");
}
