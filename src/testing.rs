//! Fake external binaries for tests.
//!
//! Each fake is a shell script in its own temp dir. The fake claude appends
//! its argv to `calls.log` (one invocation per line, args separated by 0x1f)
//! and then behaves according to the last argument:
//!
//! - `slow`: sleeps long enough to be timed out or cancelled
//! - `stubborn`: ignores SIGTERM
//! - `fail`: prints `boom` to stderr and exits 2
//! - `silent`: prints nothing
//! - `orphan`: answers and exits, leaving a background child on its pipes
//! - `spawner`: starts a background child, records its pid, then sleeps
//! - anything else: prints `reply: <payload>` and `note: <payload>` on stderr

#![allow(clippy::unwrap_used, clippy::panic, clippy::new_without_default)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use crate::transport::Outbound;

const CLAUDE_SCRIPT: &str = r#"#!/bin/sh
for a in "$@"; do printf '%s\037' "$a"; done >> "$LOG"
printf '\n' >> "$LOG"
for last; do :; done
case "$last" in
  slow) exec sleep 30 ;;
  stubborn) trap '' TERM; while :; do sleep 0.05; done ;;
  fail) echo boom >&2; exit 2 ;;
  silent) exit 0 ;;
  orphan) sleep 10 & echo "reply: $last"; exit 0 ;;
  spawner) sleep 30 & echo $! > "$PIDS"; exec sleep 30 ;;
esac
echo "reply: $last"
echo "note: $last" >&2
"#;

const INHIBITOR_SCRIPT: &str = "#!/bin/sh\nexec sleep 30\n";

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub struct FakeClaude {
    dir: TempDir,
    path: String,
}

impl FakeClaude {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let pids = dir.path().join("descendant.pid");
        let body = CLAUDE_SCRIPT
            .replace("\"$LOG\"", &format!("'{}'", log.display()))
            .replace("\"$PIDS\"", &format!("'{}'", pids.display()));
        let path = write_script(dir.path(), "claude", &body);
        Self {
            path: path.display().to_string(),
            dir,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Every argv the fake has been invoked with, oldest first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        let Ok(log) = fs::read_to_string(self.dir.path().join("calls.log")) else {
            return Vec::new();
        };
        log.lines()
            .map(|line| {
                line.split('\u{1f}')
                    .filter(|arg| !arg.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }

    /// Pid of the background child started by `spawner`, once it is recorded.
    pub async fn descendant_pid(&self) -> i32 {
        let path = self.dir.path().join("descendant.pid");
        for _ in 0..200 {
            if let Some(pid) = fs::read_to_string(&path)
                .ok()
                .and_then(|text| text.trim().parse().ok())
            {
                return pid;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("spawner never recorded its child");
    }
}

pub struct FakeInhibitor {
    _dir: TempDir,
    path: String,
}

impl FakeInhibitor {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = write_script(dir.path(), "caffeinate", INHIBITOR_SCRIPT);
        Self {
            path: path.display().to_string(),
            _dir: dir,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Outbound sink that keeps every message for inspection.
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Outbound for Recorder {
    fn send(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

/// Whether `pid` names a live process. Zombies count as dead.
pub fn process_alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The state field follows the parenthesised command name.
        Ok(stat) => stat
            .rsplit_once(')')
            .is_none_or(|(_, rest)| !rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

/// Wait up to a second for `pid` to die.
pub async fn gone(pid: i32) -> bool {
    for _ in 0..50 {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
