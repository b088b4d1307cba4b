use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::info;

use crate::terminate::terminate;

/// Keeps a sleep inhibitor (`caffeinate -i`) running while enabled.
///
/// At most one companion process is alive at a time. The child is spawned
/// with kill-on-drop, so dropping the toggle never leaks it.
pub struct Caffeine {
    binary: String,
    grace_period: Duration,
    child: Mutex<Option<Child>>,
}

impl Caffeine {
    pub fn new(binary: impl Into<String>, grace_period: Duration) -> Self {
        Self {
            binary: binary.into(),
            grace_period,
            child: Mutex::new(None),
        }
    }

    /// Start the inhibitor unless one is already alive. Returns its pid.
    pub async fn start(&self) -> Result<Option<u32>> {
        let mut child = self.child.lock().await;
        if let Some(running) = child.as_mut() {
            if running.try_wait()?.is_none() {
                return Ok(running.id());
            }
        }

        let spawned = tokio::process::Command::new(&self.binary)
            .arg("-i")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.binary))?;
        let pid = spawned.id();
        info!(?pid, "{} started", self.binary);
        *child = Some(spawned);
        Ok(pid)
    }

    /// Stop the inhibitor if it is alive. Returns whether anything was stopped.
    pub async fn stop(&self) -> Result<bool> {
        let Some(mut running) = self.child.lock().await.take() else {
            return Ok(false);
        };
        if running.try_wait()?.is_some() {
            return Ok(false);
        }
        terminate(&mut running, self.grace_period)
            .await
            .with_context(|| format!("failed to stop {}", self.binary))?;
        info!("{} stopped", self.binary);
        Ok(true)
    }

    pub async fn is_running(&self) -> bool {
        self.pid().await.is_some()
    }

    /// Pid of the live inhibitor, if any.
    pub async fn pid(&self) -> Option<u32> {
        let mut child = self.child.lock().await;
        let running = child.as_mut()?;
        match running.try_wait() {
            Ok(None) => running.id(),
            _ => None,
        }
    }
}
