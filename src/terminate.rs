//! Process-group termination with signal escalation.
//!
//! Children are spawned as leaders of their own process group, so one signal
//! to `-pgid` reaches the tool and everything it started. SIGTERM goes first;
//! after the grace period any survivor in the group gets SIGKILL.

use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

/// How often to check whether the group has emptied after SIGTERM.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a terminated child actually went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child had already exited before any signal was sent.
    AlreadyExited,
    /// The child exited within the grace period after SIGTERM. Descendants
    /// still alive at the end of the grace period were killed.
    Graceful,
    /// The child ignored SIGTERM and was killed along with its group.
    Killed,
}

/// Terminate `child` and its process group: SIGTERM, wait up to `grace`,
/// then SIGKILL.
///
/// `child` must have been spawned with `process_group(0)`. Always reaps the
/// child before returning, so no zombie is left behind.
pub async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<Termination> {
    // `id()` is None once the child has been reaped, and then the group id
    // may belong to someone else.
    let Some(pgid) = child.id().map(u32::cast_signed) else {
        return Ok(Termination::AlreadyExited);
    };

    if child.try_wait()?.is_some() {
        // The leader is gone but may have left stragglers behind.
        signal_group(pgid, libc::SIGKILL);
        return Ok(Termination::AlreadyExited);
    }

    debug!(pgid, "sending SIGTERM to process group");
    signal_group(pgid, libc::SIGTERM);
    let deadline = tokio::time::Instant::now() + grace;

    if tokio::time::timeout_at(deadline, child.wait()).await.is_err() {
        warn!(
            pgid,
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "process ignored SIGTERM, killing"
        );
        signal_group(pgid, libc::SIGKILL);
        child.kill().await?;
        return Ok(Termination::Killed);
    }

    // The leader is down; give the rest of the group what is left of the grace.
    while group_alive(pgid) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    if group_alive(pgid) {
        debug!(pgid, "descendants outlived the grace period, killing");
        signal_group(pgid, libc::SIGKILL);
    }
    Ok(Termination::Graceful)
}

fn signal_group(pgid: i32, signal: libc::c_int) {
    if pgid <= 1 {
        return;
    }
    // SAFETY: kill(2) has no memory-safety preconditions. ESRCH just means
    // the group is already empty.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

fn group_alive(pgid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    pgid > 1 && unsafe { libc::kill(-pgid, 0) } == 0
}
