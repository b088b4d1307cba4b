use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::InvocationError;
use crate::terminate::terminate;

/// How long to keep reading output once the process is gone. Descendants
/// that inherited the pipes can keep them open indefinitely.
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

/// How to invoke the external tool.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Name or path of the claude binary.
    pub binary: String,
    /// Wall-clock budget for one invocation, measured from spawn.
    pub timeout: Duration,
    /// How long to wait after SIGTERM before killing.
    pub grace_period: Duration,
}

/// Everything one finished invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 when the process was ended by a signal.
    pub exit_code: i32,
    pub timed_out: bool,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl InvocationResult {
    /// True when the process exited on its own with status 0.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == 0
    }
}

/// The single in-flight process, as seen by everyone but its owner.
struct ActiveInvocation {
    id: u64,
    pid: Option<u32>,
    started_at: Instant,
    cancel_tx: Option<oneshot::Sender<()>>,
    finished: watch::Receiver<bool>,
}

#[derive(Default)]
struct Slot {
    active: Option<ActiveInvocation>,
    next_id: u64,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the one active claude invocation.
///
/// Spawning while an invocation is active is rejected with
/// [`InvocationError::Busy`]; nothing is queued.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    slot: Arc<Mutex<Slot>>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config: Arc::new(config),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Whether an invocation currently holds the active slot.
    pub fn is_running(&self) -> bool {
        lock(&self.slot).active.is_some()
    }

    /// Spawn claude for `payload` and install it as the active invocation.
    pub fn spawn(&self, payload: &str, continued: bool) -> Result<Invocation, InvocationError> {
        // Holding the lock across spawn makes check-and-install atomic.
        let mut slot = lock(&self.slot);
        if slot.active.is_some() {
            return Err(InvocationError::Busy);
        }

        let args = build_args(payload, continued);
        let mut cmd = tokio::process::Command::new(&self.config.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| InvocationError::from_spawn(&self.config.binary, e))?;

        let stdout = child.stdout.take().map(OutputPipe::spawn);
        let stderr = child.stderr.take().map(OutputPipe::spawn);

        let id = slot.next_id;
        slot.next_id += 1;
        let started_at = Instant::now();
        let pid = child.id();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = watch::channel(false);
        slot.active = Some(ActiveInvocation {
            id,
            pid,
            started_at,
            cancel_tx: Some(cancel_tx),
            finished: finished_rx,
        });
        drop(slot);

        info!(id, ?pid, continued, "spawned {}", self.config.binary);

        Ok(Invocation {
            child,
            stdout,
            stderr,
            cancel_rx,
            started_at,
            exited: Arc::new(AtomicBool::new(false)),
            config: Arc::clone(&self.config),
            guard: SlotGuard {
                slot: Arc::clone(&self.slot),
                id,
                finished: finished_tx,
                released: false,
            },
        })
    }

    /// Spawn and wait in one step.
    pub async fn run(
        &self,
        payload: &str,
        continued: bool,
    ) -> Result<InvocationResult, InvocationError> {
        self.spawn(payload, continued)?.wait().await
    }

    /// Ask the active invocation to terminate.
    ///
    /// Returns false when nothing was running. Otherwise waits until the
    /// invocation has been torn down, bounded by the grace period.
    pub async fn cancel(&self) -> bool {
        let (cancel_tx, mut finished, pid) = {
            let mut slot = lock(&self.slot);
            let Some(active) = slot.active.as_mut() else {
                return false;
            };
            (active.cancel_tx.take(), active.finished.clone(), active.pid)
        };

        info!(?pid, "cancelling active invocation");
        if let Some(tx) = cancel_tx {
            let _ = tx.send(());
        }

        // The slot is released as soon as the process group is down.
        let bound = self.config.grace_period + Duration::from_secs(1);
        if tokio::time::timeout(bound, finished.wait_for(|done| *done))
            .await
            .is_err()
        {
            warn!(?pid, "invocation did not finish within the cancel bound");
        }
        true
    }
}

/// A spawned invocation. Dropping it kills the process and frees the slot.
pub struct Invocation {
    child: Child,
    stdout: Option<OutputPipe>,
    stderr: Option<OutputPipe>,
    cancel_rx: oneshot::Receiver<()>,
    started_at: Instant,
    exited: Arc<AtomicBool>,
    config: Arc<SupervisorConfig>,
    guard: SlotGuard,
}

#[derive(Clone, Copy)]
enum Outcome {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

impl Invocation {
    /// A handle that reports whether this invocation's process is still running.
    pub fn liveness(&self) -> Liveness {
        Liveness {
            exited: Arc::clone(&self.exited),
            started_at: self.started_at,
        }
    }

    /// Wait for exit, timeout, or cancellation, whichever comes first.
    pub async fn wait(mut self) -> Result<InvocationResult, InvocationError> {
        let deadline = tokio::time::Instant::from_std(self.started_at + self.config.timeout);

        let outcome = tokio::select! {
            status = self.child.wait() => Outcome::Exited(status?),
            () = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
            Ok(()) = &mut self.cancel_rx => Outcome::Cancelled,
        };
        self.exited.store(true, Ordering::Release);

        let exit_code = match outcome {
            Outcome::Exited(status) => status.code().unwrap_or(-1),
            Outcome::TimedOut | Outcome::Cancelled => {
                let how = terminate(&mut self.child, self.config.grace_period).await?;
                debug!(id = self.guard.id, ?how, "terminated");
                -1
            }
        };
        self.guard.release();

        let (stdout, stderr) = drain(self.stdout.take(), self.stderr.take()).await;

        Ok(InvocationResult {
            stdout,
            stderr,
            exit_code,
            timed_out: matches!(outcome, Outcome::TimedOut),
            cancelled: matches!(outcome, Outcome::Cancelled),
            elapsed: self.started_at.elapsed(),
        })
    }
}

/// Liveness check handed to observers such as the heartbeat.
#[derive(Clone)]
pub struct Liveness {
    exited: Arc<AtomicBool>,
    started_at: Instant,
}

impl Liveness {
    /// False from the moment the process exits or is told to stop.
    pub fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::Acquire)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// Clears the active slot once the process is reaped, and on every other
/// exit path, including drops and panics.
struct SlotGuard {
    slot: Arc<Mutex<Slot>>,
    id: u64,
    finished: watch::Sender<bool>,
    released: bool,
}

impl SlotGuard {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut slot = lock(&self.slot);
        if slot.active.as_ref().is_some_and(|active| active.id == self.id) {
            slot.active = None;
        }
        drop(slot);
        self.finished.send_replace(true);
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build the claude CLI arguments for one payload.
pub fn build_args(payload: &str, continued: bool) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        "--dangerously-skip-permissions".to_string(),
    ];
    if continued {
        args.push("-c".to_string());
    }
    args.push(payload.to_string());
    args
}

/// A pipe reader that appends into a shared buffer, so whatever arrived
/// before the drain bound survives an abort.
struct OutputPipe {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputPipe {
    fn spawn<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        warn!("failed to read process output: {e}");
                        break;
                    }
                }
            }
        });
        Self { buf, task }
    }

    fn text(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Read both pipes to EOF, concurrently, for at most [`OUTPUT_DRAIN`].
async fn drain(stdout: Option<OutputPipe>, stderr: Option<OutputPipe>) -> (String, String) {
    let mut pipes = [stdout, stderr];
    let eof = async {
        for pipe in pipes.iter_mut().flatten() {
            if let Err(e) = (&mut pipe.task).await {
                warn!("output reader task failed: {e}");
            }
        }
    };
    if tokio::time::timeout(OUTPUT_DRAIN, eof).await.is_err() {
        warn!("output pipe still open after exit, keeping what was read");
    }

    let [stdout, stderr] = pipes.map(|pipe| {
        pipe.map(|pipe| {
            pipe.task.abort();
            pipe.text()
        })
        .unwrap_or_default()
    });
    (stdout, stderr)
}
