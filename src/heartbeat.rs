use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Liveness is polled at least this often so the reporter notices an exit
/// promptly even with long notice intervals.
const MAX_POLL: Duration = Duration::from_secs(1);

/// Emits a progress notice for every full interval an invocation stays alive.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    interval: Duration,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Watch `is_alive` until it reports false, calling `notify` with the
    /// elapsed time at each interval boundary reached while still alive.
    ///
    /// Liveness is re-checked immediately before every notice, so a process
    /// that exits between polls never produces a stale one. Returns the
    /// number of notices sent.
    pub async fn run<F, N>(&self, is_alive: F, mut notify: N) -> u32
    where
        F: Fn() -> bool,
        N: FnMut(Duration),
    {
        let start = Instant::now();
        let poll = self.interval.min(MAX_POLL);
        let mut next_notice = self.interval;
        let mut sent = 0;

        loop {
            tokio::time::sleep(poll).await;
            if !is_alive() {
                debug!(sent, "heartbeat stopped, process gone");
                return sent;
            }
            let elapsed = start.elapsed();
            if elapsed >= next_notice {
                notify(elapsed);
                sent += 1;
                while next_notice <= elapsed {
                    next_notice += self.interval;
                }
            }
        }
    }
}
