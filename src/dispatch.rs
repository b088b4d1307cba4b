use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::caffeine::Caffeine;
use crate::config::Config;
use crate::directive::{Directive, HELP_TEXT, Input};
use crate::format::{format_error, format_result, heartbeat_notice};
use crate::heartbeat::Heartbeat;
use crate::session::runner::{Invocation, Supervisor};
use crate::session::state::SessionState;
use crate::transport::{InboundEvent, Outbound};

pub const RESET_MESSAGE: &str = "🔄 Session reset. Starting a new conversation.";
pub const SLEEP_MESSAGE: &str =
    "😴 Sleep allowed. The machine can go to sleep normally.\nUse `!awake` to prevent sleep again.";
pub const AWAKE_MESSAGE: &str = "☀️ Sleep prevention enabled. The machine will stay awake.";
pub const STOPPED_MESSAGE: &str = "🛑 Stopped the running request.";
pub const NOTHING_RUNNING_MESSAGE: &str = "Nothing is running.";
pub const NOTHING_TO_RETRY_MESSAGE: &str = "Nothing to retry.";
pub const RETRY_MESSAGE: &str = "🔁 Retrying the last message.";

/// Routes inbound channel text to directives or to claude.
///
/// Cheap to clone; all clones share one session, supervisor and inhibitor.
pub struct Dispatcher<O> {
    inner: Arc<Inner<O>>,
}

impl<O> Clone for Dispatcher<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<O> {
    target_channel: String,
    timeout: Duration,
    heartbeat: Heartbeat,
    session: Mutex<SessionState>,
    supervisor: Supervisor,
    caffeine: Caffeine,
    outbound: O,
}

impl<O> Inner<O> {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<O: Outbound> Dispatcher<O> {
    pub fn new(target_channel: impl Into<String>, config: &Config, outbound: O) -> Self {
        Self {
            inner: Arc::new(Inner {
                target_channel: target_channel.into(),
                timeout: config.timeout,
                heartbeat: Heartbeat::new(config.heartbeat_interval),
                session: Mutex::new(SessionState::new()),
                supervisor: Supervisor::new(config.supervisor()),
                caffeine: Caffeine::new(&config.inhibitor_bin, config.grace_period),
                outbound,
            }),
        }
    }

    pub fn target_channel(&self) -> &str {
        &self.inner.target_channel
    }

    /// A snapshot of the session state.
    pub fn session(&self) -> SessionState {
        self.inner.session().clone()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.inner.supervisor
    }

    pub fn caffeine(&self) -> &Caffeine {
        &self.inner.caffeine
    }

    /// Handle one inbound event.
    ///
    /// Directives complete before this returns. A payload is spawned here and
    /// awaited on a background task, whose handle is returned; the caller may
    /// drop it.
    pub async fn handle(&self, event: &InboundEvent) -> Option<JoinHandle<()>> {
        if event.self_originated {
            debug!("ignoring self-originated message");
            return None;
        }
        if event.channel_id != self.inner.target_channel {
            debug!(channel = %event.channel_id, "ignoring message from foreign channel");
            return None;
        }

        match Input::parse(&event.text) {
            Input::Empty => None,
            Input::Directive(directive) => self.directive(directive).await,
            Input::Payload(text) => {
                info!("input: {text}");
                self.inner.session().record_input(text);
                self.forward(text, None)
            }
        }
    }

    async fn directive(&self, directive: Directive) -> Option<JoinHandle<()>> {
        let inner = &self.inner;
        match directive {
            Directive::New => {
                inner.session().reset();
                info!("session reset");
                inner.outbound.send(RESET_MESSAGE);
            }
            Directive::Sleep => match inner.caffeine.stop().await {
                Ok(_) => inner.outbound.send(SLEEP_MESSAGE),
                Err(e) => self.report_failure(&e),
            },
            Directive::Awake => match inner.caffeine.start().await {
                Ok(_) => inner.outbound.send(AWAKE_MESSAGE),
                Err(e) => self.report_failure(&e),
            },
            Directive::Stop => {
                if inner.supervisor.cancel().await {
                    inner.outbound.send(STOPPED_MESSAGE);
                } else {
                    inner.outbound.send(NOTHING_RUNNING_MESSAGE);
                }
            }
            Directive::Retry => {
                let last = inner.session().last_input().map(str::to_string);
                let Some(text) = last else {
                    inner.outbound.send(NOTHING_TO_RETRY_MESSAGE);
                    return None;
                };
                info!("retrying: {text}");
                return self.forward(&text, Some(RETRY_MESSAGE));
            }
            Directive::Help => inner.outbound.send(HELP_TEXT),
        }
        None
    }

    /// Spawn claude for `payload` and complete it in the background.
    ///
    /// The spawn itself happens on the caller so that a concurrent second
    /// payload is rejected as busy in arrival order. `ack` is sent only once
    /// the process is actually running.
    fn forward(&self, payload: &str, ack: Option<&str>) -> Option<JoinHandle<()>> {
        let continued = self.inner.session().is_continued();
        match self.inner.supervisor.spawn(payload, continued) {
            Ok(invocation) => {
                if let Some(ack) = ack {
                    self.inner.outbound.send(ack);
                }
                let inner = Arc::clone(&self.inner);
                Some(tokio::spawn(complete(inner, invocation)))
            }
            Err(e) => {
                warn!("invocation not started: {e}");
                self.inner.outbound.send(&format_error(&e));
                None
            }
        }
    }

    fn report_failure(&self, err: &anyhow::Error) {
        error!("{err:#}");
        self.inner.outbound.send(&format!("⚠️ {err:#}"));
    }

    /// Cancel any running invocation and stop the inhibitor.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.supervisor.cancel().await {
            info!("cancelled running invocation on shutdown");
        }
        self.inner.caffeine.stop().await?;
        Ok(())
    }
}

async fn complete<O: Outbound>(inner: Arc<Inner<O>>, invocation: Invocation) {
    let liveness = invocation.liveness();
    let heartbeat = {
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            inner
                .heartbeat
                .run(
                    || liveness.is_alive(),
                    |elapsed| inner.outbound.send(&heartbeat_notice(elapsed)),
                )
                .await;
        })
    };

    let outcome = invocation.wait().await;
    heartbeat.abort();

    match outcome {
        Ok(result) => {
            if result.succeeded() {
                inner.session().mark_started();
            }
            match format_result(&result, inner.timeout) {
                Some(message) => inner.outbound.send(&message),
                None => info!("invocation cancelled, no reply sent"),
            }
        }
        Err(e) => {
            error!("invocation failed: {e}");
            inner.outbound.send(&format_error(&e));
        }
    }
}
