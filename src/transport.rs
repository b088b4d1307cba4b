//! The chat side of the bridge, reduced to what the dispatcher needs.

use tokio::sync::mpsc;
use tracing::debug;

/// A message seen on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub channel_id: String,
    pub text: String,
    /// Sent by the bridge itself (e.g. a bot message echoed back).
    pub self_originated: bool,
}

impl InboundEvent {
    pub fn user(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            text: text.into(),
            self_originated: false,
        }
    }
}

/// Fire-and-forget delivery of text to the target channel.
pub trait Outbound: Send + Sync + 'static {
    fn send(&self, text: &str);
}

/// Queues outbound messages for a writer task that owns the real transport.
#[derive(Debug, Clone)]
pub struct ChannelOutbound {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelOutbound {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Outbound for ChannelOutbound {
    fn send(&self, text: &str) {
        if self.tx.send(text.to_string()).is_err() {
            debug!("outbound writer gone, dropping message");
        }
    }
}
