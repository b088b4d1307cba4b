//! Relay a chat channel to Claude Code's `-p` mode.
//!
//! Inbound text goes through the [`dispatch::Dispatcher`]: control directives
//! (`!new`, `!stop`, `!retry`, ...) are handled directly, anything else is run
//! through the single supervised claude invocation and the formatted output
//! is sent back to the channel.

pub mod caffeine;
pub mod config;
pub mod directive;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod heartbeat;
pub mod session;
pub mod terminate;
pub mod transport;

#[cfg(test)]
mod testing;
