//! Turning invocation results into channel messages.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::InvocationError;
use crate::session::runner::InvocationResult;

/// Longest message the transport accepts, in characters.
pub const MESSAGE_LIMIT: usize = 3900;

/// Longest excerpt of error output included in a notice, in characters.
pub const ERROR_PREVIEW_LIMIT: usize = 500;

pub const NO_RESPONSE: &str = "(no response)";

/// Format a finished invocation for the channel.
///
/// Returns `None` for cancelled invocations: `!stop` already told the user.
pub fn format_result(result: &InvocationResult, timeout: Duration) -> Option<String> {
    if result.cancelled {
        return None;
    }
    if result.timed_out {
        let msg = timeout_notice(timeout);
        warn!("{msg}");
        return Some(msg);
    }

    let stdout = result.stdout.trim();
    let stderr = result.stderr.trim();

    if result.exit_code != 0 {
        warn!(exit_code = result.exit_code, "claude exited with an error");
        let mut msg = format!("⚠️ CLI error (exit code {})", result.exit_code);
        let detail = if stderr.is_empty() { stdout } else { stderr };
        if !detail.is_empty() {
            msg.push_str(": ");
            msg.push_str(preview(detail, ERROR_PREVIEW_LIMIT));
        }
        return Some(msg);
    }

    if !stdout.is_empty() {
        if !stderr.is_empty() {
            warn!(
                "claude wrote to stderr: {}",
                preview(stderr, ERROR_PREVIEW_LIMIT)
            );
        }
        let original_len = stdout.chars().count();
        if original_len <= MESSAGE_LIMIT {
            info!(chars = original_len, "sending output");
            return Some(stdout.to_string());
        }
        info!(chars = MESSAGE_LIMIT, original_len, "sending truncated output");
        return Some(format!(
            "{}\n... (truncated, showing {MESSAGE_LIMIT} of {original_len} characters)",
            preview(stdout, MESSAGE_LIMIT)
        ));
    }

    if !stderr.is_empty() {
        let msg = format!("⚠️ Error: {}", preview(stderr, ERROR_PREVIEW_LIMIT));
        warn!("{msg}");
        return Some(msg);
    }

    info!("claude produced no output");
    Some(NO_RESPONSE.to_string())
}

/// Format a failure that kept the invocation from producing a result.
pub fn format_error(err: &InvocationError) -> String {
    match err {
        InvocationError::BinaryNotFound { binary } => {
            format!("⚠️ `{binary}` CLI not found. Check your PATH.")
        }
        InvocationError::Busy => {
            "⏳ A request is already running. Use `!stop` to cancel it.".to_string()
        }
        InvocationError::Spawn(_) | InvocationError::Io(_) => {
            format!(
                "⚠️ Unexpected error: {}",
                preview(&err.to_string(), ERROR_PREVIEW_LIMIT)
            )
        }
    }
}

pub fn timeout_notice(timeout: Duration) -> String {
    format!(
        "⏱️ Timeout: no response within {} seconds.",
        timeout.as_secs()
    )
}

pub fn heartbeat_notice(elapsed: Duration) -> String {
    format!("⏳ Still working... ({})", format_elapsed(elapsed))
}

/// Render whole seconds as `1h 2m 3s`, `4m 5s`, or `6s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// The first `limit` characters of `text`, never splitting a character.
fn preview(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
