use thiserror::Error;

/// Failures that prevent an invocation from producing a result.
///
/// Timeouts, cancellations and non-zero exits are not errors: the process
/// ran, so they are reported through [`InvocationResult`](crate::session::runner::InvocationResult).
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The external tool is not installed or not on `PATH`.
    #[error("`{binary}` not found")]
    BinaryNotFound { binary: String },

    /// Another invocation already holds the active slot.
    #[error("an invocation is already running")]
    Busy,

    #[error("failed to spawn process: {0}")]
    Spawn(std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl InvocationError {
    /// Classify a spawn failure, separating a missing binary from everything else.
    pub fn from_spawn(binary: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::BinaryNotFound {
                binary: binary.to_string(),
            }
        } else {
            Self::Spawn(err)
        }
    }
}
