//! Errors crossing the node hook boundary.

/// Failure reported by the node-side state database or a built-in function.
///
/// Hook errors generally surface to the caller as an execution failure; the
/// host never retries a hook call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// The requested account does not exist.
    #[error("account not found")]
    AccountNotFound,

    /// The requested block is outside the node's known range.
    #[error("block not found: nonce {0}")]
    BlockNotFound(u64),

    /// A built-in function rejected its input.
    #[error("built-in function error: {0}")]
    BuiltinFailed(String),

    /// The node database failed in a way the host cannot interpret.
    #[error("hook internal error: {0}")]
    Internal(String),
}
