//! Host construction errors.
//!
//! Frame-level failures travel as `cinder_primitives::VMError` and end up
//! in the response; the variants here can only occur while wiring a host
//! together and are returned to the embedding node directly.

/// Error raised by `Host::new` when a collaborator or parameter is unusable.
#[derive(Debug, thiserror::Error)]
pub enum HostSetupError {
    /// The gas schedule failed validation.
    #[error("invalid gas schedule: {0}")]
    InvalidGasSchedule(String),

    /// The VM type tag has the wrong length.
    #[error("vm type tag must be {expected} bytes, got {got}")]
    InvalidVmType { expected: usize, got: usize },

    /// The protected-key prefix must not be empty, otherwise every guest
    /// write would be rejected.
    #[error("protected key prefix must not be empty")]
    EmptyProtectedPrefix,

    /// The instance cap must allow at least the top-level instance.
    #[error("instance cap must be nonzero")]
    ZeroInstanceCap,

    /// The WASM backend rejected the deterministic engine configuration.
    #[error("engine setup failed: {0}")]
    Engine(#[from] anyhow::Error),
}
