//! Host configuration.

use cinder_primitives::VM_TYPE_LEN;

/// Epochs at which each behavior-changing feature activates.
///
/// A request observes a feature enabled exactly when the node's current
/// epoch is at or past the feature's threshold. Zero means always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnableEpochs {
    /// Synchronous nested contract execution.
    pub v2: u32,
    /// Asynchronous calls from contracts.
    pub v3: u32,
    /// Ahead-of-time compilation and caching at deploy time.
    pub aot_compile: u32,
    /// Callback gas reservation for asynchronous calls.
    pub dynamic_gas_lock: u32,
    /// Native token transfer recognition.
    pub esdt_functions: u32,
}

/// Configuration for a host instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// VM type tag embedded in synthesized contract addresses.
    pub vm_type: Vec<u8>,

    /// Maximum simultaneously live WASM instances per request.
    pub max_instances: usize,

    /// Maximum linear memory pages per instance (1 page = 64 KiB).
    pub max_memory_pages: u32,

    /// Cache compiled modules across invocations of the same code.
    pub use_warm_instance: bool,

    /// Storage keys starting with this prefix are writable only by
    /// protocol code.
    pub protected_key_prefix: Vec<u8>,

    /// Feature activation thresholds.
    pub enable_epochs: EnableEpochs,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            vm_type: vec![0x05, 0x00],
            max_instances: 10,
            max_memory_pages: 256, // 16 MiB
            use_warm_instance: false,
            protected_key_prefix: b"CINDER".to_vec(),
            enable_epochs: EnableEpochs::default(),
        }
    }
}

impl HostConfig {
    /// Storage key of the owner record kept next to deployed code.
    pub fn owner_key(&self) -> Vec<u8> {
        let mut key = self.protected_key_prefix.clone();
        key.extend_from_slice(b"owner");
        key
    }

    /// Storage key of the code metadata record.
    pub fn metadata_key(&self) -> Vec<u8> {
        let mut key = self.protected_key_prefix.clone();
        key.extend_from_slice(b"meta");
        key
    }
}

impl HostConfig {
    pub(crate) fn check(&self) -> Result<(), crate::error::HostSetupError> {
        use crate::error::HostSetupError;
        if self.vm_type.len() != VM_TYPE_LEN {
            return Err(HostSetupError::InvalidVmType {
                expected: VM_TYPE_LEN,
                got: self.vm_type.len(),
            });
        }
        if self.protected_key_prefix.is_empty() {
            return Err(HostSetupError::EmptyProtectedPrefix);
        }
        if self.max_instances == 0 {
            return Err(HostSetupError::ZeroInstanceCap);
        }
        Ok(())
    }
}
