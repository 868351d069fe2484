//! Epoch-gated feature flags.
//!
//! Flags are toggled exactly once per request, at entry, by comparing the
//! node's current epoch against each feature's activation threshold. During
//! execution they are read-only: contexts consult an immutable snapshot, so
//! a flag can never change mid-frame. The atomics exist for the benefit of
//! observers outside the request path (logging, introspection), which read
//! without taking the execution guard.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use crate::config::EnableEpochs;

/// Live flag set owned by the host.
#[derive(Debug, Default)]
pub struct FeatureFlags {
    v2: AtomicBool,
    v3: AtomicBool,
    aot_compile: AtomicBool,
    dynamic_gas_lock: AtomicBool,
    esdt_functions: AtomicBool,
}

/// Immutable per-request view of the flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSnapshot {
    pub v2: bool,
    pub v3: bool,
    pub aot_compile: bool,
    pub dynamic_gas_lock: bool,
    pub esdt_functions: bool,
}

impl FeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derive every flag from the current epoch and return the snapshot
    /// the request will execute under.
    pub fn toggle_for_epoch(&self, epochs: &EnableEpochs, epoch: u32) -> FlagSnapshot {
        let snapshot = FlagSnapshot {
            v2: epoch >= epochs.v2,
            v3: epoch >= epochs.v3,
            aot_compile: epoch >= epochs.aot_compile,
            dynamic_gas_lock: epoch >= epochs.dynamic_gas_lock,
            esdt_functions: epoch >= epochs.esdt_functions,
        };
        self.v2.store(snapshot.v2, Ordering::Relaxed);
        self.v3.store(snapshot.v3, Ordering::Relaxed);
        self.aot_compile.store(snapshot.aot_compile, Ordering::Relaxed);
        self.dynamic_gas_lock
            .store(snapshot.dynamic_gas_lock, Ordering::Relaxed);
        self.esdt_functions
            .store(snapshot.esdt_functions, Ordering::Relaxed);
        trace!(
            epoch,
            v2 = snapshot.v2,
            v3 = snapshot.v3,
            aot = snapshot.aot_compile,
            dyn_gas_lock = snapshot.dynamic_gas_lock,
            esdt = snapshot.esdt_functions,
            "feature flags toggled"
        );
        snapshot
    }

    pub fn is_v2_enabled(&self) -> bool {
        self.v2.load(Ordering::Relaxed)
    }

    pub fn is_v3_enabled(&self) -> bool {
        self.v3.load(Ordering::Relaxed)
    }

    pub fn is_aot_compile_enabled(&self) -> bool {
        self.aot_compile.load(Ordering::Relaxed)
    }

    pub fn is_dynamic_gas_lock_enabled(&self) -> bool {
        self.dynamic_gas_lock.load(Ordering::Relaxed)
    }

    pub fn is_esdt_functions_enabled(&self) -> bool {
        self.esdt_functions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epochs() -> EnableEpochs {
        EnableEpochs {
            v2: 2,
            v3: 3,
            aot_compile: 5,
            dynamic_gas_lock: 5,
            esdt_functions: 10,
        }
    }

    #[test]
    fn test_all_disabled_before_thresholds() {
        let flags = FeatureFlags::new();
        let snapshot = flags.toggle_for_epoch(&epochs(), 0);
        assert_eq!(snapshot, FlagSnapshot::default());
        assert!(!flags.is_v2_enabled());
    }

    #[test]
    fn test_monotonic_activation() {
        let flags = FeatureFlags::new();
        let config = epochs();

        let at_2 = flags.toggle_for_epoch(&config, 2);
        assert!(at_2.v2);
        assert!(!at_2.v3);

        let at_5 = flags.toggle_for_epoch(&config, 5);
        assert!(at_5.v2 && at_5.v3 && at_5.aot_compile && at_5.dynamic_gas_lock);
        assert!(!at_5.esdt_functions);

        let at_10 = flags.toggle_for_epoch(&config, 10);
        assert!(at_10.esdt_functions);
    }

    #[test]
    fn test_flags_retoggle_downward() {
        // An epoch rollback on the node side must be reflected faithfully.
        let flags = FeatureFlags::new();
        let config = epochs();
        flags.toggle_for_epoch(&config, 10);
        let back = flags.toggle_for_epoch(&config, 0);
        assert_eq!(back, FlagSnapshot::default());
        assert!(!flags.is_esdt_functions_enabled());
    }

    #[test]
    fn test_zero_threshold_is_always_on() {
        let flags = FeatureFlags::new();
        let snapshot = flags.toggle_for_epoch(&EnableEpochs::default(), 0);
        assert!(snapshot.v2 && snapshot.v3);
    }
}
