//! Per-account storage access with a frame-local write overlay.
//!
//! Reads consult the overlay first and fall through to the node hook;
//! writes buffer in the overlay until the request completes, when they are
//! flattened into the output summary as (old, new) transitions. Keys under
//! the protected prefix are reserved for protocol code: guests may read
//! them but never write them.

use std::collections::BTreeMap;
use std::sync::Arc;

use cinder_hostapi::BlockchainHook;
use cinder_primitives::{Address, StorageUpdate, VMError, VMOutput, VMResult};

use crate::contexts::metering::MeteringContext;

type SlotKey = (Address, Vec<u8>);

#[derive(Debug, Default)]
struct StorageSnapshot {
    overlay: BTreeMap<SlotKey, Vec<u8>>,
    originals: BTreeMap<SlotKey, Vec<u8>>,
}

/// Buffered storage state for the active request.
#[derive(Debug)]
pub struct StorageContext {
    protected_prefix: Vec<u8>,
    /// Pending writes, visible to subsequent reads in the same request.
    overlay: BTreeMap<SlotKey, Vec<u8>>,
    /// Committed values as first observed, doubling as the read cache and
    /// as the `old_value` source when flattening.
    originals: BTreeMap<SlotKey, Vec<u8>>,
    stack: Vec<StorageSnapshot>,
}

impl StorageContext {
    pub fn new(protected_prefix: Vec<u8>) -> Self {
        Self {
            protected_prefix,
            overlay: BTreeMap::new(),
            originals: BTreeMap::new(),
            stack: Vec::new(),
        }
    }

    pub fn init_state(&mut self) {
        self.overlay.clear();
        self.originals.clear();
        self.stack.clear();
    }

    pub fn push_state(&mut self) {
        self.stack.push(StorageSnapshot {
            overlay: self.overlay.clone(),
            originals: self.originals.clone(),
        });
    }

    pub fn pop_merge(&mut self) {
        self.stack.pop();
    }

    pub fn pop_discard(&mut self) {
        if let Some(saved) = self.stack.pop() {
            self.overlay = saved.overlay;
            self.originals = saved.originals;
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns true if guests must not write this key.
    pub fn is_protected(&self, key: &[u8]) -> bool {
        key.starts_with(&self.protected_prefix)
    }

    /// Value currently visible for (address, key): overlay, then committed.
    fn current_value(
        &mut self,
        hook: &Arc<dyn BlockchainHook>,
        address: &Address,
        key: &[u8],
    ) -> VMResult<Vec<u8>> {
        let slot = (*address, key.to_vec());
        if let Some(pending) = self.overlay.get(&slot) {
            return Ok(pending.clone());
        }
        if let Some(original) = self.originals.get(&slot) {
            return Ok(original.clone());
        }
        let committed = hook
            .get_storage_data(address, key)
            .map_err(|e| VMError::ExecutionFailed(e.to_string()))?;
        self.originals.insert(slot, committed.clone());
        Ok(committed)
    }

    /// Read a value, charging the flat read fee plus the per-byte rate.
    pub fn load(
        &mut self,
        hook: &Arc<dyn BlockchainHook>,
        metering: &mut MeteringContext,
        address: &Address,
        key: &[u8],
    ) -> VMResult<Vec<u8>> {
        let value = self.current_value(hook, address, key)?;
        let costs = metering.schedule().storage.clone();
        metering.charge_with_bytes(costs.load_base, costs.load_per_byte, value.len())?;
        Ok(value)
    }

    /// Write a value on behalf of the guest.
    ///
    /// Protected keys are rejected before anything is charged or changed.
    pub fn store(
        &mut self,
        hook: &Arc<dyn BlockchainHook>,
        metering: &mut MeteringContext,
        address: &Address,
        key: &[u8],
        value: &[u8],
    ) -> VMResult<()> {
        if self.is_protected(key) {
            return Err(VMError::UserError(format!(
                "cannot write to storage under protected key prefix {}",
                cinder_primitives::types::bytes_to_hex(&self.protected_prefix)
            )));
        }
        self.store_with_charge(hook, metering, address, key, value)
    }

    /// Write with protocol privilege: no prefix restriction, no charge.
    pub fn store_protected(
        &mut self,
        hook: &Arc<dyn BlockchainHook>,
        address: &Address,
        key: &[u8],
        value: &[u8],
    ) -> VMResult<()> {
        // Record the original before shadowing it.
        let _ = self.current_value(hook, address, key)?;
        self.overlay.insert((*address, key.to_vec()), value.to_vec());
        Ok(())
    }

    /// Delta-model pricing: what a write costs depends on what it changes.
    fn store_with_charge(
        &mut self,
        hook: &Arc<dyn BlockchainHook>,
        metering: &mut MeteringContext,
        address: &Address,
        key: &[u8],
        value: &[u8],
    ) -> VMResult<()> {
        let current = self.current_value(hook, address, key)?;
        let costs = metering.schedule().storage.clone();

        if value == current.as_slice() {
            metering.charge(costs.store_unchanged)?;
            return Ok(());
        }

        if current.is_empty() {
            // Populating an empty slot is the expensive case.
            metering.charge_with_bytes(costs.store_base, costs.store_new_per_byte, value.len())?;
        } else if value.is_empty() {
            // Clearing a slot refunds the released bytes.
            metering.charge(costs.store_base)?;
            metering.add_refund((current.len() as u64).saturating_mul(costs.release_per_byte));
        } else {
            metering.charge_with_bytes(costs.store_base, costs.persist_per_byte, value.len())?;
            if current.len() > value.len() {
                let released = (current.len() - value.len()) as u64;
                metering.add_refund(released.saturating_mul(costs.release_per_byte));
            }
        }

        self.overlay.insert((*address, key.to_vec()), value.to_vec());
        Ok(())
    }

    /// Flatten the overlay into the output summary.
    ///
    /// Writes that ended up equal to the committed value are dropped; the
    /// node has nothing to do for them.
    pub fn commit_to_output(&mut self, output: &mut VMOutput) {
        for ((address, key), new_value) in &self.overlay {
            let old_value = self
                .originals
                .get(&(*address, key.clone()))
                .cloned()
                .unwrap_or_default();
            if &old_value == new_value {
                continue;
            }
            output.account_mut(address).storage_updates.insert(
                key.clone(),
                StorageUpdate {
                    old_value,
                    new_value: new_value.clone(),
                },
            );
        }
    }
}
