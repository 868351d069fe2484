//! Read-through cache over the node hook.
//!
//! Every read performed during a request is cached so a second read of the
//! same slot returns the same value even if the underlying database moves
//! on. Epoch, round, and last block nonce are captured once at request
//! entry. Hook failures surface as execution failures.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_bigint::BigUint;

use cinder_hostapi::BlockchainHook;
use cinder_primitives::{Address, Hash, VMError, VMResult};

/// Cached view of the node's state for one request.
pub struct BlockchainContext {
    hook: Arc<dyn BlockchainHook>,
    balances: BTreeMap<Address, BigUint>,
    nonces: BTreeMap<Address, u64>,
    codes: BTreeMap<Address, Vec<u8>>,
    shards: BTreeMap<Address, u32>,
    block_hashes: BTreeMap<u64, Hash>,
    epoch: u32,
    round: u64,
    last_nonce: u64,
    stack_depth: usize,
}

impl BlockchainContext {
    pub fn new(hook: Arc<dyn BlockchainHook>) -> Self {
        Self {
            hook,
            balances: BTreeMap::new(),
            nonces: BTreeMap::new(),
            codes: BTreeMap::new(),
            shards: BTreeMap::new(),
            block_hashes: BTreeMap::new(),
            epoch: 0,
            round: 0,
            last_nonce: 0,
            stack_depth: 0,
        }
    }

    /// Drop all cached reads and capture the block coordinates.
    pub fn init_state(&mut self) {
        self.balances.clear();
        self.nonces.clear();
        self.codes.clear();
        self.shards.clear();
        self.block_hashes.clear();
        self.epoch = self.hook.current_epoch();
        self.round = self.hook.current_round();
        self.last_nonce = self.hook.last_nonce();
        self.stack_depth = 0;
    }

    pub fn hook(&self) -> &Arc<dyn BlockchainHook> {
        &self.hook
    }

    pub fn get_balance(&mut self, address: &Address) -> VMResult<BigUint> {
        if let Some(cached) = self.balances.get(address) {
            return Ok(cached.clone());
        }
        let balance = self
            .hook
            .get_balance(address)
            .map_err(|e| VMError::ExecutionFailed(e.to_string()))?;
        self.balances.insert(*address, balance.clone());
        Ok(balance)
    }

    pub fn get_nonce(&mut self, address: &Address) -> VMResult<u64> {
        if let Some(cached) = self.nonces.get(address) {
            return Ok(*cached);
        }
        let nonce = self
            .hook
            .get_nonce(address)
            .map_err(|e| VMError::ExecutionFailed(e.to_string()))?;
        self.nonces.insert(*address, nonce);
        Ok(nonce)
    }

    /// Deployed code at the address; empty means no contract there.
    pub fn get_code(&mut self, address: &Address) -> VMResult<Vec<u8>> {
        if let Some(cached) = self.codes.get(address) {
            return Ok(cached.clone());
        }
        let code = self
            .hook
            .get_code(address)
            .map_err(|e| VMError::ExecutionFailed(e.to_string()))?;
        self.codes.insert(*address, code.clone());
        Ok(code)
    }

    pub fn shard_of_address(&mut self, address: &Address) -> u32 {
        if let Some(cached) = self.shards.get(address) {
            return *cached;
        }
        let shard = self.hook.get_shard_of_address(address);
        self.shards.insert(*address, shard);
        shard
    }

    pub fn block_hash(&mut self, nonce: u64) -> VMResult<Hash> {
        if let Some(cached) = self.block_hashes.get(&nonce) {
            return Ok(*cached);
        }
        let hash = self
            .hook
            .block_hash(nonce)
            .map_err(|e| VMError::ExecutionFailed(e.to_string()))?;
        self.block_hashes.insert(nonce, hash);
        Ok(hash)
    }

    pub fn new_address(&self, creator: &Address, nonce: u64, vm_type: &[u8]) -> VMResult<Address> {
        self.hook
            .new_address(creator, nonce, vm_type)
            .map_err(|e| VMError::ExecutionFailed(e.to_string()))
    }

    pub fn current_epoch(&self) -> u32 {
        self.epoch
    }

    pub fn current_round(&self) -> u64 {
        self.round
    }

    pub fn last_nonce(&self) -> u64 {
        self.last_nonce
    }

    // The cache is read-only state, so frames have nothing to roll back;
    // the depth counter keeps the stack discipline observable.

    pub fn push_state(&mut self) {
        self.stack_depth += 1;
    }

    pub fn pop_state(&mut self) {
        self.stack_depth = self.stack_depth.saturating_sub(1);
    }

    pub fn clear_state_stack(&mut self) {
        self.stack_depth = 0;
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }
}

impl std::fmt::Debug for BlockchainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainContext")
            .field("epoch", &self.epoch)
            .field("round", &self.round)
            .field("last_nonce", &self.last_nonce)
            .field("cached_balances", &self.balances.len())
            .field("cached_codes", &self.codes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_hostapi::MemWorld;

    const ALICE: Address = [1u8; 32];

    #[test]
    fn test_reads_are_cached_within_request() {
        let world = Arc::new(MemWorld::new());
        world.put_balance(ALICE, 1000);

        let mut ctx = BlockchainContext::new(world.clone());
        ctx.init_state();
        assert_eq!(ctx.get_balance(&ALICE).unwrap(), BigUint::from(1000u32));

        // The database moves on, but the request keeps its first read.
        world.put_balance(ALICE, 5);
        assert_eq!(ctx.get_balance(&ALICE).unwrap(), BigUint::from(1000u32));

        // A fresh request sees the new value.
        ctx.init_state();
        assert_eq!(ctx.get_balance(&ALICE).unwrap(), BigUint::from(5u32));
    }

    #[test]
    fn test_block_coordinates_captured_at_init() {
        let world = Arc::new(MemWorld::new());
        world.set_block_info(7, 70);
        world.set_epoch(3);

        let mut ctx = BlockchainContext::new(world.clone());
        ctx.init_state();
        world.set_epoch(9);
        assert_eq!(ctx.current_epoch(), 3);
        assert_eq!(ctx.last_nonce(), 7);
        assert_eq!(ctx.current_round(), 70);
    }

    #[test]
    fn test_block_hash_error_is_execution_failure() {
        let world = Arc::new(MemWorld::new());
        let mut ctx = BlockchainContext::new(world);
        ctx.init_state();
        let err = ctx.block_hash(99).unwrap_err();
        assert!(matches!(err, VMError::ExecutionFailed(_)));
    }

    #[test]
    fn test_stack_depth_counter() {
        let world = Arc::new(MemWorld::new());
        let mut ctx = BlockchainContext::new(world);
        ctx.init_state();
        ctx.push_state();
        ctx.push_state();
        assert_eq!(ctx.stack_depth(), 2);
        ctx.pop_state();
        ctx.pop_state();
        assert_eq!(ctx.stack_depth(), 0);
    }
}
