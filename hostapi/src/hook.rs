//! The blockchain hook: the capability set the host requires from the node.
//!
//! The host never persists state itself. Every durable read goes through
//! this trait and every durable write travels back to the node inside the
//! response's account summaries. Implementations must be deterministic for
//! the duration of one request: the host caches reads, so a hook that
//! returns different values for the same slot mid-request is a node bug,
//! not something the host defends against.

use num_bigint::BigUint;

use cinder_primitives::{Address, Hash};

use crate::error::HookError;

/// Read-only view of the node's state database plus address synthesis.
pub trait BlockchainHook: Send + Sync {
    /// Balance of the account, zero for missing accounts.
    fn get_balance(&self, address: &Address) -> Result<BigUint, HookError>;

    /// Nonce of the account, zero for missing accounts.
    fn get_nonce(&self, address: &Address) -> Result<u64, HookError>;

    /// Deployed bytecode, empty for accounts without code.
    fn get_code(&self, address: &Address) -> Result<Vec<u8>, HookError>;

    /// Shard the address belongs to.
    fn get_shard_of_address(&self, address: &Address) -> u32;

    /// Nonce of the last committed block.
    fn last_nonce(&self) -> u64;

    /// Epoch the node is currently in; drives feature-flag toggling.
    fn current_epoch(&self) -> u32;

    /// Round the node is currently in.
    fn current_round(&self) -> u64;

    /// Hash of the block at the given nonce.
    fn block_hash(&self, nonce: u64) -> Result<Hash, HookError>;

    /// Value stored under `key` in the account's trie, empty when absent.
    fn get_storage_data(&self, address: &Address, key: &[u8]) -> Result<Vec<u8>, HookError>;

    /// Synthesize the address for a contract deployed by `creator` at
    /// `creator_nonce` under the given VM type tag.
    fn new_address(
        &self,
        creator: &Address,
        creator_nonce: u64,
        vm_type: &[u8],
    ) -> Result<Address, HookError>;
}
