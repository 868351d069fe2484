//! In-memory blockchain hook for testing.
//!
//! `MemWorld` implements `BlockchainHook` over `BTreeMap`s for
//! deterministic iteration. Tests populate accounts up front, run requests
//! against the host, and apply the returned account summaries back with
//! `apply_output` to chain several requests in sequence.

use std::collections::BTreeMap;
use std::sync::Mutex;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

use cinder_primitives::{Address, Hash, VMOutput};

use crate::error::HookError;
use crate::hook::BlockchainHook;

/// One account in the test world.
#[derive(Debug, Clone, Default)]
pub struct MemAccount {
    pub balance: BigUint,
    pub nonce: u64,
    pub code: Vec<u8>,
    pub storage: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// In-memory world state backing a test run.
///
/// Interior mutability keeps the hook usable behind the `&self` trait
/// methods while tests mutate the world between requests.
#[derive(Debug, Default)]
pub struct MemWorld {
    inner: Mutex<WorldState>,
}

#[derive(Debug, Default)]
struct WorldState {
    accounts: BTreeMap<Address, MemAccount>,
    block_nonce: u64,
    epoch: u32,
    round: u64,
}

impl MemWorld {
    /// Create an empty world at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty world at the given epoch.
    pub fn with_epoch(epoch: u32) -> Self {
        let world = Self::new();
        world.set_epoch(epoch);
        world
    }

    /// Insert or replace an account.
    pub fn put_account(&self, address: Address, account: MemAccount) {
        self.lock().accounts.insert(address, account);
    }

    /// Create an account holding only a balance.
    pub fn put_balance(&self, address: Address, balance: u64) {
        self.put_account(
            address,
            MemAccount {
                balance: BigUint::from(balance),
                ..MemAccount::default()
            },
        );
    }

    /// Advance the world to a new epoch.
    pub fn set_epoch(&self, epoch: u32) {
        self.lock().epoch = epoch;
    }

    /// Set the current round and last block nonce.
    pub fn set_block_info(&self, nonce: u64, round: u64) {
        let mut state = self.lock();
        state.block_nonce = nonce;
        state.round = round;
    }

    /// A snapshot of one account, if present.
    pub fn account(&self, address: &Address) -> Option<MemAccount> {
        self.lock().accounts.get(address).cloned()
    }

    /// Fold a response's account summaries back into the world, the way the
    /// node would after a successful request.
    pub fn apply_output(&self, output: &VMOutput) {
        let mut state = self.lock();
        for (address, summary) in &output.accounts {
            let account = state.accounts.entry(*address).or_default();
            account.nonce += summary.nonce_delta;
            account.balance = apply_delta(&account.balance, &summary.balance_delta);
            if let Some(code) = &summary.code {
                account.code = code.clone();
            }
            for (key, update) in &summary.storage_updates {
                if update.new_value.is_empty() {
                    account.storage.remove(key);
                } else {
                    account.storage.insert(key.clone(), update.new_value.clone());
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WorldState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Apply a signed delta to an unsigned balance, flooring at zero.
fn apply_delta(balance: &BigUint, delta: &BigInt) -> BigUint {
    let current = BigInt::from_biguint(Sign::Plus, balance.clone());
    let next = current + delta;
    if next.is_zero() || next.sign() == Sign::Minus {
        BigUint::zero()
    } else {
        next.to_biguint().unwrap_or_default()
    }
}

impl BlockchainHook for MemWorld {
    fn get_balance(&self, address: &Address) -> Result<BigUint, HookError> {
        Ok(self
            .lock()
            .accounts
            .get(address)
            .map(|a| a.balance.clone())
            .unwrap_or_default())
    }

    fn get_nonce(&self, address: &Address) -> Result<u64, HookError> {
        Ok(self.lock().accounts.get(address).map(|a| a.nonce).unwrap_or(0))
    }

    fn get_code(&self, address: &Address) -> Result<Vec<u8>, HookError> {
        Ok(self
            .lock()
            .accounts
            .get(address)
            .map(|a| a.code.clone())
            .unwrap_or_default())
    }

    fn get_shard_of_address(&self, address: &Address) -> u32 {
        // Last address byte decides the shard, which is plenty for tests.
        u32::from(address[31] & 0x03)
    }

    fn last_nonce(&self) -> u64 {
        self.lock().block_nonce
    }

    fn current_epoch(&self) -> u32 {
        self.lock().epoch
    }

    fn current_round(&self) -> u64 {
        self.lock().round
    }

    fn block_hash(&self, nonce: u64) -> Result<Hash, HookError> {
        let state = self.lock();
        if nonce > state.block_nonce {
            return Err(HookError::BlockNotFound(nonce));
        }
        Ok(*blake3::hash(&nonce.to_be_bytes()).as_bytes())
    }

    fn get_storage_data(&self, address: &Address, key: &[u8]) -> Result<Vec<u8>, HookError> {
        Ok(self
            .lock()
            .accounts
            .get(address)
            .and_then(|a| a.storage.get(key).cloned())
            .unwrap_or_default())
    }

    fn new_address(
        &self,
        creator: &Address,
        creator_nonce: u64,
        vm_type: &[u8],
    ) -> Result<Address, HookError> {
        let mut preimage = Vec::with_capacity(creator.len() + 8 + vm_type.len());
        preimage.extend_from_slice(creator);
        preimage.extend_from_slice(&creator_nonce.to_be_bytes());
        preimage.extend_from_slice(vm_type);
        Ok(*blake3::hash(&preimage).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_primitives::{OutputAccount, ReturnCode, StorageUpdate};

    const ALICE: Address = [1u8; 32];

    #[test]
    fn test_missing_account_reads_as_empty() {
        let world = MemWorld::new();
        assert_eq!(world.get_balance(&ALICE).unwrap(), BigUint::zero());
        assert_eq!(world.get_nonce(&ALICE).unwrap(), 0);
        assert!(world.get_code(&ALICE).unwrap().is_empty());
        assert!(world.get_storage_data(&ALICE, b"k").unwrap().is_empty());
    }

    #[test]
    fn test_put_and_read_account() {
        let world = MemWorld::new();
        world.put_balance(ALICE, 1000);
        assert_eq!(world.get_balance(&ALICE).unwrap(), BigUint::from(1000u32));
    }

    #[test]
    fn test_new_address_is_deterministic() {
        let world = MemWorld::new();
        let a = world.new_address(&ALICE, 0, b"\x05\x00").unwrap();
        let b = world.new_address(&ALICE, 0, b"\x05\x00").unwrap();
        let c = world.new_address(&ALICE, 1, b"\x05\x00").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_block_hash_bounds() {
        let world = MemWorld::new();
        world.set_block_info(10, 100);
        assert!(world.block_hash(10).is_ok());
        assert_eq!(world.block_hash(11).unwrap_err(), HookError::BlockNotFound(11));
    }

    #[test]
    fn test_apply_output_balance_and_storage() {
        let world = MemWorld::new();
        world.put_balance(ALICE, 500);

        let mut output = VMOutput::ok();
        output.return_code = ReturnCode::Ok;
        let mut summary = OutputAccount::new(ALICE);
        summary.balance_delta = BigInt::from(-200);
        summary.nonce_delta = 1;
        summary.storage_updates.insert(
            b"counter".to_vec(),
            StorageUpdate {
                old_value: vec![],
                new_value: vec![1],
            },
        );
        output.accounts.insert(ALICE, summary);

        world.apply_output(&output);
        let account = world.account(&ALICE).unwrap();
        assert_eq!(account.balance, BigUint::from(300u32));
        assert_eq!(account.nonce, 1);
        assert_eq!(account.storage[b"counter".as_slice()], vec![1]);
    }

    #[test]
    fn test_apply_output_empty_value_deletes() {
        let world = MemWorld::new();
        let mut account = MemAccount::default();
        account.storage.insert(b"k".to_vec(), b"v".to_vec());
        world.put_account(ALICE, account);

        let mut output = VMOutput::ok();
        let mut summary = OutputAccount::new(ALICE);
        summary.storage_updates.insert(
            b"k".to_vec(),
            StorageUpdate {
                old_value: b"v".to_vec(),
                new_value: vec![],
            },
        );
        output.accounts.insert(ALICE, summary);

        world.apply_output(&output);
        assert!(world.account(&ALICE).unwrap().storage.is_empty());
    }
}
