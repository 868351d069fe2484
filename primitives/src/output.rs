//! Response structures describing the effect set of one top-level request.
//!
//! The host accumulates these during execution and the node applies them to
//! its state database after the response crosses the boundary. Account maps
//! are `BTreeMap` keyed by address so iteration order, and therefore any
//! serialized form, is deterministic.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use num_bigint::BigInt;

use crate::codemeta::CodeMetadata;
use crate::input::CallType;
use crate::returncode::ReturnCode;
use crate::types::Address;

/// One storage slot transition: the value before the request and the value
/// the node must persist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageUpdate {
    pub old_value: Vec<u8>,
    pub new_value: Vec<u8>,
}

/// A value transfer queued against a sender account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTransfer {
    pub destination: Address,
    pub value: num_bigint::BigUint,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub call_type: CallType,
}

/// A log entry emitted by a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

/// Accumulated effects on a single account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAccount {
    pub address: Address,
    /// Number of nonce increments performed (deployments by this account).
    pub nonce_delta: u64,
    /// Signed balance change; negative for net senders.
    pub balance_delta: BigInt,
    /// Newly deployed or upgraded code, if any.
    pub code: Option<Vec<u8>>,
    /// Metadata recorded with a code deployment.
    pub code_metadata: Option<CodeMetadata>,
    /// Storage transitions keyed by storage key.
    pub storage_updates: BTreeMap<Vec<u8>, StorageUpdate>,
    /// Outgoing transfers in the order they were queued.
    pub transfers: Vec<OutputTransfer>,
}

impl OutputAccount {
    /// An untouched account summary for the given address.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            nonce_delta: 0,
            balance_delta: BigInt::default(),
            code: None,
            code_metadata: None,
            storage_updates: BTreeMap::new(),
            transfers: Vec::new(),
        }
    }
}

/// The complete response for one deploy or call request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VMOutput {
    pub return_code: ReturnCode,
    pub return_message: String,
    /// Data returned by the contract, in emission order.
    pub return_data: Vec<Vec<u8>>,
    pub gas_remaining: u64,
    pub gas_refund: u64,
    /// Touched accounts keyed by address.
    pub accounts: BTreeMap<Address, OutputAccount>,
    pub logs: Vec<LogEntry>,
}

impl VMOutput {
    /// An empty successful output.
    pub fn ok() -> Self {
        Self {
            return_code: ReturnCode::Ok,
            return_message: String::new(),
            return_data: Vec::new(),
            gas_remaining: 0,
            gas_refund: 0,
            accounts: BTreeMap::new(),
            logs: Vec::new(),
        }
    }

    /// A failure output carrying no effects.
    ///
    /// Used whenever a frame is rolled back: everything the contract did is
    /// discarded and only the verdict crosses the boundary.
    pub fn failed(code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            return_code: code,
            return_message: message.into(),
            return_data: Vec::new(),
            gas_remaining: 0,
            gas_refund: 0,
            accounts: BTreeMap::new(),
            logs: Vec::new(),
        }
    }

    /// The summary for `address`, created untouched on first access.
    pub fn account_mut(&mut self, address: &Address) -> &mut OutputAccount {
        self.accounts
            .entry(*address)
            .or_insert_with(|| OutputAccount::new(*address))
    }

    /// Total count of storage updates across all accounts.
    pub fn storage_update_count(&self) -> usize {
        self.accounts.values().map(|a| a.storage_updates.len()).sum()
    }
}

impl Default for VMOutput {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZERO_ADDRESS;

    #[test]
    fn test_failed_output_has_no_effects() {
        let out = VMOutput::failed(ReturnCode::OutOfGas, "out of gas");
        assert_eq!(out.return_code, ReturnCode::OutOfGas);
        assert_eq!(out.return_message, "out of gas");
        assert!(out.accounts.is_empty());
        assert!(out.return_data.is_empty());
        assert_eq!(out.gas_remaining, 0);
    }

    #[test]
    fn test_account_mut_creates_once() {
        let mut out = VMOutput::ok();
        out.account_mut(&ZERO_ADDRESS).nonce_delta = 3;
        assert_eq!(out.account_mut(&ZERO_ADDRESS).nonce_delta, 3);
        assert_eq!(out.accounts.len(), 1);
    }

    #[test]
    fn test_storage_update_count() {
        let mut out = VMOutput::ok();
        let acct = out.account_mut(&[1u8; 32]);
        acct.storage_updates.insert(
            alloc::vec![1],
            StorageUpdate {
                old_value: alloc::vec![],
                new_value: alloc::vec![2],
            },
        );
        acct.storage_updates.insert(
            alloc::vec![2],
            StorageUpdate {
                old_value: alloc::vec![9],
                new_value: alloc::vec![],
            },
        );
        assert_eq!(out.storage_update_count(), 2);
    }

    #[test]
    fn test_accounts_iterate_in_address_order() {
        let mut out = VMOutput::ok();
        out.account_mut(&[9u8; 32]);
        out.account_mut(&[1u8; 32]);
        out.account_mut(&[5u8; 32]);
        let addrs: Vec<Address> = out.accounts.keys().copied().collect();
        assert_eq!(addrs, alloc::vec![[1u8; 32], [5u8; 32], [9u8; 32]]);
    }
}
