//! The effect accumulator.
//!
//! Everything a contract does that the node must apply ends up here:
//! balance movements, queued transfers, deployed code, return data, logs.
//! The context snapshots itself around nested calls; a discarded frame
//! leaves the caller's view bit-identical to the moment before the call.

use num_bigint::{BigInt, BigUint, Sign};

use cinder_primitives::{
    Address, CallType, CodeMetadata, LogEntry, OutputTransfer, VMError, VMOutput, VMResult,
};

/// Accumulates the response for the active request.
#[derive(Debug, Default)]
pub struct OutputContext {
    output: VMOutput,
    stack: Vec<VMOutput>,
}

impl OutputContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a fresh request.
    pub fn init_state(&mut self) {
        self.output = VMOutput::ok();
        self.stack.clear();
    }

    /// Snapshot the accumulators before a nested call.
    pub fn push_state(&mut self) {
        self.stack.push(self.output.clone());
    }

    /// Keep the child's effects: they are already part of the active
    /// accumulators, so committing just forgets the snapshot.
    pub fn pop_merge(&mut self) {
        self.stack.pop();
    }

    /// Drop the child's effects by restoring the snapshot.
    pub fn pop_discard(&mut self) {
        if let Some(saved) = self.stack.pop() {
            self.output = saved;
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Append one piece of return data.
    pub fn append_return_data(&mut self, data: Vec<u8>) {
        self.output.return_data.push(data);
    }

    pub fn return_data(&self) -> &[Vec<u8>] {
        &self.output.return_data
    }

    pub fn add_log(&mut self, entry: LogEntry) {
        self.output.logs.push(entry);
    }

    /// Move `value` from `sender` to `destination` and queue the transfer
    /// on the sender's summary.
    ///
    /// `sender_committed_balance` is the balance the node database reports;
    /// the spendable amount is that plus whatever this request has already
    /// credited or debited.
    pub fn transfer(
        &mut self,
        sender: &Address,
        destination: &Address,
        value: &BigUint,
        data: Vec<u8>,
        gas_limit: u64,
        call_type: CallType,
        sender_committed_balance: &BigUint,
    ) -> VMResult<()> {
        let delta = &self.output.account_mut(sender).balance_delta;
        let spendable =
            BigInt::from_biguint(Sign::Plus, sender_committed_balance.clone()) + delta;
        let needed = BigInt::from_biguint(Sign::Plus, value.clone());
        if needed > spendable {
            return Err(VMError::OutOfFunds);
        }

        let value_signed = BigInt::from_biguint(Sign::Plus, value.clone());
        {
            let sender_account = self.output.account_mut(sender);
            sender_account.balance_delta -= &value_signed;
            sender_account.transfers.push(OutputTransfer {
                destination: *destination,
                value: value.clone(),
                data,
                gas_limit,
                call_type,
            });
        }
        self.output.account_mut(destination).balance_delta += value_signed;
        Ok(())
    }

    /// Record a code deployment on an account.
    pub fn deploy_code(&mut self, address: &Address, code: Vec<u8>, metadata: CodeMetadata) {
        let account = self.output.account_mut(address);
        account.code = Some(code);
        account.code_metadata = Some(metadata);
    }

    /// Bump an account's nonce.
    pub fn increment_nonce(&mut self, address: &Address) {
        self.output.account_mut(address).nonce_delta += 1;
    }

    /// Signed balance delta accumulated so far for an account.
    pub fn balance_delta(&self, address: &Address) -> BigInt {
        self.output
            .accounts
            .get(address)
            .map(|a| a.balance_delta.clone())
            .unwrap_or_default()
    }

    /// Direct access for flattening storage updates and final assembly.
    pub fn output_mut(&mut self) -> &mut VMOutput {
        &mut self.output
    }

    pub fn output(&self) -> &VMOutput {
        &self.output
    }

    /// Seal the accumulators into the response.
    pub fn finalize(
        &mut self,
        return_code: cinder_primitives::ReturnCode,
        return_message: String,
        gas_remaining: u64,
        gas_refund: u64,
    ) -> VMOutput {
        let mut output = std::mem::take(&mut self.output);
        output.return_code = return_code;
        output.return_message = return_message;
        output.gas_remaining = gas_remaining;
        output.gas_refund = gas_refund;
        output
    }
}
