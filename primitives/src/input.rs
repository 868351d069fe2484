//! Request records handed in by the node for each top-level execution.

use alloc::string::String;
use alloc::vec::Vec;

use num_bigint::BigUint;

use crate::codemeta::CodeMetadata;
use crate::types::Address;

/// How a call was initiated, carried through to queued transfers so the
/// node can route asynchronous steps and callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CallType {
    DirectCall = 0,
    AsynchronousCall = 1,
    AsynchronousCallback = 2,
}

impl Default for CallType {
    fn default() -> Self {
        Self::DirectCall
    }
}

/// Request to deploy a new contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployInput {
    /// Account initiating the deployment; becomes the contract owner.
    pub caller: Address,
    /// Value transferred into the new contract account.
    pub value: BigUint,
    /// Gas price declared by the transaction.
    pub gas_price: u64,
    /// Gas budget for the whole deployment, constructor included.
    pub gas_provided: u64,
    /// Contract bytecode.
    pub code: Vec<u8>,
    /// Flags stored next to the code.
    pub code_metadata: CodeMetadata,
    /// Arguments for the constructor.
    pub arguments: Vec<Vec<u8>>,
}

/// Request to call a function on an existing contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInput {
    /// Account initiating the call.
    pub caller: Address,
    /// Contract being called.
    pub recipient: Address,
    /// Value transferred with the call.
    pub value: BigUint,
    /// Gas price declared by the transaction.
    pub gas_price: u64,
    /// Gas budget for this call.
    pub gas_provided: u64,
    /// Exported function to invoke.
    pub function: String,
    /// Call arguments, opaque byte strings.
    pub arguments: Vec<Vec<u8>>,
    /// How the call was initiated.
    pub call_type: CallType,
}

impl CallInput {
    /// Total byte length of all arguments, used for per-byte gas charges.
    pub fn arguments_len(&self) -> usize {
        self.arguments.iter().map(|a| a.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZERO_ADDRESS;

    #[test]
    fn test_call_type_default() {
        assert_eq!(CallType::default(), CallType::DirectCall);
    }

    #[test]
    fn test_arguments_len() {
        let input = CallInput {
            caller: ZERO_ADDRESS,
            recipient: ZERO_ADDRESS,
            value: BigUint::default(),
            gas_price: 1,
            gas_provided: 1000,
            function: "doSomething".into(),
            arguments: alloc::vec![alloc::vec![1, 2, 3], alloc::vec![], alloc::vec![4]],
            call_type: CallType::DirectCall,
        };
        assert_eq!(input.arguments_len(), 4);
    }
}
