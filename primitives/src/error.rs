//! Internal error taxonomy for the execution host.
//!
//! `VMError` is what contexts and environment functions raise while a frame
//! runs. Each variant maps onto exactly one terminal `ReturnCode`, so the
//! frame verdict can be derived mechanically from the first recorded error.

use alloc::string::String;
use core::fmt;

use crate::returncode::ReturnCode;

/// Error raised inside a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VMError {
    /// Failure signalled by the contract or caused by invalid guest input.
    UserError(String),
    /// A gas charge did not fit the remaining budget.
    OutOfGas,
    /// A transfer exceeded the sender's spendable balance.
    OutOfFunds,
    /// The requested export does not exist in the contract.
    FunctionNotFound(String),
    /// The requested export exists but is not a void entry point.
    FunctionWrongSignature(String),
    /// No code is deployed at the call recipient.
    ContractNotFound,
    /// The bytecode failed validation or compilation.
    ContractInvalid(String),
    /// The nested call chain exceeded its depth budget.
    CallStackOverflow,
    /// Upgrade attempted by a non-owner or on non-upgradeable code.
    UpgradeFailed(String),
    /// Backend fault, hook failure, or broken host invariant.
    ExecutionFailed(String),
}

impl VMError {
    /// The terminal status this error maps to.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Self::UserError(_) => ReturnCode::UserError,
            Self::OutOfGas => ReturnCode::OutOfGas,
            Self::OutOfFunds => ReturnCode::OutOfFunds,
            Self::FunctionNotFound(_) => ReturnCode::FunctionNotFound,
            Self::FunctionWrongSignature(_) => ReturnCode::FunctionWrongSignature,
            Self::ContractNotFound => ReturnCode::ContractNotFound,
            Self::ContractInvalid(_) => ReturnCode::ContractInvalid,
            Self::CallStackOverflow => ReturnCode::CallStackOverflow,
            Self::UpgradeFailed(_) => ReturnCode::UpgradeFailed,
            Self::ExecutionFailed(_) => ReturnCode::ExecutionFailed,
        }
    }

    /// The message reported next to the return code.
    pub fn message(&self) -> String {
        use alloc::string::ToString;
        match self {
            Self::UserError(m)
            | Self::FunctionNotFound(m)
            | Self::FunctionWrongSignature(m)
            | Self::ContractInvalid(m)
            | Self::UpgradeFailed(m)
            | Self::ExecutionFailed(m) => m.clone(),
            other => other.return_code().to_string(),
        }
    }
}

impl fmt::Display for VMError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserError(m) => write!(f, "user error: {}", m),
            Self::OutOfGas => write!(f, "out of gas"),
            Self::OutOfFunds => write!(f, "out of funds"),
            Self::FunctionNotFound(m) => write!(f, "function not found: {}", m),
            Self::FunctionWrongSignature(m) => {
                write!(f, "wrong signature for function: {}", m)
            }
            Self::ContractNotFound => write!(f, "contract not found"),
            Self::ContractInvalid(m) => write!(f, "contract invalid: {}", m),
            Self::CallStackOverflow => write!(f, "call stack overflow"),
            Self::UpgradeFailed(m) => write!(f, "upgrade failed: {}", m),
            Self::ExecutionFailed(m) => write!(f, "execution failed: {}", m),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for VMError {}

/// Convenience result type for frame-level operations.
pub type VMResult<T> = core::result::Result<T, VMError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_mapping() {
        assert_eq!(
            VMError::UserError("x".into()).return_code(),
            ReturnCode::UserError
        );
        assert_eq!(VMError::OutOfGas.return_code(), ReturnCode::OutOfGas);
        assert_eq!(VMError::OutOfFunds.return_code(), ReturnCode::OutOfFunds);
        assert_eq!(
            VMError::ContractNotFound.return_code(),
            ReturnCode::ContractNotFound
        );
        assert_eq!(
            VMError::CallStackOverflow.return_code(),
            ReturnCode::CallStackOverflow
        );
        assert_eq!(
            VMError::ExecutionFailed("boom".into()).return_code(),
            ReturnCode::ExecutionFailed
        );
    }

    #[test]
    fn test_message_prefers_detail() {
        let err = VMError::UserError("storage key is protected".into());
        assert_eq!(err.message(), "storage key is protected");
        assert_eq!(VMError::OutOfGas.message(), "out of gas");
    }

    #[test]
    fn test_display_includes_detail() {
        let err = VMError::ContractInvalid("bad magic".into());
        let s = alloc::format!("{}", err);
        assert!(s.contains("bad magic"));
    }
}
