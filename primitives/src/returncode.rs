//! Terminal status codes reported to the node with every response.
//!
//! The repr values are part of the node protocol and MUST NOT be reordered
//! or reused across versions. New codes may only be appended.

use core::fmt;

/// Terminal status of a deploy or call request.
///
/// `0` = success, non-zero = the category of failure. The node serializes
/// the byte value, so the discriminants are frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReturnCode {
    Ok = 0,
    FunctionNotFound = 1,
    FunctionWrongSignature = 2,
    ContractNotFound = 3,
    UserError = 4,
    OutOfFunds = 5,
    CallStackOverflow = 6,
    ContractInvalid = 7,
    ExecutionFailed = 8,
    UpgradeFailed = 9,
    SimulateFailed = 10,
    Unknown = 11,
    OutOfGas = 12,
}

impl ReturnCode {
    /// Convert from the byte value used on the node protocol.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Ok),
            1 => Some(Self::FunctionNotFound),
            2 => Some(Self::FunctionWrongSignature),
            3 => Some(Self::ContractNotFound),
            4 => Some(Self::UserError),
            5 => Some(Self::OutOfFunds),
            6 => Some(Self::CallStackOverflow),
            7 => Some(Self::ContractInvalid),
            8 => Some(Self::ExecutionFailed),
            9 => Some(Self::UpgradeFailed),
            10 => Some(Self::SimulateFailed),
            11 => Some(Self::Unknown),
            12 => Some(Self::OutOfGas),
            _ => None,
        }
    }

    /// Return the byte representation of this code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true if this is the `Ok` variant.
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::FunctionNotFound => "function not found",
            Self::FunctionWrongSignature => "wrong signature for function",
            Self::ContractNotFound => "contract not found",
            Self::UserError => "user error",
            Self::OutOfFunds => "out of funds",
            Self::CallStackOverflow => "call stack overflow",
            Self::ContractInvalid => "contract invalid",
            Self::ExecutionFailed => "execution failed",
            Self::UpgradeFailed => "upgrade failed",
            Self::SimulateFailed => "simulate failed",
            Self::Unknown => "unknown",
            Self::OutOfGas => "out of gas",
        };
        f.write_str(name)
    }
}
