//! Pure decoder for native token (ESDT) transfer calls.
//!
//! Token transfers travel as ordinary contract calls whose function name
//! and leading arguments follow a fixed convention. The parser turns such a
//! call into a structured descriptor without touching any state; the host
//! decides what to do with the result.

use num_bigint::BigUint;

use cinder_primitives::Address;

/// Function name carrying a single-token transfer.
pub const ESDT_TRANSFER_FUNC: &str = "ESDTTransfer";

/// A decoded token transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsdtTransfer {
    /// Token identifier, e.g. `b"WEGLD-abcdef"`.
    pub token: Vec<u8>,
    /// Transferred amount.
    pub amount: BigUint,
    /// Account receiving the tokens.
    pub destination: Address,
    /// Contract function to invoke after the transfer, if any.
    pub nested_function: Option<String>,
    /// Arguments for the nested invocation.
    pub nested_arguments: Vec<Vec<u8>>,
}

/// Stateless parser for token-transfer calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct EsdtTransferParser;

impl EsdtTransferParser {
    pub fn new() -> Self {
        Self
    }

    /// Returns true if `function` names a transfer this parser understands.
    pub fn is_transfer_function(&self, function: &str) -> bool {
        function == ESDT_TRANSFER_FUNC
    }

    /// Decode a transfer call.
    ///
    /// Layout: `ESDTTransfer(token, amount_be [, function, args...])` with
    /// the tokens landing at the call recipient. Returns a message on any
    /// structural violation; the host maps it to a user error.
    pub fn parse(
        &self,
        recipient: &Address,
        function: &str,
        arguments: &[Vec<u8>],
    ) -> Result<EsdtTransfer, String> {
        if !self.is_transfer_function(function) {
            return Err(format!("not a token transfer function: {}", function));
        }
        if arguments.len() < 2 {
            return Err("token transfer needs a token and an amount".into());
        }
        let token = arguments[0].clone();
        if token.is_empty() {
            return Err("empty token identifier".into());
        }
        let amount = BigUint::from_bytes_be(&arguments[1]);

        let (nested_function, nested_arguments) = match arguments.get(2) {
            Some(func_bytes) => {
                let name = String::from_utf8(func_bytes.clone())
                    .map_err(|_| String::from("nested function name is not utf-8"))?;
                if name.is_empty() {
                    return Err("empty nested function name".into());
                }
                (Some(name), arguments[3..].to_vec())
            }
            None => (None, Vec::new()),
        };

        Ok(EsdtTransfer {
            token,
            amount,
            destination: *recipient,
            nested_function,
            nested_arguments,
        })
    }
}
