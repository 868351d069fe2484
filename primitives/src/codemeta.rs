//! Code metadata flags stored alongside deployed contract bytecode.

/// Properties of a deployed contract, encoded as two bytes next to the code.
///
/// The first byte carries the upgrade and readability flags, the second the
/// payability flag. Unknown bits are ignored on decode so older nodes can
/// read metadata written by newer ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeMetadata {
    /// The deployer may replace the code through the upgrade entry point.
    pub upgradeable: bool,
    /// Other contracts may read this contract's storage.
    pub readable: bool,
    /// The contract accepts direct value transfers.
    pub payable: bool,
}

const FLAG_UPGRADEABLE: u8 = 0b0000_0001;
const FLAG_READABLE: u8 = 0b0000_0100;
const FLAG_PAYABLE: u8 = 0b0000_0010;

impl CodeMetadata {
    /// Encode to the two-byte wire form.
    pub fn to_bytes(self) -> [u8; 2] {
        let mut first = 0u8;
        if self.upgradeable {
            first |= FLAG_UPGRADEABLE;
        }
        if self.readable {
            first |= FLAG_READABLE;
        }
        let mut second = 0u8;
        if self.payable {
            second |= FLAG_PAYABLE;
        }
        [first, second]
    }

    /// Decode from the two-byte wire form. Short input reads as all-clear.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let first = bytes.first().copied().unwrap_or(0);
        let second = bytes.get(1).copied().unwrap_or(0);
        Self {
            upgradeable: first & FLAG_UPGRADEABLE != 0,
            readable: first & FLAG_READABLE != 0,
            payable: second & FLAG_PAYABLE != 0,
        }
    }
}
