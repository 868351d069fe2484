//! The gas schedule: the versioned cost table for everything a contract
//! can ask the host to do.
//!
//! Nodes ship schedules as configuration and may replace them at runtime,
//! so every table derives serde and carries a version tag. Costs are split
//! the way they are charged: a flat base per operation plus a per-byte rate
//! for variable-sized payloads.

use serde::{Deserialize, Serialize};

/// Costs of the main environment operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseOpsCost {
    pub storage_store: u64,
    pub storage_load: u64,
    pub finish: u64,
    pub signal_error: u64,
    pub write_log: u64,
    pub get_argument: u64,
    pub get_caller: u64,
    pub get_call_value: u64,
    pub get_gas_left: u64,
    pub get_block_info: u64,
    pub get_external_balance: u64,
    pub transfer_value: u64,
    /// Fixed entry charge for a synchronous nested call; also the depth
    /// governor, since every nesting level must afford it.
    pub execute_on_dest_context: u64,
    pub async_call_step: u64,
    pub get_return_data: u64,
    pub builtin_call: u64,
    /// Per-byte rate for variable-sized operands of the ops above.
    pub per_byte: u64,
}

impl Default for BaseOpsCost {
    fn default() -> Self {
        Self {
            storage_store: 250,
            storage_load: 100,
            finish: 10,
            signal_error: 10,
            write_log: 100,
            get_argument: 10,
            get_caller: 10,
            get_call_value: 10,
            get_gas_left: 5,
            get_block_info: 10,
            get_external_balance: 100,
            transfer_value: 500,
            execute_on_dest_context: 5000,
            async_call_step: 1000,
            get_return_data: 10,
            builtin_call: 2000,
            per_byte: 3,
        }
    }
}

/// Costs of the big-integer operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigIntOpsCost {
    pub new: u64,
    pub get_int64: u64,
    pub set_int64: u64,
    pub arith: u64,
    pub cmp: u64,
    pub byte_length: u64,
    pub get_bytes: u64,
    pub set_bytes: u64,
    pub get_argument: u64,
    pub get_call_value: u64,
    pub get_external_balance: u64,
    pub storage_load: u64,
    pub storage_store: u64,
    pub finish: u64,
    /// Per-byte rate applied to big-integer payloads.
    pub per_byte: u64,
}

impl Default for BigIntOpsCost {
    fn default() -> Self {
        Self {
            new: 20,
            get_int64: 10,
            set_int64: 10,
            arith: 30,
            cmp: 20,
            byte_length: 10,
            get_bytes: 20,
            set_bytes: 20,
            get_argument: 20,
            get_call_value: 20,
            get_external_balance: 100,
            storage_load: 100,
            storage_store: 250,
            finish: 20,
            per_byte: 1,
        }
    }
}

/// Costs of the cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoOpsCost {
    pub sha256: u64,
    pub keccak256: u64,
    pub verify_ed25519: u64,
    /// Per-byte rate for hashed or verified payloads.
    pub per_byte: u64,
}

impl Default for CryptoOpsCost {
    fn default() -> Self {
        Self {
            sha256: 1000,
            keccak256: 1000,
            verify_ed25519: 2000,
            per_byte: 2,
        }
    }
}

/// Storage pricing under the delta model.
///
/// Writes are priced by what actually changes: populating an empty slot is
/// the expensive case, rewriting an identical value is nearly free, and
/// releasing bytes earns a refund credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCost {
    /// Flat part of a read.
    pub load_base: u64,
    /// Per byte of the loaded value.
    pub load_per_byte: u64,
    /// Flat part of a write.
    pub store_base: u64,
    /// Per byte written into a previously empty slot.
    pub store_new_per_byte: u64,
    /// Per byte written over an existing value.
    pub persist_per_byte: u64,
    /// Refund credit per byte released by shrinking or clearing a slot.
    pub release_per_byte: u64,
    /// Fee for a write that leaves the stored value unchanged.
    pub store_unchanged: u64,
}

impl Default for StorageCost {
    fn default() -> Self {
        Self {
            load_base: 100,
            load_per_byte: 2,
            store_base: 250,
            store_new_per_byte: 10,
            persist_per_byte: 5,
            release_per_byte: 3,
            store_unchanged: 50,
        }
    }
}

/// Deployment pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployCost {
    /// Flat entry charge for a deployment or upgrade.
    pub base: u64,
    /// Per byte of code posted to the account.
    pub per_byte_code: u64,
    /// Per byte of code handed to the compiler.
    pub compile_per_byte: u64,
}

impl Default for DeployCost {
    fn default() -> Self {
        Self {
            base: 1000,
            per_byte_code: 10,
            compile_per_byte: 2,
        }
    }
}

/// The complete versioned cost table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSchedule {
    /// Schedule version, bumped with every published revision.
    pub version: u32,
    pub base_ops: BaseOpsCost,
    pub big_int_ops: BigIntOpsCost,
    pub crypto_ops: CryptoOpsCost,
    pub storage: StorageCost,
    pub deploy: DeployCost,
    /// Gas charged per unit of backend instruction fuel.
    pub fuel_gas_rate: u64,
    /// Cap on accumulated refunds, as a percentage of gas used.
    pub refund_cap_percent: u64,
    /// Gas reserved for the callback when dynamic gas locking is active.
    pub async_callback_gas_lock: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            version: 1,
            base_ops: BaseOpsCost::default(),
            big_int_ops: BigIntOpsCost::default(),
            crypto_ops: CryptoOpsCost::default(),
            storage: StorageCost::default(),
            deploy: DeployCost::default(),
            fuel_gas_rate: 1,
            refund_cap_percent: 50,
            async_callback_gas_lock: 10_000,
        }
    }
}

impl GasSchedule {
    /// Base cost plus the per-byte rate over `len` bytes, saturating.
    pub fn with_bytes(base: u64, per_byte: u64, len: usize) -> u64 {
        base.saturating_add((len as u64).saturating_mul(per_byte))
    }

    /// A schedule must not price any operation at zero gas; free operations
    /// would let a contract spin without ever touching its budget.
    pub fn validate(&self) -> Result<(), String> {
        if self.fuel_gas_rate == 0 {
            return Err("fuel_gas_rate must be nonzero".into());
        }
        if self.refund_cap_percent > 100 {
            return Err("refund_cap_percent must be at most 100".into());
        }
        if self.base_ops.execute_on_dest_context == 0 {
            return Err("execute_on_dest_context cost must be nonzero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_is_valid() {
        GasSchedule::default().validate().unwrap();
    }

    #[test]
    fn test_with_bytes() {
        assert_eq!(GasSchedule::with_bytes(100, 3, 10), 130);
        assert_eq!(GasSchedule::with_bytes(100, 3, 0), 100);
    }

    #[test]
    fn test_with_bytes_saturates() {
        assert_eq!(GasSchedule::with_bytes(u64::MAX, 3, 10), u64::MAX);
        assert_eq!(GasSchedule::with_bytes(1, u64::MAX, usize::MAX), u64::MAX);
    }

    #[test]
    fn test_validate_rejects_zero_fuel_rate() {
        let mut schedule = GasSchedule::default();
        schedule.fuel_gas_rate = 0;
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_excess_refund_cap() {
        let mut schedule = GasSchedule::default();
        schedule.refund_cap_percent = 101;
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let schedule = GasSchedule::default();
        let json = serde_json::to_string(&schedule).unwrap();
        let back: GasSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(schedule, back);
    }

    #[test]
    fn test_json_partial_schedule_is_rejected() {
        // Schedules are complete tables; a truncated config must not load.
        let result = serde_json::from_str::<GasSchedule>(r#"{"version": 2}"#);
        assert!(result.is_err());
    }
}
