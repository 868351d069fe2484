//! Big-integer environment operations.
//!
//! Guests address arbitrary-precision values through arena handles; the
//! representation never crosses into linear memory except through the
//! explicit byte accessors. Using a stale handle (one allocated in a frame
//! that has since popped) charges the attempted operation and fails the
//! frame.

use wasmtime::{Caller, Linker};

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;

use cinder_primitives::VMError;

use crate::callhost::CallHost;
use crate::ei::{
    charge, charge_with_bytes, fatal, get_memory, lift, read_guest, read_guest32, record,
    write_guest, EI_MODULE,
};

use super::baseops::trimmed_be;

pub fn register(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    register_lifecycle(linker)?;
    register_arithmetic(linker)?;
    register_bytes(linker)?;
    register_context_sources(linker)?;
    register_storage(linker)?;
    Ok(())
}

// ── Lifecycle and small-integer access ──

fn register_lifecycle(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "bigIntNew",
        |mut caller: Caller<'_, CallHost>, initial: i64| -> anyhow::Result<i32> {
            let cost = caller.data().schedule.big_int_ops.new;
            charge(&mut caller, cost)?;
            Ok(caller.data_mut().bigint.insert(BigInt::from(initial)))
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntSetInt64",
        |mut caller: Caller<'_, CallHost>, handle: i32, value: i64| -> anyhow::Result<()> {
            let cost = caller.data().schedule.big_int_ops.set_int64;
            charge(&mut caller, cost)?;
            let result = caller.data_mut().bigint.set(handle, BigInt::from(value));
            lift(&mut caller, result)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntGetInt64",
        |mut caller: Caller<'_, CallHost>, handle: i32| -> anyhow::Result<i64> {
            let cost = caller.data().schedule.big_int_ops.get_int64;
            charge(&mut caller, cost)?;
            let value = {
                let result = caller.data().bigint.get(handle).cloned();
                lift(&mut caller, result)?
            };
            match value.to_i64() {
                Some(v) => Ok(v),
                None => {
                    let err = VMError::UserError("big int does not fit in 64 bits".into());
                    Err(fatal(&mut caller, err))
                }
            }
        },
    )?;

    Ok(())
}

// ── Arithmetic ──

fn register_arithmetic(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    fn binary_op(
        caller: &mut Caller<'_, CallHost>,
        dest: i32,
        lhs: i32,
        rhs: i32,
        op: impl FnOnce(&BigInt, &BigInt) -> BigInt,
    ) -> anyhow::Result<()> {
        let cost = caller.data().schedule.big_int_ops.arith;
        charge(caller, cost)?;
        let result = (|| {
            let a = caller.data().bigint.get(lhs)?.clone();
            let b = caller.data().bigint.get(rhs)?.clone();
            caller.data_mut().bigint.set(dest, op(&a, &b))
        })();
        lift(caller, result)
    }

    linker.func_wrap(
        EI_MODULE,
        "bigIntAdd",
        |mut caller: Caller<'_, CallHost>, dest: i32, lhs: i32, rhs: i32| -> anyhow::Result<()> {
            binary_op(&mut caller, dest, lhs, rhs, |a, b| a + b)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntSub",
        |mut caller: Caller<'_, CallHost>, dest: i32, lhs: i32, rhs: i32| -> anyhow::Result<()> {
            binary_op(&mut caller, dest, lhs, rhs, |a, b| a - b)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntMul",
        |mut caller: Caller<'_, CallHost>, dest: i32, lhs: i32, rhs: i32| -> anyhow::Result<()> {
            binary_op(&mut caller, dest, lhs, rhs, |a, b| a * b)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntCmp",
        |mut caller: Caller<'_, CallHost>, lhs: i32, rhs: i32| -> anyhow::Result<i32> {
            let cost = caller.data().schedule.big_int_ops.cmp;
            charge(&mut caller, cost)?;
            let ordering = {
                let result = (|| {
                    let a = caller.data().bigint.get(lhs)?;
                    let b = caller.data().bigint.get(rhs)?;
                    Ok(a.cmp(b))
                })();
                lift(&mut caller, result)?
            };
            Ok(match ordering {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            })
        },
    )?;

    Ok(())
}

// ── Byte representation ──

fn register_bytes(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "bigIntByteLength",
        |mut caller: Caller<'_, CallHost>, handle: i32| -> anyhow::Result<i32> {
            let cost = caller.data().schedule.big_int_ops.byte_length;
            charge(&mut caller, cost)?;
            let value = {
                let result = caller.data().bigint.get_unsigned(handle);
                lift(&mut caller, result)?
            };
            Ok(trimmed_be(&value).len() as i32)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntGetUnsignedBytes",
        |mut caller: Caller<'_, CallHost>, handle: i32, dest: i32| -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let value = {
                let result = caller.data().bigint.get_unsigned(handle);
                lift(&mut caller, result)?
            };
            let bytes = trimmed_be(&value);
            let costs = caller.data().schedule.big_int_ops.clone();
            charge_with_bytes(&mut caller, costs.get_bytes, costs.per_byte, bytes.len())?;
            write_guest(&mut caller, &mem, dest, &bytes)?;
            Ok(bytes.len() as i32)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntSetUnsignedBytes",
        |mut caller: Caller<'_, CallHost>, handle: i32, ptr: i32, len: i32| -> anyhow::Result<()> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.big_int_ops.clone();
            charge_with_bytes(&mut caller, costs.set_bytes, costs.per_byte, len.max(0) as usize)?;
            let bytes = read_guest(&mut caller, &mem, ptr, len)?;
            let value = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(&bytes));
            let result = caller.data_mut().bigint.set(handle, value);
            lift(&mut caller, result)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntFinishUnsigned",
        |mut caller: Caller<'_, CallHost>, handle: i32| -> anyhow::Result<()> {
            let value = {
                let result = caller.data().bigint.get_unsigned(handle);
                lift(&mut caller, result)?
            };
            let bytes = trimmed_be(&value);
            let costs = caller.data().schedule.big_int_ops.clone();
            charge_with_bytes(&mut caller, costs.finish, costs.per_byte, bytes.len())?;
            caller.data_mut().output.append_return_data(bytes);
            Ok(())
        },
    )?;

    Ok(())
}

// ── Context sources ──

fn register_context_sources(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "bigIntGetUnsignedArgument",
        |mut caller: Caller<'_, CallHost>, index: i32, handle: i32| -> anyhow::Result<()> {
            let cost = caller.data().schedule.big_int_ops.get_argument;
            charge(&mut caller, cost)?;
            let argument = caller
                .data()
                .runtime
                .frame()
                .arguments
                .get(index as usize)
                .cloned();
            let argument = match argument {
                Some(a) => a,
                None => {
                    let err = VMError::UserError(format!("argument index {} out of range", index));
                    return Err(fatal(&mut caller, err));
                }
            };
            let value = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(&argument));
            let result = caller.data_mut().bigint.set(handle, value);
            lift(&mut caller, result)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntGetCallValue",
        |mut caller: Caller<'_, CallHost>, handle: i32| -> anyhow::Result<()> {
            let cost = caller.data().schedule.big_int_ops.get_call_value;
            charge(&mut caller, cost)?;
            let value = caller.data().runtime.frame().call_value.clone();
            let result = caller
                .data_mut()
                .bigint
                .set(handle, BigInt::from_biguint(Sign::Plus, value));
            lift(&mut caller, result)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntGetExternalBalance",
        |mut caller: Caller<'_, CallHost>, address_ptr: i32, handle: i32| -> anyhow::Result<()> {
            let mem = get_memory(&mut caller)?;
            let cost = caller.data().schedule.big_int_ops.get_external_balance;
            charge(&mut caller, cost)?;
            let address = read_guest32(&mut caller, &mem, address_ptr)?;
            let balance = {
                let result = caller.data_mut().blockchain.get_balance(&address);
                lift(&mut caller, result)?
            };
            let result = caller
                .data_mut()
                .bigint
                .set(handle, BigInt::from_biguint(Sign::Plus, balance));
            lift(&mut caller, result)
        },
    )?;

    Ok(())
}

// ── Storage ──

fn register_storage(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "bigIntStorageStoreUnsigned",
        |mut caller: Caller<'_, CallHost>,
         key_ptr: i32,
         key_len: i32,
         handle: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.big_int_ops.clone();
            charge_with_bytes(&mut caller, costs.storage_store, costs.per_byte, key_len.max(0) as usize)?;
            let key = read_guest(&mut caller, &mem, key_ptr, key_len)?;
            let value = {
                let result = caller.data().bigint.get_unsigned(handle);
                lift(&mut caller, result)?
            };
            let bytes = trimmed_be(&value);
            let contract = caller.data().runtime.frame().contract;

            let host = caller.data_mut();
            let hook = host.hook.clone();
            let result = host
                .storage
                .store(&hook, &mut host.metering, &contract, &key, &bytes);
            match result {
                Ok(()) => Ok(0),
                Err(err @ VMError::UserError(_)) => {
                    record(&mut caller, err);
                    Ok(1)
                }
                Err(err) => Err(fatal(&mut caller, err)),
            }
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "bigIntStorageLoadUnsigned",
        |mut caller: Caller<'_, CallHost>,
         key_ptr: i32,
         key_len: i32,
         handle: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.big_int_ops.clone();
            charge_with_bytes(&mut caller, costs.storage_load, costs.per_byte, key_len.max(0) as usize)?;
            let key = read_guest(&mut caller, &mem, key_ptr, key_len)?;
            let contract = caller.data().runtime.frame().contract;

            let bytes = {
                let host = caller.data_mut();
                let hook = host.hook.clone();
                let result = host
                    .storage
                    .load(&hook, &mut host.metering, &contract, &key);
                lift(&mut caller, result)?
            };
            let value = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(&bytes));
            let result = caller.data_mut().bigint.set(handle, value);
            lift(&mut caller, result)?;
            Ok(bytes.len() as i32)
        },
    )?;

    Ok(())
}
