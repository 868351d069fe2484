//! Main environment operations: arguments, storage, transfers, output,
//! block inspection, and nested execution.

use wasmtime::{Caller, Linker};

use num_bigint::BigUint;
use num_traits::Zero;

use cinder_primitives::{CallType, LogEntry, VMError};

use crate::callhost::CallHost;
use crate::ei::{
    charge, charge_with_bytes, fatal, get_memory, lift, read_guest, read_guest32, record,
    write_guest, EI_MODULE,
};
use crate::exec::{self, NestedCallInput};
use crate::memory::split_args_blob;

/// Big-endian bytes of an unsigned value, empty for zero.
pub(crate) fn trimmed_be(value: &BigUint) -> Vec<u8> {
    if value.is_zero() {
        Vec::new()
    } else {
        value.to_bytes_be()
    }
}

pub fn register(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    register_arguments(linker)?;
    register_call_info(linker)?;
    register_block_info(linker)?;
    register_storage(linker)?;
    register_output(linker)?;
    register_transfers(linker)?;
    register_nested_execution(linker)?;
    Ok(())
}

// ── Arguments ──

fn register_arguments(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "getNumArguments",
        |mut caller: Caller<'_, CallHost>| -> anyhow::Result<i32> {
            let cost = caller.data().schedule.base_ops.get_argument;
            charge(&mut caller, cost)?;
            Ok(caller.data().runtime.frame().arguments.len() as i32)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getArgument",
        |mut caller: Caller<'_, CallHost>, index: i32, dest: i32| -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let argument = {
                let frame = caller.data().runtime.frame();
                frame.arguments.get(index as usize).cloned()
            };
            let argument = match argument {
                Some(a) => a,
                None => {
                    let err = VMError::UserError(format!("argument index {} out of range", index));
                    return Err(fatal(&mut caller, err));
                }
            };
            let costs = caller.data().schedule.base_ops.clone();
            charge_with_bytes(&mut caller, costs.get_argument, costs.per_byte, argument.len())?;
            write_guest(&mut caller, &mem, dest, &argument)?;
            Ok(argument.len() as i32)
        },
    )?;

    Ok(())
}

// ── Call info ──

fn register_call_info(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "getCaller",
        |mut caller: Caller<'_, CallHost>, dest: i32| -> anyhow::Result<()> {
            let mem = get_memory(&mut caller)?;
            let cost = caller.data().schedule.base_ops.get_caller;
            charge(&mut caller, cost)?;
            let address = caller.data().runtime.frame().caller;
            write_guest(&mut caller, &mem, dest, &address)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getSCAddress",
        |mut caller: Caller<'_, CallHost>, dest: i32| -> anyhow::Result<()> {
            let mem = get_memory(&mut caller)?;
            let cost = caller.data().schedule.base_ops.get_caller;
            charge(&mut caller, cost)?;
            let address = caller.data().runtime.frame().contract;
            write_guest(&mut caller, &mem, dest, &address)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getCallValue",
        |mut caller: Caller<'_, CallHost>, dest: i32| -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let cost = caller.data().schedule.base_ops.get_call_value;
            charge(&mut caller, cost)?;
            let bytes = trimmed_be(&caller.data().runtime.frame().call_value);
            write_guest(&mut caller, &mem, dest, &bytes)?;
            Ok(bytes.len() as i32)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getGasLeft",
        |mut caller: Caller<'_, CallHost>| -> anyhow::Result<i64> {
            let cost = caller.data().schedule.base_ops.get_gas_left;
            charge(&mut caller, cost)?;
            Ok(caller.data().metering.gas_remaining() as i64)
        },
    )?;

    Ok(())
}

// ── Block info ──

fn register_block_info(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "getBlockNonce",
        |mut caller: Caller<'_, CallHost>| -> anyhow::Result<i64> {
            let cost = caller.data().schedule.base_ops.get_block_info;
            charge(&mut caller, cost)?;
            Ok(caller.data().blockchain.last_nonce() as i64)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getBlockRound",
        |mut caller: Caller<'_, CallHost>| -> anyhow::Result<i64> {
            let cost = caller.data().schedule.base_ops.get_block_info;
            charge(&mut caller, cost)?;
            Ok(caller.data().blockchain.current_round() as i64)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getBlockEpoch",
        |mut caller: Caller<'_, CallHost>| -> anyhow::Result<i64> {
            let cost = caller.data().schedule.base_ops.get_block_info;
            charge(&mut caller, cost)?;
            Ok(i64::from(caller.data().blockchain.current_epoch()))
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getBlockHash",
        |mut caller: Caller<'_, CallHost>, nonce: i64, dest: i32| -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let cost = caller.data().schedule.base_ops.get_block_info;
            charge(&mut caller, cost)?;
            let hash = {
                let result = caller.data_mut().blockchain.block_hash(nonce as u64);
                lift(&mut caller, result)?
            };
            write_guest(&mut caller, &mem, dest, &hash)?;
            Ok(0)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getExternalBalance",
        |mut caller: Caller<'_, CallHost>, address_ptr: i32, dest: i32| -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let cost = caller.data().schedule.base_ops.get_external_balance;
            charge(&mut caller, cost)?;
            let address = read_guest32(&mut caller, &mem, address_ptr)?;
            let balance = {
                let result = caller.data_mut().blockchain.get_balance(&address);
                lift(&mut caller, result)?
            };
            let bytes = trimmed_be(&balance);
            write_guest(&mut caller, &mem, dest, &bytes)?;
            Ok(bytes.len() as i32)
        },
    )?;

    Ok(())
}

// ── Storage ──

fn register_storage(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "storageStore",
        |mut caller: Caller<'_, CallHost>,
         key_ptr: i32,
         key_len: i32,
         value_ptr: i32,
         value_len: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            let operand_len = key_len.max(0) as usize + value_len.max(0) as usize;
            charge_with_bytes(&mut caller, costs.storage_store, costs.per_byte, operand_len)?;

            let key = read_guest(&mut caller, &mem, key_ptr, key_len)?;
            let value = read_guest(&mut caller, &mem, value_ptr, value_len)?;
            let contract = caller.data().runtime.frame().contract;

            let host = caller.data_mut();
            let hook = host.hook.clone();
            let result = host
                .storage
                .store(&hook, &mut host.metering, &contract, &key, &value);
            match result {
                Ok(()) => Ok(0),
                Err(err @ VMError::UserError(_)) => {
                    // Protected-key rejection: the guest may inspect the
                    // status, but the frame verdict remembers it.
                    record(&mut caller, err);
                    Ok(1)
                }
                Err(err) => Err(fatal(&mut caller, err)),
            }
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "storageLoadLength",
        |mut caller: Caller<'_, CallHost>, key_ptr: i32, key_len: i32| -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            charge_with_bytes(&mut caller, costs.storage_load, costs.per_byte, key_len.max(0) as usize)?;
            let key = read_guest(&mut caller, &mem, key_ptr, key_len)?;
            let contract = caller.data().runtime.frame().contract;

            let host = caller.data_mut();
            let hook = host.hook.clone();
            let result = host
                .storage
                .load(&hook, &mut host.metering, &contract, &key);
            let value = lift(&mut caller, result)?;
            Ok(value.len() as i32)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "storageLoad",
        |mut caller: Caller<'_, CallHost>,
         key_ptr: i32,
         key_len: i32,
         dest: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            charge_with_bytes(&mut caller, costs.storage_load, costs.per_byte, key_len.max(0) as usize)?;
            let key = read_guest(&mut caller, &mem, key_ptr, key_len)?;
            let contract = caller.data().runtime.frame().contract;

            let value = {
                let host = caller.data_mut();
                let hook = host.hook.clone();
                let result = host
                    .storage
                    .load(&hook, &mut host.metering, &contract, &key);
                lift(&mut caller, result)?
            };
            write_guest(&mut caller, &mem, dest, &value)?;
            Ok(value.len() as i32)
        },
    )?;

    Ok(())
}

// ── Output ──

fn register_output(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "finish",
        |mut caller: Caller<'_, CallHost>, ptr: i32, len: i32| -> anyhow::Result<()> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            charge_with_bytes(&mut caller, costs.finish, costs.per_byte, len.max(0) as usize)?;
            let data = read_guest(&mut caller, &mem, ptr, len)?;
            caller.data_mut().output.append_return_data(data);
            Ok(())
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "signalError",
        |mut caller: Caller<'_, CallHost>, ptr: i32, len: i32| -> anyhow::Result<()> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            charge_with_bytes(&mut caller, costs.signal_error, costs.per_byte, len.max(0) as usize)?;
            let message = read_guest(&mut caller, &mem, ptr, len)?;
            let message = String::from_utf8_lossy(&message).into_owned();
            Err(fatal(&mut caller, VMError::UserError(message)))
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "writeLog",
        |mut caller: Caller<'_, CallHost>,
         data_ptr: i32,
         data_len: i32,
         topic_ptr: i32,
         topic_len: i32|
         -> anyhow::Result<()> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            let operand_len = data_len.max(0) as usize + topic_len.max(0) as usize;
            charge_with_bytes(&mut caller, costs.write_log, costs.per_byte, operand_len)?;
            let data = read_guest(&mut caller, &mem, data_ptr, data_len)?;
            let topic = read_guest(&mut caller, &mem, topic_ptr, topic_len)?;
            let address = caller.data().runtime.frame().contract;
            caller.data_mut().output.add_log(LogEntry {
                address,
                topics: vec![topic],
                data,
            });
            Ok(())
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getNumReturnData",
        |mut caller: Caller<'_, CallHost>| -> anyhow::Result<i32> {
            let cost = caller.data().schedule.base_ops.get_return_data;
            charge(&mut caller, cost)?;
            Ok(caller.data().output.return_data().len() as i32)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "getReturnData",
        |mut caller: Caller<'_, CallHost>, index: i32, dest: i32| -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let data = caller
                .data()
                .output
                .return_data()
                .get(index as usize)
                .cloned();
            let data = match data {
                Some(d) => d,
                None => {
                    let err =
                        VMError::UserError(format!("return data index {} out of range", index));
                    return Err(fatal(&mut caller, err));
                }
            };
            let costs = caller.data().schedule.base_ops.clone();
            charge_with_bytes(&mut caller, costs.get_return_data, costs.per_byte, data.len())?;
            write_guest(&mut caller, &mem, dest, &data)?;
            Ok(data.len() as i32)
        },
    )?;

    Ok(())
}

// ── Transfers ──

fn register_transfers(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "transferValue",
        |mut caller: Caller<'_, CallHost>,
         dest_ptr: i32,
         value_ptr: i32,
         value_len: i32,
         data_ptr: i32,
         data_len: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            charge_with_bytes(&mut caller, costs.transfer_value, costs.per_byte, data_len.max(0) as usize)?;

            let destination = read_guest32(&mut caller, &mem, dest_ptr)?;
            let value = BigUint::from_bytes_be(&read_guest(&mut caller, &mem, value_ptr, value_len)?);
            let data = read_guest(&mut caller, &mem, data_ptr, data_len)?;
            let sender = caller.data().runtime.frame().contract;

            let committed = {
                let result = caller.data_mut().blockchain.get_balance(&sender);
                lift(&mut caller, result)?
            };
            let result = caller.data_mut().output.transfer(
                &sender,
                &destination,
                &value,
                data,
                0,
                CallType::DirectCall,
                &committed,
            );
            match result {
                Ok(()) => Ok(0),
                Err(err) => Err(fatal(&mut caller, err)),
            }
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "asyncCall",
        |mut caller: Caller<'_, CallHost>,
         dest_ptr: i32,
         value_ptr: i32,
         value_len: i32,
         data_ptr: i32,
         data_len: i32|
         -> anyhow::Result<()> {
            if !caller.data().flags.v3 {
                let err = VMError::UserError("asynchronous calls are not enabled".into());
                return Err(fatal(&mut caller, err));
            }
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            charge_with_bytes(&mut caller, costs.async_call_step, costs.per_byte, data_len.max(0) as usize)?;

            let destination = read_guest32(&mut caller, &mem, dest_ptr)?;
            let value = BigUint::from_bytes_be(&read_guest(&mut caller, &mem, value_ptr, value_len)?);
            let data = read_guest(&mut caller, &mem, data_ptr, data_len)?;
            let sender = caller.data().runtime.frame().contract;

            // With dynamic gas locking the initiator must reserve the gas
            // its callback will need; the reserve travels with the call.
            let mut callback_gas = 0;
            if caller.data().flags.dynamic_gas_lock {
                callback_gas = caller.data().schedule.async_callback_gas_lock;
                let result = caller.data_mut().metering.lock_gas(callback_gas);
                if let Err(err) = result {
                    return Err(fatal(&mut caller, err));
                }
            }

            let committed = {
                let result = caller.data_mut().blockchain.get_balance(&sender);
                lift(&mut caller, result)?
            };
            let result = caller.data_mut().output.transfer(
                &sender,
                &destination,
                &value,
                data,
                callback_gas,
                CallType::AsynchronousCall,
                &committed,
            );
            match result {
                Ok(()) => Ok(()),
                Err(err) => Err(fatal(&mut caller, err)),
            }
        },
    )?;

    Ok(())
}

// ── Nested execution ──

fn register_nested_execution(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "executeOnDestContext",
        |mut caller: Caller<'_, CallHost>,
         gas_limit: i64,
         dest_ptr: i32,
         value_ptr: i32,
         value_len: i32,
         func_ptr: i32,
         func_len: i32,
         args_ptr: i32,
         args_len: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.base_ops.clone();
            let operand_len =
                value_len.max(0) as usize + func_len.max(0) as usize + args_len.max(0) as usize;
            charge_with_bytes(
                &mut caller,
                costs.execute_on_dest_context,
                costs.per_byte,
                operand_len,
            )?;

            let destination = read_guest32(&mut caller, &mem, dest_ptr)?;
            let value = BigUint::from_bytes_be(&read_guest(&mut caller, &mem, value_ptr, value_len)?);
            let func_bytes = read_guest(&mut caller, &mem, func_ptr, func_len)?;
            let function = match String::from_utf8(func_bytes) {
                Ok(f) => f,
                Err(_) => {
                    let err = VMError::UserError("function name is not utf-8".into());
                    return Err(fatal(&mut caller, err));
                }
            };
            let args_blob = read_guest(&mut caller, &mem, args_ptr, args_len)?;
            let arguments = {
                let result = split_args_blob(&args_blob);
                lift(&mut caller, result)?
            };

            let input = NestedCallInput {
                destination,
                value,
                function,
                arguments,
                gas_limit: gas_limit.max(0) as u64,
            };
            let result = exec::execute_on_dest_context(&mut caller, input);
            let code = lift(&mut caller, result)?;
            Ok(i32::from(code.as_u8()))
        },
    )?;

    Ok(())
}
