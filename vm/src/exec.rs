//! Guest invocation machinery shared by the top-level entry points and the
//! nested-call environment function.
//!
//! Everything here is generic over the store handle so the same code runs
//! whether the caller holds the `Store` itself (top-level request) or a
//! `Caller` from inside an environment function (nested call).

use wasmtime::{AsContextMut, Linker, Module, Trap};

use num_bigint::BigUint;

use cinder_primitives::{Address, ReturnCode, VMError, VMResult};

use crate::callhost::CallHost;
use crate::contexts::runtime::{self, RuntimeFrame};
use crate::ei;

/// Input for a synchronous nested contract call.
#[derive(Debug, Clone)]
pub struct NestedCallInput {
    pub destination: Address,
    pub value: BigUint,
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
    pub gas_limit: u64,
}

/// Charge opcode gas accumulated since the last synchronization point.
///
/// The backend burns fuel per instruction; this moves the burned fuel onto
/// the gas ledger at the schedule's exchange rate.
pub fn settle_fuel(ctx: &mut impl AsContextMut<Data = CallHost>) -> VMResult<()> {
    let mut store = ctx.as_context_mut();
    let now = store
        .get_fuel()
        .map_err(|e| VMError::ExecutionFailed(format!("fuel meter unavailable: {:#}", e)))?;
    let baseline = store.data().fuel_baseline;
    let consumed = baseline.saturating_sub(now);
    let rate = store.data().schedule.fuel_gas_rate;
    store.data_mut().fuel_baseline = now;
    store
        .data_mut()
        .metering
        .charge(consumed.saturating_mul(rate))
}

/// Program the fuel meter with the active frame's remaining gas budget.
pub fn refresh_fuel(ctx: &mut impl AsContextMut<Data = CallHost>) -> VMResult<()> {
    let mut store = ctx.as_context_mut();
    let rate = store.data().schedule.fuel_gas_rate.max(1);
    let fuel = store.data().metering.gas_remaining() / rate;
    store
        .set_fuel(fuel)
        .map_err(|e| VMError::ExecutionFailed(format!("fuel meter unavailable: {:#}", e)))?;
    store.data_mut().fuel_baseline = fuel;
    Ok(())
}

/// Instantiate `module` and run its exported `function` under metering.
///
/// The verdict folds together the guest outcome, the runtime error
/// accumulator, the fuel meter, and the trap reason.
pub fn run_guest_call(
    ctx: &mut impl AsContextMut<Data = CallHost>,
    module: &Module,
    function: &str,
) -> VMResult<()> {
    ctx.as_context_mut().data_mut().runtime.try_acquire_instance()?;
    let result = run_acquired_guest_call(ctx, module, function);
    ctx.as_context_mut().data_mut().runtime.release_instance();
    result
}

fn run_acquired_guest_call(
    ctx: &mut impl AsContextMut<Data = CallHost>,
    module: &Module,
    function: &str,
) -> VMResult<()> {
    let mut store = ctx.as_context_mut();
    let engine = store.data().engine.clone();

    let mut linker: Linker<CallHost> = Linker::new(&engine);
    ei::register(&mut linker).map_err(|e| VMError::ExecutionFailed(format!("{:#}", e)))?;

    let instance = linker
        .instantiate(&mut store, module)
        .map_err(|e| VMError::ContractInvalid(format!("instantiation failed: {:#}", e)))?;

    let func = instance
        .get_func(&mut store, function)
        .ok_or_else(|| VMError::FunctionNotFound(function.to_string()))?;

    // Contract entry points are void functions; anything else cannot be
    // driven from the node boundary.
    let ty = func.ty(&store);
    if ty.params().len() != 0 || ty.results().len() != 0 {
        return Err(VMError::FunctionWrongSignature(function.to_string()));
    }
    let typed = func
        .typed::<(), ()>(&store)
        .map_err(|_| VMError::FunctionWrongSignature(function.to_string()))?;

    refresh_fuel(&mut store)?;
    let call_result = typed.call(&mut store, ());
    let settle_result = settle_fuel(&mut store);

    derive_verdict(&mut store, call_result, settle_result)
}

/// Fold (guest outcome, accumulator, gas state, trap reason) into one
/// frame verdict.
fn derive_verdict(
    ctx: &mut impl AsContextMut<Data = CallHost>,
    call_result: Result<(), anyhow::Error>,
    settle_result: VMResult<()>,
) -> VMResult<()> {
    let store = ctx.as_context_mut();
    match call_result {
        Ok(()) => {
            settle_result?;
            match store.data().runtime.first_error() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
        Err(trap) => {
            if let Some(code) = trap.downcast_ref::<Trap>() {
                if matches!(code, Trap::OutOfFuel) {
                    return Err(VMError::OutOfGas);
                }
            }
            if let Some(vm_err) = trap.downcast_ref::<VMError>() {
                return Err(vm_err.clone());
            }
            if let Some(err) = store.data().runtime.first_error() {
                return Err(err.clone());
            }
            Err(VMError::ExecutionFailed(format!("{:#}", trap)))
        }
    }
}

/// Run a synchronous nested contract call.
///
/// A frame is pushed on every context; on success it is committed, on
/// failure discarded, and either way the caller resumes with the child's
/// return code. A fatal `Err` from this function means the *caller* frame
/// is broken (nested execution disabled, malformed input), not the child.
pub fn execute_on_dest_context(
    ctx: &mut impl AsContextMut<Data = CallHost>,
    input: NestedCallInput,
) -> VMResult<ReturnCode> {
    if !ctx.as_context_mut().data().flags.v2 {
        return Err(VMError::UserError(
            "nested execution is not enabled".into(),
        ));
    }

    let caller_contract = {
        let store = ctx.as_context_mut();
        store.data().runtime.frame().contract
    };

    let child_frame = RuntimeFrame {
        caller: caller_contract,
        contract: input.destination,
        function: input.function.clone(),
        arguments: input.arguments,
        call_value: input.value.clone(),
        errors: Vec::new(),
    };

    {
        let mut store = ctx.as_context_mut();
        store.data_mut().push_all(input.gas_limit, child_frame);
    }

    let run = run_nested(ctx, &input.destination, &caller_contract, &input.value, &input.function);

    let code = {
        let mut store = ctx.as_context_mut();
        match &run {
            Ok(()) => {
                store.data_mut().pop_merge_all();
                ReturnCode::Ok
            }
            Err(err) => {
                let out_of_gas = matches!(err, VMError::OutOfGas);
                store.data_mut().pop_discard_all(out_of_gas);
                err.return_code()
            }
        }
    };

    // Hand the remaining budget back to the caller's opcode meter.
    refresh_fuel(ctx)?;
    Ok(code)
}

fn run_nested(
    ctx: &mut impl AsContextMut<Data = CallHost>,
    destination: &Address,
    caller: &Address,
    value: &BigUint,
    function: &str,
) -> VMResult<()> {
    let module = {
        let mut store = ctx.as_context_mut();
        let host = store.data_mut();

        if num_traits::Zero::is_zero(value) {
            // Nothing to move.
        } else {
            let committed = host.blockchain.get_balance(caller)?;
            host.output.transfer(
                caller,
                destination,
                value,
                Vec::new(),
                0,
                cinder_primitives::CallType::DirectCall,
                &committed,
            )?;
        }

        let code = host.blockchain.get_code(destination)?;
        if code.is_empty() {
            return Err(VMError::ContractNotFound);
        }
        // Nested invocations always run on a distinct instance; the warm
        // cache is a top-level concern.
        runtime::compile_module(&host.engine, &code)?
    };

    if runtime::is_reserved_entry(function) {
        return Err(VMError::UserError(format!(
            "function {} is reserved",
            function
        )));
    }

    run_guest_call(ctx, &module, function)
}
