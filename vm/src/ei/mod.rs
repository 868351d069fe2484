//! The Environment Interface: host functions imported by guest WASM.
//!
//! All functions are registered under the `env` import module. Every
//! function follows the same shape:
//!
//! 1. Resolve the calling instance's exported memory
//! 2. Charge gas (base plus per-byte where the operand size varies),
//!    which also settles accumulated opcode fuel onto the ledger
//! 3. Validate guest pointers against linear memory
//! 4. Perform the operation through the contexts
//! 5. Return a status or value
//!
//! Fatal conditions (gas exhaustion, bad pointers, invalid handles,
//! explicit error signals) record themselves in the runtime error
//! accumulator and then trap the frame. Recoverable conditions (protected
//! keys, failed child calls) come back as status codes the guest may
//! inspect and ignore; ignored ones still shape the frame verdict through
//! the accumulator.

pub mod baseops;
pub mod bigintops;
pub mod cryptoops;

use wasmtime::{Caller, Linker, Memory};

use cinder_primitives::{VMError, VMResult};

use crate::callhost::CallHost;
use crate::exec;
use crate::memory;

/// Import module name guests link against.
pub const EI_MODULE: &str = "env";

/// Register the complete import set.
pub fn register(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    baseops::register(linker)?;
    bigintops::register(linker)?;
    cryptoops::register(linker)?;
    Ok(())
}

/// The calling instance's exported linear memory.
pub(crate) fn get_memory(caller: &mut Caller<'_, CallHost>) -> anyhow::Result<Memory> {
    caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| {
            anyhow::Error::new(VMError::ExecutionFailed(
                "guest has no exported memory".into(),
            ))
        })
}

/// Record an error against the frame and turn it into a trap.
pub(crate) fn fatal(caller: &mut Caller<'_, CallHost>, err: VMError) -> anyhow::Error {
    caller.data_mut().runtime.add_error(err.clone());
    anyhow::Error::new(err)
}

/// Record an error without failing the frame; the guest sees a status code
/// and the verdict reflects the record if the guest ignores it.
pub(crate) fn record(caller: &mut Caller<'_, CallHost>, err: VMError) {
    caller.data_mut().runtime.add_error(err);
}

/// Charge gas against the active frame.
///
/// Settles pending opcode fuel first so the ledger is exact at the charge
/// point, then re-programs the fuel meter with what remains.
pub(crate) fn charge(caller: &mut Caller<'_, CallHost>, amount: u64) -> anyhow::Result<()> {
    if let Err(e) = exec::settle_fuel(caller) {
        return Err(fatal(caller, e));
    }
    if let Err(e) = caller.data_mut().metering.charge(amount) {
        return Err(fatal(caller, e));
    }
    if let Err(e) = exec::refresh_fuel(caller) {
        return Err(fatal(caller, e));
    }
    Ok(())
}

/// Charge a base cost plus the per-byte rate over `len` bytes.
pub(crate) fn charge_with_bytes(
    caller: &mut Caller<'_, CallHost>,
    base: u64,
    per_byte: u64,
    len: usize,
) -> anyhow::Result<()> {
    charge(
        caller,
        cinder_hostapi::GasSchedule::with_bytes(base, per_byte, len),
    )
}

/// Bounds-checked read from guest memory; out-of-bounds fails the frame.
pub(crate) fn read_guest(
    caller: &mut Caller<'_, CallHost>,
    mem: &Memory,
    ptr: i32,
    len: i32,
) -> anyhow::Result<Vec<u8>> {
    let result = memory::read_bytes(mem.data(&*caller), ptr, len);
    result.map_err(|e| fatal(caller, e))
}

/// Bounds-checked read of a 32-byte address or hash.
pub(crate) fn read_guest32(
    caller: &mut Caller<'_, CallHost>,
    mem: &Memory,
    ptr: i32,
) -> anyhow::Result<[u8; 32]> {
    let result = memory::read_bytes32(mem.data(&*caller), ptr);
    result.map_err(|e| fatal(caller, e))
}

/// Bounds-checked write into guest memory; out-of-bounds fails the frame.
pub(crate) fn write_guest(
    caller: &mut Caller<'_, CallHost>,
    mem: &Memory,
    ptr: i32,
    data: &[u8],
) -> anyhow::Result<()> {
    let result = memory::write_bytes(mem.data_mut(&mut *caller), ptr, data);
    result.map_err(|e| fatal(caller, e))
}

/// Lift a context-level result into the trap channel.
pub(crate) fn lift<T>(caller: &mut Caller<'_, CallHost>, result: VMResult<T>) -> anyhow::Result<T> {
    result.map_err(|e| fatal(caller, e))
}
