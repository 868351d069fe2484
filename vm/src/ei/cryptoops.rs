//! Cryptographic environment operations.
//!
//! The host exposes the primitives; the algorithms come from the usual
//! ecosystem implementations and are charged by input size.

use wasmtime::{Caller, Linker};

use sha2::Digest;

use crate::callhost::CallHost;
use crate::ei::{charge_with_bytes, get_memory, read_guest, write_guest, EI_MODULE};

pub fn register(linker: &mut Linker<CallHost>) -> anyhow::Result<()> {
    linker.func_wrap(
        EI_MODULE,
        "sha256",
        |mut caller: Caller<'_, CallHost>,
         data_ptr: i32,
         data_len: i32,
         dest: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.crypto_ops.clone();
            charge_with_bytes(&mut caller, costs.sha256, costs.per_byte, data_len.max(0) as usize)?;
            let data = read_guest(&mut caller, &mem, data_ptr, data_len)?;
            let digest = sha2::Sha256::digest(&data);
            write_guest(&mut caller, &mem, dest, digest.as_slice())?;
            Ok(0)
        },
    )?;

    linker.func_wrap(
        EI_MODULE,
        "keccak256",
        |mut caller: Caller<'_, CallHost>,
         data_ptr: i32,
         data_len: i32,
         dest: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.crypto_ops.clone();
            charge_with_bytes(&mut caller, costs.keccak256, costs.per_byte, data_len.max(0) as usize)?;
            let data = read_guest(&mut caller, &mem, data_ptr, data_len)?;
            let digest = sha3::Keccak256::digest(&data);
            write_guest(&mut caller, &mem, dest, digest.as_slice())?;
            Ok(0)
        },
    )?;

    // Returns 0 for a valid signature, 1 for anything else: malformed keys
    // and bad signatures look the same to the guest.
    linker.func_wrap(
        EI_MODULE,
        "verifyEd25519",
        |mut caller: Caller<'_, CallHost>,
         key_ptr: i32,
         msg_ptr: i32,
         msg_len: i32,
         sig_ptr: i32|
         -> anyhow::Result<i32> {
            let mem = get_memory(&mut caller)?;
            let costs = caller.data().schedule.crypto_ops.clone();
            charge_with_bytes(&mut caller, costs.verify_ed25519, costs.per_byte, msg_len.max(0) as usize)?;

            let key_bytes = read_guest(&mut caller, &mem, key_ptr, 32)?;
            let message = read_guest(&mut caller, &mem, msg_ptr, msg_len)?;
            let sig_bytes = read_guest(&mut caller, &mem, sig_ptr, 64)?;

            use ed25519_dalek::{Signature, Verifier, VerifyingKey};

            let mut key = [0u8; 32];
            key.copy_from_slice(&key_bytes);
            let verifying_key = match VerifyingKey::from_bytes(&key) {
                Ok(k) => k,
                Err(_) => return Ok(1),
            };

            let mut sig = [0u8; 64];
            sig.copy_from_slice(&sig_bytes);
            let signature = Signature::from_bytes(&sig);

            match verifying_key.verify(&message, &signature) {
                Ok(()) => Ok(0),
                Err(_) => Ok(1),
            }
        },
    )?;

    Ok(())
}
