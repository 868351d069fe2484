//! Shared test helpers for integration tests.
//!
//! Provides deterministic addresses, world and host factories, request
//! builders, and the WAT guest contracts the scenarios run.

#![allow(dead_code)]

use std::sync::Arc;

use num_bigint::BigUint;

use cinder_hostapi::{BuiltinContainer, GasSchedule, MemWorld};
use cinder_primitives::{
    Address, CallInput, CallType, CodeMetadata, DeployInput, ReturnCode, VMOutput,
};
use cinder_vm::{Host, HostConfig};

// ── Deterministic addresses ──

pub fn alice() -> Address {
    [1u8; 32]
}

pub fn bob() -> Address {
    [2u8; 32]
}

// ── World and host factories ──

/// A funded world: alice and bob each start with 1_000_000.
pub fn funded_world() -> Arc<MemWorld> {
    let world = Arc::new(MemWorld::new());
    world.put_balance(alice(), 1_000_000);
    world.put_balance(bob(), 1_000_000);
    world
}

/// Host over `world` with every feature active from epoch 0.
pub fn host_for(world: &Arc<MemWorld>) -> Host {
    host_with_config(world, HostConfig::default())
}

pub fn host_with_config(world: &Arc<MemWorld>, config: HostConfig) -> Host {
    let hook: Arc<dyn cinder_hostapi::BlockchainHook> = world.clone();
    Host::new(hook, config, GasSchedule::default(), BuiltinContainer::new()).expect("host setup")
}

// ── Request builders ──

pub fn deploy_input(caller: Address, code: &str, metadata: CodeMetadata) -> DeployInput {
    DeployInput {
        caller,
        value: BigUint::default(),
        gas_price: 1,
        gas_provided: 2_000_000,
        code: code.as_bytes().to_vec(),
        code_metadata: metadata,
        arguments: vec![],
    }
}

pub fn call_input(caller: Address, recipient: Address, function: &str) -> CallInput {
    CallInput {
        caller,
        recipient,
        value: BigUint::default(),
        gas_price: 1,
        gas_provided: 2_000_000,
        function: function.into(),
        arguments: vec![],
        call_type: CallType::DirectCall,
    }
}

/// Deploy `code`, apply the output to the world, return the new address.
pub fn deploy(world: &Arc<MemWorld>, host: &Host, code: &str) -> Address {
    deploy_with_metadata(world, host, code, CodeMetadata::default())
}

pub fn deploy_with_metadata(
    world: &Arc<MemWorld>,
    host: &Host,
    code: &str,
    metadata: CodeMetadata,
) -> Address {
    let output = host.run_deploy(deploy_input(alice(), code, metadata));
    assert_eq!(
        output.return_code,
        ReturnCode::Ok,
        "deploy failed: {}",
        output.return_message
    );
    let contract = deployed_address(&output);
    world.apply_output(&output);
    contract
}

/// The single account carrying deployed code in a response.
pub fn deployed_address(output: &VMOutput) -> Address {
    output
        .accounts
        .values()
        .find(|a| a.code.is_some())
        .expect("no deployed account in output")
        .address
}

/// Call `function`, assert success, apply the output, return it.
pub fn call_ok(
    world: &Arc<MemWorld>,
    host: &Host,
    contract: Address,
    function: &str,
) -> VMOutput {
    let output = host.run_call(call_input(alice(), contract, function));
    assert_eq!(
        output.return_code,
        ReturnCode::Ok,
        "call {} failed: {}",
        function,
        output.return_message
    );
    world.apply_output(&output);
    output
}

// ── Guest contracts ──

/// A counter: `increment` bumps the single-byte value under "counter" and
/// returns the new value.
pub const COUNTER_WAT: &str = r#"
(module
  (import "env" "storageLoad" (func $load (param i32 i32 i32) (result i32)))
  (import "env" "storageStore" (func $store (param i32 i32 i32 i32) (result i32)))
  (import "env" "finish" (func $finish (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "counter")
  (func (export "init"))
  (func (export "increment")
    (local $len i32)
    (local.set $len (call $load (i32.const 0) (i32.const 7) (i32.const 32)))
    (if (i32.eqz (local.get $len))
      (then (i32.store8 (i32.const 32) (i32.const 1)))
      (else (i32.store8 (i32.const 32)
        (i32.add (i32.load8_u (i32.const 32)) (i32.const 1)))))
    (drop (call $store (i32.const 0) (i32.const 7) (i32.const 32) (i32.const 1)))
    (call $finish (i32.const 32) (i32.const 1)))
  (func (export "reset")
    (drop (call $store (i32.const 0) (i32.const 7) (i32.const 0) (i32.const 0)))))
"#;

/// Burns gas forever.
pub const SPINNER_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "spin") (loop $l (br $l))))
"#;

/// Attempts to write a key under the protected prefix and ignores the
/// rejection status.
pub const PROTECTED_WRITER_WAT: &str = r#"
(module
  (import "env" "storageStore" (func $store (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "CINDERfoo")
  (func (export "violate")
    (drop (call $store (i32.const 0) (i32.const 9) (i32.const 16) (i32.const 1)))))
"#;

/// Signals the retriable sentinel message.
pub const ALLOC_ERROR_WAT: &str = r#"
(module
  (import "env" "signalError" (func $err (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "allocation error")
  (func (export "boom") (call $err (i32.const 0) (i32.const 16))))
"#;

/// Nested-call callee: `write` stores "B" under "nested-slot" and returns
/// it; `writeAndFail` stores then traps.
pub const CALLEE_WAT: &str = r#"
(module
  (import "env" "storageStore" (func $store (param i32 i32 i32 i32) (result i32)))
  (import "env" "finish" (func $finish (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "nested-slot")
  (data (i32.const 16) "B")
  (func (export "write")
    (drop (call $store (i32.const 0) (i32.const 11) (i32.const 16) (i32.const 1)))
    (call $finish (i32.const 16) (i32.const 1)))
  (func (export "writeAndFail")
    (drop (call $store (i32.const 0) (i32.const 11) (i32.const 16) (i32.const 1)))
    unreachable))
"#;

/// Nested-call caller: writes its own slot, then invokes the callee whose
/// address arrives as argument 0, and finishes with the child status byte.
pub const CALLER_WAT: &str = r#"
(module
  (import "env" "storageStore" (func $store (param i32 i32 i32 i32) (result i32)))
  (import "env" "getArgument" (func $getarg (param i32 i32) (result i32)))
  (import "env" "executeOnDestContext"
    (func $exec (param i64 i32 i32 i32 i32 i32 i32 i32) (result i32)))
  (import "env" "finish" (func $finish (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "a-slot")
  (data (i32.const 8) "A")
  (data (i32.const 16) "write")
  (data (i32.const 32) "writeAndFail")
  (func $run (param $fnptr i32) (param $fnlen i32)
    (local $code i32)
    (drop (call $store (i32.const 0) (i32.const 6) (i32.const 8) (i32.const 1)))
    (drop (call $getarg (i32.const 0) (i32.const 64)))
    (local.set $code (call $exec (i64.const 500000)
      (i32.const 64) (i32.const 0) (i32.const 0)
      (local.get $fnptr) (local.get $fnlen)
      (i32.const 0) (i32.const 0)))
    (i32.store8 (i32.const 128) (local.get $code))
    (call $finish (i32.const 128) (i32.const 1)))
  (func (export "callWrite") (call $run (i32.const 16) (i32.const 5)))
  (func (export "callFail") (call $run (i32.const 32) (i32.const 12))))
"#;

/// Calls its own `noop` export through nested execution and finishes with
/// the child status byte.
pub const SELF_CALLER_WAT: &str = r#"
(module
  (import "env" "getSCAddress" (func $self (param i32)))
  (import "env" "executeOnDestContext"
    (func $exec (param i64 i32 i32 i32 i32 i32 i32 i32) (result i32)))
  (import "env" "finish" (func $finish (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "noop")
  (func (export "noop"))
  (func (export "callSelf")
    (local $code i32)
    (call $self (i32.const 64))
    (local.set $code (call $exec (i64.const 100000)
      (i32.const 64) (i32.const 0) (i32.const 0)
      (i32.const 0) (i32.const 4)
      (i32.const 0) (i32.const 0)))
    (i32.store8 (i32.const 128) (local.get $code))
    (call $finish (i32.const 128) (i32.const 1))))
"#;

/// Accumulates through the big-integer arena: loads "total", adds one,
/// stores it back, and returns it.
pub const BIGINT_ACCUMULATOR_WAT: &str = r#"
(module
  (import "env" "bigIntNew" (func $new (param i64) (result i32)))
  (import "env" "bigIntStorageLoadUnsigned" (func $biload (param i32 i32 i32) (result i32)))
  (import "env" "bigIntStorageStoreUnsigned" (func $bistore (param i32 i32 i32) (result i32)))
  (import "env" "bigIntAdd" (func $add (param i32 i32 i32)))
  (import "env" "bigIntFinishUnsigned" (func $bifinish (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "total")
  (func (export "accumulate")
    (local $acc i32) (local $one i32)
    (local.set $acc (call $new (i64.const 0)))
    (local.set $one (call $new (i64.const 1)))
    (drop (call $biload (i32.const 0) (i32.const 5) (local.get $acc)))
    (call $add (local.get $acc) (local.get $acc) (local.get $one))
    (drop (call $bistore (i32.const 0) (i32.const 5) (local.get $acc)))
    (call $bifinish (local.get $acc))))
"#;

/// Returns sha256("abc").
pub const SHA256_WAT: &str = r#"
(module
  (import "env" "sha256" (func $sha (param i32 i32 i32) (result i32)))
  (import "env" "finish" (func $finish (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "abc")
  (func (export "hash")
    (drop (call $sha (i32.const 0) (i32.const 3) (i32.const 32)))
    (call $finish (i32.const 32) (i32.const 32))))
"#;

/// Queues an asynchronous call to the address in argument 0.
pub const ASYNC_SENDER_WAT: &str = r#"
(module
  (import "env" "getArgument" (func $getarg (param i32 i32) (result i32)))
  (import "env" "asyncCall" (func $async (param i32 i32 i32 i32 i32)))
  (memory (export "memory") 1)
  (func (export "send")
    (drop (call $getarg (i32.const 0) (i32.const 0)))
    (call $async (i32.const 0) (i32.const 64) (i32.const 0) (i32.const 64) (i32.const 0))))
"#;

/// Marks "accepted" in storage; the nested half of a token transfer.
pub const ACCEPTOR_WAT: &str = r#"
(module
  (import "env" "storageStore" (func $store (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "accepted")
  (data (i32.const 8) "y")
  (func (export "accept")
    (drop (call $store (i32.const 0) (i32.const 8) (i32.const 8) (i32.const 1)))))
"#;
