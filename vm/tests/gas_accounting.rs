//! Gas accounting through the full WASM pipeline.

mod common;

use cinder_primitives::ReturnCode;
use common::*;

// ── Out-of-gas loop ──

#[test]
fn test_pure_loop_exhausts_gas() {
    let world = funded_world();
    let host = host_for(&world);
    let spinner = deploy(&world, &host, SPINNER_WAT);

    let mut input = call_input(alice(), spinner, "spin");
    input.gas_provided = 100_000;
    let output = host.run_call(input);

    assert_eq!(output.return_code, ReturnCode::OutOfGas);
    assert_eq!(output.gas_remaining, 0);
    assert_eq!(output.storage_update_count(), 0);
    assert!(output.accounts.is_empty());
}

#[test]
fn test_zero_gas_request_is_out_of_gas() {
    let world = funded_world();
    let host = host_for(&world);
    let counter = deploy(&world, &host, COUNTER_WAT);

    let mut input = call_input(alice(), counter, "increment");
    input.gas_provided = 0;
    let output = host.run_call(input);
    assert_eq!(output.return_code, ReturnCode::OutOfGas);
}

// ── Conservation ──

#[test]
fn test_successful_call_reports_spent_budget() {
    let world = funded_world();
    let host = host_for(&world);
    let counter = deploy(&world, &host, COUNTER_WAT);

    let input = call_input(alice(), counter, "increment");
    let provided = input.gas_provided;
    let output = host.run_call(input);

    assert_eq!(output.return_code, ReturnCode::Ok);
    assert!(output.gas_remaining < provided, "something must be charged");
    assert!(output.gas_remaining > 0, "a counter bump is far below the budget");
    // remaining + refund never exceed what was provided; the difference is
    // what execution consumed.
    assert!(output.gas_remaining + output.gas_refund <= provided);
}

#[test]
fn test_gas_consumption_is_deterministic() {
    let run = || {
        let world = funded_world();
        let host = host_for(&world);
        let counter = deploy(&world, &host, COUNTER_WAT);
        host.run_call(call_input(alice(), counter, "increment"))
            .gas_remaining
    };
    assert_eq!(run(), run());
}

// ── Refunds ──

#[test]
fn test_clearing_storage_credits_refund() {
    let world = funded_world();
    let host = host_for(&world);
    let counter = deploy(&world, &host, COUNTER_WAT);
    call_ok(&world, &host, counter, "increment");

    let output = call_ok(&world, &host, counter, "reset");
    assert!(output.gas_refund > 0, "released bytes must credit a refund");

    let update = &output.accounts[&counter].storage_updates[b"counter".as_slice()];
    assert_eq!(update.old_value, vec![0x01]);
    assert!(update.new_value.is_empty());
}

#[test]
fn test_plain_call_has_no_refund() {
    let world = funded_world();
    let host = host_for(&world);
    let counter = deploy(&world, &host, COUNTER_WAT);
    let output = call_ok(&world, &host, counter, "increment");
    assert_eq!(output.gas_refund, 0);
}

// ── Gas schedule replacement ──

#[test]
fn test_gas_schedule_change_applies_to_next_request() {
    let world = funded_world();
    let host = host_for(&world);
    let counter = deploy(&world, &host, COUNTER_WAT);
    let baseline = host
        .run_call(call_input(alice(), counter, "increment"))
        .gas_remaining;

    let mut pricier = cinder_hostapi::GasSchedule::default();
    pricier.version = 2;
    pricier.storage.store_base *= 10;
    host.gas_schedule_change(pricier);
    assert_eq!(host.gas_schedule().version, 2);

    let after = host
        .run_call(call_input(alice(), counter, "increment"))
        .gas_remaining;
    assert!(after < baseline, "pricier storage must leave less gas");
}

#[test]
fn test_invalid_gas_schedule_is_rejected() {
    let world = funded_world();
    let host = host_for(&world);

    let mut broken = cinder_hostapi::GasSchedule::default();
    broken.version = 9;
    broken.fuel_gas_rate = 0;
    host.gas_schedule_change(broken);

    // The old schedule stays in force.
    assert_eq!(host.gas_schedule().version, 1);
}

// ── Failed requests ──

#[test]
fn test_failed_call_returns_no_gas() {
    // A rolled-back frame forfeits its budget; the node refunds nothing.
    let world = funded_world();
    let host = host_for(&world);
    let output = host.run_call(call_input(alice(), [42u8; 32], "anything"));
    assert_eq!(output.return_code, ReturnCode::ContractNotFound);
    assert_eq!(output.gas_remaining, 0);
    assert_eq!(output.gas_refund, 0);
}
