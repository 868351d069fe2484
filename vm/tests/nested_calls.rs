//! Synchronous nested execution: commit, rollback, and resource caps.

mod common;

use cinder_primitives::ReturnCode;
use cinder_vm::HostConfig;
use common::*;

fn deploy_caller_and_callee(
    world: &std::sync::Arc<cinder_hostapi::MemWorld>,
    host: &cinder_vm::Host,
) -> ([u8; 32], [u8; 32]) {
    let caller = deploy(world, host, CALLER_WAT);
    let callee = deploy(world, host, CALLEE_WAT);
    (caller, callee)
}

// ── Commit path ──

#[test]
fn test_nested_call_commits_child_effects() {
    let world = funded_world();
    let host = host_for(&world);
    let (caller_sc, callee_sc) = deploy_caller_and_callee(&world, &host);

    let mut input = call_input(alice(), caller_sc, "callWrite");
    input.arguments = vec![callee_sc.to_vec()];
    let output = host.run_call(input);

    assert_eq!(output.return_code, ReturnCode::Ok, "{}", output.return_message);

    // Both writes survive: the caller's own slot and the child's.
    assert!(output.accounts[&caller_sc]
        .storage_updates
        .contains_key(b"a-slot".as_slice()));
    assert!(output.accounts[&callee_sc]
        .storage_updates
        .contains_key(b"nested-slot".as_slice()));

    // The child's return data precedes the caller's status byte, which
    // reports the child verdict: ok.
    assert_eq!(output.return_data, vec![vec![b'B'], vec![0x00]]);
}

// ── Rollback path ──

#[test]
fn test_failed_child_rolls_back_without_failing_caller() {
    let world = funded_world();
    let host = host_for(&world);
    let (caller_sc, callee_sc) = deploy_caller_and_callee(&world, &host);

    let mut input = call_input(alice(), caller_sc, "callFail");
    input.arguments = vec![callee_sc.to_vec()];
    let output = host.run_call(input);

    // The caller completes despite the child's trap.
    assert_eq!(output.return_code, ReturnCode::Ok, "{}", output.return_message);

    // The caller's write is present, the child's is gone.
    assert!(output.accounts[&caller_sc]
        .storage_updates
        .contains_key(b"a-slot".as_slice()));
    assert!(!output.accounts.contains_key(&callee_sc));

    // The child's return data vanished with its frame; only the status
    // byte remains, carrying the child's failure code.
    assert_eq!(
        output.return_data,
        vec![vec![ReturnCode::ExecutionFailed.as_u8()]]
    );
}

#[test]
fn test_nested_call_to_missing_contract_reports_code() {
    let world = funded_world();
    let host = host_for(&world);
    let (caller_sc, _) = deploy_caller_and_callee(&world, &host);

    let mut input = call_input(alice(), caller_sc, "callWrite");
    input.arguments = vec![vec![9u8; 32]];
    let output = host.run_call(input);

    assert_eq!(output.return_code, ReturnCode::Ok);
    assert_eq!(
        output.return_data,
        vec![vec![ReturnCode::ContractNotFound.as_u8()]]
    );
}

// ── Feature gating ──

#[test]
fn test_nested_execution_requires_v2_epoch() {
    let world = funded_world();
    world.set_epoch(3);
    let config = HostConfig {
        enable_epochs: cinder_vm::EnableEpochs {
            v2: 5,
            ..Default::default()
        },
        ..HostConfig::default()
    };
    let host = host_with_config(&world, config);
    let (caller_sc, callee_sc) = deploy_caller_and_callee(&world, &host);

    let mut input = call_input(alice(), caller_sc, "callWrite");
    input.arguments = vec![callee_sc.to_vec()];
    let output = host.run_call(input.clone());
    assert_eq!(output.return_code, ReturnCode::UserError);

    // Once the epoch passes the threshold, the same request succeeds.
    world.set_epoch(5);
    let output = host.run_call(input);
    assert_eq!(output.return_code, ReturnCode::Ok);
}

// ── Instance cap ──

#[test]
fn test_nested_self_call_within_cap_succeeds() {
    let world = funded_world();
    let host = host_for(&world);
    let contract = deploy(&world, &host, SELF_CALLER_WAT);

    let output = call_ok(&world, &host, contract, "callSelf");
    assert_eq!(output.return_data, vec![vec![ReturnCode::Ok.as_u8()]]);
}

#[test]
fn test_instance_cap_fails_nested_frame() {
    let world = funded_world();
    let config = HostConfig {
        max_instances: 1,
        ..HostConfig::default()
    };
    let host = host_with_config(&world, config);
    let contract = deploy(&world, &host, SELF_CALLER_WAT);

    // The top-level instance occupies the only slot, so the nested call
    // cannot instantiate and fails with an execution fault; the caller
    // itself completes.
    let output = call_ok(&world, &host, contract, "callSelf");
    assert_eq!(
        output.return_data,
        vec![vec![ReturnCode::ExecutionFailed.as_u8()]]
    );
}
