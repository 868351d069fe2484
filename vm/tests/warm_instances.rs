//! Warm module caching and the retriable-error reset.

mod common;

use cinder_primitives::ReturnCode;
use cinder_vm::HostConfig;
use common::*;

/// Warm caching on, ahead-of-time compilation kept out of the way so the
/// cache only fills on first call.
fn warm_config() -> HostConfig {
    HostConfig {
        use_warm_instance: true,
        enable_epochs: cinder_vm::EnableEpochs {
            aot_compile: u32::MAX,
            ..Default::default()
        },
        ..HostConfig::default()
    }
}

#[test]
fn test_call_populates_warm_cache() {
    let world = funded_world();
    let host = host_with_config(&world, warm_config());
    let counter = deploy(&world, &host, COUNTER_WAT);

    assert!(!host.is_code_warm(COUNTER_WAT.as_bytes()));
    call_ok(&world, &host, counter, "increment");
    assert!(host.is_code_warm(COUNTER_WAT.as_bytes()));

    // Repeat calls keep working against the cached artifact, with memory
    // reset between uses: each increment sees only committed state.
    let output = call_ok(&world, &host, counter, "increment");
    assert_eq!(output.return_data, vec![vec![0x02]]);
}

#[test]
fn test_allocation_error_resets_warm_entry() {
    let world = funded_world();
    let host = host_with_config(&world, warm_config());
    let contract = deploy(&world, &host, ALLOC_ERROR_WAT);

    // First call fails with the sentinel message and poisons the cache.
    let output = host.run_call(call_input(alice(), contract, "boom"));
    assert!(!output.return_code.is_ok());
    assert_eq!(output.return_message, "allocation error");
    assert!(
        !host.is_code_warm(ALLOC_ERROR_WAT.as_bytes()),
        "sentinel must force recompilation on the next call"
    );

    // The next call recompiles from source and runs normally.
    let output = host.run_call(call_input(alice(), contract, "boom"));
    assert_eq!(output.return_message, "allocation error");
}

#[test]
fn test_other_failures_keep_warm_entry() {
    let world = funded_world();
    let host = host_with_config(&world, warm_config());
    let counter = deploy(&world, &host, COUNTER_WAT);
    call_ok(&world, &host, counter, "increment");

    let output = host.run_call(call_input(alice(), counter, "missing"));
    assert_eq!(output.return_code, ReturnCode::FunctionNotFound);
    assert!(host.is_code_warm(COUNTER_WAT.as_bytes()));
}

#[test]
fn test_aot_epoch_caches_at_deploy() {
    let world = funded_world();
    let config = HostConfig {
        use_warm_instance: true,
        ..HostConfig::default()
    };
    let host = host_with_config(&world, config);
    // Activation epochs default to zero, so ahead-of-time compilation is
    // already on: deploying is enough to warm the cache.
    deploy(&world, &host, COUNTER_WAT);
    assert!(host.is_code_warm(COUNTER_WAT.as_bytes()));
}

#[test]
fn test_aot_disabled_before_epoch() {
    let world = funded_world();
    let host = host_with_config(&world, warm_config());
    deploy(&world, &host, COUNTER_WAT);
    assert!(!host.is_code_warm(COUNTER_WAT.as_bytes()));
}

#[test]
fn test_upgrade_evicts_stale_artifact() {
    let world = funded_world();
    let host = host_with_config(&world, warm_config());
    let metadata = cinder_primitives::CodeMetadata {
        upgradeable: true,
        ..Default::default()
    };
    let contract = deploy_with_metadata(&world, &host, COUNTER_WAT, metadata);
    call_ok(&world, &host, contract, "increment");
    assert!(host.is_code_warm(COUNTER_WAT.as_bytes()));

    let mut input = call_input(alice(), contract, cinder_vm::UPGRADE_FUNCTION_NAME);
    input.arguments = vec![
        SPINNER_WAT.as_bytes().to_vec(),
        metadata.to_bytes().to_vec(),
    ];
    let output = host.run_call(input);
    assert_eq!(output.return_code, ReturnCode::Ok, "{}", output.return_message);
    assert!(!host.is_code_warm(COUNTER_WAT.as_bytes()));
}
