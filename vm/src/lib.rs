//! `cinder-vm`: a deterministic execution host for WASM smart contracts.
//!
//! The host sits between a blockchain node and a wasmtime backend. Given a
//! deploy or call request it compiles (or fetches) the bytecode, binds the
//! environment interface, meters every instruction and host call against
//! the declared gas budget, and returns a structured response describing
//! storage writes, transfers, logs, return data, and a terminal status.
//!
//! It enforces:
//!
//! - **Determinism:** no SIMD, no threads, NaN canonicalization, cached
//!   chain reads, deterministic iteration everywhere
//! - **Gas conservation:** `used + remaining + locked + refund` equals the
//!   provided budget at every observable point
//! - **Frame isolation:** nested synchronous calls snapshot every context
//!   and commit or roll back atomically
//! - **Resource caps:** bounded live instances, bounded memory
//! - **Fault containment:** backend faults and broken host invariants
//!   become `ExecutionFailed` responses, never crashes
//!
//! The primary entry points are [`Host::run_deploy`] and [`Host::run_call`].

pub mod callhost;
pub mod config;
pub mod contexts;
pub mod ei;
pub mod error;
pub mod exec;
pub mod features;
pub mod host;
pub mod memory;

pub use callhost::CallHost;
pub use config::{EnableEpochs, HostConfig};
pub use error::HostSetupError;
pub use host::{Host, UPGRADE_FUNCTION_NAME};
