//! `cinder-primitives`: foundational types for the Cinder execution host.
//!
//! This crate provides the canonical types shared by the host, the node
//! adapter, and the test tooling:
//!
//! - address and hash aliases with their constants
//! - the frozen terminal status enumeration (`ReturnCode`)
//! - code metadata flags carried next to deployed bytecode
//! - request records (`DeployInput`, `CallInput`)
//! - the response structure (`VMOutput` and its account summaries)
//! - the internal error taxonomy (`VMError`)
//!
//! Supports `#![no_std]` (use `default-features = false`).

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod types;
pub mod returncode;
pub mod codemeta;
pub mod input;
pub mod output;
pub mod error;

// Re-export commonly used types at the crate root for convenience.
pub use types::{Address, Hash, VM_TYPE_LEN, ZERO_ADDRESS, ZERO_HASH};
pub use returncode::ReturnCode;
pub use codemeta::CodeMetadata;
pub use input::{CallInput, CallType, DeployInput};
pub use output::{LogEntry, OutputAccount, OutputTransfer, StorageUpdate, VMOutput};
pub use error::{VMError, VMResult};
