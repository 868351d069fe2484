//! `cinder-hostapi`: node-facing interfaces for the Cinder execution host.
//!
//! This crate defines everything the host needs from the surrounding node
//! and everything the node configures on the host:
//!
//! - `BlockchainHook` trait: the node-side state database capability set
//! - `MemWorld`: in-memory hook implementation for testing
//! - `GasSchedule`: versioned cost table for EI calls and storage
//! - `BuiltinContainer`: registry of protocol functions dispatched by name
//! - `EsdtTransferParser`: pure decoder for native token transfers
//! - `HookError`: typed errors crossing the hook boundary

pub mod error;
pub mod hook;
pub mod mem_world;
pub mod schedule;
pub mod builtins;
pub mod esdt;

// Re-export commonly used types at the crate root.
pub use error::HookError;
pub use hook::BlockchainHook;
pub use mem_world::{MemAccount, MemWorld};
pub use schedule::GasSchedule;
pub use builtins::{BuiltinCallInput, BuiltinCallOutput, BuiltinContainer, BuiltinFunction};
pub use esdt::{EsdtTransfer, EsdtTransferParser};
