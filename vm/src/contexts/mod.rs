//! The six execution contexts.
//!
//! Together they form the evaluation environment of one request: a shared
//! gas clock (metering), the effect set (output), buffered storage, the
//! cached chain view (blockchain), guest-held big integers, and the
//! runtime's frame machinery. Each supports the same state-stack
//! discipline, pushed and popped in lockstep around nested calls.

pub mod bigint;
pub mod blockchain;
pub mod metering;
pub mod output;
pub mod runtime;
pub mod storage;

pub use bigint::BigIntContext;
pub use blockchain::BlockchainContext;
pub use metering::MeteringContext;
pub use output::OutputContext;
pub use runtime::{RuntimeContext, RuntimeFrame, WarmCache};
pub use storage::StorageContext;
