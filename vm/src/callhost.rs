//! The per-request context set living inside the wasmtime store.
//!
//! `CallHost` bundles the six contexts with the immutable request
//! environment (hook, schedule, flags, configuration). Environment
//! functions reach it through `Caller::data_mut`, and nested contract
//! calls instantiate the callee into the same store, so every frame of a
//! request shares this one value.

use std::sync::Arc;

use wasmtime::Engine;

use cinder_hostapi::{BlockchainHook, BuiltinContainer, EsdtTransferParser, GasSchedule};

use crate::config::HostConfig;
use crate::contexts::runtime::SharedWarmCache;
use crate::contexts::{
    BigIntContext, BlockchainContext, MeteringContext, OutputContext, RuntimeContext,
    RuntimeFrame, StorageContext,
};
use crate::features::FlagSnapshot;

/// Everything one request executes against.
pub struct CallHost {
    pub engine: Engine,
    pub hook: Arc<dyn BlockchainHook>,
    pub schedule: Arc<GasSchedule>,
    pub builtins: Arc<BuiltinContainer>,
    pub esdt_parser: EsdtTransferParser,
    pub config: Arc<HostConfig>,
    /// Feature flags frozen at request entry.
    pub flags: FlagSnapshot,
    pub warm: SharedWarmCache,
    /// Backend fuel level at the last synchronization point; the delta to
    /// the live fuel meter is opcode gas not yet on the ledger.
    pub fuel_baseline: u64,

    pub bigint: BigIntContext,
    pub blockchain: BlockchainContext,
    pub metering: MeteringContext,
    pub output: OutputContext,
    pub runtime: RuntimeContext,
    pub storage: StorageContext,
}

impl CallHost {
    pub fn new(
        engine: Engine,
        hook: Arc<dyn BlockchainHook>,
        schedule: Arc<GasSchedule>,
        builtins: Arc<BuiltinContainer>,
        esdt_parser: EsdtTransferParser,
        config: Arc<HostConfig>,
        flags: FlagSnapshot,
        warm: SharedWarmCache,
    ) -> Self {
        let blockchain = BlockchainContext::new(hook.clone());
        let metering = MeteringContext::new(schedule.clone());
        let storage = StorageContext::new(config.protected_key_prefix.clone());
        let runtime = RuntimeContext::new(config.max_instances);
        Self {
            engine,
            hook,
            schedule,
            builtins,
            esdt_parser,
            config,
            flags,
            warm,
            fuel_baseline: 0,
            bigint: BigIntContext::new(),
            blockchain,
            metering,
            output: OutputContext::new(),
            runtime,
            storage,
        }
    }

    /// Reset every context for a fresh request and capture the chain view.
    pub fn init_state(&mut self) {
        self.bigint.init_state();
        self.output.init_state();
        self.metering.init_state();
        self.runtime.init_state();
        self.storage.init_state();
        self.blockchain.init_state();
        self.fuel_baseline = 0;
    }

    /// Push one frame on every context, in lockstep.
    ///
    /// Returns the gas actually granted to the child frame.
    pub fn push_all(&mut self, child_gas: u64, frame: RuntimeFrame) -> u64 {
        self.bigint.push_state();
        self.blockchain.push_state();
        let granted = self.metering.push_state(child_gas);
        self.output.push_state();
        self.runtime.push_state(frame);
        self.storage.push_state();
        granted
    }

    /// Commit the innermost frame on every context.
    pub fn pop_merge_all(&mut self) {
        self.bigint.pop_state();
        self.blockchain.pop_state();
        self.metering.pop_merge();
        self.output.pop_merge();
        self.runtime.pop_state();
        self.storage.pop_merge();
    }

    /// Discard the innermost frame on every context.
    pub fn pop_discard_all(&mut self, out_of_gas: bool) {
        self.bigint.pop_state();
        self.blockchain.pop_state();
        self.metering.pop_discard(out_of_gas);
        self.output.pop_discard();
        self.runtime.pop_state();
        self.storage.pop_discard();
    }

    /// Drop any leftover frames; used when resetting between requests.
    pub fn clear_state_stacks(&mut self) {
        self.bigint.clear_state_stack();
        self.blockchain.clear_state_stack();
        self.metering.clear_state_stack();
        self.output.clear_state_stack();
        self.runtime.clear_state_stack();
        self.storage.clear_state_stack();
    }

    /// Depth of the context stacks, or `None` if they have diverged.
    ///
    /// Divergence means a host bug; callers treat it as a broken invariant
    /// and abort the request through the panic boundary.
    pub fn stack_depth(&self) -> Option<usize> {
        let depth = self.bigint.stack_depth();
        let all_equal = depth == self.blockchain.stack_depth()
            && depth == self.metering.stack_depth()
            && depth == self.output.stack_depth()
            && depth == self.runtime.stack_depth()
            && depth == self.storage.stack_depth();
        all_equal.then_some(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::runtime::{create_engine, WarmCache};
    use cinder_hostapi::MemWorld;
    use std::sync::Mutex;

    fn call_host() -> CallHost {
        let config = Arc::new(HostConfig::default());
        let engine = create_engine(&config).unwrap();
        CallHost::new(
            engine,
            Arc::new(MemWorld::new()),
            Arc::new(GasSchedule::default()),
            Arc::new(BuiltinContainer::new()),
            EsdtTransferParser::new(),
            config,
            FlagSnapshot::default(),
            Arc::new(Mutex::new(WarmCache::new())),
        )
    }

    #[test]
    fn test_stacks_move_in_lockstep() {
        let mut host = call_host();
        host.init_state();
        assert_eq!(host.stack_depth(), Some(0));

        host.push_all(1000, RuntimeFrame::default());
        assert_eq!(host.stack_depth(), Some(1));
        host.push_all(500, RuntimeFrame::default());
        assert_eq!(host.stack_depth(), Some(2));

        host.pop_merge_all();
        assert_eq!(host.stack_depth(), Some(1));
        host.pop_discard_all(false);
        assert_eq!(host.stack_depth(), Some(0));
    }

    #[test]
    fn test_divergence_is_detected() {
        let mut host = call_host();
        host.init_state();
        host.bigint.push_state();
        assert_eq!(host.stack_depth(), None);
    }

    #[test]
    fn test_init_state_clears_frames() {
        let mut host = call_host();
        host.init_state();
        host.push_all(1000, RuntimeFrame::default());
        host.init_state();
        assert_eq!(host.stack_depth(), Some(0));
    }
}
