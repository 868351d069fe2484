//! Runtime state: the active VM input, frame discipline, instance
//! accounting, the error accumulator, and the warm module cache.
//!
//! The wasmtime engine compiles bytecode into `Module`s; instances are
//! created per invocation (nested calls always get their own instance) and
//! counted against a hard cap across the whole nested chain. In warm mode
//! compiled modules are cached by code hash so repeat calls skip
//! compilation; the cache is consulted for top-level calls only.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use num_bigint::BigUint;
use tracing::warn;
use wasmtime::{Config, Engine, Module};

use cinder_primitives::{Address, Hash, VMError, VMResult, ZERO_ADDRESS};

use crate::config::HostConfig;

/// Return message that marks a warm-cached artifact as poisoned; the next
/// call recompiles from source.
pub const ALLOCATION_ERROR_MESSAGE: &str = "allocation error";

/// Entry points only the host itself may invoke.
const RESERVED_ENTRY_NAMES: &[&str] = &["init", "callBack", "upgradeContract"];

/// Returns true if `function` must not be called directly by the node.
pub fn is_reserved_entry(function: &str) -> bool {
    RESERVED_ENTRY_NAMES.contains(&function)
}

/// Build a wasmtime engine locked down for consensus-grade determinism.
pub fn create_engine(config: &HostConfig) -> anyhow::Result<Engine> {
    let mut wasm_config = Config::new();

    // Fuel metering backs the opcode half of the gas model.
    wasm_config.consume_fuel(true);

    // Determinism enforcement.
    wasm_config.wasm_threads(false);
    wasm_config.wasm_simd(false);
    wasm_config.wasm_relaxed_simd(false);
    wasm_config.wasm_multi_memory(false);
    wasm_config.cranelift_nan_canonicalization(true);

    let max_bytes = u64::from(config.max_memory_pages) * 65536;
    wasm_config.memory_guaranteed_dense_image_size(max_bytes.min(16 * 1024 * 1024));

    Engine::new(&wasm_config)
}

/// Hash identifying a piece of contract code in the warm cache.
pub fn code_hash(code: &[u8]) -> Hash {
    *blake3::hash(code).as_bytes()
}

/// Compile bytecode, mapping backend rejections to a contract fault.
pub fn compile_module(engine: &Engine, code: &[u8]) -> VMResult<Module> {
    Module::new(engine, code).map_err(|e| VMError::ContractInvalid(format!("{:#}", e)))
}

/// Compiled modules cached across requests, keyed by code hash.
#[derive(Default)]
pub struct WarmCache {
    entries: BTreeMap<Hash, Module>,
}

impl WarmCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &Hash) -> Option<Module> {
        self.entries.get(hash).cloned()
    }

    pub fn insert(&mut self, hash: Hash, module: Module) {
        self.entries.insert(hash, module);
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Drop a poisoned artifact so the next call recompiles.
    pub fn reset(&mut self, hash: &Hash) {
        if self.entries.remove(hash).is_some() {
            warn!("warm cache entry dropped after retriable execution error");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to the warm cache; one per host, uncontended in practice
/// because a host serves one request at a time.
pub type SharedWarmCache = Arc<Mutex<WarmCache>>;

/// The VM input of one frame.
#[derive(Debug, Clone)]
pub struct RuntimeFrame {
    pub caller: Address,
    pub contract: Address,
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
    pub call_value: BigUint,
    /// Non-fatal errors recorded by environment helpers in this frame.
    pub errors: Vec<VMError>,
}

impl Default for RuntimeFrame {
    fn default() -> Self {
        Self {
            caller: ZERO_ADDRESS,
            contract: ZERO_ADDRESS,
            function: String::new(),
            arguments: Vec::new(),
            call_value: BigUint::default(),
            errors: Vec::new(),
        }
    }
}

/// Per-request runtime state.
#[derive(Debug)]
pub struct RuntimeContext {
    frame: RuntimeFrame,
    stack: Vec<RuntimeFrame>,
    live_instances: usize,
    peak_instances: usize,
    max_instances: usize,
}

impl RuntimeContext {
    pub fn new(max_instances: usize) -> Self {
        Self {
            frame: RuntimeFrame::default(),
            stack: Vec::new(),
            live_instances: 0,
            peak_instances: 0,
            max_instances,
        }
    }

    pub fn init_state(&mut self) {
        self.frame = RuntimeFrame::default();
        self.stack.clear();
        self.live_instances = 0;
        self.peak_instances = 0;
    }

    /// Install the root frame's VM input.
    pub fn set_frame(&mut self, frame: RuntimeFrame) {
        self.frame = frame;
    }

    pub fn frame(&self) -> &RuntimeFrame {
        &self.frame
    }

    /// Open a nested frame with its own VM input and a clean error list.
    pub fn push_state(&mut self, frame: RuntimeFrame) {
        self.stack.push(std::mem::replace(&mut self.frame, frame));
    }

    /// Close the innermost frame, restoring the caller's VM input. The
    /// child's recorded errors belong to its own verdict and die with it.
    pub fn pop_state(&mut self) {
        if let Some(parent) = self.stack.pop() {
            self.frame = parent;
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Record a non-fatal error against the active frame.
    pub fn add_error(&mut self, error: VMError) {
        self.frame.errors.push(error);
    }

    /// The error driving the frame verdict, if any was recorded.
    pub fn first_error(&self) -> Option<&VMError> {
        self.frame.errors.first()
    }

    /// Claim an instance slot before instantiation.
    pub fn try_acquire_instance(&mut self) -> VMResult<()> {
        if self.live_instances >= self.max_instances {
            return Err(VMError::ExecutionFailed(format!(
                "instance limit reached: {} instances live",
                self.live_instances
            )));
        }
        self.live_instances += 1;
        self.peak_instances = self.peak_instances.max(self.live_instances);
        Ok(())
    }

    /// Release a slot when its frame completes.
    pub fn release_instance(&mut self) {
        self.live_instances = self.live_instances.saturating_sub(1);
    }

    pub fn live_instances(&self) -> usize {
        self.live_instances
    }

    /// High-water mark of simultaneously live instances this request.
    pub fn peak_instances(&self) -> usize {
        self.peak_instances
    }
}
