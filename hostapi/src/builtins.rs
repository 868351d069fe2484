//! Registry of protocol built-in functions.
//!
//! Built-ins are node-provided handlers addressed by function name. When a
//! call's function matches a registered name, the host bypasses WASM
//! entirely: it hands the input to the handler, charges gas for the
//! dispatch, and merges the returned effects into the output summary.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_bigint::BigUint;

use cinder_primitives::Address;

use crate::error::HookError;

/// Input handed to a built-in handler.
#[derive(Debug, Clone)]
pub struct BuiltinCallInput {
    pub caller: Address,
    pub recipient: Address,
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
    pub value: BigUint,
}

/// Effects produced by a built-in handler, merged by the host.
#[derive(Debug, Clone, Default)]
pub struct BuiltinCallOutput {
    pub return_data: Vec<Vec<u8>>,
    /// Storage writes performed with protocol privilege: (account, key, value).
    pub storage_writes: Vec<(Address, Vec<u8>, Vec<u8>)>,
    /// Balance movements: (sender, destination, value).
    pub transfers: Vec<(Address, Address, BigUint)>,
}

/// A single protocol function.
pub trait BuiltinFunction: Send + Sync {
    /// The name the function is dispatched under.
    fn name(&self) -> &str;

    /// Execute against the given input.
    fn execute(&self, input: &BuiltinCallInput) -> Result<BuiltinCallOutput, HookError>;
}

/// Name-keyed registry of built-in functions.
#[derive(Clone, Default)]
pub struct BuiltinContainer {
    functions: BTreeMap<String, Arc<dyn BuiltinFunction>>,
}

impl BuiltinContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its own name, replacing any previous entry.
    pub fn register(&mut self, function: Arc<dyn BuiltinFunction>) {
        self.functions.insert(function.name().to_string(), function);
    }

    /// Look up a handler by function name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn BuiltinFunction>> {
        self.functions.get(name)
    }

    /// Returns true if `name` is a registered built-in.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names in deterministic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for BuiltinContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinContainer")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}
