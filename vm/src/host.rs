//! The host orchestrator: request entry points and everything between a
//! decoded request and an assembled response.
//!
//! Both entry points follow the same discipline: take the shared execution
//! guard, reset the contexts, freeze the feature flags from the current
//! epoch, run the request body inside the panic boundary, and assemble a
//! response from the contexts. A panic anywhere below, whether a backend
//! fault or a broken host invariant, becomes an `ExecutionFailed` response
//! and leaves the host usable for the next request.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use num_traits::Zero;
use tracing::{trace, warn};
use wasmtime::{Engine, Module, Store};

use cinder_hostapi::{
    esdt::ESDT_TRANSFER_FUNC, BlockchainHook, BuiltinCallInput, BuiltinContainer,
    EsdtTransferParser, GasSchedule,
};
use cinder_primitives::{
    Address, CallInput, CallType, CodeMetadata, DeployInput, ReturnCode, VMError, VMOutput,
    VMResult,
};

use crate::callhost::CallHost;
use crate::config::HostConfig;
use crate::contexts::runtime::{
    self, SharedWarmCache, WarmCache, ALLOCATION_ERROR_MESSAGE,
};
use crate::contexts::RuntimeFrame;
use crate::error::HostSetupError;
use crate::exec;
use crate::features::FeatureFlags;

/// Reserved function name that routes a call into the upgrade path.
pub const UPGRADE_FUNCTION_NAME: &str = "upgradeContract";

/// Configuration shared across requests and replaceable at runtime.
struct SharedExecutionConfig {
    schedule: Arc<GasSchedule>,
    builtins: Arc<BuiltinContainer>,
}

/// The execution host. One instance serves one request at a time.
pub struct Host {
    engine: Engine,
    hook: Arc<dyn BlockchainHook>,
    config: Arc<HostConfig>,
    flags: FeatureFlags,
    warm: SharedWarmCache,
    esdt_parser: EsdtTransferParser,
    /// Entry points hold the read half for a whole request; replacing the
    /// gas schedule takes the write half and therefore waits for them.
    shared: RwLock<SharedExecutionConfig>,
}

impl Host {
    pub fn new(
        hook: Arc<dyn BlockchainHook>,
        config: HostConfig,
        schedule: GasSchedule,
        builtins: BuiltinContainer,
    ) -> Result<Self, HostSetupError> {
        config.check()?;
        schedule
            .validate()
            .map_err(HostSetupError::InvalidGasSchedule)?;
        let engine = runtime::create_engine(&config)?;
        Ok(Self {
            engine,
            hook,
            config: Arc::new(config),
            flags: FeatureFlags::new(),
            warm: Arc::new(Mutex::new(WarmCache::new())),
            esdt_parser: EsdtTransferParser::new(),
            shared: RwLock::new(SharedExecutionConfig {
                schedule: Arc::new(schedule),
                builtins: Arc::new(builtins),
            }),
        })
    }

    /// Deploy a new contract and run its constructor.
    pub fn run_deploy(&self, input: DeployInput) -> VMOutput {
        let guard = self.read_guard();
        let schedule = guard.schedule.clone();
        let builtins = guard.builtins.clone();
        trace!(code_len = input.code.len(), "deploy request");

        let output = self.with_panic_boundary(|| {
            let mut store = self.new_store(schedule.clone(), builtins.clone());
            match self.do_deploy(&mut store, &input) {
                Ok(()) => self.finalize_success(&mut store),
                Err(err) => Self::failed_output(err),
            }
        });
        trace!(code = %output.return_code, "deploy response");
        output
    }

    /// Call a function on an existing contract.
    pub fn run_call(&self, input: CallInput) -> VMOutput {
        let guard = self.read_guard();
        let schedule = guard.schedule.clone();
        let builtins = guard.builtins.clone();
        trace!(function = %input.function, "call request");

        let output = self.with_panic_boundary(|| {
            let mut store = self.new_store(schedule.clone(), builtins.clone());
            let result = self.do_call(&mut store, &input);
            self.reset_warm_on_retriable_error(&mut store, &input, &result);
            match result {
                Ok(()) => self.finalize_success(&mut store),
                Err(err) => Self::failed_output(err),
            }
        });
        trace!(code = %output.return_code, "call response");
        output
    }

    /// Replace the gas schedule. Serialized after all in-flight requests;
    /// an invalid schedule is rejected and the old one kept.
    pub fn gas_schedule_change(&self, new_schedule: GasSchedule) {
        if let Err(reason) = new_schedule.validate() {
            warn!(%reason, "rejecting new gas schedule, keeping the old one");
            return;
        }
        let mut guard = self
            .shared
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.schedule = Arc::new(new_schedule);
    }

    /// The gas schedule requests currently execute under.
    pub fn gas_schedule(&self) -> Arc<GasSchedule> {
        self.read_guard().schedule.clone()
    }

    /// Replace the built-in function table.
    pub fn set_builtin_container(&self, builtins: BuiltinContainer) {
        let mut guard = self
            .shared
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.builtins = Arc::new(builtins);
    }

    /// True if both addresses live in the same shard.
    pub fn are_in_same_shard(&self, left: &Address, right: &Address) -> bool {
        self.hook.get_shard_of_address(left) == self.hook.get_shard_of_address(right)
    }

    /// True if compiled artifacts for this code are warm-cached.
    pub fn is_code_warm(&self, code: &[u8]) -> bool {
        self.warm_cache().contains(&runtime::code_hash(code))
    }

    pub fn is_v2_enabled(&self) -> bool {
        self.flags.is_v2_enabled()
    }

    pub fn is_v3_enabled(&self) -> bool {
        self.flags.is_v3_enabled()
    }

    pub fn is_aot_compile_enabled(&self) -> bool {
        self.flags.is_aot_compile_enabled()
    }

    pub fn is_dynamic_gas_lock_enabled(&self) -> bool {
        self.flags.is_dynamic_gas_lock_enabled()
    }

    pub fn is_esdt_functions_enabled(&self) -> bool {
        self.flags.is_esdt_functions_enabled()
    }

    // ── Request plumbing ──

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, SharedExecutionConfig> {
        self.shared
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn warm_cache(&self) -> std::sync::MutexGuard<'_, WarmCache> {
        self.warm.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run a request body inside the fault barrier.
    fn with_panic_boundary(&self, body: impl FnOnce() -> VMOutput) -> VMOutput {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(output) => output,
            Err(payload) => {
                let message = panic_message(payload);
                warn!(%message, "request aborted by panic boundary");
                VMOutput::failed(ReturnCode::ExecutionFailed, message)
            }
        }
    }

    /// Fresh store with reset contexts and flags frozen from the epoch.
    fn new_store(
        &self,
        schedule: Arc<GasSchedule>,
        builtins: Arc<BuiltinContainer>,
    ) -> Store<CallHost> {
        let mut host = CallHost::new(
            self.engine.clone(),
            self.hook.clone(),
            schedule,
            builtins,
            self.esdt_parser,
            self.config.clone(),
            Default::default(),
            self.warm.clone(),
        );
        host.init_state();
        let epoch = host.blockchain.current_epoch();
        host.flags = self
            .flags
            .toggle_for_epoch(&self.config.enable_epochs, epoch);
        Store::new(&self.engine, host)
    }

    /// Flatten the contexts into a successful response.
    fn finalize_success(&self, store: &mut Store<CallHost>) -> VMOutput {
        let host = store.data_mut();
        if host.stack_depth() != Some(0) {
            panic!("context state stacks unbalanced at request end");
        }
        if !host.metering.is_balanced() {
            panic!("gas ledger lost conservation");
        }
        let (storage, output) = (&mut host.storage, &mut host.output);
        storage.commit_to_output(output.output_mut());
        let gas_remaining = host.metering.gas_remaining();
        let gas_refund = host.metering.gas_refund();
        host.output
            .finalize(ReturnCode::Ok, String::new(), gas_remaining, gas_refund)
    }

    /// A failure response carries the verdict and nothing else.
    fn failed_output(err: VMError) -> VMOutput {
        VMOutput::failed(err.return_code(), err.message())
    }

    /// Drop the warm artifact when a warm call ends with the retriable
    /// sentinel message, forcing recompilation on the next call.
    fn reset_warm_on_retriable_error(
        &self,
        store: &mut Store<CallHost>,
        input: &CallInput,
        result: &VMResult<()>,
    ) {
        if !self.config.use_warm_instance {
            return;
        }
        let retriable = matches!(result, Err(err) if err.message() == ALLOCATION_ERROR_MESSAGE);
        if !retriable {
            return;
        }
        if let Ok(code) = store.data_mut().blockchain.get_code(&input.recipient) {
            self.warm_cache().reset(&runtime::code_hash(&code));
        }
    }

    // ── Deploy ──

    fn do_deploy(&self, store: &mut Store<CallHost>, input: &DeployInput) -> VMResult<()> {
        if input.code.is_empty() {
            return Err(VMError::ContractInvalid("no contract code".into()));
        }
        if input.gas_provided == 0 {
            return Err(VMError::OutOfGas);
        }

        let contract = {
            let host = store.data_mut();
            host.metering.init_for_request(input.gas_provided);

            let caller_nonce = host.blockchain.get_nonce(&input.caller)?;
            let contract =
                host.blockchain
                    .new_address(&input.caller, caller_nonce, &self.config.vm_type)?;

            let costs = host.schedule.deploy.clone();
            host.metering.charge(costs.base)?;
            host.metering
                .charge_with_bytes(0, costs.per_byte_code, input.code.len())?;
            host.metering
                .charge_with_bytes(0, costs.compile_per_byte, input.code.len())?;

            host.runtime.set_frame(RuntimeFrame {
                caller: input.caller,
                contract,
                function: "init".into(),
                arguments: input.arguments.clone(),
                call_value: input.value.clone(),
                errors: Vec::new(),
            });

            host.output.increment_nonce(&input.caller);
            if !input.value.is_zero() {
                let committed = host.blockchain.get_balance(&input.caller)?;
                host.output.transfer(
                    &input.caller,
                    &contract,
                    &input.value,
                    Vec::new(),
                    0,
                    CallType::DirectCall,
                    &committed,
                )?;
            }
            contract
        };

        let module = runtime::compile_module(&self.engine, &input.code)?;
        if store.data().flags.aot_compile {
            self.warm_cache()
                .insert(runtime::code_hash(&input.code), module.clone());
        }

        if has_export(&module, "init") {
            exec::run_guest_call(store, &module, "init")?;
        }

        self.post_code(store, &contract, &input.caller, &input.code, input.code_metadata)
    }

    /// Record code, metadata, and the owner under protocol keys.
    fn post_code(
        &self,
        store: &mut Store<CallHost>,
        contract: &Address,
        owner: &Address,
        code: &[u8],
        metadata: CodeMetadata,
    ) -> VMResult<()> {
        let host = store.data_mut();
        let hook = host.hook.clone();
        host.storage
            .store_protected(&hook, contract, &self.config.owner_key(), owner)?;
        host.storage.store_protected(
            &hook,
            contract,
            &self.config.metadata_key(),
            &metadata.to_bytes(),
        )?;
        host.output.deploy_code(contract, code.to_vec(), metadata);
        Ok(())
    }

    // ── Call ──

    fn do_call(&self, store: &mut Store<CallHost>, input: &CallInput) -> VMResult<()> {
        if input.function.is_empty() {
            return Err(VMError::UserError("empty function name".into()));
        }
        if input.gas_provided == 0 {
            return Err(VMError::OutOfGas);
        }
        store
            .data_mut()
            .metering
            .init_for_request(input.gas_provided);

        if store.data().flags.esdt_functions
            && self.esdt_parser.is_transfer_function(&input.function)
        {
            return self.run_esdt_transfer(store, input);
        }
        if store.data().builtins.contains(&input.function) {
            return self.run_builtin(store, input);
        }
        if input.function == UPGRADE_FUNCTION_NAME {
            return self.do_upgrade(store, input);
        }

        self.run_contract_call(
            store,
            &input.caller,
            &input.recipient,
            &input.value,
            &input.function,
            input.arguments.clone(),
        )
    }

    /// The common contract invocation path: code lookup, payable check,
    /// value transfer, module resolution, guest execution.
    fn run_contract_call(
        &self,
        store: &mut Store<CallHost>,
        caller: &Address,
        recipient: &Address,
        value: &num_bigint::BigUint,
        function: &str,
        arguments: Vec<Vec<u8>>,
    ) -> VMResult<()> {
        if runtime::is_reserved_entry(function) {
            return Err(VMError::UserError(format!(
                "function {} is reserved",
                function
            )));
        }

        let code = {
            let host = store.data_mut();
            let code = host.blockchain.get_code(recipient)?;
            if code.is_empty() {
                return Err(VMError::ContractNotFound);
            }

            let args_len: usize = arguments.iter().map(|a| a.len()).sum();
            let per_byte = host.schedule.base_ops.per_byte;
            host.metering.charge_with_bytes(0, per_byte, args_len)?;

            if !value.is_zero() {
                let meta_bytes = host
                    .hook
                    .get_storage_data(recipient, &self.config.metadata_key())
                    .map_err(|e| VMError::ExecutionFailed(e.to_string()))?;
                if !CodeMetadata::from_bytes(&meta_bytes).payable {
                    return Err(VMError::UserError(
                        "sending value to a non-payable contract".into(),
                    ));
                }
                let committed = host.blockchain.get_balance(caller)?;
                host.output.transfer(
                    caller,
                    recipient,
                    value,
                    Vec::new(),
                    0,
                    CallType::DirectCall,
                    &committed,
                )?;
            }

            host.runtime.set_frame(RuntimeFrame {
                caller: *caller,
                contract: *recipient,
                function: function.to_string(),
                arguments,
                call_value: value.clone(),
                errors: Vec::new(),
            });
            code
        };

        let module = self.resolve_module(&code)?;
        exec::run_guest_call(store, &module, function)
    }

    /// Compile or fetch from the warm cache; the cache is a top-level
    /// concern only.
    fn resolve_module(&self, code: &[u8]) -> VMResult<Module> {
        if !self.config.use_warm_instance {
            return runtime::compile_module(&self.engine, code);
        }
        let hash = runtime::code_hash(code);
        if let Some(module) = self.warm_cache().get(&hash) {
            return Ok(module);
        }
        let module = runtime::compile_module(&self.engine, code)?;
        self.warm_cache().insert(hash, module.clone());
        Ok(module)
    }

    // ── Upgrade ──

    fn do_upgrade(&self, store: &mut Store<CallHost>, input: &CallInput) -> VMResult<()> {
        if input.arguments.len() < 2 {
            return Err(VMError::UpgradeFailed(
                "upgrade needs new code and code metadata".into(),
            ));
        }

        let old_code = {
            let host = store.data_mut();
            let code = host.blockchain.get_code(&input.recipient)?;
            if code.is_empty() {
                return Err(VMError::ContractNotFound);
            }

            let owner = host
                .hook
                .get_storage_data(&input.recipient, &self.config.owner_key())
                .map_err(|e| VMError::ExecutionFailed(e.to_string()))?;
            if owner != input.caller {
                return Err(VMError::UpgradeFailed(
                    "upgrade not allowed: caller is not the contract owner".into(),
                ));
            }
            let meta_bytes = host
                .hook
                .get_storage_data(&input.recipient, &self.config.metadata_key())
                .map_err(|e| VMError::ExecutionFailed(e.to_string()))?;
            if !CodeMetadata::from_bytes(&meta_bytes).upgradeable {
                return Err(VMError::UpgradeFailed("contract is not upgradeable".into()));
            }
            code
        };

        let new_code = input.arguments[0].clone();
        if new_code.is_empty() {
            return Err(VMError::ContractInvalid("no contract code".into()));
        }
        let new_metadata = CodeMetadata::from_bytes(&input.arguments[1]);

        {
            let host = store.data_mut();
            let costs = host.schedule.deploy.clone();
            host.metering.charge(costs.base)?;
            host.metering
                .charge_with_bytes(0, costs.per_byte_code, new_code.len())?;
            host.metering
                .charge_with_bytes(0, costs.compile_per_byte, new_code.len())?;

            host.runtime.set_frame(RuntimeFrame {
                caller: input.caller,
                contract: input.recipient,
                function: "init".into(),
                arguments: input.arguments[2..].to_vec(),
                call_value: input.value.clone(),
                errors: Vec::new(),
            });
        }

        let module = runtime::compile_module(&self.engine, &new_code)?;
        if has_export(&module, "init") {
            exec::run_guest_call(store, &module, "init")?;
        }

        // The old artifact must never serve another call.
        self.warm_cache().reset(&runtime::code_hash(&old_code));

        self.post_code(store, &input.recipient, &input.caller, &new_code, new_metadata)
    }

    // ── Built-in dispatch ──

    fn run_builtin(&self, store: &mut Store<CallHost>, input: &CallInput) -> VMResult<()> {
        let builtin_input = BuiltinCallInput {
            caller: input.caller,
            recipient: input.recipient,
            function: input.function.clone(),
            arguments: input.arguments.clone(),
            value: input.value.clone(),
        };
        self.dispatch_builtin(store, &builtin_input)
    }

    /// Execute a protocol function and merge its effects. Built-ins bypass
    /// WASM entirely.
    fn dispatch_builtin(
        &self,
        store: &mut Store<CallHost>,
        input: &BuiltinCallInput,
    ) -> VMResult<()> {
        let host = store.data_mut();
        let args_len: usize = input.arguments.iter().map(|a| a.len()).sum();
        let costs = host.schedule.base_ops.clone();
        host.metering
            .charge_with_bytes(costs.builtin_call, costs.per_byte, args_len)?;

        let handler = host
            .builtins
            .get(&input.function)
            .cloned()
            .ok_or_else(|| {
                VMError::UserError(format!("built-in function {} not found", input.function))
            })?;
        let effects = handler
            .execute(input)
            .map_err(|e| VMError::UserError(format!("built-in function failed: {}", e)))?;

        let hook = host.hook.clone();
        for (account, key, value) in &effects.storage_writes {
            host.storage.store_protected(&hook, account, key, value)?;
        }
        for (from, to, value) in &effects.transfers {
            let committed = host.blockchain.get_balance(from)?;
            host.output.transfer(
                from,
                to,
                value,
                Vec::new(),
                0,
                CallType::DirectCall,
                &committed,
            )?;
        }
        for data in effects.return_data {
            host.output.append_return_data(data);
        }
        Ok(())
    }

    // ── Native token transfers ──

    /// Recognize a token-transfer call, move the tokens through the
    /// protocol handler, and run the nested invocation if the transfer
    /// carries one.
    fn run_esdt_transfer(&self, store: &mut Store<CallHost>, input: &CallInput) -> VMResult<()> {
        let transfer = self
            .esdt_parser
            .parse(&input.recipient, &input.function, &input.arguments)
            .map_err(VMError::UserError)?;

        let builtin_input = BuiltinCallInput {
            caller: input.caller,
            recipient: input.recipient,
            function: ESDT_TRANSFER_FUNC.to_string(),
            arguments: input.arguments[..2].to_vec(),
            value: input.value.clone(),
        };
        self.dispatch_builtin(store, &builtin_input)?;

        match transfer.nested_function {
            Some(function) => self.run_contract_call(
                store,
                &input.caller,
                &transfer.destination,
                &num_bigint::BigUint::default(),
                &function,
                transfer.nested_arguments,
            ),
            None => Ok(()),
        }
    }
}

fn has_export(module: &Module, name: &str) -> bool {
    module.exports().any(|e| e.name() == name)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown internal fault".to_string()
    }
}
