//! Entry point execution.
//!
//! One call builds a fresh store over the host's services, instantiates the
//! compiled module, passes `env` and `msg` in guest-allocated regions, and
//! decodes the result envelope the contract returns. The services are
//! handed back in a [`CallReport`] whatever the outcome.

use crate::abi::MAX_RESULT_LEN;
use crate::backend::{AddressCodec, Backend, QueryRouter};
use crate::compile::{CompiledModule, EntryPoint};
use crate::config::CacheConfig;
use crate::environment::{bind_guest, settle_fuel, write_guest, Environment, OwnedRegion};
use crate::error::{VmError, VmResult};
use crate::imports;
use sealvm_core::{ContractResult, Env, GasMeter, Status};
use sealvm_storage::{StorageBridge, StoreBackend};
use wasmtime::{Engine, Store};

/// Outcome of one entry point call
#[derive(Debug)]
pub struct CallReport<S, A, Q> {
    /// Services the call ran against, with committed writes applied
    pub backend: Backend<S, A, Q>,
    /// Gas consumed, never more than the limit
    pub gas_used: u64,
    /// Response payload, or why the call failed
    pub result: VmResult<Vec<u8>>,
}

impl<S, A, Q> CallReport<S, A, Q> {
    /// Classification of the outcome
    #[must_use]
    pub fn status(&self) -> Status {
        match &self.result {
            Ok(_) => Status::Ok,
            Err(err) => err.status(),
        }
    }

    /// Report for a call that failed before any gas was used
    pub(crate) fn rejected(backend: Backend<S, A, Q>, err: VmError) -> Self {
        Self {
            backend,
            gas_used: 0,
            result: Err(err),
        }
    }
}

/// Run `entry` of `module`
///
/// Query calls run read-only; the others commit their staged writes when
/// they succeed.
#[allow(clippy::too_many_arguments)]
pub(crate) fn call_entry_point<S, A, Q>(
    engine: &Engine,
    module: &CompiledModule,
    entry: EntryPoint,
    env: &Env,
    msg: &[u8],
    backend: Backend<S, A, Q>,
    gas_limit: u64,
    config: &CacheConfig,
) -> CallReport<S, A, Q>
where
    S: StoreBackend + 'static,
    A: AddressCodec + 'static,
    Q: QueryRouter + 'static,
{
    let Backend {
        storage,
        api,
        querier,
    } = backend;
    let storage = StorageBridge::new(
        storage,
        entry.access_mode(),
        config.gas_costs.clone(),
        config.storage_limits.clone(),
    );
    let environment = Environment::new(
        storage,
        api,
        querier,
        GasMeter::new(gas_limit),
        config.gas_costs.clone(),
        config.memory_limit.max_bytes_usize(),
    );

    if !module.report().entry_points.contains(&entry) {
        return environment.finish(Err(VmError::bad_argument(format!(
            "contract {} does not export {}",
            module.checksum(),
            entry
        ))));
    }

    let mut store = Store::new(engine, environment);
    store.limiter(|env| &mut env.limits);
    let result = run(engine, &mut store, module, entry, env, msg, gas_limit);
    let report = store.into_data().finish(result);

    match &report.result {
        Ok(payload) => tracing::debug!(
            checksum = %module.checksum(),
            %entry,
            gas_used = report.gas_used,
            response_len = payload.len(),
            "Call succeeded"
        ),
        Err(err) => tracing::debug!(
            checksum = %module.checksum(),
            %entry,
            gas_used = report.gas_used,
            status = %err.status(),
            error = %err,
            "Call failed"
        ),
    }
    report
}

fn run<S, A, Q>(
    engine: &Engine,
    store: &mut Store<Environment<S, A, Q>>,
    module: &CompiledModule,
    entry: EntryPoint,
    env: &Env,
    msg: &[u8],
    gas_limit: u64,
) -> VmResult<Vec<u8>>
where
    S: StoreBackend + 'static,
    A: AddressCodec + 'static,
    Q: QueryRouter + 'static,
{
    store.set_fuel(gas_limit).map_err(VmError::runtime)?;

    let linker = imports::linker::<S, A, Q>(engine)?;
    let instance = linker
        .instantiate(&mut *store, module.module())
        .map_err(VmError::from_wasm);
    settle_fuel(&mut *store)?;
    let instance = instance?;
    bind_guest(&mut *store, &instance)?;

    let env_ptr = write_guest(&mut *store, &env.to_json()?)?;
    let msg_ptr = write_guest(&mut *store, msg)?;
    let func = instance
        .get_typed_func::<(u32, u32), u32>(&mut *store, entry.as_str())
        .map_err(|e| VmError::bad_argument(format!("{}: {}", entry, e)))?;

    let called = func
        .call(&mut *store, (env_ptr, msg_ptr))
        .map_err(VmError::from_wasm);
    settle_fuel(&mut *store)?;
    let result_ptr = called?;

    let data = OwnedRegion::new(result_ptr).consume(&mut *store, MAX_RESULT_LEN);
    settle_fuel(&mut *store)?;
    let data = data?.unwrap_or_default();

    match ContractResult::decode(&data) {
        Ok(ContractResult::Ok(payload)) => Ok(payload),
        Ok(ContractResult::Err(message)) => Err(VmError::ContractError(message)),
        Err(e) => Err(VmError::Panic(format!("malformed result envelope: {}", e))),
    }
}
