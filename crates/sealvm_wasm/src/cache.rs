//! Module cache.
//!
//! Bytecode is compiled at most once per checksum: concurrent `create`s of
//! the same code share one compilation through a per-checksum cell. With a
//! data directory configured, code is also persisted and reloaded (and
//! re-verified) on first use after a restart.

use crate::backend::{AddressCodec, Backend, QueryRouter};
use crate::code_store::CodeStore;
use crate::compile::{AnalysisReport, CompiledModule, EntryPoint, ModuleCompiler};
use crate::config::CacheConfig;
use crate::engine::{self, CallReport};
use crate::error::{VmError, VmResult};
use once_cell::sync::OnceCell;
use sealvm_core::{Checksum, Env};
use sealvm_storage::StoreBackend;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use wasmtime::Engine;

type Slot = Arc<OnceCell<Arc<CompiledModule>>>;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Modules compiled
    pub compilations: u64,
    /// Lookups answered from memory
    pub memory_hits: u64,
    /// Modules reloaded from the data directory
    pub disk_loads: u64,
    /// Modules currently held in memory
    pub entries: usize,
}

/// Compiled module cache and call entry
pub struct ModuleCache {
    engine: Engine,
    compiler: ModuleCompiler,
    config: CacheConfig,
    code_store: Option<CodeStore>,
    entries: RwLock<HashMap<Checksum, Slot>>,
    released: AtomicBool,
    compilations: AtomicU64,
    memory_hits: AtomicU64,
    disk_loads: AtomicU64,
}

impl ModuleCache {
    /// Create a cache
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be configured or the data
    /// directory cannot be created
    pub fn new(config: CacheConfig) -> VmResult<Self> {
        let mut wasm_config = wasmtime::Config::new();
        wasm_config.consume_fuel(true);
        wasm_config.cranelift_nan_canonicalization(true);
        let engine = Engine::new(&wasm_config).map_err(VmError::runtime)?;

        let code_store = config.data_dir.as_ref().map(CodeStore::open).transpose()?;
        let compiler = ModuleCompiler::new(
            config.max_wasm_size,
            config.memory_limit.clone(),
            config.supported_capabilities.clone(),
        );
        tracing::info!(
            data_dir = ?config.data_dir,
            capabilities = %config.supported_capabilities.to_list(),
            "Module cache ready"
        );
        Ok(Self {
            engine,
            compiler,
            config,
            code_store,
            entries: RwLock::new(HashMap::new()),
            released: AtomicBool::new(false),
            compilations: AtomicU64::new(0),
            memory_hits: AtomicU64::new(0),
            disk_loads: AtomicU64::new(0),
        })
    }

    /// Configuration the cache was created with
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Validate, compile and store bytecode
    ///
    /// Storing the same bytecode again returns the same checksum without
    /// compiling it a second time.
    ///
    /// # Errors
    ///
    /// Returns error if the cache was released, the bytecode is rejected,
    /// or persisting it fails
    pub fn create(&self, wasm: &[u8]) -> VmResult<Checksum> {
        self.ensure_live()?;
        self.compiler.check_header(wasm)?;
        let checksum = Checksum::generate(wasm);
        let slot = self.slot(checksum)?;
        let result = slot.get_or_try_init(|| {
            let module = self.compile(checksum, wasm)?;
            if let Some(store) = &self.code_store {
                store.save(&checksum, wasm)?;
            }
            Ok::<_, VmError>(module)
        });
        if let Err(err) = result {
            self.discard_empty(checksum);
            tracing::debug!(%checksum, error = %err, "Rejected bytecode");
            return Err(err);
        }
        // a release racing this call has already dropped the slot
        self.ensure_live()?;
        Ok(checksum)
    }

    /// Original bytecode stored under `checksum`
    ///
    /// # Errors
    ///
    /// Returns error if the cache was released or no code is stored
    pub fn get_code(&self, checksum: &Checksum) -> VmResult<Vec<u8>> {
        self.ensure_live()?;
        if let Some(module) = self.cached(checksum) {
            return Ok(module.code().to_vec());
        }
        self.code_store
            .as_ref()
            .map(|store| store.load(checksum))
            .transpose()?
            .flatten()
            .ok_or(VmError::ChecksumNotFound(*checksum))
    }

    /// Static analysis of the code stored under `checksum`
    ///
    /// # Errors
    ///
    /// Returns error if the cache was released or no code is stored
    pub fn analyze_code(&self, checksum: &Checksum) -> VmResult<AnalysisReport> {
        Ok(self.load(checksum)?.report().clone())
    }

    /// Run the `instantiate` entry point
    pub fn instantiate<S, A, Q>(
        &self,
        checksum: &Checksum,
        env: &Env,
        msg: &[u8],
        backend: Backend<S, A, Q>,
        gas_limit: u64,
    ) -> CallReport<S, A, Q>
    where
        S: StoreBackend + 'static,
        A: AddressCodec + 'static,
        Q: QueryRouter + 'static,
    {
        self.call(EntryPoint::Instantiate, checksum, env, msg, backend, gas_limit)
    }

    /// Run the `execute` entry point
    pub fn execute<S, A, Q>(
        &self,
        checksum: &Checksum,
        env: &Env,
        msg: &[u8],
        backend: Backend<S, A, Q>,
        gas_limit: u64,
    ) -> CallReport<S, A, Q>
    where
        S: StoreBackend + 'static,
        A: AddressCodec + 'static,
        Q: QueryRouter + 'static,
    {
        self.call(EntryPoint::Execute, checksum, env, msg, backend, gas_limit)
    }

    /// Run the read-only `query` entry point
    pub fn query<S, A, Q>(
        &self,
        checksum: &Checksum,
        env: &Env,
        msg: &[u8],
        backend: Backend<S, A, Q>,
        gas_limit: u64,
    ) -> CallReport<S, A, Q>
    where
        S: StoreBackend + 'static,
        A: AddressCodec + 'static,
        Q: QueryRouter + 'static,
    {
        self.call(EntryPoint::Query, checksum, env, msg, backend, gas_limit)
    }

    /// Run any entry point
    pub fn call<S, A, Q>(
        &self,
        entry: EntryPoint,
        checksum: &Checksum,
        env: &Env,
        msg: &[u8],
        backend: Backend<S, A, Q>,
        gas_limit: u64,
    ) -> CallReport<S, A, Q>
    where
        S: StoreBackend + 'static,
        A: AddressCodec + 'static,
        Q: QueryRouter + 'static,
    {
        match self.load(checksum) {
            Ok(module) => engine::call_entry_point(
                &self.engine,
                &module,
                entry,
                env,
                msg,
                backend,
                gas_limit,
                &self.config,
            ),
            Err(err) => CallReport::rejected(backend, err),
        }
    }

    /// Release the cache
    ///
    /// Drops every compiled module. Calls already running keep their
    /// module; every later operation fails.
    ///
    /// # Errors
    ///
    /// Returns error if the cache was already released
    pub fn release(&self) -> VmResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(VmError::CacheReleased);
        }
        let dropped = entries.len();
        entries.clear();
        tracing::info!(dropped, "Module cache released");
        Ok(())
    }

    /// Check whether the cache was released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.get().is_some())
            .count();
        CacheStats {
            compilations: self.compilations.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_loads: self.disk_loads.load(Ordering::Relaxed),
            entries,
        }
    }

    fn ensure_live(&self) -> VmResult<()> {
        if self.is_released() {
            return Err(VmError::CacheReleased);
        }
        Ok(())
    }

    fn compile(&self, checksum: Checksum, wasm: &[u8]) -> VmResult<Arc<CompiledModule>> {
        let module = self.compiler.compile(&self.engine, checksum, wasm)?;
        self.compilations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            %checksum,
            size = module.size(),
            entry_points = module.report().entry_points.len(),
            "Compiled module"
        );
        Ok(Arc::new(module))
    }

    /// Slot for `checksum`, inserted if missing
    ///
    /// The released flag is checked under the write lock `release` holds
    /// while clearing, so no slot is inserted into a released cache.
    fn slot(&self, checksum: Checksum) -> VmResult<Slot> {
        if let Some(slot) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&checksum)
        {
            return Ok(Arc::clone(slot));
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.ensure_live()?;
        Ok(Arc::clone(entries.entry(checksum).or_default()))
    }

    fn discard_empty(&self, checksum: Checksum) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(&checksum).is_some_and(|slot| slot.get().is_none()) {
            entries.remove(&checksum);
        }
    }

    fn cached(&self, checksum: &Checksum) -> Option<Arc<CompiledModule>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(checksum)
            .and_then(|slot| slot.get().cloned())
    }

    fn load(&self, checksum: &Checksum) -> VmResult<Arc<CompiledModule>> {
        self.ensure_live()?;
        if let Some(module) = self.cached(checksum) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(module);
        }
        let store = self
            .code_store
            .as_ref()
            .ok_or(VmError::ChecksumNotFound(*checksum))?;
        let slot = self.slot(*checksum)?;
        let result = slot
            .get_or_try_init(|| {
                let code = store
                    .load(checksum)?
                    .ok_or(VmError::ChecksumNotFound(*checksum))?;
                self.disk_loads.fetch_add(1, Ordering::Relaxed);
                self.compile(*checksum, &code)
            })
            .cloned();
        if result.is_err() {
            self.discard_empty(*checksum);
        }
        result
    }
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("config", &self.config)
            .field("released", &self.is_released())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
