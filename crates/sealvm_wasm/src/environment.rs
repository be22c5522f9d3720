//! Per-call state the wasmtime store carries.
//!
//! Instruction fuel and host callback gas draw from one [`GasMeter`]. The
//! store's fuel counter is mirrored into the meter by [`settle_fuel`]
//! (charging what the guest burned since the last checkpoint) and reset
//! from it by [`refuel`] after a callback charged the meter directly.

use crate::engine::CallReport;
use crate::error::{VmError, VmResult};
use crate::memory::{read_region, write_region};
use crate::Backend;
use sealvm_core::{GasCosts, GasMeter};
use sealvm_storage::{AccessMode, StorageBridge, StoreBackend};
use wasmtime::{AsContext, AsContextMut, Instance, Memory, StoreLimits, StoreLimitsBuilder, TypedFunc};

/// Exports every contract provides for region management
#[derive(Clone)]
pub(crate) struct GuestExports {
    memory: Memory,
    allocate: TypedFunc<u32, u32>,
    deallocate: TypedFunc<u32, ()>,
}

/// Data owned by the store for the duration of one call
pub struct Environment<S, A, Q> {
    pub(crate) storage: StorageBridge<S>,
    pub(crate) api: A,
    pub(crate) querier: Q,
    pub(crate) gas: GasMeter,
    pub(crate) costs: GasCosts,
    pub(crate) limits: StoreLimits,
    fuel_checkpoint: u64,
    guest: Option<GuestExports>,
}

impl<S: StoreBackend, A, Q> Environment<S, A, Q> {
    pub(crate) fn new(
        storage: StorageBridge<S>,
        api: A,
        querier: Q,
        gas: GasMeter,
        costs: GasCosts,
        memory_bytes: usize,
    ) -> Self {
        let fuel_checkpoint = gas.remaining();
        Self {
            storage,
            api,
            querier,
            gas,
            costs,
            limits: StoreLimitsBuilder::new().memory_size(memory_bytes).build(),
            fuel_checkpoint,
            guest: None,
        }
    }

    /// Gas meter of the call
    #[must_use]
    pub fn gas(&self) -> &GasMeter {
        &self.gas
    }

    /// Charge the fuel burned since the last checkpoint
    fn settle(&mut self, fuel_now: u64) -> VmResult<()> {
        let burned = self.fuel_checkpoint.saturating_sub(fuel_now);
        self.fuel_checkpoint = fuel_now;
        self.gas.charge(burned, "wasm execution")?;
        Ok(())
    }

    /// End the call: exhaust the meter on out-of-gas, commit staged writes
    /// on success in read-write mode, and hand the services back
    pub(crate) fn finish(self, result: VmResult<Vec<u8>>) -> CallReport<S, A, Q> {
        let Self {
            storage,
            api,
            querier,
            mut gas,
            ..
        } = self;
        let mut result = result;
        if matches!(result, Err(VmError::OutOfGas { .. })) {
            gas.exhaust();
        }
        let commit = result.is_ok() && storage.mode() == AccessMode::ReadWrite;
        let (storage, committed) = storage.finish(commit);
        if let Err(err) = committed {
            tracing::warn!(error = %err, "Failed to commit staged writes");
            if result.is_ok() {
                result = Err(err.into());
            }
        }
        CallReport {
            backend: Backend::new(storage, api, querier),
            gas_used: gas.used(),
            result,
        }
    }
}

/// Bind the region management exports of a fresh instance
///
/// # Errors
///
/// Returns bad-argument if an export is missing or mistyped
pub(crate) fn bind_guest<S: StoreBackend, A, Q>(
    mut ctx: impl AsContextMut<Data = Environment<S, A, Q>>,
    instance: &Instance,
) -> VmResult<()> {
    let memory = instance
        .get_memory(&mut ctx, "memory")
        .ok_or_else(|| VmError::bad_argument("contract does not export memory"))?;
    let allocate = instance
        .get_typed_func::<u32, u32>(&mut ctx, "allocate")
        .map_err(|e| VmError::bad_argument(format!("allocate: {}", e)))?;
    let deallocate = instance
        .get_typed_func::<u32, ()>(&mut ctx, "deallocate")
        .map_err(|e| VmError::bad_argument(format!("deallocate: {}", e)))?;
    ctx.as_context_mut().data_mut().guest = Some(GuestExports {
        memory,
        allocate,
        deallocate,
    });
    Ok(())
}

/// Charge the meter for fuel the guest burned
///
/// # Errors
///
/// Returns out-of-gas if the meter cannot cover it
pub(crate) fn settle_fuel<S: StoreBackend, A, Q>(
    mut ctx: impl AsContextMut<Data = Environment<S, A, Q>>,
) -> VmResult<()> {
    let mut ctx = ctx.as_context_mut();
    let fuel = ctx.get_fuel().map_err(VmError::runtime)?;
    ctx.data_mut().settle(fuel)
}

/// Reset the store's fuel to what the meter has left
///
/// # Errors
///
/// Returns a runtime error if fuel metering is disabled
pub(crate) fn refuel<S: StoreBackend, A, Q>(
    mut ctx: impl AsContextMut<Data = Environment<S, A, Q>>,
) -> VmResult<()> {
    let mut ctx = ctx.as_context_mut();
    let remaining = ctx.data().gas.remaining();
    ctx.set_fuel(remaining).map_err(VmError::runtime)?;
    ctx.data_mut().fuel_checkpoint = remaining;
    Ok(())
}

fn guest<S, A, Q>(ctx: &impl AsContext<Data = Environment<S, A, Q>>) -> VmResult<GuestExports> {
    ctx.as_context()
        .data()
        .guest
        .clone()
        .ok_or_else(|| VmError::runtime("guest exports are not bound"))
}

/// Copy a region's data out of the guest
///
/// # Errors
///
/// Returns bad-argument for a malformed region or one longer than `max_len`
pub(crate) fn read_guest<S, A, Q>(
    ctx: impl AsContext<Data = Environment<S, A, Q>>,
    ptr: u32,
    max_len: usize,
) -> VmResult<Option<Vec<u8>>> {
    let guest = guest(&ctx)?;
    read_region(&guest.memory, &ctx, ptr, max_len)
}

/// Copy `data` into a region allocated by the guest
///
/// Ownership of the region passes to the guest.
///
/// # Errors
///
/// Returns a panic if the guest allocator misbehaves, or whatever the
/// allocator call fails with
pub(crate) fn write_guest<S, A, Q>(
    mut ctx: impl AsContextMut<Data = Environment<S, A, Q>>,
    data: &[u8],
) -> VmResult<u32> {
    let guest = guest(&ctx)?;
    let len = u32::try_from(data.len())
        .map_err(|_| VmError::bad_argument("data exceeds 32-bit length"))?;
    let ptr = guest
        .allocate
        .call(&mut ctx, len)
        .map_err(VmError::from_wasm)?;
    if ptr == 0 {
        return Err(VmError::Panic("allocate returned a null region".to_string()));
    }
    write_region(&guest.memory, &mut ctx, ptr, data).map_err(|e| match e {
        VmError::BadArgument(msg) => VmError::Panic(format!("allocate returned a bad region: {}", msg)),
        other => other,
    })?;
    Ok(ptr)
}

/// Region the guest handed to the host for it to free
pub(crate) struct OwnedRegion {
    ptr: u32,
}

impl OwnedRegion {
    pub(crate) fn new(ptr: u32) -> Self {
        Self { ptr }
    }

    /// Read the region and release it through the guest's `deallocate`
    ///
    /// The region is released even when reading fails.
    ///
    /// # Errors
    ///
    /// Returns the read error first, otherwise the deallocation error
    pub(crate) fn consume<S, A, Q>(
        self,
        mut ctx: impl AsContextMut<Data = Environment<S, A, Q>>,
        max_len: usize,
    ) -> VmResult<Option<Vec<u8>>> {
        if self.ptr == 0 {
            return Ok(None);
        }
        let guest = guest(&ctx)?;
        let data = read_region(&guest.memory, &ctx, self.ptr, max_len);
        let freed = guest
            .deallocate
            .call(&mut ctx, self.ptr)
            .map_err(VmError::from_wasm);
        let data = data?;
        freed?;
        Ok(data)
    }
}
