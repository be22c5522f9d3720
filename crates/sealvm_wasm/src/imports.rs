//! Host functions exposed to contracts.
//!
//! Every callback follows the same sequence: settle the guest's fuel into
//! the meter, read its input regions, run the bridge operation against the
//! meter, refuel the store from what the meter has left, and hand any
//! result back in a guest-allocated region. Errors become traps that abort
//! the call; the engine recovers them from the trap.

use crate::abi::{IMPORT_MODULE, MAX_ADDRESS_LEN, MAX_QUERY_LEN};
use crate::backend::{canonicalize_address, humanize_address, query_with_gas, AddressCodec, QueryRouter};
use crate::environment::{read_guest, refuel, settle_fuel, write_guest, Environment};
use crate::error::{VmError, VmResult};
use sealvm_storage::{IteratorHandle, Order, Record, StoreBackend};
use wasmtime::{Caller, Engine, Linker};

type Ctx<'a, S, A, Q> = Caller<'a, Environment<S, A, Q>>;

/// Build a linker with every host import registered
///
/// # Errors
///
/// Returns a runtime error if registration fails
pub fn linker<S, A, Q>(engine: &Engine) -> VmResult<Linker<Environment<S, A, Q>>>
where
    S: StoreBackend + 'static,
    A: AddressCodec + 'static,
    Q: QueryRouter + 'static,
{
    let mut linker = Linker::new(engine);
    linker
        .func_wrap(IMPORT_MODULE, "db_read", |mut caller: Ctx<'_, S, A, Q>, key: u32| {
            db_read(&mut caller, key).map_err(anyhow::Error::from)
        })
        .map_err(VmError::runtime)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "db_write",
            |mut caller: Ctx<'_, S, A, Q>, key: u32, value: u32| {
                db_write(&mut caller, key, value).map_err(anyhow::Error::from)
            },
        )
        .map_err(VmError::runtime)?;
    linker
        .func_wrap(IMPORT_MODULE, "db_remove", |mut caller: Ctx<'_, S, A, Q>, key: u32| {
            db_remove(&mut caller, key).map_err(anyhow::Error::from)
        })
        .map_err(VmError::runtime)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "db_scan",
            |mut caller: Ctx<'_, S, A, Q>, start: u32, end: u32, order: i32| {
                db_scan(&mut caller, start, end, order).map_err(anyhow::Error::from)
            },
        )
        .map_err(VmError::runtime)?;
    linker
        .func_wrap(IMPORT_MODULE, "db_next", |mut caller: Ctx<'_, S, A, Q>, iterator: u32| {
            db_next(&mut caller, iterator).map_err(anyhow::Error::from)
        })
        .map_err(VmError::runtime)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "addr_canonicalize",
            |mut caller: Ctx<'_, S, A, Q>, human: u32| {
                addr_canonicalize(&mut caller, human).map_err(anyhow::Error::from)
            },
        )
        .map_err(VmError::runtime)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "addr_humanize",
            |mut caller: Ctx<'_, S, A, Q>, canonical: u32| {
                addr_humanize(&mut caller, canonical).map_err(anyhow::Error::from)
            },
        )
        .map_err(VmError::runtime)?;
    linker
        .func_wrap(IMPORT_MODULE, "query_chain", |mut caller: Ctx<'_, S, A, Q>, request: u32| {
            query_chain(&mut caller, request).map_err(anyhow::Error::from)
        })
        .map_err(VmError::runtime)?;
    linker
        .func_wrap(IMPORT_MODULE, "debug", |mut caller: Ctx<'_, S, A, Q>, message: u32| {
            debug(&mut caller, message).map_err(anyhow::Error::from)
        })
        .map_err(VmError::runtime)?;
    Ok(linker)
}

fn required(data: Option<Vec<u8>>, what: &str) -> VmResult<Vec<u8>> {
    data.ok_or_else(|| VmError::bad_argument(format!("missing {}", what)))
}

fn optional_result<S, A, Q>(caller: &mut Ctx<'_, S, A, Q>, data: Option<Vec<u8>>) -> VmResult<u32> {
    match data {
        Some(data) => write_guest(caller, &data),
        None => Ok(0),
    }
}

fn db_read<S: StoreBackend, A, Q>(caller: &mut Ctx<'_, S, A, Q>, key_ptr: u32) -> VmResult<u32> {
    settle_fuel(&mut *caller)?;
    let max_key = caller.data().storage.limits().max_key_len;
    let key = required(read_guest(&mut *caller, key_ptr, max_key)?, "key")?;
    let env = caller.data_mut();
    let value = env.storage.read(&mut env.gas, &key)?;
    refuel(&mut *caller)?;
    optional_result(caller, value)
}

fn db_write<S: StoreBackend, A, Q>(
    caller: &mut Ctx<'_, S, A, Q>,
    key_ptr: u32,
    value_ptr: u32,
) -> VmResult<()> {
    settle_fuel(&mut *caller)?;
    let limits = caller.data().storage.limits().clone();
    let key = required(read_guest(&mut *caller, key_ptr, limits.max_key_len)?, "key")?;
    let value = required(
        read_guest(&mut *caller, value_ptr, limits.max_value_len)?,
        "value",
    )?;
    let env = caller.data_mut();
    env.storage.write(&mut env.gas, &key, &value)?;
    refuel(&mut *caller)
}

fn db_remove<S: StoreBackend, A, Q>(caller: &mut Ctx<'_, S, A, Q>, key_ptr: u32) -> VmResult<()> {
    settle_fuel(&mut *caller)?;
    let max_key = caller.data().storage.limits().max_key_len;
    let key = required(read_guest(&mut *caller, key_ptr, max_key)?, "key")?;
    let env = caller.data_mut();
    env.storage.remove(&mut env.gas, &key)?;
    refuel(&mut *caller)
}

fn db_scan<S: StoreBackend, A, Q>(
    caller: &mut Ctx<'_, S, A, Q>,
    start_ptr: u32,
    end_ptr: u32,
    order: i32,
) -> VmResult<u32> {
    settle_fuel(&mut *caller)?;
    let order = Order::try_from(order)?;
    let max_key = caller.data().storage.limits().max_key_len;
    let start = read_guest(&mut *caller, start_ptr, max_key)?;
    let end = read_guest(&mut *caller, end_ptr, max_key)?;
    let env = caller.data_mut();
    let handle = env
        .storage
        .scan(&mut env.gas, start.as_deref(), end.as_deref(), order)?;
    refuel(&mut *caller)?;
    Ok(handle.index)
}

/// Record layout handed to the guest: big-endian `u32` key length, key, value
fn encode_record((key, value): Record) -> VmResult<Vec<u8>> {
    let key_len = u32::try_from(key.len()).map_err(|_| VmError::runtime("key exceeds 32-bit length"))?;
    let mut out = Vec::with_capacity(4 + key.len() + value.len());
    out.extend_from_slice(&key_len.to_be_bytes());
    out.extend_from_slice(&key);
    out.extend_from_slice(&value);
    Ok(out)
}

fn db_next<S: StoreBackend, A, Q>(caller: &mut Ctx<'_, S, A, Q>, iterator: u32) -> VmResult<u32> {
    settle_fuel(&mut *caller)?;
    let env = caller.data_mut();
    let handle = IteratorHandle {
        store: env.storage.store_id(),
        index: iterator,
    };
    let record = env.storage.next(&mut env.gas, handle)?;
    refuel(&mut *caller)?;
    let encoded = record.map(encode_record).transpose()?;
    optional_result(caller, encoded)
}

fn addr_canonicalize<S: StoreBackend, A: AddressCodec, Q>(
    caller: &mut Ctx<'_, S, A, Q>,
    human_ptr: u32,
) -> VmResult<u32> {
    settle_fuel(&mut *caller)?;
    let human = required(read_guest(&mut *caller, human_ptr, MAX_ADDRESS_LEN)?, "address")?;
    let human = String::from_utf8(human)
        .map_err(|_| VmError::bad_argument("address is not valid UTF-8"))?;
    let env = caller.data_mut();
    let canonical = canonicalize_address(&env.api, &mut env.gas, &env.costs, &human)?;
    refuel(&mut *caller)?;
    write_guest(caller, &canonical)
}

fn addr_humanize<S: StoreBackend, A: AddressCodec, Q>(
    caller: &mut Ctx<'_, S, A, Q>,
    canonical_ptr: u32,
) -> VmResult<u32> {
    settle_fuel(&mut *caller)?;
    let canonical = required(
        read_guest(&mut *caller, canonical_ptr, MAX_ADDRESS_LEN)?,
        "address",
    )?;
    let env = caller.data_mut();
    let human = humanize_address(&env.api, &mut env.gas, &env.costs, &canonical)?;
    refuel(&mut *caller)?;
    write_guest(caller, human.as_bytes())
}

fn query_chain<S: StoreBackend, A, Q: QueryRouter>(
    caller: &mut Ctx<'_, S, A, Q>,
    request_ptr: u32,
) -> VmResult<u32> {
    settle_fuel(&mut *caller)?;
    let request = required(read_guest(&mut *caller, request_ptr, MAX_QUERY_LEN)?, "query")?;
    let env = caller.data_mut();
    let response = query_with_gas(&env.querier, &mut env.gas, &env.costs, &request)?;
    refuel(&mut *caller)?;
    write_guest(caller, &response.encode())
}

fn debug<S: StoreBackend, A, Q>(caller: &mut Ctx<'_, S, A, Q>, message_ptr: u32) -> VmResult<()> {
    settle_fuel(&mut *caller)?;
    let env = caller.data_mut();
    env.gas.charge(env.costs.debug, "debug")?;
    let message = read_guest(&mut *caller, message_ptr, MAX_QUERY_LEN)?.unwrap_or_default();
    let env = caller.data_mut();
    env.gas.charge(env.costs.bytes_cost(message.len()), "debug")?;
    tracing::debug!(target: "sealvm::guest", "{}", String::from_utf8_lossy(&message));
    refuel(&mut *caller)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_record() {
        let encoded = encode_record((b"ab".to_vec(), b"xyz".to_vec())).unwrap();
        assert_eq!(encoded, vec![0, 0, 0, 2, b'a', b'b', b'x', b'y', b'z']);
    }

    #[test]
    fn test_linker_builds() {
        use crate::{HexAddressCodec, MockQuerier};
        use sealvm_storage::MemoryStore;

        let engine = Engine::default();
        assert!(linker::<MemoryStore, HexAddressCodec, MockQuerier>(&engine).is_ok());
    }
}
