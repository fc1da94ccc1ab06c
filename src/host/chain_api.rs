//! Chain state and ambient transaction intrinsics.

use anyhow::Result;
use wasmtime::{Caller, Linker};

use super::{memory, HostEnv};
use crate::codec::pack_action;
use crate::memory::MemoryView;

/// The `len == 0` size-query idiom shared by the buffer-returning
/// intrinsics.
fn copy_out(view: &mut MemoryView<'_>, buf: i32, len: i32, bytes: &[u8]) -> Result<i32> {
    if len == 0 {
        return Ok(bytes.len() as i32);
    }
    let copy = bytes.len().min(len as u32 as usize);
    view.write(buf, &bytes[..copy])?;
    Ok(copy as i32)
}

pub fn link(linker: &mut Linker<HostEnv>) -> Result<()> {
    linker.func_wrap("env", "current_time", |caller: Caller<'_, HostEnv>| -> Result<i64> {
        let chain = caller.data().lock_chain()?;
        Ok(chain.time_us() as i64)
    })?;

    linker.func_wrap("env", "get_block_num", |caller: Caller<'_, HostEnv>| -> Result<i32> {
        let chain = caller.data().lock_chain()?;
        Ok(chain.block_num() as i32)
    })?;

    linker.func_wrap(
        "env",
        "is_feature_activated",
        |mut caller: Caller<'_, HostEnv>, digest: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let digest: [u8; 32] = MemoryView::new(data).read_array(digest)?;
            let chain = env.chain.lock().map_err(super::lock_err)?;
            Ok(chain.is_feature_activated(&digest) as i32)
        },
    )?;

    linker.func_wrap(
        "env",
        "read_transaction",
        |mut caller: Caller<'_, HostEnv>, buf: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let packed = {
                let chain = env.chain.lock().map_err(super::lock_err)?;
                chain.transaction().pack()
            };
            copy_out(&mut MemoryView::new(data), buf, len, &packed)
        },
    )?;

    linker.func_wrap("env", "transaction_size", |caller: Caller<'_, HostEnv>| -> Result<i32> {
        let chain = caller.data().lock_chain()?;
        Ok(chain.transaction().pack().len() as i32)
    })?;

    linker.func_wrap("env", "tapos_block_num", |caller: Caller<'_, HostEnv>| -> Result<i32> {
        let chain = caller.data().lock_chain()?;
        Ok(chain.transaction().ref_block_num as i32)
    })?;

    linker.func_wrap("env", "tapos_block_prefix", |caller: Caller<'_, HostEnv>| -> Result<i32> {
        let chain = caller.data().lock_chain()?;
        Ok(chain.transaction().ref_block_prefix as i32)
    })?;

    linker.func_wrap("env", "expiration", |caller: Caller<'_, HostEnv>| -> Result<i32> {
        let chain = caller.data().lock_chain()?;
        Ok(chain.transaction().expiration as i32)
    })?;

    linker.func_wrap(
        "env",
        "get_action",
        |mut caller: Caller<'_, HostEnv>, kind: i32, index: i32, buf: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let packed = {
                let chain = env.chain.lock().map_err(super::lock_err)?;
                let trx = chain.transaction();
                let list = match kind {
                    0 => &trx.context_free_actions,
                    1 => &trx.actions,
                    _ => return Ok(-1),
                };
                match list.get(index as u32 as usize) {
                    Some(action) => pack_action(action),
                    None => return Ok(-1),
                }
            };
            copy_out(&mut MemoryView::new(data), buf, len, &packed)
        },
    )?;

    linker.func_wrap(
        "env",
        "get_active_producers",
        |mut caller: Caller<'_, HostEnv>, buf: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let packed = {
                let chain = env.chain.lock().map_err(super::lock_err)?;
                let mut out = Vec::with_capacity(chain.active_producers().len() * 8);
                for p in chain.active_producers() {
                    out.extend_from_slice(&p.0.to_le_bytes());
                }
                out
            };
            copy_out(&mut MemoryView::new(data), buf, len, &packed)
        },
    )?;

    linker.func_wrap(
        "env",
        "set_proposed_producers",
        |mut caller: Caller<'_, HostEnv>, data_ptr: i32, len: i32| -> Result<i64> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let packed = MemoryView::new(data).slice(data_ptr, len as u32)?.to_vec();
            let mut chain = env.chain.lock().map_err(super::lock_err)?;
            Ok(chain.propose_producers(packed))
        },
    )?;

    linker.func_wrap(
        "env",
        "set_blockchain_parameters_packed",
        |mut caller: Caller<'_, HostEnv>, data_ptr: i32, len: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let packed = MemoryView::new(data).slice(data_ptr, len as u32)?.to_vec();
            let mut chain = env.chain.lock().map_err(super::lock_err)?;
            chain.set_blockchain_parameters(packed);
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "get_blockchain_parameters_packed",
        |mut caller: Caller<'_, HostEnv>, buf: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let packed = {
                let chain = env.chain.lock().map_err(super::lock_err)?;
                chain.blockchain_parameters().to_vec()
            };
            copy_out(&mut MemoryView::new(data), buf, len, &packed)
        },
    )?;

    Ok(())
}
