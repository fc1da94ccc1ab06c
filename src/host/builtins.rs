//! Compiler-rt helpers and the intentionally unimplemented intrinsics.
//!
//! Contracts built with the CDT lean on the host for bulk memory ops and
//! 128-bit integer arithmetic. `memcpy` keeps the forward byte-at-a-time
//! copy of the reference implementation, so an overlapping copy with
//! `dest > src` replicates the leading bytes rather than moving them.
//! Long-double and 128-bit shift helpers are not registered here at all;
//! they fall through to `define_unknown_imports_as_traps`.

use anyhow::Result;
use wasmtime::{Caller, Linker};

use super::{memory, HostEnv};
use crate::errors::{host_assert, HostError};
use crate::memory::MemoryView;

fn checked_range(size: usize, ptr: i32, len: i32) -> Result<std::ops::Range<usize>> {
    let start = ptr as u32 as usize;
    let length = len as u32 as usize;
    let end = start.checked_add(length).filter(|&e| e <= size);
    match end {
        Some(end) => Ok(start..end),
        None => Err(HostError::MemoryAccess {
            offset: start as u64,
            len: length as u64,
            size: size as u64,
        }
        .into()),
    }
}

fn compose_i128(lo: i64, hi: i64) -> i128 {
    (((hi as u64 as u128) << 64) | lo as u64 as u128) as i128
}

/// Register one 128-bit binary helper: operands arrive as (lo, hi) 64-bit
/// halves, the result is written little-endian at `ret`.
fn link_int128_op(
    linker: &mut Linker<HostEnv>,
    name: &'static str,
    op: fn(i128, i128) -> Result<i128>,
) -> Result<()> {
    linker.func_wrap(
        "env",
        name,
        move |mut caller: Caller<'_, HostEnv>, ret: i32, la: i64, ha: i64, lb: i64, hb: i64| -> Result<()> {
            let result = op(compose_i128(la, ha), compose_i128(lb, hb))?;
            let mem = memory(&mut caller)?;
            let (data, _env) = mem.data_and_store_mut(&mut caller);
            MemoryView::new(data).write(ret, &result.to_le_bytes())
        },
    )?;
    Ok(())
}

pub fn link(linker: &mut Linker<HostEnv>) -> Result<()> {
    linker.func_wrap(
        "env",
        "abort",
        |_caller: Caller<'_, HostEnv>| -> Result<()> { host_assert(false, "abort() called") },
    )?;

    linker.func_wrap(
        "env",
        "memcpy",
        |mut caller: Caller<'_, HostEnv>, dest: i32, src: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, _env) = mem.data_and_store_mut(&mut caller);
            let d = checked_range(data.len(), dest, len)?;
            let s = checked_range(data.len(), src, len)?;
            for i in 0..len as u32 as usize {
                data[d.start + i] = data[s.start + i];
            }
            Ok(dest)
        },
    )?;

    linker.func_wrap(
        "env",
        "memmove",
        |mut caller: Caller<'_, HostEnv>, dest: i32, src: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, _env) = mem.data_and_store_mut(&mut caller);
            let d = checked_range(data.len(), dest, len)?;
            let s = checked_range(data.len(), src, len)?;
            data.copy_within(s, d.start);
            Ok(dest)
        },
    )?;

    linker.func_wrap(
        "env",
        "memset",
        |mut caller: Caller<'_, HostEnv>, dest: i32, value: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, _env) = mem.data_and_store_mut(&mut caller);
            let d = checked_range(data.len(), dest, len)?;
            data[d].fill(value as u8);
            Ok(dest)
        },
    )?;

    link_int128_op(linker, "__multi3", |a, b| Ok(a.wrapping_mul(b)))?;
    link_int128_op(linker, "__divti3", |a, b| {
        host_assert(b != 0, "divide by zero")?;
        Ok(a.wrapping_div(b))
    })?;
    link_int128_op(linker, "__udivti3", |a, b| {
        host_assert(b != 0, "divide by zero")?;
        Ok(((a as u128) / (b as u128)) as i128)
    })?;
    link_int128_op(linker, "__modti3", |a, b| {
        host_assert(b != 0, "divide by zero")?;
        Ok(a.wrapping_rem(b))
    })?;
    link_int128_op(linker, "__umodti3", |a, b| {
        host_assert(b != 0, "divide by zero")?;
        Ok(((a as u128) % (b as u128)) as i128)
    })?;

    link_trap_stubs(linker)?;
    Ok(())
}

// Intrinsics that exist in the import surface but are deliberately
// unimplemented: calling one is fatal with a descriptive message.

fn not_implemented(name: &'static str) -> anyhow::Error {
    HostError::NotImplemented(name).into()
}

fn link_trap_stubs(linker: &mut Linker<HostEnv>) -> Result<()> {
    linker.func_wrap(
        "env",
        "send_context_free_inline",
        |_: Caller<'_, HostEnv>, _data: i32, _len: i32| -> Result<()> {
            Err(not_implemented("send_context_free_inline"))
        },
    )?;
    linker.func_wrap("env", "publication_time", |_: Caller<'_, HostEnv>| -> Result<i64> {
        Err(not_implemented("publication_time"))
    })?;
    linker.func_wrap(
        "env",
        "check_transaction_authorization",
        |_: Caller<'_, HostEnv>, _trx: i32, _trx_len: i32, _pubkeys: i32, _pub_len: i32, _perms: i32, _perm_len: i32| -> Result<i32> {
            Err(not_implemented("check_transaction_authorization"))
        },
    )?;
    linker.func_wrap(
        "env",
        "check_permission_authorization",
        |_: Caller<'_, HostEnv>, _account: i64, _permission: i64, _pubkeys: i32, _pub_len: i32, _perms: i32, _perm_len: i32, _delay: i64| -> Result<i32> {
            Err(not_implemented("check_permission_authorization"))
        },
    )?;
    linker.func_wrap(
        "env",
        "get_permission_last_used",
        |_: Caller<'_, HostEnv>, _account: i64, _permission: i64| -> Result<i64> {
            Err(not_implemented("get_permission_last_used"))
        },
    )?;
    linker.func_wrap(
        "env",
        "send_deferred",
        |_: Caller<'_, HostEnv>, _sender_id: i32, _payer: i64, _trx: i32, _len: i32, _replace: i32| -> Result<()> {
            Err(not_implemented("send_deferred"))
        },
    )?;
    linker.func_wrap(
        "env",
        "cancel_deferred",
        |_: Caller<'_, HostEnv>, _sender_id: i32| -> Result<i32> {
            Err(not_implemented("cancel_deferred"))
        },
    )?;
    linker.func_wrap(
        "env",
        "get_context_free_data",
        |_: Caller<'_, HostEnv>, _index: i32, _buf: i32, _len: i32| -> Result<i32> {
            Err(not_implemented("get_context_free_data"))
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_halves() {
        assert_eq!(compose_i128(-1, -1), -1);
        assert_eq!(compose_i128(5, 0), 5);
        assert_eq!(compose_i128(0, 1), 1i128 << 64);
    }

    #[test]
    fn range_checks() {
        assert_eq!(checked_range(16, 4, 8).unwrap(), 4..12);
        assert!(checked_range(16, 12, 8).is_err());
        assert!(checked_range(16, -4, 1).is_err());
    }
}
