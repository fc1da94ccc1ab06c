//! Database intrinsics: the primary `db_*_i64` family and the four
//! secondary index families (`db_idx64`, `db_idx128`, `db_idx256`,
//! `db_idx_double`).
//!
//! Iterator return conventions, shared by every lookup:
//! a miss on an existing table returns that table's end iterator (a
//! negative value below −1), a missing table returns −1, `next` of the
//! last row returns the end iterator, `next` past it returns −1, and
//! `previous` of the end iterator returns the last row.
//!
//! Writes, updates, and removals are only legal against tables owned by
//! the current receiver; reads may address any contract's tables.

use anyhow::Result;
use wasmtime::{Caller, Linker};

use super::{lock_err, memory, HostEnv};
use crate::chain::Chain;
use crate::errors::host_assert;
use crate::iter_cache::{IteratorCache, RowRef};
use crate::memory::MemoryView;
use crate::name::Name;
use crate::store::{
    checksum256_from_sort_key, checksum256_to_sort_key, IndexKind, Row, SecondaryKey,
};

const ERR_PAYER: &str = "must specify a valid account to pay for new record";
const ERR_UNIQUE: &str = "could not insert object, most likely a uniqueness constraint was violated";
const ERR_ACCESS: &str = "db access violation";
const ERR_TABLE_GONE: &str = "table of iterator no longer exists";
const ERR_DELETED: &str = "dereference of deleted object";

// ---- primary index semantics ----

fn db_store(
    chain: &mut Chain,
    cache: &mut IteratorCache,
    receiver: Name,
    scope: Name,
    table: Name,
    payer: Name,
    id: u64,
    value: Vec<u8>,
) -> Result<i32> {
    host_assert(!payer.is_empty(), ERR_PAYER)?;
    let tid = chain.store.create_table(receiver, scope, table);
    let t = chain.store.table_mut(tid).unwrap();
    host_assert(t.get(id).is_none(), ERR_UNIQUE)?;
    t.primary.insert(id, Row { primary: id, payer, value });
    cache.cache_table(tid);
    Ok(cache.add(RowRef { table_id: tid, primary: id }))
}

fn db_update(
    chain: &mut Chain,
    cache: &IteratorCache,
    receiver: Name,
    iter: i32,
    payer: Name,
    value: Vec<u8>,
) -> Result<()> {
    let rref = cache.get(iter)?;
    let t = chain.store.table_mut(rref.table_id);
    let t = match t {
        Some(t) => t,
        None => return host_assert(false, ERR_TABLE_GONE),
    };
    host_assert(t.code == receiver, ERR_ACCESS)?;
    let row = t.primary.get_mut(&rref.primary);
    let row = match row {
        Some(row) => row,
        None => return host_assert(false, ERR_DELETED),
    };
    if !payer.is_empty() {
        row.payer = payer;
    }
    row.value = value;
    Ok(())
}

fn db_remove(chain: &mut Chain, cache: &mut IteratorCache, receiver: Name, iter: i32) -> Result<()> {
    let rref = cache.get(iter)?;
    let t = chain.store.table_mut(rref.table_id);
    let t = match t {
        Some(t) => t,
        None => return host_assert(false, ERR_TABLE_GONE),
    };
    host_assert(t.code == receiver, ERR_ACCESS)?;
    host_assert(t.erase(rref.primary).is_some(), ERR_DELETED)?;
    cache.remove(iter)?;
    Ok(())
}

fn db_get(chain: &Chain, cache: &IteratorCache, iter: i32) -> Result<Vec<u8>> {
    let rref = cache.get(iter)?;
    let row = chain
        .store
        .table(rref.table_id)
        .and_then(|t| t.get(rref.primary));
    match row {
        Some(row) => Ok(row.value.clone()),
        None => {
            host_assert(false, ERR_DELETED)?;
            unreachable!()
        }
    }
}

fn db_find(chain: &Chain, cache: &mut IteratorCache, code: Name, scope: Name, table: Name, id: u64) -> i32 {
    let tid = match chain.store.find_table(code, scope, table) {
        Some(tid) => tid,
        None => return -1,
    };
    let end = cache.cache_table(tid);
    match chain.store.table(tid).unwrap().get(id) {
        Some(_) => cache.add(RowRef { table_id: tid, primary: id }),
        None => end,
    }
}

fn db_bound(
    chain: &Chain,
    cache: &mut IteratorCache,
    code: Name,
    scope: Name,
    table: Name,
    id: u64,
    upper: bool,
) -> i32 {
    let tid = match chain.store.find_table(code, scope, table) {
        Some(tid) => tid,
        None => return -1,
    };
    let end = cache.cache_table(tid);
    let t = chain.store.table(tid).unwrap();
    let found = if upper { t.upper_bound(id) } else { t.lower_bound(id) };
    match found {
        Some(p) => cache.add(RowRef { table_id: tid, primary: p }),
        None => end,
    }
}

fn db_end(chain: &Chain, cache: &mut IteratorCache, code: Name, scope: Name, table: Name) -> i32 {
    match chain.store.find_table(code, scope, table) {
        Some(tid) => cache.cache_table(tid),
        None => -1,
    }
}

fn db_next(chain: &Chain, cache: &mut IteratorCache, iter: i32) -> Result<(i32, Option<u64>)> {
    if iter < -1 {
        return Ok((-1, None)); // cannot step past the end iterator
    }
    let rref = cache.get(iter)?;
    let t = chain.store.table(rref.table_id);
    let t = match t {
        Some(t) => t,
        None => {
            host_assert(false, ERR_TABLE_GONE)?;
            unreachable!()
        }
    };
    match t.next_primary(rref.primary) {
        Some(p) => Ok((cache.add(RowRef { table_id: rref.table_id, primary: p }), Some(p))),
        None => Ok((cache.cache_table(rref.table_id), None)),
    }
}

fn db_previous(chain: &Chain, cache: &mut IteratorCache, iter: i32) -> Result<(i32, Option<u64>)> {
    if iter < -1 {
        let tid = cache.table_from_end_iterator(iter)?;
        let t = chain.store.table(tid);
        let t = match t {
            Some(t) => t,
            None => {
                host_assert(false, ERR_TABLE_GONE)?;
                unreachable!()
            }
        };
        return match t.penultimate() {
            Some(p) => Ok((cache.add(RowRef { table_id: tid, primary: p }), Some(p))),
            None => Ok((-1, None)),
        };
    }
    let rref = cache.get(iter)?;
    let t = chain.store.table(rref.table_id);
    let t = match t {
        Some(t) => t,
        None => {
            host_assert(false, ERR_TABLE_GONE)?;
            unreachable!()
        }
    };
    match t.prev_primary(rref.primary) {
        Some(p) => Ok((cache.add(RowRef { table_id: rref.table_id, primary: p }), Some(p))),
        None => Ok((-1, None)),
    }
}

// ---- secondary index semantics (shared by all four families) ----

fn idx_store(
    chain: &mut Chain,
    cache: &mut IteratorCache,
    receiver: Name,
    kind: IndexKind,
    scope: Name,
    table: Name,
    payer: Name,
    id: u64,
    key: SecondaryKey,
) -> Result<i32> {
    host_assert(!payer.is_empty(), ERR_PAYER)?;
    let tid = chain.store.create_table(receiver, scope, table);
    let t = chain.store.table_mut(tid).unwrap();
    host_assert(!t.index(kind).contains_primary(id), ERR_UNIQUE)?;
    t.index_mut(kind).set(id, key, payer);
    cache.cache_table(tid);
    Ok(cache.add(RowRef { table_id: tid, primary: id }))
}

fn idx_update(
    chain: &mut Chain,
    cache: &IteratorCache,
    receiver: Name,
    kind: IndexKind,
    iter: i32,
    payer: Name,
    key: SecondaryKey,
) -> Result<()> {
    let rref = cache.get(iter)?;
    let t = chain.store.table_mut(rref.table_id);
    let t = match t {
        Some(t) => t,
        None => return host_assert(false, ERR_TABLE_GONE),
    };
    host_assert(t.code == receiver, ERR_ACCESS)?;
    let old = t.index(kind).secondary_of(rref.primary);
    let (_, old_payer) = match old {
        Some(entry) => entry,
        None => return host_assert(false, ERR_DELETED),
    };
    let payer = if payer.is_empty() { old_payer } else { payer };
    t.index_mut(kind).set(rref.primary, key, payer);
    Ok(())
}

fn idx_remove(
    chain: &mut Chain,
    cache: &mut IteratorCache,
    receiver: Name,
    kind: IndexKind,
    iter: i32,
) -> Result<()> {
    let rref = cache.get(iter)?;
    let t = chain.store.table_mut(rref.table_id);
    let t = match t {
        Some(t) => t,
        None => return host_assert(false, ERR_TABLE_GONE),
    };
    host_assert(t.code == receiver, ERR_ACCESS)?;
    host_assert(t.index_mut(kind).remove(rref.primary).is_some(), ERR_DELETED)?;
    cache.remove(iter)?;
    Ok(())
}

fn idx_find_secondary(
    chain: &Chain,
    cache: &mut IteratorCache,
    kind: IndexKind,
    code: Name,
    scope: Name,
    table: Name,
    key: SecondaryKey,
) -> (i32, Option<u64>) {
    let tid = match chain.store.find_table(code, scope, table) {
        Some(tid) => tid,
        None => return (-1, None),
    };
    let end = cache.cache_table(tid);
    match chain.store.table(tid).unwrap().index(kind).find_secondary(key) {
        Some((_, p)) => (cache.add(RowRef { table_id: tid, primary: p }), Some(p)),
        None => (end, None),
    }
}

fn idx_find_primary(
    chain: &Chain,
    cache: &mut IteratorCache,
    kind: IndexKind,
    code: Name,
    scope: Name,
    table: Name,
    primary: u64,
) -> (i32, Option<SecondaryKey>) {
    let tid = match chain.store.find_table(code, scope, table) {
        Some(tid) => tid,
        None => return (-1, None),
    };
    let end = cache.cache_table(tid);
    match chain.store.table(tid).unwrap().index(kind).secondary_of(primary) {
        Some((key, _)) => (cache.add(RowRef { table_id: tid, primary }), Some(key)),
        None => (end, None),
    }
}

fn idx_bound(
    chain: &Chain,
    cache: &mut IteratorCache,
    kind: IndexKind,
    code: Name,
    scope: Name,
    table: Name,
    key: SecondaryKey,
    upper: bool,
) -> (i32, Option<(SecondaryKey, u64)>) {
    let tid = match chain.store.find_table(code, scope, table) {
        Some(tid) => tid,
        None => return (-1, None),
    };
    let end = cache.cache_table(tid);
    let index = chain.store.table(tid).unwrap().index(kind);
    let found = if upper { index.upper_bound(key) } else { index.lower_bound(key) };
    match found {
        Some((k, p)) => (cache.add(RowRef { table_id: tid, primary: p }), Some((k, p))),
        None => (end, None),
    }
}

fn idx_next(
    chain: &Chain,
    cache: &mut IteratorCache,
    kind: IndexKind,
    iter: i32,
) -> Result<(i32, Option<u64>)> {
    if iter < -1 {
        return Ok((-1, None));
    }
    let rref = cache.get(iter)?;
    let t = chain.store.table(rref.table_id);
    let t = match t {
        Some(t) => t,
        None => {
            host_assert(false, ERR_TABLE_GONE)?;
            unreachable!()
        }
    };
    match t.index(kind).next(rref.primary) {
        Some((_, p)) => Ok((cache.add(RowRef { table_id: rref.table_id, primary: p }), Some(p))),
        None => Ok((cache.cache_table(rref.table_id), None)),
    }
}

fn idx_previous(
    chain: &Chain,
    cache: &mut IteratorCache,
    kind: IndexKind,
    iter: i32,
) -> Result<(i32, Option<u64>)> {
    if iter < -1 {
        let tid = cache.table_from_end_iterator(iter)?;
        let t = chain.store.table(tid);
        let t = match t {
            Some(t) => t,
            None => {
                host_assert(false, ERR_TABLE_GONE)?;
                unreachable!()
            }
        };
        return match t.index(kind).penultimate() {
            Some((_, p)) => Ok((cache.add(RowRef { table_id: tid, primary: p }), Some(p))),
            None => Ok((-1, None)),
        };
    }
    let rref = cache.get(iter)?;
    let t = chain.store.table(rref.table_id);
    let t = match t {
        Some(t) => t,
        None => {
            host_assert(false, ERR_TABLE_GONE)?;
            unreachable!()
        }
    };
    match t.index(kind).prev(rref.primary) {
        Some((_, p)) => Ok((cache.add(RowRef { table_id: rref.table_id, primary: p }), Some(p))),
        None => Ok((-1, None)),
    }
}

// ---- linker registration ----

pub fn link(linker: &mut Linker<HostEnv>) -> Result<()> {
    link_primary(linker)?;
    link_fixed_family(linker, IndexKind::U64, IDX64_NAMES, read_key_u64, write_key_u64)?;
    link_fixed_family(linker, IndexKind::U128, IDX128_NAMES, read_key_u128, write_key_u128)?;
    link_fixed_family(linker, IndexKind::Double, IDX_DOUBLE_NAMES, read_key_f64, write_key_f64)?;
    link_idx256(linker)?;
    Ok(())
}

fn link_primary(linker: &mut Linker<HostEnv>) -> Result<()> {
    linker.func_wrap(
        "env",
        "db_store_i64",
        |mut caller: Caller<'_, HostEnv>, scope: i64, table: i64, payer: i64, id: i64, data: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let value = MemoryView::new(mem_data).slice(data, len as u32)?.to_vec();
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            db_store(
                &mut chain,
                &mut env.kv_cache,
                receiver,
                Name(scope as u64),
                Name(table as u64),
                Name(payer as u64),
                id as u64,
                value,
            )
        },
    )?;

    linker.func_wrap(
        "env",
        "db_update_i64",
        |mut caller: Caller<'_, HostEnv>, iter: i32, payer: i64, data: i32, len: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let value = MemoryView::new(mem_data).slice(data, len as u32)?.to_vec();
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            db_update(&mut chain, &env.kv_cache, receiver, iter, Name(payer as u64), value)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_remove_i64",
        |mut caller: Caller<'_, HostEnv>, iter: i32| -> Result<()> {
            let env = caller.data_mut();
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            db_remove(&mut chain, &mut env.kv_cache, receiver, iter)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_get_i64",
        |mut caller: Caller<'_, HostEnv>, iter: i32, data: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let value = {
                let chain = env.chain.lock().map_err(lock_err)?;
                db_get(&chain, &env.kv_cache, iter)?
            };
            if len == 0 {
                return Ok(value.len() as i32);
            }
            let copy = value.len().min(len as u32 as usize);
            MemoryView::new(mem_data).write(data, &value[..copy])?;
            Ok(copy as i32)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_next_i64",
        |mut caller: Caller<'_, HostEnv>, iter: i32, primary: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let (handle, found) = {
                let chain = env.chain.lock().map_err(lock_err)?;
                db_next(&chain, &mut env.kv_cache, iter)?
            };
            if let Some(p) = found {
                MemoryView::new(mem_data).write_u64(primary, p)?;
            }
            Ok(handle)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_previous_i64",
        |mut caller: Caller<'_, HostEnv>, iter: i32, primary: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let (handle, found) = {
                let chain = env.chain.lock().map_err(lock_err)?;
                db_previous(&chain, &mut env.kv_cache, iter)?
            };
            if let Some(p) = found {
                MemoryView::new(mem_data).write_u64(primary, p)?;
            }
            Ok(handle)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_find_i64",
        |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, id: i64| -> Result<i32> {
            let env = caller.data_mut();
            let chain = env.chain.lock().map_err(lock_err)?;
            Ok(db_find(
                &chain,
                &mut env.kv_cache,
                Name(code as u64),
                Name(scope as u64),
                Name(table as u64),
                id as u64,
            ))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_lowerbound_i64",
        |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, id: i64| -> Result<i32> {
            let env = caller.data_mut();
            let chain = env.chain.lock().map_err(lock_err)?;
            Ok(db_bound(
                &chain,
                &mut env.kv_cache,
                Name(code as u64),
                Name(scope as u64),
                Name(table as u64),
                id as u64,
                false,
            ))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_upperbound_i64",
        |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, id: i64| -> Result<i32> {
            let env = caller.data_mut();
            let chain = env.chain.lock().map_err(lock_err)?;
            Ok(db_bound(
                &chain,
                &mut env.kv_cache,
                Name(code as u64),
                Name(scope as u64),
                Name(table as u64),
                id as u64,
                true,
            ))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_end_i64",
        |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64| -> Result<i32> {
            let env = caller.data_mut();
            let chain = env.chain.lock().map_err(lock_err)?;
            Ok(db_end(
                &chain,
                &mut env.kv_cache,
                Name(code as u64),
                Name(scope as u64),
                Name(table as u64),
            ))
        },
    )?;

    Ok(())
}

// Key accessors for the fixed-width families. The checksum256 pair lives
// with the idx256 registration below; its wire-to-sort-key conversion is
// applied here and only here.

type ReadKey = fn(&MemoryView<'_>, i32) -> Result<SecondaryKey>;
type WriteKey = fn(&mut MemoryView<'_>, i32, SecondaryKey) -> Result<()>;

fn read_key_u64(view: &MemoryView<'_>, ptr: i32) -> Result<SecondaryKey> {
    Ok(SecondaryKey::U64(view.read_u64(ptr)?))
}

fn write_key_u64(view: &mut MemoryView<'_>, ptr: i32, key: SecondaryKey) -> Result<()> {
    match key {
        SecondaryKey::U64(v) => view.write_u64(ptr, v),
        _ => unreachable!("u64 index holds u64 keys"),
    }
}

fn read_key_u128(view: &MemoryView<'_>, ptr: i32) -> Result<SecondaryKey> {
    Ok(SecondaryKey::U128(view.read_u128(ptr)?))
}

fn write_key_u128(view: &mut MemoryView<'_>, ptr: i32, key: SecondaryKey) -> Result<()> {
    match key {
        SecondaryKey::U128(v) => view.write_u128(ptr, v),
        _ => unreachable!("u128 index holds u128 keys"),
    }
}

fn read_key_f64(view: &MemoryView<'_>, ptr: i32) -> Result<SecondaryKey> {
    Ok(SecondaryKey::F64(view.read_f64(ptr)?))
}

fn write_key_f64(view: &mut MemoryView<'_>, ptr: i32, key: SecondaryKey) -> Result<()> {
    match key {
        SecondaryKey::F64(v) => view.write(ptr, &v.to_le_bytes()),
        _ => unreachable!("double index holds double keys"),
    }
}

struct FamilyNames {
    store: &'static str,
    update: &'static str,
    remove: &'static str,
    find_secondary: &'static str,
    find_primary: &'static str,
    lowerbound: &'static str,
    upperbound: &'static str,
    end: &'static str,
    next: &'static str,
    previous: &'static str,
}

const IDX64_NAMES: FamilyNames = FamilyNames {
    store: "db_idx64_store",
    update: "db_idx64_update",
    remove: "db_idx64_remove",
    find_secondary: "db_idx64_find_secondary",
    find_primary: "db_idx64_find_primary",
    lowerbound: "db_idx64_lowerbound",
    upperbound: "db_idx64_upperbound",
    end: "db_idx64_end",
    next: "db_idx64_next",
    previous: "db_idx64_previous",
};

const IDX128_NAMES: FamilyNames = FamilyNames {
    store: "db_idx128_store",
    update: "db_idx128_update",
    remove: "db_idx128_remove",
    find_secondary: "db_idx128_find_secondary",
    find_primary: "db_idx128_find_primary",
    lowerbound: "db_idx128_lowerbound",
    upperbound: "db_idx128_upperbound",
    end: "db_idx128_end",
    next: "db_idx128_next",
    previous: "db_idx128_previous",
};

const IDX_DOUBLE_NAMES: FamilyNames = FamilyNames {
    store: "db_idx_double_store",
    update: "db_idx_double_update",
    remove: "db_idx_double_remove",
    find_secondary: "db_idx_double_find_secondary",
    find_primary: "db_idx_double_find_primary",
    lowerbound: "db_idx_double_lowerbound",
    upperbound: "db_idx_double_upperbound",
    end: "db_idx_double_end",
    next: "db_idx_double_next",
    previous: "db_idx_double_previous",
};

/// Register one secondary family whose key is a fixed-width value behind a
/// single pointer (idx64, idx128, idx_double).
fn link_fixed_family(
    linker: &mut Linker<HostEnv>,
    kind: IndexKind,
    names: FamilyNames,
    read_key: ReadKey,
    write_key: WriteKey,
) -> Result<()> {
    linker.func_wrap(
        "env",
        names.store,
        move |mut caller: Caller<'_, HostEnv>, scope: i64, table: i64, payer: i64, id: i64, secondary: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let key = read_key(&MemoryView::new(mem_data), secondary)?;
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            idx_store(
                &mut chain,
                &mut env.idx_caches[kind as usize],
                receiver,
                kind,
                Name(scope as u64),
                Name(table as u64),
                Name(payer as u64),
                id as u64,
                key,
            )
        },
    )?;

    linker.func_wrap(
        "env",
        names.update,
        move |mut caller: Caller<'_, HostEnv>, iter: i32, payer: i64, secondary: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let key = read_key(&MemoryView::new(mem_data), secondary)?;
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            idx_update(&mut chain, &env.idx_caches[kind as usize], receiver, kind, iter, Name(payer as u64), key)
        },
    )?;

    linker.func_wrap(
        "env",
        names.remove,
        move |mut caller: Caller<'_, HostEnv>, iter: i32| -> Result<()> {
            let env = caller.data_mut();
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            idx_remove(&mut chain, &mut env.idx_caches[kind as usize], receiver, kind, iter)
        },
    )?;

    linker.func_wrap(
        "env",
        names.find_secondary,
        move |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, secondary: i32, primary: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            let key = read_key(&view, secondary)?;
            let (handle, found) = {
                let chain = env.chain.lock().map_err(lock_err)?;
                idx_find_secondary(
                    &chain,
                    &mut env.idx_caches[kind as usize],
                    kind,
                    Name(code as u64),
                    Name(scope as u64),
                    Name(table as u64),
                    key,
                )
            };
            if let Some(p) = found {
                view.write_u64(primary, p)?;
            }
            Ok(handle)
        },
    )?;

    linker.func_wrap(
        "env",
        names.find_primary,
        move |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, secondary: i32, primary: i64| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let (handle, found) = {
                let chain = env.chain.lock().map_err(lock_err)?;
                idx_find_primary(
                    &chain,
                    &mut env.idx_caches[kind as usize],
                    kind,
                    Name(code as u64),
                    Name(scope as u64),
                    Name(table as u64),
                    primary as u64,
                )
            };
            if let Some(key) = found {
                write_key(&mut MemoryView::new(mem_data), secondary, key)?;
            }
            Ok(handle)
        },
    )?;

    for (name, upper) in [(names.lowerbound, false), (names.upperbound, true)] {
        linker.func_wrap(
            "env",
            name,
            move |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, secondary: i32, primary: i32| -> Result<i32> {
                let mem = memory(&mut caller)?;
                let (mem_data, env) = mem.data_and_store_mut(&mut caller);
                let mut view = MemoryView::new(mem_data);
                let key = read_key(&view, secondary)?;
                let (handle, found) = {
                    let chain = env.chain.lock().map_err(lock_err)?;
                    idx_bound(
                        &chain,
                        &mut env.idx_caches[kind as usize],
                        kind,
                        Name(code as u64),
                        Name(scope as u64),
                        Name(table as u64),
                        key,
                        upper,
                    )
                };
                if let Some((k, p)) = found {
                    write_key(&mut view, secondary, k)?;
                    view.write_u64(primary, p)?;
                }
                Ok(handle)
            },
        )?;
    }

    linker.func_wrap(
        "env",
        names.end,
        move |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64| -> Result<i32> {
            let env = caller.data_mut();
            let chain = env.chain.lock().map_err(lock_err)?;
            Ok(db_end(
                &chain,
                &mut env.idx_caches[kind as usize],
                Name(code as u64),
                Name(scope as u64),
                Name(table as u64),
            ))
        },
    )?;

    for (name, forward) in [(names.next, true), (names.previous, false)] {
        linker.func_wrap(
            "env",
            name,
            move |mut caller: Caller<'_, HostEnv>, iter: i32, primary: i32| -> Result<i32> {
                let mem = memory(&mut caller)?;
                let (mem_data, env) = mem.data_and_store_mut(&mut caller);
                let (handle, found) = {
                    let chain = env.chain.lock().map_err(lock_err)?;
                    let cache = &mut env.idx_caches[kind as usize];
                    if forward {
                        idx_next(&chain, cache, kind, iter)?
                    } else {
                        idx_previous(&chain, cache, kind, iter)?
                    }
                };
                if let Some(p) = found {
                    MemoryView::new(mem_data).write_u64(primary, p)?;
                }
                Ok(handle)
            },
        )?;
    }

    Ok(())
}

// The 256-bit family passes its key as a span of two u128 words; the wire
// bytes are converted to sort-key form on the way in and back on the way
// out, so contracts only ever see their own byte order.

const ERR_IDX256_LEN: &str = "invalid size of secondary key array";

fn read_key_256(view: &MemoryView<'_>, ptr: i32, words: i32) -> Result<SecondaryKey> {
    host_assert(words == 2, ERR_IDX256_LEN)?;
    let raw: [u8; 32] = view.read_array(ptr)?;
    Ok(SecondaryKey::Bytes32(checksum256_to_sort_key(&raw)))
}

fn write_key_256(view: &mut MemoryView<'_>, ptr: i32, words: i32, key: SecondaryKey) -> Result<()> {
    host_assert(words == 2, ERR_IDX256_LEN)?;
    match key {
        SecondaryKey::Bytes32(sort) => view.write(ptr, &checksum256_from_sort_key(&sort)),
        _ => unreachable!("checksum256 index holds 32-byte keys"),
    }
}

fn link_idx256(linker: &mut Linker<HostEnv>) -> Result<()> {
    const KIND: IndexKind = IndexKind::Bytes32;

    linker.func_wrap(
        "env",
        "db_idx256_store",
        |mut caller: Caller<'_, HostEnv>, scope: i64, table: i64, payer: i64, id: i64, data: i32, data_len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let key = read_key_256(&MemoryView::new(mem_data), data, data_len)?;
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            idx_store(
                &mut chain,
                &mut env.idx_caches[KIND as usize],
                receiver,
                KIND,
                Name(scope as u64),
                Name(table as u64),
                Name(payer as u64),
                id as u64,
                key,
            )
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx256_update",
        |mut caller: Caller<'_, HostEnv>, iter: i32, payer: i64, data: i32, data_len: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let key = read_key_256(&MemoryView::new(mem_data), data, data_len)?;
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            idx_update(&mut chain, &env.idx_caches[KIND as usize], receiver, KIND, iter, Name(payer as u64), key)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx256_remove",
        |mut caller: Caller<'_, HostEnv>, iter: i32| -> Result<()> {
            let env = caller.data_mut();
            let receiver = env.context.receiver;
            let mut chain = env.chain.lock().map_err(lock_err)?;
            idx_remove(&mut chain, &mut env.idx_caches[KIND as usize], receiver, KIND, iter)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx256_find_secondary",
        |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, data: i32, data_len: i32, primary: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            let key = read_key_256(&view, data, data_len)?;
            let (handle, found) = {
                let chain = env.chain.lock().map_err(lock_err)?;
                idx_find_secondary(
                    &chain,
                    &mut env.idx_caches[KIND as usize],
                    KIND,
                    Name(code as u64),
                    Name(scope as u64),
                    Name(table as u64),
                    key,
                )
            };
            if let Some(p) = found {
                view.write_u64(primary, p)?;
            }
            Ok(handle)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx256_find_primary",
        |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, data: i32, data_len: i32, primary: i64| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, env) = mem.data_and_store_mut(&mut caller);
            let (handle, found) = {
                let chain = env.chain.lock().map_err(lock_err)?;
                idx_find_primary(
                    &chain,
                    &mut env.idx_caches[KIND as usize],
                    KIND,
                    Name(code as u64),
                    Name(scope as u64),
                    Name(table as u64),
                    primary as u64,
                )
            };
            if let Some(key) = found {
                write_key_256(&mut MemoryView::new(mem_data), data, data_len, key)?;
            }
            Ok(handle)
        },
    )?;

    for (name, upper) in [("db_idx256_lowerbound", false), ("db_idx256_upperbound", true)] {
        linker.func_wrap(
            "env",
            name,
            move |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64, data: i32, data_len: i32, primary: i32| -> Result<i32> {
                let mem = memory(&mut caller)?;
                let (mem_data, env) = mem.data_and_store_mut(&mut caller);
                let mut view = MemoryView::new(mem_data);
                let key = read_key_256(&view, data, data_len)?;
                let (handle, found) = {
                    let chain = env.chain.lock().map_err(lock_err)?;
                    idx_bound(
                        &chain,
                        &mut env.idx_caches[KIND as usize],
                        KIND,
                        Name(code as u64),
                        Name(scope as u64),
                        Name(table as u64),
                        key,
                        upper,
                    )
                };
                if let Some((k, p)) = found {
                    write_key_256(&mut view, data, data_len, k)?;
                    view.write_u64(primary, p)?;
                }
                Ok(handle)
            },
        )?;
    }

    linker.func_wrap(
        "env",
        "db_idx256_end",
        |mut caller: Caller<'_, HostEnv>, code: i64, scope: i64, table: i64| -> Result<i32> {
            let env = caller.data_mut();
            let chain = env.chain.lock().map_err(lock_err)?;
            Ok(db_end(
                &chain,
                &mut env.idx_caches[KIND as usize],
                Name(code as u64),
                Name(scope as u64),
                Name(table as u64),
            ))
        },
    )?;

    for (name, forward) in [("db_idx256_next", true), ("db_idx256_previous", false)] {
        linker.func_wrap(
            "env",
            name,
            move |mut caller: Caller<'_, HostEnv>, iter: i32, primary: i32| -> Result<i32> {
                let mem = memory(&mut caller)?;
                let (mem_data, env) = mem.data_and_store_mut(&mut caller);
                let (handle, found) = {
                    let chain = env.chain.lock().map_err(lock_err)?;
                    let cache = &mut env.idx_caches[KIND as usize];
                    if forward {
                        idx_next(&chain, cache, KIND, iter)?
                    } else {
                        idx_previous(&chain, cache, KIND, iter)?
                    }
                };
                if let Some(p) = found {
                    MemoryView::new(mem_data).write_u64(primary, p)?;
                }
                Ok(handle)
            },
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn setup() -> (Arc<Mutex<Chain>>, IteratorCache) {
        (Arc::new(Mutex::new(Chain::new())), IteratorCache::new())
    }

    #[test]
    fn store_find_walk_matches_iterator_conventions() {
        let (chain, mut cache) = setup();
        let mut chain = chain.lock().unwrap();
        let (code, scope, table) = (n("code"), n("scope"), n("tbl"));

        for id in [1u64, 3, 5] {
            db_store(&mut chain, &mut cache, code, scope, table, n("payer"), id, vec![id as u8])
                .unwrap();
        }

        // lowerbound(4) lands on 5, previous yields 3, next yields end.
        let it = db_bound(&chain, &mut cache, code, scope, table, 4, false);
        assert!(it >= 0);
        let (prev, p) = db_previous(&chain, &mut cache, it).unwrap();
        assert!(prev >= 0);
        assert_eq!(p, Some(3));
        let (next, p) = db_next(&chain, &mut cache, it).unwrap();
        assert!(next < -1);
        assert_eq!(p, None);
        // next of end is -1; previous of end is the max row.
        assert_eq!(db_next(&chain, &mut cache, next).unwrap().0, -1);
        let (last, p) = db_previous(&chain, &mut cache, next).unwrap();
        assert_eq!(p, Some(5));
        assert_eq!(last, it);
    }

    #[test]
    fn missing_table_returns_minus_one_everywhere() {
        let (chain, mut cache) = setup();
        let chain = chain.lock().unwrap();
        let (code, scope, table) = (n("code"), n("scope"), n("none"));
        assert_eq!(db_find(&chain, &mut cache, code, scope, table, 1), -1);
        assert_eq!(db_bound(&chain, &mut cache, code, scope, table, 1, false), -1);
        assert_eq!(db_bound(&chain, &mut cache, code, scope, table, 1, true), -1);
        assert_eq!(db_end(&chain, &mut cache, code, scope, table), -1);
    }

    #[test]
    fn store_preconditions() {
        let (chain, mut cache) = setup();
        let mut chain = chain.lock().unwrap();
        let (code, scope, table) = (n("code"), n("scope"), n("tbl"));
        assert!(db_store(&mut chain, &mut cache, code, scope, table, Name(0), 1, vec![]).is_err());
        db_store(&mut chain, &mut cache, code, scope, table, n("p"), 1, vec![]).unwrap();
        let err = db_store(&mut chain, &mut cache, code, scope, table, n("p"), 1, vec![])
            .unwrap_err()
            .to_string();
        assert!(err.contains("uniqueness"));
    }

    #[test]
    fn foreign_table_writes_rejected() {
        let (chain, mut cache) = setup();
        let mut chain = chain.lock().unwrap();
        let it = db_store(&mut chain, &mut cache, n("owner"), n("s"), n("t"), n("p"), 1, vec![1])
            .unwrap();
        let err = db_update(&mut chain, &cache, n("intruder"), it, Name(0), vec![2])
            .unwrap_err()
            .to_string();
        assert!(err.contains("db access violation"));
        assert!(db_remove(&mut chain, &mut cache, n("intruder"), it).is_err());
        // the owner may update; payer 0 keeps the previous payer
        db_update(&mut chain, &cache, n("owner"), it, Name(0), vec![9]).unwrap();
        assert_eq!(db_get(&chain, &cache, it).unwrap(), vec![9]);
    }

    #[test]
    fn remove_tombstones_iterator_and_drops_secondaries() {
        let (chain, mut cache) = setup();
        let mut chain = chain.lock().unwrap();
        let it = db_store(&mut chain, &mut cache, n("c"), n("s"), n("t"), n("p"), 7, vec![]).unwrap();
        let mut idx_cache = IteratorCache::new();
        idx_store(
            &mut chain, &mut idx_cache, n("c"), IndexKind::U64, n("s"), n("t"), n("p"), 7,
            SecondaryKey::U64(42),
        )
        .unwrap();
        db_remove(&mut chain, &mut cache, n("c"), it).unwrap();
        assert!(db_get(&chain, &cache, it).is_err());
        let (h, _) = idx_find_secondary(
            &chain, &mut idx_cache, IndexKind::U64, n("c"), n("s"), n("t"), SecondaryKey::U64(42),
        );
        assert!(h < -1, "secondary entry should be gone, got handle {}", h);
    }

    #[test]
    fn idx128_duplicate_secondary_walk() {
        let (chain, mut cache) = setup();
        let mut chain = chain.lock().unwrap();
        let (code, scope, table) = (n("c"), n("s"), n("t"));
        for (id, key) in [(1u64, 0x100u128), (2, 0x100), (3, 0x200)] {
            idx_store(
                &mut chain, &mut cache, code, IndexKind::U128, scope, table, n("p"), id,
                SecondaryKey::U128(key),
            )
            .unwrap();
        }
        let (h, p) = idx_find_secondary(
            &chain, &mut cache, IndexKind::U128, code, scope, table, SecondaryKey::U128(0x100),
        );
        assert_eq!(p, Some(1));
        let (h, p) = idx_next(&chain, &mut cache, IndexKind::U128, h).unwrap();
        assert_eq!(p, Some(2));
        let (h, p) = idx_next(&chain, &mut cache, IndexKind::U128, h).unwrap();
        assert_eq!(p, Some(3));
        let (end, p) = idx_next(&chain, &mut cache, IndexKind::U128, h).unwrap();
        assert!(end < -1);
        assert_eq!(p, None);
        let (back, p) = idx_previous(&chain, &mut cache, IndexKind::U128, end).unwrap();
        assert_eq!(p, Some(3));
        assert_eq!(back, h);
    }

    #[test]
    fn idx_bounds_and_find_primary() {
        let (chain, mut cache) = setup();
        let mut chain = chain.lock().unwrap();
        let (code, scope, table) = (n("c"), n("s"), n("t"));
        for (id, key) in [(1u64, 10u64), (2, 10), (3, 20)] {
            idx_store(
                &mut chain, &mut cache, code, IndexKind::U64, scope, table, n("p"), id,
                SecondaryKey::U64(key),
            )
            .unwrap();
        }
        let (_, found) = idx_bound(
            &chain, &mut cache, IndexKind::U64, code, scope, table, SecondaryKey::U64(10), false,
        );
        assert_eq!(found, Some((SecondaryKey::U64(10), 1)));
        let (_, found) = idx_bound(
            &chain, &mut cache, IndexKind::U64, code, scope, table, SecondaryKey::U64(10), true,
        );
        assert_eq!(found, Some((SecondaryKey::U64(20), 3)));
        let (end, found) = idx_bound(
            &chain, &mut cache, IndexKind::U64, code, scope, table, SecondaryKey::U64(21), false,
        );
        assert!(end < -1);
        assert_eq!(found, None);
        let (_, key) = idx_find_primary(&chain, &mut cache, IndexKind::U64, code, scope, table, 3);
        assert_eq!(key, Some(SecondaryKey::U64(20)));
    }
}
