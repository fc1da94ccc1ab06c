//! The host import surface.
//!
//! Every intrinsic a contract can call is registered here, grouped the way
//! the ABI groups them: action introspection, authorization, database,
//! crypto, console/assertion, chain/transaction access, and the
//! compiler-rt helpers. All imports live under the WASM module name `env`.
//!
//! Host state for one action lives in [`HostEnv`], the wasmtime store
//! data: the shared chain handle, the action context, and the per-action
//! iterator caches. Intrinsics obtain guest memory and host state together
//! through `Memory::data_and_store_mut`, so one closure can read guest
//! buffers and mutate the caches without aliasing.

pub mod action_api;
pub mod auth;
pub mod builtins;
pub mod chain_api;
pub mod crypto_api;
pub mod db;
pub mod print_api;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use wasmtime::{Caller, Linker, Memory, StoreLimits, StoreLimitsBuilder};

use crate::chain::Chain;
use crate::context::ActionContext;
use crate::iter_cache::IteratorCache;
use crate::store::INDEX_KINDS;

pub struct HostEnv {
    pub chain: Arc<Mutex<Chain>>,
    pub context: ActionContext,
    pub kv_cache: IteratorCache,
    pub idx_caches: [IteratorCache; INDEX_KINDS],
    pub limits: StoreLimits,
}

impl HostEnv {
    pub fn new(chain: Arc<Mutex<Chain>>, context: ActionContext) -> Self {
        HostEnv {
            chain,
            context,
            kv_cache: IteratorCache::new(),
            idx_caches: Default::default(),
            limits: StoreLimitsBuilder::new()
                .memories(usize::MAX)
                .tables(usize::MAX)
                .instances(usize::MAX)
                .build(),
        }
    }

    pub(crate) fn lock_chain(&self) -> Result<MutexGuard<'_, Chain>> {
        self.chain.lock().map_err(lock_err)
    }
}

pub(crate) fn lock_err<T>(err: PoisonError<T>) -> anyhow::Error {
    anyhow!("Mutex lock error: {}", err)
}

/// Register the complete `env` import surface on the linker.
pub fn setup_linker(linker: &mut Linker<HostEnv>) -> Result<()> {
    action_api::link(linker)?;
    auth::link(linker)?;
    db::link(linker)?;
    crypto_api::link(linker)?;
    print_api::link(linker)?;
    chain_api::link(linker)?;
    builtins::link(linker)?;
    Ok(())
}

pub(crate) fn memory(caller: &mut Caller<'_, HostEnv>) -> Result<Memory> {
    caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| anyhow!("guest module does not export linear memory"))
}
