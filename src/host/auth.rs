//! Authorization and account introspection intrinsics.

use anyhow::Result;
use wasmtime::{Caller, Linker};

use super::{memory, HostEnv};
use crate::codec::write_varuint32;
use crate::errors::host_assert;
use crate::memory::MemoryView;
use crate::name::Name;

fn has_authorization(env: &HostEnv, actor: Name) -> bool {
    let active: Name = "active".parse().unwrap();
    let owner: Name = "owner".parse().unwrap();
    env.context
        .authorization
        .iter()
        .any(|l| l.actor == actor && (l.permission == active || l.permission == owner))
}

pub fn link(linker: &mut Linker<HostEnv>) -> Result<()> {
    linker.func_wrap(
        "env",
        "require_auth",
        |caller: Caller<'_, HostEnv>, account: i64| -> Result<()> {
            let account = Name(account as u64);
            host_assert(
                has_authorization(caller.data(), account),
                format!("missing authority of {}", account),
            )
        },
    )?;

    linker.func_wrap("env", "has_auth", |caller: Caller<'_, HostEnv>, account: i64| -> i32 {
        has_authorization(caller.data(), Name(account as u64)) as i32
    })?;

    linker.func_wrap(
        "env",
        "require_auth2",
        |caller: Caller<'_, HostEnv>, account: i64, permission: i64| -> Result<()> {
            let account = Name(account as u64);
            let permission = Name(permission as u64);
            let held = caller
                .data()
                .context
                .authorization
                .iter()
                .any(|l| l.actor == account && l.permission == permission);
            host_assert(held, format!("missing authority of {}/{}", account, permission))
        },
    )?;

    linker.func_wrap("env", "is_account", |caller: Caller<'_, HostEnv>, account: i64| -> Result<i32> {
        let chain = caller.data().lock_chain()?;
        Ok(chain.is_account(Name(account as u64)) as i32)
    })?;

    linker.func_wrap(
        "env",
        "get_code_hash",
        |mut caller: Caller<'_, HostEnv>, account: i64, struct_version: i32, out: i32| -> Result<i32> {
            let account = Name(account as u64);
            let (code_sequence, code_hash) = {
                let chain = caller.data().lock_chain()?;
                match chain.account(account) {
                    Some(a) => (a.code_sequence, a.code_hash),
                    None => (0, [0u8; 32]),
                }
            };
            let mut packed = Vec::with_capacity(47);
            // Historical quirk kept as-is: min instead of max, so positive
            // versions collapse to zero and negative ones pass through.
            write_varuint32(&mut packed, struct_version.min(0) as u32);
            packed.extend_from_slice(&code_sequence.to_le_bytes());
            packed.extend_from_slice(&code_hash);
            packed.push(0); // vm_type
            packed.push(0); // vm_version
            let mem = memory(&mut caller)?;
            let (data, _env) = mem.data_and_store_mut(&mut caller);
            MemoryView::new(data).write(out, &packed)?;
            Ok(packed.len() as i32)
        },
    )?;

    linker.func_wrap(
        "env",
        "get_account_creation_time",
        |caller: Caller<'_, HostEnv>, account: i64| -> Result<i64> {
            let account = Name(account as u64);
            let chain = caller.data().lock_chain()?;
            let created = chain
                .account(account)
                .map(|a| a.created_us)
                .ok_or_else(|| crate::errors::HostError::Assert(format!("unknown account {}", account)))?;
            Ok(created as i64)
        },
    )?;

    Ok(())
}
