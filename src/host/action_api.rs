//! Action introspection, return values, and the two child-action
//! intrinsics (`require_recipient`, `send_inline`).

use anyhow::Result;
use wasmtime::{Caller, Linker};

use super::{memory, HostEnv};
use crate::codec::unpack_action;
use crate::errors::host_assert;
use crate::memory::MemoryView;
use crate::name::Name;

pub fn link(linker: &mut Linker<HostEnv>) -> Result<()> {
    linker.func_wrap(
        "env",
        "read_action_data",
        |mut caller: Caller<'_, HostEnv>, buf: i32, len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let payload = &env.context.data;
            if len == 0 {
                return Ok(payload.len() as i32);
            }
            let copy = payload.len().min(len as u32 as usize);
            let mut view = MemoryView::new(data);
            view.write(buf, &payload[..copy])?;
            Ok(copy as i32)
        },
    )?;

    linker.func_wrap("env", "action_data_size", |caller: Caller<'_, HostEnv>| -> i32 {
        caller.data().context.data.len() as i32
    })?;

    linker.func_wrap("env", "current_receiver", |caller: Caller<'_, HostEnv>| -> i64 {
        caller.data().context.receiver.as_u64() as i64
    })?;

    linker.func_wrap("env", "get_sender", |caller: Caller<'_, HostEnv>| -> i64 {
        caller.data().context.sender.as_u64() as i64
    })?;

    linker.func_wrap(
        "env",
        "set_action_return_value",
        |mut caller: Caller<'_, HostEnv>, buf: i32, len: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let view = MemoryView::new(data);
            env.context.return_value = view.slice(buf, len as u32)?.to_vec();
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "require_recipient",
        |mut caller: Caller<'_, HostEnv>, recipient: i64| -> Result<()> {
            let env = caller.data_mut();
            let recipient = Name(recipient as u64);
            // Self-notification and recipients without a contract are
            // silently skipped.
            let is_contract = {
                let chain = env.chain.lock().map_err(super::lock_err)?;
                chain.account(recipient).map(|a| a.has_code()).unwrap_or(false)
            };
            if is_contract {
                env.context.require_recipient(recipient);
            }
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "send_inline",
        |mut caller: Caller<'_, HostEnv>, buf: i32, len: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let view = MemoryView::new(data);
            let action = unpack_action(view.slice(buf, len as u32)?)?;
            {
                let chain = env.chain.lock().map_err(super::lock_err)?;
                let target = chain.account(action.account);
                host_assert(
                    target.map(|a| a.has_code()).unwrap_or(false),
                    format!("inline action to {} which has no contract", action.account),
                )?;
                let declared = target
                    .and_then(|a| a.abi.as_ref())
                    .map(|abi| abi.declares_action(action.name))
                    .unwrap_or(false);
                host_assert(
                    declared,
                    format!("action {} is not declared in the abi of {}", action.name, action.account),
                )?;
            }
            env.context.inline_actions.push(action);
            Ok(())
        },
    )?;

    Ok(())
}
