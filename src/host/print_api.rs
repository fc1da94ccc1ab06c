//! Console, assertion, and control intrinsics.
//!
//! All `print*` variants append to the console buffer on the blockchain.
//! The token `$vertPrintStorage` is intercepted: it dumps the store to
//! stderr instead of printing.

use anyhow::Result;
use wasmtime::{Caller, Linker};

use super::{lock_err, memory, HostEnv};
use crate::errors::HostError;
use crate::memory::MemoryView;
use crate::name::Name;

const PRINT_STORAGE_TOKEN: &str = "$vertPrintStorage";

fn console(env: &mut HostEnv, text: &str) -> Result<()> {
    let mut chain = env.chain.lock().map_err(lock_err)?;
    if text == PRINT_STORAGE_TOKEN {
        eprintln!("{}", chain.dump_store());
    } else {
        chain.console_append(text);
    }
    Ok(())
}

/// Nearest-double rendering of an IEEE binary128 value. Exact long-double
/// output is out of reach without 128-bit floats; the mantissa is
/// truncated to 52 bits and the exponent saturates.
fn f128_to_f64(bytes: [u8; 16]) -> f64 {
    let bits = u128::from_le_bytes(bytes);
    let sign = (bits >> 127) as u64;
    let exp = ((bits >> 112) & 0x7fff) as i64;
    let frac = bits & ((1u128 << 112) - 1);
    let frac52 = (frac >> 60) as u64;
    let out = if exp == 0 {
        // quad subnormals are below double range
        sign << 63
    } else if exp == 0x7fff {
        if frac == 0 {
            (sign << 63) | 0x7ff0_0000_0000_0000
        } else {
            (sign << 63) | 0x7ff8_0000_0000_0000
        }
    } else {
        let e = exp - 16383 + 1023;
        if e <= 0 {
            sign << 63
        } else if e >= 0x7ff {
            (sign << 63) | 0x7ff0_0000_0000_0000
        } else {
            (sign << 63) | ((e as u64) << 52) | frac52
        }
    };
    f64::from_bits(out)
}

pub fn link(linker: &mut Linker<HostEnv>) -> Result<()> {
    linker.func_wrap(
        "env",
        "prints",
        |mut caller: Caller<'_, HostEnv>, text: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let text = MemoryView::new(data).read_cstr(text)?;
            console(env, &text)
        },
    )?;

    linker.func_wrap(
        "env",
        "prints_l",
        |mut caller: Caller<'_, HostEnv>, text: i32, len: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let text = MemoryView::new(data).read_str(text, len as u32)?;
            console(env, &text)
        },
    )?;

    linker.func_wrap("env", "printi", |mut caller: Caller<'_, HostEnv>, value: i64| -> Result<()> {
        console(caller.data_mut(), &value.to_string())
    })?;

    linker.func_wrap("env", "printui", |mut caller: Caller<'_, HostEnv>, value: i64| -> Result<()> {
        console(caller.data_mut(), &(value as u64).to_string())
    })?;

    linker.func_wrap(
        "env",
        "printi128",
        |mut caller: Caller<'_, HostEnv>, value: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let value = MemoryView::new(data).read_i128(value)?;
            console(env, &value.to_string())
        },
    )?;

    linker.func_wrap(
        "env",
        "printui128",
        |mut caller: Caller<'_, HostEnv>, value: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let value = MemoryView::new(data).read_u128(value)?;
            console(env, &value.to_string())
        },
    )?;

    linker.func_wrap("env", "printsf", |mut caller: Caller<'_, HostEnv>, value: f32| -> Result<()> {
        console(caller.data_mut(), &value.to_string())
    })?;

    linker.func_wrap("env", "printdf", |mut caller: Caller<'_, HostEnv>, value: f64| -> Result<()> {
        console(caller.data_mut(), &value.to_string())
    })?;

    linker.func_wrap(
        "env",
        "printqf",
        |mut caller: Caller<'_, HostEnv>, value: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let bytes: [u8; 16] = MemoryView::new(data).read_array(value)?;
            console(env, &f128_to_f64(bytes).to_string())
        },
    )?;

    linker.func_wrap("env", "printn", |mut caller: Caller<'_, HostEnv>, value: i64| -> Result<()> {
        console(caller.data_mut(), &Name(value as u64).to_string())
    })?;

    linker.func_wrap(
        "env",
        "printhex",
        |mut caller: Caller<'_, HostEnv>, data_ptr: i32, len: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (data, env) = mem.data_and_store_mut(&mut caller);
            let text = MemoryView::new(data).read_hex(data_ptr, len as u32)?;
            console(env, &text)
        },
    )?;

    linker.func_wrap(
        "env",
        "eosio_assert",
        |mut caller: Caller<'_, HostEnv>, test: i32, msg: i32| -> Result<()> {
            if test != 0 {
                return Ok(());
            }
            let mem = memory(&mut caller)?;
            let (data, _env) = mem.data_and_store_mut(&mut caller);
            let msg = MemoryView::new(data).read_cstr(msg)?;
            Err(HostError::Assert(msg).into())
        },
    )?;

    linker.func_wrap(
        "env",
        "eosio_assert_message",
        |mut caller: Caller<'_, HostEnv>, test: i32, msg: i32, len: i32| -> Result<()> {
            if test != 0 {
                return Ok(());
            }
            let mem = memory(&mut caller)?;
            let (data, _env) = mem.data_and_store_mut(&mut caller);
            let msg = MemoryView::new(data).read_str(msg, len as u32)?;
            Err(HostError::Assert(msg).into())
        },
    )?;

    linker.func_wrap(
        "env",
        "eosio_assert_code",
        |_caller: Caller<'_, HostEnv>, test: i32, code: i64| -> Result<()> {
            if test != 0 {
                return Ok(());
            }
            Err(HostError::AssertCode(code as u64).into())
        },
    )?;

    linker.func_wrap("env", "eosio_exit", |_caller: Caller<'_, HostEnv>, code: i32| -> Result<()> {
        Err(HostError::Exit(code).into())
    })?;

    Ok(())
}
