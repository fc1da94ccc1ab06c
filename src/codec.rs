//! Minimal Antelope binary layout for actions and transactions.
//!
//! Only what the intrinsics need: `send_inline` unpacks an action from
//! guest memory, and `read_transaction` / `get_action` serve the packed
//! ambient transaction back to the guest. Names are u64 little-endian,
//! collection lengths are varuint32.

use anyhow::{anyhow, Result};

use crate::account::PermissionLevel;
use crate::context::Action;
use crate::name::Name;

pub fn write_varuint32(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

pub fn read_varuint32(data: &[u8], pos: &mut usize) -> Result<u32> {
    let mut value: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *data.get(*pos).ok_or_else(|| anyhow!("varuint32 past end of buffer"))?;
        *pos += 1;
        value |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 32 {
            return Err(anyhow!("varuint32 too long"));
        }
    }
}

fn read_u64(data: &[u8], pos: &mut usize) -> Result<u64> {
    let end = *pos + 8;
    let bytes = data
        .get(*pos..end)
        .ok_or_else(|| anyhow!("u64 past end of buffer"))?;
    *pos = end;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

pub fn pack_action(action: &Action) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + action.data.len());
    out.extend_from_slice(&action.account.0.to_le_bytes());
    out.extend_from_slice(&action.name.0.to_le_bytes());
    write_varuint32(&mut out, action.authorization.len() as u32);
    for level in &action.authorization {
        out.extend_from_slice(&level.actor.0.to_le_bytes());
        out.extend_from_slice(&level.permission.0.to_le_bytes());
    }
    write_varuint32(&mut out, action.data.len() as u32);
    out.extend_from_slice(&action.data);
    out
}

pub fn unpack_action(data: &[u8]) -> Result<Action> {
    let mut pos = 0;
    let account = Name(read_u64(data, &mut pos)?);
    let name = Name(read_u64(data, &mut pos)?);
    let auth_len = read_varuint32(data, &mut pos)?;
    let mut authorization = Vec::with_capacity(auth_len as usize);
    for _ in 0..auth_len {
        let actor = Name(read_u64(data, &mut pos)?);
        let permission = Name(read_u64(data, &mut pos)?);
        authorization.push(PermissionLevel { actor, permission });
    }
    let data_len = read_varuint32(data, &mut pos)? as usize;
    let payload = data
        .get(pos..pos + data_len)
        .ok_or_else(|| anyhow!("action data past end of buffer"))?
        .to_vec();
    Ok(Action { account, name, authorization, data: payload })
}

/// The ambient transaction visible through `read_transaction`,
/// `tapos_block_num`, `expiration`, and `get_action`.
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    pub expiration: u32,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub context_free_actions: Vec<Action>,
    pub actions: Vec<Action>,
}

impl Transaction {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.expiration.to_le_bytes());
        out.extend_from_slice(&self.ref_block_num.to_le_bytes());
        out.extend_from_slice(&self.ref_block_prefix.to_le_bytes());
        write_varuint32(&mut out, 0); // max_net_usage_words
        out.push(0); // max_cpu_usage_ms
        write_varuint32(&mut out, 0); // delay_sec
        write_varuint32(&mut out, self.context_free_actions.len() as u32);
        for a in &self.context_free_actions {
            out.extend_from_slice(&pack_action(a));
        }
        write_varuint32(&mut out, self.actions.len() as u32);
        for a in &self.actions {
            out.extend_from_slice(&pack_action(a));
        }
        write_varuint32(&mut out, 0); // transaction_extensions
        out
    }
}
