//! Error types raised by host intrinsics.
//!
//! Every error raised inside a host function traps the running WASM guest
//! and unwinds to the dispatcher at the `apply` boundary. `Exit` is the one
//! non-error member: `eosio_exit` uses the same unwind path but is treated
//! as a clean return by the dispatcher.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("assertion failure with message: {0}")]
    Assert(String),

    #[error("assertion failure with error code: {0}")]
    AssertCode(u64),

    /// Clean termination requested by the guest. Not a failure.
    #[error("eosio_exit({0})")]
    Exit(i32),

    #[error("memory access violation: offset {offset} len {len} exceeds linear memory of {size} bytes")]
    MemoryAccess { offset: u64, len: u64, size: u64 },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

/// Raise an assertion failure unless `test` holds, mirroring the contract
/// side `eosio_assert`. Host preconditions (zero payer, duplicate key,
/// foreign-table writes, invalid iterators) fail through this same path so
/// the guest sees one uniform diagnostic shape.
pub fn host_assert(test: bool, msg: impl Into<String>) -> anyhow::Result<()> {
    if test {
        Ok(())
    } else {
        Err(HostError::Assert(msg.into()).into())
    }
}
