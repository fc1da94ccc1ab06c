//! In-process Antelope (EOSIO) smart contract runtime.
//!
//! This crate executes contract WASM built against the Antelope contract
//! ABI inside the host process, with no node, no blocks, and no consensus:
//! an in-memory multi-index store, the full `env` intrinsic import
//! surface, and a dispatcher that runs an action plus the inline actions
//! and notifications it emits, depth first.
//!
//! # Architecture
//!
//! - [`chain::Chain`] owns everything durable: accounts, tables, the
//!   injected clock, the console buffer, activated protocol features, and
//!   the ambient transaction. Harness code mutates it directly (create
//!   accounts, set code and ABI, move the clock).
//! - [`runtime::Runtime`] compiles contract modules with wasmtime and
//!   drives dispatch. Each action gets a fresh wasmtime store whose data
//!   ([`host::HostEnv`]) carries the action context and iterator caches.
//! - [`host`] registers every contract intrinsic on the linker; the
//!   database families sit on [`store::Store`], a table collection with
//!   one primary and four secondary ordered indices.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex};
//! use vert::{Action, Chain, Name, Runtime};
//!
//! let chain = Arc::new(Mutex::new(Chain::new()));
//! let mut runtime = Runtime::new(chain.clone())?;
//! {
//!     let mut chain = chain.lock().unwrap();
//!     chain.create_account("hello".parse()?)?;
//!     chain.set_code("hello".parse()?, wasm_bytes)?;
//!     chain.set_time_ms(500);
//! }
//! runtime.push_action(Action {
//!     account: "hello".parse()?,
//!     name: "hi".parse()?,
//!     authorization: vec![],
//!     data: vec![],
//! })?;
//! println!("{}", chain.lock().unwrap().console());
//! ```

pub mod account;
pub mod chain;
pub mod codec;
pub mod context;
pub mod errors;
pub mod host;
pub mod iter_cache;
pub mod memory;
pub mod name;
pub mod runtime;
pub mod store;

pub use account::{Abi, Account, Authority, KeyWeight, PermissionLevel, PermissionLevelWeight};
pub use chain::Chain;
pub use context::{Action, ActionContext};
pub use errors::HostError;
pub use name::Name;
pub use runtime::Runtime;

#[cfg(test)]
mod tests;
