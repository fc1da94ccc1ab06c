//! The action dispatcher.
//!
//! `Runtime` owns the wasmtime engine and a compiled-module cache keyed by
//! (account, code sequence). One `push_action` call wraps the action into
//! the ambient transaction and drives it through `dispatch`: authority
//! checks, instantiation of the receiver's module against a fresh linker,
//! the `apply` call, then a depth-first drain of the notification and
//! inline-action queues. Iterator caches live and die with the per-dispatch
//! wasmtime store; store mutations stay on the chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use log::debug;
use wasmtime::{Engine, Linker, Module, Store};

use crate::account::PermissionLevel;
use crate::chain::Chain;
use crate::context::{Action, ActionContext};
use crate::errors::{host_assert, HostError};
use crate::host::{self, HostEnv};
use crate::name::Name;

/// Depth limit for the inline-action tree.
const MAX_ACTION_DEPTH: usize = 32;

pub struct Runtime {
    engine: Engine,
    chain: Arc<Mutex<Chain>>,
    modules: HashMap<(Name, u64), Module>,
}

fn lock_err<T>(err: std::sync::PoisonError<T>) -> anyhow::Error {
    anyhow!("Mutex lock error: {}", err)
}

impl Runtime {
    pub fn new(chain: Arc<Mutex<Chain>>) -> Result<Self> {
        // Deterministic execution settings: canonical NaNs, deterministic
        // relaxed SIMD, statically sized memories without copy-on-write.
        let mut config = wasmtime::Config::default();
        config.cranelift_nan_canonicalization(true);
        config.relaxed_simd_deterministic(true);
        config.static_memory_maximum_size(0x1_0000_0000);
        config.static_memory_guard_size(0x1_0000);
        config.memory_init_cow(false);
        let engine = Engine::new(&config)?;
        Ok(Runtime { engine, chain, modules: HashMap::new() })
    }

    pub fn chain(&self) -> Arc<Mutex<Chain>> {
        self.chain.clone()
    }

    /// Execute one action as an implicit single-action transaction. The
    /// console is cleared first; the action's return value is handed back.
    pub fn push_action(&mut self, action: Action) -> Result<Vec<u8>> {
        {
            let mut chain = self.chain.lock().map_err(lock_err)?;
            chain.clear_console();
            let mut trx = chain.transaction().clone();
            trx.actions = vec![action.clone()];
            chain.set_transaction(trx);
        }
        self.dispatch(ActionContext::from_action(&action), 0)
    }

    fn module_for(&mut self, account: Name) -> Result<Module> {
        let (code_sequence, wasm) = {
            let chain = self.chain.lock().map_err(lock_err)?;
            let acct = chain
                .account(account)
                .ok_or_else(|| anyhow!("unknown account {}", account))?;
            let wasm = acct
                .code
                .clone()
                .ok_or_else(|| anyhow!("account {} has no contract", account))?;
            (acct.code_sequence, wasm)
        };
        if let Some(module) = self.modules.get(&(account, code_sequence)) {
            return Ok(module.clone());
        }
        let module = Module::new(&self.engine, &wasm)
            .with_context(|| format!("failed to compile contract of {}", account))?;
        self.modules.insert((account, code_sequence), module.clone());
        Ok(module)
    }

    /// Resolve every claimed authorization; inline actions additionally
    /// prove the sender's eosio.code level satisfies the named authority.
    fn check_authorization(&self, ctx: &ActionContext) -> Result<()> {
        let chain = self.chain.lock().map_err(lock_err)?;
        let code_permission: Name = "eosio.code".parse().unwrap();
        for level in &ctx.authorization {
            let account = chain.account(level.actor);
            host_assert(
                account.is_some(),
                format!("action declares authority of unknown account {}", level.actor),
            )?;
            let authority = account.unwrap().permission(level.permission);
            let authority = match authority {
                Some(authority) => authority,
                None => {
                    return host_assert(
                        false,
                        format!("unknown permission {}@{}", level.actor, level.permission),
                    );
                }
            };
            if ctx.is_inline() {
                let by = PermissionLevel { actor: ctx.sender, permission: code_permission };
                host_assert(
                    chain.authority_satisfied(authority, by, 0),
                    format!(
                        "authority {}@{} is not satisfied by {}@eosio.code",
                        level.actor, level.permission, ctx.sender
                    ),
                )?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, ctx: ActionContext, depth: usize) -> Result<Vec<u8>> {
        if depth > MAX_ACTION_DEPTH {
            return Err(anyhow!("max inline action depth reached"));
        }
        let receiver = ctx.receiver;
        let first_receiver = ctx.first_receiver;
        let action_name = ctx.action;
        debug!(
            "dispatch {}::{} receiver={} depth={}",
            first_receiver, action_name, receiver, depth
        );

        // A notification re-runs an already authorized action under a new
        // receiver; only fresh dispatches are checked.
        if !ctx.is_notification() {
            self.check_authorization(&ctx)?;
        }

        let module = self.module_for(receiver)?;
        let mut linker = Linker::<HostEnv>::new(&self.engine);
        host::setup_linker(&mut linker).context("failed to set up host imports")?;
        linker.define_unknown_imports_as_traps(&module)?;

        let mut store = Store::new(&self.engine, HostEnv::new(self.chain.clone(), ctx));
        store.limiter(|env| &mut env.limits);
        let instance = linker
            .instantiate(&mut store, &module)
            .with_context(|| format!("failed to instantiate contract of {}", receiver))?;
        let apply = instance
            .get_typed_func::<(i64, i64, i64), ()>(&mut store, "apply")
            .with_context(|| format!("contract of {} does not export apply", receiver))?;

        let result = apply.call(
            &mut store,
            (
                receiver.as_u64() as i64,
                first_receiver.as_u64() as i64,
                action_name.as_u64() as i64,
            ),
        );
        let env = store.into_data();
        let ctx = env.context;

        let exited = match result {
            Ok(()) => None,
            Err(err) => match err.downcast_ref::<HostError>() {
                Some(HostError::Exit(code)) => Some(*code),
                _ => {
                    return Err(err.context(format!(
                        "action {}::{} on {} failed",
                        first_receiver, action_name, receiver
                    )));
                }
            },
        };

        if let Some(code) = exited {
            // Clean exit: keep store mutations, drop the queues.
            debug!("eosio_exit({}) from {}", code, receiver);
            return Ok(ctx.return_value);
        }

        for recipient in &ctx.notified[1..] {
            self.dispatch(ctx.notification_for(*recipient), depth)?;
        }
        for action in &ctx.inline_actions {
            self.dispatch(ActionContext::inline_child(action, ctx.receiver), depth + 1)?;
        }
        Ok(ctx.return_value)
    }
}
