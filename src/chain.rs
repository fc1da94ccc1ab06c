//! Process-wide blockchain state.
//!
//! A single owned `Chain` holds everything that outlives one action:
//! accounts, the multi-index store, the injected clock, the console
//! buffer, the activated protocol features, and the ambient transaction.
//! The runtime shares it behind `Arc<Mutex<_>>`; there is no other global
//! state.

use std::collections::{BTreeMap, HashSet};

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::account::{Account, Authority, PermissionLevel};
use crate::codec::Transaction;
use crate::name::Name;
use crate::store::Store;

/// Recursion limit for the weighted-authority graph walk.
const MAX_AUTH_DEPTH: u32 = 4;

#[derive(Default)]
pub struct Chain {
    accounts: BTreeMap<Name, Account>,
    pub store: Store,
    time_us: u64,
    block_num: u32,
    console: String,
    features: HashSet<[u8; 32]>,
    producers: Vec<Name>,
    proposed_producers: Option<Vec<u8>>,
    proposed_schedule_version: i64,
    blockchain_parameters: Vec<u8>,
    transaction: Transaction,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all accounts, tables, and per-chain state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // ---- accounts ----

    pub fn create_account(&mut self, name: Name) -> Result<()> {
        if self.accounts.contains_key(&name) {
            return Err(anyhow!("account {} already exists", name));
        }
        self.accounts.insert(name, Account::new(name, self.time_us));
        Ok(())
    }

    pub fn account(&self, name: Name) -> Option<&Account> {
        self.accounts.get(&name)
    }

    pub fn account_mut(&mut self, name: Name) -> Option<&mut Account> {
        self.accounts.get_mut(&name)
    }

    pub fn is_account(&self, name: Name) -> bool {
        self.accounts.contains_key(&name)
    }

    pub fn set_code(&mut self, name: Name, wasm: Vec<u8>) -> Result<()> {
        let account = self
            .accounts
            .get_mut(&name)
            .ok_or_else(|| anyhow!("cannot set code on unknown account {}", name))?;
        account.code_hash = Sha256::digest(&wasm).into();
        account.code = Some(wasm);
        account.code_sequence += 1;
        Ok(())
    }

    pub fn set_abi(&mut self, name: Name, abi_json: &str) -> Result<()> {
        let abi = crate::account::Abi::from_json(abi_json)?;
        let account = self
            .accounts
            .get_mut(&name)
            .ok_or_else(|| anyhow!("cannot set abi on unknown account {}", name))?;
        account.abi = Some(abi);
        Ok(())
    }

    pub fn set_authority(&mut self, name: Name, permission: Name, authority: Authority) -> Result<()> {
        let account = self
            .accounts
            .get_mut(&name)
            .ok_or_else(|| anyhow!("cannot set authority on unknown account {}", name))?;
        account.set_permission(permission, authority);
        Ok(())
    }

    // ---- authorization ----

    pub fn permission_authority(&self, actor: Name, permission: Name) -> Option<&Authority> {
        self.accounts.get(&actor)?.permission(permission)
    }

    /// Weighted-threshold satisfaction of `authority` by a single level,
    /// following account-weight edges recursively.
    pub fn authority_satisfied(&self, authority: &Authority, by: PermissionLevel, depth: u32) -> bool {
        let mut weight: u32 = 0;
        for entry in &authority.accounts {
            if entry.permission == by {
                weight += entry.weight as u32;
            } else if depth < MAX_AUTH_DEPTH {
                if let Some(linked) =
                    self.permission_authority(entry.permission.actor, entry.permission.permission)
                {
                    if self.authority_satisfied(linked, by, depth + 1) {
                        weight += entry.weight as u32;
                    }
                }
            }
            if weight >= authority.threshold {
                return true;
            }
        }
        false
    }

    // ---- clock, block context ----

    pub fn time_us(&self) -> u64 {
        self.time_us
    }

    pub fn set_time_us(&mut self, us: u64) {
        self.time_us = us;
    }

    pub fn set_time_ms(&mut self, ms: u64) {
        self.time_us = ms * 1000;
    }

    pub fn block_num(&self) -> u32 {
        self.block_num
    }

    pub fn set_block_num(&mut self, num: u32) {
        self.block_num = num;
    }

    // ---- console ----

    pub fn console(&self) -> &str {
        &self.console
    }

    pub fn clear_console(&mut self) {
        self.console.clear();
    }

    pub(crate) fn console_append(&mut self, text: &str) {
        self.console.push_str(text);
    }

    // ---- features, producers, chain parameters ----

    pub fn activate_feature(&mut self, digest: [u8; 32]) {
        self.features.insert(digest);
    }

    pub fn is_feature_activated(&self, digest: &[u8; 32]) -> bool {
        self.features.contains(digest)
    }

    pub fn set_active_producers(&mut self, producers: Vec<Name>) {
        self.producers = producers;
    }

    pub fn active_producers(&self) -> &[Name] {
        &self.producers
    }

    /// Store the packed proposal and return its schedule version, the way
    /// a producing node would acknowledge it.
    pub(crate) fn propose_producers(&mut self, packed: Vec<u8>) -> i64 {
        self.proposed_producers = Some(packed);
        self.proposed_schedule_version += 1;
        self.proposed_schedule_version
    }

    pub(crate) fn set_blockchain_parameters(&mut self, packed: Vec<u8>) {
        self.blockchain_parameters = packed;
    }

    pub(crate) fn blockchain_parameters(&self) -> &[u8] {
        &self.blockchain_parameters
    }

    // ---- ambient transaction ----

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub(crate) fn set_transaction(&mut self, trx: Transaction) {
        self.transaction = trx;
    }

    pub fn set_tapos(&mut self, ref_block_num: u16, ref_block_prefix: u32) {
        self.transaction.ref_block_num = ref_block_num;
        self.transaction.ref_block_prefix = ref_block_prefix;
    }

    pub fn set_expiration(&mut self, expiration: u32) {
        self.transaction.expiration = expiration;
    }

    /// Store dump behind the `$vertPrintStorage` console token.
    pub fn dump_store(&self) -> String {
        format!("{:#?}", self.store)
    }
}
