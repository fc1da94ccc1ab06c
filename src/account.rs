//! Accounts, permissions, and weighted authorities.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::name::Name;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermissionLevel {
    pub actor: Name,
    pub permission: Name,
}

#[derive(Clone, Debug)]
pub struct KeyWeight {
    /// Opaque public key bytes; signature checking is the harness's job.
    pub key: Vec<u8>,
    pub weight: u16,
}

#[derive(Clone, Debug)]
pub struct PermissionLevelWeight {
    pub permission: PermissionLevel,
    pub weight: u16,
}

/// Threshold of weighted keys and account levels.
#[derive(Clone, Debug)]
pub struct Authority {
    pub threshold: u32,
    pub keys: Vec<KeyWeight>,
    pub accounts: Vec<PermissionLevelWeight>,
}

impl Authority {
    /// An authority immediately satisfied by `level` with weight 1.
    pub fn single_level(level: PermissionLevel) -> Self {
        Authority {
            threshold: 1,
            keys: vec![],
            accounts: vec![PermissionLevelWeight { permission: level, weight: 1 }],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Permission {
    pub name: Name,
    pub authority: Authority,
}

/// The subset of an ABI the runtime needs: which actions the contract
/// declares. Parsed from standard ABI JSON; anything else in the document
/// is ignored.
#[derive(Clone, Debug, Default)]
pub struct Abi {
    pub actions: BTreeSet<Name>,
}

#[derive(Deserialize)]
struct AbiDef {
    #[serde(default)]
    actions: Vec<AbiActionDef>,
}

#[derive(Deserialize)]
struct AbiActionDef {
    name: String,
}

impl Abi {
    pub fn from_json(json: &str) -> Result<Abi> {
        let def: AbiDef = serde_json::from_str(json).context("failed to parse ABI JSON")?;
        let mut actions = BTreeSet::new();
        for a in def.actions {
            let name: Name = a
                .name
                .parse()
                .with_context(|| format!("invalid action name {:?} in ABI", a.name))?;
            actions.insert(name);
        }
        Ok(Abi { actions })
    }

    pub fn declares_action(&self, name: Name) -> bool {
        self.actions.contains(&name)
    }
}

#[derive(Clone, Debug)]
pub struct Account {
    pub name: Name,
    pub code: Option<Vec<u8>>,
    /// SHA-256 of the installed WASM, zeroes when no code is set.
    pub code_hash: [u8; 32],
    /// Incremented on every `set_code`.
    pub code_sequence: u64,
    pub abi: Option<Abi>,
    /// Microseconds since epoch at creation.
    pub created_us: u64,
    pub permissions: Vec<Permission>,
}

impl Account {
    pub fn new(name: Name, created_us: u64) -> Self {
        // owner/active each accept the account's own eosio.code level so
        // inline actions authorized by the account itself pass the
        // weighted-threshold check without extra harness setup.
        let code_level = PermissionLevel {
            actor: name,
            permission: "eosio.code".parse().unwrap(),
        };
        let permissions = ["owner", "active"]
            .iter()
            .map(|p| Permission {
                name: p.parse().unwrap(),
                authority: Authority::single_level(code_level),
            })
            .collect();
        Account {
            name,
            code: None,
            code_hash: [0; 32],
            code_sequence: 0,
            abi: None,
            created_us,
            permissions,
        }
    }

    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }

    pub fn permission(&self, name: Name) -> Option<&Authority> {
        self.permissions.iter().find(|p| p.name == name).map(|p| &p.authority)
    }

    pub fn set_permission(&mut self, name: Name, authority: Authority) {
        match self.permissions.iter_mut().find(|p| p.name == name) {
            Some(p) => p.authority = authority,
            None => self.permissions.push(Permission { name, authority }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_json_subset() {
        let abi = Abi::from_json(
            r#"{
                "version": "eosio::abi/1.2",
                "structs": [{"name": "exec", "base": "", "fields": []}],
                "actions": [
                    {"name": "exec", "type": "exec", "ricardian_contract": ""},
                    {"name": "transfer", "type": "transfer", "ricardian_contract": ""}
                ]
            }"#,
        )
        .unwrap();
        assert!(abi.declares_action("exec".parse().unwrap()));
        assert!(abi.declares_action("transfer".parse().unwrap()));
        assert!(!abi.declares_action("close".parse().unwrap()));
    }

    #[test]
    fn default_permissions() {
        let name: Name = "alice".parse().unwrap();
        let acct = Account::new(name, 0);
        assert!(acct.permission("owner".parse().unwrap()).is_some());
        assert!(acct.permission("active".parse().unwrap()).is_some());
        assert!(acct.permission("custom".parse().unwrap()).is_none());
        assert!(!acct.has_code());
    }
}
