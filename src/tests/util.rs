use std::sync::{Arc, Mutex};

use crate::account::PermissionLevel;
use crate::{Action, Chain, Name, Runtime};

pub fn n(s: &str) -> Name {
    s.parse().unwrap()
}

pub struct TestBench {
    pub chain: Arc<Mutex<Chain>>,
    pub runtime: Runtime,
}

pub fn bench() -> TestBench {
    let _ = env_logger::builder().is_test(true).try_init();
    let chain = Arc::new(Mutex::new(Chain::new()));
    let runtime = Runtime::new(chain.clone()).unwrap();
    TestBench { chain, runtime }
}

impl TestBench {
    /// Create `name` and install a contract given as WAT text (wasmtime
    /// assembles it at compile time).
    pub fn install(&mut self, name: &str, wat: &str) {
        let mut chain = self.chain.lock().unwrap();
        chain.create_account(n(name)).unwrap();
        chain.set_code(n(name), wat.as_bytes().to_vec()).unwrap();
    }

    pub fn set_abi(&mut self, name: &str, abi_json: &str) {
        self.chain.lock().unwrap().set_abi(n(name), abi_json).unwrap();
    }

    pub fn push(
        &mut self,
        account: &str,
        action: &str,
        auth: &[(&str, &str)],
    ) -> anyhow::Result<Vec<u8>> {
        self.runtime.push_action(Action {
            account: n(account),
            name: n(action),
            authorization: auth
                .iter()
                .map(|(actor, permission)| PermissionLevel {
                    actor: n(actor),
                    permission: n(permission),
                })
                .collect(),
            data: vec![],
        })
    }

    pub fn console(&self) -> String {
        self.chain.lock().unwrap().console().to_string()
    }
}

/// Render bytes as a WAT data-segment string (`\xx` hex escapes).
pub fn wat_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
}
