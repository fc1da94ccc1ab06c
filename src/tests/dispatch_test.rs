use super::util::{bench, n, wat_bytes};
use crate::account::PermissionLevel;
use crate::codec::pack_action;
use crate::context::Action;

const BOB_ABI: &str = r#"{"version":"eosio::abi/1.2","actions":[{"name":"foo","type":"foo"}]}"#;

/// Receiver contract: prints the inline sender and stores a marker row.
fn bob_wat() -> String {
    let scope = n("scope").0 as i64;
    let table = n("log").0 as i64;
    format!(
        r#"
(module
  (import "env" "get_sender" (func $get_sender (result i64)))
  (import "env" "printn" (func $printn (param i64)))
  (import "env" "db_store_i64" (func $store (param i64 i64 i64 i64 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "apply") (param $receiver i64) (param i64) (param i64)
    (call $printn (call $get_sender))
    (i64.store (i32.const 0) (call $get_sender))
    (drop (call $store (i64.const {scope}) (i64.const {table}) (local.get $receiver) (i64.const 7) (i32.const 0) (i32.const 8)))))
"#
    )
}

fn inline_to_bob() -> Vec<u8> {
    pack_action(&Action {
        account: n("bob"),
        name: n("foo"),
        authorization: vec![PermissionLevel { actor: n("alice"), permission: n("active") }],
        data: vec![],
    })
}

#[test]
fn inline_action_dispatch_and_get_sender() {
    let mut bench = bench();
    bench.install("bob", &bob_wat());
    bench.set_abi("bob", BOB_ABI);

    let packed = inline_to_bob();
    let alice_wat = format!(
        r#"
(module
  (import "env" "send_inline" (func $send_inline (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 64) "{bytes}")
  (func (export "apply") (param i64 i64 i64)
    (call $send_inline (i32.const 64) (i32.const {len}))))
"#,
        bytes = wat_bytes(&packed),
        len = packed.len(),
    );
    bench.install("alice", &alice_wat);

    bench.push("alice", "go", &[("alice", "active")]).unwrap();

    // get_sender inside bob::foo is alice, and bob's store write landed.
    assert_eq!(bench.console(), "alice");
    let chain = bench.chain.lock().unwrap();
    let tid = chain.store.find_table(n("bob"), n("scope"), n("log")).unwrap();
    let row = chain.store.table(tid).unwrap().get(7).unwrap();
    assert_eq!(row.value, n("alice").0.to_le_bytes());
}

#[test]
fn inline_action_requires_abi_declaration() {
    let mut bench = bench();
    bench.install("bob", &bob_wat());
    // no ABI installed on bob

    let packed = inline_to_bob();
    let alice_wat = format!(
        r#"
(module
  (import "env" "send_inline" (func $send_inline (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 64) "{bytes}")
  (func (export "apply") (param i64 i64 i64)
    (call $send_inline (i32.const 64) (i32.const {len}))))
"#,
        bytes = wat_bytes(&packed),
        len = packed.len(),
    );
    bench.install("alice", &alice_wat);

    let err = bench.push("alice", "go", &[("alice", "active")]).unwrap_err();
    assert!(format!("{:#}", err).contains("not declared"), "got: {:#}", err);
}

#[test]
fn notifications_inherit_first_receiver_and_skip_non_contracts() {
    let mut bench = bench();
    // Watcher prints the first receiver it was notified about.
    bench.install(
        "watcher",
        r#"
(module
  (import "env" "printn" (func $printn (param i64)))
  (memory (export "memory") 1)
  (func (export "apply") (param i64) (param $first i64) (param i64)
    (call $printn (local.get $first))))
"#,
    );
    let watcher = n("watcher").0 as i64;
    let ghost = n("ghost").0 as i64;
    let emitter_wat = format!(
        r#"
(module
  (import "env" "require_recipient" (func $require_recipient (param i64)))
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)
    (call $require_recipient (i64.const {watcher}))
    (call $require_recipient (i64.const {ghost}))))
"#
    );
    bench.install("emitter", &emitter_wat);
    bench.chain.lock().unwrap().create_account(n("ghost")).unwrap();

    bench.push("emitter", "ping", &[]).unwrap();
    assert_eq!(bench.console(), "emitter");
}

#[test]
fn exit_keeps_writes_and_discards_queues() {
    let mut bench = bench();
    bench.install("bob", &bob_wat());
    bench.set_abi("bob", BOB_ABI);

    let packed = pack_action(&Action {
        account: n("bob"),
        name: n("foo"),
        authorization: vec![PermissionLevel { actor: n("early"), permission: n("active") }],
        data: vec![],
    });
    let scope = n("scope").0 as i64;
    let table = n("rows").0 as i64;
    let early_wat = format!(
        r#"
(module
  (import "env" "db_store_i64" (func $store (param i64 i64 i64 i64 i32 i32) (result i32)))
  (import "env" "send_inline" (func $send_inline (param i32 i32)))
  (import "env" "eosio_exit" (func $eosio_exit (param i32)))
  (import "env" "prints_l" (func $prints_l (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 64) "{bytes}")
  (data (i32.const 32) "after")
  (func (export "apply") (param $receiver i64) (param i64) (param i64)
    (drop (call $store (i64.const {scope}) (i64.const {table}) (local.get $receiver) (i64.const 1) (i32.const 0) (i32.const 8)))
    (call $send_inline (i32.const 64) (i32.const {len}))
    (call $eosio_exit (i32.const 0))
    (call $prints_l (i32.const 32) (i32.const 5))))
"#,
        bytes = wat_bytes(&packed),
        len = packed.len(),
    );
    bench.install("early", &early_wat);

    bench.push("early", "run", &[]).unwrap();

    // The write before exit is visible, but neither the queued inline
    // action nor the code after eosio_exit ran.
    assert_eq!(bench.console(), "");
    let chain = bench.chain.lock().unwrap();
    let tid = chain.store.find_table(n("early"), n("scope"), n("rows")).unwrap();
    assert!(chain.store.table(tid).unwrap().get(1).is_some());
    assert!(chain.store.find_table(n("bob"), n("scope"), n("log")).is_none());
}

#[test]
fn action_return_value_reaches_the_caller() {
    let mut bench = bench();
    bench.install(
        "ret",
        r#"
(module
  (import "env" "set_action_return_value" (func $set_rv (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "\de\ad\be\ef")
  (func (export "apply") (param i64 i64 i64)
    (call $set_rv (i32.const 0) (i32.const 4))))
"#,
    );
    let value = bench.push("ret", "exec", &[]).unwrap();
    assert_eq!(value, vec![0xde, 0xad, 0xbe, 0xef]);
}
