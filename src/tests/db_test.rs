use super::util::{bench, n};

#[test]
fn primary_index_walk_through_contract() {
    let mut bench = bench();
    let scope = n("scope").0 as i64;
    let table = n("rows").0 as i64;
    let wat = format!(
        r#"
(module
  (import "env" "db_store_i64" (func $store (param i64 i64 i64 i64 i32 i32) (result i32)))
  (import "env" "db_lowerbound_i64" (func $lowerbound (param i64 i64 i64 i64) (result i32)))
  (import "env" "db_next_i64" (func $next (param i32 i32) (result i32)))
  (import "env" "db_previous_i64" (func $previous (param i32 i32) (result i32)))
  (import "env" "db_get_i64" (func $get (param i32 i32 i32) (result i32)))
  (import "env" "printui" (func $printui (param i64)))
  (import "env" "printi" (func $printi (param i64)))
  (import "env" "prints_l" (func $prints_l (param i32 i32)))
  (import "env" "eosio_assert" (func $assert (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 128) "next should reach the end iterator\00")
  (data (i32.const 192) "|")
  (func $sep (call $prints_l (i32.const 192) (i32.const 1)))
  (func (export "apply") (param $receiver i64) (param i64) (param i64)
    (local $it i32) (local $r i32)
    (i64.store (i32.const 0) (i64.const 100))
    (drop (call $store (i64.const {scope}) (i64.const {table}) (local.get $receiver) (i64.const 1) (i32.const 0) (i32.const 8)))
    (i64.store (i32.const 0) (i64.const 300))
    (drop (call $store (i64.const {scope}) (i64.const {table}) (local.get $receiver) (i64.const 3) (i32.const 0) (i32.const 8)))
    (i64.store (i32.const 0) (i64.const 500))
    (drop (call $store (i64.const {scope}) (i64.const {table}) (local.get $receiver) (i64.const 5) (i32.const 0) (i32.const 8)))
    (local.set $it (call $lowerbound (local.get $receiver) (i64.const {scope}) (i64.const {table}) (i64.const 4)))
    (drop (call $get (local.get $it) (i32.const 16) (i32.const 8)))
    (call $printui (i64.load (i32.const 16)))
    (call $sep)
    (drop (call $previous (local.get $it) (i32.const 24)))
    (call $printui (i64.load (i32.const 24)))
    (call $sep)
    (local.set $r (call $next (local.get $it) (i32.const 32)))
    (call $assert (i32.lt_s (local.get $r) (i32.const -1)) (i32.const 128))
    (call $printi (i64.extend_i32_s (call $next (local.get $r) (i32.const 32))))))
"#
    );
    bench.install("dbdemo", &wat);
    bench.push("dbdemo", "exec", &[]).unwrap();
    // lowerbound(4) lands on key 5 (value 500), previous is key 3, next is
    // the end sentinel, and stepping past it yields -1.
    assert_eq!(bench.console(), "500|3|-1");

    let chain = bench.chain.lock().unwrap();
    let tid = chain.store.find_table(n("dbdemo"), n("scope"), n("rows")).unwrap();
    let t = chain.store.table(tid).unwrap();
    assert_eq!(t.primary.keys().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
    assert_eq!(t.get(5).unwrap().value, 500u64.to_le_bytes());
}

#[test]
fn idx128_duplicate_secondary_walk_through_contract() {
    let mut bench = bench();
    let scope = n("scope").0 as i64;
    let table = n("balances").0 as i64;
    let wat = format!(
        r#"
(module
  (import "env" "db_idx128_store" (func $store (param i64 i64 i64 i64 i32) (result i32)))
  (import "env" "db_idx128_find_secondary" (func $find (param i64 i64 i64 i32 i32) (result i32)))
  (import "env" "db_idx128_next" (func $next (param i32 i32) (result i32)))
  (import "env" "printui" (func $printui (param i64)))
  (import "env" "prints_l" (func $prints_l (param i32 i32)))
  (import "env" "eosio_assert" (func $assert (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 128) "walk should end at the end iterator\00")
  (data (i32.const 192) "|")
  (func $sep (call $prints_l (i32.const 192) (i32.const 1)))
  (func (export "apply") (param $receiver i64) (param i64) (param i64)
    (local $it i32)
    (i64.store (i32.const 0) (i64.const 256))
    (i64.store (i32.const 8) (i64.const 0))
    (drop (call $store (i64.const {scope}) (i64.const {table}) (local.get $receiver) (i64.const 1) (i32.const 0)))
    (drop (call $store (i64.const {scope}) (i64.const {table}) (local.get $receiver) (i64.const 2) (i32.const 0)))
    (i64.store (i32.const 0) (i64.const 512))
    (drop (call $store (i64.const {scope}) (i64.const {table}) (local.get $receiver) (i64.const 3) (i32.const 0)))
    (i64.store (i32.const 0) (i64.const 256))
    (local.set $it (call $find (local.get $receiver) (i64.const {scope}) (i64.const {table}) (i32.const 0) (i32.const 32)))
    (call $printui (i64.load (i32.const 32)))
    (call $sep)
    (local.set $it (call $next (local.get $it) (i32.const 32)))
    (call $printui (i64.load (i32.const 32)))
    (call $sep)
    (local.set $it (call $next (local.get $it) (i32.const 32)))
    (call $printui (i64.load (i32.const 32)))
    (call $assert (i32.lt_s (call $next (local.get $it) (i32.const 32)) (i32.const -1)) (i32.const 128))))
"#
    );
    bench.install("ledger", &wat);
    bench.push("ledger", "exec", &[]).unwrap();
    // find_secondary(0x100) yields primary 1, then 2 (same secondary key,
    // greater primary), then 3 (secondary 0x200), then the end sentinel.
    assert_eq!(bench.console(), "1|2|3");
}
