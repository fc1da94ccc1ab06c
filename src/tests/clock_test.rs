use super::util::bench;

const CLOCK_WAT: &str = r#"
(module
  (import "env" "current_time" (func $current_time (result i64)))
  (import "env" "printui" (func $printui (param i64)))
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)
    (call $printui (call $current_time))))
"#;

#[test]
fn contract_sees_the_injected_clock() {
    let mut bench = bench();
    bench.install("time", CLOCK_WAT);

    for (ms, expected) in [(0u64, "0"), (500, "500000"), (1000, "1000000")] {
        bench.chain.lock().unwrap().set_time_ms(ms);
        bench.push("time", "exec", &[]).unwrap();
        assert_eq!(bench.console(), expected, "clock at {} ms", ms);
    }
}

const DOUBLE_READ_WAT: &str = r#"
(module
  (import "env" "current_time" (func $current_time (result i64)))
  (import "env" "eosio_assert" (func $eosio_assert (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "time moved within one action\00")
  (func (export "apply") (param i64 i64 i64)
    (call $eosio_assert
      (i64.eq (call $current_time) (call $current_time))
      (i32.const 0))))
"#;

#[test]
fn clock_is_stable_within_one_action() {
    let mut bench = bench();
    bench.install("stable", DOUBLE_READ_WAT);
    bench.chain.lock().unwrap().set_time_ms(500);
    bench.push("stable", "exec", &[]).unwrap();
}

#[test]
fn block_num_is_injected() {
    let mut bench = bench();
    bench.install(
        "blocks",
        r#"
(module
  (import "env" "get_block_num" (func $get_block_num (result i32)))
  (import "env" "printui" (func $printui (param i64)))
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)
    (call $printui (i64.extend_i32_u (call $get_block_num)))))
"#,
    );
    bench.chain.lock().unwrap().set_block_num(42);
    bench.push("blocks", "exec", &[]).unwrap();
    assert_eq!(bench.console(), "42");
}
