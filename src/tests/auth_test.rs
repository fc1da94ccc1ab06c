use super::util::{bench, n};
use crate::account::{Authority, PermissionLevel};

#[test]
fn require_auth_accepts_active_and_rejects_other_permissions() {
    let mut bench = bench();
    let alice = n("alice").0 as i64;
    let guard_wat = format!(
        r#"
(module
  (import "env" "require_auth" (func $require_auth (param i64)))
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)
    (call $require_auth (i64.const {alice}))))
"#
    );
    bench.install("guard", &guard_wat);
    {
        let mut chain = bench.chain.lock().unwrap();
        chain.create_account(n("alice")).unwrap();
        // a real permission that is still not active/owner
        chain
            .set_authority(
                n("alice"),
                n("custom"),
                Authority::single_level(PermissionLevel {
                    actor: n("alice"),
                    permission: n("eosio.code"),
                }),
            )
            .unwrap();
    }

    bench.push("guard", "check", &[("alice", "active")]).unwrap();

    let err = bench.push("guard", "check", &[("alice", "custom")]).unwrap_err();
    assert!(
        format!("{:#}", err).contains("missing authority of alice"),
        "got: {:#}",
        err
    );
}

#[test]
fn unknown_actor_and_permission_are_rejected_before_apply() {
    let mut bench = bench();
    bench.install(
        "noop",
        r#"
(module
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)))
"#,
    );

    let err = bench.push("noop", "go", &[("nobody", "active")]).unwrap_err();
    assert!(format!("{:#}", err).contains("unknown account nobody"), "got: {:#}", err);

    bench.chain.lock().unwrap().create_account(n("somebody")).unwrap();
    let err = bench.push("noop", "go", &[("somebody", "odd")]).unwrap_err();
    assert!(format!("{:#}", err).contains("unknown permission somebody@odd"), "got: {:#}", err);
}

#[test]
fn guest_assertions_carry_their_message() {
    let mut bench = bench();
    bench.install(
        "boom",
        r#"
(module
  (import "env" "eosio_assert" (func $assert (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "balance overdrawn\00")
  (func (export "apply") (param i64 i64 i64)
    (call $assert (i32.const 0) (i32.const 0))))
"#,
    );
    let err = bench.push("boom", "go", &[]).unwrap_err();
    assert!(
        format!("{:#}", err).contains("assertion failure with message: balance overdrawn"),
        "got: {:#}",
        err
    );

    bench.install(
        "boomcode",
        r#"
(module
  (import "env" "eosio_assert_code" (func $assert_code (param i32 i64)))
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)
    (call $assert_code (i32.const 0) (i64.const 42))))
"#,
    );
    let err = bench.push("boomcode", "go", &[]).unwrap_err();
    assert!(
        format!("{:#}", err).contains("assertion failure with error code: 42"),
        "got: {:#}",
        err
    );
}

#[test]
fn has_auth_is_the_non_failing_form() {
    let mut bench = bench();
    let alice = n("alice").0 as i64;
    let probe_wat = format!(
        r#"
(module
  (import "env" "has_auth" (func $has_auth (param i64) (result i32)))
  (import "env" "printui" (func $printui (param i64)))
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)
    (call $printui (i64.extend_i32_u (call $has_auth (i64.const {alice}))))))
"#
    );
    bench.install("probe", &probe_wat);
    bench.chain.lock().unwrap().create_account(n("alice")).unwrap();

    bench.push("probe", "go", &[("alice", "active")]).unwrap();
    assert_eq!(bench.console(), "1");
    bench.push("probe", "go", &[]).unwrap();
    assert_eq!(bench.console(), "0");
}
