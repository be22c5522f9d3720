//! Contracts used by the engine tests.
//!
//! `CONTRACT_WAT` dispatches on the first byte of the message:
//!
//! | entry | byte | behavior |
//! |---|---|---|
//! | instantiate / execute | (other) | store the message under `state`, return `ok` |
//! | instantiate / execute | `l` | spin until out of gas |
//! | instantiate / execute | `m` | write repeatedly until out of gas |
//! | instantiate / execute | `p` | trap |
//! | instantiate / execute | `e` | return the error envelope `boom!` |
//! | instantiate / execute | `r` | remove `state` |
//! | instantiate / execute | `d` | send the message to `debug` |
//! | query | (other) | return the value of `state`, or the error `not found` |
//! | query | `w` / `x` | attempt a write / removal first |
//! | query | `s` | first record of an unbounded ascending scan |
//! | query | `a` | humanize(canonicalize(static address)) |
//! | query | `q` | forward the message to `query_chain` |
//! | query | `e` | echo the env |

pub(crate) const CONTRACT_WAT: &str = r#"
(module
  (import "env" "db_read" (func $db_read (param i32) (result i32)))
  (import "env" "db_write" (func $db_write (param i32 i32)))
  (import "env" "db_remove" (func $db_remove (param i32)))
  (import "env" "db_scan" (func $db_scan (param i32 i32 i32) (result i32)))
  (import "env" "db_next" (func $db_next (param i32) (result i32)))
  (import "env" "addr_canonicalize" (func $addr_canonicalize (param i32) (result i32)))
  (import "env" "addr_humanize" (func $addr_humanize (param i32) (result i32)))
  (import "env" "query_chain" (func $query_chain (param i32) (result i32)))
  (import "env" "debug" (func $debug (param i32)))

  (memory (export "memory") 2)
  (global $heap (mut i32) (i32.const 4096))

  ;; static regions: key, ok envelope, not-found envelope, address, error envelope
  (data (i32.const 16) "\64\00\00\00\05\00\00\00\05\00\00\00")
  (data (i32.const 32) "\c8\00\00\00\03\00\00\00\03\00\00\00")
  (data (i32.const 48) "\2c\01\00\00\0a\00\00\00\0a\00\00\00")
  (data (i32.const 64) "\90\01\00\00\2c\00\00\00\2c\00\00\00")
  (data (i32.const 80) "\f4\01\00\00\06\00\00\00\06\00\00\00")
  (data (i32.const 100) "state")
  (data (i32.const 200) "\00ok")
  (data (i32.const 300) "\01not found")
  (data (i32.const 400) "seal00112233445566778899aabbccddeeff00112233")
  (data (i32.const 500) "\01boom!")

  (func $allocate (export "allocate") (param $size i32) (result i32)
    (local $region i32)
    (local.set $region (global.get $heap))
    (i32.store (local.get $region) (i32.add (local.get $region) (i32.const 12)))
    (i32.store offset=4 (local.get $region) (local.get $size))
    (i32.store offset=8 (local.get $region) (i32.const 0))
    (global.set $heap
      (i32.add (i32.add (local.get $region) (i32.const 12)) (local.get $size)))
    (local.get $region))

  (func (export "deallocate") (param $region i32))

  (func $wrap_ok (param $src i32) (result i32)
    (local $len i32)
    (local $out i32)
    (local.set $len (i32.load offset=8 (local.get $src)))
    (local.set $out (call $allocate (i32.add (local.get $len) (i32.const 1))))
    (i32.store8 (i32.load (local.get $out)) (i32.const 0))
    (memory.copy
      (i32.add (i32.load (local.get $out)) (i32.const 1))
      (i32.load (local.get $src))
      (local.get $len))
    (i32.store offset=8 (local.get $out) (i32.add (local.get $len) (i32.const 1)))
    (local.get $out))

  (func $op (param $msg i32) (result i32)
    (if (result i32) (i32.eqz (i32.load offset=8 (local.get $msg)))
      (then (i32.const 0))
      (else (i32.load8_u (i32.load (local.get $msg))))))

  (func $handle (param $msg i32) (result i32)
    (local $op i32)
    (local.set $op (call $op (local.get $msg)))
    (if (i32.eq (local.get $op) (i32.const 108))
      (then (loop $spin (br $spin))))
    (if (i32.eq (local.get $op) (i32.const 109))
      (then
        (loop $again
          (call $db_write (i32.const 16) (local.get $msg))
          (br $again))))
    (if (i32.eq (local.get $op) (i32.const 112))
      (then (unreachable)))
    (if (i32.eq (local.get $op) (i32.const 101))
      (then (return (i32.const 80))))
    (if (i32.eq (local.get $op) (i32.const 114))
      (then
        (call $db_remove (i32.const 16))
        (return (i32.const 32))))
    (if (i32.eq (local.get $op) (i32.const 100))
      (then
        (call $debug (local.get $msg))
        (return (i32.const 32))))
    (call $db_write (i32.const 16) (local.get $msg))
    (i32.const 32))

  (func (export "instantiate") (param $env i32) (param $msg i32) (result i32)
    (call $handle (local.get $msg)))

  (func (export "execute") (param $env i32) (param $msg i32) (result i32)
    (call $handle (local.get $msg)))

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    (local $op i32)
    (local $value i32)
    (local.set $op (call $op (local.get $msg)))
    (if (i32.eq (local.get $op) (i32.const 119))
      (then (call $db_write (i32.const 16) (local.get $msg))))
    (if (i32.eq (local.get $op) (i32.const 120))
      (then (call $db_remove (i32.const 16))))
    (if (i32.eq (local.get $op) (i32.const 115))
      (then
        (local.set $value
          (call $db_next (call $db_scan (i32.const 0) (i32.const 0) (i32.const 1))))
        (if (i32.eqz (local.get $value))
          (then (return (i32.const 48))))
        (return (call $wrap_ok (local.get $value)))))
    (if (i32.eq (local.get $op) (i32.const 97))
      (then
        (return
          (call $wrap_ok
            (call $addr_humanize (call $addr_canonicalize (i32.const 64)))))))
    (if (i32.eq (local.get $op) (i32.const 113))
      (then (return (call $query_chain (local.get $msg)))))
    (if (i32.eq (local.get $op) (i32.const 101))
      (then (return (call $wrap_ok (local.get $env)))))
    (local.set $value (call $db_read (i32.const 16)))
    (if (i32.eqz (local.get $value))
      (then (return (i32.const 48))))
    (call $wrap_ok (local.get $value)))
)
"#;

/// A query-only contract exporting a special entry point and a capability
pub(crate) const IBC_CONTRACT_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "allocate") (param i32) (result i32) (i32.const 0))
  (func (export "deallocate") (param i32))
  (func (export "query") (param i32 i32) (result i32) (i32.const 0))
  (func (export "requires_staking"))
  (func (export "ibc_packet_receive") (param i32 i32) (result i32) (i32.const 0)))
"#;

pub(crate) fn contract_wasm() -> Vec<u8> {
    wat::parse_str(CONTRACT_WAT).unwrap()
}
