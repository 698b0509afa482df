//! Entry/exit correlation under interleaved and concurrent invocations.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use keytap_core::config::TapConfig;
use keytap_core::invocation::{CallId, DerivationArgs};
use keytap_core::key_store::{KeyStore, PersistMode, StoreConfig};
use keytap_core::memory::Address;
use keytap_core::tap::DerivationTap;
use tempfile::{tempdir, TempDir};

use common::{wcdb_args, CollectingReporter, MockMemory};

#[derive(Clone, Copy, Debug)]
enum Step {
    Enter(usize),
    Leave(usize),
}

/// Every ordering of two calls' enter/leave pairs that keeps each call's own
/// enter before its leave.
fn interleavings() -> Vec<[Step; 4]> {
    use Step::*;
    vec![
        [Enter(0), Leave(0), Enter(1), Leave(1)],
        [Enter(0), Enter(1), Leave(0), Leave(1)],
        [Enter(0), Enter(1), Leave(1), Leave(0)],
        [Enter(1), Enter(0), Leave(0), Leave(1)],
        [Enter(1), Enter(0), Leave(1), Leave(0)],
        [Enter(1), Leave(1), Enter(0), Leave(0)],
    ]
}

fn setup() -> (TempDir, DerivationTap, Arc<CollectingReporter>) {
    let dir = tempdir().unwrap();
    let config = TapConfig {
        store: StoreConfig {
            path: dir.path().join("keys.jsonl"),
            mode: PersistMode::Append,
        },
        ..TapConfig::default()
    };
    let reporter = Arc::new(CollectingReporter::default());
    let tap = DerivationTap::new(
        &config,
        Arc::new(KeyStore::open(&config.store)),
        reporter.clone(),
    );
    (dir, tap, reporter)
}

fn run(tap: &DerivationTap, mem: &MockMemory, calls: &[(CallId, DerivationArgs)], steps: &[Step]) {
    for step in steps {
        match *step {
            Step::Enter(i) => {
                tap.on_enter(calls[i].0, &calls[i].1, mem);
            }
            Step::Leave(i) => tap.on_leave(calls[i].0, mem),
        }
    }
}

#[test]
fn exit_reads_only_its_own_output_buffer() {
    const A_OUT: u64 = 0xa300;
    const B_OUT: u64 = 0xb300;

    for steps in interleavings() {
        let (_dir, tap, reporter) = setup();
        let mem = MockMemory::new();
        mem.map(0xa100, vec![0x11; 32]);
        mem.map(0xa200, vec![0x12; 16]);
        mem.map(A_OUT, vec![0xaa; 32]);
        mem.map(0xb100, vec![0x21; 32]);
        mem.map(0xb200, vec![0x22; 16]);
        mem.map(B_OUT, vec![0xbb; 16]);

        let mut a = wcdb_args(0xa100, 0xa200, A_OUT);
        a.rounds = 70_000;
        let mut b = wcdb_args(0xb100, 0xb200, B_OUT);
        b.rounds = 1_000;
        b.derived_key_len = 16;

        let call_a = CallId::new(1, 0);
        let call_b = CallId::new(2, 0);
        run(&tap, &mem, &[(call_a, a), (call_b, b)], &steps);

        let output_reads: Vec<_> = mem
            .reads()
            .into_iter()
            .filter(|(addr, _)| *addr == Address(A_OUT) || *addr == Address(B_OUT))
            .collect();
        assert_eq!(output_reads, vec![(Address(A_OUT), 32)], "{steps:?}");
        assert_eq!(reporter.derived(), vec![(call_a, "aa".repeat(32))], "{steps:?}");
        assert_eq!(tap.in_flight(), 0);
    }
}

#[test]
fn two_matching_calls_never_swap_outputs() {
    for steps in interleavings() {
        let (_dir, tap, reporter) = setup();
        let mem = MockMemory::new();
        mem.map(0x1000, vec![0x01; 32]);
        mem.map(0x1100, vec![0x02; 32]);
        mem.map(0x2000, vec![0x03; 16]);
        mem.map(0x3000, vec![0xd0; 32]);
        mem.map(0x3100, vec![0xd1; 32]);

        let first = (CallId::new(10, 0), wcdb_args(0x1000, 0x2000, 0x3000));
        let second = (CallId::new(11, 0), wcdb_args(0x1100, 0x2000, 0x3100));
        run(&tap, &mem, &[first, second], &steps);

        let mut derived = reporter.derived();
        derived.sort_by_key(|(call, _)| call.thread);
        assert_eq!(
            derived,
            vec![(first.0, "d0".repeat(32)), (second.0, "d1".repeat(32))],
            "{steps:?}"
        );
        assert_eq!(reporter.secrets().len(), 2);
    }
}

#[test]
fn nested_calls_on_one_thread_stay_separate() {
    let (_dir, tap, reporter) = setup();
    let mem = MockMemory::new();
    mem.map(0x1000, vec![0x41; 32]);
    mem.map(0x1100, vec![0x42; 32]);
    mem.map(0x2000, vec![0x00; 16]);
    mem.map(0x3000, vec![0x51; 32]);
    mem.map(0x3100, vec![0x52; 32]);

    let outer = CallId::new(9, 0);
    let inner = CallId::new(9, 1);
    tap.on_enter(outer, &wcdb_args(0x1000, 0x2000, 0x3000), &mem);
    tap.on_enter(inner, &wcdb_args(0x1100, 0x2000, 0x3100), &mem);
    tap.on_leave(inner, &mem);
    tap.on_leave(outer, &mem);

    assert_eq!(
        reporter.derived(),
        vec![(inner, "52".repeat(32)), (outer, "51".repeat(32))]
    );
}

#[test]
fn concurrent_threads_each_see_their_own_buffers() {
    const THREADS: u64 = 8;
    let (_dir, tap, reporter) = setup();
    let tap = Arc::new(tap);
    let mem = Arc::new(MockMemory::new());
    for t in 0..THREADS {
        let base = 0x10_000 * (t + 1);
        mem.map(base, vec![t as u8; 32]);
        mem.map(base + 0x100, vec![0x5a; 16]);
        mem.map(base + 0x200, vec![0x80 | t as u8; 32]);
    }

    // Every thread enters before any thread leaves.
    let barrier = Arc::new(Barrier::new(THREADS as usize));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let tap = tap.clone();
            let mem = mem.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let base = 0x10_000 * (t + 1);
                let call = CallId::new(100 + t, 0);
                tap.on_enter(call, &wcdb_args(base, base + 0x100, base + 0x200), &*mem);
                barrier.wait();
                tap.on_leave(call, &*mem);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let derived = reporter.derived();
    assert_eq!(derived.len(), THREADS as usize);
    for (call, hex) in derived {
        let t = call.thread - 100;
        assert_eq!(hex, hex::encode([0x80 | t as u8; 32]));
    }
    assert_eq!(tap.store().len(), THREADS as usize);
    assert_eq!(tap.in_flight(), 0);
}
