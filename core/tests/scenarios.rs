//! End-to-end scenarios exercising several modules together, each built on
//! [`pgas::comm::Process`] so it runs single-process with no real network.
//! The atomic-ring and strided-transpose scenarios already live as unit
//! tests next to the modules they exercise (`core::atomic`, `core::vis`);
//! the four here need more than one module wired together to make sense as
//! a single test.

use std::sync::Arc;
use std::thread;

use pgas::collective;
use pgas::comm::Process;
use pgas::completion::CompletionBundle;
use pgas::copy::{CopyEngine, DeviceMemory};
use pgas::gptr::{GlobalPtr, Kind};
use pgas::heap::SharedHeap;
use pgas::persona::{current_persona, Level};
use pgas::rma::{self, Segments};
use pgas::{Future, Persona};

/// Every rank writes its own rank id into slot `r` of every peer's
/// buffer, so after a barrier each rank's buffer holds `[0, 1, ..,
/// rank_n)` regardless of which rank is reading it.
#[test]
fn neighbor_exchange_each_rank_sees_every_peers_value() {
    let rank_n = 5;
    let segments = Arc::new(Segments::new(rank_n, rank_n * 4));
    let mut transports = Process::new_vector(rank_n);
    let handles: Vec<_> = transports
        .drain(..)
        .enumerate()
        .map(|(r, mut t)| {
            let segments = segments.clone();
            thread::spawn(move || {
                for peer in 0..rank_n {
                    let dst = GlobalPtr::new(Kind::Host, peer, r * 4, -1, rank_n);
                    let mut events = CompletionBundle::new();
                    rma::rput(&segments, &(r as i32).to_le_bytes(), dst, &mut events);
                }
                collective::barrier(&mut t);
                let mut slots = vec![0i32; rank_n];
                for (i, slot) in slots.iter_mut().enumerate() {
                    let src = GlobalPtr::new(Kind::Host, r, i * 4, -1, rank_n);
                    let mut events = CompletionBundle::new();
                    let bytes = rma::rget(&segments, src, 4, &mut events);
                    *slot = i32::from_le_bytes(bytes.try_into().expect("4-byte slot"));
                }
                slots
            })
        })
        .collect();

    for h in handles {
        let slots = h.join().expect("rank thread panicked");
        for (i, &value) in slots.iter().enumerate() {
            assert_eq!(value, i as i32, "slot {i} should hold the rank id that wrote it, on every rank's copy");
        }
    }
}

fn fib_closed_form(n: u64) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a + b;
        a = b;
        b = next;
    }
    a
}

fn fib_future(persona: &Arc<Persona>, n: u64) -> Future<u64> {
    if n < 2 {
        return persona.lpc(move || n);
    }
    let a = fib_future(persona, n - 1);
    let b = fib_future(persona, n - 2);
    Future::when_all2(&a, &b).then(|(x, y)| x + y)
}

/// `fib(n)` built as a tree of `lpc`-scheduled leaves combined by
/// `when_all2().then(+)`, matching §4.3's future-composition shape rather
/// than a plain recursive function.
#[test]
fn fib_tree_of_futures_matches_closed_form_up_to_twenty() {
    let persona = current_persona();
    for n in 0..=20u64 {
        let future = fib_future(&persona, n);
        persona.progress(Level::User);
        assert!(future.ready(), "every leaf runs inline on the owning thread, so the tree is always ready without further progress");
        assert_eq!(future.result(), fib_closed_form(n));
    }
}

fn lcg_values(seed: u32, count: usize) -> Vec<u32> {
    let mut state = seed | 1;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            state
        })
        .collect()
}

/// Each rank contributes a 32,000-value pseudo-random multiset;
/// `all_reduce_bytes` concatenating the per-rank vectors must lose no
/// value and no duplicate across the union.
#[test]
fn reduce_all_preserves_every_ranks_contribution_as_a_multiset() {
    let rank_n = 4;
    let per_rank = 32_000usize;
    let mut transports = Process::new_vector(rank_n);
    let handles: Vec<_> = transports
        .drain(..)
        .enumerate()
        .map(|(r, mut t)| {
            thread::spawn(move || {
                let local = lcg_values(0x9E37_79B1u32.wrapping_add(r as u32), per_rank);
                let checksum: u64 = local.iter().map(|&v| v as u64).sum();
                let mut bytes = Vec::with_capacity(local.len() * 4);
                for v in &local {
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                let combined = collective::all_reduce_bytes(&mut t, bytes, |mut a, b| {
                    a.extend(b);
                    a
                });
                (local.len(), checksum, combined)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("rank thread panicked")).collect();
    let expected_len: usize = results.iter().map(|(len, _, _)| *len).sum();
    let expected_checksum: u64 = results.iter().map(|(_, checksum, _)| *checksum).sum();

    for (_, _, combined) in &results {
        assert_eq!(combined.len(), expected_len * 4, "no contributed value should be dropped from the union");
        let checksum: u64 = combined.chunks_exact(4).map(|c| u32::from_le_bytes(c.try_into().expect("4-byte value")) as u64).sum();
        assert_eq!(checksum, expected_checksum, "the union must preserve every contributed value, duplicates included");
    }
}

/// Rotates one value through all four memory-kind pairings
/// (host0 -> device0 -> host1 -> device1 -> host0) and checks it survives
/// the full trip unchanged.
#[test]
fn copy_rotates_a_value_through_all_four_memory_kinds() {
    let rank_n = 2;
    let host = Segments::new(rank_n, 64);
    let device = DeviceMemory::new(rank_n, 64);
    let heaps: Vec<_> = (0..rank_n).map(|r| Arc::new(SharedHeap::new(r, 4096))).collect();
    let engine = CopyEngine { host: &host, device: &device, heaps: &heaps };

    let value = [11u8, 22, 33, 44];
    let origin = GlobalPtr::new(Kind::Host, 0, 0, -1, rank_n);
    let mut put_events = CompletionBundle::new();
    rma::rput(&host, &value, origin, &mut put_events);

    let hops = [
        (origin, GlobalPtr::new(Kind::Device, 0, 0, 0, rank_n)),
        (GlobalPtr::new(Kind::Device, 0, 0, 0, rank_n), GlobalPtr::new(Kind::Host, 1, 0, -1, rank_n)),
        (GlobalPtr::new(Kind::Host, 1, 0, -1, rank_n), GlobalPtr::new(Kind::Device, 1, 0, 0, rank_n)),
        (GlobalPtr::new(Kind::Device, 1, 0, 0, rank_n), origin),
    ];
    for (src, dst) in hops {
        let mut events = CompletionBundle::new();
        engine.copy(src, dst, value.len(), &mut events);
    }

    let mut get_events = CompletionBundle::new();
    let landed = rma::rget(&host, origin, value.len(), &mut get_events);
    assert_eq!(landed, value, "the value should be unchanged after a full rotation through host and device memory on both ranks");
}
