//! Collectives (§4.12): barrier, reduce, and broadcast over a
//! [`pgas_comm::Transport`].
//!
//! Broadcast uses the same tree shape the RPC engine computes for message
//! fan-out ([`pgas_comm::rpc::eager_broadcast_children`]) — a rank that
//! isn't the root spins on [`Transport::try_recv`] until its own hop of the
//! broadcast arrives, then relays to its children exactly as an AM
//! broadcast would. Non-trivial reduce collapses the source's
//! hashed-root binary tree to a star (every rank sends directly to rank
//! 0, which combines as contributions arrive) — correct for any
//! commutative/associative op, just not tree-shaped; recorded as a
//! simplification in the design ledger rather than re-deriving the
//! source's per-rank incoming-count bit arithmetic without a compiler to
//! check it against.

use pgas_comm::rpc::eager_broadcast_children;
use pgas_comm::transport::Bytes;
use pgas_comm::Transport;

use crate::logging::{self, CollectiveEvent, CollectiveKind};

fn encode_hop(hi: usize, payload: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(&(hi as u64).to_le_bytes());
    buf.extend_from_slice(payload);
    Bytes::from(buf)
}

fn decode_hop(bytes: &[u8]) -> (usize, Vec<u8>) {
    let hi = u64::from_le_bytes(bytes[0..8].try_into().expect("broadcast hop header truncated")) as usize;
    (hi, bytes[8..].to_vec())
}

/// Broadcasts `data` (supplied only by `root`) to every rank, via the
/// eager broadcast tree. Returns the broadcast value on every rank,
/// including the root.
pub fn broadcast_bytes<T: Transport>(transport: &mut T, root: usize, data: Option<Vec<u8>>) -> Vec<u8> {
    logging::log(CollectiveEvent { kind: CollectiveKind::Broadcast, finished: false });
    let rank = transport.rank();
    let peers = transport.peers();
    assert_eq!(root, 0, "broadcast_bytes roots the tree at rank 0; callers wanting another root renumber ranks first");

    let (hi, payload) = if rank == root {
        (peers, data.expect("root must supply the broadcast payload"))
    } else {
        loop {
            if let Some(bytes) = transport.try_recv().into_iter().next() {
                break decode_hop(&bytes);
            }
        }
    };

    for (target, _child_lo, child_hi) in eager_broadcast_children(rank, hi) {
        transport.send(target, encode_hop(child_hi, &payload));
    }
    logging::log(CollectiveEvent { kind: CollectiveKind::Broadcast, finished: true });
    payload
}

/// A direct transport barrier if the transport has a native one; otherwise
/// falls back to a degenerate zero-payload all-reduce (§12 supplement,
/// grounded on `original_source/test/barrier.cpp`'s observation that the
/// non-trivial-collective registry generalizes to implement barrier when
/// the transport has none).
pub fn barrier<T: Transport>(transport: &mut T) {
    logging::log(CollectiveEvent { kind: CollectiveKind::Barrier, finished: false });
    if transport.barrier().is_none() {
        let _ = all_reduce_bytes(transport, Vec::new(), |_, _| Vec::new());
    }
    logging::log(CollectiveEvent { kind: CollectiveKind::Barrier, finished: true });
}

/// Reduces `local` across every rank with `combine` (assumed commutative
/// and associative) and returns the same result value on every rank.
pub fn all_reduce_bytes<T: Transport>(transport: &mut T, local: Vec<u8>, combine: impl Fn(Vec<u8>, Vec<u8>) -> Vec<u8>) -> Vec<u8> {
    logging::log(CollectiveEvent { kind: CollectiveKind::Reduce, finished: false });
    let rank = transport.rank();
    let peers = transport.peers();
    let result = if peers == 1 {
        local
    } else if rank == 0 {
        let mut accumulated = local;
        let mut received = 0;
        while received < peers - 1 {
            for bytes in transport.try_recv() {
                accumulated = combine(accumulated, bytes.to_vec());
                received += 1;
            }
        }
        broadcast_bytes(transport, 0, Some(accumulated))
    } else {
        transport.send(0, Bytes::from(local));
        broadcast_bytes(transport, 0, None)
    };
    logging::log(CollectiveEvent { kind: CollectiveKind::Reduce, finished: true });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgas_comm::transport::Process;

    /// Wraps a transport and always reports no native barrier, so a test
    /// can exercise the all-reduce fallback even against a transport
    /// ([`Process`]) that does have a real one.
    struct NoBarrier<T>(T);

    impl<T: Transport> Transport for NoBarrier<T> {
        fn rank(&self) -> usize {
            self.0.rank()
        }
        fn peers(&self) -> usize {
            self.0.peers()
        }
        fn send(&mut self, dest: usize, bytes: Bytes) {
            self.0.send(dest, bytes);
        }
        fn try_recv(&mut self) -> Vec<Bytes> {
            self.0.try_recv()
        }
    }

    #[test]
    fn broadcast_delivers_the_roots_value_to_every_rank() {
        let mut transports = Process::new_vector(5);
        let handles: Vec<_> = transports
            .drain(..)
            .enumerate()
            .map(|(i, mut t)| {
                std::thread::spawn(move || {
                    let data = if i == 0 { Some(vec![9, 8, 7]) } else { None };
                    broadcast_bytes(&mut t, 0, data)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![9, 8, 7]);
        }
    }

    #[test]
    fn all_reduce_sums_every_ranks_contribution() {
        let mut transports = Process::new_vector(4);
        let handles: Vec<_> = transports
            .drain(..)
            .enumerate()
            .map(|(i, mut t)| {
                std::thread::spawn(move || {
                    let local = vec![i as u8];
                    let result = all_reduce_bytes(&mut t, local, |a, b| {
                        let sum: u32 = a.iter().chain(b.iter()).map(|&x| x as u32).sum();
                        vec![sum as u8]
                    });
                    result
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let expected = (0..4u32).sum::<u32>() as u8;
        for r in results {
            assert_eq!(r, vec![expected]);
        }
    }

    #[test]
    fn barrier_falls_back_to_all_reduce_when_transport_has_none() {
        let mut transports = Process::new_vector(3);
        let handles: Vec<_> = transports.drain(..).map(|t| std::thread::spawn(move || barrier(&mut NoBarrier(t)))).collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn barrier_uses_processs_native_implementation_when_present() {
        // Process now has a real sense-reversing barrier (transport.rs);
        // this exercises that path directly rather than the fallback.
        let mut transports = Process::new_vector(4);
        let handles: Vec<_> = transports.drain(..).map(|mut t| std::thread::spawn(move || barrier(&mut t))).collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
