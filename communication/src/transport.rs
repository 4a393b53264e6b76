//! The boundary between the RPC engine and whatever actually moves bytes
//! between ranks.
//!
//! The physical transport (RDMA verbs, TCP, shared memory) is out of scope;
//! [`Transport`] is the interface the rest of this crate programs against,
//! and [`Thread`] / [`Process`] are reference implementations for a single
//! rank and for several ranks sharing one address space, respectively —
//! enough to run and test the RPC engine without a real network.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};

/// The wire buffer type active messages travel in: an `Arc`-backed byte
/// range so a rendezvous sender can keep its staging buffer alive exactly
/// as long as acknowledgements are still outstanding.
pub type Bytes = pgas_bytes::arc::Bytes<Vec<u8>>;

/// One rank's view of the transport: send raw active-message bytes to a
/// peer, and drain the bytes addressed to this rank.
///
/// Delivery is unordered between distinct peers and FIFO per peer, matching
/// what a real RDMA/TCP backend would give you for free; the RPC engine
/// above this trait does not assume more.
pub trait Transport: Send {
    /// This rank's index in `0..peers()`.
    fn rank(&self) -> usize;

    /// The number of ranks in the job.
    fn peers(&self) -> usize;

    /// Enqueues `bytes` for delivery to `dest`. Never blocks indefinitely on
    /// the receiver making progress; a full backend would buffer or apply
    /// backpressure, not stall the sender.
    fn send(&mut self, dest: usize, bytes: Bytes);

    /// Drains and returns messages addressed to this rank that have arrived
    /// since the last call, in FIFO order per source.
    fn try_recv(&mut self) -> Vec<Bytes>;

    /// A cheap collective barrier. `None` means the backend has no native
    /// barrier and the caller should fall back to an RPC-based barrier
    /// (broadcast-and-wait through the AM engine itself).
    fn barrier(&mut self) -> Option<()> {
        None
    }
}

/// A single-rank transport: sending to rank 0 (the only rank) loops back
/// into the receive queue immediately.
pub struct Thread {
    queue: std::collections::VecDeque<Bytes>,
}

impl Thread {
    /// Builds the lone rank's transport.
    pub fn new() -> Self {
        Thread { queue: std::collections::VecDeque::new() }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for Thread {
    fn rank(&self) -> usize {
        0
    }

    fn peers(&self) -> usize {
        1
    }

    fn send(&mut self, dest: usize, bytes: Bytes) {
        assert_eq!(dest, 0, "Thread transport has exactly one rank");
        self.queue.push_back(bytes);
    }

    fn try_recv(&mut self) -> Vec<Bytes> {
        self.queue.drain(..).collect()
    }

    fn barrier(&mut self) -> Option<()> {
        Some(())
    }
}

/// A sense-reversing counting barrier shared by every [`Process`] built
/// from the same [`Process::new_vector`] call.
#[derive(Default)]
struct BarrierState {
    /// Ranks that have arrived at the current generation.
    count: usize,
    /// Flips once per completed barrier; a waiter spins on the condvar
    /// until it sees this change, so a rank that arrives again before a
    /// slow peer has left the previous barrier can't be woken early.
    generation: usize,
}

type BarrierSync = Arc<(Mutex<BarrierState>, Condvar)>;

/// Several ranks in one process, wired together with `std::sync::mpsc`
/// channels shared through a lock — the intra-process analogue of what a
/// real backend does over sockets.
pub struct Process {
    rank: usize,
    peers: usize,
    senders: Vec<Sender<Bytes>>,
    receiver: Receiver<Bytes>,
    barrier: BarrierSync,
}

impl Process {
    /// Builds one [`Process`] transport per rank, all wired to each other.
    pub fn new_vector(peers: usize) -> Vec<Process> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..peers).map(|_| channel()).unzip();
        let barrier: BarrierSync = Arc::new((Mutex::new(BarrierState::default()), Condvar::new()));
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| Process {
                rank,
                peers,
                senders: senders.clone(),
                receiver,
                barrier: barrier.clone(),
            })
            .collect()
    }
}

impl Transport for Process {
    fn rank(&self) -> usize {
        self.rank
    }

    fn peers(&self) -> usize {
        self.peers
    }

    fn send(&mut self, dest: usize, bytes: Bytes) {
        self.senders[dest].send(bytes).expect("peer rank's receiver dropped");
    }

    fn try_recv(&mut self) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Ok(bytes) = self.receiver.try_recv() {
            out.push(bytes);
        }
        out
    }

    fn barrier(&mut self) -> Option<()> {
        // A genuine native barrier: the last rank to arrive wakes every
        // waiter and flips the generation so none of them spin-wake
        // early into the barrier's own next use.
        let (lock, cvar) = &*self.barrier;
        let mut state = lock.lock().expect("barrier mutex poisoned");
        let arrived_generation = state.generation;
        state.count += 1;
        if state.count == self.peers {
            state.count = 0;
            state.generation = state.generation.wrapping_add(1);
            cvar.notify_all();
        } else {
            while state.generation == arrived_generation {
                state = cvar.wait(state).expect("barrier mutex poisoned");
            }
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_transport_loops_back_to_itself() {
        let mut t = Thread::new();
        t.send(0, Bytes::from(vec![1, 2, 3]));
        let received = t.try_recv();
        assert_eq!(received.len(), 1);
        assert_eq!(&received[0][..], &[1, 2, 3]);
    }

    #[test]
    fn process_barrier_releases_every_rank_only_once_all_have_arrived() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let ranks = Process::new_vector(4);
        let arrived_before_release = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = ranks
            .into_iter()
            .enumerate()
            .map(|(i, mut t)| {
                let arrived_before_release = arrived_before_release.clone();
                std::thread::spawn(move || {
                    if i == 0 {
                        // Give the other three a head start into the barrier
                        // before this rank (the last arrival) releases it.
                        std::thread::sleep(Duration::from_millis(20));
                    }
                    arrived_before_release.fetch_add(1, Ordering::SeqCst);
                    t.barrier();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(arrived_before_release.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn process_barrier_can_be_used_more_than_once() {
        let ranks = Process::new_vector(3);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|mut t| {
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        t.barrier();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn process_transport_delivers_point_to_point() {
        let mut ranks = Process::new_vector(3);
        let mut rank0 = ranks.remove(0);
        rank0.send(2, Bytes::from(vec![9, 9]));
        // rank0 is now consumed from the vector; remaining indices shifted.
        let mut rank2 = ranks.remove(1);
        let received = rank2.try_recv();
        assert_eq!(received.len(), 1);
        assert_eq!(&received[0][..], &[9, 9]);
    }
}
