//! Heap and globalization (§4.14): the shared-segment allocator and
//! local-pointer ↔ global-pointer translation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::gptr::{GlobalPtr, Kind};
use crate::logging::{self, LowFootprintEvent};
use crate::team::Rank;

/// Which of the three accounted buckets (§3 "three-bucket footprint") an
/// allocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootprintKind {
    /// A user-visible allocation.
    User,
    /// An internal rendezvous staging buffer.
    Rendezvous,
    /// Any other internal buffer.
    Internal,
}

#[derive(Debug, Default)]
struct Bucket {
    bytes: AtomicUsize,
    count: AtomicUsize,
}

impl Bucket {
    fn add(&self, bytes: usize) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);
    }
    fn remove(&self, bytes: usize) {
        self.bytes.fetch_sub(bytes, Ordering::SeqCst);
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Separately-accounted byte/count totals for user, rendezvous, and
/// miscellaneous-internal allocations.
#[derive(Debug, Default)]
pub struct Footprint {
    user: Bucket,
    rendezvous: Bucket,
    internal: Bucket,
}

impl Footprint {
    fn bucket(&self, kind: FootprintKind) -> &Bucket {
        match kind {
            FootprintKind::User => &self.user,
            FootprintKind::Rendezvous => &self.rendezvous,
            FootprintKind::Internal => &self.internal,
        }
    }

    /// Live bytes currently accounted to `kind`.
    pub fn bytes(&self, kind: FootprintKind) -> usize {
        self.bucket(kind).bytes.load(Ordering::SeqCst)
    }

    /// Live allocation count currently accounted to `kind`.
    pub fn count(&self, kind: FootprintKind) -> usize {
        self.bucket(kind).count.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    offset: usize,
    len: usize,
}

#[derive(Debug, Clone, Copy)]
struct LiveBlock {
    offset: usize,
    len: usize,
    kind: FootprintKind,
}

/// A single contiguous, power-of-two-aligned arena, carved by a first-fit
/// free list.
///
/// TODO: coalesce adjacent freed blocks; a long-running alloc/free mix of
/// varying sizes currently fragments the free list instead of merging
/// neighbors back together.
pub struct SharedHeap {
    rank: Rank,
    capacity: usize,
    free: Mutex<Vec<FreeBlock>>,
    live: Mutex<Vec<LiveBlock>>,
    footprint: Footprint,
}

impl SharedHeap {
    /// Creates a heap of `capacity` bytes for `rank`.
    pub fn new(rank: Rank, capacity: usize) -> SharedHeap {
        SharedHeap {
            rank,
            capacity,
            free: Mutex::new(vec![FreeBlock { offset: 0, len: capacity }]),
            live: Mutex::new(Vec::new()),
            footprint: Footprint::default(),
        }
    }

    /// This heap's footprint accounting.
    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    /// User allocation path: returns `None` on failure rather than
    /// aborting (§7, "Allocation failure (user path only)").
    pub fn allocate_user(&self, size: usize, align: usize) -> Option<GlobalPtr> {
        let offset = self.allocate(size, align, FootprintKind::User);
        if offset.is_none() {
            logging::log(LowFootprintEvent { requested: size });
        }
        offset.map(|offset| self.local_to_global(offset).expect("offset just allocated from this heap"))
    }

    /// Internal allocation path: aborts with a diagnostic on failure
    /// (§7, "Allocation failure (internal path)").
    pub fn allocate_internal(&self, size: usize, align: usize, kind: FootprintKind) -> usize {
        assert_ne!(kind, FootprintKind::User, "use allocate_user for user-path allocations");
        self.allocate(size, align, kind).unwrap_or_else(|| {
            panic!(
                "internal shared-heap allocation of {size} bytes (align {align}) failed; \
                 footprint: user {}B/{}, rendezvous {}B/{}, internal {}B/{}",
                self.footprint.bytes(FootprintKind::User),
                self.footprint.count(FootprintKind::User),
                self.footprint.bytes(FootprintKind::Rendezvous),
                self.footprint.count(FootprintKind::Rendezvous),
                self.footprint.bytes(FootprintKind::Internal),
                self.footprint.count(FootprintKind::Internal),
            )
        })
    }

    fn allocate(&self, size: usize, align: usize, kind: FootprintKind) -> Option<usize> {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
        let mut free = self.free.lock().expect("free-list mutex poisoned");
        for i in 0..free.len() {
            let block = free[i];
            let aligned = block.offset.div_ceil(align) * align;
            let padding = aligned - block.offset;
            if block.len >= padding + size {
                let consumed = padding + size;
                if consumed == block.len {
                    free.remove(i);
                } else {
                    free[i] = FreeBlock { offset: block.offset + consumed, len: block.len - consumed };
                }
                self.footprint.bucket(kind).add(size);
                self.live.lock().expect("live-list mutex poisoned").push(LiveBlock { offset: aligned, len: size, kind });
                return Some(aligned);
            }
        }
        None
    }

    /// Releases a previously-allocated block back to the free list.
    pub fn free(&self, offset: usize) {
        let mut live = self.live.lock().expect("live-list mutex poisoned");
        let index = live.iter().position(|b| b.offset == offset).expect("free() of an offset this heap did not allocate");
        let block = live.remove(index);
        drop(live);
        self.footprint.bucket(block.kind).remove(block.len);
        self.free.lock().expect("free-list mutex poisoned").push(FreeBlock { offset: block.offset, len: block.len });
    }

    /// Converts a local offset within this heap to a global pointer. The
    /// real "search a sorted table of peer base addresses" step is
    /// [`PeerTable::local_to_global`]; this is the degenerate one-rank
    /// case used when `offset` is already known to belong to this heap.
    pub fn local_to_global(&self, offset: usize) -> Option<GlobalPtr> {
        if offset > self.capacity {
            return None;
        }
        Some(GlobalPtr::new(Kind::Host, self.rank, offset, -1, self.rank + 1))
    }
}

/// One peer's shared-segment base address, for sorted-table globalization
/// lookups among hosts sharing a memory segment.
#[derive(Debug, Clone, Copy)]
pub struct PeerSegment {
    /// The peer's rank.
    pub rank: Rank,
    /// The segment's base address as mapped into this process.
    pub base: usize,
    /// The segment's size in bytes.
    pub size: usize,
}

/// A sorted-by-base-address table of local-team peers' mapped segments,
/// used to translate a raw address to the rank that owns it and back.
pub struct PeerTable {
    entries: Vec<PeerSegment>,
}

impl PeerTable {
    /// Builds a table from peer segments, sorting by base address as the
    /// lookup requires.
    pub fn new(mut entries: Vec<PeerSegment>) -> PeerTable {
        entries.sort_by_key(|e| e.base);
        PeerTable { entries }
    }

    /// Finds the peer owning `address`, via upper-bound search on the
    /// sorted base-address table, then a bounds check against that peer's
    /// segment size.
    pub fn local_to_global(&self, address: usize) -> Option<GlobalPtr> {
        let idx = self.entries.partition_point(|e| e.base <= address);
        if idx == 0 {
            return None;
        }
        let entry = &self.entries[idx - 1];
        let relative = address.checked_sub(entry.base)?;
        if relative < entry.size {
            Some(GlobalPtr::new(Kind::Host, entry.rank, relative, -1, entry.rank + 1))
        } else {
            None
        }
    }

    /// Reverse lookup, restricted to local-team peers per §3: the raw
    /// address of a global pointer known to belong to one of this table's
    /// peers.
    pub fn global_to_local(&self, ptr: &GlobalPtr) -> Option<usize> {
        let entry = self.entries.iter().find(|e| e.rank == ptr.rank())?;
        let address = entry.base + ptr.raw_address();
        (ptr.raw_address() < entry.size).then_some(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_round_trips_through_local_to_global() {
        let heap = SharedHeap::new(1, 4096);
        let ptr = heap.allocate_user(64, 16).expect("room for a small allocation");
        assert_eq!(ptr.rank(), 1);
        assert!(ptr.is_aligned_to(16));
        assert_eq!(heap.footprint().count(FootprintKind::User), 1);
        assert_eq!(heap.footprint().bytes(FootprintKind::User), 64);
        heap.free(ptr.raw_address());
        assert_eq!(heap.footprint().count(FootprintKind::User), 0);
    }

    #[test]
    fn allocate_user_returns_none_when_exhausted() {
        let heap = SharedHeap::new(0, 128);
        assert!(heap.allocate_user(100, 8).is_some());
        assert!(heap.allocate_user(100, 8).is_none());
    }

    #[test]
    #[should_panic(expected = "internal shared-heap allocation")]
    fn allocate_internal_aborts_on_exhaustion() {
        let heap = SharedHeap::new(0, 8);
        heap.allocate_internal(100, 8, FootprintKind::Internal);
    }

    #[test]
    fn peer_table_finds_the_owning_rank_and_reverses() {
        let table = PeerTable::new(vec![
            PeerSegment { rank: 0, base: 0x1000, size: 0x100 },
            PeerSegment { rank: 1, base: 0x2000, size: 0x100 },
        ]);
        let g = table.local_to_global(0x2010).expect("address falls in rank 1's segment");
        assert_eq!(g.rank(), 1);
        assert_eq!(g.raw_address(), 0x10);
        assert_eq!(table.global_to_local(&g), Some(0x2010));
        assert!(table.local_to_global(0x3000).is_none());
    }
}
