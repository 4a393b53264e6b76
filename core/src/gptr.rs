//! Global pointer (§3): `(kind, rank, raw_address, device_id)`.

use crate::team::Rank;

/// Which kind of memory a [`GlobalPtr`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    /// The rank's host-mapped shared segment.
    Host,
    /// An accelerator attached to the rank, identified by device id.
    Device,
}

/// A process-wide address: rank, memory kind, device (if any), and a raw
/// byte offset.
///
/// Invariants (checked by [`GlobalPtr::new`] and [`GlobalPtr::null`]):
/// null has `raw_address == 0`, `device_id == -1`, `rank == 0`; a non-null
/// pointer's rank is in `[0, rank_n)`; host pointers have `device_id == -1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalPtr {
    kind: Kind,
    rank: Rank,
    raw_address: usize,
    device_id: i32,
}

impl GlobalPtr {
    /// The null global pointer.
    pub fn null() -> GlobalPtr {
        GlobalPtr { kind: Kind::Host, rank: 0, raw_address: 0, device_id: -1 }
    }

    /// Constructs a non-null global pointer. Panics if the invariants in
    /// the type's documentation are violated (an API-misuse assertion
    /// site per §7).
    pub fn new(kind: Kind, rank: Rank, raw_address: usize, device_id: i32, rank_n: usize) -> GlobalPtr {
        assert!(rank < rank_n, "global pointer rank {rank} out of range [0, {rank_n})");
        match kind {
            Kind::Host => assert_eq!(device_id, -1, "host global pointers must have device_id == -1"),
            Kind::Device => assert!(device_id >= 0, "device global pointers need a non-negative device_id"),
        }
        GlobalPtr { kind, rank, raw_address, device_id }
    }

    /// True if this is the null pointer.
    pub fn is_null(&self) -> bool {
        self.raw_address == 0 && self.device_id == -1 && self.rank == 0
    }

    /// The memory kind this pointer addresses.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The owning rank.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The device id, or `-1` for host memory.
    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// The raw byte offset within the owning rank's segment or device.
    pub fn raw_address(&self) -> usize {
        self.raw_address
    }

    /// Checks `self`'s address is aligned to `align` (a power of two).
    pub fn is_aligned_to(&self, align: usize) -> bool {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
        self.raw_address % align == 0
    }

    /// Byte-level pointer arithmetic: `self + offset`.
    pub fn offset(&self, offset: isize) -> GlobalPtr {
        let raw_address = if offset >= 0 {
            self.raw_address.checked_add(offset as usize)
        } else {
            self.raw_address.checked_sub((-offset) as usize)
        };
        GlobalPtr { raw_address: raw_address.expect("global pointer arithmetic overflow"), ..*self }
    }

    /// Byte distance between two global pointers. Defined only when both
    /// share a rank and device (an API-misuse assertion otherwise).
    pub fn distance_to(&self, other: &GlobalPtr) -> isize {
        assert_eq!(self.rank, other.rank, "distance between global pointers on different ranks is undefined");
        assert_eq!(self.device_id, other.device_id, "distance between global pointers on different devices is undefined");
        other.raw_address as isize - self.raw_address as isize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_satisfies_its_invariants() {
        let p = GlobalPtr::null();
        assert!(p.is_null());
        assert_eq!(p.device_id(), -1);
        assert_eq!(p.rank(), 0);
    }

    #[test]
    fn pointer_arithmetic_is_associative() {
        let p = GlobalPtr::new(Kind::Host, 2, 1000, -1, 4);
        let (i, j) = (37isize, -12isize);
        assert_eq!(p.offset(i).offset(j).raw_address(), p.offset(i + j).raw_address());
        assert_eq!(p.offset(i).distance_to(&p), -i);
    }

    #[test]
    #[should_panic(expected = "device_id == -1")]
    fn host_pointer_with_device_id_panics() {
        GlobalPtr::new(Kind::Host, 0, 0, 3, 4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_rank_panics() {
        GlobalPtr::new(Kind::Host, 9, 0, -1, 4);
    }
}
