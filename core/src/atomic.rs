//! Atomic domains (§4.11): typed, opcode-restricted namespaces over
//! global memory.
//!
//! The reference transports have no real device-side atomic unit, so a
//! domain here is backed by an in-process `Vec<AtomicU64>` per rank (each
//! slot holding a `T`'s bit pattern). A real transport-backed domain
//! would issue `AtomicOp` through the transport's native atomic-op call
//! instead of touching process memory directly; the domain's
//! opcode-membership and alignment checks are identical either way.
//!
//! Opcodes split across two traits: [`AtomicScalar`] (load, store,
//! compare-exchange, add/sub/mul/min/max, each fetching and
//! non-fetching) is available to every scalar a domain can hold;
//! [`IntegralAtomicScalar`] (inc/dec, bitwise and/or/xor, same fetching
//! split) is only implemented for integer scalars, so a domain declared
//! over `f64` simply has no method to call for those opcodes — the
//! rejection is a missing trait impl, checked at compile time rather
//! than by a runtime assertion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::gptr::{GlobalPtr, Kind};
use crate::team::Team;

/// One opcode an atomic domain may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOp {
    /// Non-fetching load (kept for symmetry with the rest of the set;
    /// reading never needs an exclusive round-trip).
    Load,
    /// Non-fetching store.
    Store,
    /// Compare-and-swap.
    CompareExchange,
    /// Fetch-and-add.
    FetchAdd,
    /// Add without returning the previous value.
    Add,
    /// Fetch-and-subtract.
    FetchSub,
    /// Subtract without returning the previous value.
    Sub,
    /// Fetch-and-multiply.
    FetchMul,
    /// Multiply without returning the previous value.
    Mul,
    /// Fetch-and-min.
    FetchMin,
    /// Min without returning the previous value.
    Min,
    /// Fetch-and-max.
    FetchMax,
    /// Max without returning the previous value.
    Max,
    /// Fetch-and-increment (integral domains only).
    FetchInc,
    /// Increment without returning the previous value (integral only).
    Inc,
    /// Fetch-and-decrement (integral domains only).
    FetchDec,
    /// Decrement without returning the previous value (integral only).
    Dec,
    /// Fetch-and-bitwise-and (integral domains only).
    FetchAnd,
    /// Bitwise and without returning the previous value (integral only).
    And,
    /// Fetch-and-bitwise-or (integral domains only).
    FetchOr,
    /// Bitwise or without returning the previous value (integral only).
    Or,
    /// Fetch-and-bitwise-xor (integral domains only).
    FetchXor,
    /// Bitwise xor without returning the previous value (integral only).
    Xor,
}

/// A scalar an [`AtomicDomain`] can hold: representable as 64 bits so the
/// backing slot can be a plain `AtomicU64`, with the load/store/CAS/
/// add/sub/mul/min/max family defined on it.
pub trait AtomicScalar: Copy + PartialOrd + Send + Sync + 'static {
    /// Bit-for-bit encoding into the slot's native width.
    fn to_bits(self) -> u64;
    /// Inverse of [`AtomicScalar::to_bits`].
    fn from_bits(bits: u64) -> Self;
    /// The additive identity, used as a freshly-registered slot's value.
    fn zero() -> Self;
    /// Wrapping/saturating add appropriate to the type.
    fn op_add(self, other: Self) -> Self;
    /// Wrapping/saturating subtract appropriate to the type.
    fn op_sub(self, other: Self) -> Self;
    /// Wrapping/saturating multiply appropriate to the type.
    fn op_mul(self, other: Self) -> Self;
}

/// The bitwise/increment opcode family, available only to integral
/// scalars — the compile-time half of §4.11's floating-point rejection.
pub trait IntegralAtomicScalar: AtomicScalar {
    /// The multiplicative identity, used by increment/decrement.
    fn one() -> Self;
    /// Bitwise and.
    fn op_and(self, other: Self) -> Self;
    /// Bitwise or.
    fn op_or(self, other: Self) -> Self;
    /// Bitwise xor.
    fn op_xor(self, other: Self) -> Self;
}

macro_rules! impl_atomic_scalar_int {
    ($t:ty) => {
        impl AtomicScalar for $t {
            fn to_bits(self) -> u64 {
                self as u64
            }
            fn from_bits(bits: u64) -> Self {
                bits as $t
            }
            fn zero() -> Self {
                0
            }
            fn op_add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }
            fn op_sub(self, other: Self) -> Self {
                self.wrapping_sub(other)
            }
            fn op_mul(self, other: Self) -> Self {
                self.wrapping_mul(other)
            }
        }
        impl IntegralAtomicScalar for $t {
            fn one() -> Self {
                1
            }
            fn op_and(self, other: Self) -> Self {
                self & other
            }
            fn op_or(self, other: Self) -> Self {
                self | other
            }
            fn op_xor(self, other: Self) -> Self {
                self ^ other
            }
        }
    };
}

impl_atomic_scalar_int!(i64);
impl_atomic_scalar_int!(u64);

impl AtomicScalar for f64 {
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
    fn zero() -> Self {
        0.0
    }
    fn op_add(self, other: Self) -> Self {
        self + other
    }
    fn op_sub(self, other: Self) -> Self {
        self - other
    }
    fn op_mul(self, other: Self) -> Self {
        self * other
    }
    // No `IntegralAtomicScalar` impl: inc/dec/and/or/xor have no method
    // to call on an `f64` domain, so those opcodes are unreachable at
    // compile time rather than rejected at runtime.
}

/// A `(T, opcode-set, team)` registered atomic namespace over one global
/// `T` slot per member rank.
///
/// Creation is collective over `team` in spirit (every rank must call it
/// with the same `team` and `opcodes`); the reference backend has no
/// actual collective handshake to perform, since there's no remote
/// resource to negotiate, so this constructor is just documented as
/// collective rather than synchronizing.
pub struct AtomicDomain<T> {
    opcodes: Vec<AtomicOp>,
    team: Team,
    slots: Vec<Arc<AtomicU64>>,
    _scalar: std::marker::PhantomData<T>,
}

impl<T: AtomicScalar> AtomicDomain<T> {
    /// Registers a domain over `team`, supporting exactly `opcodes`.
    pub fn new(team: Team, opcodes: Vec<AtomicOp>) -> AtomicDomain<T> {
        let slots = (0..team.len()).map(|_| Arc::new(AtomicU64::new(T::zero().to_bits()))).collect();
        AtomicDomain { opcodes, team, slots, _scalar: std::marker::PhantomData }
    }

    fn require_opcode(&self, op: AtomicOp) {
        assert!(self.opcodes.contains(&op), "atomic op {op:?} not registered in this domain's opcode set");
    }

    fn slot(&self, ptr: &GlobalPtr) -> &AtomicU64 {
        assert_eq!(ptr.kind(), Kind::Host, "atomic domains here only address host-resident scalar slots");
        let index = self.team.team_index(ptr.rank()).expect("atomic target rank is not a member of this domain's team");
        &self.slots[index]
    }

    /// A global pointer naming the `team_index`-th member's slot, for use
    /// as an atomic target.
    pub fn slot_ptr(&self, team_index: usize) -> GlobalPtr {
        let rank = self.team.world_rank(team_index);
        GlobalPtr::new(Kind::Host, rank, 0, -1, rank + 1)
    }

    fn fetch_update(&self, target: &GlobalPtr, f: impl Fn(T) -> T) -> T {
        let slot = self.slot(target);
        let mut current_bits = slot.load(Ordering::SeqCst);
        loop {
            let current = T::from_bits(current_bits);
            let new = f(current);
            match slot.compare_exchange_weak(current_bits, new.to_bits(), Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return current,
                Err(actual) => current_bits = actual,
            }
        }
    }

    /// Reads the current value.
    pub fn load(&self, target: &GlobalPtr) -> T {
        self.require_opcode(AtomicOp::Load);
        T::from_bits(self.slot(target).load(Ordering::SeqCst))
    }

    /// Non-fetching store.
    pub fn store(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::Store);
        self.slot(target).store(value.to_bits(), Ordering::SeqCst);
    }

    /// Compare-and-swap; returns `Ok(previous)` on success or
    /// `Err(actual)` if `current` didn't match.
    pub fn compare_exchange(&self, target: &GlobalPtr, current: T, new: T) -> Result<T, T> {
        self.require_opcode(AtomicOp::CompareExchange);
        self.slot(target)
            .compare_exchange(current.to_bits(), new.to_bits(), Ordering::SeqCst, Ordering::SeqCst)
            .map(T::from_bits)
            .map_err(T::from_bits)
    }

    /// Fetch-and-add: returns the value before the add.
    pub fn fetch_add(&self, target: &GlobalPtr, value: T) -> T {
        self.require_opcode(AtomicOp::FetchAdd);
        self.fetch_update(target, |c| c.op_add(value))
    }

    /// Non-fetching add.
    pub fn add(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::Add);
        self.fetch_update(target, |c| c.op_add(value));
    }

    /// Fetch-and-subtract: returns the value before the subtraction.
    pub fn fetch_sub(&self, target: &GlobalPtr, value: T) -> T {
        self.require_opcode(AtomicOp::FetchSub);
        self.fetch_update(target, |c| c.op_sub(value))
    }

    /// Non-fetching subtract.
    pub fn sub(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::Sub);
        self.fetch_update(target, |c| c.op_sub(value));
    }

    /// Fetch-and-multiply: returns the value before the multiply.
    pub fn fetch_mul(&self, target: &GlobalPtr, value: T) -> T {
        self.require_opcode(AtomicOp::FetchMul);
        self.fetch_update(target, |c| c.op_mul(value))
    }

    /// Non-fetching multiply.
    pub fn mul(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::Mul);
        self.fetch_update(target, |c| c.op_mul(value));
    }

    /// Fetch-and-min: returns the value before the min.
    pub fn fetch_min(&self, target: &GlobalPtr, value: T) -> T {
        self.require_opcode(AtomicOp::FetchMin);
        self.fetch_update(target, |c| if value < c { value } else { c })
    }

    /// Non-fetching min.
    pub fn min(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::Min);
        self.fetch_update(target, |c| if value < c { value } else { c });
    }

    /// Fetch-and-max: returns the value before the max.
    pub fn fetch_max(&self, target: &GlobalPtr, value: T) -> T {
        self.require_opcode(AtomicOp::FetchMax);
        self.fetch_update(target, |c| if value > c { value } else { c })
    }

    /// Non-fetching max.
    pub fn max(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::Max);
        self.fetch_update(target, |c| if value > c { value } else { c });
    }
}

impl<T: IntegralAtomicScalar> AtomicDomain<T> {
    /// Fetch-and-increment: returns the value before the increment.
    pub fn fetch_inc(&self, target: &GlobalPtr) -> T {
        self.require_opcode(AtomicOp::FetchInc);
        self.fetch_update(target, |c| c.op_add(T::one()))
    }

    /// Non-fetching increment.
    pub fn inc(&self, target: &GlobalPtr) {
        self.require_opcode(AtomicOp::Inc);
        self.fetch_update(target, |c| c.op_add(T::one()));
    }

    /// Fetch-and-decrement: returns the value before the decrement.
    pub fn fetch_dec(&self, target: &GlobalPtr) -> T {
        self.require_opcode(AtomicOp::FetchDec);
        self.fetch_update(target, |c| c.op_sub(T::one()))
    }

    /// Non-fetching decrement.
    pub fn dec(&self, target: &GlobalPtr) {
        self.require_opcode(AtomicOp::Dec);
        self.fetch_update(target, |c| c.op_sub(T::one()));
    }

    /// Fetch-and-bitwise-and: returns the value before the and.
    pub fn fetch_and(&self, target: &GlobalPtr, value: T) -> T {
        self.require_opcode(AtomicOp::FetchAnd);
        self.fetch_update(target, |c| c.op_and(value))
    }

    /// Non-fetching bitwise and.
    pub fn and(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::And);
        self.fetch_update(target, |c| c.op_and(value));
    }

    /// Fetch-and-bitwise-or: returns the value before the or.
    pub fn fetch_or(&self, target: &GlobalPtr, value: T) -> T {
        self.require_opcode(AtomicOp::FetchOr);
        self.fetch_update(target, |c| c.op_or(value))
    }

    /// Non-fetching bitwise or.
    pub fn or(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::Or);
        self.fetch_update(target, |c| c.op_or(value));
    }

    /// Fetch-and-bitwise-xor: returns the value before the xor.
    pub fn fetch_xor(&self, target: &GlobalPtr, value: T) -> T {
        self.require_opcode(AtomicOp::FetchXor);
        self.fetch_update(target, |c| c.op_xor(value))
    }

    /// Non-fetching bitwise xor.
    pub fn xor(&self, target: &GlobalPtr, value: T) {
        self.require_opcode(AtomicOp::Xor);
        self.fetch_update(target, |c| c.op_xor(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_add_returns_the_prior_value_and_accumulates() {
        let team = Team::world(4);
        let domain: AtomicDomain<i64> = AtomicDomain::new(team, vec![AtomicOp::FetchAdd]);
        let target = domain.slot_ptr(2);
        assert_eq!(domain.fetch_add(&target, 1), 0);
        assert_eq!(domain.fetch_add(&target, 1), 1);
        assert_eq!(domain.fetch_add(&target, 1), 2);
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn op_outside_the_domains_set_panics() {
        let domain: AtomicDomain<i64> = AtomicDomain::new(Team::world(2), vec![AtomicOp::Load]);
        let target = domain.slot_ptr(0);
        domain.fetch_add(&target, 1);
    }

    #[test]
    fn atomic_ring_ten_increments_per_rank() {
        let rank_n = 4;
        let team = Team::world(rank_n);
        let domain: Arc<AtomicDomain<i64>> = Arc::new(AtomicDomain::new(team, vec![AtomicOp::FetchAdd, AtomicOp::Load]));
        let target = domain.slot_ptr(0);
        let handles: Vec<_> = (0..rank_n)
            .map(|_| {
                let domain = domain.clone();
                let target = target;
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        domain.fetch_add(&target, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(domain.load(&target), 10 * rank_n as i64);
    }

    #[test]
    fn mul_min_max_track_the_scalar_family() {
        let domain: AtomicDomain<i64> = AtomicDomain::new(Team::world(1), vec![AtomicOp::Store, AtomicOp::FetchMul, AtomicOp::FetchMin, AtomicOp::FetchMax]);
        let target = domain.slot_ptr(0);
        domain.store(&target, 5);
        assert_eq!(domain.fetch_mul(&target, 3), 5);
        assert_eq!(domain.load_raw(&target), 15);
        assert_eq!(domain.fetch_min(&target, 4), 15);
        assert_eq!(domain.load_raw(&target), 4);
        assert_eq!(domain.fetch_max(&target, 100), 4);
        assert_eq!(domain.load_raw(&target), 100);
    }

    #[test]
    fn inc_dec_and_bitwise_ops_are_available_on_integral_domains() {
        let domain: AtomicDomain<u64> = AtomicDomain::new(
            Team::world(1),
            vec![AtomicOp::Store, AtomicOp::FetchInc, AtomicOp::FetchDec, AtomicOp::FetchAnd, AtomicOp::FetchOr, AtomicOp::FetchXor],
        );
        let target = domain.slot_ptr(0);
        domain.store(&target, 0b1010);
        assert_eq!(domain.fetch_inc(&target), 0b1010);
        assert_eq!(domain.load_raw(&target), 0b1011);
        assert_eq!(domain.fetch_dec(&target), 0b1011);
        assert_eq!(domain.load_raw(&target), 0b1010);
        assert_eq!(domain.fetch_and(&target, 0b0010), 0b1010);
        assert_eq!(domain.load_raw(&target), 0b0010);
        assert_eq!(domain.fetch_or(&target, 0b0101), 0b0010);
        assert_eq!(domain.load_raw(&target), 0b0111);
        assert_eq!(domain.fetch_xor(&target, 0b1111), 0b0111);
        assert_eq!(domain.load_raw(&target), 0b1000);
    }

    #[test]
    fn float_domains_support_the_scalar_family_but_not_bitwise_ops() {
        // `AtomicDomain<f64>` compiles and supports add/sub/mul/min/max;
        // it has no `fetch_and`/`fetch_or`/`fetch_xor`/`inc`/`dec` to
        // call at all, since `f64` has no `IntegralAtomicScalar` impl.
        let domain: AtomicDomain<f64> = AtomicDomain::new(Team::world(1), vec![AtomicOp::Store, AtomicOp::FetchAdd]);
        let target = domain.slot_ptr(0);
        domain.store(&target, 1.5);
        assert_eq!(domain.fetch_add(&target, 2.25), 1.5);
        assert_eq!(domain.load_raw(&target), 3.75);
    }

    impl<T: AtomicScalar> AtomicDomain<T> {
        /// Reads the current value bypassing the opcode check, for
        /// assertions in tests that didn't register `Load`.
        fn load_raw(&self, target: &GlobalPtr) -> T {
            T::from_bits(self.slot(target).load(Ordering::SeqCst))
        }
    }
}
