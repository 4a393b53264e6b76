//! Distributed objects (§12 supplement): a per-rank member of a named
//! collective type, addressable from any rank by a stable, process-wide
//! monotonic id.
//!
//! Grounded on `original_source/test/dist_object.cpp`'s collective
//! construction: every rank constructs a `dist_object<T>` passing *its
//! own* local value, but the ids line up across ranks because
//! construction is collective — each rank calls [`DistObject::new`] the
//! same number of times in the same order. An RPC that needs to carry a
//! reference to a distributed object (§4.4's `binding<T>` on-wire hook
//! calls these out by name) sends only [`DistObject::id`] — already a
//! plain `u64`, trivially serializable — and the receiving rank reifies
//! it with [`DistObject::fetch`], looking up *its own* local instance
//! under that id rather than deserializing the sender's value.

use std::any::Any;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

type Registry = Mutex<HashMap<u64, Arc<dyn Any + Send + Sync>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A per-rank member of a named collective type, addressed from any
/// rank by a stable id shared with every other rank's local instance.
pub struct DistObject<T> {
    id: u64,
    value: Arc<T>,
}

impl<T: Send + Sync + 'static> DistObject<T> {
    /// Collectively constructs a distributed object: every rank must
    /// call this the same number of times, in the same order, each
    /// passing its own local `value`. The assigned id comes from a
    /// monotonic counter advanced by construction order, not by any
    /// actual communication between ranks — exactly `original_source`'s
    /// contract for `dist_object<T>`.
    pub fn new(value: T) -> DistObject<T> {
        let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
        let value = Arc::new(value);
        registry().lock().expect("dist_object registry mutex poisoned").insert(id, value.clone());
        DistObject { id, value }
    }

    /// This distributed object's process-wide, cross-rank-stable id —
    /// what actually travels over the wire as a reference to it.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Looks up the local instance registered under `id` on this rank.
    /// This is how a remote reference reifies: the id travels over the
    /// wire as an ordinary `u64`, and each rank resolves it against its
    /// own registry to reach its own local value.
    ///
    /// Returns `None` if no live `DistObject<T>` on this rank was
    /// constructed with this id, or if `id` names an instance of a
    /// different type (an RPC handler bound to the wrong `T`).
    pub fn fetch(id: u64) -> Option<Arc<T>> {
        registry().lock().expect("dist_object registry mutex poisoned").get(&id).and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }
}

impl<T> Deref for DistObject<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for DistObject<T> {
    fn drop(&mut self) {
        registry().lock().expect("dist_object registry mutex poisoned").remove(&self.id);
    }
}

impl<T: Send + Sync + 'static> DistObject<T> {
    /// A cross-rank-sendable reference to this distributed object: an RPC
    /// handler binds only [`DistObjectRef::to_wire`]'s `u64` and
    /// reconstructs this on the receiving rank via
    /// [`DistObjectRef::from_wire`], against that rank's own registry,
    /// per this module's doc comment.
    pub fn reference(&self) -> DistObjectRef<T> {
        DistObjectRef { id: self.id, value: self.value.clone() }
    }
}

/// A [`DistObject`] reference suitable for sending as an RPC argument
/// (§4.4). Unlike `DistObject` itself, dropping a reference does not
/// remove the registry entry — only the owning rank's original
/// `DistObject` does that.
pub struct DistObjectRef<T> {
    id: u64,
    value: Arc<T>,
}

impl<T> DistObjectRef<T> {
    /// The distributed object's process-wide id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Deref for DistObjectRef<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Send + Sync + 'static> DistObjectRef<T> {
    /// The on-wire representation: just the id. `pgas_comm::bind::Binding`'s
    /// blanket impl already covers plain `u64` RPC arguments, so a
    /// distributed-object reference is bound by sending `self.to_wire()`
    /// in its place and calling [`DistObjectRef::from_wire`] on arrival,
    /// rather than implementing `Binding` itself — a type-specific
    /// `Binding for DistObjectRef<T>` would conflict with the blanket
    /// `impl<T: Clone + Send + 'static> Binding for T` that every other
    /// by-value RPC argument relies on.
    pub fn to_wire(&self) -> u64 {
        self.id
    }

    /// Reconstructs a reference from its wire id by looking it up in
    /// *this* rank's registry — the reified value is whatever this
    /// rank's own `DistObject<T>` holds, never the sender's.
    pub fn from_wire(wire: u64) -> Self {
        let value = DistObject::<T>::fetch(wire).expect("dist_object reference reified on a rank with no matching local instance");
        DistObjectRef { id: wire, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_round_trips_through_to_wire_and_from_wire() {
        let local = DistObject::new(100u32);
        let wire = local.reference().to_wire();
        let reified = DistObjectRef::<u32>::from_wire(wire);
        assert_eq!(*reified, 100);
        assert_eq!(reified.id(), local.id());
    }

    #[test]
    #[should_panic(expected = "no matching local instance")]
    fn from_wire_panics_when_no_local_instance_is_registered() {
        let _ = DistObjectRef::<u32>::from_wire(u64::MAX);
    }

    #[test]
    fn fetch_reifies_this_ranks_own_local_value_by_id() {
        let local = DistObject::new(42u32);
        let id = local.id();
        let fetched = DistObject::<u32>::fetch(id).expect("just constructed with this id");
        assert_eq!(*fetched, 42);
        assert_eq!(*local, 42);
    }

    #[test]
    fn each_ranks_local_value_can_differ_under_the_same_collective_id() {
        // Simulates two ranks constructing a dist_object collectively at
        // the same program point: both get ids allocated in the same
        // order, but each registers its own local value.
        let rank0 = DistObject::new("rank0-local".to_string());
        let rank1_id = {
            // A different "rank" would call new() independently with its
            // own process-wide counter; here we just confirm distinct
            // constructions get distinct ids.
            let rank1 = DistObject::new("rank1-local".to_string());
            rank1.id()
        };
        assert_ne!(rank0.id(), rank1_id);
        assert!(DistObject::<String>::fetch(rank1_id).is_none(), "rank1's instance was dropped at the end of its scope");
    }

    #[test]
    fn fetch_of_unknown_id_is_none() {
        assert!(DistObject::<u32>::fetch(u64::MAX).is_none());
    }

    #[test]
    fn dropping_removes_the_registry_entry() {
        let id = {
            let obj = DistObject::new(7i64);
            obj.id()
        };
        assert!(DistObject::<i64>::fetch(id).is_none());
    }
}
