//! Global pointer + RMA (§4.9): one-sided put/get against the shared
//! heaps modeled in [`crate::heap`].
//!
//! The reference transports this crate ships ([`crate::comm::Thread`],
//! [`crate::comm::Process`]) have no real network gap between initiator
//! and target — every rank's segment is directly reachable in-process.
//! That collapses the source's put state machine (which `sync` label a
//! put achieves depends on whether the transport completed the write
//! before returning) to always "everything synchronous": a put here
//! copies the bytes and fires every requested completion before
//! returning. The [`Sync`] labels are kept so a real network backend's
//! asynchronous put can report anything short of that without changing
//! this module's public shape — only `rma`'s internals would need to stop
//! assuming `Sync::OpNow` unconditionally.

use std::sync::{Arc, Mutex};

use crate::completion::{CompletionBundle, CompletionEvent};
use crate::gptr::{GlobalPtr, Kind};
use crate::logging::{self, RmaEvent, RmaStage};
use crate::team::Rank;

/// What a put achieved synchronously, before any registered handle
/// callback would need to fire later (§4.9's state-machine labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sync {
    /// Source buffer reusable once the initiating call returns.
    SrcCb,
    /// Source completion folds into the operation-completion callback.
    SrcIntoOpCb,
    /// Source buffer was already reusable when the call returned.
    SrcNow,
    /// The operation was globally observable when the call returned.
    OpNow,
}

/// Every rank's host shared-segment bytes, reachable in-process.
pub struct Segments {
    host: Vec<Arc<Mutex<Vec<u8>>>>,
}

impl Segments {
    /// Allocates a same-size segment per rank.
    pub fn new(rank_n: usize, size_per_rank: usize) -> Segments {
        Segments { host: (0..rank_n).map(|_| Arc::new(Mutex::new(vec![0u8; size_per_rank]))).collect() }
    }

    /// Number of ranks with a modeled segment.
    pub fn rank_n(&self) -> usize {
        self.host.len()
    }

    /// Direct accessor to one rank's segment bytes, for callers (like the
    /// copy engine) that need to touch host memory outside a put/get
    /// completion bundle.
    pub fn segment(&self, rank: Rank) -> &Mutex<Vec<u8>> {
        &self.host[rank]
    }
}

fn require_host(ptr: &GlobalPtr) {
    assert_eq!(ptr.kind(), Kind::Host, "rma::rput/rget only address host memory; device-memory transfers go through the copy engine");
}

/// One-sided put: writes `data` into `dst`'s segment.
///
/// A zero-length put is a no-op on the bytes but still fires every
/// requested completion event (source, operation, and — on this
/// no-network-gap reference backend — remote).
pub fn rput(segments: &Segments, data: &[u8], dst: GlobalPtr, events: &mut CompletionBundle<()>) -> Sync {
    require_host(&dst);
    logging::log(RmaEvent { target: dst.rank(), len: data.len(), stage: RmaStage::Issued });
    if !data.is_empty() {
        let mut segment = segments.host[dst.rank()].lock().expect("segment mutex poisoned");
        let start = dst.raw_address();
        segment[start..start + data.len()].copy_from_slice(data);
    }
    events.fire(CompletionEvent::Source, ());
    logging::log(RmaEvent { target: dst.rank(), len: data.len(), stage: RmaStage::Source });
    events.fire(CompletionEvent::Operation, ());
    logging::log(RmaEvent { target: dst.rank(), len: data.len(), stage: RmaStage::Operation });
    events.fire(CompletionEvent::Remote, ());
    logging::log(RmaEvent { target: dst.rank(), len: data.len(), stage: RmaStage::Remote });
    Sync::OpNow
}

/// One-sided get: reads `len` bytes from `src`'s segment.
///
/// Remote-completion is meaningless for a get (§4.9): only source-free and
/// operation-complete events are ever fired.
pub fn rget(segments: &Segments, src: GlobalPtr, len: usize, events: &mut CompletionBundle<Vec<u8>>) -> Vec<u8> {
    require_host(&src);
    logging::log(RmaEvent { target: src.rank(), len, stage: RmaStage::Issued });
    let data = if len == 0 {
        Vec::new()
    } else {
        let segment = segments.host[src.rank()].lock().expect("segment mutex poisoned");
        let start = src.raw_address();
        segment[start..start + len].to_vec()
    };
    events.fire(CompletionEvent::Operation, data.clone());
    logging::log(RmaEvent { target: src.rank(), len, stage: RmaStage::Operation });
    data
}

/// True when `dst` is in `local_team` and host memory, i.e. the transport
/// can be skipped entirely for a memcpy-speed path (§4.9 "near-rank fast
/// path"). The reference transports model every rank as local, so this
/// always holds for host pointers; kept as an explicit predicate so
/// callers don't have to special-case it once a real transport narrows
/// `local_team`.
pub fn is_near_rank(dst: &GlobalPtr, local_team: &[Rank]) -> bool {
    dst.kind() == Kind::Host && local_team.contains(&dst.rank())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_sees_the_written_bytes() {
        let segments = Segments::new(2, 64);
        let dst = GlobalPtr::new(Kind::Host, 1, 8, -1, 2);
        let mut put_events = CompletionBundle::new();
        rput(&segments, &[1, 2, 3, 4], dst, &mut put_events);

        let mut get_events = CompletionBundle::new();
        let data = rget(&segments, dst, 4, &mut get_events);
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn zero_length_put_is_a_no_op_that_still_completes() {
        let segments = Segments::new(1, 16);
        let dst = GlobalPtr::new(Kind::Host, 0, 0, -1, 1);
        let (mut bundle, future) = CompletionBundle::with_future(CompletionEvent::Operation);
        rput(&segments, &[], dst, &mut bundle);
        assert!(future.ready());
    }

    #[test]
    fn near_rank_path_holds_for_the_reference_transports_local_team() {
        let dst = GlobalPtr::new(Kind::Host, 1, 0, -1, 2);
        assert!(is_near_rank(&dst, &[0, 1]));
        assert!(!is_near_rank(&dst, &[0]));
    }
}
