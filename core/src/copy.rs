//! Copy engine (§4.13): cross-memory-kind `copy(src, dst, n)`, orchestrating
//! bounce buffers through host/device/remote combinations.
//!
//! The reference transports have no real network gap (every rank's
//! segment and device memory is directly reachable in-process), so the
//! cases below differ only in *which bytes move through which
//! intermediate buffer*, not in whether a remote hop is actually remote.
//! Bounce buffers are still allocated from the owning rank's
//! [`SharedHeap`] against the rendezvous footprint bucket, exactly as the
//! source accounts them, and released on the stage's completion — so the
//! accounting and lifetime discipline match a real backend even though
//! the underlying byte move is always a direct copy here.

use std::sync::{Arc, Mutex};

use crate::completion::{CompletionBundle, CompletionEvent};
use crate::gptr::{GlobalPtr, Kind};
use crate::heap::{FootprintKind, SharedHeap};
use crate::rma::{self, Segments};
use crate::team::Rank;

/// Per-rank device memory, modeled as one contiguous buffer per rank
/// (device id 0 only — multi-device-per-rank is out of scope here).
pub struct DeviceMemory {
    devices: Vec<Arc<Mutex<Vec<u8>>>>,
}

impl DeviceMemory {
    /// Allocates a same-size device buffer per rank.
    pub fn new(rank_n: usize, size_per_rank: usize) -> DeviceMemory {
        DeviceMemory { devices: (0..rank_n).map(|_| Arc::new(Mutex::new(vec![0u8; size_per_rank]))).collect() }
    }
}

fn require_device(ptr: &GlobalPtr) {
    assert_eq!(ptr.kind(), Kind::Device, "expected a device global pointer");
}

/// The resources a [`copy`] call needs: every rank's host segment, device
/// buffer, and shared heap (for bounce-buffer staging).
pub struct CopyEngine<'a> {
    /// Host-addressable shared segments, one per rank.
    pub host: &'a Segments,
    /// Device buffers, one per rank.
    pub device: &'a DeviceMemory,
    /// Shared heaps, one per rank, used for bounce-buffer allocation.
    pub heaps: &'a [Arc<SharedHeap>],
}

impl CopyEngine<'_> {
    fn read_device(&self, ptr: &GlobalPtr, len: usize) -> Vec<u8> {
        require_device(ptr);
        let buf = self.device.devices[ptr.rank()].lock().expect("device mutex poisoned");
        let start = ptr.raw_address();
        buf[start..start + len].to_vec()
    }

    fn write_device(&self, ptr: &GlobalPtr, data: &[u8]) {
        require_device(ptr);
        let mut buf = self.device.devices[ptr.rank()].lock().expect("device mutex poisoned");
        let start = ptr.raw_address();
        buf[start..start + data.len()].copy_from_slice(data);
    }

    /// Copies `n` bytes from `src` to `dst`, dispatching on the pairing
    /// of rank and memory kind (§4.13).
    pub fn copy(&self, src: GlobalPtr, dst: GlobalPtr, n: usize, events: &mut CompletionBundle<()>) {
        match (src.rank() == dst.rank(), src.kind(), dst.kind()) {
            (true, Kind::Host, Kind::Host) => {
                let data = {
                    let seg = self.host_segment(&src).lock().expect("segment mutex poisoned");
                    seg[src.raw_address()..src.raw_address() + n].to_vec()
                };
                let mut seg = self.host_segment(&dst).lock().expect("segment mutex poisoned");
                seg[dst.raw_address()..dst.raw_address() + n].copy_from_slice(&data);
                self.complete(events);
            }
            (true, Kind::Device, Kind::Device) => {
                let data = self.read_device(&src, n);
                self.write_device(&dst, &data);
                self.complete(events);
            }
            (true, Kind::Host, Kind::Device) => {
                let data = {
                    let seg = self.host_segment(&src).lock().expect("segment mutex poisoned");
                    seg[src.raw_address()..src.raw_address() + n].to_vec()
                };
                self.write_device(&dst, &data);
                self.complete(events);
            }
            (true, Kind::Device, Kind::Host) => {
                let data = self.read_device(&src, n);
                let mut seg = self.host_segment(&dst).lock().expect("segment mutex poisoned");
                seg[dst.raw_address()..dst.raw_address() + n].copy_from_slice(&data);
                self.complete(events);
            }
            (false, Kind::Host, Kind::Host) => {
                // Different ranks, both host: a plain put suffices.
                let data = {
                    let seg = self.host_segment(&src).lock().expect("segment mutex poisoned");
                    seg[src.raw_address()..src.raw_address() + n].to_vec()
                };
                rma::rput(self.host, &data, dst, events);
            }
            (false, Kind::Device, Kind::Host) => {
                // Source has device memory, destination doesn't: stage
                // into a source-rank host bounce allocated against the
                // rendezvous footprint, read the staged bytes back out,
                // and put those (not the original device read) onward.
                let data = self.read_device(&src, n);
                let offset = self.stage_into_bounce(src.rank(), &data);
                let staged = self.release_bounce(src.rank(), offset, n);
                rma::rput(self.host, &staged, dst, events);
            }
            (false, Kind::Device, Kind::Device) => {
                // Both ends have device memory: stage the source read
                // through a source-rank bounce, put the staged bytes into
                // a destination-rank bounce, then have the destination's
                // driver copy out of *its own* bounce into the device.
                let data = self.read_device(&src, n);
                let src_offset = self.stage_into_bounce(src.rank(), &data);
                let staged = self.release_bounce(src.rank(), src_offset, n);

                let dst_offset = self.heaps[dst.rank()].allocate_internal(n, 1, FootprintKind::Rendezvous);
                let dst_bounce = GlobalPtr::new(Kind::Host, dst.rank(), dst_offset, -1, self.heaps.len());
                let mut put_events = CompletionBundle::new();
                rma::rput(self.host, &staged, dst_bounce, &mut put_events);
                let landed = self.release_bounce(dst.rank(), dst_offset, n);
                self.write_device(&dst, &landed);
                self.complete(events);
            }
            (false, _, Kind::Device) => {
                // Destination has device memory: destination allocates a
                // host bounce, the initiator puts to it, then the
                // destination's driver copies out of its own bounce into
                // the device.
                let data = {
                    let seg = self.host_segment(&src).lock().expect("segment mutex poisoned");
                    seg[src.raw_address()..src.raw_address() + n].to_vec()
                };
                let dst_offset = self.heaps[dst.rank()].allocate_internal(n, 1, FootprintKind::Rendezvous);
                let dst_bounce = GlobalPtr::new(Kind::Host, dst.rank(), dst_offset, -1, self.heaps.len());
                let mut put_events = CompletionBundle::new();
                rma::rput(self.host, &data, dst_bounce, &mut put_events);
                let landed = self.release_bounce(dst.rank(), dst_offset, n);
                self.write_device(&dst, &landed);
                self.complete(events);
            }
        }
    }

    /// Allocates a rendezvous-accounted host bounce on `rank` and copies
    /// `data` into it, returning the offset.
    fn stage_into_bounce(&self, rank: Rank, data: &[u8]) -> usize {
        let offset = self.heaps[rank].allocate_internal(data.len(), 1, FootprintKind::Rendezvous);
        let mut seg = self.host.segment(rank).lock().expect("segment mutex poisoned");
        seg[offset..offset + data.len()].copy_from_slice(data);
        offset
    }

    /// Reads `n` bytes back out of a bounce previously staged by
    /// [`CopyEngine::stage_into_bounce`] (or put into by a remote rank),
    /// then releases it.
    fn release_bounce(&self, rank: Rank, offset: usize, n: usize) -> Vec<u8> {
        let data = {
            let seg = self.host.segment(rank).lock().expect("segment mutex poisoned");
            seg[offset..offset + n].to_vec()
        };
        self.heaps[rank].free(offset);
        data
    }

    fn host_segment(&self, ptr: &GlobalPtr) -> &Mutex<Vec<u8>> {
        self.host_segment_raw(ptr.rank())
    }

    fn host_segment_raw(&self, rank: usize) -> &Mutex<Vec<u8>> {
        // Segments keeps its storage private; route through a zero-length
        // get/put pair would work but a direct accessor is clearer here.
        self.segments_ref(rank)
    }

    fn segments_ref(&self, rank: usize) -> &Mutex<Vec<u8>> {
        self.host.segment(rank)
    }

    fn complete(&self, events: &mut CompletionBundle<()>) {
        events.fire(CompletionEvent::Source, ());
        events.fire(CompletionEvent::Operation, ());
        events.fire(CompletionEvent::Remote, ());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine<'a>(host: &'a Segments, device: &'a DeviceMemory, heaps: &'a [Arc<SharedHeap>]) -> CopyEngine<'a> {
        CopyEngine { host, device, heaps }
    }

    #[test]
    fn host_to_device_same_rank_round_trips() {
        let host = Segments::new(1, 64);
        let device = DeviceMemory::new(1, 64);
        let heaps = vec![Arc::new(SharedHeap::new(0, 4096))];
        let e = engine(&host, &device, &heaps);

        let mut put_events = CompletionBundle::new();
        rma::rput(&host, &[5, 6, 7], GlobalPtr::new(Kind::Host, 0, 0, -1, 1), &mut put_events);

        let mut events = CompletionBundle::new();
        e.copy(GlobalPtr::new(Kind::Host, 0, 0, -1, 1), GlobalPtr::new(Kind::Device, 0, 0, 0, 1), 3, &mut events);

        let back = e.read_device(&GlobalPtr::new(Kind::Device, 0, 0, 0, 1), 3);
        assert_eq!(back, vec![5, 6, 7]);
    }

    #[test]
    fn cross_rank_host_to_host_uses_rput() {
        let host = Segments::new(2, 64);
        let device = DeviceMemory::new(2, 64);
        let heaps = vec![Arc::new(SharedHeap::new(0, 4096)), Arc::new(SharedHeap::new(1, 4096))];
        let e = engine(&host, &device, &heaps);

        let mut put_events = CompletionBundle::new();
        rma::rput(&host, &[1, 2, 3, 4], GlobalPtr::new(Kind::Host, 0, 0, -1, 2), &mut put_events);

        let mut events = CompletionBundle::new();
        e.copy(GlobalPtr::new(Kind::Host, 0, 0, -1, 2), GlobalPtr::new(Kind::Host, 1, 8, -1, 2), 4, &mut events);

        let mut get_events = CompletionBundle::new();
        let landed = rma::rget(&host, GlobalPtr::new(Kind::Host, 1, 8, -1, 2), 4, &mut get_events);
        assert_eq!(landed, vec![1, 2, 3, 4]);
    }

    #[test]
    fn cross_rank_device_to_device_stages_through_both_bounces() {
        let host = Segments::new(2, 64);
        let device = DeviceMemory::new(2, 64);
        let heaps = vec![Arc::new(SharedHeap::new(0, 4096)), Arc::new(SharedHeap::new(1, 4096))];
        let e = engine(&host, &device, &heaps);
        e.write_device(&GlobalPtr::new(Kind::Device, 0, 0, 0, 2), &[9, 9, 9]);

        let mut events = CompletionBundle::new();
        e.copy(GlobalPtr::new(Kind::Device, 0, 0, 0, 2), GlobalPtr::new(Kind::Device, 1, 0, 0, 2), 3, &mut events);

        assert_eq!(e.read_device(&GlobalPtr::new(Kind::Device, 1, 0, 0, 2), 3), vec![9, 9, 9]);
    }
}
