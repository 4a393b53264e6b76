//! VIS: vector / indexed / strided RMA (§4.10): batched non-contiguous
//! put/get built atop [`crate::rma`].
//!
//! The source issues one batched transport call per VIS operation; the
//! reference transports this crate ships have no native scatter-gather
//! primitive, so each of the three forms here decomposes into a sequence
//! of scalar [`rma::rput`]/[`rma::rget`] calls and fires its completion
//! bundle once every piece has landed. A real batched transport backend
//! would replace the inner loop with one call; the three request shapes
//! (irregular/regular/strided) stay the same either way.

use crate::completion::{CompletionBundle, CompletionEvent};
use crate::gptr::GlobalPtr;
use crate::rma::{self, Segments};

/// One `(pointer, length)` pair for the irregular VIS form.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    /// Base address of this span.
    pub ptr: GlobalPtr,
    /// Length in bytes.
    pub len: usize,
}

/// Irregular VIS put: arbitrary `(pointer, length)` pairs on each side.
/// Source and destination spans must all share a destination rank and a
/// source rank respectively (checked).
pub fn rput_irregular(segments: &Segments, sources: &[&[u8]], destinations: &[Span], events: &mut CompletionBundle<()>) {
    assert_eq!(sources.len(), destinations.len(), "irregular VIS requires matching source/destination span counts");
    let rank = destinations.first().map(|s| s.ptr.rank());
    for span in destinations {
        assert_eq!(Some(span.ptr.rank()), rank, "irregular VIS destinations must all target the same rank");
    }
    for (data, span) in sources.iter().zip(destinations) {
        assert_eq!(data.len(), span.len, "irregular VIS source/destination length mismatch");
        let mut sub_events = CompletionBundle::new();
        rma::rput(segments, data, span.ptr, &mut sub_events);
    }
    events.fire(CompletionEvent::Source, ());
    events.fire(CompletionEvent::Operation, ());
    events.fire(CompletionEvent::Remote, ());
}

/// Regular VIS put: base pointers plus a uniform per-element stride and
/// count on each side. Total bytes transferred must match.
pub fn rput_regular(
    segments: &Segments,
    source_base: &[u8],
    source_stride: usize,
    dest_base: GlobalPtr,
    dest_stride: usize,
    element_size: usize,
    count: usize,
    events: &mut CompletionBundle<()>,
) {
    assert!(source_base.len() >= source_stride * count.saturating_sub(1) + element_size, "source buffer too short for the requested regular VIS extent");
    for i in 0..count {
        let src_off = i * source_stride;
        let element = &source_base[src_off..src_off + element_size];
        let dst = dest_base.offset((i * dest_stride) as isize);
        let mut sub_events = CompletionBundle::new();
        rma::rput(segments, element, dst, &mut sub_events);
    }
    events.fire(CompletionEvent::Source, ());
    events.fire(CompletionEvent::Operation, ());
    events.fire(CompletionEvent::Remote, ());
}

/// N-dimensional strided put (§4.10): two base pointers, two per-dimension
/// stride arrays, and one extents array; `element_size` is fixed per call
/// rather than a template parameter.
pub fn rput_strided(
    segments: &Segments,
    source_base: &[u8],
    source_strides: &[usize],
    dest_base: GlobalPtr,
    dest_strides: &[usize],
    extents: &[usize],
    element_size: usize,
    events: &mut CompletionBundle<()>,
) {
    assert_eq!(source_strides.len(), extents.len(), "source strides must have one entry per dimension");
    assert_eq!(dest_strides.len(), extents.len(), "destination strides must have one entry per dimension");
    let mut index = vec![0usize; extents.len()];
    loop {
        let src_offset: usize = index.iter().zip(source_strides).map(|(i, s)| i * s).sum();
        let dst_offset: isize = index.iter().zip(dest_strides).map(|(i, s)| (i * s) as isize).sum();
        let element = &source_base[src_offset..src_offset + element_size];
        let dst = dest_base.offset(dst_offset);
        let mut sub_events = CompletionBundle::new();
        rma::rput(segments, element, dst, &mut sub_events);

        // Odometer increment over `extents`, least-significant dimension first.
        let mut carry = true;
        for (dim, extent) in index.iter_mut().zip(extents) {
            if !carry {
                break;
            }
            *dim += 1;
            if *dim == *extent {
                *dim = 0;
            } else {
                carry = false;
            }
        }
        if carry {
            break;
        }
    }
    events.fire(CompletionEvent::Source, ());
    events.fire(CompletionEvent::Operation, ());
    events.fire(CompletionEvent::Remote, ());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gptr::Kind;

    #[test]
    fn irregular_put_delivers_every_span() {
        let segments = Segments::new(1, 64);
        let a = [1u8, 2];
        let b = [3u8, 4, 5];
        let spans = [Span { ptr: GlobalPtr::new(Kind::Host, 0, 0, -1, 1), len: 2 }, Span { ptr: GlobalPtr::new(Kind::Host, 0, 10, -1, 1), len: 3 }];
        let mut events = CompletionBundle::new();
        rput_irregular(&segments, &[&a, &b], &spans, &mut events);

        let mut get_events = CompletionBundle::new();
        assert_eq!(rma::rget(&segments, spans[0].ptr, 2, &mut get_events), vec![1, 2]);
        assert_eq!(rma::rget(&segments, spans[1].ptr, 3, &mut get_events), vec![3, 4, 5]);
    }

    #[test]
    fn strided_put_transposes_a_5x2_tile() {
        // A 5x2 tile (rows x cols), column-major in the source (stride 1
        // between rows within a column, stride `rows` between columns),
        // landed row-major in the destination (stride `cols` between
        // rows, stride 1 between columns) — exactly a transpose: the
        // element at source (r, c) ends up at destination row c, column r.
        let rows = 5;
        let cols = 2;
        let mut source = vec![0u8; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                // column-major source offset for (r, c)
                source[c * rows + r] = (r * cols + c) as u8;
            }
        }
        let segments = Segments::new(1, 32);
        let dest = GlobalPtr::new(Kind::Host, 0, 0, -1, 1);
        let mut events = CompletionBundle::new();
        // extents iterate dimension 0 = r in 0..rows, dimension 1 = c in 0..cols.
        rput_strided(&segments, &source, &[1, rows], dest, &[cols, 1], &[rows, cols], 1, &mut events);

        let mut get_events = CompletionBundle::new();
        let landed = rma::rget(&segments, dest, rows * cols, &mut get_events);
        for r in 0..rows {
            for c in 0..cols {
                // source (r, c) lands at destination row-major offset r*cols + c
                assert_eq!(landed[r * cols + c], source[c * rows + r]);
            }
        }
    }
}
