//! Fragment storage, overlap resolution, and datagram compaction.
//!
//! Implements the "classic BSD reassembly policy" from the specification: on overlap, existing
//! bytes are trusted and the overlapping portion of the *new* fragment is discarded before
//! anything is stored, so memory accounting only ever grows by bytes that were actually kept.

/// One contiguous, non-overlapping span of a datagram's payload.
#[derive(Debug, Clone)]
pub(crate) struct Fragment {
    pub(crate) offset: u32,
    pub(crate) end: u32,
    pub(crate) data: Vec<u8>,
}

impl Fragment {
    pub(crate) fn mem_len(&self) -> u32 {
        self.data.len() as u32
    }
}

/// Inserts `data` (spanning `[offset, end)`) into `fragments`, discarding any sub-range that
/// overlaps a fragment already present. Returns `(bytes_inserted, bytes_discarded)`.
///
/// `fragments` is kept sorted by `offset` and is an invariant-preserving non-overlapping list on
/// return.
pub(crate) fn insert_fragment(
    fragments: &mut Vec<Fragment>,
    data: &[u8],
    offset: u32,
    end: u32,
) -> (u32, u32) {
    debug_assert_eq!((end - offset) as usize, data.len());

    let mut keep = vec![(offset, end)];
    for frag in fragments.iter() {
        if frag.end <= offset || frag.offset >= end {
            continue;
        }
        let mut next_keep = Vec::with_capacity(keep.len());
        for (s, e) in keep {
            if frag.end <= s || frag.offset >= e {
                next_keep.push((s, e));
                continue;
            }
            if frag.offset > s {
                next_keep.push((s, frag.offset));
            }
            if frag.end < e {
                next_keep.push((frag.end, e));
            }
        }
        keep = next_keep;
        if keep.is_empty() {
            break;
        }
    }

    let span = end - offset;
    let mut inserted = 0u32;
    for (s, e) in keep {
        let rel_start = (s - offset) as usize;
        let rel_end = (e - offset) as usize;
        inserted += e - s;
        let frag = Fragment { offset: s, end: e, data: data[rel_start..rel_end].to_vec() };
        let pos = fragments.partition_point(|f| f.offset < s);
        fragments.insert(pos, frag);
    }
    let discarded = span - inserted;
    (inserted, discarded)
}

/// Returns `true` if `fragments` forms a single contiguous run covering `[0, len)`.
pub(crate) fn is_contiguous(fragments: &[Fragment], len: u32) -> bool {
    if fragments.is_empty() {
        return len == 0;
    }
    if fragments[0].offset != 0 {
        return false;
    }
    for pair in fragments.windows(2) {
        if pair[0].end != pair[1].offset {
            return false;
        }
    }
    fragments.last().map(|f| f.end) == Some(len)
}

/// Copies the (assumed contiguous, per [`is_contiguous`]) fragment list into one buffer.
pub(crate) fn compact(fragments: &[Fragment], len: u32) -> Vec<u8> {
    let mut out = vec![0u8; len as usize];
    for frag in fragments {
        out[frag.offset as usize..frag.end as usize].copy_from_slice(&frag.data);
    }
    out
}
