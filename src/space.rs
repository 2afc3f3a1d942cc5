//! A single open-addressed bucket array with Robin Hood probing.

use crate::bucket::Bucket;
use crate::index::hindex;

/// One bucket array plus the probe-length bookkeeping the `Map` needs to
/// reason about it: its size as `log2size`/`mask`/`shift`, a hard probe
/// ceiling (`offset_limit`) that forces the `Map` to grow, and the largest
/// `offset` it has ever actually placed (`max_offset`), which bounds how far
/// a negative lookup has to scan.
///
/// Storage is allocated lazily: a freshly constructed or fully-migrated
/// `Space` holds `buckets: None` and only grows a `Box<[Bucket]>` on its
/// first insertion, mirroring the "buckets array is not yet allocated" step
/// of the resize protocol.
#[derive(Debug)]
pub(crate) struct Space {
    pub log2size: u32,
    pub mask: u32,
    pub shift: u32,
    pub offset_limit: u32,
    pub max_offset: u32,
    buckets: Option<Box<[Bucket]>>,
}

/// Outcome of [`Space::insert`]: where the caller's key ended up, and whether
/// it was already present.
pub(crate) struct InsertResult {
    pub index: usize,
    pub exists: bool,
}

impl Space {
    /// Builds an empty, unallocated `Space` of `2^log2size` buckets, with a
    /// probe ceiling of `offset_mult * log2size`.
    pub(crate) fn new(log2size: u32, offset_mult: u32) -> Self {
        debug_assert!((5..=32).contains(&log2size));
        Self {
            log2size,
            mask: (1u32 << log2size) - 1,
            shift: 32 - log2size,
            offset_limit: offset_mult * log2size,
            max_offset: 0,
            buckets: None,
        }
    }

    #[inline]
    pub(crate) fn size(&self) -> u32 {
        1u32 << self.log2size
    }

    #[inline]
    pub(crate) fn is_allocated(&self) -> bool {
        self.buckets.is_some()
    }

    /// Drops the backing storage, returning the `Space` to its freshly-built
    /// state. Called when a `Space` is fully migrated away or the `Map` is
    /// emptied.
    pub(crate) fn free(&mut self) {
        self.buckets = None;
        self.max_offset = 0;
    }

    #[inline]
    fn home(&self, key: u32) -> usize {
        hindex(key, self.shift, self.mask)
    }

    fn slots(&mut self) -> &mut [Bucket] {
        self.buckets
            .get_or_insert_with(|| vec![Bucket::empty(); self.size() as usize].into_boxed_slice())
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> &Bucket {
        &self.buckets.as_ref().expect("Space storage accessed before first insert")[index]
    }

    /// Iterates every slot in allocation order, for diagnostics only. Yields
    /// nothing for an unallocated `Space`.
    pub(crate) fn iter(&self) -> std::slice::Iter<'_, Bucket> {
        self.buckets.as_deref().unwrap_or(&[]).iter()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: usize) -> &mut Bucket {
        &mut self.buckets.as_mut().expect("Space storage accessed before first insert")[index]
    }

    /// Robin Hood insertion: walks forward from `key`'s home slot, stealing
    /// the slot of any resident whose `offset` is strictly smaller than the
    /// candidate's running `offset` ("rich steals from poor"), until an
    /// empty slot is reached.
    ///
    /// Returns the index the caller's key ended up at even if it was later
    /// displaced by a steal performed during this same call, and whether the
    /// key already existed (in which case nothing was mutated).
    pub(crate) fn insert(&mut self, key: u32, value: i32) -> InsertResult {
        let mask = self.mask;
        let mut index = self.home(key);
        let mut candidate = Bucket { key, value, offset: 0, inuse: true };
        let mut landed_at: Option<usize> = None;
        let mut max_offset_seen = 0u32;

        loop {
            let slot = self.slots();
            let resident = slot[index];
            if !resident.inuse {
                break;
            }
            if resident.key == candidate.key {
                return InsertResult { index, exists: true };
            }
            if resident.offset < candidate.offset {
                if landed_at.is_none() {
                    landed_at = Some(index);
                }
                max_offset_seen = max_offset_seen.max(resident.offset);
                slot[index] = candidate;
                candidate = resident;
            }
            index = (index + 1) & mask as usize;
            candidate.offset += 1;
        }

        max_offset_seen = max_offset_seen.max(candidate.offset);
        self.slots()[index] = candidate;
        let landed_at = landed_at.unwrap_or(index);
        if max_offset_seen > self.max_offset {
            self.max_offset = max_offset_seen;
        }
        InsertResult { index: landed_at, exists: false }
    }

    /// Scans from `key`'s home slot for at most `offset_bound + 1` slots,
    /// returning the index of the first in-use match.
    ///
    /// Unlike a textbook Robin Hood lookup this never stops at an empty
    /// slot: the previous `Space` during migration uses lazy deletion and
    /// can contain empty gaps inside an otherwise-live probe chain, so the
    /// only sound stopping rule is the caller-supplied bound.
    pub(crate) fn fetch(&self, key: u32, offset_bound: u32) -> Option<usize> {
        if !self.is_allocated() {
            return None;
        }
        let mut index = self.home(key);
        for _ in 0..=offset_bound {
            let bucket = self.get(index);
            if bucket.inuse && bucket.key == key {
                return Some(index);
            }
            index = (index + 1) & self.mask as usize;
        }
        None
    }

    /// Backward-shift removal: clears the matching slot, then pulls every
    /// following resident with positive `offset` one slot to the left,
    /// decrementing its `offset`, until an empty slot or a zero-`offset`
    /// resident is reached.
    ///
    /// Only valid on a `Space` without lazy gaps (the current `Space`); the
    /// previous `Space` during migration must use lazy-clear instead, since
    /// backward-shifting it would disturb probe chains a concurrent lookup
    /// relies on.
    pub(crate) fn remove(&mut self, key: u32) -> bool {
        if !self.is_allocated() {
            return false;
        }
        let mask = self.mask as usize;
        let mut index = self.home(key);
        let mut found = None;
        for _ in 0..self.offset_limit {
            let bucket = *self.get(index);
            if !bucket.inuse {
                break;
            }
            if bucket.key == key {
                found = Some(index);
                break;
            }
            index = (index + 1) & mask;
        }
        let Some(mut hole) = found else {
            return false;
        };
        self.get_mut(hole).inuse = false;

        loop {
            let next = (hole + 1) & mask;
            let mut neighbor = *self.get(next);
            if !neighbor.inuse || neighbor.offset == 0 {
                break;
            }
            neighbor.offset -= 1;
            *self.get_mut(hole) = neighbor;
            self.get_mut(next).inuse = false;
            hole = next;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_chain_is_robin_hood_ordered(space: &Space, size: u32) {
        for home in 0..size {
            let mut last_offset: Option<u32> = None;
            let mut i = home;
            loop {
                let b = space.get(i as usize);
                if !b.inuse {
                    break;
                }
                if let Some(prev) = last_offset {
                    if b.offset == 0 {
                        break; // a new probe chain starting here
                    }
                    assert!(b.offset >= prev);
                }
                last_offset = Some(b.offset);
                i = (i + 1) & space.mask;
                if i == home {
                    break;
                }
            }
        }
    }

    #[test]
    fn insert_then_fetch_roundtrip() {
        let mut space = Space::new(5, 1);
        for k in 0..20u32 {
            let r = space.insert(k, k as i32 + 1);
            assert!(!r.exists);
        }
        for k in 0..20u32 {
            let idx = space.fetch(k, space.max_offset).expect("present");
            assert_eq!(space.get(idx).value, k as i32 + 1);
        }
        live_chain_is_robin_hood_ordered(&space, space.size());
    }

    #[test]
    fn insert_existing_key_reports_exists_without_mutating() {
        let mut space = Space::new(5, 1);
        space.insert(7, 100);
        let r = space.insert(7, 200);
        assert!(r.exists);
        assert_eq!(space.get(r.index).value, 100);
    }

    #[test]
    fn remove_then_lookup_misses() {
        let mut space = Space::new(5, 1);
        for k in 0..10u32 {
            space.insert(k, k as i32);
        }
        assert!(space.remove(3));
        assert!(space.fetch(3, space.max_offset).is_none());
        for k in [0, 1, 2, 4, 5, 6, 7, 8, 9] {
            assert!(space.fetch(k, space.max_offset).is_some());
        }
        live_chain_is_robin_hood_ordered(&space, space.size());
    }

    #[test]
    fn remove_missing_key_returns_false() {
        let mut space = Space::new(5, 1);
        space.insert(1, 1);
        assert!(!space.remove(999));
    }
}
