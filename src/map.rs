//! The public `RobinHoodMap` and its incremental two-space migration engine.

use crate::config::{Config, MIGRATE_ALL};
use crate::space::Space;

/// Identifies one of the map's two physical `Space`s, independent of which
/// one is currently labeled "current". A [`PutEntry`] is tagged with a
/// `Slot` rather than "current"/"previous" so that a resize triggered later
/// in the same call (which flips the labels) can't invalidate the tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    A,
    B,
}

/// An open-addressed map from `u32` keys to `i32` values.
///
/// Uses Robin Hood linear probing with backward-shift deletion (no
/// tombstones) inside each of two `Space`s, and migrates entries from the
/// previous `Space` to the current one in small batches driven by
/// subsequent mutating calls, so a single grow or shrink never pays for a
/// full rehash in one call.
///
/// The map is single-threaded: it holds no locks or atomics, and
/// `&mut self` is required for every mutation, so Rust's borrow checker
/// already forbids any concurrent access the container itself does not
/// defend against.
#[derive(Debug)]
pub struct RobinHoodMap {
    a: Space,
    b: Space,
    current_is_a: bool,
    count: usize,
    min_log2size: u32,
    grow_load: f64,
    shrink_load: f64,
    offset_mult: u32,
    batch_size: u32,
    grow_count: u32,
    shrink_count: u32,
    to_migrate: u32,
    migrate_pos: u32,
}

/// The result of [`RobinHoodMap::put`].
///
/// Borrows the map for as long as it is alive, so the borrow checker, not a
/// runtime contract, forbids any further mutating call on the map while an
/// entry is in hand.
pub struct PutEntry<'a> {
    map: &'a RobinHoodMap,
    slot: Slot,
    index: usize,
    existed: bool,
}

impl<'a> PutEntry<'a> {
    #[inline]
    fn bucket(&self) -> &crate::bucket::Bucket {
        match self.slot {
            Slot::A => self.map.a.get(self.index),
            Slot::B => self.map.b.get(self.index),
        }
    }

    /// The key this entry was put under.
    pub fn key(&self) -> u32 {
        self.bucket().key
    }

    /// The value currently stored for this key.
    ///
    /// If `existed()` is `true`, this is the *old* value: `put` never
    /// overwrites an existing key.
    pub fn value(&self) -> i32 {
        self.bucket().value
    }

    /// `true` if the key already existed in the map before this call, in
    /// which case the stored value was left unmodified.
    pub fn existed(&self) -> bool {
        self.existed
    }
}

impl Default for RobinHoodMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RobinHoodMap {
    /// Builds a map with the default configuration (`min_log2size = 5`,
    /// `grow_load = 0.7`, `shrink_load = 0.25`, `offset_mult = 1`,
    /// `batch_size = 4`).
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Builds a map with a custom minimum size, defaults otherwise.
    pub fn with_min_log2size(log2size: u32) -> Self {
        Self::with_config(Config::new(
            log2size,
            crate::config::DEFAULT_GROW_LOAD,
            crate::config::DEFAULT_SHRINK_LOAD,
            crate::config::DEFAULT_OFFSET_MULT,
            crate::config::DEFAULT_BATCH_SIZE,
        ))
    }

    /// Builds a map sized so that populating it with `min_items` entries
    /// does not, by itself, trigger a grow. The chosen size is used as a
    /// *minimum*: a grow can still trigger later if the map grows past
    /// `min_items`.
    pub fn with_capacity(min_items: usize) -> Self {
        let log2size = Config::for_capacity(min_items, crate::config::DEFAULT_GROW_LOAD);
        Self::with_min_log2size(log2size)
    }

    /// Builds a map from a fully validated [`Config`].
    pub fn with_config(config: Config) -> Self {
        let log2size = config.min_log2size();
        let offset_mult = config.offset_mult();
        let mut map = Self {
            a: Space::new(log2size, offset_mult),
            b: Space::new(log2size, offset_mult),
            current_is_a: true,
            count: 0,
            min_log2size: log2size,
            grow_load: config.grow_load(),
            shrink_load: config.shrink_load(),
            offset_mult,
            batch_size: config.batch_size(),
            grow_count: 0,
            shrink_count: 0,
            to_migrate: 0,
            migrate_pos: 0,
        };
        map.recompute_thresholds();
        map
    }

    #[inline]
    fn current(&self) -> &Space {
        if self.current_is_a { &self.a } else { &self.b }
    }

    #[inline]
    fn current_mut(&mut self) -> &mut Space {
        if self.current_is_a { &mut self.a } else { &mut self.b }
    }

    #[inline]
    fn previous(&self) -> &Space {
        if self.current_is_a { &self.b } else { &self.a }
    }

    #[inline]
    fn previous_mut(&mut self) -> &mut Space {
        if self.current_is_a { &mut self.b } else { &mut self.a }
    }

    #[inline]
    fn current_slot(&self) -> Slot {
        if self.current_is_a { Slot::A } else { Slot::B }
    }

    #[inline]
    fn previous_slot(&self) -> Slot {
        if self.current_is_a { Slot::B } else { Slot::A }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.count
    }

    /// `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `log2size` of the current `Space`, exposed for diagnostics and tests
    /// (e.g. "at least one grow has occurred").
    pub fn current_log2size(&self) -> u32 {
        self.current().log2size
    }

    /// `true` while a grow or shrink is mid-migration: the previous `Space`
    /// still holds entries not yet moved into the current one.
    pub fn is_migrating(&self) -> bool {
        self.to_migrate > 0
    }

    /// Inserts `key -> value`, or reports the existing entry unmodified.
    ///
    /// During an active migration, a key still resident in the previous
    /// `Space` is reported as existing (without advancing migration) before
    /// anything else happens; otherwise one migration batch is advanced and
    /// the key is inserted (or found) in the current `Space`.
    pub fn put(&mut self, key: u32, value: i32) -> PutEntry<'_> {
        if self.is_migrating() {
            let prev_bound = self.previous().max_offset;
            if let Some(index) = self.previous().fetch(key, prev_bound) {
                let slot = self.previous_slot();
                return PutEntry { map: self, slot, index, existed: true };
            }
            self.migrate_batch();
        }

        let result = self.current_mut().insert(key, value);
        let mut slot = self.current_slot();
        let mut index = result.index;
        if !result.exists {
            self.count += 1;
            if !self.is_migrating()
                && (self.current().max_offset >= self.current().offset_limit
                    || self.count as u32 >= self.grow_count)
            {
                self.trigger_resize(1);
                // With `batch_size == MIGRATE_ALL`, the resize above just
                // drained the Space `slot`/`index` pointed into and freed
                // it, carrying the key we inserted over to the new current
                // Space. Re-resolve its location so the entry we return
                // never points at freed storage. A batched resize leaves
                // `is_migrating()` true and the key untouched in place, so
                // this only re-resolves when the drain actually completed.
                if !self.is_migrating() {
                    slot = self.current_slot();
                    index = self
                        .current()
                        .fetch(key, self.current().max_offset)
                        .expect("just-inserted key must be present after a completed resize");
                }
            }
        }

        PutEntry { map: self, slot, index, existed: result.exists }
    }

    /// Looks up `key`, consulting the previous `Space` too while a
    /// migration is in flight. Never advances migration.
    pub fn get(&self, key: u32) -> Option<&i32> {
        if let Some(index) = self.current().fetch(key, self.current().max_offset) {
            return Some(&self.current().get(index).value);
        }
        if self.is_migrating() {
            if let Some(index) = self.previous().fetch(key, self.previous().max_offset) {
                return Some(&self.previous().get(index).value);
            }
        }
        None
    }

    /// Removes `key`, returning whether it was present.
    ///
    /// During an active migration a hit in the previous `Space` is cleared
    /// lazily (no backward shift, since the previous `Space` is a
    /// read-mostly shadow other in-flight lookups still rely on) and
    /// migration is advanced by one batch. A miss there falls through to a
    /// full backward-shift removal on the current `Space`, which may
    /// trigger a shrink.
    pub fn remove(&mut self, key: u32) -> bool {
        if self.is_migrating() {
            let prev_bound = self.previous().max_offset;
            if let Some(index) = self.previous().fetch(key, prev_bound) {
                self.previous_mut().get_mut(index).inuse = false;
                self.count -= 1;
                self.migrate_batch();
                return true;
            }
        }

        if self.current_mut().remove(key) {
            self.count -= 1;
            if !self.is_migrating() {
                // A drain to zero always frees both Spaces, even once the
                // current Space is already at `min_log2size` and the
                // ordinary shrink-load trigger below would not fire.
                if self.count == 0 {
                    self.trigger_resize(-1);
                } else if self.count as u32 <= self.shrink_count
                    && self.current().log2size > self.min_log2size
                {
                    self.trigger_resize(-1);
                }
            }
            return true;
        }

        false
    }

    /// Diagnostic text dump of both `Space`s. Advisory only: no test parses
    /// this output, and the format may change at any time.
    pub fn dump(&self, include_empties: bool) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "current: log2size={} count={} max_offset={} offset_limit={}",
            self.current().log2size,
            self.count,
            self.current().max_offset,
            self.current().offset_limit
        );
        Self::dump_space(&mut out, self.current().iter(), include_empties);

        if self.is_migrating() {
            let _ = writeln!(
                out,
                "previous: log2size={} to_migrate={} migrate_pos={}",
                self.previous().log2size,
                self.to_migrate,
                self.migrate_pos
            );
            Self::dump_space(&mut out, self.previous().iter(), include_empties);
        }
        out
    }

    fn dump_space<'b>(
        out: &mut String,
        buckets: impl Iterator<Item = &'b crate::bucket::Bucket>,
        include_empties: bool,
    ) {
        use std::fmt::Write;
        for (i, bucket) in buckets.enumerate() {
            if bucket.inuse || include_empties {
                let _ = writeln!(
                    out,
                    "  [{:>8}] key={} value={} offset={} inuse={}",
                    i, bucket.key, bucket.value, bucket.offset, bucket.inuse
                );
            }
        }
    }

    fn recompute_thresholds(&mut self) {
        let size = self.current().size() as f64;
        let mask = self.current().mask;
        self.grow_count = ((size * self.grow_load) as u32).min(mask);
        self.shrink_count = (size * self.shrink_load) as u32;
    }

    /// Starts a grow (`dir = 1`) or shrink (`dir = -1`), or, if the map is
    /// empty, resets both `Space`s to `min_log2size` with no migration
    /// enqueued.
    fn trigger_resize(&mut self, dir: i32) {
        if self.count == 0 {
            self.a.free();
            self.b.free();
            let reset = Space::new(self.min_log2size, self.offset_mult);
            *self.current_mut() = reset;
            *self.previous_mut() = Space::new(self.min_log2size, self.offset_mult);
            self.to_migrate = 0;
            self.migrate_pos = 0;
            self.recompute_thresholds();
            return;
        }

        let new_log2 = (self.current().log2size as i32 + dir).max(self.min_log2size as i32) as u32;
        self.to_migrate = self.current().size();
        self.migrate_pos = 0;
        self.current_is_a = !self.current_is_a;
        *self.current_mut() = Space::new(new_log2, self.offset_mult);
        self.recompute_thresholds();

        if self.batch_size == MIGRATE_ALL {
            self.migrate_step(self.to_migrate);
        }
    }

    /// Advances migration by the configured batch size (or the whole
    /// remaining migration, if `batch_size` is the migrate-all sentinel).
    fn migrate_batch(&mut self) {
        let batch = if self.batch_size == MIGRATE_ALL { self.to_migrate } else { self.batch_size };
        self.migrate_step(batch);
    }

    fn migrate_step(&mut self, batch: u32) {
        let mut moved = 0;
        while self.to_migrate > 0 && moved < batch {
            let pos = self.migrate_pos as usize;
            let bucket = *self.previous().get(pos);
            if bucket.inuse {
                self.current_mut().insert(bucket.key, bucket.value);
                self.previous_mut().get_mut(pos).inuse = false;
            }
            self.migrate_pos += 1;
            self.to_migrate -= 1;
            moved += 1;
        }
        if self.to_migrate == 0 {
            self.previous_mut().free();
            self.migrate_pos = 0;
        }
    }
}
