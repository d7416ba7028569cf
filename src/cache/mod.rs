//! Set-associative cache hierarchy: a single generic [`Cache`] monomorphised
//! per geometry (L1-I, L1-D, L2) instead of the source's per-kind macro
//! expansion, plus the per-set LRU bookkeeping and the eviction/promotion
//! protocol the hierarchy drives between L1 and L2.

mod entry;

pub use entry::{CacheEntry, LINE_BYTES, LOG_LINE_BYTES, LOG_WORDS_PER_LINE, WORDS_PER_LINE};

use crate::error::{Result, SimError};

/// The compile-time geometry of one cache level: number of sets (`LINES`)
/// and ways per set (`WAYS`). `WORDS_PER_LINE` is fixed crate-wide at 4.
pub trait CacheKind {
    const WAYS: usize;
    const LINES: usize;
    const NAME: &'static str;
}

#[derive(Clone, Copy)]
pub struct L1IKind;
impl CacheKind for L1IKind {
    const WAYS: usize = 4;
    const LINES: usize = 16;
    const NAME: &'static str = "L1-I";
}

#[derive(Clone, Copy)]
pub struct L1DKind;
impl CacheKind for L1DKind {
    const WAYS: usize = 4;
    const LINES: usize = 16;
    const NAME: &'static str = "L1-D";
}

#[derive(Clone, Copy)]
pub struct L2Kind;
impl CacheKind for L2Kind {
    const WAYS: usize = 8;
    const LINES: usize = 64;
    const NAME: &'static str = "L2";
}

/// The outcome of a tag lookup against a set. `Miss` also covers the
/// "early exit on the first invalid way" shortcut described in the data
/// model — sound only because every insertion path fills invalid ways
/// before ever evicting a valid one, and [`Cache::invalidate`]
/// left-compacts a set instead of punching a hole in the middle of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLookup {
    Hit { way: usize, index: usize },
    Miss,
}

/// A line evicted from one cache level on its way to becoming a candidate
/// for insertion into the next level down (the victim-caching protocol).
#[derive(Clone, Copy, Debug)]
pub struct Evicted {
    pub paddr: u32,
    pub line: [u32; WORDS_PER_LINE],
}

#[derive(Clone)]
pub struct Cache<K: CacheKind> {
    entries: Vec<CacheEntry>,
    _kind: std::marker::PhantomData<K>,
}

impl<K: CacheKind> Cache<K> {
    pub fn new() -> Self {
        Cache {
            entries: vec![CacheEntry::INVALID; K::LINES * K::WAYS],
            _kind: std::marker::PhantomData,
        }
    }

    pub fn flush(&mut self) {
        self.entries.fill(CacheEntry::INVALID);
    }

    fn slot(&self, index: usize, way: usize) -> usize {
        index * K::WAYS + way
    }

    pub fn entry(&self, index: usize, way: usize) -> CacheEntry {
        self.entries[self.slot(index, way)]
    }

    fn set_entry(&mut self, index: usize, way: usize, e: CacheEntry) {
        let slot = self.slot(index, way);
        self.entries[slot] = e;
    }

    /// `BadParameter` if `index`/`way` are out of range for this geometry.
    pub fn insert(&mut self, index: usize, way: usize, e: CacheEntry) -> Result<()> {
        if index >= K::LINES || way >= K::WAYS {
            return Err(SimError::bad_parameter(format!(
                "{} insert out of range: index={index} way={way}",
                K::NAME
            )));
        }
        self.set_entry(index, way, e);
        Ok(())
    }

    fn index_bits() -> u32 {
        K::LINES.trailing_zeros()
    }

    /// `(paddr / bytes_per_line) mod LINES`.
    pub fn index_of(paddr: u32) -> usize {
        ((paddr >> LOG_LINE_BYTES) as usize) % K::LINES
    }

    /// `paddr >> (index_bits + log2(line_bytes))`.
    pub fn tag_of(paddr: u32) -> u32 {
        paddr >> (LOG_LINE_BYTES + Self::index_bits())
    }

    fn reconstruct_addr(tag: u32, index: usize) -> u32 {
        (tag << (LOG_LINE_BYTES + Self::index_bits())) | ((index as u32) << LOG_LINE_BYTES)
    }

    /// Scans the set derived from `paddr` for a tag match. On hit, refreshes
    /// that way's LRU age. Stops at the first invalid way without scanning
    /// further (see [`CacheLookup`]) — sound only because [`Cache::invalidate`]
    /// left-compacts a set instead of leaving a hole in the middle of it.
    pub fn probe(&mut self, paddr: u32) -> CacheLookup {
        let index = Self::index_of(paddr);
        let tag = Self::tag_of(paddr);
        for way in 0..K::WAYS {
            let e = self.entry(index, way);
            if !e.valid {
                return CacheLookup::Miss;
            }
            if e.tag == tag {
                self.lru_age_update(index, way);
                return CacheLookup::Hit { way, index };
            }
        }
        CacheLookup::Miss
    }

    /// After inserting into a previously-empty slot: every other *valid*
    /// way's age is bumped (saturating at `WAYS-1`); the new way becomes 0.
    fn lru_age_increase(&mut self, index: usize, way: usize) {
        for w in 0..K::WAYS {
            if w == way {
                continue;
            }
            let mut e = self.entry(index, w);
            if e.valid && (e.age as usize) < K::WAYS - 1 {
                e.age += 1;
                self.set_entry(index, w, e);
            }
        }
        let mut chosen = self.entry(index, way);
        chosen.age = 0;
        self.set_entry(index, way, chosen);
    }

    /// On hit or full-set replacement: every way whose age was strictly less
    /// than `way`'s previous age is bumped; `way` becomes 0. Preserves the
    /// permutation invariant over the set's ages.
    fn lru_age_update(&mut self, index: usize, way: usize) {
        let prev_age = self.entry(index, way).age;
        for w in 0..K::WAYS {
            let mut e = self.entry(index, w);
            if e.age < prev_age {
                e.age += 1;
                self.set_entry(index, w, e);
            }
        }
        let mut chosen = self.entry(index, way);
        chosen.age = 0;
        self.set_entry(index, way, chosen);
    }

    /// Installs a full line at the set `paddr` derives, evicting the LRU way
    /// if the set is already full. Invalid ways are always preferred over
    /// eviction (the *find_place_in_l1*/*find_place_in_cache* protocol).
    pub fn insert_line(&mut self, paddr: u32, line: [u32; WORDS_PER_LINE]) -> Option<Evicted> {
        let index = Self::index_of(paddr);
        let tag = Self::tag_of(paddr);

        let mut empty_way = None;
        let mut victim_way = 0usize;
        let mut victim_age = 0u8;
        for way in 0..K::WAYS {
            let e = self.entry(index, way);
            if !e.valid {
                empty_way = Some(way);
                break;
            }
            if e.age >= victim_age {
                victim_age = e.age;
                victim_way = way;
            }
        }

        if let Some(way) = empty_way {
            self.set_entry(index, way, CacheEntry::new(tag, line));
            self.lru_age_increase(index, way);
            None
        } else {
            let victim = self.entry(index, victim_way);
            let evicted = Evicted {
                paddr: Self::reconstruct_addr(victim.tag, index),
                line: victim.line,
            };
            // Bump ages relative to the victim's age *before* overwriting its
            // slot — lru_age_update reads the current age at (index, way) to
            // decide who else moves, so it must run while that age is still
            // the victim's, not the incoming entry's.
            self.lru_age_update(index, victim_way);
            self.set_entry(index, victim_way, CacheEntry::new(tag, line));
            Some(evicted)
        }
    }

    /// Invalidates the entry at `(index, way)`, e.g. to implement the
    /// exclusive policy after promoting an L2 line into L1.
    ///
    /// Left-compacts the set: every valid way above `way` shifts down into
    /// the freed slot, so the set never holds an invalid way before a valid
    /// one. `probe`'s early exit on the first invalid way depends on that —
    /// without compaction a line resident in a higher way would become
    /// unreachable, reported as a miss and re-fetched while its stale copy
    /// stayed valid, breaking exclusivity between levels. Ages of the
    /// surviving valid ways are renormalized (every age greater than the
    /// removed way's age moves down by one) so they stay a dense permutation
    /// of `0..valid_count-1`.
    pub fn invalidate(&mut self, index: usize, way: usize) {
        let removed_age = self.entry(index, way).age;
        for w in way..K::WAYS - 1 {
            let next = self.entry(index, w + 1);
            self.set_entry(index, w, next);
        }
        self.set_entry(index, K::WAYS - 1, CacheEntry::INVALID);
        for w in 0..K::WAYS {
            let mut e = self.entry(index, w);
            if e.valid && e.age > removed_age {
                e.age -= 1;
                self.set_entry(index, w, e);
            }
        }
    }

    /// The ages of every valid way in `index`, for invariant checks and dumps.
    pub fn ages(&self, index: usize) -> Vec<u8> {
        (0..K::WAYS)
            .filter_map(|w| {
                let e = self.entry(index, w);
                e.valid.then_some(e.age)
            })
            .collect()
    }
}

impl<K: CacheKind> Default for Cache<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_bytes() -> usize {
        WORDS_PER_LINE * 4
    }

    #[test]
    fn flush_clears_every_entry() {
        let mut cache = Cache::<L1DKind>::new();
        cache.insert_line(0, [1, 2, 3, 4]);
        cache.flush();
        for index in 0..L1DKind::LINES {
            for way in 0..L1DKind::WAYS {
                assert_eq!(cache.entry(index, way), CacheEntry::INVALID);
            }
        }
    }

    #[test]
    fn cold_insert_fills_left_to_right_with_age_zero() {
        let mut cache = Cache::<L1DKind>::new();
        assert!(cache.insert_line(0, [1, 0, 0, 0]).is_none());
        assert_eq!(cache.entry(0, 0).age, 0);
        assert!(cache.entry(0, 0).valid);
        assert!(!cache.entry(0, 1).valid);
    }

    #[test]
    fn ages_form_a_permutation_after_filling_a_set() {
        let mut cache = Cache::<L1DKind>::new();
        let lb = line_bytes() as u32;
        for way in 0..L1DKind::WAYS {
            let paddr = way as u32 * (L1DKind::LINES as u32) * lb;
            assert!(cache.insert_line(paddr, [way as u32; WORDS_PER_LINE]).is_none());
        }
        let mut ages = cache.ages(0);
        ages.sort();
        assert_eq!(ages, (0..L1DKind::WAYS as u8).collect::<Vec<_>>());
    }

    #[test]
    fn eviction_targets_the_oldest_way_once_full() {
        let mut cache = Cache::<L1DKind>::new();
        let lb = line_bytes() as u32;
        let lines_mod = L1DKind::LINES as u32;
        for way in 0..L1DKind::WAYS {
            let paddr = way as u32 * lines_mod * lb;
            cache.insert_line(paddr, [way as u32; WORDS_PER_LINE]);
        }
        // Way 0 is now the coldest (age WAYS-1); inserting one more line
        // into the same set must evict it.
        let new_paddr = L1DKind::WAYS as u32 * lines_mod * lb;
        let evicted = cache.insert_line(new_paddr, [99; WORDS_PER_LINE]).unwrap();
        assert_eq!(evicted.line, [0; WORDS_PER_LINE]);
    }

    #[test]
    fn ages_stay_a_permutation_across_an_eviction() {
        let mut cache = Cache::<L1DKind>::new();
        let lb = line_bytes() as u32;
        let lines_mod = L1DKind::LINES as u32;
        for way in 0..L1DKind::WAYS {
            let paddr = way as u32 * lines_mod * lb;
            cache.insert_line(paddr, [way as u32; WORDS_PER_LINE]);
        }
        let new_paddr = L1DKind::WAYS as u32 * lines_mod * lb;
        cache.insert_line(new_paddr, [99; WORDS_PER_LINE]);

        let mut ages = cache.ages(0);
        ages.sort();
        assert_eq!(ages, (0..L1DKind::WAYS as u8).collect::<Vec<_>>());

        match cache.probe(new_paddr) {
            CacheLookup::Hit { way, index } => assert_eq!(cache.entry(index, way).age, 0),
            CacheLookup::Miss => panic!("freshly inserted line must hit"),
        }
    }

    #[test]
    fn probe_hits_on_matching_tag_and_refreshes_lru() {
        let mut cache = Cache::<L1DKind>::new();
        cache.insert_line(0, [7, 7, 7, 7]);
        match cache.probe(0) {
            CacheLookup::Hit { way, index } => {
                assert_eq!(way, 0);
                assert_eq!(index, 0);
            }
            CacheLookup::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn probe_misses_on_a_never_touched_set() {
        let mut cache = Cache::<L1DKind>::new();
        assert_eq!(cache.probe(0x1000), CacheLookup::Miss);
    }

    #[test]
    fn index_and_tag_reconstruct_the_original_line_address() {
        let paddr = 0x1234_5670u32;
        let line_paddr = paddr & !(LINE_BYTES as u32 - 1);
        let index = Cache::<L2Kind>::index_of(paddr);
        let tag = Cache::<L2Kind>::tag_of(paddr);
        assert_eq!(Cache::<L2Kind>::reconstruct_addr(tag, index), line_paddr);
    }

    #[test]
    fn invalidate_renormalizes_surviving_ages_to_a_dense_permutation() {
        let mut cache = Cache::<L1DKind>::new();
        let lb = line_bytes() as u32;
        let lines_mod = L1DKind::LINES as u32;
        for way in 0..L1DKind::WAYS {
            let paddr = way as u32 * lines_mod * lb;
            cache.insert_line(paddr, [way as u32; WORDS_PER_LINE]);
        }
        // Way 1 (age WAYS-2) becomes the most-recently-used, age 0.
        let hit_paddr = 1 * lines_mod * lb;
        cache.probe(hit_paddr);
        cache.invalidate(0, 0);

        let mut ages = cache.ages(0);
        ages.sort();
        assert_eq!(ages, (0..L1DKind::WAYS as u8 - 1).collect::<Vec<_>>());
    }

    #[test]
    fn invalidate_left_compacts_so_a_higher_way_stays_reachable() {
        let mut cache = Cache::<L1DKind>::new();
        let lb = line_bytes() as u32;
        let lines_mod = L1DKind::LINES as u32;
        let paddr0 = 0u32;
        let paddr1 = 1 * lines_mod * lb;
        cache.insert_line(paddr0, [1; WORDS_PER_LINE]);
        cache.insert_line(paddr1, [2; WORDS_PER_LINE]);

        // Drop the way-0 entry; the way-1 entry must remain reachable by probe
        // rather than stranded behind the now-invalid way 0.
        cache.invalidate(0, 0);
        match cache.probe(paddr1) {
            CacheLookup::Hit { way, .. } => assert_eq!(way, 0),
            CacheLookup::Miss => panic!("compacted entry must still be reachable"),
        }
    }
}
