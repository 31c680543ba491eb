//! Content-Addressed Dedup Layer
//!
//! Sits over a parent allocator and interns stored byte blobs: storing
//! the same bytes twice under one tag returns the same pointer. Equal
//! bytes deliberately alias; equality of values stays value-equality,
//! identity is never observable through the value API.
//!
//! Per tag: a bucket table of xxhash64 fingerprints, fronted by a Bloom
//! filter that rejects most cold misses before the bucket walk. Blobs
//! under `dedup_threshold` bypass the table entirely; their bookkeeping
//! would cost more than the duplicate bytes.

use super::{AllocCaps, AllocTag, Relocation, Strategy, TagAllocator, TagInfo};
use std::collections::HashMap;
use std::hash::Hasher;
use twox_hash::XxHash64;

const FINGERPRINT_SEED: u64 = 0;

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Initial bucket count per tag is `2^bucket_count_bits`.
    pub bucket_count_bits: u32,
    /// Bloom filter size per tag, in bits.
    pub bloom_filter_bits: u32,
    /// Blobs smaller than this are stored without dedup.
    pub dedup_threshold: usize,
    /// A chain longer than this arms the bucket-table doubling check.
    pub chain_length_grow_trigger: usize,
    /// Doubling also requires at least this entries-per-bucket ratio.
    pub minimum_bucket_occupancy: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            bucket_count_bits: 7,
            bloom_filter_bits: 8192,
            dedup_threshold: 16,
            chain_length_grow_trigger: 8,
            minimum_bucket_occupancy: 0.5,
        }
    }
}

struct Entry {
    hash: u64,
    ptr: *const u8,
    len: usize,
}

struct TagDedup {
    buckets: Vec<Vec<Entry>>,
    bloom: Box<[u64]>,
    entries: usize,
}

impl TagDedup {
    fn new(config: &DedupConfig) -> TagDedup {
        let bucket_count = 1usize << config.bucket_count_bits;
        let bloom_words = (config.bloom_filter_bits as usize).div_ceil(64).max(1);
        TagDedup {
            buckets: (0..bucket_count).map(|_| Vec::new()).collect(),
            bloom: vec![0u64; bloom_words].into_boxed_slice(),
            entries: 0,
        }
    }

    fn bloom_indices(&self, hash: u64, bits: u32) -> (usize, usize) {
        let bits = u64::from(bits.max(1));
        let first = (hash % bits) as usize;
        let second = (hash.rotate_right(32) % bits) as usize;
        (first, second)
    }

    fn bloom_maybe_contains(&self, hash: u64, bits: u32) -> bool {
        let (a, b) = self.bloom_indices(hash, bits);
        self.bloom[a / 64] & (1 << (a % 64)) != 0 && self.bloom[b / 64] & (1 << (b % 64)) != 0
    }

    fn bloom_insert(&mut self, hash: u64, bits: u32) {
        let (a, b) = self.bloom_indices(hash, bits);
        self.bloom[a / 64] |= 1 << (a % 64);
        self.bloom[b / 64] |= 1 << (b % 64);
    }

    fn find(&self, hash: u64, len: usize, segments: &[&[u8]]) -> Option<*const u8> {
        let bucket = &self.buckets[(hash as usize) & (self.buckets.len() - 1)];
        bucket
            .iter()
            .find(|e| e.hash == hash && e.len == len && stored_equals(e.ptr, e.len, segments))
            .map(|e| e.ptr)
    }

    fn insert(&mut self, hash: u64, ptr: *const u8, len: usize, config: &DedupConfig) {
        let mask = self.buckets.len() - 1;
        let index = (hash as usize) & mask;
        self.buckets[index].push(Entry { hash, ptr, len });
        self.entries += 1;
        self.bloom_insert(hash, config.bloom_filter_bits);

        let occupancy = self.entries as f64 / self.buckets.len() as f64;
        if self.buckets[index].len() > config.chain_length_grow_trigger
            && occupancy > config.minimum_bucket_occupancy
        {
            self.grow();
        }
    }

    /// Double the bucket table and redistribute every entry.
    fn grow(&mut self) {
        let new_count = self.buckets.len() * 2;
        let mut new_buckets: Vec<Vec<Entry>> = (0..new_count).map(|_| Vec::new()).collect();
        for bucket in self.buckets.drain(..) {
            for entry in bucket {
                new_buckets[(entry.hash as usize) & (new_count - 1)].push(entry);
            }
        }
        tracing::debug!(buckets = new_count, "dedup bucket table doubled");
        self.buckets = new_buckets;
    }
}

fn hash_segments(segments: &[&[u8]]) -> u64 {
    let mut hasher = XxHash64::with_seed(FINGERPRINT_SEED);
    for seg in segments {
        hasher.write(seg);
    }
    hasher.finish()
}

fn stored_equals(ptr: *const u8, len: usize, segments: &[&[u8]]) -> bool {
    let stored = unsafe { std::slice::from_raw_parts(ptr, len) };
    let mut off = 0;
    for seg in segments {
        if stored[off..off + seg.len()] != **seg {
            return false;
        }
        off += seg.len();
    }
    true
}

pub struct DedupAllocator {
    parent: Box<dyn TagAllocator>,
    config: DedupConfig,
    tags: HashMap<AllocTag, TagDedup>,
}

// Safety: entry pointers refer to parent-owned storage; both the parent
// and the tables are reached only through `&mut self`.
unsafe impl Send for DedupAllocator {}

impl DedupAllocator {
    pub fn new(parent: Box<dyn TagAllocator>, config: DedupConfig) -> DedupAllocator {
        DedupAllocator {
            parent,
            config,
            tags: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Interned blob count under `tag`.
    pub fn entry_count(&self, tag: AllocTag) -> usize {
        self.tags.get(&tag).map_or(0, |t| t.entries)
    }
}

impl TagAllocator for DedupAllocator {
    fn strategy(&self) -> Strategy {
        Strategy::Dedup
    }

    fn caps(&self) -> AllocCaps {
        // Individual free would break aliased blobs, so the capability
        // is masked off whatever the parent claims.
        (self.parent.caps() - AllocCaps::FREE_INDIVIDUAL)
            | AllocCaps::DEDUP
            | AllocCaps::LOOKUP
    }

    fn acquire_tag(&mut self) -> Option<AllocTag> {
        let tag = self.parent.acquire_tag()?;
        self.tags.insert(tag, TagDedup::new(&self.config));
        Some(tag)
    }

    fn release_tag(&mut self, tag: AllocTag) {
        self.tags.remove(&tag);
        self.parent.release_tag(tag);
    }

    fn reset_tag(&mut self, tag: AllocTag) {
        if let Some(state) = self.tags.get_mut(&tag) {
            *state = TagDedup::new(&self.config);
        }
        self.parent.reset_tag(tag);
    }

    fn trim_tag(&mut self, tag: AllocTag) {
        self.parent.trim_tag(tag);
    }

    fn alloc(&mut self, tag: AllocTag, size: usize, align: usize) -> *mut u8 {
        // Raw allocations hand out writable memory; only `store` dedups.
        self.parent.alloc(tag, size, align)
    }

    fn storev(&mut self, tag: AllocTag, segments: &[&[u8]], align: usize) -> *const u8 {
        let total: usize = segments.iter().map(|s| s.len()).sum();
        if total < self.config.dedup_threshold {
            return self.parent.storev(tag, segments, align);
        }
        let Some(state) = self.tags.get(&tag) else {
            return std::ptr::null();
        };
        let hash = hash_segments(segments);
        if state.bloom_maybe_contains(hash, self.config.bloom_filter_bits) {
            if let Some(ptr) = state.find(hash, total, segments) {
                tracing::trace!(len = total, "dedup hit");
                return ptr;
            }
        }
        let ptr = self.parent.storev(tag, segments, align);
        if ptr.is_null() {
            return ptr;
        }
        let config = self.config;
        self.tags
            .get_mut(&tag)
            .expect("tag checked above")
            .insert(hash, ptr, total, &config);
        ptr
    }

    fn lookupv(&self, tag: AllocTag, segments: &[&[u8]], _align: usize) -> *const u8 {
        let total: usize = segments.iter().map(|s| s.len()).sum();
        let Some(state) = self.tags.get(&tag) else {
            return std::ptr::null();
        };
        if total < self.config.dedup_threshold {
            return std::ptr::null();
        }
        let hash = hash_segments(segments);
        if !state.bloom_maybe_contains(hash, self.config.bloom_filter_bits) {
            return std::ptr::null();
        }
        state
            .find(hash, total, segments)
            .unwrap_or(std::ptr::null())
    }

    fn contains(&self, ptr: *const u8) -> bool {
        self.parent.contains(ptr)
    }

    fn tag_linear_size(&self, tag: AllocTag) -> usize {
        self.parent.tag_linear_size(tag)
    }

    fn tag_linear(&self, tag: AllocTag) -> Option<(*const u8, usize)> {
        self.parent.tag_linear(tag)
    }

    fn tag_info(&self, tag: AllocTag) -> Option<TagInfo> {
        self.parent.tag_info(tag)
    }

    fn take_relocations(&mut self, tag: AllocTag) -> Vec<Relocation> {
        self.parent.take_relocations(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{GrowAllocator, GrowConfig, LinearAllocator};

    fn dedup_over_grow() -> DedupAllocator {
        DedupAllocator::new(
            Box::new(GrowAllocator::new(GrowConfig::default())),
            DedupConfig::default(),
        )
    }

    #[test]
    fn test_store_is_idempotent() {
        let mut a = dedup_over_grow();
        let tag = a.acquire_tag().unwrap();
        let blob = b"a blob well over the dedup threshold";
        let p1 = a.store(tag, blob, 8);
        let p2 = a.store(tag, blob, 8);
        assert!(!p1.is_null());
        assert_eq!(p1, p2);
        assert_eq!(a.entry_count(tag), 1);
        a.release_tag(tag);
    }

    #[test]
    fn test_threshold_bypasses_dedup() {
        let mut a = dedup_over_grow();
        let tag = a.acquire_tag().unwrap();
        let p1 = a.store(tag, b"tiny", 8);
        let p2 = a.store(tag, b"tiny", 8);
        assert!(!p1.is_null() && !p2.is_null());
        assert_ne!(p1, p2);
        assert_eq!(a.entry_count(tag), 0);
        a.release_tag(tag);
    }

    #[test]
    fn test_storev_matches_contiguous_store() {
        let mut a = dedup_over_grow();
        let tag = a.acquire_tag().unwrap();
        let p1 = a.store(tag, b"scatter gather equality check", 8);
        let p2 = a.storev(tag, &[b"scatter ", b"gather ", b"equality check"], 8);
        assert_eq!(p1, p2);
        a.release_tag(tag);
    }

    #[test]
    fn test_lookup_without_insertion() {
        let mut a = dedup_over_grow();
        let tag = a.acquire_tag().unwrap();
        let blob = b"looked up before and after storing";
        assert!(a.lookup(tag, blob, 8).is_null());
        let p = a.store(tag, blob, 8);
        assert_eq!(a.lookup(tag, blob, 8), p);
        a.release_tag(tag);
    }

    #[test]
    fn test_distinct_content_distinct_pointers() {
        let mut a = dedup_over_grow();
        let tag = a.acquire_tag().unwrap();
        let p1 = a.store(tag, b"first distinct content blob....", 8);
        let p2 = a.store(tag, b"second distinct content blob...", 8);
        assert_ne!(p1, p2);
        assert_eq!(a.entry_count(tag), 2);
        a.release_tag(tag);
    }

    #[test]
    fn test_bucket_growth_keeps_entries_findable() {
        let mut a = DedupAllocator::new(
            Box::new(GrowAllocator::new(GrowConfig::default())),
            DedupConfig {
                bucket_count_bits: 2,
                chain_length_grow_trigger: 2,
                minimum_bucket_occupancy: 0.1,
                ..DedupConfig::default()
            },
        );
        let tag = a.acquire_tag().unwrap();
        let blobs: Vec<String> = (0..64)
            .map(|i| format!("entry number {i:04} padded past threshold"))
            .collect();
        let ptrs: Vec<*const u8> = blobs.iter().map(|b| a.store(tag, b.as_bytes(), 8)).collect();
        for (blob, ptr) in blobs.iter().zip(&ptrs) {
            assert_eq!(a.store(tag, blob.as_bytes(), 8), *ptr);
        }
        a.release_tag(tag);
    }

    #[test]
    fn test_reset_forgets_fingerprints() {
        let mut a = dedup_over_grow();
        let tag = a.acquire_tag().unwrap();
        let blob = b"content that does not survive reset";
        let p1 = a.store(tag, blob, 8);
        assert!(!p1.is_null());
        a.reset_tag(tag);
        assert_eq!(a.entry_count(tag), 0);
        assert!(a.lookup(tag, blob, 8).is_null());
        a.release_tag(tag);
    }

    #[test]
    fn test_parent_exhaustion_propagates() {
        // A linear parent with almost no room forces the store to fail.
        let mut a = DedupAllocator::new(
            Box::new(LinearAllocator::with_capacity(8)),
            DedupConfig::default(),
        );
        let tag = a.acquire_tag().unwrap();
        let p = a.store(tag, b"far larger than eight bytes of room", 8);
        assert!(p.is_null());
        assert_eq!(a.entry_count(tag), 0);
    }

    #[test]
    fn test_caps() {
        let a = dedup_over_grow();
        let caps = a.caps();
        assert!(caps.contains(AllocCaps::DEDUP));
        assert!(caps.contains(AllocCaps::LOOKUP));
        assert!(!caps.contains(AllocCaps::FREE_INDIVIDUAL));
    }
}
