//! Tagged Arena Allocator Family
//!
//! Every out-of-place value payload is owned by exactly one
//! `(allocator, tag)` pair. Tags partition an allocator's address space
//! and release as a unit; individual frees are optional and usually
//! no-ops. Five strategies implement the same interface:
//!
//! - `linear`: bump pointer in one buffer, single tag
//! - `system`: per-object heap allocations, for sanitizer runs
//! - `grow`: chained arenas that grow in place when the platform allows
//! - `dedup`: content-addressed interning layered over a parent
//! - `auto`: scenario-driven selection among the above
//!
//! Allocation failure is reported as a null pointer; callers propagate
//! it upward rather than panicking.

pub mod auto;
pub mod dedup;
pub mod grow;
pub mod linear;
pub mod system;

pub use auto::{AutoConfig, AutoScenario, allocator_for};
pub use dedup::{DedupAllocator, DedupConfig};
pub use grow::{Backing, GrowAllocator, GrowConfig};
pub use linear::LinearAllocator;
pub use system::SystemAllocator;

use bitflags::bitflags;
use std::sync::{Arc, Mutex};

/// Partition identifier within an allocator; releases as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocTag(pub(crate) u32);

impl AllocTag {
    /// The numeric identity of the tag.
    pub fn raw(self) -> u32 {
        self.0
    }
}

bitflags! {
    /// What an allocator strategy can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocCaps: u32 {
        /// `free` releases individual objects.
        const FREE_INDIVIDUAL = 1 << 0;
        /// `release_tag` releases everything stored under a tag.
        const FREE_TAG = 1 << 1;
        /// `store` may return an existing pointer for equal bytes.
        const DEDUP = 1 << 2;
        /// `contains` answers ownership queries.
        const CONTAINS = 1 << 3;
        /// `contains` is cheap (one or few range checks).
        const EFFICIENT_CONTAINS = 1 << 4;
        /// More than one tag may be live at once.
        const TAGS = 1 << 5;
        /// `lookup` queries content without storing.
        const LOOKUP = 1 << 6;
    }
}

/// The available strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Linear,
    System,
    Grow,
    Dedup,
    Auto,
}

impl Strategy {
    /// Every concrete strategy, in registry order.
    pub fn all() -> &'static [Strategy] {
        &[
            Strategy::Linear,
            Strategy::System,
            Strategy::Grow,
            Strategy::Dedup,
            Strategy::Auto,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Linear => "linear",
            Strategy::System => "system",
            Strategy::Grow => "grow",
            Strategy::Dedup => "dedup",
            Strategy::Auto => "auto",
        }
    }

    /// Look a strategy up by its registry name.
    pub fn by_name(name: &str) -> Option<Strategy> {
        Strategy::all().iter().copied().find(|s| s.name() == name)
    }
}

/// One arena in a tag's chain.
#[derive(Debug, Clone, Copy)]
pub struct ArenaInfo {
    pub data: *const u8,
    pub size: usize,
    pub used: usize,
    pub free: usize,
}

/// A tag's arena chain, for introspection and accounting.
#[derive(Debug, Clone)]
pub struct TagInfo {
    pub tag: AllocTag,
    pub arenas: Vec<ArenaInfo>,
}

impl TagInfo {
    /// Total bytes in use across the chain.
    pub fn used(&self) -> usize {
        self.arenas.iter().map(|a| a.used).sum()
    }
}

/// An arena base move reported by a growable strategy.
///
/// Callers holding words that point into `[old_lo, old_hi)` must patch
/// them by `delta` before the next dereference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub old_lo: usize,
    pub old_hi: usize,
    pub delta: isize,
}

/// The tagged-arena allocation interface.
///
/// Mutating methods take `&mut self`; sharing an allocator across a
/// builder chain goes through [`SharedAllocator`], whose mutex is the
/// single serialization point.
pub trait TagAllocator: Send {
    fn strategy(&self) -> Strategy;

    fn caps(&self) -> AllocCaps;

    /// Acquire a fresh tag, or `None` when the strategy is out of tags.
    fn acquire_tag(&mut self) -> Option<AllocTag>;

    /// Release everything stored under `tag` and retire the tag.
    fn release_tag(&mut self, tag: AllocTag);

    /// Release everything stored under `tag` but keep it usable.
    fn reset_tag(&mut self, tag: AllocTag);

    /// Return unused backing memory to the platform where possible.
    fn trim_tag(&mut self, _tag: AllocTag) {}

    /// Allocate `size` bytes at `align` under `tag`; null on exhaustion.
    fn alloc(&mut self, tag: AllocTag, size: usize, align: usize) -> *mut u8;

    /// Store immutable bytes, possibly returning an existing copy.
    fn store(&mut self, tag: AllocTag, bytes: &[u8], align: usize) -> *const u8 {
        self.storev(tag, &[bytes], align)
    }

    /// Scatter-gather store of the concatenation of `segments`.
    fn storev(&mut self, tag: AllocTag, segments: &[&[u8]], align: usize) -> *const u8 {
        let total: usize = segments.iter().map(|s| s.len()).sum();
        let ptr = self.alloc(tag, total, align);
        if ptr.is_null() {
            return std::ptr::null();
        }
        let mut off = 0;
        for seg in segments {
            unsafe {
                std::ptr::copy_nonoverlapping(seg.as_ptr(), ptr.add(off), seg.len());
            }
            off += seg.len();
        }
        ptr
    }

    /// Find previously stored bytes without inserting.
    ///
    /// Only meaningful under `AllocCaps::LOOKUP`; debug builds assert the
    /// capability, release builds report a miss.
    fn lookup(&self, tag: AllocTag, bytes: &[u8], align: usize) -> *const u8 {
        self.lookupv(tag, &[bytes], align)
    }

    fn lookupv(&self, _tag: AllocTag, _segments: &[&[u8]], _align: usize) -> *const u8 {
        debug_assert!(
            self.caps().contains(AllocCaps::LOOKUP),
            "lookup on a non-LOOKUP allocator"
        );
        std::ptr::null()
    }

    /// Free one allocation. A no-op for per-tag strategies.
    fn free(&mut self, _tag: AllocTag, _ptr: *mut u8, _size: usize) {}

    /// Whether `ptr` points into storage owned by this allocator.
    fn contains(&self, ptr: *const u8) -> bool;

    /// Bytes in use under `tag`.
    fn tag_linear_size(&self, tag: AllocTag) -> usize;

    /// The single contiguous range of `tag`, when it was laid out as one.
    fn tag_linear(&self, tag: AllocTag) -> Option<(*const u8, usize)>;

    /// The arena chain of `tag`.
    fn tag_info(&self, tag: AllocTag) -> Option<TagInfo>;

    /// Pending arena moves under `tag`, oldest first, cleared by the
    /// call. Callers patch live words by applying them in order.
    fn take_relocations(&mut self, _tag: AllocTag) -> Vec<Relocation> {
        Vec::new()
    }
}

/// The handle a builder chain shares.
pub type SharedAllocator = Arc<Mutex<dyn TagAllocator>>;

/// Wrap a strategy into the shared handle.
pub fn shared<A: TagAllocator + 'static>(allocator: A) -> SharedAllocator {
    Arc::new(Mutex::new(allocator))
}

/// Wrap an already-boxed strategy into the shared handle.
pub fn shared_boxed(allocator: Box<dyn TagAllocator>) -> SharedAllocator {
    Arc::new(Mutex::new(allocator))
}

// Forwarding impl so a boxed strategy can itself stand behind the
// shared handle; every method forwards so strategy overrides (dedup's
// storev in particular) are preserved.
impl TagAllocator for Box<dyn TagAllocator> {
    fn strategy(&self) -> Strategy {
        (**self).strategy()
    }

    fn caps(&self) -> AllocCaps {
        (**self).caps()
    }

    fn acquire_tag(&mut self) -> Option<AllocTag> {
        (**self).acquire_tag()
    }

    fn release_tag(&mut self, tag: AllocTag) {
        (**self).release_tag(tag)
    }

    fn reset_tag(&mut self, tag: AllocTag) {
        (**self).reset_tag(tag)
    }

    fn trim_tag(&mut self, tag: AllocTag) {
        (**self).trim_tag(tag)
    }

    fn alloc(&mut self, tag: AllocTag, size: usize, align: usize) -> *mut u8 {
        (**self).alloc(tag, size, align)
    }

    fn store(&mut self, tag: AllocTag, bytes: &[u8], align: usize) -> *const u8 {
        (**self).store(tag, bytes, align)
    }

    fn storev(&mut self, tag: AllocTag, segments: &[&[u8]], align: usize) -> *const u8 {
        (**self).storev(tag, segments, align)
    }

    fn lookup(&self, tag: AllocTag, bytes: &[u8], align: usize) -> *const u8 {
        (**self).lookup(tag, bytes, align)
    }

    fn lookupv(&self, tag: AllocTag, segments: &[&[u8]], align: usize) -> *const u8 {
        (**self).lookupv(tag, segments, align)
    }

    fn free(&mut self, tag: AllocTag, ptr: *mut u8, size: usize) {
        (**self).free(tag, ptr, size)
    }

    fn contains(&self, ptr: *const u8) -> bool {
        (**self).contains(ptr)
    }

    fn tag_linear_size(&self, tag: AllocTag) -> usize {
        (**self).tag_linear_size(tag)
    }

    fn tag_linear(&self, tag: AllocTag) -> Option<(*const u8, usize)> {
        (**self).tag_linear(tag)
    }

    fn tag_info(&self, tag: AllocTag) -> Option<TagInfo> {
        (**self).tag_info(tag)
    }

    fn take_relocations(&mut self, tag: AllocTag) -> Vec<Relocation> {
        (**self).take_relocations(tag)
    }
}

/// Construct a strategy with its default configuration.
///
/// `estimated_max_size` seeds buffer sizing for the strategies that need
/// an up-front extent.
pub fn create(strategy: Strategy, estimated_max_size: usize) -> Box<dyn TagAllocator> {
    match strategy {
        Strategy::Linear => Box::new(LinearAllocator::with_capacity(estimated_max_size.max(64))),
        Strategy::System => Box::new(SystemAllocator::new()),
        Strategy::Grow => Box::new(GrowAllocator::new(GrowConfig::default())),
        Strategy::Dedup => Box::new(DedupAllocator::new(
            Box::new(GrowAllocator::new(GrowConfig::default())),
            DedupConfig::default(),
        )),
        Strategy::Auto => allocator_for(AutoConfig {
            scenario: AutoScenario::PerTagFree,
            estimated_max_size,
        }),
    }
}

/// Round `addr` up to `align` (a power of two), checking for overflow.
pub(crate) fn align_up(addr: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    addr.checked_add(align - 1).map(|a| a & !(align - 1))
}
