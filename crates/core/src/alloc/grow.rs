//! Growable Arena Chain
//!
//! Each tag owns a chain of arenas. Allocation bumps through the current
//! arena; when it runs out the arena first tries to grow in place
//! (`mremap` under the mmap backing, `realloc` under the malloc
//! backing), and only then is a new arena mapped and chained. Big
//! allocations skip the chain and get a dedicated arena.
//!
//! The malloc backing may move an arena while growing it; moves are
//! reported through `take_relocations` so the owner can patch any words
//! pointing into the old ranges before the next dereference.

use super::{
    AllocCaps, AllocTag, ArenaInfo, Relocation, Strategy, TagAllocator, TagInfo, align_up,
};
use std::alloc::Layout;

const PAGE: usize = 4096;
const ARENA_ALIGN: usize = 16;

/// How arena memory is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Platform default: mmap where available, malloc elsewhere.
    Default,
    Mmap,
    Malloc,
}

impl Backing {
    fn resolved(self) -> Backing {
        match self {
            Backing::Default => {
                if cfg!(unix) {
                    Backing::Mmap
                } else {
                    Backing::Malloc
                }
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GrowConfig {
    /// Allocations at least this large get a dedicated arena.
    pub big_alloc_threshold: usize,
    /// An arena whose free space drops below this is retired to the
    /// full list after a successful allocation.
    pub empty_threshold: usize,
    /// Smallest arena the chain will map.
    pub minimum_arena_size: usize,
    /// Size multiplier from one arena to the next; must exceed 1.
    pub grow_ratio: f64,
    /// Multiplier applied to the first mapping of a tag.
    pub balloon_ratio: f64,
    pub backing: Backing,
}

impl Default for GrowConfig {
    fn default() -> Self {
        GrowConfig {
            big_alloc_threshold: 128 * 1024,
            empty_threshold: 64,
            minimum_arena_size: 16 * 1024,
            grow_ratio: 1.5,
            balloon_ratio: 2.0,
            backing: Backing::Default,
        }
    }
}

struct Arena {
    base: *mut u8,
    size: usize,
    used: usize,
}

struct TagState {
    current: Option<Arena>,
    full: Vec<Arena>,
    pending_moves: Vec<Relocation>,
    ballooned: bool,
}

impl TagState {
    fn new() -> TagState {
        TagState {
            current: None,
            full: Vec::new(),
            pending_moves: Vec::new(),
            ballooned: false,
        }
    }
}

pub struct GrowAllocator {
    config: GrowConfig,
    backing: Backing,
    tags: Vec<Option<TagState>>,
}

// Safety: all arena memory is owned by this allocator alone and only
// mutated through `&mut self`.
unsafe impl Send for GrowAllocator {}

fn round_page(size: usize) -> usize {
    (size + PAGE - 1) & !(PAGE - 1)
}

#[cfg(unix)]
fn map_pages(size: usize) -> *mut u8 {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        std::ptr::null_mut()
    } else {
        ptr.cast()
    }
}

#[cfg(unix)]
fn unmap_pages(base: *mut u8, size: usize) {
    unsafe {
        libc::munmap(base.cast(), size);
    }
}

/// Grow a mapping in place without permitting a move.
#[cfg(target_os = "linux")]
fn remap_in_place(base: *mut u8, old_size: usize, new_size: usize) -> bool {
    let ptr = unsafe { libc::mremap(base.cast(), old_size, new_size, 0) };
    ptr != libc::MAP_FAILED
}

#[cfg(all(unix, not(target_os = "linux")))]
fn remap_in_place(_base: *mut u8, _old_size: usize, _new_size: usize) -> bool {
    false
}

/// Size for the next arena in a tag's chain.
fn next_arena_size(config: &GrowConfig, state: &mut TagState, at_least: usize) -> usize {
    let mut size = if state.ballooned {
        let last = state
            .current
            .as_ref()
            .map_or(config.minimum_arena_size, |a| a.size);
        (last as f64 * config.grow_ratio) as usize
    } else {
        state.ballooned = true;
        (config.minimum_arena_size as f64 * config.balloon_ratio) as usize
    };
    size = size
        .max(config.minimum_arena_size)
        .max(at_least + ARENA_ALIGN);
    round_page(size)
}

impl GrowAllocator {
    pub fn new(config: GrowConfig) -> GrowAllocator {
        debug_assert!(config.grow_ratio > 1.0);
        GrowAllocator {
            backing: config.backing.resolved(),
            config,
            tags: Vec::new(),
        }
    }

    pub fn config(&self) -> &GrowConfig {
        &self.config
    }

    fn state(&self, tag: AllocTag) -> Option<&TagState> {
        self.tags.get(tag.0 as usize).and_then(Option::as_ref)
    }

    fn state_mut(&mut self, tag: AllocTag) -> Option<&mut TagState> {
        self.tags.get_mut(tag.0 as usize).and_then(Option::as_mut)
    }

    fn map_arena(&self, size: usize) -> Option<Arena> {
        let size = round_page(size);
        let base = match self.backing {
            #[cfg(unix)]
            Backing::Mmap => map_pages(size),
            _ => {
                let Ok(layout) = Layout::from_size_align(size, ARENA_ALIGN) else {
                    return None;
                };
                unsafe { std::alloc::alloc(layout) }
            }
        };
        if base.is_null() {
            return None;
        }
        Some(Arena {
            base,
            size,
            used: 0,
        })
    }

    fn unmap_arena(&self, arena: &Arena) {
        match self.backing {
            #[cfg(unix)]
            Backing::Mmap => unmap_pages(arena.base, arena.size),
            _ => unsafe {
                std::alloc::dealloc(
                    arena.base,
                    Layout::from_size_align_unchecked(arena.size, ARENA_ALIGN),
                );
            },
        }
    }

    /// Try to extend `arena` to at least `needed` total bytes.
    ///
    /// Returns the relocation when the malloc backing moved the block.
    fn grow_arena(
        backing: Backing,
        grow_ratio: f64,
        arena: &mut Arena,
        needed: usize,
    ) -> Result<Option<Relocation>, ()> {
        let target = round_page(needed.max((arena.size as f64 * grow_ratio) as usize));
        match backing {
            #[cfg(unix)]
            Backing::Mmap => {
                if remap_in_place(arena.base, arena.size, target) {
                    arena.size = target;
                    Ok(None)
                } else {
                    Err(())
                }
            }
            _ => {
                let old_base = arena.base;
                let layout = unsafe { Layout::from_size_align_unchecked(arena.size, ARENA_ALIGN) };
                let new_base = unsafe { std::alloc::realloc(old_base, layout, target) };
                if new_base.is_null() {
                    return Err(());
                }
                let moved = if new_base == old_base {
                    None
                } else {
                    Some(Relocation {
                        old_lo: old_base as usize,
                        old_hi: old_base as usize + arena.used,
                        delta: new_base as isize - old_base as isize,
                    })
                };
                arena.base = new_base;
                arena.size = target;
                Ok(moved)
            }
        }
    }

    fn bump(arena: &mut Arena, size: usize, align: usize) -> *mut u8 {
        let Some(addr) = align_up(arena.base as usize + arena.used, align) else {
            return std::ptr::null_mut();
        };
        let offset = addr - arena.base as usize;
        let Some(end) = offset.checked_add(size) else {
            return std::ptr::null_mut();
        };
        if end > arena.size {
            return std::ptr::null_mut();
        }
        arena.used = end;
        unsafe { arena.base.add(offset) }
    }
}

impl Drop for GrowAllocator {
    fn drop(&mut self) {
        for i in 0..self.tags.len() {
            self.release_tag(AllocTag(i as u32));
        }
    }
}

impl TagAllocator for GrowAllocator {
    fn strategy(&self) -> Strategy {
        Strategy::Grow
    }

    fn caps(&self) -> AllocCaps {
        AllocCaps::FREE_TAG | AllocCaps::TAGS | AllocCaps::CONTAINS
    }

    fn acquire_tag(&mut self) -> Option<AllocTag> {
        if let Some(i) = self.tags.iter().position(Option::is_none) {
            self.tags[i] = Some(TagState::new());
            return Some(AllocTag(i as u32));
        }
        let i = self.tags.len();
        self.tags.push(Some(TagState::new()));
        Some(AllocTag(i as u32))
    }

    fn release_tag(&mut self, tag: AllocTag) {
        let Some(slot) = self.tags.get_mut(tag.0 as usize) else {
            return;
        };
        if let Some(state) = slot.take() {
            if let Some(arena) = &state.current {
                self.unmap_arena(arena);
            }
            for arena in &state.full {
                self.unmap_arena(arena);
            }
        }
    }

    fn reset_tag(&mut self, tag: AllocTag) {
        let Some(state) = self.state_mut(tag) else {
            return;
        };
        if let Some(arena) = &mut state.current {
            arena.used = 0;
        }
        state.pending_moves.clear();
        let full = std::mem::take(&mut state.full);
        for arena in &full {
            self.unmap_arena(arena);
        }
    }

    fn trim_tag(&mut self, _tag: AllocTag) {
        #[cfg(target_os = "linux")]
        if self.backing == Backing::Mmap {
            let Some(state) = self.state_mut(_tag) else {
                return;
            };
            if let Some(arena) = &mut state.current {
                let keep = round_page(arena.used.max(1));
                if keep < arena.size && remap_in_place(arena.base, arena.size, keep) {
                    arena.size = keep;
                }
            }
        }
    }

    fn alloc(&mut self, tag: AllocTag, size: usize, align: usize) -> *mut u8 {
        let config = self.config;
        let backing = self.backing;

        if size >= config.big_alloc_threshold {
            let Some(mut arena) = self.map_arena(size) else {
                return std::ptr::null_mut();
            };
            arena.used = size;
            let base = arena.base;
            match self.state_mut(tag) {
                Some(state) => {
                    state.full.push(arena);
                    return base;
                }
                None => {
                    self.unmap_arena(&arena);
                    return std::ptr::null_mut();
                }
            }
        }

        if self.state(tag).is_none() {
            return std::ptr::null_mut();
        }

        // Pass 0 bumps the current arena and grows or retires it on
        // failure; pass 1 bumps whatever that produced.
        for attempt in 0..2 {
            let state = self.tags[tag.0 as usize].as_mut().expect("live tag");
            if let Some(arena) = &mut state.current {
                let ptr = Self::bump(arena, size, align);
                if !ptr.is_null() {
                    let exhausted = arena.size - arena.used < config.empty_threshold;
                    if exhausted {
                        let retired = state.current.take().expect("arena present");
                        state.full.push(retired);
                    }
                    return ptr;
                }
                if attempt == 1 {
                    return std::ptr::null_mut();
                }
                let needed = arena.used + size + align;
                match Self::grow_arena(backing, config.grow_ratio, arena, needed) {
                    Ok(moved) => {
                        if let Some(reloc) = moved {
                            tracing::debug!(
                                old_lo = reloc.old_lo,
                                delta = reloc.delta,
                                "arena moved while growing"
                            );
                            state.pending_moves.push(reloc);
                        }
                        continue;
                    }
                    Err(()) => {
                        let retired = state.current.take().expect("arena present");
                        state.full.push(retired);
                    }
                }
            }
            let state = self.tags[tag.0 as usize].as_mut().expect("live tag");
            let want = next_arena_size(&config, state, size);
            match self.map_arena(want) {
                Some(arena) => {
                    self.tags[tag.0 as usize].as_mut().expect("live tag").current = Some(arena);
                }
                None => return std::ptr::null_mut(),
            }
        }
        std::ptr::null_mut()
    }

    fn contains(&self, ptr: *const u8) -> bool {
        let p = ptr as usize;
        self.tags.iter().flatten().any(|state| {
            state
                .current
                .iter()
                .chain(state.full.iter())
                .any(|a| p >= a.base as usize && p < a.base as usize + a.size)
        })
    }

    fn tag_linear_size(&self, tag: AllocTag) -> usize {
        self.state(tag).map_or(0, |s| {
            s.current.iter().chain(s.full.iter()).map(|a| a.used).sum()
        })
    }

    fn tag_linear(&self, tag: AllocTag) -> Option<(*const u8, usize)> {
        let state = self.state(tag)?;
        if !state.full.is_empty() {
            return None;
        }
        state
            .current
            .as_ref()
            .map(|a| (a.base as *const u8, a.used))
    }

    fn tag_info(&self, tag: AllocTag) -> Option<TagInfo> {
        let state = self.state(tag)?;
        Some(TagInfo {
            tag,
            arenas: state
                .current
                .iter()
                .chain(state.full.iter())
                .map(|a| ArenaInfo {
                    data: a.base,
                    size: a.size,
                    used: a.used,
                    free: a.size - a.used,
                })
                .collect(),
        })
    }

    fn take_relocations(&mut self, tag: AllocTag) -> Vec<Relocation> {
        self.state_mut(tag)
            .map_or_else(Vec::new, |s| std::mem::take(&mut s.pending_moves))
    }
}
