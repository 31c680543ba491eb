//! System Heap Strategy
//!
//! Per-object allocations through the global allocator, tracked per tag
//! so tag release still frees everything. This strategy exists so the
//! whole value system can run under the address and leak sanitizers,
//! which see nothing inside a bump arena; it dedups nothing and is the
//! slowest of the family.

use super::{AllocCaps, AllocTag, ArenaInfo, Strategy, TagAllocator, TagInfo};
use std::alloc::{Layout, alloc, dealloc};

struct Object {
    ptr: *mut u8,
    size: usize,
    align: usize,
}

struct TagState {
    objects: Vec<Object>,
    used: usize,
}

pub struct SystemAllocator {
    tags: Vec<Option<TagState>>,
}

// Safety: all tracked pointers are owned by this allocator alone and
// only touched through `&mut self`.
unsafe impl Send for SystemAllocator {}

impl SystemAllocator {
    pub fn new() -> SystemAllocator {
        SystemAllocator { tags: Vec::new() }
    }

    fn state(&self, tag: AllocTag) -> Option<&TagState> {
        self.tags.get(tag.0 as usize).and_then(Option::as_ref)
    }

    fn state_mut(&mut self, tag: AllocTag) -> Option<&mut TagState> {
        self.tags.get_mut(tag.0 as usize).and_then(Option::as_mut)
    }

    fn drop_objects(state: &mut TagState) {
        for obj in state.objects.drain(..) {
            unsafe {
                dealloc(
                    obj.ptr,
                    Layout::from_size_align_unchecked(obj.size.max(1), obj.align),
                );
            }
        }
        state.used = 0;
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SystemAllocator {
    fn drop(&mut self) {
        for state in self.tags.iter_mut().flatten() {
            Self::drop_objects(state);
        }
    }
}

impl TagAllocator for SystemAllocator {
    fn strategy(&self) -> Strategy {
        Strategy::System
    }

    fn caps(&self) -> AllocCaps {
        AllocCaps::FREE_INDIVIDUAL | AllocCaps::FREE_TAG | AllocCaps::TAGS | AllocCaps::CONTAINS
    }

    fn acquire_tag(&mut self) -> Option<AllocTag> {
        // Reuse the first retired slot before growing the table.
        if let Some(i) = self.tags.iter().position(Option::is_none) {
            self.tags[i] = Some(TagState {
                objects: Vec::new(),
                used: 0,
            });
            return Some(AllocTag(i as u32));
        }
        let i = self.tags.len();
        self.tags.push(Some(TagState {
            objects: Vec::new(),
            used: 0,
        }));
        Some(AllocTag(i as u32))
    }

    fn release_tag(&mut self, tag: AllocTag) {
        if let Some(slot) = self.tags.get_mut(tag.0 as usize) {
            if let Some(state) = slot.as_mut() {
                Self::drop_objects(state);
            }
            *slot = None;
        }
    }

    fn reset_tag(&mut self, tag: AllocTag) {
        if let Some(state) = self.state_mut(tag) {
            Self::drop_objects(state);
        }
    }

    fn alloc(&mut self, tag: AllocTag, size: usize, align: usize) -> *mut u8 {
        let Ok(layout) = Layout::from_size_align(size.max(1), align) else {
            return std::ptr::null_mut();
        };
        let Some(state) = self.state_mut(tag) else {
            return std::ptr::null_mut();
        };
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return std::ptr::null_mut();
        }
        state.objects.push(Object { ptr, size, align });
        state.used += size;
        ptr
    }

    fn free(&mut self, tag: AllocTag, ptr: *mut u8, _size: usize) {
        let Some(state) = self.state_mut(tag) else {
            return;
        };
        if let Some(i) = state.objects.iter().position(|o| o.ptr == ptr) {
            let obj = state.objects.swap_remove(i);
            state.used -= obj.size;
            unsafe {
                dealloc(
                    obj.ptr,
                    Layout::from_size_align_unchecked(obj.size.max(1), obj.align),
                );
            }
        }
    }

    fn contains(&self, ptr: *const u8) -> bool {
        let p = ptr as usize;
        self.tags.iter().flatten().any(|state| {
            state
                .objects
                .iter()
                .any(|o| p >= o.ptr as usize && p < o.ptr as usize + o.size.max(1))
        })
    }

    fn tag_linear_size(&self, tag: AllocTag) -> usize {
        self.state(tag).map_or(0, |s| s.used)
    }

    fn tag_linear(&self, _tag: AllocTag) -> Option<(*const u8, usize)> {
        // Objects are scattered; there is never a single range.
        None
    }

    fn tag_info(&self, tag: AllocTag) -> Option<TagInfo> {
        let state = self.state(tag)?;
        Some(TagInfo {
            tag,
            arenas: state
                .objects
                .iter()
                .map(|o| ArenaInfo {
                    data: o.ptr,
                    size: o.size,
                    used: o.size,
                    free: 0,
                })
                .collect(),
        })
    }
}
