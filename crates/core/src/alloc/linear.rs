//! Bump Arena
//!
//! O(1) allocation by advancing an offset through one buffer. Individual
//! free is a no-op; releasing the single tag rewinds the offset. The
//! buffer is either sized up front or handed in by the caller, which is
//! what the scratch fast-retry path in the builder uses.

use super::{AllocCaps, AllocTag, ArenaInfo, Strategy, TagAllocator, TagInfo, align_up};

pub struct LinearAllocator {
    buf: Box<[u8]>,
    used: usize,
    tag_taken: bool,
}

// Safety: the buffer is owned exclusively and only mutated through
// `&mut self`; the raw base pointer never escapes ownership.
unsafe impl Send for LinearAllocator {}

impl LinearAllocator {
    /// A bump arena over a fresh buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> LinearAllocator {
        Self::from_buffer(vec![0u8; capacity].into_boxed_slice())
    }

    /// A bump arena over a caller-provided buffer.
    pub fn from_buffer(buf: Box<[u8]>) -> LinearAllocator {
        LinearAllocator {
            buf,
            used: 0,
            tag_taken: false,
        }
    }

    /// Total buffer size.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.used
    }

    fn base(&self) -> usize {
        self.buf.as_ptr() as usize
    }
}

impl TagAllocator for LinearAllocator {
    fn strategy(&self) -> Strategy {
        Strategy::Linear
    }

    fn caps(&self) -> AllocCaps {
        AllocCaps::FREE_TAG | AllocCaps::CONTAINS | AllocCaps::EFFICIENT_CONTAINS
    }

    fn acquire_tag(&mut self) -> Option<AllocTag> {
        if self.tag_taken {
            return None;
        }
        self.tag_taken = true;
        Some(AllocTag(0))
    }

    fn release_tag(&mut self, tag: AllocTag) {
        debug_assert_eq!(tag.0, 0);
        self.used = 0;
        self.tag_taken = false;
    }

    fn reset_tag(&mut self, tag: AllocTag) {
        debug_assert_eq!(tag.0, 0);
        self.used = 0;
    }

    fn alloc(&mut self, tag: AllocTag, size: usize, align: usize) -> *mut u8 {
        debug_assert_eq!(tag.0, 0);
        let Some(addr) = align_up(self.base() + self.used, align) else {
            return std::ptr::null_mut();
        };
        let offset = addr - self.base();
        let Some(end) = offset.checked_add(size) else {
            return std::ptr::null_mut();
        };
        if end > self.buf.len() {
            return std::ptr::null_mut();
        }
        self.used = end;
        unsafe { self.buf.as_mut_ptr().add(offset) }
    }

    fn contains(&self, ptr: *const u8) -> bool {
        let p = ptr as usize;
        p >= self.base() && p < self.base() + self.buf.len()
    }

    fn tag_linear_size(&self, _tag: AllocTag) -> usize {
        self.used
    }

    fn tag_linear(&self, _tag: AllocTag) -> Option<(*const u8, usize)> {
        Some((self.buf.as_ptr(), self.used))
    }

    fn tag_info(&self, tag: AllocTag) -> Option<TagInfo> {
        Some(TagInfo {
            tag,
            arenas: vec![ArenaInfo {
                data: self.buf.as_ptr(),
                size: self.buf.len(),
                used: self.used,
                free: self.buf.len() - self.used,
            }],
        })
    }
}
