//! Scoped Value Builder
//!
//! The builder is the allocation façade values are manufactured
//! through: it owns a tag inside a shared allocator, counts allocation
//! failures, and carries the schema and policy flags the store and the
//! collection algebra consult.
//!
//! Builders chain into scopes. The scope leader owns the tag published
//! values live in; child scopes get a scratch tag of their own, released
//! when the child drops, and `export` is the only way a value crosses
//! from a child into the leader's storage. No two operations may run on
//! one builder concurrently (it is deliberately `!Sync`); sharing the
//! allocator between builders is serialized by its mutex.

use crate::diag::DiagCollector;
use crate::error::{Diagnostic, ErrorKind};
use crate::schema::Schema;
use crate::store;
use bitflags::bitflags;
use std::cell::Cell;
use strata_core::alloc::{
    self, AllocTag, AutoConfig, AutoScenario, SharedAllocator, TagAllocator,
};
use strata_core::generic::Generic;

/// First scratch buffer size for the fast-retry path.
const SCRATCH_INITIAL: usize = 384;

/// Scratch buffers stop doubling here.
const SCRATCH_MAX: usize = 64 * 1024;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BuilderFlags: u32 {
        /// Tear the allocator down with this builder.
        const OWNS_ALLOCATOR = 1 << 0;
        /// Build a default allocator instead of requiring one.
        const CREATE_ALLOCATOR = 1 << 1;
        /// Mapping construction fails on duplicate keys.
        const DUPLICATE_KEYS_DISABLED = 1 << 2;
        /// Prefer a deduplicating allocator stack.
        const DEDUP_ENABLED = 1 << 3;
        /// This builder owns the tag published values live in.
        const SCOPE_LEADER = 1 << 4;
        /// Acquire a fresh tag at construction.
        const CREATE_TAG = 1 << 5;
        /// Emit tracing events for store and dispatch activity.
        const TRACE = 1 << 6;
    }
}

/// Construction parameters. Child scopes are made with
/// [`Builder::scope`], which inherits everything from the parent.
pub struct BuilderConfig {
    pub schema: Schema,
    /// Shared allocator to join; `None` plus `CREATE_ALLOCATOR` builds
    /// a default stack.
    pub allocator: Option<SharedAllocator>,
    /// Sizing hint for a created allocator.
    pub estimated_max_size: usize,
    pub diag: Option<DiagCollector>,
    pub flags: BuilderFlags,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            schema: Schema::Auto,
            allocator: None,
            estimated_max_size: 64 * 1024,
            diag: None,
            flags: BuilderFlags::CREATE_ALLOCATOR
                | BuilderFlags::CREATE_TAG
                | BuilderFlags::SCOPE_LEADER,
        }
    }
}

pub struct Builder {
    alloc: SharedAllocator,
    tag: AllocTag,
    leader_tag: AllocTag,
    schema: Schema,
    flags: BuilderFlags,
    failures: Cell<u64>,
    diag: Option<DiagCollector>,
    owns_tag: bool,
}

impl Builder {
    /// Build a scope-leading builder from a config.
    pub fn new(config: BuilderConfig) -> Result<Builder, ErrorKind> {
        let allocator = match config.allocator {
            Some(a) => a,
            None => {
                if !config.flags.contains(BuilderFlags::CREATE_ALLOCATOR) {
                    return Err(ErrorKind::InvalidInput);
                }
                let scenario = if config.flags.contains(BuilderFlags::DEDUP_ENABLED) {
                    AutoScenario::PerTagFreeDedup
                } else {
                    AutoScenario::PerTagFree
                };
                alloc::shared_boxed(alloc::allocator_for(AutoConfig {
                    scenario,
                    estimated_max_size: config.estimated_max_size,
                }))
            }
        };
        let tag = {
            let mut guard = lock(&allocator);
            guard.acquire_tag().ok_or(ErrorKind::OutOfMemory)?
        };
        Ok(Builder {
            alloc: allocator,
            tag,
            leader_tag: tag,
            schema: config.schema,
            flags: config.flags | BuilderFlags::SCOPE_LEADER,
            failures: Cell::new(0),
            diag: config.diag,
            owns_tag: true,
        })
    }

    /// A leader over a default allocator, the common entry point.
    pub fn with_schema(schema: Schema) -> Builder {
        Builder::new(BuilderConfig {
            schema,
            ..BuilderConfig::default()
        })
        .expect("default allocator construction does not fail")
    }

    /// Open a child scope: same allocator and policies, its own scratch
    /// tag. Values the child builds die with it unless exported.
    pub fn scope(&self) -> Builder {
        let tag = lock(&self.alloc)
            .acquire_tag()
            .unwrap_or(self.tag);
        Builder {
            alloc: self.alloc.clone(),
            tag,
            leader_tag: self.leader_tag,
            schema: self.schema,
            flags: self.flags - BuilderFlags::SCOPE_LEADER,
            failures: Cell::new(0),
            diag: self.diag.clone(),
            owns_tag: tag != self.tag,
        }
    }

    /// Publish a value into the scope leader's tag.
    ///
    /// Inplace values come back unchanged; everything else is interned
    /// into the leader's storage. This is the only way a value legally
    /// outlives the scope that built it.
    pub fn export(&self, v: Generic) -> Generic {
        if v.is_in_place() || self.tag == self.leader_tag {
            return v;
        }
        let view = self.retagged(self.leader_tag);
        let out = store::copy(&view, v);
        self.failures.set(self.failures.get() + view.failures.get());
        out
    }

    /// A borrowed view of this builder writing into another tag.
    fn retagged(&self, tag: AllocTag) -> Builder {
        Builder {
            alloc: self.alloc.clone(),
            tag,
            leader_tag: tag,
            schema: self.schema,
            flags: self.flags,
            failures: Cell::new(0),
            diag: self.diag.clone(),
            owns_tag: false,
        }
    }

    // =========================================================================
    // Store interface
    // =========================================================================

    /// Raw bytes in this builder's tag; null on exhaustion.
    pub fn alloc_bytes(&self, size: usize, align: usize) -> *mut u8 {
        lock(&self.alloc).alloc(self.tag, size, align)
    }

    /// Intern immutable bytes (dedup-aware when the allocator is).
    pub fn store_bytes(&self, bytes: &[u8], align: usize) -> *const u8 {
        lock(&self.alloc).store(self.tag, bytes, align)
    }

    /// Scatter-gather intern of the concatenation of `segments`.
    pub fn store_segments(&self, segments: &[&[u8]], align: usize) -> *const u8 {
        lock(&self.alloc).storev(self.tag, segments, align)
    }

    /// Query previously interned bytes without storing.
    pub fn lookup_bytes(&self, bytes: &[u8], align: usize) -> *const u8 {
        lock(&self.alloc).lookup(self.tag, bytes, align)
    }

    pub fn lookup_segments(&self, segments: &[&[u8]], align: usize) -> *const u8 {
        lock(&self.alloc).lookupv(self.tag, segments, align)
    }

    /// Whether this builder's allocator owns `v`'s storage. Inplace
    /// values are vacuously owned.
    pub fn contains(&self, v: Generic) -> bool {
        match v.payload_ptr() {
            None => true,
            Some(ptr) => lock(&self.alloc).contains(ptr),
        }
    }

    /// Forced-`INVALID` count caused by arena exhaustion.
    pub fn allocation_failures(&self) -> u64 {
        self.failures.get()
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn flags(&self) -> BuilderFlags {
        self.flags
    }

    pub fn diag(&self) -> Option<&DiagCollector> {
        self.diag.as_ref()
    }

    pub fn tag(&self) -> AllocTag {
        self.tag
    }

    pub fn allocator(&self) -> &SharedAllocator {
        &self.alloc
    }

    /// Bytes in use under this builder's tag.
    pub fn used(&self) -> usize {
        lock(&self.alloc).tag_linear_size(self.tag)
    }

    // =========================================================================
    // Failure reporting
    // =========================================================================

    /// Record an exhaustion failure and return the sentinel.
    pub(crate) fn fail_alloc(&self) -> Generic {
        self.failures.set(self.failures.get() + 1);
        if self.flags.contains(BuilderFlags::TRACE) {
            tracing::debug!(failures = self.failures.get(), "allocation failed");
        }
        if let Some(diag) = &self.diag {
            diag.push(Diagnostic::new(ErrorKind::OutOfMemory, "arena exhausted"));
        }
        Generic::INVALID
    }

    /// Record a non-allocation failure and return the sentinel.
    pub(crate) fn fail(&self, kind: ErrorKind, message: impl Into<String>) -> Generic {
        if let Some(diag) = &self.diag {
            diag.push(Diagnostic::new(kind, message));
        }
        Generic::INVALID
    }

    // =========================================================================
    // Scratch fast-retry
    // =========================================================================

    /// Run `f` against a scratch builder backed by a small linear
    /// buffer, exporting its result into this builder.
    ///
    /// The buffer starts at 384 bytes; when `f` fails with allocation
    /// failures recorded, the buffer doubles (up to 64 KiB) and `f` runs
    /// again from an empty scratch. Operations are free of side effects
    /// on failure, so the retry observes identical inputs.
    pub fn with_scratch<F>(&self, mut f: F) -> Generic
    where
        F: FnMut(&Builder) -> Generic,
    {
        let mut capacity = SCRATCH_INITIAL;
        loop {
            let scratch_alloc =
                alloc::shared(strata_core::alloc::LinearAllocator::with_capacity(capacity));
            let tag = match lock(&scratch_alloc).acquire_tag() {
                Some(tag) => tag,
                None => return Generic::INVALID,
            };
            let scratch = Builder {
                alloc: scratch_alloc,
                tag,
                leader_tag: tag,
                schema: self.schema,
                flags: self.flags | BuilderFlags::SCOPE_LEADER,
                failures: Cell::new(0),
                diag: None,
                owns_tag: true,
            };
            let out = f(&scratch);
            if !out.is_invalid() {
                // Results already owned elsewhere (a lookup that
                // returned an existing subtree) pass through untouched.
                return store::internalize(self, out);
            }
            if scratch.allocation_failures() == 0 {
                // Not an exhaustion: retrying cannot change the outcome.
                return Generic::INVALID;
            }
            if capacity >= SCRATCH_MAX {
                return self.fail(ErrorKind::OutOfMemory, "scratch retry limit exceeded");
            }
            capacity *= 2;
            if self.flags.contains(BuilderFlags::TRACE) {
                tracing::debug!(capacity, "scratch buffer grown, retrying");
            }
        }
    }
}

impl Drop for Builder {
    fn drop(&mut self) {
        if self.owns_tag {
            lock(&self.alloc).release_tag(self.tag);
        }
    }
}

fn lock(alloc: &SharedAllocator) -> std::sync::MutexGuard<'_, dyn TagAllocator + 'static> {
    alloc.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
