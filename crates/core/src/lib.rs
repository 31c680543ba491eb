//! Strata core: the tagged value word and the arena substrate it lives in.
//!
//! Key design principles:
//! - `Generic`: one machine word carries any value; small scalars inline,
//!   everything else a tagged pointer into arena storage
//! - Allocators partition storage into tags that release as a unit
//! - Published words are immutable and freely sharable for reading

pub mod alloc;
pub mod generic;
pub mod varint;

// Re-export the word and the allocator surface
pub use generic::{
    COLLECTION_ALIGN, Generic, INT_FLAG_UNSIGNED, INT_INPLACE_MAX, INT_INPLACE_MIN, IndirectSlots,
    IntPayload, Kind, MapPair, SCALAR_ALIGN, STR_INPLACE_MAX, indirect_storage_size,
    mapping_storage_size, sequence_storage_size,
};

pub use alloc::{
    AllocCaps, AllocTag, ArenaInfo, AutoConfig, AutoScenario, Backing, DedupAllocator,
    DedupConfig, GrowAllocator, GrowConfig, LinearAllocator, Relocation, SharedAllocator,
    Strategy, SystemAllocator, TagAllocator, TagInfo, allocator_for, create, shared,
    shared_boxed,
};
