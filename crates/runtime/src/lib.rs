//! Strata runtime: immutable structured values over tagged arenas.
//!
//! Key design principles:
//! - `Generic`: what the system talks about, one word per value
//! - `Builder`: where values are manufactured; scopes own tags, and
//!   `export` is the only way a value outlives its scope
//! - Operations are functional and total: inputs are never mutated and
//!   failure is the `INVALID` sentinel, not a panic
//! - Events are the only boundary: parsers feed them in, the iterator
//!   produces them back, and the adapters never leak into the core

pub mod builder;
pub mod decode;
pub mod diag;
pub mod encode;
pub mod error;
pub mod event;
pub mod indirect;
pub mod iter;
pub mod json;
pub mod ops;
pub mod schema;
pub mod store;

// Re-export the word and allocator surface alongside the runtime
pub use strata_core::alloc::{
    AllocCaps, AllocTag, AutoConfig, AutoScenario, Backing, DedupAllocator, DedupConfig,
    GrowAllocator, GrowConfig, LinearAllocator, SharedAllocator, Strategy, SystemAllocator,
    TagAllocator, shared, shared_boxed,
};
pub use strata_core::generic::{Generic, IndirectSlots, Kind};

pub use builder::{Builder, BuilderConfig, BuilderFlags};
pub use decode::{ParseConfig, ParseFlags, ParseMode, decode};
pub use diag::DiagCollector;
pub use encode::{
    Color, EmitConfig, EmitFlags, EmitStyle, EmitTarget, Indent, Width, emit, emit_directory,
};
pub use error::{Diagnostic, ErrorKind};
pub use event::{
    CollectionStart, DocumentState, Event, EventSink, EventSource, NodeStyle, ScalarEvent,
    TagDirective, VecSink, VecSource, VersionDirective,
};
pub use indirect::{IndirectInit, Marker, Position, Span};
pub use iter::{IterFlags, ValueIter};
pub use json::{JsonSink, JsonSource, emit_json};
pub use ops::{OpCode, OpFlags, OpRequest, execute, execute_local};
pub use schema::{ScalarValue, Schema};
pub use store::{compare, copy, eq, fingerprint, internalize, ordering, relocate, resolve};
