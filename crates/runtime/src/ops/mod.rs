//! Collection Algebra
//!
//! One entry point executes any opcode against an input value and an
//! argument record. Operations are functional: the input is never
//! touched, results are fresh values in the builder's tag, and failure
//! is the `INVALID` sentinel flowing out. `execute_local` is the
//! scratch-buffer variant that builds temporaries in a small retried
//! arena and publishes only the result.

mod convert;
mod map;
#[cfg(feature = "parallel")]
mod parallel;
mod seq;

use crate::builder::{Builder, BuilderFlags};
use crate::decode::{ParseConfig, decode};
use crate::encode::{EmitConfig, emit};
use crate::error::ErrorKind;
use crate::event::{EventSink, EventSource};
use crate::store;
use bitflags::bitflags;
use strata_core::generic::{Generic, Kind};

/// Custom sort order.
pub type Comparator<'a> = &'a (dyn Fn(Generic, Generic) -> std::cmp::Ordering + Sync);
/// Element test for `Filter`.
pub type Predicate<'a> = &'a (dyn Fn(Generic) -> bool + Sync);
/// Element transform for `Map`; builds its result in the given builder.
pub type Transform<'a> = &'a (dyn Fn(&Builder, Generic) -> Generic + Sync);
/// Fold step for `Reduce`.
pub type Reducer<'a> = &'a (dyn Fn(&Builder, Generic, Generic) -> Generic + Sync);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpFlags: u32 {
        /// `CreateMap` items are `[key, value]` mini-sequences instead
        /// of an alternating flat list.
        const MAP_ITEM_COUNT = 1 << 0;
        /// Run `Map`/`Filter`/`Reduce` on the supplied pool.
        const PARALLEL = 1 << 1;
    }
}

/// The operation selector with its operation-specific arguments.
pub enum OpCode<'a> {
    CreateSeq,
    CreateMap,
    Insert { index: usize },
    Replace { index: usize },
    Append,
    Assoc,
    Disassoc,
    Keys,
    Values,
    Items,
    Contains,
    Concat,
    Reverse,
    Merge,
    Unique,
    Sort { cmp: Option<Comparator<'a>> },
    Filter { pred: Predicate<'a> },
    Map { f: Transform<'a> },
    Reduce { f: Reducer<'a>, init: Generic },
    Slice { lo: usize, hi: usize },
    SlicePy { lo: i64, hi: i64 },
    Take { n: usize },
    Drop { n: usize },
    First,
    Last,
    Rest,
    Get { key: Generic, default: Option<Generic> },
    GetAt { index: usize },
    GetAtPath,
    Set { key: Generic, value: Generic },
    SetAt { index: usize, value: Generic },
    SetAtPath { value: Generic, create: bool },
    Convert { kind: Kind },
    Parse { config: &'a ParseConfig, source: &'a mut dyn EventSource },
    Emit { config: &'a EmitConfig, sink: &'a mut dyn EventSink },
}

impl OpCode<'_> {
    fn name(&self) -> &'static str {
        match self {
            OpCode::CreateSeq => "create-seq",
            OpCode::CreateMap => "create-map",
            OpCode::Insert { .. } => "insert",
            OpCode::Replace { .. } => "replace",
            OpCode::Append => "append",
            OpCode::Assoc => "assoc",
            OpCode::Disassoc => "disassoc",
            OpCode::Keys => "keys",
            OpCode::Values => "values",
            OpCode::Items => "items",
            OpCode::Contains => "contains",
            OpCode::Concat => "concat",
            OpCode::Reverse => "reverse",
            OpCode::Merge => "merge",
            OpCode::Unique => "unique",
            OpCode::Sort { .. } => "sort",
            OpCode::Filter { .. } => "filter",
            OpCode::Map { .. } => "map",
            OpCode::Reduce { .. } => "reduce",
            OpCode::Slice { .. } => "slice",
            OpCode::SlicePy { .. } => "slice-py",
            OpCode::Take { .. } => "take",
            OpCode::Drop { .. } => "drop",
            OpCode::First => "first",
            OpCode::Last => "last",
            OpCode::Rest => "rest",
            OpCode::Get { .. } => "get",
            OpCode::GetAt { .. } => "get-at",
            OpCode::GetAtPath => "get-at-path",
            OpCode::Set { .. } => "set",
            OpCode::SetAt { .. } => "set-at",
            OpCode::SetAtPath { .. } => "set-at-path",
            OpCode::Convert { .. } => "convert",
            OpCode::Parse { .. } => "parse",
            OpCode::Emit { .. } => "emit",
        }
    }
}

/// The argument record: a common prefix (`items`, `flags`, pool) plus
/// the opcode-specific tail inside [`OpCode`].
pub struct OpRequest<'a> {
    pub items: &'a [Generic],
    pub flags: OpFlags,
    #[cfg(feature = "parallel")]
    pub pool: Option<&'a rayon::ThreadPool>,
    pub op: OpCode<'a>,
}

impl<'a> OpRequest<'a> {
    pub fn new(op: OpCode<'a>) -> OpRequest<'a> {
        OpRequest {
            items: &[],
            flags: OpFlags::empty(),
            #[cfg(feature = "parallel")]
            pool: None,
            op,
        }
    }

    pub fn items(mut self, items: &'a [Generic]) -> OpRequest<'a> {
        self.items = items;
        self
    }

    pub fn flags(mut self, flags: OpFlags) -> OpRequest<'a> {
        self.flags = flags;
        self
    }

    #[cfg(feature = "parallel")]
    pub fn pool(mut self, pool: &'a rayon::ThreadPool) -> OpRequest<'a> {
        self.pool = Some(pool);
        self
    }
}

/// Execute one opcode.
///
/// Total over its inputs: an `INVALID` input or argument yields
/// `INVALID` without touching the builder beyond diagnostics.
pub fn execute(b: &Builder, input: Generic, request: &mut OpRequest<'_>) -> Generic {
    let consumes_input = !matches!(
        &request.op,
        OpCode::CreateSeq | OpCode::CreateMap | OpCode::Parse { .. }
    );
    if consumes_input && input.is_invalid() {
        return Generic::INVALID;
    }
    if request.items.iter().any(|v| v.is_invalid()) {
        return Generic::INVALID;
    }
    if b.flags().contains(BuilderFlags::TRACE) {
        tracing::trace!(op = request.op.name(), items = request.items.len(), "dispatch");
    }

    // Operations see through metadata wrappers; emit keeps the wrapper
    // so root anchors and tags survive.
    let raw_input = input;
    let input = store::resolve(input);
    let items = request.items;

    #[cfg(feature = "parallel")]
    let pool = if request.flags.contains(OpFlags::PARALLEL) {
        request.pool
    } else {
        None
    };

    match &mut request.op {
        OpCode::CreateSeq => b.sequence(items),
        OpCode::CreateMap => {
            if request.flags.contains(OpFlags::MAP_ITEM_COUNT) {
                map::create_from_pairs(b, items)
            } else {
                b.mapping(items)
            }
        }
        OpCode::Insert { index } => seq::insert(b, input, *index, items),
        OpCode::Replace { index } => seq::replace(b, input, *index, items),
        OpCode::Append => match input.kind() {
            // Mapping append follows the duplicate-key merge rule.
            Kind::Mapping => map::append(b, input, items),
            _ => seq::append(b, input, items),
        },
        OpCode::Assoc => map::assoc(b, input, items),
        OpCode::Disassoc => map::disassoc(b, input, items),
        OpCode::Keys => map::keys(b, input),
        OpCode::Values => map::values(b, input),
        OpCode::Items => map::items(b, input),
        OpCode::Contains => match input.kind() {
            Kind::Mapping => map::contains(b, input, items),
            _ => seq::contains(b, input, items),
        },
        OpCode::Concat => match input.kind() {
            Kind::Mapping => map::concat(b, input, items),
            _ => seq::concat(b, input, items),
        },
        OpCode::Reverse => match input.kind() {
            Kind::Mapping => map::reverse(b, input),
            _ => seq::reverse(b, input),
        },
        OpCode::Merge => map::merge(b, input, items),
        OpCode::Unique => seq::unique(b, input),
        OpCode::Sort { cmp } => seq::sort(b, input, *cmp),
        OpCode::Filter { pred } => {
            #[cfg(feature = "parallel")]
            if let Some(pool) = pool {
                return parallel::filter(b, pool, input, *pred);
            }
            seq::filter(b, input, *pred)
        }
        OpCode::Map { f } => {
            #[cfg(feature = "parallel")]
            if let Some(pool) = pool {
                return parallel::map(b, pool, input, *f);
            }
            seq::map(b, input, *f)
        }
        OpCode::Reduce { f, init } => {
            #[cfg(feature = "parallel")]
            if let Some(pool) = pool {
                return parallel::reduce(b, pool, input, *f, *init);
            }
            seq::reduce(b, input, *f, *init)
        }
        OpCode::Slice { lo, hi } => seq::slice(b, input, *lo, *hi),
        OpCode::SlicePy { lo, hi } => seq::slice_py(b, input, *lo, *hi),
        OpCode::Take { n } => seq::take(b, input, *n),
        OpCode::Drop { n } => seq::drop_front(b, input, *n),
        OpCode::First => seq::first(b, input),
        OpCode::Last => seq::last(b, input),
        OpCode::Rest => seq::rest(b, input),
        OpCode::Get { key, default } => map::get(b, input, *key, *default),
        OpCode::GetAt { index } => seq::get_at(b, input, *index),
        OpCode::GetAtPath => get_at_path(b, input, items),
        OpCode::Set { key, value } => map::assoc(b, input, &[*key, *value]),
        OpCode::SetAt { index, value } => seq::replace(b, input, *index, &[*value]),
        OpCode::SetAtPath { value, create } => set_at_path(b, input, items, *value, *create),
        OpCode::Convert { kind } => convert::convert(b, input, *kind),
        OpCode::Parse { config, source } => decode(b, &mut **source, config),
        OpCode::Emit { config, sink } => match emit(raw_input, b.schema(), config, &mut **sink) {
            Ok(()) => raw_input,
            Err(kind) => b.fail(kind, "emit failed"),
        },
    }
}

/// Execute through a scratch builder, publishing only the result.
///
/// `Parse` and `Emit` are I/O shaped and run directly; everything else
/// builds its temporaries in the retried scratch arena.
pub fn execute_local(b: &Builder, input: Generic, request: &mut OpRequest<'_>) -> Generic {
    if matches!(&request.op, OpCode::Parse { .. } | OpCode::Emit { .. }) {
        return execute(b, input, request);
    }
    b.with_scratch(|scratch| execute(scratch, input, request))
}

// =============================================================================
// Path traversal
// =============================================================================

/// Descend through mappings by key and sequences by integer index.
fn get_at_path(b: &Builder, input: Generic, path: &[Generic]) -> Generic {
    let mut current = input;
    for component in path {
        current = store::resolve(current);
        match current.kind() {
            Kind::Mapping => {
                let found = map::get(b, current, *component, None);
                if found.is_invalid() {
                    return found;
                }
                current = found;
            }
            Kind::Sequence => {
                let Some(index) = component.get_int() else {
                    return b.fail(ErrorKind::KindMismatch, "sequence path wants an index");
                };
                if index < 0 {
                    return b.fail(ErrorKind::KindMismatch, "negative path index");
                }
                current = seq::get_at(b, current, index as usize);
            }
            Kind::Null => return Generic::NULL,
            _ => return b.fail(ErrorKind::KindMismatch, "path into a scalar"),
        }
    }
    current
}

/// Functional update along a path; `create` materializes missing
/// intermediate mappings.
fn set_at_path(
    b: &Builder,
    input: Generic,
    path: &[Generic],
    value: Generic,
    create: bool,
) -> Generic {
    let Some((head, rest)) = path.split_first() else {
        return value;
    };
    let current = store::resolve(input);
    match current.kind() {
        Kind::Mapping => {
            let child = map::get(b, current, *head, None);
            let child = if child.is_null() && !rest.is_empty() {
                if !create {
                    return b.fail(ErrorKind::PathNotFound, "missing path component");
                }
                Generic::MAP_EMPTY
            } else {
                child
            };
            let updated = set_at_path(b, child, rest, value, create);
            if updated.is_invalid() {
                return updated;
            }
            map::assoc(b, current, &[*head, updated])
        }
        Kind::Sequence => {
            let Some(index) = head.get_int() else {
                return b.fail(ErrorKind::KindMismatch, "sequence path wants an index");
            };
            let items = current.sequence_items().unwrap();
            if index < 0 || index as usize >= items.len() {
                return b.fail(ErrorKind::IndexOutOfRange, "path index out of range");
            }
            let updated = set_at_path(b, items[index as usize], rest, value, create);
            if updated.is_invalid() {
                return updated;
            }
            seq::replace(b, current, index as usize, &[updated])
        }
        Kind::Null if create => {
            let updated = set_at_path(b, Generic::MAP_EMPTY, path, value, create);
            if updated.is_invalid() {
                return updated;
            }
            updated
        }
        _ => b.fail(ErrorKind::KindMismatch, "path through a scalar"),
    }
}
