//! Sequence Operations
//!
//! Every operation returns a fresh sequence; inputs are never touched.
//! Order is preserved except where the operation is about order
//! (`Sort`, `Reverse`) or collapses duplicates (`Unique`, which keeps
//! first occurrences).

use super::{Comparator, Predicate, Reducer, Transform};
use crate::builder::Builder;
use crate::error::ErrorKind;
use crate::store;
use std::cmp::Ordering;
use strata_core::generic::Generic;

fn require_items<'a>(b: &Builder, v: &'a Generic) -> Result<&'a [Generic], Generic> {
    match v.sequence_items() {
        Some(items) => Ok(items),
        None => Err(b.fail(ErrorKind::KindMismatch, "not a sequence")),
    }
}

pub(crate) fn insert(b: &Builder, input: Generic, index: usize, new: &[Generic]) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    if index > items.len() {
        return b.fail(ErrorKind::IndexOutOfRange, "insert past end");
    }
    let mut out = Vec::with_capacity(items.len() + new.len());
    out.extend_from_slice(&items[..index]);
    out.extend_from_slice(new);
    out.extend_from_slice(&items[index..]);
    b.sequence(&out)
}

pub(crate) fn replace(b: &Builder, input: Generic, index: usize, new: &[Generic]) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let Some(end) = index.checked_add(new.len()) else {
        return b.fail(ErrorKind::Overflow, "replace range overflow");
    };
    if end > items.len() {
        return b.fail(ErrorKind::IndexOutOfRange, "replace out of range");
    }
    let mut out = items.to_vec();
    out[index..end].copy_from_slice(new);
    b.sequence(&out)
}

pub(crate) fn append(b: &Builder, input: Generic, new: &[Generic]) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let mut out = Vec::with_capacity(items.len() + new.len());
    out.extend_from_slice(items);
    out.extend_from_slice(new);
    b.sequence(&out)
}

/// True when every probe occurs in the sequence, by structural
/// equality.
pub(crate) fn contains(b: &Builder, input: Generic, probes: &[Generic]) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let all = probes
        .iter()
        .all(|probe| items.iter().any(|item| store::eq(*item, *probe)));
    Generic::from_bool(all)
}

pub(crate) fn concat(b: &Builder, input: Generic, others: &[Generic]) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let mut out = items.to_vec();
    for other in others {
        let other = store::resolve(*other);
        match other.sequence_items() {
            Some(more) => out.extend_from_slice(more),
            None => return b.fail(ErrorKind::KindMismatch, "concat with a non-sequence"),
        }
    }
    b.sequence(&out)
}

pub(crate) fn reverse(b: &Builder, input: Generic) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let mut out = items.to_vec();
    out.reverse();
    b.sequence(&out)
}

pub(crate) fn unique(b: &Builder, input: Generic) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let mut out: Vec<Generic> = Vec::with_capacity(items.len());
    for item in items {
        if !out.iter().any(|seen| store::eq(*seen, *item)) {
            out.push(*item);
        }
    }
    b.sequence(&out)
}

/// Stable sort; the default order is the structural comparison.
pub(crate) fn sort(b: &Builder, input: Generic, cmp: Option<Comparator<'_>>) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let mut out = items.to_vec();
    match cmp {
        Some(f) => out.sort_by(|x, y| f(*x, *y)),
        None => out.sort_by(|x, y| store::ordering(*x, *y).unwrap_or(Ordering::Equal)),
    }
    b.sequence(&out)
}

pub(crate) fn filter(b: &Builder, input: Generic, pred: Predicate<'_>) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let out: Vec<Generic> = items.iter().copied().filter(|item| pred(*item)).collect();
    b.sequence(&out)
}

pub(crate) fn map(b: &Builder, input: Generic, f: Transform<'_>) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let mapped = f(b, *item);
        if mapped.is_invalid() {
            return mapped;
        }
        out.push(mapped);
    }
    b.sequence(&out)
}

pub(crate) fn reduce(b: &Builder, input: Generic, f: Reducer<'_>, init: Generic) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let mut acc = init;
    for item in items {
        acc = f(b, acc, *item);
        if acc.is_invalid() {
            return acc;
        }
    }
    acc
}

/// Half-open slice with strict bounds.
pub(crate) fn slice(b: &Builder, input: Generic, lo: usize, hi: usize) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    if lo > hi || hi > items.len() {
        return b.fail(ErrorKind::IndexOutOfRange, "slice out of range");
    }
    b.sequence(&items[lo..hi])
}

/// Half-open slice with Python index semantics: negatives count from
/// the end and everything clamps instead of failing.
pub(crate) fn slice_py(b: &Builder, input: Generic, lo: i64, hi: i64) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let len = items.len() as i64;
    let clamp = |at: i64| -> usize {
        let resolved = if at < 0 { len + at } else { at };
        resolved.clamp(0, len) as usize
    };
    let (lo, hi) = (clamp(lo), clamp(hi));
    if lo >= hi {
        return Generic::SEQ_EMPTY;
    }
    b.sequence(&items[lo..hi])
}

pub(crate) fn take(b: &Builder, input: Generic, n: usize) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    b.sequence(&items[..n.min(items.len())])
}

pub(crate) fn drop_front(b: &Builder, input: Generic, n: usize) -> Generic {
    let items = match require_items(b, &input) {
        Ok(items) => items,
        Err(e) => return e,
    };
    b.sequence(&items[n.min(items.len())..])
}

pub(crate) fn first(b: &Builder, input: Generic) -> Generic {
    match require_items(b, &input) {
        Ok(items) => items.first().copied().unwrap_or(Generic::NULL),
        Err(e) => e,
    }
}

pub(crate) fn last(b: &Builder, input: Generic) -> Generic {
    match require_items(b, &input) {
        Ok(items) => items.last().copied().unwrap_or(Generic::NULL),
        Err(e) => e,
    }
}

pub(crate) fn rest(b: &Builder, input: Generic) -> Generic {
    drop_front(b, input, 1)
}

pub(crate) fn get_at(b: &Builder, input: Generic, index: usize) -> Generic {
    match require_items(b, &input) {
        Ok(items) => items.get(index).copied().unwrap_or(Generic::NULL),
        Err(e) => e,
    }
}
