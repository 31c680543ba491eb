//! Parallel Map, Filter, Reduce
//!
//! Fork-join over an external thread pool. The input is chunked, each
//! chunk runs in a worker with its own child builder, and workers
//! publish their results through `export` before the join; the caller's
//! thread reassembles everything in input order. Parallel reduce folds
//! chunks independently and combines the partials, which is only sound
//! for an associative reducer; that is the caller's contract.

use super::{Predicate, Reducer, Transform};
use crate::builder::Builder;
use crate::error::ErrorKind;
use rayon::prelude::*;
use strata_core::generic::Generic;

/// Elements per worker chunk: enough to amortize the scope setup, few
/// enough to keep the pool busy.
fn chunk_size(len: usize, pool: &rayon::ThreadPool) -> usize {
    len.div_ceil(pool.current_num_threads().max(1) * 4).max(1)
}

pub(crate) fn map(
    b: &Builder,
    pool: &rayon::ThreadPool,
    input: Generic,
    f: Transform<'_>,
) -> Generic {
    let Some(items) = input.sequence_items() else {
        return b.fail(ErrorKind::KindMismatch, "not a sequence");
    };
    if items.is_empty() {
        return Generic::SEQ_EMPTY;
    }
    let tasks: Vec<(Builder, &[Generic])> = items
        .chunks(chunk_size(items.len(), pool))
        .map(|chunk| (b.scope(), chunk))
        .collect();
    let results: Vec<Vec<Generic>> = pool.install(|| {
        tasks
            .into_par_iter()
            .map(|(worker, chunk)| {
                let mut out = Vec::with_capacity(chunk.len());
                for item in chunk {
                    let mapped = f(&worker, *item);
                    if mapped.is_invalid() {
                        out.push(Generic::INVALID);
                        break;
                    }
                    // Publish before the worker scope dies with its tag.
                    out.push(worker.export(mapped));
                }
                out
            })
            .collect()
    });
    let mut all = Vec::with_capacity(items.len());
    for chunk in results {
        for v in chunk {
            if v.is_invalid() {
                return Generic::INVALID;
            }
            all.push(v);
        }
    }
    b.sequence_raw(&all)
}

pub(crate) fn filter(
    b: &Builder,
    pool: &rayon::ThreadPool,
    input: Generic,
    pred: Predicate<'_>,
) -> Generic {
    let Some(items) = input.sequence_items() else {
        return b.fail(ErrorKind::KindMismatch, "not a sequence");
    };
    if items.is_empty() {
        return Generic::SEQ_EMPTY;
    }
    // The predicate only reads, so no worker builders are needed and
    // kept elements stay exactly the words they were.
    let kept: Vec<Vec<Generic>> = pool.install(|| {
        items
            .par_chunks(chunk_size(items.len(), pool))
            .map(|chunk| chunk.iter().copied().filter(|item| pred(*item)).collect())
            .collect()
    });
    let all: Vec<Generic> = kept.into_iter().flatten().collect();
    b.sequence_raw(&all)
}

pub(crate) fn reduce(
    b: &Builder,
    pool: &rayon::ThreadPool,
    input: Generic,
    f: Reducer<'_>,
    init: Generic,
) -> Generic {
    let Some(items) = input.sequence_items() else {
        return b.fail(ErrorKind::KindMismatch, "not a sequence");
    };
    if items.is_empty() {
        return init;
    }
    let tasks: Vec<(Builder, &[Generic])> = items
        .chunks(chunk_size(items.len(), pool))
        .map(|chunk| (b.scope(), chunk))
        .collect();
    let partials: Vec<Generic> = pool.install(|| {
        tasks
            .into_par_iter()
            .map(|(worker, chunk)| {
                // Fold the chunk from its first element; `init` enters
                // exactly once, in the combine step below.
                let mut acc = chunk[0];
                for item in &chunk[1..] {
                    acc = f(&worker, acc, *item);
                    if acc.is_invalid() {
                        return Generic::INVALID;
                    }
                }
                worker.export(acc)
            })
            .collect()
    });
    let mut acc = init;
    for partial in partials {
        if partial.is_invalid() {
            return Generic::INVALID;
        }
        acc = f(b, acc, partial);
        if acc.is_invalid() {
            return acc;
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn builder() -> Builder {
        Builder::with_schema(Schema::Yaml1_2Core)
    }

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap()
    }

    fn ints(b: &Builder, n: i64) -> Generic {
        let items: Vec<Generic> = (0..n).map(|i| b.int(i)).collect();
        b.sequence(&items)
    }

    #[test]
    fn test_parallel_map_preserves_order() {
        let b = builder();
        let pool = pool();
        let s = ints(&b, 100);
        let doubled = map(&b, &pool, s, &|w: &Builder, v: Generic| {
            w.int(v.get_int().unwrap() * 2)
        });
        let out = doubled.sequence_items().unwrap();
        assert_eq!(out.len(), 100);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(v.get_int(), Some(i as i64 * 2));
        }
    }

    #[test]
    fn test_parallel_map_exported_values_survive() {
        let b = builder();
        let pool = pool();
        let items: Vec<Generic> = (0..50).map(|i| b.int(i)).collect();
        let s = b.sequence(&items);
        // Build strings long enough to force out-of-place storage in
        // the workers.
        let labeled = map(&b, &pool, s, &|w: &Builder, v: Generic| {
            w.string(&format!("element number {:04}", v.get_int().unwrap()))
        });
        let out = labeled.sequence_items().unwrap();
        assert_eq!(out[7].as_str(), Some("element number 0007"));
        assert!(b.contains(out[7]));
    }

    #[test]
    fn test_parallel_filter_matches_sequential() {
        let b = builder();
        let pool = pool();
        let s = ints(&b, 100);
        let even = |v: Generic| v.get_int().is_some_and(|n| n % 2 == 0);
        let par = filter(&b, &pool, s, &even);
        let seq = super::super::seq::filter(&b, s, &even);
        assert_eq!(crate::store::compare(par, seq), 0);
    }

    #[test]
    fn test_parallel_reduce_associative_sum() {
        let b = builder();
        let pool = pool();
        let s = ints(&b, 101);
        let sum = |w: &Builder, acc: Generic, v: Generic| {
            w.int(acc.get_int().unwrap() + v.get_int().unwrap())
        };
        let total = reduce(&b, &pool, s, &sum, b.int(0));
        assert_eq!(total.get_int(), Some(100 * 101 / 2));
    }

    #[test]
    fn test_parallel_reduce_empty_returns_init() {
        let b = builder();
        let pool = pool();
        let total = reduce(&b, &pool, Generic::SEQ_EMPTY, &|w, a, v| {
            w.int(a.get_int().unwrap() + v.get_int().unwrap())
        }, b.int(42));
        assert_eq!(total.get_int(), Some(42));
    }

    #[test]
    fn test_invalid_poisons_parallel_map() {
        let b = builder();
        let pool = pool();
        let s = ints(&b, 10);
        let out = map(&b, &pool, s, &|_w: &Builder, v: Generic| {
            if v.get_int() == Some(5) {
                Generic::INVALID
            } else {
                v
            }
        });
        assert!(out.is_invalid());
    }
}
