//! Structural Comparison
//!
//! A total order over non-invalid values. Cross-kind ordering is by
//! kind index (`Null < Bool < Int < Float < String < Sequence <
//! Mapping`); same-kind ordering is by value. The relation is kept
//! total by two deliberate choices: NaN compares equal to NaN (and
//! sorts after every other float), and mappings compare as their
//! key-sorted pair lists, so pair order never matters.

use super::resolve;
use std::cmp::Ordering;
use strata_core::generic::{Generic, IndirectSlots, Kind};

/// Three-way comparison; `-2` when either side is the invalid sentinel.
pub fn compare(a: Generic, b: Generic) -> i32 {
    if a.is_invalid() || b.is_invalid() {
        return -2;
    }
    // Raw word equality covers every inplace scalar and the
    // pointer-identical out-of-place cases dedup produces.
    if a.to_bits() == b.to_bits() {
        return 0;
    }
    let a = resolve(a);
    let b = resolve(b);
    if a.is_invalid() || b.is_invalid() {
        return -2;
    }
    if a.to_bits() == b.to_bits() {
        return 0;
    }

    let (ka, kb) = (a.kind(), b.kind());
    if ka != kb {
        return if ka < kb { -1 } else { 1 };
    }
    match ka {
        Kind::Null => 0,
        Kind::Bool => order(a.get_bool().cmp(&b.get_bool())),
        Kind::Int => order(int_magnitude(a).cmp(&int_magnitude(b))),
        Kind::Float => compare_floats(a.get_float().unwrap(), b.get_float().unwrap()),
        Kind::String => order(a.as_bytes().unwrap().cmp(b.as_bytes().unwrap())),
        Kind::Sequence => compare_sequences(&a, &b),
        Kind::Mapping => compare_mappings(&a, &b),
        Kind::Alias => order(alias_name(&a).cmp(&alias_name(&b))),
        // resolve() leaves no bare indirects, and invalids returned above.
        Kind::Indirect | Kind::Invalid => unreachable!(),
    }
}

/// `compare` lifted to `Ordering`; `None` on an invalid operand.
pub fn ordering(a: Generic, b: Generic) -> Option<Ordering> {
    match compare(a, b) {
        -2 => None,
        -1 => Some(Ordering::Less),
        0 => Some(Ordering::Equal),
        _ => Some(Ordering::Greater),
    }
}

/// Structural equality.
pub fn eq(a: Generic, b: Generic) -> bool {
    compare(a, b) == 0
}

fn order(o: Ordering) -> i32 {
    match o {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Every representable integer fits an `i128`, unsigned extension
/// included, which keeps the order total across both views.
fn int_magnitude(v: Generic) -> i128 {
    if v.int_is_unsigned_extended() {
        i128::from(v.get_uint().unwrap())
    } else {
        i128::from(v.get_int().unwrap())
    }
}

fn compare_floats(x: f64, y: f64) -> i32 {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => -1,
        (false, false) => order(x.partial_cmp(&y).expect("both finite or infinite")),
    }
}

fn compare_sequences(a: &Generic, b: &Generic) -> i32 {
    let xs = a.sequence_items().unwrap();
    let ys = b.sequence_items().unwrap();
    for (x, y) in xs.iter().zip(ys.iter()) {
        let c = compare(*x, *y);
        if c != 0 {
            return c;
        }
    }
    order(xs.len().cmp(&ys.len()))
}

fn compare_mappings(a: &Generic, b: &Generic) -> i32 {
    let mut xs: Vec<(Generic, Generic)> = a
        .mapping_pairs()
        .unwrap()
        .iter()
        .map(|p| (p.key, p.value))
        .collect();
    let mut ys: Vec<(Generic, Generic)> = b
        .mapping_pairs()
        .unwrap()
        .iter()
        .map(|p| (p.key, p.value))
        .collect();
    let by_key =
        |x: &(Generic, Generic), y: &(Generic, Generic)| ordering(x.0, y.0).unwrap_or(Ordering::Equal);
    xs.sort_by(by_key);
    ys.sort_by(by_key);
    for ((xk, xv), (yk, yv)) in xs.iter().zip(ys.iter()) {
        let c = compare(*xk, *yk);
        if c != 0 {
            return c;
        }
        let c = compare(*xv, *yv);
        if c != 0 {
            return c;
        }
    }
    order(xs.len().cmp(&ys.len()))
}

fn alias_name(v: &Generic) -> Vec<u8> {
    v.indirect_slot(IndirectSlots::ALIAS)
        .and_then(|n| n.as_bytes().map(<[u8]>::to_vec))
        .unwrap_or_default()
}
