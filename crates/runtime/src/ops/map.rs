//! Mapping Operations
//!
//! Functional updates over key/value pairs. Key equality is structural
//! comparison throughout. Two duplicate-key regimes apply: `assoc` and
//! `Set` update existing keys by design, while append/concat/merge
//! follow the merge rule, where `DUPLICATE_KEYS_DISABLED` turns a
//! duplicate into a failure and later writes win otherwise.

use crate::builder::{Builder, BuilderFlags};
use crate::error::ErrorKind;
use crate::store;
use strata_core::generic::{Generic, MapPair};

fn require_pairs<'a>(b: &Builder, v: &'a Generic) -> Result<&'a [MapPair], Generic> {
    match v.mapping_pairs() {
        Some(pairs) => Ok(pairs),
        None => Err(b.fail(ErrorKind::KindMismatch, "not a mapping")),
    }
}

fn flat(pairs: &[MapPair]) -> Vec<Generic> {
    let mut kv = Vec::with_capacity(pairs.len() * 2);
    for pair in pairs {
        kv.push(pair.key);
        kv.push(pair.value);
    }
    kv
}

fn find_key(kv: &[Generic], key: Generic) -> Option<usize> {
    (0..kv.len())
        .step_by(2)
        .find(|i| store::eq(kv[*i], key))
}

/// Write `updates` (alternating key/value) into `kv`, updating
/// existing keys in place and appending new ones. Under the merge rule
/// an existing key is a failure when duplicates are disabled.
fn write_pairs(
    b: &Builder,
    kv: &mut Vec<Generic>,
    updates: &[Generic],
    merge_rule: bool,
) -> Result<(), Generic> {
    if updates.len() % 2 != 0 {
        return Err(b.fail(ErrorKind::InvalidInput, "odd key/value item count"));
    }
    for pair in updates.chunks_exact(2) {
        let (key, value) = (pair[0], pair[1]);
        match find_key(kv, key) {
            Some(at) => {
                if merge_rule
                    && b.flags().contains(BuilderFlags::DUPLICATE_KEYS_DISABLED)
                {
                    return Err(b.fail(ErrorKind::DuplicateKey, "duplicate mapping key"));
                }
                kv[at + 1] = value;
            }
            None => {
                kv.push(key);
                kv.push(value);
            }
        }
    }
    Ok(())
}

/// `CreateMap` from `[key, value]` mini-sequence items.
pub(crate) fn create_from_pairs(b: &Builder, items: &[Generic]) -> Generic {
    let mut kv = Vec::with_capacity(items.len() * 2);
    for item in items {
        let item = store::resolve(*item);
        match item.sequence_items() {
            Some([key, value]) => {
                kv.push(*key);
                kv.push(*value);
            }
            _ => return b.fail(ErrorKind::InvalidInput, "map item is not a pair"),
        }
    }
    b.mapping(&kv)
}

/// Update or add keys; updating an existing key is the point, so the
/// duplicate rule does not apply.
pub(crate) fn assoc(b: &Builder, input: Generic, updates: &[Generic]) -> Generic {
    assoc_inner(b, input, updates, false)
}

/// Append new pairs under the merge rule.
pub(crate) fn append(b: &Builder, input: Generic, updates: &[Generic]) -> Generic {
    assoc_inner(b, input, updates, true)
}

fn assoc_inner(b: &Builder, input: Generic, updates: &[Generic], merge_rule: bool) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let mut kv = flat(pairs);
    if let Err(e) = write_pairs(b, &mut kv, updates, merge_rule) {
        return e;
    }
    b.mapping_raw(&kv)
}

/// Remove keys; absent keys are not an error.
pub(crate) fn disassoc(b: &Builder, input: Generic, keys: &[Generic]) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let mut kv = Vec::with_capacity(pairs.len() * 2);
    for pair in pairs {
        if !keys.iter().any(|key| store::eq(pair.key, *key)) {
            kv.push(pair.key);
            kv.push(pair.value);
        }
    }
    b.mapping_raw(&kv)
}

pub(crate) fn keys(b: &Builder, input: Generic) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let out: Vec<Generic> = pairs.iter().map(|p| p.key).collect();
    b.sequence(&out)
}

pub(crate) fn values(b: &Builder, input: Generic) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let out: Vec<Generic> = pairs.iter().map(|p| p.value).collect();
    b.sequence(&out)
}

/// Project to a sequence of `[key, value]` mini-sequences.
pub(crate) fn items(b: &Builder, input: Generic) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let mut out = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let item = b.sequence(&[pair.key, pair.value]);
        if item.is_invalid() {
            return item;
        }
        out.push(item);
    }
    b.sequence(&out)
}

/// True when every probe occurs as a key.
pub(crate) fn contains(b: &Builder, input: Generic, probes: &[Generic]) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let all = probes
        .iter()
        .all(|probe| pairs.iter().any(|pair| store::eq(pair.key, *probe)));
    Generic::from_bool(all)
}

/// Shallow concatenation under the merge rule.
pub(crate) fn concat(b: &Builder, input: Generic, others: &[Generic]) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let mut kv = flat(pairs);
    for other in others {
        let other = store::resolve(*other);
        let more = match require_pairs(b, &other) {
            Ok(more) => more,
            Err(e) => return e,
        };
        if let Err(e) = write_pairs(b, &mut kv, &flat(more), true) {
            return e;
        }
    }
    b.mapping_raw(&kv)
}

pub(crate) fn reverse(b: &Builder, input: Generic) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let mut kv = Vec::with_capacity(pairs.len() * 2);
    for pair in pairs.iter().rev() {
        kv.push(pair.key);
        kv.push(pair.value);
    }
    b.mapping_raw(&kv)
}

/// Deep merge: recurse where both sides map a key to a mapping,
/// otherwise the right side wins.
pub(crate) fn merge(b: &Builder, input: Generic, others: &[Generic]) -> Generic {
    let mut acc = input;
    for other in others {
        acc = merge_two(b, acc, store::resolve(*other));
        if acc.is_invalid() {
            return acc;
        }
    }
    acc
}

fn merge_two(b: &Builder, left: Generic, right: Generic) -> Generic {
    let left_pairs = match require_pairs(b, &left) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let right_pairs = match require_pairs(b, &right) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    let mut kv = flat(left_pairs);
    for pair in right_pairs {
        match find_key(&kv, pair.key) {
            Some(at) => {
                let left_value = store::resolve(kv[at + 1]);
                let right_value = store::resolve(pair.value);
                if left_value.is_mapping() && right_value.is_mapping() {
                    let merged = merge_two(b, left_value, right_value);
                    if merged.is_invalid() {
                        return merged;
                    }
                    kv[at + 1] = merged;
                } else {
                    kv[at + 1] = pair.value;
                }
            }
            None => {
                kv.push(pair.key);
                kv.push(pair.value);
            }
        }
    }
    b.mapping_raw(&kv)
}

/// Key lookup: the value, the default, or null, in that order; a
/// non-mapping input is a failure, which is how callers tell "absent"
/// from "broken".
pub(crate) fn get(b: &Builder, input: Generic, key: Generic, default: Option<Generic>) -> Generic {
    let pairs = match require_pairs(b, &input) {
        Ok(pairs) => pairs,
        Err(e) => return e,
    };
    pairs
        .iter()
        .find(|pair| store::eq(pair.key, key))
        .map(|pair| pair.value)
        .or(default)
        .unwrap_or(Generic::NULL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderConfig;
    use crate::schema::Schema;

    fn builder() -> Builder {
        Builder::with_schema(Schema::Yaml1_2Core)
    }

    fn config_map(b: &Builder) -> Generic {
        b.mapping(&[
            b.string("host"),
            b.string("localhost"),
            b.string("port"),
            b.int(8080),
        ])
    }

    #[test]
    fn test_get_and_default() {
        let b = builder();
        let m = config_map(&b);
        assert_eq!(get(&b, m, b.string("port"), None).get_int(), Some(8080));
        assert!(get(&b, m, b.string("missing"), None).is_null());
        assert_eq!(
            get(&b, m, b.string("missing"), Some(b.int(-1))).get_int(),
            Some(-1)
        );
        assert!(get(&b, b.int(5), b.string("k"), None).is_invalid());
    }

    #[test]
    fn test_assoc_updates_and_adds() {
        let b = builder();
        let m = config_map(&b);
        let m2 = assoc(
            &b,
            m,
            &[b.string("port"), b.int(9090), b.string("tls"), b.bool(true)],
        );
        assert_eq!(get(&b, m2, b.string("port"), None).get_int(), Some(9090));
        assert_eq!(get(&b, m2, b.string("tls"), None).get_bool(), Some(true));
        // Input untouched.
        assert_eq!(get(&b, m, b.string("port"), None).get_int(), Some(8080));
    }

    #[test]
    fn test_append_merge_rule() {
        let b = Builder::new(BuilderConfig {
            flags: BuilderFlags::CREATE_ALLOCATOR
                | BuilderFlags::CREATE_TAG
                | BuilderFlags::SCOPE_LEADER
                | BuilderFlags::DUPLICATE_KEYS_DISABLED,
            ..BuilderConfig::default()
        })
        .unwrap();
        let m = b.mapping(&[b.string("k"), b.int(1)]);
        assert!(append(&b, m, &[b.string("k"), b.int(2)]).is_invalid());
        // A fresh key is fine.
        let ok = append(&b, m, &[b.string("j"), b.int(2)]);
        assert_eq!(ok.collection_len(), Some(2));
        // Assoc updates regardless of the flag.
        let updated = assoc(&b, m, &[b.string("k"), b.int(2)]);
        assert_eq!(get(&b, updated, b.string("k"), None).get_int(), Some(2));
    }

    #[test]
    fn test_disassoc() {
        let b = builder();
        let m = config_map(&b);
        let m2 = disassoc(&b, m, &[b.string("host"), b.string("absent")]);
        assert_eq!(m2.collection_len(), Some(1));
        assert!(get(&b, m2, b.string("host"), None).is_null());
    }

    #[test]
    fn test_projections() {
        let b = builder();
        let m = config_map(&b);

        let ks = keys(&b, m);
        assert_eq!(ks.sequence_items().unwrap()[0].as_str(), Some("host"));

        let vs = values(&b, m);
        assert_eq!(vs.sequence_items().unwrap()[1].get_int(), Some(8080));

        let is = items(&b, m);
        let first = is.sequence_items().unwrap()[0];
        let pair = first.sequence_items().unwrap();
        assert_eq!(pair[0].as_str(), Some("host"));
        assert_eq!(pair[1].as_str(), Some("localhost"));
    }

    #[test]
    fn test_contains_keys() {
        let b = builder();
        let m = config_map(&b);
        assert_eq!(contains(&b, m, &[b.string("host")]).get_bool(), Some(true));
        assert_eq!(
            contains(&b, m, &[b.string("host"), b.string("nope")]).get_bool(),
            Some(false)
        );
    }

    #[test]
    fn test_concat_right_wins() {
        let b = builder();
        let m1 = b.mapping(&[b.string("a"), b.int(1), b.string("b"), b.int(2)]);
        let m2 = b.mapping(&[b.string("b"), b.int(9), b.string("c"), b.int(3)]);
        let out = concat(&b, m1, &[m2]);
        assert_eq!(out.collection_len(), Some(3));
        assert_eq!(get(&b, out, b.string("b"), None).get_int(), Some(9));
    }

    #[test]
    fn test_reverse_pair_order() {
        let b = builder();
        let m = config_map(&b);
        let r = reverse(&b, m);
        assert_eq!(
            r.mapping_pairs().unwrap()[0].key.as_str(),
            Some("port")
        );
    }

    #[test]
    fn test_deep_merge() {
        let b = builder();
        // merge({a: {x: 1}}, {a: {y: 2}, b: 3}) == {a: {x: 1, y: 2}, b: 3}
        let left = b.mapping(&[
            b.string("a"),
            b.mapping(&[b.string("x"), b.int(1)]),
        ]);
        let right = b.mapping(&[
            b.string("a"),
            b.mapping(&[b.string("y"), b.int(2)]),
            b.string("b"),
            b.int(3),
        ]);
        let merged = merge(&b, left, &[right]);
        assert_eq!(merged.collection_len(), Some(2));
        let a = get(&b, merged, b.string("a"), None);
        assert_eq!(a.collection_len(), Some(2));
        assert_eq!(get(&b, a, b.string("x"), None).get_int(), Some(1));
        assert_eq!(get(&b, a, b.string("y"), None).get_int(), Some(2));
        assert_eq!(get(&b, merged, b.string("b"), None).get_int(), Some(3));
    }

    #[test]
    fn test_merge_associativity_on_disjoint_keys() {
        let b = builder();
        let m1 = b.mapping(&[b.string("a"), b.int(1)]);
        let m2 = b.mapping(&[b.string("b"), b.int(2)]);
        let m3 = b.mapping(&[b.string("c"), b.int(3)]);
        let left_first = merge(&b, merge(&b, m1, &[m2]), &[m3]);
        let right_first = merge(&b, m1, &[merge(&b, m2, &[m3])]);
        assert_eq!(store::compare(left_first, right_first), 0);
    }

    #[test]
    fn test_scalar_right_wins_in_merge() {
        let b = builder();
        let left = b.mapping(&[b.string("k"), b.mapping(&[b.string("x"), b.int(1)])]);
        let right = b.mapping(&[b.string("k"), b.int(5)]);
        let merged = merge(&b, left, &[right]);
        assert_eq!(get(&b, merged, b.string("k"), None).get_int(), Some(5));
    }
}
