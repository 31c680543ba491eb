//! Structural Fingerprints
//!
//! xxhash64 over a canonical serialized form: the kind byte, then the
//! payload. Because the inplace encoding is canonical, equal values
//! fingerprint equally no matter where their bytes live; because
//! mapping pair hashes are sorted before mixing, pair order is as
//! irrelevant to the fingerprint as it is to comparison.

use super::resolve;
use std::hash::Hasher;
use strata_core::generic::{Generic, IndirectSlots, Kind};
use twox_hash::XxHash64;

const SEED: u64 = 0;

/// The 64-bit content fingerprint of a value.
pub fn fingerprint(v: Generic) -> u64 {
    let mut hasher = XxHash64::with_seed(SEED);
    write_value(&mut hasher, v);
    hasher.finish()
}

fn write_value(hasher: &mut XxHash64, v: Generic) {
    let v = resolve(v);
    let kind = v.kind();
    hasher.write_u8(kind as u8);
    match kind {
        Kind::Invalid | Kind::Null => {}
        Kind::Bool => hasher.write_u8(v.get_bool().unwrap() as u8),
        Kind::Int => {
            hasher.write_u64(v.get_uint().unwrap());
            hasher.write_u8(v.int_is_unsigned_extended() as u8);
        }
        Kind::Float => {
            let f = v.get_float().unwrap();
            // One fingerprint for every NaN payload, matching compare.
            let bits = if f.is_nan() {
                f64::NAN.to_bits()
            } else {
                f.to_bits()
            };
            hasher.write_u64(bits);
        }
        Kind::String => {
            let bytes = v.as_bytes().unwrap();
            hasher.write_u64(bytes.len() as u64);
            hasher.write(bytes);
        }
        Kind::Sequence => {
            let items = v.sequence_items().unwrap();
            hasher.write_u64(items.len() as u64);
            for item in items {
                hasher.write_u64(fingerprint(*item));
            }
        }
        Kind::Mapping => {
            let pairs = v.mapping_pairs().unwrap();
            hasher.write_u64(pairs.len() as u64);
            let mut pair_hashes: Vec<u64> = pairs
                .iter()
                .map(|p| {
                    let mut h = XxHash64::with_seed(SEED);
                    h.write_u64(fingerprint(p.key));
                    h.write_u64(fingerprint(p.value));
                    h.finish()
                })
                .collect();
            pair_hashes.sort_unstable();
            for h in pair_hashes {
                hasher.write_u64(h);
            }
        }
        Kind::Alias => {
            if let Some(name) = v
                .indirect_slot(IndirectSlots::ALIAS)
                .and_then(|n| n.as_bytes().map(<[u8]>::to_vec))
            {
                hasher.write(&name);
            }
        }
        // resolve() never returns a bare indirect.
        Kind::Indirect => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::schema::Schema;

    fn builder() -> Builder {
        Builder::with_schema(Schema::Yaml1_2Core)
    }

    #[test]
    fn test_equal_values_equal_fingerprints() {
        let b = builder();
        assert_eq!(fingerprint(b.int(7)), fingerprint(b.int(7)));
        assert_eq!(
            fingerprint(b.string("hello, world")),
            fingerprint(b.string("hello, world"))
        );
        assert_eq!(fingerprint(Generic::NULL), fingerprint(b.null()));
    }

    #[test]
    fn test_kinds_do_not_collide_trivially() {
        let b = builder();
        assert_ne!(fingerprint(b.int(0)), fingerprint(b.float(0.0)));
        assert_ne!(fingerprint(b.int(1)), fingerprint(b.bool(true)));
        assert_ne!(fingerprint(Generic::NULL), fingerprint(b.string("")));
        assert_ne!(
            fingerprint(Generic::SEQ_EMPTY),
            fingerprint(Generic::MAP_EMPTY)
        );
    }

    #[test]
    fn test_collection_fingerprints() {
        let b = builder();
        let s1 = b.sequence(&[b.int(1), b.int(2)]);
        let s2 = b.sequence(&[b.int(1), b.int(2)]);
        let s3 = b.sequence(&[b.int(2), b.int(1)]);
        assert_eq!(fingerprint(s1), fingerprint(s2));
        // Sequence order matters.
        assert_ne!(fingerprint(s1), fingerprint(s3));
    }

    #[test]
    fn test_mapping_pair_order_irrelevant() {
        let b = builder();
        let m1 = b.mapping(&[b.string("a"), b.int(1), b.string("b"), b.int(2)]);
        let m2 = b.mapping(&[b.string("b"), b.int(2), b.string("a"), b.int(1)]);
        assert_eq!(fingerprint(m1), fingerprint(m2));
    }

    #[test]
    fn test_nan_fingerprint_canonical() {
        let b = builder();
        let quiet = b.float(f64::NAN);
        let payload = b.float(f64::from_bits(f64::NAN.to_bits() | 0xDEAD));
        assert_eq!(fingerprint(quiet), fingerprint(payload));
    }

    #[test]
    fn test_storage_path_irrelevant() {
        let b = builder();
        // The same logical value built in two different builders.
        let other = Builder::with_schema(Schema::Yaml1_2Core);
        let long = "a string that cannot be inplace encoded";
        assert_eq!(
            fingerprint(b.string(long)),
            fingerprint(other.string(long))
        );
    }
}
