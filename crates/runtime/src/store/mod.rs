//! Value Store
//!
//! The canonical write path: scalar and collection constructors that
//! always try the inplace encoding first and only then intern an
//! out-of-place payload into the builder's tag. Canonical inplace
//! encoding is what makes word equality, structural hashing and dedup
//! line up: a value that can live in the word never exists as a blob.
//!
//! Construction is total. Failures come back as `INVALID` with the
//! failure recorded against the builder, never as a panic.

mod compare;
mod copy;
mod hash;

pub use compare::{compare, eq, ordering};
pub use copy::{copy, internalize, relocate};
pub use hash::fingerprint;

use crate::builder::{Builder, BuilderFlags};
use crate::error::ErrorKind;
use strata_core::generic::{
    COLLECTION_ALIGN, Generic, INT_FLAG_UNSIGNED, IndirectSlots, IntPayload, Kind, SCALAR_ALIGN,
    mapping_storage_size, sequence_storage_size,
};
use strata_core::varint;

/// Unwrap indirect metadata down to the value it carries.
///
/// Aliases are left alone; they carry no value until resolution. An
/// indirect wrapper without a value slot reads as null.
pub fn resolve(v: Generic) -> Generic {
    let mut current = v;
    while current.kind() == Kind::Indirect {
        match current.indirect_slot(IndirectSlots::VALUE) {
            Some(inner) => current = inner,
            None => return Generic::NULL,
        }
    }
    current
}

/// Reinterpret a word slice as its raw bytes for storage.
pub(crate) fn words_as_bytes(items: &[Generic]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(items.as_ptr().cast::<u8>(), std::mem::size_of_val(items))
    }
}

impl Builder {
    // =========================================================================
    // Scalar constructors
    // =========================================================================

    pub fn null(&self) -> Generic {
        Generic::NULL
    }

    pub fn bool(&self, v: bool) -> Generic {
        Generic::from_bool(v)
    }

    /// A signed integer; inplace when it fits the inline range.
    pub fn int(&self, v: i64) -> Generic {
        if let Some(w) = Generic::int_in_place(v) {
            return w;
        }
        self.int_payload(v as u64, 0)
    }

    /// An unsigned integer; the unsigned-extend flag is set only beyond
    /// the signed 64-bit range.
    pub fn uint(&self, v: u64) -> Generic {
        if v <= i64::MAX as u64 {
            return self.int(v as i64);
        }
        self.int_payload(v, INT_FLAG_UNSIGNED)
    }

    fn int_payload(&self, value: u64, flags: u64) -> Generic {
        let payload = IntPayload { value, flags };
        let bytes = unsafe {
            std::slice::from_raw_parts(
                (&raw const payload).cast::<u8>(),
                size_of::<IntPayload>(),
            )
        };
        let ptr = self.store_bytes(bytes, SCALAR_ALIGN);
        if ptr.is_null() {
            return self.fail_alloc();
        }
        Generic::from_int_ptr(ptr.cast())
    }

    /// A float; inplace when it survives the `f32` round trip.
    pub fn float(&self, v: f64) -> Generic {
        if let Some(w) = Generic::float_in_place(v) {
            return w;
        }
        let bytes = v.to_ne_bytes();
        let ptr = self.store_bytes(&bytes, SCALAR_ALIGN);
        if ptr.is_null() {
            return self.fail_alloc();
        }
        Generic::from_float_ptr(ptr.cast())
    }

    pub fn string(&self, s: &str) -> Generic {
        self.bytes(s.as_bytes())
    }

    /// A byte string; out-of-place payloads get a varint length prefix
    /// and a NUL terminator that is not part of the logical length.
    pub fn bytes(&self, data: &[u8]) -> Generic {
        if let Some(w) = Generic::str_in_place(data) {
            return w;
        }
        let mut prefix = [0u8; varint::MAX_LEN];
        let n = varint::encode(data.len() as u64, &mut prefix);
        let ptr = self.store_segments(&[&prefix[..n], data, &[0u8]], SCALAR_ALIGN);
        if ptr.is_null() {
            return self.fail_alloc();
        }
        Generic::from_str_ptr(ptr)
    }

    // =========================================================================
    // Collection constructors
    // =========================================================================

    /// A sequence of `items`. Empty input returns the inplace singleton;
    /// an `INVALID` item poisons the whole construction.
    pub fn sequence(&self, items: &[Generic]) -> Generic {
        if items.iter().any(|v| v.is_invalid()) {
            return self.fail(ErrorKind::InvalidInput, "invalid value in sequence");
        }
        self.sequence_raw(items)
    }

    /// Sequence storage without the child check, for internal paths
    /// that already validated.
    pub(crate) fn sequence_raw(&self, items: &[Generic]) -> Generic {
        if items.is_empty() {
            return Generic::SEQ_EMPTY;
        }
        if sequence_storage_size(items.len()).is_none() {
            return self.fail(ErrorKind::Overflow, "sequence too large");
        }
        let count = items.len().to_ne_bytes();
        let ptr = self.store_segments(&[&count, words_as_bytes(items)], COLLECTION_ALIGN);
        if ptr.is_null() {
            return self.fail_alloc();
        }
        Generic::from_seq_ptr(ptr)
    }

    /// A mapping from alternating key/value words.
    ///
    /// Later writes win on duplicate keys, keeping the first position,
    /// unless `DUPLICATE_KEYS_DISABLED` turns duplicates into failures.
    pub fn mapping(&self, kv: &[Generic]) -> Generic {
        if kv.len() % 2 != 0 {
            return self.fail(ErrorKind::InvalidInput, "odd key/value item count");
        }
        if kv.iter().any(|v| v.is_invalid()) {
            return self.fail(ErrorKind::InvalidInput, "invalid value in mapping");
        }
        let mut out: Vec<Generic> = Vec::with_capacity(kv.len());
        for pair in kv.chunks_exact(2) {
            let (key, value) = (pair[0], pair[1]);
            let existing = (0..out.len())
                .step_by(2)
                .find(|i| compare(out[*i], key) == 0);
            match existing {
                Some(i) => {
                    if self
                        .flags()
                        .contains(BuilderFlags::DUPLICATE_KEYS_DISABLED)
                    {
                        return self.fail(ErrorKind::DuplicateKey, "duplicate mapping key");
                    }
                    out[i + 1] = value;
                }
                None => {
                    out.push(key);
                    out.push(value);
                }
            }
        }
        self.mapping_raw(&out)
    }

    /// Mapping storage without duplicate handling, for internal paths
    /// whose input is already key-unique.
    pub(crate) fn mapping_raw(&self, kv: &[Generic]) -> Generic {
        debug_assert_eq!(kv.len() % 2, 0);
        if kv.is_empty() {
            return Generic::MAP_EMPTY;
        }
        if mapping_storage_size(kv.len() / 2).is_none() {
            return self.fail(ErrorKind::Overflow, "mapping too large");
        }
        let count = (kv.len() / 2).to_ne_bytes();
        let ptr = self.store_segments(&[&count, words_as_bytes(kv)], COLLECTION_ALIGN);
        if ptr.is_null() {
            return self.fail_alloc();
        }
        Generic::from_map_ptr(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderConfig;
    use crate::schema::Schema;

    fn builder() -> Builder {
        Builder::with_schema(Schema::Yaml1_2Core)
    }

    #[test]
    fn test_int_inplace_canonicity() {
        let b = builder();
        let v = b.int(7);
        assert!(v.is_in_place());
        assert_eq!(v.to_bits() & 0b111, 1);
        assert_eq!(v.to_bits() >> 3, 7);
        assert_eq!(v.get_int(), Some(7));
    }

    #[test]
    fn test_large_int_goes_out_of_place() {
        let b = builder();
        let v = b.int(1 << 62);
        assert!(!v.is_in_place());
        assert_eq!(v.get_int(), Some(1 << 62));
        assert_eq!(v.get_uint(), Some(1 << 62));
        // Positive signed fits: no unsigned extension.
        assert!(!v.int_is_unsigned_extended());
    }

    #[test]
    fn test_uint_beyond_signed_range() {
        let b = builder();
        let v = b.uint(u64::MAX);
        assert!(v.int_is_unsigned_extended());
        assert_eq!(v.get_uint(), Some(u64::MAX));

        // Values that fit stay on the signed path.
        let small = b.uint(42);
        assert!(small.is_in_place());
        assert!(!small.int_is_unsigned_extended());
    }

    #[test]
    fn test_string_inplace_boundary() {
        let b = builder();
        let short = b.string("hello");
        assert!(short.is_in_place());
        assert_eq!(short.as_str(), Some("hello"));

        let long = b.string("hello, world");
        assert!(!long.is_in_place());
        assert_eq!(long.as_str(), Some("hello, world"));
        // Varint length prefix of a 12-byte string is the single byte 0x0C.
        let payload = long.payload_ptr().unwrap();
        assert_eq!(unsafe { *payload }, 0x0C);
        // NUL terminator just past the logical bytes.
        assert_eq!(unsafe { *payload.add(1 + 12) }, 0);
    }

    #[test]
    fn test_float_routing() {
        let b = builder();
        if cfg!(target_pointer_width = "64") {
            assert!(b.float(2.5).is_in_place());
        }
        let v = b.float(0.1);
        assert!(!v.is_in_place());
        assert_eq!(v.get_float(), Some(0.1));

        let nan = b.float(f64::NAN);
        assert!(!nan.is_in_place());
        assert!(nan.get_float().unwrap().is_nan());
    }

    #[test]
    fn test_sequence_construction() {
        let b = builder();
        let items = [b.int(1), b.string("two"), b.float(3.0)];
        let seq = b.sequence(&items);
        assert_eq!(seq.kind(), Kind::Sequence);
        let got = seq.sequence_items().unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].get_int(), Some(1));
        assert_eq!(got[1].as_str(), Some("two"));
    }

    #[test]
    fn test_empty_collections_are_singletons() {
        let b = builder();
        assert_eq!(b.sequence(&[]).to_bits(), Generic::SEQ_EMPTY.to_bits());
        assert_eq!(b.mapping(&[]).to_bits(), Generic::MAP_EMPTY.to_bits());
    }

    #[test]
    fn test_invalid_child_rejected() {
        let b = builder();
        assert!(b.sequence(&[b.int(1), Generic::INVALID]).is_invalid());
        assert!(b.mapping(&[b.string("k"), Generic::INVALID]).is_invalid());
    }

    #[test]
    fn test_mapping_later_write_wins() {
        let b = builder();
        let m = b.mapping(&[
            b.string("a"),
            b.int(1),
            b.string("b"),
            b.int(2),
            b.string("a"),
            b.int(3),
        ]);
        let pairs = m.mapping_pairs().unwrap();
        assert_eq!(pairs.len(), 2);
        // First position kept, later value won.
        assert_eq!(pairs[0].key.as_str(), Some("a"));
        assert_eq!(pairs[0].value.get_int(), Some(3));
        assert_eq!(pairs[1].key.as_str(), Some("b"));
    }

    #[test]
    fn test_duplicate_keys_disabled() {
        let b = Builder::new(BuilderConfig {
            flags: BuilderFlags::CREATE_ALLOCATOR
                | BuilderFlags::CREATE_TAG
                | BuilderFlags::SCOPE_LEADER
                | BuilderFlags::DUPLICATE_KEYS_DISABLED,
            ..BuilderConfig::default()
        })
        .unwrap();
        let m = b.mapping(&[b.string("k"), b.int(1), b.string("k"), b.int(2)]);
        assert!(m.is_invalid());
    }

    #[test]
    fn test_resolve_passes_plain_values() {
        let b = builder();
        let v = b.int(9);
        assert_eq!(resolve(v).to_bits(), v.to_bits());
    }
}
