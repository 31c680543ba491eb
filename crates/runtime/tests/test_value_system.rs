//! End-to-end tests for the value system invariants
//!
//! These exercise the public surface the way host code uses it: build
//! values, compare and copy them, intern through a dedup allocator, and
//! account for tag lifetimes.

use strata_runtime::{
    AllocCaps, Builder, BuilderConfig, BuilderFlags, DedupAllocator, DedupConfig, Generic,
    GrowAllocator, GrowConfig, Kind, Schema, TagAllocator, compare, copy, eq, fingerprint,
    shared,
};

fn builder() -> Builder {
    Builder::with_schema(Schema::Yaml1_2Core)
}

fn sample_tree(b: &Builder) -> Generic {
    b.mapping(&[
        b.string("name"),
        b.string("production cluster configuration"),
        b.string("replicas"),
        b.int(3),
        b.string("weight"),
        b.float(0.75),
        b.string("hosts"),
        b.sequence(&[b.string("alpha.internal"), b.string("beta.internal")]),
        b.string("debug"),
        b.bool(false),
        b.string("expiry"),
        Generic::NULL,
    ])
}

#[test]
fn test_small_int_word_shape() {
    let b = builder();
    let v = b.int(7);
    // Tag 1, payload in the upper bits.
    assert_eq!(v.to_bits() & 0b111, 1);
    assert_eq!(v.to_bits() >> 3, 7);
    assert_eq!(v.get_int(), Some(7));
    assert!(v.is_in_place());
}

#[test]
fn test_large_int_views() {
    let b = builder();
    let v = b.int(1 << 62);
    assert!(!v.is_in_place());
    assert_eq!(v.get_int(), Some(1 << 62));
    assert_eq!(v.get_uint(), Some(1 << 62));
    assert!(!v.int_is_unsigned_extended());

    let u = b.uint(u64::MAX);
    assert!(u.int_is_unsigned_extended());
    assert_eq!(u.get_uint(), Some(u64::MAX));
}

#[test]
fn test_string_boundary() {
    let b = builder();
    assert!(b.string("hello").is_in_place());
    let v = b.string("hello, world");
    assert!(!v.is_in_place());
    assert_eq!(v.as_str(), Some("hello, world"));
    assert_eq!(unsafe { *v.payload_ptr().unwrap() }, 0x0C);
}

#[test]
fn test_mapping_get_with_default() {
    use strata_runtime::{OpCode, OpRequest, execute};

    let b = builder();
    let m = b.mapping(&[
        b.string("host"),
        b.string("localhost"),
        b.string("port"),
        b.int(8080),
    ]);
    let port = execute(
        &b,
        m,
        &mut OpRequest::new(OpCode::Get {
            key: b.string("port"),
            default: None,
        }),
    );
    assert_eq!(port.get_int(), Some(8080));
    let fallback = execute(
        &b,
        m,
        &mut OpRequest::new(OpCode::Get {
            key: b.string("missing"),
            default: Some(b.int(-1)),
        }),
    );
    assert_eq!(fallback.get_int(), Some(-1));
}

#[test]
fn test_copy_preserves_equality_and_kind() {
    let src = builder();
    let dst = builder();
    let v = sample_tree(&src);
    let copied = copy(&dst, v);
    assert_eq!(compare(v, copied), 0);
    assert_eq!(copied.kind(), v.kind());
    assert_eq!(fingerprint(v), fingerprint(copied));
    drop(src);
    // The copy survives its source builder.
    assert_eq!(copied.collection_len(), Some(6));
    assert!(dst.contains(copied));
}

#[test]
fn test_inplace_canonicity_through_construction() {
    let b = builder();
    // Everything inplace-representable must come out inplace.
    for v in [
        b.int(0),
        b.int(-1),
        b.int(1 << 40),
        b.string(""),
        b.string("seven b"),
        b.bool(true),
        b.null(),
        b.sequence(&[]),
        b.mapping(&[]),
    ] {
        assert!(v.is_in_place(), "{v:?} should be inplace");
    }
    if cfg!(target_pointer_width = "64") {
        assert!(b.float(1.5).is_in_place());
    }
}

#[test]
fn test_compare_is_a_total_order() {
    let b = builder();
    let values = [
        Generic::NULL,
        b.bool(false),
        b.bool(true),
        b.int(-10),
        b.int(10),
        b.uint(u64::MAX),
        b.float(-0.5),
        b.float(f64::NAN),
        b.string(""),
        b.string("zzz"),
        b.sequence(&[b.int(1)]),
        b.mapping(&[b.string("k"), b.int(1)]),
    ];
    for x in values {
        assert_eq!(compare(x, x), 0);
        for y in values {
            let xy = compare(x, y);
            assert!((-1..=1).contains(&xy));
            assert_eq!(xy, -compare(y, x));
            // Transitivity over every triple.
            for z in values {
                if xy <= 0 && compare(y, z) <= 0 {
                    assert!(compare(x, z) <= 0);
                }
            }
        }
    }
}

#[test]
fn test_dedup_interning_through_builder() {
    let allocator = shared(DedupAllocator::new(
        Box::new(GrowAllocator::new(GrowConfig::default())),
        DedupConfig::default(),
    ));
    let b = Builder::new(BuilderConfig {
        allocator: Some(allocator),
        flags: BuilderFlags::CREATE_TAG | BuilderFlags::SCOPE_LEADER | BuilderFlags::DEDUP_ENABLED,
        ..BuilderConfig::default()
    })
    .unwrap();

    let s1 = b.string("the same long string, interned exactly once");
    let s2 = b.string("the same long string, interned exactly once");
    // The dedup layer aliases equal bytes: pointer-identical words.
    assert_eq!(s1.to_bits(), s2.to_bits());
    assert!(eq(s1, s2));

    // Distinct content stays distinct.
    let s3 = b.string("a different long string, stored separately..");
    assert_ne!(s1.to_bits(), s3.to_bits());
}

#[test]
fn test_tag_release_frees_everything() {
    let allocator = shared(GrowAllocator::new(GrowConfig::default()));
    {
        let b = Builder::new(BuilderConfig {
            allocator: Some(allocator.clone()),
            flags: BuilderFlags::CREATE_TAG | BuilderFlags::SCOPE_LEADER,
            ..BuilderConfig::default()
        })
        .unwrap();
        let tag = b.tag();
        sample_tree(&b);
        assert!(b.used() > 0);
        drop(b);
        // The builder released its tag on drop.
        let guard = allocator.lock().unwrap();
        assert_eq!(guard.tag_linear_size(tag), 0);
    }
}

#[test]
fn test_allocator_capability_reporting() {
    let dedup = DedupAllocator::new(
        Box::new(GrowAllocator::new(GrowConfig::default())),
        DedupConfig::default(),
    );
    let caps = dedup.caps();
    assert!(caps.contains(AllocCaps::DEDUP));
    assert!(caps.contains(AllocCaps::LOOKUP));
    assert!(caps.contains(AllocCaps::FREE_TAG));

    let grow = GrowAllocator::new(GrowConfig::default());
    assert!(!grow.caps().contains(AllocCaps::DEDUP));
    assert!(grow.caps().contains(AllocCaps::TAGS));
}

#[test]
fn test_scope_export_lifecycle() {
    let leader = builder();
    let published = {
        let child = leader.scope();
        let temporary = child.string("only needed while building this document");
        let kept = child.sequence(&[temporary, child.int(1)]);
        child.export(kept)
    };
    // The child scope died with its tag; the exported value reads fine.
    let items = published.sequence_items().unwrap();
    assert_eq!(
        items[0].as_str(),
        Some("only needed while building this document")
    );
    assert_eq!(items[1].get_int(), Some(1));
    assert!(leader.contains(published));
}

#[test]
fn test_indirect_metadata_is_transparent_to_compare() {
    let b = builder();
    let plain = b.int(42);
    let wrapped = b.indirect(&strata_runtime::IndirectInit {
        value: Some(plain),
        anchor: Some(b.string("answer")),
        ..Default::default()
    });
    assert_eq!(wrapped.kind(), Kind::Indirect);
    assert_eq!(compare(plain, wrapped), 0);
    assert_eq!(fingerprint(plain), fingerprint(wrapped));
}
