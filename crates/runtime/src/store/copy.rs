//! Deep Copy, Internalization, Relocation
//!
//! `copy` rematerializes a value into a destination builder, interning
//! every out-of-place payload on the way down. `internalize` short
//! circuits when the destination already owns the storage. `relocate`
//! is the pointer-fixup pass a growable arena needs after moving: it
//! patches, in place, exactly the words whose payload fell inside the
//! moved range, walking iteratively with an explicit work stack.

use crate::builder::Builder;
use std::collections::HashSet;
use strata_core::generic::{Generic, Kind};

/// Recursively materialize `v` into `dst`'s tag.
///
/// Inplace values come back unchanged. An allocation failure anywhere
/// poisons the whole copy with `INVALID`.
pub fn copy(dst: &Builder, v: Generic) -> Generic {
    if v.is_in_place() {
        return v;
    }
    match v.kind() {
        Kind::Int => {
            if v.int_is_unsigned_extended() {
                dst.uint(v.get_uint().unwrap())
            } else {
                dst.int(v.get_int().unwrap())
            }
        }
        Kind::Float => dst.float(v.get_float().unwrap()),
        Kind::String => dst.bytes(v.as_bytes().unwrap()),
        Kind::Sequence => {
            let src = v.sequence_items().unwrap();
            let mut items = Vec::with_capacity(src.len());
            for item in src {
                let copied = copy(dst, *item);
                if copied.is_invalid() {
                    return copied;
                }
                items.push(copied);
            }
            dst.sequence_raw(&items)
        }
        Kind::Mapping => {
            let src = v.mapping_pairs().unwrap();
            let mut kv = Vec::with_capacity(src.len() * 2);
            for pair in src {
                let key = copy(dst, pair.key);
                let value = copy(dst, pair.value);
                if key.is_invalid() || value.is_invalid() {
                    return Generic::INVALID;
                }
                kv.push(key);
                kv.push(value);
            }
            dst.mapping_raw(&kv)
        }
        Kind::Indirect | Kind::Alias => {
            let (slots, words) = v.indirect_parts().unwrap();
            let mut copied = Vec::with_capacity(words.len());
            for word in words {
                // An alias's value slot is deliberately the sentinel;
                // it copies through untouched.
                if word.is_invalid() {
                    copied.push(*word);
                    continue;
                }
                let c = copy(dst, *word);
                if c.is_invalid() {
                    return c;
                }
                copied.push(c);
            }
            dst.indirect_raw(slots, &copied)
        }
        // Inplace kinds were returned above.
        Kind::Invalid | Kind::Null | Kind::Bool => unreachable!(),
    }
}

/// Copy `v` into `dst` only if `dst` does not already own its storage.
pub fn internalize(dst: &Builder, v: Generic) -> Generic {
    if v.is_in_place() || dst.contains(v) {
        return v;
    }
    copy(dst, v)
}

/// Patch pointers after an arena move.
///
/// Every word reachable from `root` whose payload pointer falls in
/// `[old_lo, old_hi)` is rewritten by `delta`, in place; cross-arena
/// references are untouched. Returns the patched root. `delta` must
/// preserve payload alignment, which arena-to-arena moves always do.
pub fn relocate(old_lo: usize, old_hi: usize, root: Generic, delta: isize) -> Generic {
    let patch = |w: Generic| -> Generic {
        match w.payload_ptr() {
            Some(p) if (p as usize) >= old_lo && (p as usize) < old_hi => unsafe {
                Generic::from_bits((w.to_bits() as isize + delta) as usize)
            },
            _ => w,
        }
    };

    let new_root = patch(root);
    let mut stack = vec![new_root];
    let mut seen: HashSet<usize> = HashSet::new();
    while let Some(v) = stack.pop() {
        let Some(payload) = v.payload_ptr() else {
            continue;
        };
        if !seen.insert(payload as usize) {
            continue;
        }
        // Child slots start one word past the count (collections) or
        // the slot bitmap (indirects); scalar payloads have none.
        let slot_count = match v.kind() {
            Kind::Sequence => v.sequence_items().map_or(0, <[Generic]>::len),
            Kind::Mapping => v.mapping_pairs().map_or(0, |p| p.len() * 2),
            Kind::Indirect | Kind::Alias => {
                v.indirect_parts().map_or(0, |(_, words)| words.len())
            }
            _ => 0,
        };
        if slot_count == 0 {
            continue;
        }
        let slots = unsafe { payload.cast::<Generic>().cast_mut().add(1) };
        for i in 0..slot_count {
            unsafe {
                let word = slots.add(i).read();
                let patched = patch(word);
                if patched.to_bits() != word.to_bits() {
                    slots.add(i).write(patched);
                }
                stack.push(patched);
            }
        }
    }
    new_root
}
