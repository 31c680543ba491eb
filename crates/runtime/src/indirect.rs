//! Indirect Metadata Wrappers
//!
//! An indirect value wraps another value with document metadata: the
//! anchor that names it, an explicit tag, presentation style, comments,
//! source markers, collected diagnostics, and the failsafe-string mark.
//! The payload is a slot bitmap followed by exactly the populated slots
//! in fixed order, so a bare anchor costs two words and a fully loaded
//! node pays only for what it carries.
//!
//! An alias is an indirect whose value slot holds the sentinel and
//! whose alias slot names the anchor it refers to.

use crate::builder::Builder;
use crate::error::ErrorKind;
use crate::event::NodeStyle;
use crate::store;
use strata_core::generic::{Generic, IndirectSlots};
use strata_core::varint;

/// A line/column source position, 1-based as parsers report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

/// A source extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

/// A source marker: which input the node came from and where.
///
/// Markers serialize to a small byte blob: the file id and start
/// position as varints, then the end position as varint deltas from
/// the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Index into the decode run's input table.
    pub file_id: u32,
    pub span: Span,
}

impl Marker {
    pub fn to_value(&self, b: &Builder) -> Generic {
        let mut buf = [0u8; varint::MAX_LEN * 5];
        let mut at = 0;
        for field in [
            u64::from(self.file_id),
            u64::from(self.span.start.line),
            u64::from(self.span.start.col),
            u64::from(self.span.end.line.saturating_sub(self.span.start.line)),
            u64::from(self.span.end.col),
        ] {
            let mut scratch = [0u8; varint::MAX_LEN];
            let n = varint::encode(field, &mut scratch);
            buf[at..at + n].copy_from_slice(&scratch[..n]);
            at += n;
        }
        b.bytes(&buf[..at])
    }

    pub fn from_value(v: Generic) -> Option<Marker> {
        let bytes = v.as_bytes()?;
        let mut at = 0;
        let mut fields = [0u64; 5];
        for slot in fields.iter_mut() {
            let (value, n) = varint::decode(&bytes[at..]).ok()?;
            *slot = value;
            at += n;
        }
        let start = Position {
            line: u32::try_from(fields[1]).ok()?,
            col: u32::try_from(fields[2]).ok()?,
        };
        Some(Marker {
            file_id: u32::try_from(fields[0]).ok()?,
            span: Span {
                start,
                end: Position {
                    line: start.line + u32::try_from(fields[3]).ok()?,
                    col: u32::try_from(fields[4]).ok()?,
                },
            },
        })
    }
}

/// Everything an indirect wrapper can carry. Unset slots cost nothing.
#[derive(Default)]
pub struct IndirectInit {
    pub value: Option<Generic>,
    pub anchor: Option<Generic>,
    pub tag: Option<Generic>,
    pub diag: Option<Generic>,
    pub marker: Option<Generic>,
    pub comment: Option<Generic>,
    pub style: Option<NodeStyle>,
    pub failsafe_str: bool,
}

impl Builder {
    /// Wrap a value with metadata.
    ///
    /// Degenerate wrappers are elided: with nothing but a value slot
    /// the value itself comes back, and with no slots at all the result
    /// is null.
    pub fn indirect(&self, init: &IndirectInit) -> Generic {
        let mut slots = IndirectSlots::empty();
        let mut words: Vec<Generic> = Vec::with_capacity(4);
        let mut put = |slot: IndirectSlots, word: Generic| {
            slots |= slot;
            words.push(word);
        };
        if let Some(v) = init.value {
            if v.is_invalid() {
                return self.fail(ErrorKind::InvalidInput, "invalid value in indirect");
            }
            put(IndirectSlots::VALUE, v);
        }
        for (slot, field) in [
            (IndirectSlots::ANCHOR, init.anchor),
            (IndirectSlots::TAG, init.tag),
            (IndirectSlots::DIAG, init.diag),
            (IndirectSlots::MARKER, init.marker),
            (IndirectSlots::COMMENT, init.comment),
        ] {
            if let Some(word) = field {
                if word.is_invalid() {
                    return self.fail(ErrorKind::InvalidInput, "invalid slot in indirect");
                }
                put(slot, word);
            }
        }
        if let Some(style) = init.style {
            put(IndirectSlots::STYLE, self.int(style as i64));
        }
        if init.failsafe_str {
            put(IndirectSlots::FAILSAFE_STR, Generic::TRUE);
        }

        if slots.is_empty() {
            return Generic::NULL;
        }
        if slots == IndirectSlots::VALUE {
            return words[0];
        }
        self.indirect_raw(slots, &words)
    }

    /// An alias node referring to `anchor`.
    pub fn alias(&self, anchor: &str) -> Generic {
        let name = self.string(anchor);
        if name.is_invalid() {
            return name;
        }
        self.indirect_raw(
            IndirectSlots::VALUE | IndirectSlots::ALIAS,
            &[Generic::INVALID, name],
        )
    }

    /// Raw slot storage; `words` must match `slots` in population order.
    pub(crate) fn indirect_raw(&self, slots: IndirectSlots, words: &[Generic]) -> Generic {
        debug_assert_eq!(slots.bits().count_ones() as usize, words.len());
        if slots.is_empty() {
            return Generic::NULL;
        }
        let flags = slots.bits().to_ne_bytes();
        let ptr = self.store_segments(
            &[&flags, store::words_as_bytes(words)],
            strata_core::generic::COLLECTION_ALIGN,
        );
        if ptr.is_null() {
            return self.fail_alloc();
        }
        Generic::from_indirect_ptr(ptr)
    }
}

// =============================================================================
// Slot accessors
// =============================================================================

pub fn anchor_of(v: Generic) -> Option<Generic> {
    v.indirect_slot(IndirectSlots::ANCHOR)
}

pub fn tag_of(v: Generic) -> Option<Generic> {
    v.indirect_slot(IndirectSlots::TAG)
}

pub fn comment_of(v: Generic) -> Option<Generic> {
    v.indirect_slot(IndirectSlots::COMMENT)
}

pub fn diag_of(v: Generic) -> Option<Generic> {
    v.indirect_slot(IndirectSlots::DIAG)
}

/// The anchor name an alias refers to.
pub fn alias_target(v: Generic) -> Option<Generic> {
    v.indirect_slot(IndirectSlots::ALIAS)
}

pub fn style_of(v: Generic) -> Option<NodeStyle> {
    v.indirect_slot(IndirectSlots::STYLE)
        .and_then(|s| s.get_int())
        .and_then(NodeStyle::from_discriminant)
}

pub fn marker_of(v: Generic) -> Option<Marker> {
    v.indirect_slot(IndirectSlots::MARKER)
        .and_then(Marker::from_value)
}

/// Whether the node carries the failsafe-string mark.
pub fn is_failsafe_str(v: Generic) -> bool {
    v.indirect_slot(IndirectSlots::FAILSAFE_STR).is_some()
}
