//! Emit Configuration and Driver
//!
//! Emitting is the iterator feeding an [`EventSink`]: the value walks
//! out as events and the sink renders them. The config mirrors the
//! parse side for the version selector and adds the presentation knobs
//! (indent, width, style, color) that text-producing sinks honor.

use crate::decode::ParseMode;
use crate::error::ErrorKind;
use crate::event::EventSink;
use crate::iter::{IterFlags, ValueIter};
use crate::schema::Schema;
use bitflags::bitflags;
use strata_core::generic::Generic;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EmitFlags: u32 {
        /// Do not append the final newline.
        const NO_ENDING_NEWLINE = 1 << 0;
        /// Render preserved comments.
        const OUTPUT_COMMENTS = 1 << 1;
    }
}

/// Indentation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indent {
    #[default]
    Default,
    One,
    Two,
    Three,
    Four,
    Six,
    Eight,
}

impl Indent {
    pub fn columns(self) -> usize {
        match self {
            Indent::Default | Indent::Two => 2,
            Indent::One => 1,
            Indent::Three => 3,
            Indent::Four => 4,
            Indent::Six => 6,
            Indent::Eight => 8,
        }
    }
}

/// Preferred output width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Width {
    #[default]
    Default,
    W80,
    W132,
    Infinite,
    /// Adapt to the terminal via `COLUMNS`.
    Terminal,
}

impl Width {
    pub fn columns(self) -> Option<usize> {
        match self {
            Width::Default | Width::W80 => Some(80),
            Width::W132 => Some(132),
            Width::Infinite => None,
            Width::Terminal => std::env::var("COLUMNS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(Some(80)),
        }
    }
}

/// Overall rendering shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitStyle {
    #[default]
    Default,
    Block,
    Flow,
    Pretty,
    Compact,
    Oneline,
}

/// Terminal color policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Auto,
    None,
    Force,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmitConfig {
    /// Output language; mirrors the parse-mode selector.
    pub mode: ParseMode,
    pub indent: Indent,
    pub width: Width,
    pub style: EmitStyle,
    pub color: Color,
    pub flags: EmitFlags,
}

impl EmitConfig {
    /// The schema governing scalar literal forms on the way out.
    pub fn schema(&self, fallback: Schema) -> Schema {
        self.mode.schema(fallback)
    }

    fn iter_flags(&self) -> IterFlags {
        let mut flags = IterFlags::empty();
        if !self.flags.contains(EmitFlags::OUTPUT_COMMENTS) {
            flags |= IterFlags::STRIP_COMMENTS;
        }
        flags
    }
}

/// Where rendered text lands.
pub enum EmitTarget<'a> {
    String(&'a mut String),
    File(&'a std::path::Path),
    /// A descriptor-shaped destination.
    Writer(&'a mut dyn std::io::Write),
    Stdout,
    Stderr,
}

impl EmitTarget<'_> {
    /// Deliver finished text, appending the trailing newline unless the
    /// config opted out.
    pub fn deliver(self, mut text: String, config: &EmitConfig) -> Result<(), ErrorKind> {
        use std::io::Write;
        if !config.flags.contains(EmitFlags::NO_ENDING_NEWLINE) {
            text.push('\n');
        }
        match self {
            EmitTarget::String(out) => {
                out.push_str(&text);
                Ok(())
            }
            EmitTarget::File(path) => Ok(std::fs::write(path, text)?),
            EmitTarget::Writer(writer) => Ok(writer.write_all(text.as_bytes())?),
            EmitTarget::Stdout => Ok(std::io::stdout().write_all(text.as_bytes())?),
            EmitTarget::Stderr => Ok(std::io::stderr().write_all(text.as_bytes())?),
        }
    }
}

/// Drive `v` through `sink` as a single document.
pub fn emit(
    v: Generic,
    schema: Schema,
    config: &EmitConfig,
    sink: &mut dyn EventSink,
) -> Result<(), ErrorKind> {
    if v.is_invalid() {
        return Err(ErrorKind::InvalidInput);
    }
    let mut iter = ValueIter::new(v, config.schema(schema), config.iter_flags());
    drive(&mut iter, sink)
}

/// Drive a directory value through `sink`, one document per element.
pub fn emit_directory(
    v: Generic,
    schema: Schema,
    config: &EmitConfig,
    sink: &mut dyn EventSink,
) -> Result<(), ErrorKind> {
    if v.is_invalid() {
        return Err(ErrorKind::InvalidInput);
    }
    let mut iter = ValueIter::new_directory(v, config.schema(schema), config.iter_flags());
    drive(&mut iter, sink)
}

fn drive(iter: &mut ValueIter, sink: &mut dyn EventSink) -> Result<(), ErrorKind> {
    while let Some(event) = iter.next_event() {
        sink.emit(&event)?;
    }
    if iter.take_error() {
        return Err(ErrorKind::InvalidInput);
    }
    Ok(())
}
