//! Event Protocol
//!
//! The decoder consumes and the iterator produces the same stream
//! shape: `StreamStart, (DocumentStart, body…, DocumentEnd)+,
//! StreamEnd`, with scalars, aliases and collection brackets as body
//! events. Parsers feed the stream in through [`EventSource`]; emitters
//! take it back out through [`EventSink`]. Everything else in the
//! system is insulated from what produced or will consume the text.

use crate::error::ErrorKind;
use crate::indirect::Span;
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Presentation style of a node.
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStyle {
    /// No preference recorded.
    Any = 0,
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
    Flow,
    Block,
}

impl NodeStyle {
    pub fn from_discriminant(d: i64) -> Option<NodeStyle> {
        Some(match d {
            0 => NodeStyle::Any,
            1 => NodeStyle::Plain,
            2 => NodeStyle::SingleQuoted,
            3 => NodeStyle::DoubleQuoted,
            4 => NodeStyle::Literal,
            5 => NodeStyle::Folded,
            6 => NodeStyle::Flow,
            7 => NodeStyle::Block,
            _ => return None,
        })
    }

    /// Quoted and block-scalar styles pin the scalar to a string.
    pub fn forces_string(self) -> bool {
        matches!(
            self,
            NodeStyle::SingleQuoted | NodeStyle::DoubleQuoted | NodeStyle::Literal
                | NodeStyle::Folded
        )
    }
}

impl Default for NodeStyle {
    fn default() -> Self {
        NodeStyle::Any
    }
}

/// A `%YAML` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDirective {
    pub major: u32,
    pub minor: u32,
}

/// A `%TAG` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDirective {
    pub handle: String,
    pub prefix: String,
}

/// Per-document state carried on `DocumentStart` and preserved by the
/// directory so emitting can reconstruct the directives.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentState {
    pub version: Option<VersionDirective>,
    pub tags: Vec<TagDirective>,
    pub schema: Option<String>,
    /// Whether `%YAML` appeared in the source text.
    pub version_explicit: bool,
    /// Whether any `%TAG` appeared in the source text.
    pub tags_explicit: bool,
}

/// A scalar body event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScalarEvent {
    pub value: String,
    pub style: NodeStyle,
    pub anchor: Option<String>,
    pub tag: Option<String>,
    pub comment: Option<String>,
    pub span: Option<Span>,
}

/// A sequence or mapping start event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionStart {
    pub anchor: Option<String>,
    pub tag: Option<String>,
    pub style: NodeStyle,
    pub comment: Option<String>,
    pub span: Option<Span>,
}

/// One step of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StreamStart,
    StreamEnd,
    DocumentStart(DocumentState),
    DocumentEnd,
    Scalar(ScalarEvent),
    Alias(String),
    SequenceStart(CollectionStart),
    SequenceEnd,
    MappingStart(CollectionStart),
    MappingEnd,
}

impl Event {
    /// A plain scalar with no decoration, the common case in tests and
    /// adapters.
    pub fn plain_scalar(value: impl Into<String>) -> Event {
        Event::Scalar(ScalarEvent {
            value: value.into(),
            style: NodeStyle::Plain,
            ..ScalarEvent::default()
        })
    }

    /// A quoted scalar, pinned to string under every schema.
    pub fn quoted_scalar(value: impl Into<String>) -> Event {
        Event::Scalar(ScalarEvent {
            value: value.into(),
            style: NodeStyle::DoubleQuoted,
            ..ScalarEvent::default()
        })
    }
}

/// Where decode pulls events from; the parser-facing boundary.
pub trait EventSource {
    /// The next event, `None` once the stream is exhausted.
    fn next_event(&mut self) -> Result<Option<Event>, ErrorKind>;

    /// The schema the source wants applied, when it knows better than
    /// the builder (a JSON parser does).
    fn preferred_schema(&self) -> Option<Schema> {
        None
    }
}

/// Where emit pushes events to; the emitter-facing boundary.
pub trait EventSink {
    fn emit(&mut self, event: &Event) -> Result<(), ErrorKind>;
}

/// An event source over a pre-recorded stream, used by tests and by
/// adapters that materialize their events up front.
pub struct VecSource {
    events: VecDeque<Event>,
    schema: Option<Schema>,
}

impl VecSource {
    pub fn new(events: Vec<Event>) -> VecSource {
        VecSource {
            events: events.into(),
            schema: None,
        }
    }

    pub fn with_schema(events: Vec<Event>, schema: Schema) -> VecSource {
        VecSource {
            events: events.into(),
            schema: Some(schema),
        }
    }

    /// Wrap body events into a complete single-document stream.
    pub fn document(body: Vec<Event>) -> VecSource {
        let mut events = Vec::with_capacity(body.len() + 4);
        events.push(Event::StreamStart);
        events.push(Event::DocumentStart(DocumentState::default()));
        events.extend(body);
        events.push(Event::DocumentEnd);
        events.push(Event::StreamEnd);
        VecSource::new(events)
    }
}

impl EventSource for VecSource {
    fn next_event(&mut self) -> Result<Option<Event>, ErrorKind> {
        Ok(self.events.pop_front())
    }

    fn preferred_schema(&self) -> Option<Schema> {
        self.schema
    }
}

/// An event sink that records the stream, the inverse of [`VecSource`].
#[derive(Default)]
pub struct VecSink {
    pub events: Vec<Event>,
}

impl VecSink {
    pub fn new() -> VecSink {
        VecSink::default()
    }
}

impl EventSink for VecSink {
    fn emit(&mut self, event: &Event) -> Result<(), ErrorKind> {
        self.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_discriminant_roundtrip() {
        for style in [
            NodeStyle::Any,
            NodeStyle::Plain,
            NodeStyle::SingleQuoted,
            NodeStyle::DoubleQuoted,
            NodeStyle::Literal,
            NodeStyle::Folded,
            NodeStyle::Flow,
            NodeStyle::Block,
        ] {
            assert_eq!(NodeStyle::from_discriminant(style as i64), Some(style));
        }
        assert_eq!(NodeStyle::from_discriminant(99), None);
    }

    #[test]
    fn test_forces_string() {
        assert!(NodeStyle::DoubleQuoted.forces_string());
        assert!(NodeStyle::Literal.forces_string());
        assert!(!NodeStyle::Plain.forces_string());
        assert!(!NodeStyle::Flow.forces_string());
    }

    #[test]
    fn test_vec_source_document_wrapper() {
        let mut source = VecSource::document(vec![Event::plain_scalar("42")]);
        assert_eq!(source.next_event().unwrap(), Some(Event::StreamStart));
        assert!(matches!(
            source.next_event().unwrap(),
            Some(Event::DocumentStart(_))
        ));
        assert_eq!(
            source.next_event().unwrap(),
            Some(Event::plain_scalar("42"))
        );
        assert_eq!(source.next_event().unwrap(), Some(Event::DocumentEnd));
        assert_eq!(source.next_event().unwrap(), Some(Event::StreamEnd));
        assert_eq!(source.next_event().unwrap(), None);
    }

    #[test]
    fn test_vec_sink_records() {
        let mut sink = VecSink::new();
        sink.emit(&Event::StreamStart).unwrap();
        sink.emit(&Event::StreamEnd).unwrap();
        assert_eq!(sink.events.len(), 2);
    }
}
