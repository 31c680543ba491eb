//! Value Iterator
//!
//! Regenerates, from a root value, the event stream that would rebuild
//! it: `StreamStart → DocumentStart → body → DocumentEnd → StreamEnd`,
//! maintained by an explicit stack of `(container, cursor)` frames. A
//! directory value replays every document with its preserved state; any
//! other value iterates as a single document, which is also how a
//! subtree is emitted path-scoped.
//!
//! Consuming the iterator past `StreamEnd` latches the error flag;
//! reading the flag clears it and resets the iterator to the start.

use crate::decode::{directory_root, directory_state, state_from_value};
use crate::event::{CollectionStart, DocumentState, Event, NodeStyle, ScalarEvent};
use crate::indirect;
use crate::schema::Schema;
use crate::store;
use bitflags::bitflags;
use strata_core::generic::{Generic, Kind};

bitflags! {
    /// On-the-fly metadata stripping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IterFlags: u32 {
        const STRIP_ANCHORS = 1 << 0;
        const STRIP_TAGS = 1 << 1;
        const STRIP_COMMENTS = 1 << 2;
        const STRIP_STYLE = 1 << 3;
        const STRIP_FAILSAFE_STR = 1 << 4;
    }
}

enum Frame {
    Seq {
        container: Generic,
        at: usize,
    },
    Map {
        container: Generic,
        at: usize,
        value_next: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    DocumentStart,
    Body,
    DocumentEnd,
    StreamEnd,
    /// `StreamEnd` delivered; one `None` is still a clean stop.
    Finished,
    /// A second read past the end; the protocol violation.
    Done,
}

pub struct ValueIter {
    root: Generic,
    directory: bool,
    schema: Schema,
    flags: IterFlags,
    state: State,
    frames: Vec<Frame>,
    pending: Option<Generic>,
    doc_index: usize,
    error: bool,
}

impl ValueIter {
    /// Iterate `root` as a single document.
    pub fn new(root: Generic, schema: Schema, flags: IterFlags) -> ValueIter {
        ValueIter {
            root,
            directory: false,
            schema,
            flags,
            state: State::Start,
            frames: Vec::new(),
            pending: None,
            doc_index: 0,
            error: false,
        }
    }

    /// Iterate a directory value, one document per element.
    pub fn new_directory(root: Generic, schema: Schema, flags: IterFlags) -> ValueIter {
        ValueIter {
            directory: true,
            ..ValueIter::new(root, schema, flags)
        }
    }

    /// Latched protocol-violation flag; reading clears it and resets
    /// the iterator.
    pub fn take_error(&mut self) -> bool {
        let error = self.error;
        self.error = false;
        self.state = State::Start;
        self.frames.clear();
        self.pending = None;
        self.doc_index = 0;
        error
    }

    fn document_count(&self) -> usize {
        if self.directory {
            self.root.collection_len().unwrap_or(0)
        } else {
            1
        }
    }

    fn document(&self, index: usize) -> (Generic, DocumentState) {
        if self.directory {
            match self.root.sequence_items() {
                Some(items) if index < items.len() => {
                    let element = items[index];
                    let state = state_from_value(store::resolve(directory_state(element)));
                    (directory_root(element), state)
                }
                _ => (Generic::INVALID, DocumentState::default()),
            }
        } else {
            let state = DocumentState {
                schema: Some(self.schema.name().to_string()),
                ..DocumentState::default()
            };
            (self.root, state)
        }
    }

    /// The next event, or `None` past the end of the stream.
    pub fn next_event(&mut self) -> Option<Event> {
        match self.state {
            State::Start => {
                self.state = State::DocumentStart;
                self.doc_index = 0;
                Some(Event::StreamStart)
            }
            State::DocumentStart => {
                if self.doc_index >= self.document_count() {
                    self.state = State::StreamEnd;
                    return self.next_event();
                }
                let (root, state) = self.document(self.doc_index);
                if root.is_invalid() {
                    self.error = true;
                    self.state = State::Done;
                    return None;
                }
                self.pending = Some(root);
                self.state = State::Body;
                Some(Event::DocumentStart(state))
            }
            State::Body => self.body_event(),
            State::DocumentEnd => {
                self.doc_index += 1;
                self.state = State::DocumentStart;
                Some(Event::DocumentEnd)
            }
            State::StreamEnd => {
                self.state = State::Finished;
                Some(Event::StreamEnd)
            }
            State::Finished => {
                self.state = State::Done;
                None
            }
            State::Done => {
                // Consuming past the end is the protocol violation the
                // flag exists for.
                self.error = true;
                None
            }
        }
    }

    fn body_event(&mut self) -> Option<Event> {
        if let Some(node) = self.pending.take() {
            return Some(self.enter(node));
        }
        enum Step {
            Node(Generic),
            CloseSeq,
            CloseMap,
            CloseDocument,
        }
        let step = match self.frames.last_mut() {
            None => Step::CloseDocument,
            Some(Frame::Seq { container, at }) => {
                let items = container.sequence_items().unwrap_or(&[]);
                if *at < items.len() {
                    let node = items[*at];
                    *at += 1;
                    Step::Node(node)
                } else {
                    Step::CloseSeq
                }
            }
            Some(Frame::Map {
                container,
                at,
                value_next,
            }) => {
                let pairs = container.mapping_pairs().unwrap_or(&[]);
                if *at < pairs.len() {
                    if *value_next {
                        let value = pairs[*at].value;
                        *at += 1;
                        *value_next = false;
                        Step::Node(value)
                    } else {
                        let key = pairs[*at].key;
                        *value_next = true;
                        Step::Node(key)
                    }
                } else {
                    Step::CloseMap
                }
            }
        };
        match step {
            Step::Node(node) => Some(self.enter(node)),
            Step::CloseSeq => {
                self.frames.pop();
                Some(Event::SequenceEnd)
            }
            Step::CloseMap => {
                self.frames.pop();
                Some(Event::MappingEnd)
            }
            Step::CloseDocument => {
                self.state = State::DocumentEnd;
                self.next_event()
            }
        }
    }

    /// Emit the event introducing `node`, pushing a frame when the node
    /// opens a collection.
    fn enter(&mut self, node: Generic) -> Event {
        if node.kind() == Kind::Alias {
            let name = indirect::alias_target(node)
                .and_then(|n| n.as_str().map(str::to_string))
                .unwrap_or_default();
            return Event::Alias(name);
        }

        let meta = self.metadata(node);
        let value = store::resolve(node);
        match value.kind() {
            Kind::Sequence => {
                self.frames.push(Frame::Seq {
                    container: value,
                    at: 0,
                });
                Event::SequenceStart(meta)
            }
            Kind::Mapping => {
                self.frames.push(Frame::Map {
                    container: value,
                    at: 0,
                    value_next: false,
                });
                Event::MappingStart(meta)
            }
            _ => {
                let (text, style) = self.render_scalar(value, meta.style);
                Event::Scalar(ScalarEvent {
                    value: text,
                    style,
                    anchor: meta.anchor,
                    tag: meta.tag,
                    comment: meta.comment,
                    span: None,
                })
            }
        }
    }

    /// Collect the node's metadata, minus whatever the flags strip.
    fn metadata(&self, node: Generic) -> CollectionStart {
        let mut meta = CollectionStart::default();
        if node.kind() != Kind::Indirect {
            return meta;
        }
        if !self.flags.contains(IterFlags::STRIP_ANCHORS) {
            meta.anchor = indirect::anchor_of(node).and_then(|a| a.as_str().map(str::to_string));
        }
        if !self.flags.contains(IterFlags::STRIP_TAGS) {
            let failsafe_stripped = self.flags.contains(IterFlags::STRIP_FAILSAFE_STR)
                && indirect::is_failsafe_str(node);
            if !failsafe_stripped {
                meta.tag = indirect::tag_of(node).and_then(|t| t.as_str().map(str::to_string));
            }
        }
        if !self.flags.contains(IterFlags::STRIP_COMMENTS) {
            meta.comment =
                indirect::comment_of(node).and_then(|c| c.as_str().map(str::to_string));
        }
        if !self.flags.contains(IterFlags::STRIP_STYLE) {
            if let Some(style) = indirect::style_of(node) {
                meta.style = style;
            }
        }
        meta
    }

    /// Scalar text plus the style that keeps it lossless under the
    /// schema.
    fn render_scalar(&self, v: Generic, recorded: NodeStyle) -> (String, NodeStyle) {
        match v.kind() {
            Kind::Null => (self.schema.null_literal().to_string(), NodeStyle::Plain),
            Kind::Bool => (
                self.schema.bool_literal(v.get_bool().unwrap()).to_string(),
                NodeStyle::Plain,
            ),
            Kind::Int => {
                let text = if v.int_is_unsigned_extended() {
                    v.get_uint().unwrap().to_string()
                } else {
                    v.get_int().unwrap().to_string()
                };
                (text, NodeStyle::Plain)
            }
            Kind::Float => (render_float(v.get_float().unwrap()), NodeStyle::Plain),
            _ => {
                let text = match v.as_str() {
                    Some(s) => s.to_string(),
                    None => String::from_utf8_lossy(v.as_bytes().unwrap_or(&[])).into_owned(),
                };
                let style = if recorded != NodeStyle::Any {
                    recorded
                } else if self.schema.string_needs_quoting(&text) {
                    NodeStyle::DoubleQuoted
                } else {
                    NodeStyle::Plain
                };
                (text, style)
            }
        }
    }
}

pub(crate) fn render_float(f: f64) -> String {
    if f.is_nan() {
        return ".nan".to_string();
    }
    if f.is_infinite() {
        return if f < 0.0 { "-.inf" } else { ".inf" }.to_string();
    }
    let text = f.to_string();
    // Keep a decimal point so the text reads back as a float.
    if text.contains('.') || text.contains('e') || text.contains('E') {
        text
    } else {
        format!("{text}.0")
    }
}
