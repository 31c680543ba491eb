//! Event-Stream Decoder
//!
//! Consumes an [`EventSource`] and builds the value tree under a
//! builder. Scalars classify through the active schema, anchors
//! register as they complete, aliases resolve to the anchored subtree
//! (or stay alias nodes under `DONT_RESOLVE`), and document roots are
//! wrapped into the directory structure unless directory mode is off.
//!
//! Resolution always terminates: an anchor is declared strictly before
//! any alias that names it, so the value graph stays a DAG.

use crate::builder::Builder;
use crate::error::ErrorKind;
use crate::event::{
    CollectionStart, DocumentState, Event, EventSource, ScalarEvent, TagDirective,
    VersionDirective,
};
use crate::indirect::{IndirectInit, Marker};
use crate::schema::{ScalarValue, Schema};
use crate::store;
use bitflags::bitflags;
use std::collections::HashMap;
use strata_core::generic::Generic;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParseFlags: u32 {
        /// Return bare roots instead of the directory structure.
        const DISABLE_DIRECTORY = 1 << 0;
        /// With the directory disabled, collect every document root.
        const MULTI_DOCUMENT = 1 << 1;
        /// Trace each consumed event.
        const TRACE = 1 << 2;
        /// Keep aliases as alias nodes instead of resolving them.
        const DONT_RESOLVE = 1 << 3;
        /// Report decode failures into the builder's collector.
        const COLLECT_DIAG = 1 << 4;
        /// Preserve comments as node metadata.
        const KEEP_COMMENTS = 1 << 5;
        /// Record source markers as node metadata.
        const CREATE_MARKERS = 1 << 6;
        /// Preserve presentation style as node metadata.
        const KEEP_STYLE = 1 << 7;
        /// Mark scalars whose stringness came from quoting or a `!!str`
        /// tag.
        const KEEP_FAILSAFE_STR = 1 << 8;
    }
}

/// Input language selector; the schema used for scalar classification
/// falls out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    Yaml1_1,
    Yaml1_2,
    /// Parses as 1.2; the directives round-trip through the directory.
    Yaml1_3,
    Json,
    PyyamlYaml1_1,
    #[default]
    Auto,
}

impl ParseMode {
    pub fn schema(self, fallback: Schema) -> Schema {
        match self {
            ParseMode::Yaml1_1 => Schema::Yaml1_1,
            ParseMode::Yaml1_2 | ParseMode::Yaml1_3 => Schema::Yaml1_2Core,
            ParseMode::Json => Schema::Json,
            ParseMode::PyyamlYaml1_1 => Schema::Yaml1_1Pyyaml,
            ParseMode::Auto => fallback,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseConfig {
    pub mode: ParseMode,
    pub flags: ParseFlags,
}

impl Default for ParseFlags {
    fn default() -> Self {
        ParseFlags::empty()
    }
}

enum Frame {
    Seq {
        items: Vec<Generic>,
        start: CollectionStart,
    },
    Map {
        kv: Vec<Generic>,
        start: CollectionStart,
    },
}

struct Decoder<'a> {
    b: &'a Builder,
    schema: Schema,
    flags: ParseFlags,
    frames: Vec<Frame>,
    anchors: HashMap<String, Generic>,
    root: Option<Generic>,
    in_document: bool,
    docs: Vec<(Generic, DocumentState)>,
    state: DocumentState,
}

/// Decode one event stream into a value.
///
/// The result shape depends on the flags: the directory sequence by
/// default, a sequence of roots under `DISABLE_DIRECTORY |
/// MULTI_DOCUMENT`, and the first root alone under `DISABLE_DIRECTORY`.
pub fn decode(b: &Builder, source: &mut dyn EventSource, config: &ParseConfig) -> Generic {
    let schema = source
        .preferred_schema()
        .unwrap_or_else(|| config.mode.schema(b.schema()));
    let mut decoder = Decoder {
        b,
        schema,
        flags: config.flags,
        frames: Vec::new(),
        anchors: HashMap::new(),
        root: None,
        in_document: false,
        docs: Vec::new(),
        state: DocumentState::default(),
    };
    decoder.run(source)
}

impl Decoder<'_> {
    fn run(&mut self, source: &mut dyn EventSource) -> Generic {
        match source.next_event() {
            Ok(Some(Event::StreamStart)) => {}
            Ok(_) => return self.b.fail(ErrorKind::InvalidInput, "missing stream start"),
            Err(kind) => return self.b.fail(kind, "event source failed"),
        }
        loop {
            let event = match source.next_event() {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return self
                        .b
                        .fail(ErrorKind::InvalidInput, "stream ended without stream end");
                }
                Err(kind) => return self.b.fail(kind, "event source failed"),
            };
            if self.flags.contains(ParseFlags::TRACE) {
                tracing::trace!(?event, "decode event");
            }
            let step = match event {
                Event::StreamStart => self.b.fail(ErrorKind::InvalidInput, "nested stream start"),
                Event::StreamEnd => break,
                Event::DocumentStart(state) => self.document_start(state),
                Event::DocumentEnd => self.document_end(),
                Event::Scalar(scalar) => {
                    let node = self.scalar_node(&scalar);
                    self.complete(node, scalar.anchor.as_deref())
                }
                Event::Alias(name) => {
                    let node = self.alias_node(&name);
                    self.complete(node, None)
                }
                Event::SequenceStart(start) => {
                    self.frames.push(Frame::Seq {
                        items: Vec::new(),
                        start,
                    });
                    Generic::NULL
                }
                Event::MappingStart(start) => {
                    self.frames.push(Frame::Map {
                        kv: Vec::new(),
                        start,
                    });
                    Generic::NULL
                }
                Event::SequenceEnd => self.sequence_end(),
                Event::MappingEnd => self.mapping_end(),
            };
            if step.is_invalid() {
                return step;
            }
        }
        self.finish()
    }

    fn document_start(&mut self, state: DocumentState) -> Generic {
        if self.in_document {
            return self
                .b
                .fail(ErrorKind::InvalidInput, "document start inside document");
        }
        self.in_document = true;
        self.root = None;
        self.state = state;
        if self.state.schema.is_none() {
            self.state.schema = Some(self.schema.name().to_string());
        }
        self.anchors.clear();
        Generic::NULL
    }

    fn document_end(&mut self) -> Generic {
        if !self.in_document || !self.frames.is_empty() {
            return self
                .b
                .fail(ErrorKind::InvalidInput, "unbalanced document end");
        }
        self.in_document = false;
        let root = self.root.take().unwrap_or(Generic::NULL);
        self.docs.push((root, std::mem::take(&mut self.state)));
        Generic::NULL
    }

    fn scalar_node(&mut self, scalar: &ScalarEvent) -> Generic {
        let str_tag = matches!(
            scalar.tag.as_deref(),
            Some("!!str") | Some("tag:yaml.org,2002:str")
        );
        let forced_string = scalar.style.forces_string() || str_tag;
        let value = if forced_string {
            self.b.string(&scalar.value)
        } else {
            match self.schema.classify(&scalar.value) {
                ScalarValue::Null => self.b.null(),
                ScalarValue::Bool(v) => self.b.bool(v),
                ScalarValue::Int(v) => self.b.int(v),
                ScalarValue::UInt(v) => self.b.uint(v),
                ScalarValue::Float(v) => self.b.float(v),
                ScalarValue::Str => self.b.string(&scalar.value),
            }
        };
        if value.is_invalid() {
            return value;
        }
        self.wrap(
            value,
            scalar.anchor.as_deref(),
            scalar.tag.as_deref(),
            scalar.style as i64,
            scalar.comment.as_deref(),
            scalar.span,
            forced_string,
        )
    }

    fn alias_node(&mut self, name: &str) -> Generic {
        if self.flags.contains(ParseFlags::DONT_RESOLVE) {
            return self.b.alias(name);
        }
        match self.anchors.get(name) {
            Some(target) => *target,
            None => self
                .b
                .fail(ErrorKind::UnresolvedAlias, format!("no anchor '{name}'")),
        }
    }

    fn sequence_end(&mut self) -> Generic {
        let Some(Frame::Seq { items, start }) = self.frames.pop() else {
            return self
                .b
                .fail(ErrorKind::InvalidInput, "unbalanced sequence end");
        };
        let seq = self.b.sequence(&items);
        if seq.is_invalid() {
            return seq;
        }
        let node = self.wrap(
            seq,
            start.anchor.as_deref(),
            start.tag.as_deref(),
            start.style as i64,
            start.comment.as_deref(),
            start.span,
            false,
        );
        self.complete(node, start.anchor.as_deref())
    }

    fn mapping_end(&mut self) -> Generic {
        let Some(Frame::Map { kv, start }) = self.frames.pop() else {
            return self
                .b
                .fail(ErrorKind::InvalidInput, "unbalanced mapping end");
        };
        if kv.len() % 2 != 0 {
            return self.b.fail(ErrorKind::InvalidInput, "mapping key without value");
        }
        let map = self.b.mapping(&kv);
        if map.is_invalid() {
            return map;
        }
        let node = self.wrap(
            map,
            start.anchor.as_deref(),
            start.tag.as_deref(),
            start.style as i64,
            start.comment.as_deref(),
            start.span,
            false,
        );
        self.complete(node, start.anchor.as_deref())
    }

    /// Attach node metadata per the keep flags.
    #[allow(clippy::too_many_arguments)]
    fn wrap(
        &mut self,
        value: Generic,
        anchor: Option<&str>,
        tag: Option<&str>,
        style: i64,
        comment: Option<&str>,
        span: Option<crate::indirect::Span>,
        forced_string: bool,
    ) -> Generic {
        let mut init = IndirectInit {
            value: Some(value),
            ..IndirectInit::default()
        };
        if let Some(anchor) = anchor {
            init.anchor = Some(self.b.string(anchor));
        }
        if let Some(tag) = tag {
            init.tag = Some(self.b.string(tag));
        }
        if self.flags.contains(ParseFlags::KEEP_STYLE) {
            init.style = crate::event::NodeStyle::from_discriminant(style);
        }
        if self.flags.contains(ParseFlags::KEEP_COMMENTS) {
            if let Some(comment) = comment {
                init.comment = Some(self.b.string(comment));
            }
        }
        if self.flags.contains(ParseFlags::CREATE_MARKERS) {
            if let Some(span) = span {
                init.marker = Some(Marker { file_id: 0, span }.to_value(self.b));
            }
        }
        init.failsafe_str =
            forced_string && self.flags.contains(ParseFlags::KEEP_FAILSAFE_STR);
        self.b.indirect(&init)
    }

    /// Register the anchor and hand the finished node to its container.
    fn complete(&mut self, node: Generic, anchor: Option<&str>) -> Generic {
        if node.is_invalid() {
            return node;
        }
        if let Some(name) = anchor {
            self.anchors.insert(name.to_string(), node);
        }
        match self.frames.last_mut() {
            Some(Frame::Seq { items, .. }) => items.push(node),
            Some(Frame::Map { kv, .. }) => kv.push(node),
            None => {
                if !self.in_document {
                    return self
                        .b
                        .fail(ErrorKind::InvalidInput, "node outside document");
                }
                if self.root.is_some() {
                    return self
                        .b
                        .fail(ErrorKind::InvalidInput, "second root in document");
                }
                self.root = Some(node);
            }
        }
        Generic::NULL
    }

    fn finish(&mut self) -> Generic {
        if self.in_document {
            return self.b.fail(ErrorKind::InvalidInput, "unterminated document");
        }
        if self.docs.is_empty() {
            return self.b.fail(ErrorKind::InvalidInput, "empty stream");
        }
        if self.flags.contains(ParseFlags::DISABLE_DIRECTORY) {
            if self.flags.contains(ParseFlags::MULTI_DOCUMENT) {
                let roots: Vec<Generic> = self.docs.iter().map(|(root, _)| *root).collect();
                return self.b.sequence(&roots);
            }
            return self.docs[0].0;
        }
        let docs = std::mem::take(&mut self.docs);
        let mut elements = Vec::with_capacity(docs.len());
        for (root, state) in docs {
            let state_value = state_to_value(self.b, &state);
            let element = self.b.mapping(&[
                self.b.string("root"),
                root,
                self.b.string("state"),
                state_value,
            ]);
            if element.is_invalid() {
                return element;
            }
            elements.push(element);
        }
        self.b.sequence(&elements)
    }
}

// =============================================================================
// Directory structure
// =============================================================================

/// Build the document-state mapping the directory stores per document.
pub fn state_to_value(b: &Builder, state: &DocumentState) -> Generic {
    let version = match &state.version {
        Some(v) => b.mapping(&[
            b.string("major"),
            b.int(i64::from(v.major)),
            b.string("minor"),
            b.int(i64::from(v.minor)),
        ]),
        None => Generic::NULL,
    };
    let tags: Vec<Generic> = state
        .tags
        .iter()
        .map(|t| {
            b.mapping(&[
                b.string("handle"),
                b.string(&t.handle),
                b.string("prefix"),
                b.string(&t.prefix),
            ])
        })
        .collect();
    b.mapping(&[
        b.string("version"),
        version,
        b.string("tags"),
        b.sequence(&tags),
        b.string("schema"),
        match &state.schema {
            Some(name) => b.string(name),
            None => Generic::NULL,
        },
        b.string("tags-explicit"),
        b.bool(state.tags_explicit),
        b.string("version-explicit"),
        b.bool(state.version_explicit),
    ])
}

/// Reconstruct a [`DocumentState`] from its directory mapping.
pub fn state_from_value(v: Generic) -> DocumentState {
    let get = |map: Generic, key: &str| -> Generic {
        map.mapping_pairs()
            .and_then(|pairs| {
                pairs
                    .iter()
                    .find(|p| store::resolve(p.key).as_str() == Some(key))
                    .map(|p| store::resolve(p.value))
            })
            .unwrap_or(Generic::NULL)
    };
    let version_value = get(v, "version");
    let version = if version_value.is_mapping() {
        Some(VersionDirective {
            major: get(version_value, "major").get_int().unwrap_or(1) as u32,
            minor: get(version_value, "minor").get_int().unwrap_or(2) as u32,
        })
    } else {
        None
    };
    let tags = get(v, "tags")
        .sequence_items()
        .map(|items| {
            items
                .iter()
                .filter_map(|t| {
                    let t = store::resolve(*t);
                    Some(TagDirective {
                        handle: get(t, "handle").as_str()?.to_string(),
                        prefix: get(t, "prefix").as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    DocumentState {
        version,
        tags,
        schema: get(v, "schema").as_str().map(str::to_string),
        version_explicit: get(v, "version-explicit").get_bool().unwrap_or(false),
        tags_explicit: get(v, "tags-explicit").get_bool().unwrap_or(false),
    }
}

/// The root stored in a directory element.
pub fn directory_root(element: Generic) -> Generic {
    element
        .mapping_pairs()
        .and_then(|pairs| {
            pairs
                .iter()
                .find(|p| store::resolve(p.key).as_str() == Some("root"))
                .map(|p| p.value)
        })
        .unwrap_or(Generic::INVALID)
}

/// The document state stored in a directory element.
pub fn directory_state(element: Generic) -> Generic {
    element
        .mapping_pairs()
        .and_then(|pairs| {
            pairs
                .iter()
                .find(|p| store::resolve(p.key).as_str() == Some("state"))
                .map(|p| p.value)
        })
        .unwrap_or(Generic::INVALID)
}
