//! JSON Event Adapter
//!
//! A parser-side [`EventSource`] over JSON text and an emitter-side
//! [`EventSink`] rendering JSON text, so parse and emit work end to end
//! in JSON mode with no external parser. The source leans on
//! `serde_json` for the text itself and converts its tree into the
//! event stream; the sink renders events directly, compact or indented.

use crate::encode::EmitConfig;
use crate::error::ErrorKind;
use crate::event::{
    CollectionStart, DocumentState, Event, EventSink, EventSource, NodeStyle, ScalarEvent,
};
use crate::schema::{ScalarValue, Schema};
use std::collections::VecDeque;

// =============================================================================
// Source
// =============================================================================

/// Events over a parsed JSON document.
pub struct JsonSource {
    events: VecDeque<Event>,
}

impl JsonSource {
    pub fn from_str(text: &str) -> Result<JsonSource, ErrorKind> {
        Self::from_slice(text.as_bytes())
    }

    pub fn from_file(path: &std::path::Path) -> Result<JsonSource, ErrorKind> {
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Read a descriptor-shaped input (a stream, stdin) to the end.
    pub fn from_reader(reader: &mut dyn std::io::Read) -> Result<JsonSource, ErrorKind> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<JsonSource, ErrorKind> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|_| ErrorKind::InvalidInput)?;
        let mut events = VecDeque::new();
        events.push_back(Event::StreamStart);
        events.push_back(Event::DocumentStart(DocumentState {
            schema: Some(Schema::Json.name().to_string()),
            ..DocumentState::default()
        }));
        push_value(&mut events, &value);
        events.push_back(Event::DocumentEnd);
        events.push_back(Event::StreamEnd);
        Ok(JsonSource { events })
    }
}

fn push_value(events: &mut VecDeque<Event>, value: &serde_json::Value) {
    match value {
        serde_json::Value::Null => events.push_back(Event::plain_scalar("null")),
        serde_json::Value::Bool(b) => {
            events.push_back(Event::plain_scalar(if *b { "true" } else { "false" }));
        }
        serde_json::Value::Number(n) => events.push_back(Event::plain_scalar(n.to_string())),
        serde_json::Value::String(s) => events.push_back(Event::quoted_scalar(s.clone())),
        serde_json::Value::Array(items) => {
            events.push_back(Event::SequenceStart(CollectionStart {
                style: NodeStyle::Flow,
                ..CollectionStart::default()
            }));
            for item in items {
                push_value(events, item);
            }
            events.push_back(Event::SequenceEnd);
        }
        serde_json::Value::Object(entries) => {
            events.push_back(Event::MappingStart(CollectionStart {
                style: NodeStyle::Flow,
                ..CollectionStart::default()
            }));
            for (key, item) in entries {
                events.push_back(Event::quoted_scalar(key.clone()));
                push_value(events, item);
            }
            events.push_back(Event::MappingEnd);
        }
    }
}

impl EventSource for JsonSource {
    fn next_event(&mut self) -> Result<Option<Event>, ErrorKind> {
        Ok(self.events.pop_front())
    }

    fn preferred_schema(&self) -> Option<Schema> {
        Some(Schema::Json)
    }
}

// =============================================================================
// Sink
// =============================================================================

enum Nest {
    Seq { first: bool },
    Map { first: bool, expect_key: bool },
}

/// Renders the event stream as JSON text.
///
/// Aliases cannot be represented; feeding one is an error. Non-finite
/// floats render as `null`, matching what the ecosystem serializers do.
/// Documents past the first are separated by a newline.
pub struct JsonSink {
    out: String,
    indent: Option<usize>,
    stack: Vec<Nest>,
    documents: usize,
}

impl JsonSink {
    pub fn new(config: &EmitConfig) -> JsonSink {
        let indent = match config.style {
            crate::encode::EmitStyle::Pretty => Some(config.indent.columns()),
            _ => None,
        };
        JsonSink {
            out: String::new(),
            indent,
            stack: Vec::new(),
            documents: 0,
        }
    }

    pub fn compact() -> JsonSink {
        JsonSink::new(&EmitConfig::default())
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn newline_indent(&mut self) {
        if let Some(step) = self.indent {
            self.out.push('\n');
            for _ in 0..(self.stack.len() * step) {
                self.out.push(' ');
            }
        }
    }

    /// Append separators for the next element in the open container.
    fn begin_item(&mut self, key_position_text: Option<&str>) -> Result<(), ErrorKind> {
        match self.stack.last_mut() {
            None => Ok(()),
            Some(Nest::Seq { first }) => {
                if !*first {
                    self.out.push(',');
                }
                *first = false;
                self.newline_indent();
                Ok(())
            }
            Some(Nest::Map { first, expect_key }) => {
                if *expect_key {
                    let Some(text) = key_position_text else {
                        // A container opening in key position.
                        return Err(ErrorKind::KindMismatch);
                    };
                    if !*first {
                        self.out.push(',');
                    }
                    *first = false;
                    *expect_key = false;
                    self.newline_indent();
                    push_json_string(&mut self.out, text);
                    self.out.push(':');
                    if self.indent.is_some() {
                        self.out.push(' ');
                    }
                    Ok(())
                } else {
                    *expect_key = true;
                    Ok(())
                }
            }
        }
    }

    /// Whether the sink is waiting for a mapping key.
    fn in_key_position(&self) -> bool {
        matches!(self.stack.last(), Some(Nest::Map { expect_key: true, .. }))
    }

    fn close(&mut self, bracket: char) {
        let nest = self.stack.pop();
        let empty = match &nest {
            Some(Nest::Seq { first }) | Some(Nest::Map { first, .. }) => *first,
            None => true,
        };
        if !empty {
            self.newline_indent();
        }
        self.out.push(bracket);
    }

    fn scalar_literal(&self, scalar: &ScalarEvent) -> String {
        if scalar.style.forces_string() {
            let mut s = String::new();
            push_json_string(&mut s, &scalar.value);
            return s;
        }
        match Schema::Json.classify(&scalar.value) {
            ScalarValue::Null => "null".to_string(),
            ScalarValue::Bool(b) => if b { "true" } else { "false" }.to_string(),
            ScalarValue::Int(_) | ScalarValue::UInt(_) | ScalarValue::Float(_) => {
                scalar.value.clone()
            }
            ScalarValue::Str => {
                // YAML spellings JSON has no literal for.
                if matches!(scalar.value.as_str(), ".inf" | "-.inf" | ".nan") {
                    return "null".to_string();
                }
                let mut s = String::new();
                push_json_string(&mut s, &scalar.value);
                s
            }
        }
    }
}

impl EventSink for JsonSink {
    fn emit(&mut self, event: &Event) -> Result<(), ErrorKind> {
        match event {
            Event::StreamStart | Event::StreamEnd => Ok(()),
            Event::DocumentStart(_) => {
                if self.documents > 0 {
                    self.out.push('\n');
                }
                self.documents += 1;
                Ok(())
            }
            Event::DocumentEnd => {
                if !self.stack.is_empty() {
                    return Err(ErrorKind::InvalidInput);
                }
                Ok(())
            }
            Event::Scalar(scalar) => {
                if self.in_key_position() {
                    let key = scalar.value.clone();
                    self.begin_item(Some(&key))?;
                } else {
                    self.begin_item(None)?;
                    let literal = self.scalar_literal(scalar);
                    self.out.push_str(&literal);
                }
                Ok(())
            }
            Event::Alias(_) => Err(ErrorKind::InvalidInput),
            Event::SequenceStart(_) => {
                self.begin_item(None)?;
                self.out.push('[');
                self.stack.push(Nest::Seq { first: true });
                Ok(())
            }
            Event::SequenceEnd => {
                self.close(']');
                Ok(())
            }
            Event::MappingStart(_) => {
                self.begin_item(None)?;
                self.out.push('{');
                self.stack.push(Nest::Map {
                    first: true,
                    expect_key: true,
                });
                Ok(())
            }
            Event::MappingEnd => {
                self.close('}');
                Ok(())
            }
        }
    }
}

/// Render a value as JSON text into a destination.
pub fn emit_json(
    v: strata_core::generic::Generic,
    schema: Schema,
    config: &EmitConfig,
    target: crate::encode::EmitTarget<'_>,
) -> Result<(), ErrorKind> {
    let mut sink = JsonSink::new(config);
    crate::encode::emit(v, schema, config, &mut sink)?;
    target.deliver(sink.into_string(), config)
}

fn push_json_string(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
