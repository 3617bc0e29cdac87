//! The tag/attribute tokenizing state machine.
//!
//! Recognizes XML- and HTML-like markup despite malformed input and emits
//! structural events to the sink. Recovery is the design center: source
//! documents routinely contain encoder-introduced corruption, so malformed
//! fragments are skipped by resynchronizing to the next delimiter and
//! parsing continues. No condition here is fatal, and the sink's `stop()`
//! fires exactly once on every path.

use log::{debug, trace};

use crate::codec::{resolve_encoding_name, TextDecoder};
use crate::entity::decode_entities;
use crate::event::{EventSink, ParserConfig, StopToken, TextFlags};
use crate::io::{ByteSource, ByteWindow};

/// Text accumulates into a rolling buffer flushed at this size, so entity
/// decoding and whitespace normalization run on manageable chunks rather
/// than the whole document.
const TEXT_FLUSH_LEN: usize = 4096;

/// How far back a flush will look for a still-open entity reference; a
/// flush never splits one.
const MAX_ENTITY_SPAN: usize = 12;

/// Default event ceiling under `cover_only`: enough for any document
/// header, a rounding error for a full book.
const COVER_EVENT_CEILING: u32 = 1024;

const LT: u16 = b'<' as u16;
const GT: u16 = b'>' as u16;
const AMP: u16 = b'&' as u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeFirstTag,
    AfterLt,
    InAttributes,
    InText,
}

/// Per-tag scratch, cleared (not reallocated) at each tag boundary.
#[derive(Default)]
struct Scratch {
    tag_ns: String,
    tag_name: String,
    attr_ns: String,
    attr_name: String,
    attr_value: Vec<u16>,
    text: Vec<u16>,
}

impl Scratch {
    fn reset_tag(&mut self) {
        self.tag_ns.clear();
        self.tag_name.clear();
        self.attr_ns.clear();
        self.attr_name.clear();
        self.attr_value.clear();
    }
}

/// Streaming tokenizer for markup input.
pub struct MarkupParser<S: ByteSource> {
    decoder: TextDecoder<S>,
    config: ParserConfig,
    scratch: Scratch,
    events: u32,
    /// The current tag arrived as `<?...`.
    instruction: bool,
}

impl<S: ByteSource> MarkupParser<S> {
    /// Create a parser over a source, autodetecting the encoding.
    ///
    /// A declared encoding in the prolog bytes overrides the statistical
    /// probes (see [`crate::codec::detect_encoding`]); the declaration
    /// still passes through the sink as an `encoding` event when the parse
    /// reaches it.
    pub fn new(source: S, config: ParserConfig) -> Self {
        let decoder = TextDecoder::with_detected(ByteWindow::new(source), false);
        Self::with_decoder(decoder, config)
    }

    pub fn with_decoder(decoder: TextDecoder<S>, config: ParserConfig) -> Self {
        Self {
            decoder,
            config,
            scratch: Scratch::default(),
            events: 0,
            instruction: false,
        }
    }

    /// Run the parse to completion, truncation, or cooperative stop.
    ///
    /// Returns false only when the initial probe fails (an empty stream);
    /// once parsing begins it runs to the end and the sink observes exactly
    /// one `stop()`.
    pub fn parse(&mut self, sink: &mut dyn EventSink, stop: &StopToken) -> bool {
        if self.decoder.stream_size() == 0 {
            return false;
        }
        self.events = 0;
        sink.start();
        sink.encoding(
            self.decoder.encoding().name(),
            self.decoder.conversion_table(),
        );
        self.run(sink, stop);
        sink.stop();
        true
    }

    fn run(&mut self, sink: &mut dyn EventSink, stop: &StopToken) {
        let ceiling = self
            .config
            .event_ceiling
            .or_else(|| self.config.cover_only.then_some(COVER_EVENT_CEILING));
        let mut state = State::BeforeFirstTag;
        loop {
            if stop.is_stopped() {
                trace!("cooperative stop requested");
                break;
            }
            if let Some(ceiling) = ceiling {
                if self.events >= ceiling {
                    debug!("event ceiling {} reached", ceiling);
                    break;
                }
            }
            let next = match state {
                State::BeforeFirstTag => self.skip_to_first_tag(),
                State::AfterLt => self.tag_start(sink),
                State::InAttributes => self.attributes(sink),
                State::InText => self.text(sink),
            };
            match next {
                Some(s) => state = s,
                None => break,
            }
        }
    }

    fn at_eof(&mut self) -> bool {
        self.decoder.peek_char(0) == 0 && self.decoder.end_of_input()
    }

    /// Everything before the first `<` is skipped, not emitted.
    fn skip_to_first_tag(&mut self) -> Option<State> {
        loop {
            match self.decoder.next_char() {
                None => return None,
                Some(LT) => return Some(State::AfterLt),
                Some(_) => {}
            }
        }
    }

    /// Dispatch on the character after `<`.
    fn tag_start(&mut self, sink: &mut dyn EventSink) -> Option<State> {
        if self.at_eof() {
            return None;
        }
        self.scratch.reset_tag();
        self.instruction = false;

        match self.decoder.peek_char(0) {
            c if c == b'/' as u16 => {
                self.decoder.skip(1);
                self.close_tag(sink)
            }
            c if c == b'?' as u16 => {
                self.decoder.skip(1);
                self.instruction = true;
                if self.read_name(true) {
                    self.emit_tag_open(sink);
                    Some(State::InAttributes)
                } else {
                    self.resync_to_gt()
                }
            }
            c if c == b'!' as u16 => {
                if self.decoder.peek_char(1) == b'-' as u16
                    && self.decoder.peek_char(2) == b'-' as u16
                {
                    self.decoder.skip(3);
                    self.skip_comment()
                } else {
                    // DOCTYPE and other declarations are discarded.
                    self.resync_to_gt()
                }
            }
            c if is_name_start(c) => {
                self.read_name(true);
                self.emit_tag_open(sink);
                Some(State::InAttributes)
            }
            _ => {
                debug!("malformed tag start, resynchronizing to '>'");
                self.resync_to_gt()
            }
        }
    }

    /// `</name>` fast path: the name is captured, anything else up to `>`
    /// is discarded.
    fn close_tag(&mut self, sink: &mut dyn EventSink) -> Option<State> {
        let named = self.read_name(true);
        loop {
            match self.decoder.next_char() {
                None => {
                    if named {
                        self.emit_tag_close(sink);
                    }
                    return None;
                }
                Some(GT) => break,
                Some(LT) => {
                    // Unterminated close tag; the `<` starts the next one.
                    if named {
                        self.emit_tag_close(sink);
                    }
                    return Some(State::AfterLt);
                }
                Some(_) => {}
            }
        }
        if named {
            self.emit_tag_close(sink);
        } else {
            debug!("discarded unnamed close tag");
        }
        Some(State::InText)
    }

    /// Scan to `-->`, discarding everything.
    fn skip_comment(&mut self) -> Option<State> {
        let mut dashes = 0u8;
        loop {
            match self.decoder.next_char() {
                None => return None,
                Some(c) if c == b'-' as u16 => dashes = (dashes + 1).min(2),
                Some(GT) if dashes >= 2 => return Some(State::InText),
                Some(_) => dashes = 0,
            }
        }
    }

    /// Skip to the next `>` (consuming it). The malformed-identifier
    /// recovery path.
    fn resync_to_gt(&mut self) -> Option<State> {
        loop {
            match self.decoder.next_char() {
                None => return None,
                Some(GT) => return Some(State::InText),
                Some(_) => {}
            }
        }
    }

    /// The attribute loop of an open tag (or processing instruction).
    fn attributes(&mut self, sink: &mut dyn EventSink) -> Option<State> {
        loop {
            self.skip_spaces();
            if self.at_eof() {
                // Stream exhausted mid-tag: the body event still fires so
                // the sink sees a balanced open.
                self.emit_tag_body(sink);
                return None;
            }
            let c = self.decoder.peek_char(0);
            if c == GT {
                self.decoder.skip(1);
                self.emit_tag_body(sink);
                if self.instruction {
                    self.emit_tag_close(sink);
                    return Some(State::InText);
                }
                return self.after_open_tag(sink);
            }
            if (c == b'/' as u16 || c == b'?' as u16) && self.decoder.peek_char(1) == GT {
                self.decoder.skip(2);
                self.emit_tag_body(sink);
                self.emit_tag_close(sink);
                return Some(State::InText);
            }
            if c == LT {
                // Tag never closed; whatever follows is a new tag.
                debug!("unterminated tag <{}>", self.scratch.tag_name);
                self.decoder.skip(1);
                self.emit_tag_body(sink);
                return Some(State::AfterLt);
            }
            if is_name_start(c) {
                self.attribute(sink)?;
                continue;
            }
            // Attribute soup: give up on this tag and resynchronize to the
            // next `<`.
            debug!("malformed attribute list in <{}>", self.scratch.tag_name);
            self.emit_tag_body(sink);
            loop {
                match self.decoder.next_char() {
                    None => return None,
                    Some(LT) => return Some(State::AfterLt),
                    Some(_) => {}
                }
            }
        }
    }

    /// One `name[=value]` attribute. Returns `None` at end of input.
    fn attribute(&mut self, sink: &mut dyn EventSink) -> Option<()> {
        self.scratch.attr_ns.clear();
        self.scratch.attr_name.clear();
        self.scratch.attr_value.clear();
        self.read_name(false);
        self.skip_spaces();

        if self.decoder.peek_char(0) == b'=' as u16 {
            self.decoder.skip(1);
            self.skip_spaces();
            let quote = self.decoder.peek_char(0);
            if quote == b'"' as u16 || quote == b'\'' as u16 {
                self.decoder.skip(1);
                loop {
                    match self.decoder.next_char() {
                        None => {
                            // Unterminated value at end of stream.
                            self.emit_attribute(sink);
                            return None;
                        }
                        Some(c) if c == quote => break,
                        Some(c) => self.scratch.attr_value.push(c),
                    }
                }
            } else {
                // Bare value, ended by whitespace or a tag delimiter.
                loop {
                    let c = self.decoder.peek_char(0);
                    if c == 0 || is_space(c) || c == GT || c == LT || c == b'/' as u16 {
                        break;
                    }
                    self.scratch.attr_value.push(c);
                    self.decoder.skip(1);
                }
            }
        }
        self.emit_attribute(sink);
        Some(())
    }

    /// Text content between tags.
    fn text(&mut self, sink: &mut dyn EventSink) -> Option<State> {
        loop {
            let c = self.decoder.peek_char(0);
            if c == 0 && self.decoder.end_of_input() {
                self.flush_text(sink, self.scratch.text.len(), TextFlags::empty());
                return None;
            }
            if c == LT {
                self.decoder.skip(1);
                self.flush_text(sink, self.scratch.text.len(), TextFlags::empty());
                return Some(State::AfterLt);
            }
            self.decoder.skip(1);
            self.scratch.text.push(c);

            // Paragraph splitting: a run of spaces right after a line break
            // is a paragraph boundary in line-oriented source formats.
            if self.config.split_paragraphs
                && c == b'\n' as u16
                && self.decoder.peek_char(0) == b' ' as u16
            {
                self.flush_text(sink, self.scratch.text.len(), TextFlags::PARAGRAPH_END);
                continue;
            }

            if self.scratch.text.len() >= TEXT_FLUSH_LEN {
                let safe = self.entity_safe_len();
                self.flush_text(sink, safe, TextFlags::empty());
            }
        }
    }

    /// Longest prefix of the text buffer that does not split an open entity
    /// reference.
    fn entity_safe_len(&self) -> usize {
        let text = &self.scratch.text;
        let tail_start = text.len().saturating_sub(MAX_ENTITY_SPAN);
        for i in (tail_start..text.len()).rev() {
            match text[i] {
                AMP => return i,
                u if u == b';' as u16 => break,
                _ => {}
            }
        }
        text.len()
    }

    /// Decode entities in the first `len` units of the text buffer, apply
    /// the whitespace policy, and emit the result.
    fn flush_text(&mut self, sink: &mut dyn EventSink, len: usize, extra: TextFlags) {
        if len == 0 {
            return;
        }
        let mut chunk: Vec<u16> = self.scratch.text.drain(..len).collect();
        let mut flags = TextFlags::FOLD_BREAKS | TextFlags::COLLAPSE_SPACES | extra;
        if self.config.trim_spaces {
            flags.insert(TextFlags::TRIM);
        }
        decode_entities(&mut chunk, flags);
        if chunk.is_empty() {
            return;
        }
        let text = String::from_utf16_lossy(&chunk);
        self.events += 1;
        sink.text(&text, flags);
    }

    /// Binary routing: when the sink flags the freshly-opened element as
    /// binary, its character content is handed over raw instead of passing
    /// through the text path.
    fn after_open_tag(&mut self, sink: &mut dyn EventSink) -> Option<State> {
        if !sink.reading_binary() {
            return Some(State::InText);
        }
        let name = self.scratch.tag_name.clone();
        let mut units = Vec::new();
        loop {
            let c = self.decoder.peek_char(0);
            if c == 0 && self.decoder.end_of_input() {
                break;
            }
            if c == LT {
                break;
            }
            units.push(c);
            self.decoder.skip(1);
        }
        let data = String::from_utf16_lossy(&units);
        self.events += 1;
        if !sink.blob(&name, data.trim().as_bytes()) {
            // Sink declined: replay as ordinary text.
            self.scratch.text.extend_from_slice(&units);
        }
        Some(State::InText)
    }

    fn skip_spaces(&mut self) {
        while is_space(self.decoder.peek_char(0)) {
            self.decoder.skip(1);
        }
    }

    /// Capture an identifier with a single `namespace:name` prefix split.
    /// Returns false when no name character is present.
    fn read_name(&mut self, into_tag: bool) -> bool {
        let fold = self.config.fold_tag_case || self.config.allow_html;
        let mut any = false;
        loop {
            let u = self.decoder.peek_char(0);
            if !is_name_char(u) {
                break;
            }
            self.decoder.skip(1);
            any = true;
            let mut c = char::from_u32(u as u32).unwrap_or('?');
            if fold {
                c = c.to_ascii_lowercase();
            }
            if into_tag {
                self.scratch.tag_name.push(c);
            } else {
                self.scratch.attr_name.push(c);
            }
        }
        if !any {
            return false;
        }
        if into_tag {
            split_namespace(&mut self.scratch.tag_ns, &mut self.scratch.tag_name);
        } else {
            split_namespace(&mut self.scratch.attr_ns, &mut self.scratch.attr_name);
        }
        true
    }

    fn emit_tag_open(&mut self, sink: &mut dyn EventSink) {
        self.events += 1;
        sink.tag_open(ns_opt(&self.scratch.tag_ns), &self.scratch.tag_name);
    }

    fn emit_tag_body(&mut self, sink: &mut dyn EventSink) {
        self.events += 1;
        sink.tag_body();
    }

    fn emit_tag_close(&mut self, sink: &mut dyn EventSink) {
        self.events += 1;
        sink.tag_close(ns_opt(&self.scratch.tag_ns), &self.scratch.tag_name);
    }

    fn emit_attribute(&mut self, sink: &mut dyn EventSink) {
        let mut value = std::mem::take(&mut self.scratch.attr_value);
        decode_entities(&mut value, TextFlags::FOLD_BREAKS);
        let value_str = String::from_utf16_lossy(&value);
        self.events += 1;
        sink.attribute(
            ns_opt(&self.scratch.attr_ns),
            &self.scratch.attr_name,
            &value_str,
        );

        // The only in-band control the core recognizes: an encoding
        // declaration on a prolog-like instruction retargets the decoder.
        if self.instruction
            && self.scratch.tag_name.eq_ignore_ascii_case("xml")
            && self.scratch.attr_name.eq_ignore_ascii_case("encoding")
        {
            match resolve_encoding_name(&value_str) {
                Some(kind) if kind != self.decoder.encoding() => {
                    self.decoder.set_encoding(kind);
                    self.events += 1;
                    sink.encoding(kind.name(), self.decoder.conversion_table());
                }
                Some(_) => {}
                None => debug!("undecodable encoding declaration {:?}", value_str),
            }
        }
        self.scratch.attr_value = value;
        self.scratch.attr_ns.clear();
        self.scratch.attr_name.clear();
    }
}

fn ns_opt(ns: &str) -> Option<&str> {
    (!ns.is_empty()).then_some(ns)
}

/// Split `prefix:local` once at the first colon.
fn split_namespace(ns: &mut String, name: &mut String) {
    if let Some(colon) = name.find(':') {
        ns.clear();
        ns.push_str(&name[..colon]);
        name.drain(..=colon);
    }
}

fn is_space(u: u16) -> bool {
    matches!(u, 0x20 | 0x09 | 0x0A | 0x0D)
}

fn is_name_start(u: u16) -> bool {
    let Some(c) = char::from_u32(u as u32) else {
        return false;
    };
    c.is_ascii_alphabetic() || c == '_' || u >= 0x80
}

fn is_name_char(u: u16) -> bool {
    let Some(c) = char::from_u32(u as u32) else {
        return false;
    };
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':') || u >= 0x80
}
