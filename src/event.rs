//! The structural-event callback contract.
//!
//! Both the tag tokenizer and the reflow engine emit the same events through
//! [`EventSink`]. The sink owns whatever tree the events build; the core
//! borrows it for the duration of a parse and retains nothing. Dialect
//! interpretation (which tag means "heading", which attribute implies a
//! footnote) belongs entirely to the sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to a node created by the sink in response to `tag_open`.
///
/// Opaque to the core; sinks that build no tree can return `NodeHandle::NONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle(pub u32);

impl NodeHandle {
    pub const NONE: Self = Self(0);
}

/// Flags attached to text events and driving whitespace normalization.
///
/// The low bits are policy inputs to the entity decoder's second pass; the
/// high bits are markers the emitters attach for the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextFlags(u16);

impl TextFlags {
    /// Fold CR, LF, and TAB into spaces.
    pub const FOLD_BREAKS: Self = Self(1);
    /// Collapse runs of spaces into one.
    pub const COLLAPSE_SPACES: Self = Self(1 << 1);
    /// Preserve whitespace verbatim; overrides collapsing.
    pub const PRESERVE: Self = Self(1 << 2);
    /// Trim leading and trailing spaces.
    pub const TRIM: Self = Self(1 << 3);
    /// Drop hyphens immediately before a line break.
    pub const TRIM_BREAK_HYPHENS: Self = Self(1 << 4);
    /// Expand tabs to 8-column stops (the only growing transform).
    pub const EXPAND_TABS: Self = Self(1 << 5);
    /// This text event completes a paragraph (paragraph-splitting mode).
    pub const PARAGRAPH_END: Self = Self(1 << 8);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for TextFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Cooperative cancellation handle, polled once per tokenizer iteration.
///
/// Clonable so a UI thread can hold one end while the parse holds the other;
/// stopping is a request, not an interrupt, and the sink still receives its
/// final `stop()`.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Receiver of structural events.
///
/// Every event is fully handled before the next character is consumed; the
/// sink may mutate its own per-document state (link tables, style stacks)
/// freely between calls. `stop` is delivered exactly once per parse, on
/// every path: completion, cooperative stop, event ceiling, or truncated
/// input.
pub trait EventSink {
    /// Parsing is about to begin.
    fn start(&mut self) {}

    /// An opening tag was recognized. Attributes, if any, follow before
    /// `tag_body`.
    fn tag_open(&mut self, ns: Option<&str>, name: &str) -> NodeHandle;

    /// The attribute list of the current tag is complete.
    fn tag_body(&mut self) {}

    fn tag_close(&mut self, ns: Option<&str>, name: &str);

    fn attribute(&mut self, ns: Option<&str>, name: &str, value: &str);

    fn text(&mut self, text: &str, flags: TextFlags);

    /// The document declared (or detection established) an encoding.
    /// `table` is the high-byte conversion table for 8-bit codepages.
    fn encoding(&mut self, _name: &str, _table: Option<&[u16; 128]>) {}

    /// Binary payload of the current element, delivered when
    /// `reading_binary` returned true. Returning false reverts the element
    /// to the text path.
    fn blob(&mut self, _name: &str, _data: &[u8]) -> bool {
        false
    }

    /// Parsing finished. Always the last call.
    fn stop(&mut self) {}

    /// Whether the current element's content is binary (e.g. base64
    /// payloads) and should be routed to `blob` instead of `text`.
    fn reading_binary(&self) -> bool {
        false
    }

    /// Right-to-left hint from the sink's document metadata.
    fn rtl(&self) -> bool {
        false
    }
}

/// Parser configuration, fixed before parsing begins.
///
/// The booleans are opaque to the core: it reads them but attaches no
/// dialect semantics beyond what each field documents.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Accept HTML-like looseness (case-folded tag matching implied).
    pub allow_html: bool,
    /// Restrict recognition to a single markup dialect.
    pub single_dialect: bool,
    /// The caller only needs the document header/cover; combined with
    /// `event_ceiling` for cheap metadata extraction.
    pub cover_only: bool,
    /// Trim leading/trailing spaces from text events.
    pub trim_spaces: bool,
    /// Case-fold tag and attribute names.
    pub fold_tag_case: bool,
    /// Stop after this many emitted events (cooperative, checked between
    /// iterations).
    pub event_ceiling: Option<u32>,
    /// Flush text events at paragraph boundaries (line break followed by a
    /// run of spaces) instead of buffering whole inter-tag spans.
    pub split_paragraphs: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            allow_html: false,
            single_dialect: false,
            cover_only: false,
            trim_spaces: true,
            fold_tag_case: false,
            event_ceiling: None,
            split_paragraphs: false,
        }
    }
}
