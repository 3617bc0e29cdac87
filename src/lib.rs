//! # quire
//!
//! A permissive markup tokenizer and plain-text reflow engine for ebook
//! readers.
//!
//! quire ingests byte streams of unknown or declared text encoding (the
//! content extracted from ebook container formats) and turns them into a
//! stream of structural events (tag open/close, attribute, text, encoding
//! notification) consumed by a caller-owned document-tree builder. It is a
//! recovery-oriented tokenizer, not a validating parser: malformed markup is
//! resynchronized past, undecodable bytes degrade to replacement characters,
//! and parsing always runs to completion.
//!
//! ## Quick Start
//!
//! ```no_run
//! use quire::{parse_document, EventSink, NodeHandle, ParserConfig, StopToken, TextFlags};
//!
//! struct Printer;
//!
//! impl EventSink for Printer {
//!     fn tag_open(&mut self, _ns: Option<&str>, name: &str) -> NodeHandle {
//!         println!("<{}>", name);
//!         NodeHandle::NONE
//!     }
//!     fn tag_close(&mut self, _ns: Option<&str>, name: &str) {
//!         println!("</{}>", name);
//!     }
//!     fn attribute(&mut self, _ns: Option<&str>, name: &str, value: &str) {
//!         println!("  {}={}", name, value);
//!     }
//!     fn text(&mut self, text: &str, _flags: TextFlags) {
//!         println!("  {:?}", text);
//!     }
//! }
//!
//! let source = quire::FileSource::open("chapter.xhtml".as_ref()).unwrap();
//! let ok = parse_document(source, ParserConfig::default(), &mut Printer, &StopToken::new());
//! assert!(ok);
//! ```
//!
//! Markup input runs through [`MarkupParser`]; plain text with no markup at
//! all runs through [`TextParser`], which infers paragraphs, headings, and
//! sections from line statistics. [`parse_document`] probes and dispatches.

pub mod codec;
pub mod entity;
pub mod event;
pub mod io;
pub mod reflow;
pub mod tokenizer;

mod error;

// Re-exported because `EncodingKind::EightBit` carries its types.
pub use encoding_rs;

pub use codec::{EncodingKind, TextDecoder};
pub use error::{Error, Result};
pub use event::{EventSink, NodeHandle, ParserConfig, StopToken, TextFlags};
pub use io::{ByteSource, ByteWindow, FileSource, MemorySource};
pub use reflow::TextParser;
pub use tokenizer::MarkupParser;

/// Decoded characters inspected by the markup probe.
const PROBE_CHARS: usize = 256;

/// Parse a document, dispatching on the presence of markup.
///
/// The probe scans a decoded prefix for a `<` opening a plausible tag; when
/// one exists the tag tokenizer runs, otherwise the reflow engine infers
/// structure from the plain text. Returns false only when the probe fails
/// outright (an empty stream); once parsing begins, it runs to completion
/// or to the cooperative stop.
pub fn parse_document<S: ByteSource>(
    source: S,
    config: ParserConfig,
    sink: &mut dyn EventSink,
    stop: &StopToken,
) -> bool {
    let decoder = TextDecoder::with_detected(ByteWindow::new(source), false);
    dispatch(decoder, config, sink, stop)
}

/// Parse a file from disk, optionally forcing a caller-assigned encoding.
///
/// Errors only at the construction boundary: an unreadable path, an empty
/// file, or an unresolvable encoding name. Once parsing begins the usual
/// no-fail contract applies.
pub fn parse_file<P: AsRef<std::path::Path>>(
    path: P,
    encoding: Option<&str>,
    config: ParserConfig,
    sink: &mut dyn EventSink,
    stop: &StopToken,
) -> Result<bool> {
    let source = FileSource::open(path.as_ref())?;
    if source.is_empty() {
        return Err(Error::EmptyStream(path.as_ref().display().to_string()));
    }
    let window = ByteWindow::new(source);
    let decoder = match encoding {
        Some(name) => {
            let kind = codec::resolve_encoding_name(name)
                .ok_or_else(|| Error::UnknownEncoding(name.to_string()))?;
            TextDecoder::with_encoding(window, kind)
        }
        None => TextDecoder::with_detected(window, false),
    };
    Ok(dispatch(decoder, config, sink, stop))
}

fn dispatch<S: ByteSource>(
    mut decoder: TextDecoder<S>,
    config: ParserConfig,
    sink: &mut dyn EventSink,
    stop: &StopToken,
) -> bool {
    // `single_dialect` pins the caller's chosen dialect: no falling back to
    // the reflow engine on markup-free input.
    let markup = config.single_dialect || looks_like_markup(&mut decoder);
    decoder.rewind();
    if markup {
        MarkupParser::with_decoder(decoder, config).parse(sink, stop)
    } else {
        TextParser::with_decoder(decoder, config).parse(sink, stop)
    }
}

/// True when the decoded prefix contains `<` followed by a tag-ish
/// character.
fn looks_like_markup<S: ByteSource>(decoder: &mut TextDecoder<S>) -> bool {
    for offset in 0..PROBE_CHARS {
        if decoder.peek_char(offset) != b'<' as u16 {
            continue;
        }
        let next = decoder.peek_char(offset + 1);
        let Some(c) = char::from_u32(next as u32) else {
            continue;
        };
        if c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?') || next >= 0x80 {
            return true;
        }
    }
    false
}
