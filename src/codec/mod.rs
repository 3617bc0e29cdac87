//! Byte-to-code-point decoding on top of the byte window.
//!
//! The decoder exposes a lookahead/consume character API over a fixed-capacity
//! ring of UTF-16 code units. Encodings are either detected from a stream
//! prefix ([`detect`]) or assigned from an in-document declaration; switching
//! encodings mid-stream resets the lookahead ring.

mod detect;
mod lines;
mod tables;

pub use detect::{
    detect_encoding, extract_declared_encoding, resolve_encoding_name, DETECT_PREFIX_LEN,
};
pub use lines::{LineAlignment, LineFlags, LineReader, TextLine, MAX_LINE_LEN};
pub use tables::high_byte_table;

use std::collections::VecDeque;

use log::debug;

use crate::io::{ByteSource, ByteWindow};

/// Capacity of the code-unit lookahead ring.
pub const LOOKAHEAD_CAPACITY: usize = 4096;

/// Bytes pulled from the window per bulk refill.
const REFILL_BYTES: usize = 8 * 1024;

/// The closed set of encodings the codec layer decodes.
///
/// Eight-bit codepages carry their `encoding_rs` encoding so the 128-entry
/// high-byte conversion table can be materialized and handed to the sink;
/// the UTF and CJK kinds decode without a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingKind {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    EightBit(&'static encoding_rs::Encoding),
    Gbk,
    ShiftJis,
    EucJp,
    Big5,
    EucKr,
}

impl EncodingKind {
    /// Canonical lowercase name, as reported through `EventSink::encoding`.
    pub fn name(&self) -> &'static str {
        match self {
            EncodingKind::Utf8 => "utf-8",
            EncodingKind::Utf16Le => "utf-16le",
            EncodingKind::Utf16Be => "utf-16be",
            EncodingKind::Utf32Le => "utf-32le",
            EncodingKind::Utf32Be => "utf-32be",
            EncodingKind::EightBit(enc) => enc.name(),
            EncodingKind::Gbk => "gbk",
            EncodingKind::ShiftJis => "shift-jis",
            EncodingKind::EucJp => "euc-jp",
            EncodingKind::Big5 => "big5",
            EncodingKind::EucKr => "euc-kr",
        }
    }

    pub fn is_utf(&self) -> bool {
        matches!(
            self,
            EncodingKind::Utf8
                | EncodingKind::Utf16Le
                | EncodingKind::Utf16Be
                | EncodingKind::Utf32Le
                | EncodingKind::Utf32Be
        )
    }

    /// The `encoding_rs` encoding driving this kind, where one exists.
    /// UTF-32 and the 8-bit table path decode by hand.
    fn stream_encoding(&self) -> Option<&'static encoding_rs::Encoding> {
        match self {
            EncodingKind::Utf8 => Some(encoding_rs::UTF_8),
            EncodingKind::Utf16Le => Some(encoding_rs::UTF_16LE),
            EncodingKind::Utf16Be => Some(encoding_rs::UTF_16BE),
            EncodingKind::Gbk => Some(encoding_rs::GBK),
            EncodingKind::ShiftJis => Some(encoding_rs::SHIFT_JIS),
            EncodingKind::EucJp => Some(encoding_rs::EUC_JP),
            EncodingKind::Big5 => Some(encoding_rs::BIG5),
            EncodingKind::EucKr => Some(encoding_rs::EUC_KR),
            _ => None,
        }
    }
}

/// Replacement for undecodable byte sequences. Malformed input must never
/// stop decoding.
const REPLACEMENT: u16 = b'?' as u16;

/// Byte cost of one refill batch, kept so an encoding switch can rewind the
/// window to the bytes whose decoded units were never delivered.
#[derive(Clone, Copy)]
struct ChunkCost {
    units: usize,
    delivered: usize,
    bytes: usize,
}

/// Streaming decoder: window bytes in, UTF-16 code units out.
pub struct TextDecoder<S: ByteSource> {
    window: ByteWindow<S>,
    kind: EncodingKind,
    table: Option<Box<[u16; 128]>>,
    inner: Option<encoding_rs::Decoder>,
    ring: VecDeque<u16>,
    /// Refill batches still (partly) in the ring, oldest first.
    chunks: VecDeque<ChunkCost>,
    /// Set once the window is exhausted and the ring has drained.
    end_of_input: bool,
    /// The inner decoder has been flushed with `last = true`.
    flushed: bool,
}

impl<S: ByteSource> TextDecoder<S> {
    /// Create a decoder with an explicitly assigned encoding.
    pub fn with_encoding(window: ByteWindow<S>, kind: EncodingKind) -> Self {
        let mut decoder = Self {
            window,
            kind,
            table: None,
            inner: None,
            ring: VecDeque::with_capacity(LOOKAHEAD_CAPACITY),
            chunks: VecDeque::new(),
            end_of_input: false,
            flushed: false,
        };
        decoder.install(kind);
        decoder
    }

    /// Create a decoder, autodetecting the encoding from the stream prefix.
    ///
    /// `utf_only` restricts detection to the UTF family (used by callers that
    /// know the container guarantees Unicode).
    pub fn with_detected(mut window: ByteWindow<S>, utf_only: bool) -> Self {
        window.seek(0, DETECT_PREFIX_LEN.min(window.stream_size() as usize));
        let kind = detect_encoding(window.buffered(), utf_only);
        Self::with_encoding(window, kind)
    }

    pub fn encoding(&self) -> EncodingKind {
        self.kind
    }

    /// The high-byte conversion table, present iff the encoding is 8-bit.
    pub fn conversion_table(&self) -> Option<&[u16; 128]> {
        self.table.as_deref()
    }

    pub fn end_of_input(&self) -> bool {
        self.end_of_input
    }

    pub fn stream_size(&self) -> u64 {
        self.window.stream_size()
    }

    /// Switch to a different encoding, re-decoding undelivered lookahead.
    ///
    /// The window rewinds to the first byte whose decoded unit was never
    /// delivered and decoding restarts there under the new encoding. When
    /// the switch lands mid-batch, the already-delivered units of that batch
    /// are skipped again after the rewind; exact whenever the delivered
    /// region is ASCII (the in-document declaration case).
    pub fn set_encoding(&mut self, kind: EncodingKind) {
        debug!("encoding switched: {} -> {}", self.kind.name(), kind.name());
        let rewind: usize = self.chunks.iter().map(|c| c.bytes).sum();
        let reskip = self.chunks.front().map(|c| c.delivered).unwrap_or(0);
        let target = self.window.position().saturating_sub(rewind as u64);
        self.window.seek(target, 0);
        self.kind = kind;
        self.install(kind);
        self.skip(reskip);
    }

    /// Seek back to the stream start and reset all decode state.
    pub fn rewind(&mut self) {
        self.window.seek(0, 0);
        self.install(self.kind);
    }

    fn install(&mut self, kind: EncodingKind) {
        self.ring.clear();
        self.chunks.clear();
        self.end_of_input = false;
        self.flushed = false;
        self.table = match kind {
            EncodingKind::EightBit(enc) => Some(high_byte_table(enc)),
            _ => None,
        };
        self.inner = kind
            .stream_encoding()
            .map(|enc| enc.new_decoder_with_bom_removal());
    }

    /// Consume and return the next code unit.
    pub fn next_char(&mut self) -> Option<u16> {
        if self.ring.is_empty() {
            self.refill();
        }
        let unit = self.ring.pop_front();
        if unit.is_some() {
            while self.chunks.front().is_some_and(|c| c.units == 0) {
                self.chunks.pop_front();
            }
            if let Some(front) = self.chunks.front_mut() {
                front.delivered += 1;
                if front.delivered >= front.units {
                    self.chunks.pop_front();
                }
            }
        }
        unit
    }

    /// Look at the unit `offset` positions ahead without consuming.
    /// Returns 0 past end-of-input. Offsets are bounded by the ring capacity.
    pub fn peek_char(&mut self, offset: usize) -> u16 {
        if self.ring.len() <= offset {
            self.refill();
        }
        self.ring.get(offset).copied().unwrap_or(0)
    }

    /// Consume up to `n` units.
    pub fn skip(&mut self, n: usize) {
        for _ in 0..n {
            if self.next_char().is_none() {
                break;
            }
        }
    }

    /// Refill the lookahead ring in bulk from the byte window.
    fn refill(&mut self) {
        let room = LOOKAHEAD_CAPACITY - self.ring.len();
        if room == 0 || self.end_of_input {
            return;
        }

        // A failed fill is not fatal; whatever partial tail the window
        // delivered still decodes, and the next refill observes exhaustion.
        self.window.fill(REFILL_BYTES.min(room));
        let exhausted = self.window.position() + self.window.buffered().len() as u64
            >= self.window.stream_size();

        let before = self.ring.len();
        let consumed = if self.inner.is_some() {
            self.refill_stream(room, exhausted)
        } else if self.table.is_some() {
            self.refill_table(room)
        } else {
            self.refill_utf32(room)
        };
        self.window.consume(consumed);
        self.record_chunk(self.ring.len() - before, consumed);

        if self.ring.is_empty() {
            // A truncated trailing sequence (fewer bytes than one code
            // point) degrades to the replacement character.
            if exhausted && !self.window.buffered().is_empty() && self.inner.is_none() {
                let leftover = self.window.buffered().len();
                self.ring.push_back(REPLACEMENT);
                self.window.consume(leftover);
                self.record_chunk(1, leftover);
            }
            // No progress means the stream ended or the source failed a
            // read; either way this is end of input, not an error.
            if self.ring.is_empty() && (exhausted || consumed == 0) {
                self.end_of_input = true;
            }
        }
    }

    fn record_chunk(&mut self, units: usize, bytes: usize) {
        if units == 0 {
            // Bytes with no delivered units (a skipped BOM) belong to the
            // next batch for rewind purposes.
            if bytes > 0 {
                if let Some(back) = self.chunks.back_mut() {
                    back.bytes += bytes;
                } else {
                    self.chunks.push_back(ChunkCost {
                        units: 0,
                        delivered: 0,
                        bytes,
                    });
                }
            }
            return;
        }
        // Fold a dangling zero-unit record into this batch.
        let mut bytes = bytes;
        if let Some(back) = self.chunks.back() {
            if back.units == 0 {
                bytes += back.bytes;
                self.chunks.pop_back();
            }
        }
        self.chunks.push_back(ChunkCost {
            units,
            delivered: 0,
            bytes,
        });
    }

    fn refill_stream(&mut self, room: usize, exhausted: bool) -> usize {
        let Some(decoder) = self.inner.as_mut() else {
            return 0;
        };
        let src = self.window.buffered();
        let mut out = [0u16; 512];
        let mut consumed = 0;
        let mut pushed = 0;

        while pushed < room {
            let chunk = (room - pushed).min(out.len());
            let last = exhausted && !self.flushed;
            let (result, read, written, _malformed) =
                decoder.decode_to_utf16(&src[consumed..], &mut out[..chunk], last);
            consumed += read;
            for &unit in &out[..written] {
                self.ring
                    .push_back(if unit == 0xFFFD { REPLACEMENT } else { unit });
            }
            pushed += written;
            match result {
                encoding_rs::CoderResult::InputEmpty => {
                    if last {
                        self.flushed = true;
                    }
                    break;
                }
                encoding_rs::CoderResult::OutputFull => {
                    // A supplementary-plane pair cannot split into a 1-slot
                    // chunk; give the ring back to the caller first.
                    if read == 0 && written == 0 {
                        break;
                    }
                }
            }
        }
        consumed
    }

    fn refill_table(&mut self, room: usize) -> usize {
        let Some(table) = self.table.as_ref() else {
            return 0;
        };
        let src = self.window.buffered();
        let take = src.len().min(room);
        for &b in &src[..take] {
            let unit = if b < 0x80 {
                b as u16
            } else {
                table[(b - 0x80) as usize]
            };
            self.ring.push_back(unit);
        }
        take
    }

    fn refill_utf32(&mut self, room: usize) -> usize {
        let src = self.window.buffered();
        let be = self.kind == EncodingKind::Utf32Be;
        let mut consumed = 0;
        let mut pushed = 0;
        // Supplementary-plane points need two ring slots.
        while consumed + 4 <= src.len() && pushed + 2 <= room {
            let quad = [
                src[consumed],
                src[consumed + 1],
                src[consumed + 2],
                src[consumed + 3],
            ];
            let cp = if be {
                u32::from_be_bytes(quad)
            } else {
                u32::from_le_bytes(quad)
            };
            consumed += 4;
            match cp {
                0xFEFF if consumed == 4 && self.window.position() == 0 => {} // BOM
                0..=0xD7FF | 0xE000..=0xFFFD => {
                    self.ring.push_back(cp as u16);
                    pushed += 1;
                }
                0x10000..=0x10FFFF => {
                    let v = cp - 0x10000;
                    self.ring.push_back(0xD800 | (v >> 10) as u16);
                    self.ring.push_back(0xDC00 | (v & 0x3FF) as u16);
                    pushed += 2;
                }
                _ => {
                    self.ring.push_back(REPLACEMENT);
                    pushed += 1;
                }
            }
        }
        consumed
    }
}
