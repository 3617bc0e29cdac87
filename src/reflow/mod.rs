//! Heuristic reflow of unmarked plain text into structural events.
//!
//! Two passes: classification reads a sample window of lines and picks a
//! format mode from column statistics; assembly walks the rewound stream,
//! grouping lines into paragraph, heading, and empty-line events. When the
//! classifier finds the backslash inline-markup dialect, a dedicated
//! interpreter runs instead. All three emit through the same [`EventSink`]
//! the tag tokenizer uses.

mod assemble;
mod classify;
mod inline;

pub use assemble::{MAX_HEADING_LEN, SHORT_HEADING_LEN};
pub use classify::{
    classify, classify_alignment, FormatMode, LineStats, EMPTY_LINES_MIN_PERCENT,
    IDENT_LINES_MAX_PERCENT, IDENT_LINES_MIN_PERCENT, MIN_INLINE_CODES, RIGHT_EDGE_MIN_PERCENT,
    SAMPLE_LINES,
};

use crate::codec::{LineReader, TextDecoder, MAX_LINE_LEN};
use crate::event::{EventSink, ParserConfig, StopToken};
use crate::io::{ByteSource, ByteWindow};

/// Parser for plain-text sources with no markup at all.
pub struct TextParser<S: ByteSource> {
    reader: LineReader<S>,
    config: ParserConfig,
}

impl<S: ByteSource> TextParser<S> {
    /// Create a parser over a source, autodetecting the encoding.
    pub fn new(source: S, config: ParserConfig) -> Self {
        let decoder = TextDecoder::with_detected(ByteWindow::new(source), false);
        Self::with_decoder(decoder, config)
    }

    pub fn with_decoder(decoder: TextDecoder<S>, config: ParserConfig) -> Self {
        Self {
            reader: LineReader::new(decoder),
            config,
        }
    }

    /// Run both passes. Returns false only when the stream is empty.
    ///
    /// The sink observes exactly one `start()`/`stop()` pair; the stop token
    /// is polled between lines in both passes.
    pub fn parse(&mut self, sink: &mut dyn EventSink, stop: &StopToken) -> bool {
        if self.reader.decoder().stream_size() == 0 {
            return false;
        }
        sink.start();
        sink.encoding(
            self.reader.decoder().encoding().name(),
            self.reader.decoder().conversion_table(),
        );

        // Classification pass over the sample window.
        let mut stats = LineStats::default();
        let mut sampled = 0;
        while sampled < SAMPLE_LINES && !stop.is_stopped() {
            let Some(line) = self.reader.read_line(MAX_LINE_LEN) else {
                break;
            };
            stats.observe(&line);
            sampled += 1;
        }
        stats.finish();
        let mode = classify(&stats);

        // Assembly pass over the full stream.
        self.reader.rewind();
        match mode {
            FormatMode::InlineMarkup => inline::interpret(&mut self.reader, sink, stop),
            _ => assemble::assemble(&mut self.reader, sink, stop, mode, &stats, &self.config),
        }

        sink.stop();
        true
    }
}
