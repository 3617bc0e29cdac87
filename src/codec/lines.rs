//! Line reading on top of the decoder, for the plain-text reflow engine.
//!
//! Produces [`TextLine`] records with the column geometry the classifier
//! feeds on. Handles CRLF/LFCR as a single break, folds the SOH/STX embedded
//! header convention, and collapses same-character rule lines into one
//! canonical horizontal-rule marker.

use crate::io::ByteSource;

use super::TextDecoder;

/// Hard cap on accumulated characters per line; longer input continues on
/// the next `read_line` call with the EOL flag clear.
pub const MAX_LINE_LEN: usize = 2048;

/// Tab stops are every 8 columns.
const TAB_STOP: u16 = 8;

/// Minimum run of an identical character for rule-line collapsing.
const MIN_RULE_CHARS: usize = 3;

/// Opening/closing control bytes of an embedded header record.
const HEADER_OPEN: u16 = 0x01; // SOH
const HEADER_CLOSE: u16 = 0x02; // STX

/// Per-line flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineFlags(u8);

impl LineFlags {
    /// The line ended at a line break (not the length cap).
    pub const EOL: Self = Self(1);
    /// The line was an embedded header record, markers stripped.
    pub const HEADER: Self = Self(1 << 1);
    /// The line collapsed to the canonical horizontal-rule marker.
    pub const HRULE: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Alignment assigned by the reflow classifier; `Unknown` until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineAlignment {
    #[default]
    Unknown,
    Empty,
    Left,
    Indent,
    Center,
    Right,
    Justified,
}

/// One decoded source line with its column geometry.
#[derive(Debug, Clone, Default)]
pub struct TextLine {
    pub text: String,
    /// Leftmost non-space column (0-based; 0 for empty lines).
    pub left: u16,
    /// Rightmost non-space column (0-based; 0 for empty lines).
    pub right: u16,
    pub flags: LineFlags,
    pub align: LineAlignment,
}

impl TextLine {
    pub fn is_empty(&self) -> bool {
        self.text.chars().all(|c| c == ' ')
    }

    pub fn is_rule(&self) -> bool {
        self.flags.contains(LineFlags::HRULE)
    }
}

/// Reads decoded lines from a [`TextDecoder`].
pub struct LineReader<S: ByteSource> {
    decoder: TextDecoder<S>,
}

impl<S: ByteSource> LineReader<S> {
    pub fn new(decoder: TextDecoder<S>) -> Self {
        Self { decoder }
    }

    pub fn decoder(&self) -> &TextDecoder<S> {
        &self.decoder
    }

    pub fn into_decoder(self) -> TextDecoder<S> {
        self.decoder
    }

    /// Seek back to the stream start for the assembly pass.
    pub fn rewind(&mut self) {
        self.decoder.rewind();
    }

    /// Read the next line, up to `max_len` characters.
    ///
    /// Returns `None` at end of input. Tabs expand to 8-column stops during
    /// accumulation so the column geometry matches what a terminal-era
    /// formatter meant.
    pub fn read_line(&mut self, max_len: usize) -> Option<TextLine> {
        let mut units: Vec<u16> = Vec::new();
        let mut flags = LineFlags::default();
        let mut saw_any = false;

        loop {
            let Some(unit) = self.decoder.next_char() else {
                if !saw_any {
                    return None;
                }
                break;
            };
            saw_any = true;
            match unit {
                0x000D => {
                    if self.decoder.peek_char(0) == 0x000A {
                        self.decoder.skip(1);
                    }
                    flags.insert(LineFlags::EOL);
                    break;
                }
                0x000A => {
                    if self.decoder.peek_char(0) == 0x000D {
                        self.decoder.skip(1);
                    }
                    flags.insert(LineFlags::EOL);
                    break;
                }
                0x0009 => {
                    let col = units.len() as u16;
                    let next_stop = (col / TAB_STOP + 1) * TAB_STOP;
                    for _ in col..next_stop {
                        units.push(b' ' as u16);
                    }
                }
                _ => units.push(unit),
            }
            if units.len() >= max_len {
                break;
            }
        }

        // Embedded header record: a line bounded by SOH ... STX.
        if units.first() == Some(&HEADER_OPEN) {
            if units.last() == Some(&HEADER_CLOSE) {
                units.pop();
            }
            units.remove(0);
            flags.insert(LineFlags::HEADER);
        }

        let mut line = TextLine {
            text: String::from_utf16_lossy(&units),
            flags,
            ..TextLine::default()
        };
        compute_columns(&mut line);
        collapse_rule_line(&mut line);
        Some(line)
    }
}

fn compute_columns(line: &mut TextLine) {
    let mut left = None;
    let mut right = 0u16;
    for (col, c) in line.text.chars().enumerate() {
        if c != ' ' {
            let col = col.min(u16::MAX as usize) as u16;
            left.get_or_insert(col);
            right = col;
        }
    }
    line.left = left.unwrap_or(0);
    line.right = right;
    if left.is_none() {
        line.align = LineAlignment::Empty;
    }
}

/// A line of nothing but one repeated separator character (spaces allowed
/// between repeats, as in `"* * *"`) becomes the canonical rule marker.
fn collapse_rule_line(line: &mut TextLine) {
    const RULE_CHARS: &[char] = &['-', '*', '=', '_', '~', '#'];
    let mut repeated = None;
    let mut count = 0usize;
    for c in line.text.chars() {
        if c == ' ' {
            continue;
        }
        if !RULE_CHARS.contains(&c) {
            return;
        }
        match repeated {
            None => repeated = Some(c),
            Some(r) if r == c => {}
            Some(_) => return,
        }
        count += 1;
    }
    if count >= MIN_RULE_CHARS {
        line.text.clear();
        line.left = 0;
        line.right = 0;
        line.flags.insert(LineFlags::HRULE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncodingKind;
    use crate::io::{ByteWindow, MemorySource};

    fn reader_over(text: &str) -> LineReader<MemorySource> {
        let window = ByteWindow::new(MemorySource::new(text.as_bytes().to_vec()));
        LineReader::new(TextDecoder::with_encoding(window, EncodingKind::Utf8))
    }

    fn all_lines(text: &str) -> Vec<TextLine> {
        let mut reader = reader_over(text);
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line(MAX_LINE_LEN) {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_line_breaks() {
        let lines = all_lines("one\ntwo\r\nthree\rfour\n\rfive");
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three", "four", "five"]);
    }

    #[test]
    fn test_column_geometry() {
        let lines = all_lines("  hello  \nworld");
        assert_eq!(lines[0].left, 2);
        assert_eq!(lines[0].right, 6);
        assert_eq!(lines[1].left, 0);
        assert_eq!(lines[1].right, 4);
    }

    #[test]
    fn test_empty_line_alignment() {
        let lines = all_lines("a\n   \nb");
        assert_eq!(lines[1].align, LineAlignment::Empty);
        assert!(lines[1].is_empty());
    }

    #[test]
    fn test_tab_expansion() {
        let lines = all_lines("\tx");
        assert_eq!(lines[0].text, "        x");
        assert_eq!(lines[0].left, 8);
    }

    #[test]
    fn test_rule_line_canonicalization() {
        for text in ["---", "* * *", "=====", "~ ~ ~ ~"] {
            let lines = all_lines(text);
            assert!(lines[0].is_rule(), "{:?} should collapse to a rule", text);
            assert_eq!(lines[0].text, "");
        }
        // Mixed characters and short runs stay verbatim.
        for text in ["-*-", "--", "a---"] {
            let lines = all_lines(text);
            assert!(!lines[0].is_rule(), "{:?} should not collapse", text);
        }
    }

    #[test]
    fn test_header_sentinel() {
        let text = "\u{1}The Title\u{2}\nbody";
        let lines = all_lines(text);
        assert!(lines[0].flags.contains(LineFlags::HEADER));
        assert_eq!(lines[0].text, "The Title");
        assert_eq!(lines[1].text, "body");
    }

    #[test]
    fn test_max_len_truncation() {
        let mut reader = reader_over("abcdefgh\n");
        let first = reader.read_line(4).unwrap();
        assert_eq!(first.text, "abcd");
        assert!(!first.flags.contains(LineFlags::EOL));
        let rest = reader.read_line(4).unwrap();
        assert_eq!(rest.text, "efgh");
    }
}
