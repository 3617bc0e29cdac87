//! The assembly pass: group classified lines into structural events.
//!
//! Walks the line stream in the mode the classifier picked, joining wrapped
//! lines into paragraphs and promoting heading candidates to section titles.
//! The emitted element vocabulary is dialect-agnostic (`body`, `section`,
//! `title`, `p`, `empty-line`, `hr`); the sink decides what they mean.

use std::collections::VecDeque;

use crate::codec::{LineAlignment, LineFlags, LineReader, TextLine, MAX_LINE_LEN};
use crate::event::{EventSink, ParserConfig, StopToken, TextFlags};
use crate::io::ByteSource;

use super::classify::{classify_alignment, FormatMode, LineStats};

/// Lines longer than this are never headings, whatever else they look like.
pub const MAX_HEADING_LEN: usize = 80;

/// A short isolated line (blank above and below) at most this long is a
/// heading candidate on its own.
pub const SHORT_HEADING_LEN: usize = 40;

/// Minimum repeat count for the repeated-character heading signal.
const MIN_REPEAT_CHARS: usize = 3;

/// "Volume/Part/Chapter"-style keyword prefixes, checked case-insensitively.
/// Grouped per language; a small table, not a localization framework.
static HEADING_KEYWORDS: &[&str] = &[
    // English
    "chapter", "volume", "part", "book", "section", "prologue", "epilogue",
    // Russian
    "глава", "том", "часть", "книга", "пролог", "эпилог",
    // French
    "chapitre", "tome", "partie", "livre",
    // German
    "kapitel", "teil", "band", "buch",
    // Spanish / Italian
    "capítulo", "capitulo", "parte", "libro", "capitolo",
];

/// Roman numerals I through XXXIX; chapter numbering rarely runs higher in
/// the wild, and an open-ended matcher would swallow words like "MIX".
static ROMAN_NUMERALS: &[&str] = &[
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII", "XIII", "XIV",
    "XV", "XVI", "XVII", "XVIII", "XIX", "XX", "XXI", "XXII", "XXIII", "XXIV", "XXV", "XXVI",
    "XXVII", "XXVIII", "XXIX", "XXX", "XXXI", "XXXII", "XXXIII", "XXXIV", "XXXV", "XXXVI",
    "XXXVII", "XXXVIII", "XXXIX",
];

/// Run the assembly pass over the (rewound) line reader.
pub(crate) fn assemble<S: ByteSource>(
    reader: &mut LineReader<S>,
    sink: &mut dyn EventSink,
    stop: &StopToken,
    mode: FormatMode,
    stats: &LineStats,
    config: &ParserConfig,
) {
    let mut asm = Assembler {
        sink,
        mode,
        stats,
        trim: config.trim_spaces,
        paragraph: String::new(),
        paragraph_align: LineAlignment::Unknown,
        section_open: false,
        prev_blank: true,
    };

    asm.sink.tag_open(None, "body");
    asm.sink.tag_body();

    let mut queue: VecDeque<TextLine> = VecDeque::with_capacity(2);
    loop {
        if stop.is_stopped() {
            break;
        }
        while queue.len() < 2 {
            match reader.read_line(MAX_LINE_LEN) {
                Some(line) => queue.push_back(line),
                None => break,
            }
        }
        let Some(line) = queue.pop_front() else {
            break;
        };
        let next_blank = queue.front().map(|l| l.is_empty()).unwrap_or(true);
        asm.line(line, next_blank);
    }

    asm.flush_paragraph();
    asm.close_section();
    asm.sink.tag_close(None, "body");
}

struct Assembler<'a> {
    sink: &'a mut dyn EventSink,
    mode: FormatMode,
    stats: &'a LineStats,
    trim: bool,
    paragraph: String,
    paragraph_align: LineAlignment,
    section_open: bool,
    prev_blank: bool,
}

impl<'a> Assembler<'a> {
    fn line(&mut self, mut line: TextLine, next_blank: bool) {
        let was_blank = self.prev_blank;
        self.prev_blank = line.is_empty();

        if line.is_rule() {
            self.flush_paragraph();
            self.emit_rule();
            return;
        }
        if line.is_empty() {
            self.blank_line();
            return;
        }
        if line.flags.contains(LineFlags::HEADER) {
            // Embedded header records are titles by convention.
            self.flush_paragraph();
            self.emit_heading(line.text.trim());
            return;
        }

        match self.mode {
            FormatMode::Preformatted | FormatMode::ParagraphPerLine => {
                self.flush_paragraph();
                if is_heading(&line.text, was_blank, next_blank) {
                    self.emit_heading(line.text.trim());
                } else {
                    let preserve = self.mode == FormatMode::Preformatted;
                    self.emit_paragraph_line(&line.text, preserve);
                }
            }
            FormatMode::IndentDelimited => {
                if line.left > self.stats.modal_left {
                    self.flush_paragraph();
                }
                self.accumulate(&line, was_blank, next_blank);
            }
            FormatMode::BlankLineDelimited => {
                self.accumulate(&line, was_blank, next_blank);
            }
            FormatMode::Formatted => {
                line.align = classify_alignment(&line, self.stats);
                match line.align {
                    LineAlignment::Indent => {
                        self.flush_paragraph();
                        self.accumulate(&line, was_blank, next_blank);
                    }
                    LineAlignment::Center | LineAlignment::Right => {
                        // Centered/right lines stand alone.
                        self.flush_paragraph();
                        let align = line.align;
                        if is_heading(&line.text, was_blank, next_blank) {
                            self.emit_heading(line.text.trim());
                        } else {
                            self.paragraph_align = align;
                            self.paragraph.push_str(line.text.trim());
                            self.flush_paragraph();
                        }
                    }
                    _ => self.accumulate(&line, was_blank, next_blank),
                }
            }
            // InlineMarkup never reaches the assembler.
            FormatMode::InlineMarkup => {}
        }
    }

    /// Join a line into the open paragraph, or emit it as a heading when it
    /// stands alone and looks like one.
    fn accumulate(&mut self, line: &TextLine, was_blank: bool, next_blank: bool) {
        if self.paragraph.is_empty()
            && was_blank
            && next_blank
            && is_heading(&line.text, was_blank, next_blank)
        {
            self.emit_heading(line.text.trim());
            return;
        }
        let text = line.text.trim();
        if self.paragraph.is_empty() {
            self.paragraph.push_str(text);
            return;
        }
        // Hard-wrapped hyphenation joins without a space.
        if self.paragraph.ends_with('-') {
            self.paragraph.pop();
        } else {
            self.paragraph.push(' ');
        }
        self.paragraph.push_str(text);
    }

    fn blank_line(&mut self) {
        if self.paragraph.is_empty() {
            // Consecutive blanks are explicit vertical space.
            self.emit_empty_line();
        } else {
            self.flush_paragraph();
        }
    }

    fn flush_paragraph(&mut self) {
        if self.paragraph.is_empty() {
            self.paragraph_align = LineAlignment::Unknown;
            return;
        }
        let text = std::mem::take(&mut self.paragraph);
        let align = self.paragraph_align;
        self.paragraph_align = LineAlignment::Unknown;
        self.emit_block("p", &text, align, false);
    }

    fn emit_paragraph_line(&mut self, text: &str, preserve: bool) {
        let shown = if self.trim && !preserve {
            text.trim()
        } else {
            text
        };
        if shown.is_empty() {
            self.emit_empty_line();
            return;
        }
        self.emit_block("p", shown, LineAlignment::Unknown, preserve);
    }

    fn emit_heading(&mut self, text: &str) {
        self.close_section();
        self.sink.tag_open(None, "section");
        self.sink.tag_body();
        self.section_open = true;
        self.emit_block("title", text, LineAlignment::Unknown, false);
    }

    fn emit_block(&mut self, name: &str, text: &str, align: LineAlignment, preserve: bool) {
        self.sink.tag_open(None, name);
        match align {
            LineAlignment::Center => self.sink.attribute(None, "align", "center"),
            LineAlignment::Right => self.sink.attribute(None, "align", "right"),
            _ => {}
        }
        if is_rtl_text(text) {
            self.sink.attribute(None, "dir", "rtl");
        }
        self.sink.tag_body();
        let mut flags = TextFlags::empty();
        if preserve {
            flags.insert(TextFlags::PRESERVE);
        } else {
            flags.insert(TextFlags::COLLAPSE_SPACES);
            if self.trim {
                flags.insert(TextFlags::TRIM);
            }
        }
        self.sink.text(text, flags);
        self.sink.tag_close(None, name);
    }

    fn emit_empty_line(&mut self) {
        self.sink.tag_open(None, "empty-line");
        self.sink.tag_body();
        self.sink.tag_close(None, "empty-line");
    }

    fn emit_rule(&mut self) {
        self.sink.tag_open(None, "hr");
        self.sink.tag_body();
        self.sink.tag_close(None, "hr");
    }

    fn close_section(&mut self) {
        if self.section_open {
            self.sink.tag_close(None, "section");
            self.section_open = false;
        }
    }
}

/// Heading detection: independent signals, any one sufficient, all gated by
/// the hard length ceiling.
pub(crate) fn is_heading(text: &str, prev_blank: bool, next_blank: bool) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let len = trimmed.chars().count();
    if len > MAX_HEADING_LEN {
        return false;
    }

    if is_repeated_separator(trimmed) {
        return true;
    }
    if starts_with_heading_keyword(trimmed) {
        return true;
    }
    if is_chapter_number(trimmed) {
        return true;
    }
    if is_roman_numeral(trimmed) {
        return true;
    }
    // Short isolated line. Sentence punctuation at the end marks it as a
    // one-line paragraph instead; blank-delimited prose is full of those.
    prev_blank
        && next_blank
        && len <= SHORT_HEADING_LEN
        && !trimmed.ends_with(['.', ',', ';', ':'])
}

/// One repeated non-alphanumeric character, e.g. `.....` between scenes.
fn is_repeated_separator(text: &str) -> bool {
    let mut chars = text.chars().filter(|c| *c != ' ');
    let Some(first) = chars.next() else {
        return false;
    };
    if first.is_alphanumeric() {
        return false;
    }
    let mut count = 1;
    for c in chars {
        if c != first {
            return false;
        }
        count += 1;
    }
    count >= MIN_REPEAT_CHARS
}

fn starts_with_heading_keyword(text: &str) -> bool {
    let first_word: String = text
        .chars()
        .take_while(|c| !c.is_whitespace())
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    !first_word.is_empty() && HEADING_KEYWORDS.contains(&first_word.as_str())
}

/// Purely numeric with at most one embedded period: "7", "3.2", "14.".
fn is_chapter_number(text: &str) -> bool {
    let mut digits = 0;
    let mut periods = 0;
    for c in text.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => periods += 1,
            _ => return false,
        }
    }
    digits > 0 && periods <= 1
}

fn is_roman_numeral(text: &str) -> bool {
    let candidate: String = text
        .trim_end_matches('.')
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .collect();
    ROMAN_NUMERALS.contains(&candidate.as_str())
}

/// True when the first directionally strong character is right-to-left
/// (Hebrew, Arabic, Syriac, Thaana, and the Arabic presentation forms).
pub(crate) fn is_rtl_text(text: &str) -> bool {
    for c in text.chars() {
        let cp = c as u32;
        if matches!(cp, 0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF) {
            return true;
        }
        if c.is_alphabetic() {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_keywords() {
        assert!(is_heading("Chapter 1", false, false));
        assert!(is_heading("CHAPTER XII", false, false));
        assert!(is_heading("Глава 3", false, false));
        assert!(is_heading("Chapitre IX", false, false));
        assert!(!is_heading("Chapters of my life were closed", true, false));
    }

    #[test]
    fn test_chapter_numbers() {
        assert!(is_heading("7", false, false));
        assert!(is_heading("3.2", false, false));
        assert!(is_heading("14.", false, false));
        assert!(!is_heading("3.2.1", false, false));
        assert!(!is_heading("3a", false, false));
    }

    #[test]
    fn test_roman_numerals() {
        assert!(is_heading("IV", false, false));
        assert!(is_heading("xxxix", false, false));
        assert!(is_heading("XII.", false, false));
        assert!(!is_heading("XL", false, false)); // out of the bounded list
        assert!(!is_heading("MIX", false, false));
    }

    #[test]
    fn test_repeated_separator() {
        assert!(is_heading(".....", false, false));
        assert!(is_heading("+ + +", false, false));
        assert!(!is_heading("..", false, false));
        assert!(!is_heading("aaaaa", false, false));
    }

    #[test]
    fn test_short_isolated_line() {
        assert!(is_heading("The End", true, true));
        assert!(!is_heading("The End", true, false));
        assert!(!is_heading("A one-line paragraph, then.", true, true));
        assert!(!is_heading(
            "Some prose that is long enough not to be a heading candidate.",
            true,
            true
        ));
    }

    #[test]
    fn test_length_ceiling_beats_other_signals() {
        let long = format!("Chapter 1 {}", "x".repeat(MAX_HEADING_LEN));
        assert!(!is_heading(&long, true, true));
    }

    #[test]
    fn test_rtl_detection() {
        assert!(is_rtl_text("שלום עולם"));
        assert!(is_rtl_text("مرحبا بالعالم"));
        assert!(!is_rtl_text("hello world"));
        assert!(!is_rtl_text("12 34")); // no strong direction at all
        assert!(is_rtl_text("12 שלום")); // digits are neutral
    }
}
