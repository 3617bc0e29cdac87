//! Interpreter for the lightweight backslash inline-markup dialect.
//!
//! Some plain-text ebooks carry `\x`-style control codes for styling, page
//! breaks, chapter markers, images, and internal links. The classifier
//! switches here when it sees a high count of backslash-letter codes and no
//! stray backslashes; the interpreter emits the same structural events as
//! every other path. Unknown codes pass through literally, backslash
//! included, matching the entity decoder's posture.

use log::trace;

use crate::codec::{LineReader, MAX_LINE_LEN};
use crate::event::{EventSink, StopToken, TextFlags};
use crate::io::ByteSource;

/// Style toggles and their emitted element names.
fn style_tag(code: char) -> Option<&'static str> {
    match code {
        'i' => Some("emphasis"),
        'b' => Some("strong"),
        'u' => Some("underline"),
        _ => None,
    }
}

/// Run the interpreter over the (rewound) line reader.
pub(crate) fn interpret<S: ByteSource>(
    reader: &mut LineReader<S>,
    sink: &mut dyn EventSink,
    stop: &StopToken,
) {
    let mut state = Inline {
        sink,
        text: String::new(),
        para_open: false,
        heading_open: false,
        styles: Vec::new(),
        align: None,
        was_blank: false,
    };

    state.sink.tag_open(None, "body");
    state.sink.tag_body();

    while let Some(line) = reader.read_line(MAX_LINE_LEN) {
        if stop.is_stopped() {
            break;
        }
        if line.is_empty() {
            state.blank_line();
            continue;
        }
        state.was_blank = false;
        state.line(&line.text);
    }

    state.end_paragraph();
    state.sink.tag_close(None, "body");
}

struct Inline<'a> {
    sink: &'a mut dyn EventSink,
    /// Pending text span, flushed before any structural event.
    text: String,
    para_open: bool,
    heading_open: bool,
    /// Open style elements, innermost last.
    styles: Vec<&'static str>,
    align: Option<&'static str>,
    was_blank: bool,
}

impl<'a> Inline<'a> {
    fn line(&mut self, text: &str) {
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c != '\\' {
                self.text.push(c);
                i += 1;
                continue;
            }
            let Some(&code) = chars.get(i + 1) else {
                self.text.push('\\');
                break;
            };
            i += 2;
            match code {
                '\\' => self.text.push('\\'),
                'p' => {
                    // Page break: paragraph boundary plus explicit space.
                    self.end_paragraph();
                    self.empty_line();
                }
                'x' => self.toggle_heading("1"),
                'X' => {
                    let level = match chars.get(i).copied() {
                        Some(d @ '0'..='4') => {
                            i += 1;
                            d
                        }
                        _ => '0',
                    };
                    let level = ((level as u8 - b'0') + 1).to_string();
                    self.toggle_heading(&level);
                }
                'C' => {
                    // \Cn="text": a table-of-contents marker, not displayed.
                    if chars.get(i).is_some_and(|d| d.is_ascii_digit()) {
                        i += 1;
                    }
                    if let Some((value, next)) = parse_quoted(&chars, i) {
                        i = next;
                        self.flush_text();
                        self.ensure_paragraph();
                        self.sink.tag_open(None, "a");
                        self.sink.attribute(None, "title", &value);
                        self.sink.tag_body();
                        self.sink.tag_close(None, "a");
                    }
                }
                'i' | 'b' | 'u' => {
                    if let Some(tag) = style_tag(code) {
                        self.toggle_style(tag);
                    }
                }
                'c' => self.toggle_align("center"),
                'r' => self.toggle_align("right"),
                'm' => {
                    if let Some((href, next)) = parse_quoted(&chars, i) {
                        i = next;
                        self.flush_text();
                        self.ensure_paragraph();
                        self.sink.tag_open(None, "image");
                        self.sink.attribute(None, "href", &href);
                        self.sink.tag_body();
                        self.sink.tag_close(None, "image");
                    }
                }
                'Q' => {
                    if let Some((name, next)) = parse_quoted(&chars, i) {
                        i = next;
                        self.flush_text();
                        self.ensure_paragraph();
                        self.sink.tag_open(None, "a");
                        self.sink.attribute(None, "name", &name);
                        self.sink.tag_body();
                        self.sink.tag_close(None, "a");
                    }
                }
                'q' => {
                    // \q="#target""display text"
                    if let Some((href, after_href)) = parse_quoted(&chars, i) {
                        if let Some((label, next)) = parse_bare_quoted(&chars, after_href) {
                            i = next;
                            self.flush_text();
                            self.ensure_paragraph();
                            self.sink.tag_open(None, "a");
                            self.sink.attribute(None, "href", &href);
                            self.sink.tag_body();
                            self.sink.text(&label, TextFlags::empty());
                            self.sink.tag_close(None, "a");
                        } else {
                            i = after_href;
                        }
                    }
                }
                'w' => {
                    if let Some((width, next)) = parse_quoted(&chars, i) {
                        i = next;
                        self.end_paragraph();
                        self.sink.tag_open(None, "hr");
                        self.sink.attribute(None, "width", &width);
                        self.sink.tag_body();
                        self.sink.tag_close(None, "hr");
                    }
                }
                't' | 's' | 'n' => {
                    // Indent and font-size toggles carry no structure.
                    trace!("ignoring inline code \\{}", code);
                }
                other => {
                    // Unknown code: literal pass-through.
                    self.text.push('\\');
                    self.text.push(other);
                }
            }
        }
        // Soft wrap between source lines.
        if !self.text.is_empty() && !self.text.ends_with(' ') {
            self.text.push(' ');
        }
    }

    fn blank_line(&mut self) {
        if self.was_blank {
            self.empty_line();
        } else {
            self.end_paragraph();
        }
        self.was_blank = true;
    }

    fn ensure_paragraph(&mut self) {
        if self.para_open || self.heading_open {
            return;
        }
        self.sink.tag_open(None, "p");
        if let Some(align) = self.align {
            self.sink.attribute(None, "align", align);
        }
        self.sink.tag_body();
        self.para_open = true;
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        // Whitespace alone never opens a paragraph, but inside one it is
        // the spacing between styled spans and must survive.
        if self.text.trim().is_empty() && !self.para_open && !self.heading_open {
            self.text.clear();
            return;
        }
        self.ensure_paragraph();
        let text = std::mem::take(&mut self.text);
        self.sink.text(&text, TextFlags::COLLAPSE_SPACES);
    }

    fn end_paragraph(&mut self) {
        self.flush_text();
        // Styles left open at a paragraph break close defensively.
        while let Some(tag) = self.styles.pop() {
            self.sink.tag_close(None, tag);
        }
        if self.heading_open {
            self.sink.tag_close(None, "title");
            self.heading_open = false;
        }
        if self.para_open {
            self.sink.tag_close(None, "p");
            self.para_open = false;
        }
    }

    fn empty_line(&mut self) {
        self.sink.tag_open(None, "empty-line");
        self.sink.tag_body();
        self.sink.tag_close(None, "empty-line");
    }

    fn toggle_heading(&mut self, level: &str) {
        if self.heading_open {
            self.flush_text();
            while let Some(tag) = self.styles.pop() {
                self.sink.tag_close(None, tag);
            }
            self.sink.tag_close(None, "title");
            self.heading_open = false;
        } else {
            self.end_paragraph();
            self.sink.tag_open(None, "title");
            self.sink.attribute(None, "level", level);
            self.sink.tag_body();
            self.heading_open = true;
        }
    }

    fn toggle_style(&mut self, tag: &'static str) {
        if let Some(pos) = self.styles.iter().position(|t| *t == tag) {
            self.flush_text();
            // Close down to the toggled element, then reopen the rest to
            // keep the event stream well nested.
            let reopen: Vec<&'static str> = self.styles.drain(pos..).skip(1).collect();
            for inner in reopen.iter().rev() {
                self.sink.tag_close(None, inner);
            }
            self.sink.tag_close(None, tag);
            for inner in reopen {
                self.sink.tag_open(None, inner);
                self.sink.tag_body();
                self.styles.push(inner);
            }
        } else {
            self.flush_text();
            self.ensure_paragraph();
            self.sink.tag_open(None, tag);
            self.sink.tag_body();
            self.styles.push(tag);
        }
    }

    fn toggle_align(&mut self, align: &'static str) {
        // Alignment applies per paragraph; toggling mid-flow starts a new
        // block.
        self.end_paragraph();
        self.align = if self.align == Some(align) {
            None
        } else {
            Some(align)
        };
    }
}

/// Parse `="value"` starting at `i`. Returns the value and the index after
/// the closing quote.
fn parse_quoted(chars: &[char], i: usize) -> Option<(String, usize)> {
    if chars.get(i) != Some(&'=') {
        return None;
    }
    parse_bare_quoted(chars, i + 1)
}

/// Parse `"value"` starting at `i`.
fn parse_bare_quoted(chars: &[char], i: usize) -> Option<(String, usize)> {
    if chars.get(i) != Some(&'"') {
        return None;
    }
    let mut value = String::new();
    let mut j = i + 1;
    while j < chars.len() {
        if chars[j] == '"' {
            return Some((value, j + 1));
        }
        value.push(chars[j]);
        j += 1;
    }
    None
}
