//! Reflow engine integration tests.
//!
//! Exercises the full two-pass pipeline over in-memory plain-text
//! documents: classification, heading detection, rule canonicalization, and
//! the inline-markup dialect.

use quire::{
    EventSink, MemorySource, NodeHandle, ParserConfig, StopToken, TextFlags, TextParser,
};

/// Flat event trace for structural assertions.
#[derive(Default)]
struct TraceSink {
    events: Vec<String>,
    stops: usize,
}

impl TraceSink {
    fn blocks(&self) -> Vec<(String, String)> {
        // Pair each open element with its first text event.
        let mut blocks = Vec::new();
        let mut current: Option<String> = None;
        for event in &self.events {
            if let Some(name) = event.strip_prefix("open ") {
                current = Some(name.to_string());
            } else if let Some(text) = event.strip_prefix("text ") {
                if let Some(name) = current.take() {
                    blocks.push((name, text.to_string()));
                }
            } else if event.starts_with("close ") {
                current = None;
            }
        }
        blocks
    }
}

impl EventSink for TraceSink {
    fn tag_open(&mut self, _ns: Option<&str>, name: &str) -> NodeHandle {
        self.events.push(format!("open {}", name));
        NodeHandle::NONE
    }
    fn tag_close(&mut self, _ns: Option<&str>, name: &str) {
        self.events.push(format!("close {}", name));
    }
    fn attribute(&mut self, _ns: Option<&str>, name: &str, value: &str) {
        self.events.push(format!("attr {}={}", name, value));
    }
    fn text(&mut self, text: &str, _flags: TextFlags) {
        self.events.push(format!("text {}", text));
    }
    fn stop(&mut self) {
        self.stops += 1;
    }
}

fn reflow(text: &str) -> TraceSink {
    let mut parser = TextParser::new(
        MemorySource::new(text.as_bytes().to_vec()),
        ParserConfig::default(),
    );
    let mut sink = TraceSink::default();
    assert!(parser.parse(&mut sink, &StopToken::new()));
    assert_eq!(sink.stops, 1);
    sink
}

// ============================================================================
// Headings and paragraphs
// ============================================================================

#[test]
fn test_chapter_heading_and_prose() {
    let sink = reflow(
        "Chapter 1\n\nSome prose that is long enough not to be a heading candidate.\n",
    );
    let blocks = sink.blocks();
    assert!(
        blocks
            .iter()
            .any(|(name, text)| name == "title" && text.contains("Chapter 1")),
        "no heading for 'Chapter 1' in {:?}",
        blocks
    );
    assert!(
        blocks
            .iter()
            .any(|(name, text)| name == "p" && text.contains("Some prose")),
        "no paragraph for the prose line in {:?}",
        blocks
    );
}

#[test]
fn test_roman_numeral_heading() {
    let sink = reflow("XIV\n\nThe fourteenth chapter begins with this rather ordinary paragraph of prose.\n");
    let blocks = sink.blocks();
    assert!(blocks.iter().any(|(name, text)| name == "title" && text == "XIV"));
}

#[test]
fn test_blank_delimited_paragraphs_join_wrapped_lines() {
    let doc = "\
First paragraph first line that wraps\nonto a second physical line.\n\n\
Second paragraph on its own.\n\n\
Third paragraph also stands alone here.\n";
    let sink = reflow(doc);
    let blocks = sink.blocks();
    let paragraphs: Vec<&(String, String)> = blocks
        .iter()
        .filter(|(name, _)| name == "p")
        .collect();
    assert_eq!(paragraphs.len(), 3, "{:?}", blocks);
    assert!(paragraphs[0].1.contains("wraps onto a second"));
}

#[test]
fn test_hyphenated_wrap_joins_without_space() {
    let doc = "\
The word at the end of this line is hyphen-\nated across the break here.\n\n\
And a second paragraph to give the classifier its blank lines.\n";
    let sink = reflow(doc);
    let joined = sink
        .blocks()
        .iter()
        .find(|(name, text)| name == "p" && text.contains("hyphen"))
        .map(|(_, text)| text.clone())
        .unwrap();
    assert!(joined.contains("hyphenated"), "{:?}", joined);
}

// ============================================================================
// Rules and blank space
// ============================================================================

#[test]
fn test_rule_lines_canonicalize_identically() {
    let with_stars = reflow("before the break\n\n* * *\n\nafter the break\n");
    let with_dashes = reflow("before the break\n\n---\n\nafter the break\n");
    let hr_events = |sink: &TraceSink| {
        sink.events
            .iter()
            .filter(|e| *e == "open hr")
            .count()
    };
    assert_eq!(hr_events(&with_stars), 1);
    assert_eq!(hr_events(&with_dashes), 1);
    // Both inputs produce the same structural shape.
    assert_eq!(with_stars.events, with_dashes.events);
}

#[test]
fn test_consecutive_blanks_become_empty_lines() {
    let sink = reflow("one paragraph of text sits here\n\n\n\nanother paragraph after the gap\n");
    assert!(sink.events.iter().any(|e| e == "open empty-line"));
}

// ============================================================================
// Mode selection end to end
// ============================================================================

#[test]
fn test_justified_text_reflows_into_one_paragraph() {
    let doc = "\
The quick brown fox jumps over the lazy dog again and again, at length\n\
and the evening settled slowly over the quiet harbour town while all of\n\
the fishermen hauled their nets ashore and counted the day's catch in\n\
the fading light, speaking softly of the weather and of the long winter\n\
that was surely coming to the coast before the month was out, they said\n";
    let sink = reflow(doc);
    let paragraphs = sink
        .blocks()
        .into_iter()
        .filter(|(name, _)| name == "p")
        .count();
    assert_eq!(paragraphs, 1, "hard-wrapped prose joins into one block");
}

#[test]
fn test_preformatted_keeps_lines_apart() {
    // Ragged right edges, no blanks, no indents: preformatted.
    let doc = "alpha beta\ngamma\ndelta epsilon zeta eta theta\niota\nkappa lambda mu\n";
    let sink = reflow(doc);
    let paragraphs = sink
        .blocks()
        .into_iter()
        .filter(|(name, _)| name == "p")
        .count();
    assert!(paragraphs >= 4, "preformatted keeps lines separate");
}

#[test]
fn test_indent_delimited_paragraphs() {
    let doc = "\
    The first paragraph opens with an indent and then continues with
more text that is flush left and wraps across several physical lines
of roughly even width, like typewritten manuscripts used to be.
    The second paragraph opens the same way and also continues on
with flush-left continuation lines to the bottom of the page.
";
    let sink = reflow(doc);
    let paragraphs = sink
        .blocks()
        .into_iter()
        .filter(|(name, _)| name == "p")
        .count();
    assert_eq!(paragraphs, 2, "one paragraph per indented opening");
}

#[test]
fn test_rtl_paragraph_gets_direction_attribute() {
    let doc = "שורה ראשונה של טקסט בעברית\n\nושורה שנייה ארוכה יותר של אותו מסמך\n";
    let sink = reflow(doc);
    assert!(
        sink.events.iter().any(|e| e == "attr dir=rtl"),
        "{:?}",
        sink.events
    );
}

// ============================================================================
// Inline-markup dialect
// ============================================================================

#[test]
fn test_inline_dialect_styles_and_headings() {
    let doc = "\
\\xChapter One\\x\n\
\n\
It was \\ia dark and stormy night\\i; the rain fell \\bin torrents\\b.\n\
\n\
\\m=\"storm.png\"\n";
    let sink = reflow(doc);
    let events = &sink.events;
    assert!(events.contains(&"open title".to_string()), "{:?}", events);
    assert!(events.contains(&"open emphasis".to_string()));
    assert!(events.contains(&"close emphasis".to_string()));
    assert!(events.contains(&"open strong".to_string()));
    assert!(events.contains(&"open image".to_string()));
    assert!(events.contains(&"attr href=storm.png".to_string()));
}

#[test]
fn test_inline_dialect_link_and_anchor() {
    let doc = "\
\\Q=\"top\"Intro text with a \\q=\"#top\"\"back to top\" link in it.\n\
And \\ienough\\i other \\bcodes\\b to trip the \\uclassifier\\u here.\n";
    let sink = reflow(doc);
    assert!(sink.events.contains(&"attr name=top".to_string()));
    assert!(sink.events.contains(&"attr href=#top".to_string()));
    assert!(sink.events.contains(&"text back to top".to_string()));
}

#[test]
fn test_inline_dialect_literal_backslash() {
    let doc = "A literal \\\\ backslash and \\ienough\\i \\bcodes\\b \\uhere\\u too.\n";
    let sink = reflow(doc);
    let text: String = sink
        .events
        .iter()
        .filter_map(|e| e.strip_prefix("text "))
        .collect::<Vec<_>>()
        .join("");
    assert!(text.contains('\\'), "{:?}", sink.events);
}

// ============================================================================
// Degenerate input
// ============================================================================

#[test]
fn test_empty_stream_fails_probe() {
    let mut parser = TextParser::new(MemorySource::new(Vec::new()), ParserConfig::default());
    let mut sink = TraceSink::default();
    assert!(!parser.parse(&mut sink, &StopToken::new()));
    assert_eq!(sink.stops, 0);
}

#[test]
fn test_single_short_line() {
    let sink = reflow("lonely\n");
    assert_eq!(sink.stops, 1);
    assert!(!sink.blocks().is_empty());
}
