//! Benchmarks for the tokenizer and reflow pipelines.
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};

use quire::{
    EventSink, MarkupParser, MemorySource, NodeHandle, ParserConfig, StopToken, TextFlags,
    TextParser,
};

/// Sink that counts events without retaining anything.
#[derive(Default)]
struct NullSink {
    events: u64,
}

impl EventSink for NullSink {
    fn tag_open(&mut self, _ns: Option<&str>, _name: &str) -> NodeHandle {
        self.events += 1;
        NodeHandle::NONE
    }
    fn tag_close(&mut self, _ns: Option<&str>, _name: &str) {
        self.events += 1;
    }
    fn attribute(&mut self, _ns: Option<&str>, _name: &str, _value: &str) {
        self.events += 1;
    }
    fn text(&mut self, _text: &str, _flags: TextFlags) {
        self.events += 1;
    }
}

/// A synthetic chapter: nested markup with attributes and entities.
fn markup_fixture() -> Vec<u8> {
    let mut doc = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><body>");
    for section in 0..40 {
        doc.push_str(&format!("<section id=\"s{}\"><title>Section {}</title>", section, section));
        for _ in 0..25 {
            doc.push_str(
                "<p class=\"ind\">It was the best of times, it was the worst of times \
                 &mdash; the age of wisdom &amp; the age of foolishness.</p>",
            );
        }
        doc.push_str("</section>");
    }
    doc.push_str("</body>");
    doc.into_bytes()
}

/// A synthetic plain-text book: blank-delimited hard-wrapped paragraphs.
fn plain_text_fixture() -> Vec<u8> {
    let mut doc = String::new();
    for chapter in 1..=20 {
        doc.push_str(&format!("Chapter {}\n\n", chapter));
        for _ in 0..30 {
            for _ in 0..6 {
                doc.push_str(
                    "It was the best of times, it was the worst of times, it was the\n",
                );
            }
            doc.push('\n');
        }
    }
    doc.into_bytes()
}

fn bench_tokenize_markup(c: &mut Criterion) {
    let doc = markup_fixture();
    c.bench_function("tokenize_markup", |b| {
        b.iter(|| {
            let mut parser = MarkupParser::new(
                MemorySource::new(doc.clone()),
                ParserConfig::default(),
            );
            let mut sink = NullSink::default();
            parser.parse(&mut sink, &StopToken::new());
            sink.events
        });
    });
}

fn bench_reflow_plain_text(c: &mut Criterion) {
    let doc = plain_text_fixture();
    c.bench_function("reflow_plain_text", |b| {
        b.iter(|| {
            let mut parser = TextParser::new(
                MemorySource::new(doc.clone()),
                ParserConfig::default(),
            );
            let mut sink = NullSink::default();
            parser.parse(&mut sink, &StopToken::new());
            sink.events
        });
    });
}

criterion_group!(benches, bench_tokenize_markup, bench_reflow_plain_text);
criterion_main!(benches);
