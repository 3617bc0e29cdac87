//! The classification pass: decide how a plain-text document is formatted.
//!
//! A sample window of lines feeds column statistics (leftmost/rightmost
//! non-space positions, histograms, blank-line ratio) from which one format
//! mode is chosen. The thresholds are empirically tuned against real ebook
//! corpora; behavior parity matters more than tidiness, so they are kept
//! as-is.

use log::debug;

use crate::codec::{LineAlignment, TextLine};

/// Lines inspected by the classification pass.
pub const SAMPLE_LINES: usize = 2000;

/// Below this many content lines there is no statistical signal to act on.
pub const MIN_SAMPLE_FOR_STATS: usize = 3;

/// Indent-delimited prose: the fraction of indented lines has to sit in
/// this band. Below it, indents are noise; above it, the "indents" are the
/// document's left margin.
pub const IDENT_LINES_MIN_PERCENT: usize = 5;
pub const IDENT_LINES_MAX_PERCENT: usize = 55;

/// Blank-line-delimited paragraphs need at least this many blank lines.
pub const EMPTY_LINES_MIN_PERCENT: usize = 10;

/// Hard-wrapped (justified) prose: at least this fraction of content lines
/// must end at the right edge.
pub const RIGHT_EDGE_MIN_PERCENT: usize = 50;

/// How close to the maximum right column a line end counts as "at the
/// edge".
pub const RIGHT_EDGE_TOLERANCE: u16 = 2;

/// Minimum count of backslash control codes before the inline-markup
/// dialect interpreter takes over.
pub const MIN_INLINE_CODES: usize = 4;

/// A line starting at most this far right of the modal left column is a
/// paragraph-indent, not a right-aligned block.
pub const MAX_INDENT_COLUMNS: u16 = 8;

/// Column histograms track positions up to this width.
const HIST_COLUMNS: usize = 256;

/// The format mode the assembly pass runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Every line is its own block; blank lines become explicit markers.
    Preformatted,
    /// One paragraph per line; used when no statistical signal exists.
    ParagraphPerLine,
    /// A paragraph starts at each indented first line.
    IndentDelimited,
    /// Paragraphs are separated by blank lines.
    BlankLineDelimited,
    /// Hard-wrapped prose with centered/right classification enabled.
    Formatted,
    /// Backslash-letter control codes; a dedicated interpreter runs.
    InlineMarkup,
}

/// Aggregated column statistics over the sample window.
#[derive(Debug, Clone)]
pub struct LineStats {
    pub lines: usize,
    pub empty_lines: usize,
    pub content_lines: usize,
    pub min_left: u16,
    pub max_right: u16,
    pub avg_left: f32,
    pub avg_right: f32,
    pub avg_center: f32,
    pub modal_left: u16,
    left_hist: Vec<u32>,
    right_hist: Vec<u32>,
    left_sum: u64,
    right_sum: u64,
    pub indent_lines: usize,
    pub right_edge_lines: usize,
    pub backslash_codes: usize,
    pub stray_backslashes: usize,
}

impl Default for LineStats {
    fn default() -> Self {
        Self {
            lines: 0,
            empty_lines: 0,
            content_lines: 0,
            min_left: u16::MAX,
            max_right: 0,
            avg_left: 0.0,
            avg_right: 0.0,
            avg_center: 0.0,
            modal_left: 0,
            left_hist: vec![0; HIST_COLUMNS],
            right_hist: vec![0; HIST_COLUMNS],
            left_sum: 0,
            right_sum: 0,
            indent_lines: 0,
            right_edge_lines: 0,
            backslash_codes: 0,
            stray_backslashes: 0,
        }
    }
}

impl LineStats {
    /// Feed one sample line.
    pub fn observe(&mut self, line: &TextLine) {
        self.lines += 1;
        if line.is_empty() || line.is_rule() {
            if line.is_empty() {
                self.empty_lines += 1;
            }
            return;
        }
        self.content_lines += 1;
        self.min_left = self.min_left.min(line.left);
        self.max_right = self.max_right.max(line.right);
        self.left_sum += line.left as u64;
        self.right_sum += line.right as u64;
        self.left_hist[(line.left as usize).min(HIST_COLUMNS - 1)] += 1;
        self.right_hist[(line.right as usize).min(HIST_COLUMNS - 1)] += 1;
        self.observe_backslashes(&line.text);
    }

    fn observe_backslashes(&mut self, text: &str) {
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\\' {
                continue;
            }
            match chars.peek() {
                Some(&next) if next.is_ascii_alphabetic() || next == '\\' => {
                    chars.next();
                    self.backslash_codes += 1;
                }
                _ => self.stray_backslashes += 1,
            }
        }
    }

    /// Derive the aggregates once the sample window is complete.
    pub fn finish(&mut self) {
        if self.content_lines == 0 {
            self.min_left = 0;
            return;
        }
        let n = self.content_lines as f32;
        self.avg_left = self.left_sum as f32 / n;
        self.avg_right = self.right_sum as f32 / n;
        self.avg_center = (self.avg_left + self.avg_right) / 2.0;

        self.modal_left = self
            .left_hist
            .iter()
            .enumerate()
            .max_by_key(|&(_, &count)| count)
            .map(|(col, _)| col as u16)
            .unwrap_or(0);

        self.indent_lines = self
            .left_hist
            .iter()
            .enumerate()
            .filter(|(col, _)| *col > self.modal_left as usize)
            .map(|(_, &count)| count as usize)
            .sum();

        let edge_from = self.max_right.saturating_sub(RIGHT_EDGE_TOLERANCE) as usize;
        self.right_edge_lines = self
            .right_hist
            .iter()
            .enumerate()
            .filter(|(col, _)| *col >= edge_from)
            .map(|(_, &count)| count as usize)
            .sum();
    }
}

/// Pick the format mode from the finished statistics.
pub fn classify(stats: &LineStats) -> FormatMode {
    let mode = decide(stats);
    debug!(
        "reflow mode {:?}: {} lines ({} content, {} empty), modal left {}, max right {}",
        mode, stats.lines, stats.content_lines, stats.empty_lines, stats.modal_left,
        stats.max_right
    );
    mode
}

fn decide(stats: &LineStats) -> FormatMode {
    if stats.backslash_codes >= MIN_INLINE_CODES && stats.stray_backslashes == 0 {
        return FormatMode::InlineMarkup;
    }
    if stats.content_lines < MIN_SAMPLE_FOR_STATS {
        return FormatMode::ParagraphPerLine;
    }

    let indent_percent = stats.indent_lines * 100 / stats.content_lines;
    let empty_percent = stats.empty_lines * 100 / stats.lines.max(1);
    let edge_percent = stats.right_edge_lines * 100 / stats.content_lines;

    if (IDENT_LINES_MIN_PERCENT..=IDENT_LINES_MAX_PERCENT).contains(&indent_percent) {
        return FormatMode::IndentDelimited;
    }
    if empty_percent >= EMPTY_LINES_MIN_PERCENT {
        return FormatMode::BlankLineDelimited;
    }
    if edge_percent >= RIGHT_EDGE_MIN_PERCENT {
        return FormatMode::Formatted;
    }
    FormatMode::Preformatted
}

/// Assign an alignment to one line, given the finished statistics.
///
/// Only meaningful in [`FormatMode::Formatted`]; centered and right-aligned
/// classification compares the line's center and right offsets against the
/// aggregates, tie-broken in favor of right-aligned when the right-distance
/// is strictly smaller.
pub fn classify_alignment(line: &TextLine, stats: &LineStats) -> LineAlignment {
    if line.is_empty() {
        return LineAlignment::Empty;
    }
    let at_edge = line.right + RIGHT_EDGE_TOLERANCE >= stats.max_right;
    if line.left <= stats.modal_left {
        if at_edge {
            return LineAlignment::Justified;
        }
        return LineAlignment::Left;
    }
    if at_edge {
        if line.left - stats.modal_left <= MAX_INDENT_COLUMNS {
            // Indented start of a paragraph that still runs to the edge.
            return LineAlignment::Indent;
        }
        return LineAlignment::Right;
    }

    let line_center = (line.left + line.right) as f32 / 2.0;
    let center_dist = (line_center - stats.avg_center).abs();
    let right_dist = (stats.max_right as f32 - line.right as f32).abs();
    if right_dist < center_dist {
        LineAlignment::Right
    } else {
        LineAlignment::Center
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn line(text: &str) -> TextLine {
        let mut l = TextLine {
            text: text.to_string(),
            ..TextLine::default()
        };
        let mut left = None;
        let mut right = 0;
        for (col, c) in l.text.chars().enumerate() {
            if c != ' ' {
                left.get_or_insert(col as u16);
                right = col as u16;
            }
        }
        l.left = left.unwrap_or(0);
        l.right = right;
        if left.is_none() {
            l.align = LineAlignment::Empty;
        }
        l
    }

    fn stats_of(lines: &[TextLine]) -> LineStats {
        let mut stats = LineStats::default();
        for l in lines {
            stats.observe(l);
        }
        stats.finish();
        stats
    }

    #[test]
    fn test_justified_prose_selects_formatted() {
        // Five lines of roughly equal length ending near the same column.
        let lines: Vec<TextLine> = [
            "The quick brown fox jumps over the lazy dog again and again, at length",
            "and the evening settled slowly over the quiet harbour town while all of",
            "the fishermen hauled their nets ashore and counted the day's catch in",
            "the fading light, speaking softly of the weather and of the long winter",
            "that was surely coming to the coast before the month was out, they said",
        ]
        .iter()
        .map(|t| line(t))
        .collect();
        let stats = stats_of(&lines);
        assert_eq!(classify(&stats), FormatMode::Formatted);
    }

    #[test]
    fn test_indented_prose_selects_indent_delimited() {
        let mut lines = Vec::new();
        for i in 0..20 {
            if i % 5 == 0 {
                lines.push(line("    An indented first line of a paragraph here"));
            } else {
                lines.push(line("a continuation line of the same paragraph going on"));
            }
        }
        let stats = stats_of(&lines);
        assert_eq!(classify(&stats), FormatMode::IndentDelimited);
    }

    #[test]
    fn test_blank_separated_selects_blank_line_delimited() {
        let mut lines = Vec::new();
        for _ in 0..10 {
            lines.push(line("a paragraph that sits on a single line without wrap"));
            lines.push(line(""));
        }
        let stats = stats_of(&lines);
        assert_eq!(classify(&stats), FormatMode::BlankLineDelimited);
    }

    #[test]
    fn test_tiny_input_selects_paragraph_per_line() {
        let lines = vec![line("only"), line("two")];
        let stats = stats_of(&lines);
        assert_eq!(classify(&stats), FormatMode::ParagraphPerLine);
    }

    #[test]
    fn test_backslash_codes_select_inline_markup() {
        let lines = vec![
            line("\\c\\xChapter One\\x\\c"),
            line("Some \\iitalic\\i prose here."),
            line("More ordinary prose on this line to fill the sample."),
            line("And a third content line for the statistics to chew on."),
        ];
        let stats = stats_of(&lines);
        assert_eq!(classify(&stats), FormatMode::InlineMarkup);
    }

    #[test]
    fn test_stray_backslashes_block_inline_markup() {
        let lines = vec![
            line("C:\\ is a path \\ not markup"),
            line("\\i\\b\\u\\x codes but strays above"),
            line("plain line one for the sample window"),
            line("plain line two for the sample window"),
        ];
        let stats = stats_of(&lines);
        assert_ne!(classify(&stats), FormatMode::InlineMarkup);
    }

    #[test]
    fn test_alignment_classification() {
        let mut lines: Vec<TextLine> = (0..10)
            .map(|_| line("a long justified line of prose that reaches out to the edge"))
            .collect();
        lines.push(line("                          centered                          "));
        let stats = stats_of(&lines);

        let centered = line("                         a centered line");
        assert_eq!(classify_alignment(&centered, &stats), LineAlignment::Center);

        let right = line("                                          right-aligned line");
        assert_eq!(classify_alignment(&right, &stats), LineAlignment::Right);

        let justified =
            line("a long justified line of prose that reaches out to the edge");
        assert_eq!(
            classify_alignment(&justified, &stats),
            LineAlignment::Justified
        );
    }
}
