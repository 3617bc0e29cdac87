//! Encoding autodetection and name normalization.
//!
//! Detection runs once over a bounded stream prefix: byte-order marks first,
//! then a strict UTF-8 validity scan, then statistical signatures for the
//! legacy CJK encodings. When nothing is confident the default 8-bit codec
//! wins; a parse must start even when the input lies about itself.

use log::debug;

use super::EncodingKind;

/// Detection inspects at most this much of the stream.
pub const DETECT_PREFIX_LEN: usize = 128 * 1024;

/// Minimum number of valid multi-byte pairs before a CJK signature is
/// trusted over the 8-bit fallback.
const MIN_CJK_PAIRS: usize = 8;

/// Fraction (percent) of high-byte content that must participate in valid
/// pairs for a CJK candidate to win.
const MIN_CJK_VALID_PERCENT: usize = 90;

/// Detect the encoding of a stream from its prefix.
///
/// `utf_only` restricts the outcome to the UTF family: the legacy signatures
/// are skipped and ambiguous input resolves to UTF-8.
pub fn detect_encoding(prefix: &[u8], utf_only: bool) -> EncodingKind {
    if let Some(kind) = detect_bom(prefix) {
        return kind;
    }

    // An in-document declaration overrides the statistical probes. Only an
    // ASCII-compatible prolog can match; a BOM already had the first word.
    if let Some(kind) = extract_declared_encoding(prefix).and_then(resolve_encoding_name) {
        if !utf_only || kind.is_utf() {
            debug!("using declared encoding {}", kind.name());
            return kind;
        }
    }

    if let Some(kind) = detect_utf16_pattern(prefix) {
        return kind;
    }

    if is_valid_utf8_prefix(prefix) {
        return EncodingKind::Utf8;
    }

    if utf_only {
        debug!("utf-only detection on non-UTF input, defaulting to utf-8");
        return EncodingKind::Utf8;
    }

    if let Some(kind) = detect_cjk(prefix) {
        return kind;
    }

    // Common in old ebooks; superset of ISO-8859-1.
    debug!("no confident encoding signature, falling back to windows-1252");
    EncodingKind::EightBit(encoding_rs::WINDOWS_1252)
}

fn detect_bom(prefix: &[u8]) -> Option<EncodingKind> {
    // UTF-32 BOMs contain the UTF-16 ones as prefixes; test them first.
    if prefix.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        return Some(EncodingKind::Utf32Le);
    }
    if prefix.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return Some(EncodingKind::Utf32Be);
    }
    if prefix.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(EncodingKind::Utf8);
    }
    if prefix.starts_with(&[0xFF, 0xFE]) {
        return Some(EncodingKind::Utf16Le);
    }
    if prefix.starts_with(&[0xFE, 0xFF]) {
        return Some(EncodingKind::Utf16Be);
    }
    None
}

/// BOM-less UTF-16 shows up as ASCII text interleaved with NUL bytes.
fn detect_utf16_pattern(prefix: &[u8]) -> Option<EncodingKind> {
    if prefix.len() < 16 {
        return None;
    }
    let sample = &prefix[..prefix.len().min(1024) & !1];
    let mut even_nul = 0usize;
    let mut odd_nul = 0usize;
    for pair in sample.chunks_exact(2) {
        if pair[0] == 0 {
            even_nul += 1;
        }
        if pair[1] == 0 {
            odd_nul += 1;
        }
    }
    let pairs = sample.len() / 2;
    if odd_nul * 4 >= pairs * 3 && even_nul * 8 < pairs {
        return Some(EncodingKind::Utf16Le);
    }
    if even_nul * 4 >= pairs * 3 && odd_nul * 8 < pairs {
        return Some(EncodingKind::Utf16Be);
    }
    None
}

/// Strict UTF-8 validity over the prefix, tolerating one truncated sequence
/// at the very end (the prefix may cut a code point in half).
fn is_valid_utf8_prefix(prefix: &[u8]) -> bool {
    match std::str::from_utf8(prefix) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none() && prefix.len() - err.valid_up_to() < 4,
    }
}

/// Candidate scoring for the legacy multi-byte CJK encodings.
///
/// Each candidate counts high-byte sequences that form valid lead/trail
/// pairs versus violations. The winner needs near-total validity and a
/// minimum amount of evidence; ties resolve in list order.
fn detect_cjk(prefix: &[u8]) -> Option<EncodingKind> {
    let candidates = [
        EncodingKind::ShiftJis,
        EncodingKind::Gbk,
        EncodingKind::EucJp,
        EncodingKind::EucKr,
        EncodingKind::Big5,
    ];

    let mut best: Option<(EncodingKind, usize)> = None;
    for kind in candidates {
        let (pairs, violations) = score_cjk(prefix, kind);
        if pairs < MIN_CJK_PAIRS {
            continue;
        }
        let total = pairs + violations;
        if pairs * 100 < total * MIN_CJK_VALID_PERCENT {
            continue;
        }
        if best.map(|(_, score)| pairs > score).unwrap_or(true) {
            best = Some((kind, pairs));
        }
    }
    if let Some((kind, pairs)) = best {
        debug!("detected {} from {} valid pairs", kind.name(), pairs);
    }
    best.map(|(kind, _)| kind)
}

fn score_cjk(prefix: &[u8], kind: EncodingKind) -> (usize, usize) {
    let mut pairs = 0usize;
    let mut violations = 0usize;
    let mut i = 0;
    while i < prefix.len() {
        let b = prefix[i];
        if b < 0x80 {
            i += 1;
            continue;
        }
        let trail = prefix.get(i + 1).copied();
        let valid = match kind {
            EncodingKind::ShiftJis => match b {
                // Half-width katakana is a valid single byte, but counts as
                // neither evidence nor violation: the range collides with
                // every EUC lead and kana-only runs would drown out real
                // double-byte pairs.
                0xA1..=0xDF => {
                    i += 1;
                    continue;
                }
                0x81..=0x9F | 0xE0..=0xEF => {
                    matches!(trail, Some(0x40..=0x7E | 0x80..=0xFC))
                }
                _ => false,
            },
            EncodingKind::Gbk => {
                matches!(b, 0x81..=0xFE) && matches!(trail, Some(0x40..=0x7E | 0x80..=0xFE))
            }
            EncodingKind::EucJp => match b {
                0x8E => matches!(trail, Some(0xA1..=0xDF)),
                0xA1..=0xFE => matches!(trail, Some(0xA1..=0xFE)),
                _ => false,
            },
            EncodingKind::EucKr => {
                matches!(b, 0xA1..=0xFE) && matches!(trail, Some(0xA1..=0xFE))
            }
            EncodingKind::Big5 => {
                matches!(b, 0xA1..=0xF9) && matches!(trail, Some(0x40..=0x7E | 0xA1..=0xFE))
            }
            _ => false,
        };
        if valid {
            pairs += 1;
            i += 2;
        } else {
            violations += 1;
            i += 1;
        }
    }
    (pairs, violations)
}

/// Extract a declared encoding name from a prolog-like declaration.
///
/// Scans the first bytes for `encoding="..."` (or `'...'`), case-insensitive.
/// Only ASCII-compatible byte streams can match; a UTF-16 prolog falls back
/// to BOM detection, which already decided correctly.
pub fn extract_declared_encoding(bytes: &[u8]) -> Option<&str> {
    let prefix = &bytes[..bytes.len().min(256)];
    let pos = prefix
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after = &prefix[pos + 9..];
    let quote = *after.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let end = after[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after[1..end]).ok()
}

/// Normalize a declared encoding name to one [`EncodingKind`].
///
/// Handles the aliases that show up in real documents (case-insensitive,
/// `_`/`-` interchangeable), then falls back to the `encoding_rs` label
/// registry for anything else. Returns `None` for names that resolve to
/// nothing usable.
pub fn resolve_encoding_name(name: &str) -> Option<EncodingKind> {
    let mut normalized = name.trim().to_ascii_lowercase();
    normalized = normalized.replace('_', "-");

    let kind = match normalized.as_str() {
        "utf-8" | "utf8" => EncodingKind::Utf8,
        // Endianness-less declarations resolve little-endian; a BOM has
        // already had its chance to say otherwise.
        "utf-16" | "utf16" | "utf-16le" | "ucs-2" | "unicode" => EncodingKind::Utf16Le,
        "utf-16be" => EncodingKind::Utf16Be,
        "utf-32" | "utf32" | "utf-32le" | "ucs-4" => EncodingKind::Utf32Le,
        "utf-32be" => EncodingKind::Utf32Be,
        "gbk" | "gb2312" | "gb18030" | "cp936" | "ms936" | "windows-936" | "euc-cn" => {
            EncodingKind::Gbk
        }
        "shift-jis" | "shiftjis" | "sjis" | "x-sjis" | "cp932" | "ms932" | "windows-31j" => {
            EncodingKind::ShiftJis
        }
        "euc-jp" | "eucjp" | "x-euc-jp" => EncodingKind::EucJp,
        "big5" | "big-5" | "cp950" | "big5-hkscs" => EncodingKind::Big5,
        "euc-kr" | "euckr" | "cp949" | "uhc" | "windows-949" | "ks-c-5601-1987" => {
            EncodingKind::EucKr
        }
        "latin-1" | "latin1" | "iso-8859-1" | "l1" => {
            EncodingKind::EightBit(encoding_rs::WINDOWS_1252)
        }
        _ => {
            let enc = encoding_rs::Encoding::for_label(normalized.as_bytes())?;
            return from_encoding(enc);
        }
    };
    Some(kind)
}

/// Map an `encoding_rs` encoding back into the closed kind set.
fn from_encoding(enc: &'static encoding_rs::Encoding) -> Option<EncodingKind> {
    if enc == encoding_rs::UTF_8 {
        Some(EncodingKind::Utf8)
    } else if enc == encoding_rs::UTF_16LE {
        Some(EncodingKind::Utf16Le)
    } else if enc == encoding_rs::UTF_16BE {
        Some(EncodingKind::Utf16Be)
    } else if enc == encoding_rs::GBK || enc == encoding_rs::GB18030 {
        Some(EncodingKind::Gbk)
    } else if enc == encoding_rs::SHIFT_JIS {
        Some(EncodingKind::ShiftJis)
    } else if enc == encoding_rs::EUC_JP {
        Some(EncodingKind::EucJp)
    } else if enc == encoding_rs::BIG5 {
        Some(EncodingKind::Big5)
    } else if enc == encoding_rs::EUC_KR {
        Some(EncodingKind::EucKr)
    } else if enc.is_single_byte() {
        Some(EncodingKind::EightBit(enc))
    } else {
        // ISO-2022-JP and friends: stateful encodings the codec layer does
        // not carry.
        None
    }
}
