//! High-byte conversion tables for 8-bit codepages.
//!
//! Each supported single-byte encoding maps bytes 0x80..=0xFF to one BMP code
//! point. The table is materialized once per parse session and handed to the
//! sink through `EventSink::encoding`, so tree builders that re-encode text
//! (search indexing, hyphenation dictionaries) can work from the same data.

/// Build the 128-entry high-byte table for a single-byte encoding.
///
/// Bytes the codepage leaves unmapped decode to `'?'`, matching the decoder's
/// policy for undecodable input.
pub fn high_byte_table(enc: &'static encoding_rs::Encoding) -> Box<[u16; 128]> {
    let mut table = Box::new([0u16; 128]);
    for (i, slot) in table.iter_mut().enumerate() {
        let src = [0x80 + i as u8];
        let mut dst = [0u16; 2];
        let mut decoder = enc.new_decoder_without_bom_handling();
        let (_, _, written, _) = decoder.decode_to_utf16(&src, &mut dst, true);
        *slot = match dst[..written] {
            [unit] if unit != 0xFFFD => unit,
            _ => b'?' as u16,
        };
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_1252_table() {
        let table = high_byte_table(encoding_rs::WINDOWS_1252);
        assert_eq!(table[0xE9 - 0x80], 0x00E9); // é
        assert_eq!(table[0x80 - 0x80], 0x20AC); // euro sign
        assert_eq!(table[0x85 - 0x80], 0x2026); // ellipsis
        // 0x81 has no glyph in cp1252 and passes through as a C1 control.
        assert_eq!(table[0x81 - 0x80], 0x0081);
    }

    #[test]
    fn test_koi8_r_table() {
        let table = high_byte_table(encoding_rs::KOI8_R);
        assert_eq!(table[0xC1 - 0x80], 0x0430); // а
        assert_eq!(table[0xD2 - 0x80], 0x0440); // р
    }

    #[test]
    fn test_latin_2_table() {
        let table = high_byte_table(encoding_rs::ISO_8859_2);
        assert_eq!(table[0xB1 - 0x80], 0x0105); // ą
    }
}
