//! ToUnicode CMap parsing and lookup
//!
//! Parses the `bfchar`/`bfrange`/`codespacerange` sections of a ToUnicode
//! CMap (ISO 32000-1 Section 9.10.3) from a token stream and turns them into a
//! code to text table.

use crate::parser::cursor::{unexpected, TokenCursor};
use crate::parser::lexer::TokenKind;
use crate::parser::objects::{decode_utf16be, PdfObject};
use crate::parser::{ParseError, ParseResult};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Upper bound on the number of codes a single bfrange may expand to
const MAX_RANGE_CODES: u32 = 0x10000;

/// `<low> <high>` from a codespacerange section
#[derive(Debug, Clone, PartialEq)]
pub struct CodespaceRange {
    pub low: String,
    pub high: String,
}

/// Destination of a bfrange entry
#[derive(Debug, Clone, PartialEq)]
pub enum BfRangeDest {
    /// One UTF-16BE value, incremented for each code of the range
    Single(Vec<u8>),
    /// One UTF-16BE value per code
    List(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BfRange {
    pub low: String,
    pub high: String,
    pub dest: BfRangeDest,
}

/// Sections of a ToUnicode CMap as they appear in the stream.
/// Codes are upper-case hex digits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicodeSource {
    /// `/Key value def` entries such as `CMapName` and `CIDSystemInfo`
    pub header: BTreeMap<String, PdfObject>,
    pub codespace: Vec<CodespaceRange>,
    pub bf_chars: Vec<(String, Vec<u8>)>,
    pub bf_ranges: Vec<BfRange>,
}

/// Parse a ToUnicode CMap program.
///
/// PostScript operators outside the mapping sections are skipped.
pub fn parse_to_unicode(cursor: &mut TokenCursor) -> ParseResult<ToUnicodeSource> {
    let mut source = ToUnicodeSource::default();

    while let Some(token) = cursor.next().cloned() {
        if let Some(key) = token.name() {
            if starts_value(cursor) {
                let mark = cursor.mark();
                match PdfObject::parse(cursor) {
                    Ok(value) => {
                        if cursor.eat_keyword("def") {
                            source.header.insert(key.to_string(), value);
                        }
                    }
                    // PostScript the object grammar does not cover
                    Err(_) => cursor.rewind(mark),
                }
            }
            continue;
        }

        if token.is_keyword("begincodespacerange") {
            while !cursor.eat_keyword("endcodespacerange") {
                let low = hex_operand(cursor, "codespace range start")?;
                let high = hex_operand(cursor, "codespace range end")?;
                source.codespace.push(CodespaceRange { low, high });
            }
        } else if token.is_keyword("beginbfchar") {
            while !cursor.eat_keyword("endbfchar") {
                let code = hex_operand(cursor, "bfchar source code")?;
                let dest = string_operand(cursor, "bfchar destination")?;
                source.bf_chars.push((code, dest));
            }
        } else if token.is_keyword("beginbfrange") {
            while !cursor.eat_keyword("endbfrange") {
                let low = hex_operand(cursor, "bfrange start")?;
                let high = hex_operand(cursor, "bfrange end")?;
                let dest = if cursor.peek().is_some_and(|t| t.is_delim("[")) {
                    BfRangeDest::List(dest_list(cursor)?)
                } else {
                    BfRangeDest::Single(string_operand(cursor, "bfrange destination")?)
                };
                source.bf_ranges.push(BfRange { low, high, dest });
            }
        }
    }

    Ok(source)
}

/// Whether the next token can begin a value
fn starts_value(cursor: &TokenCursor) -> bool {
    cursor.peek().is_some_and(|t| match t.kind {
        TokenKind::Number | TokenKind::Name | TokenKind::LiteralString => true,
        TokenKind::HexDelim | TokenKind::ArrayDelim | TokenKind::DictDelim => {
            t.is_delim("<") || t.is_delim("[") || t.is_delim("<<")
        }
        TokenKind::Keyword => t.is_keyword("true") || t.is_keyword("false") || t.is_keyword("null"),
        _ => false,
    })
}

fn hex_operand(cursor: &mut TokenCursor, expected: &str) -> ParseResult<String> {
    match cursor.peek() {
        Some(t) if t.is_delim("<") => match PdfObject::parse(cursor)? {
            PdfObject::HexString(digits) => Ok(digits.to_ascii_uppercase()),
            other => Err(ParseError::InvalidStructure(format!(
                "{expected}: expected hex string, found {other}"
            ))),
        },
        Some(t) => Err(unexpected(expected, t)),
        None => Err(cursor.eof(expected)),
    }
}

fn string_operand(cursor: &mut TokenCursor, expected: &str) -> ParseResult<Vec<u8>> {
    match cursor.peek() {
        Some(t) if t.is_delim("<") || t.kind == TokenKind::LiteralString => {
            let value = PdfObject::parse(cursor)?;
            value.string_bytes().ok_or_else(|| {
                ParseError::InvalidStructure(format!("{expected}: bad string {value}"))
            })
        }
        Some(t) => Err(unexpected(expected, t)),
        None => Err(cursor.eof(expected)),
    }
}

fn dest_list(cursor: &mut TokenCursor) -> ParseResult<Vec<Vec<u8>>> {
    let PdfObject::Array(array) = PdfObject::parse(cursor)? else {
        return Err(ParseError::InvalidStructure(
            "bfrange destination list is not an array".to_string(),
        ));
    };
    array
        .iter()
        .map(|item| {
            item.string_bytes().ok_or_else(|| {
                ParseError::InvalidStructure(format!("bfrange destination {item} is not a string"))
            })
        })
        .collect()
}

/// A codespace range as bytes; a code matches when every byte lies
/// between the bytes of `low` and `high` at the same position
#[derive(Debug, Clone, PartialEq, Eq)]
struct ByteRange {
    low: Vec<u8>,
    high: Vec<u8>,
}

impl ByteRange {
    fn from_hex(range: &CodespaceRange) -> Option<Self> {
        let low = hex::decode(&range.low).ok()?;
        let high = hex::decode(&range.high).ok()?;
        (!low.is_empty() && low.len() == high.len()).then_some(Self { low, high })
    }

    fn width(&self) -> usize {
        self.low.len()
    }

    fn contains(&self, code: &[u8]) -> bool {
        code.len() == self.width()
            && code
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(b, (lo, hi))| (*lo..=*hi).contains(b))
    }
}

/// Code to text table built from a ToUnicode CMap
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ToUnicodeCMap {
    /// `CMapName` from the header, if any
    pub name: Option<String>,
    /// Bytes per character code when no codespace range matches
    pub code_width: usize,
    /// Upper-case hex code to text
    pub map: HashMap<String, String>,
    /// Narrowest first
    #[cfg_attr(feature = "serde", serde(skip))]
    codespace: Vec<ByteRange>,
}

impl ToUnicodeCMap {
    /// Tokenize and parse a ToUnicode stream payload
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        let mut cursor = TokenCursor::from_bytes(data, crate::parser::LexMode::Bytes);
        Ok(Self::from_source(&parse_to_unicode(&mut cursor)?))
    }

    /// Expand all bfchar and bfrange entries. Single codes come first and a
    /// code keeps the first text assigned to it.
    pub fn from_source(source: &ToUnicodeSource) -> Self {
        let code_width = source
            .codespace
            .first()
            .map(|range| range.low.len())
            .or_else(|| source.bf_chars.first().map(|(code, _)| code.len()))
            .or_else(|| source.bf_ranges.first().map(|range| range.low.len()))
            .map(|digits| digits.div_ceil(2).max(1))
            .unwrap_or(1);

        let mut codespace: Vec<ByteRange> = source
            .codespace
            .iter()
            .filter_map(|range| {
                let parsed = ByteRange::from_hex(range);
                if parsed.is_none() {
                    warn!(low = %range.low, high = %range.high, "skipping bad codespace range");
                }
                parsed
            })
            .collect();
        codespace.sort_by_key(ByteRange::width);

        let mut cmap = ToUnicodeCMap {
            name: source
                .header
                .get("CMapName")
                .and_then(|n| n.as_name())
                .map(|n| n.as_str().to_string()),
            code_width,
            map: HashMap::new(),
            codespace,
        };

        for (code, dest) in &source.bf_chars {
            let Ok(value) = u32::from_str_radix(code, 16) else {
                warn!(%code, "skipping bfchar with bad code");
                continue;
            };
            let key = cmap.key(value, code.len());
            cmap.map.entry(key).or_insert_with(|| utf16_text(dest));
        }

        for range in &source.bf_ranges {
            let (Ok(low), Ok(high)) = (
                u32::from_str_radix(&range.low, 16),
                u32::from_str_radix(&range.high, 16),
            ) else {
                warn!(low = %range.low, high = %range.high, "skipping bfrange with bad bounds");
                continue;
            };
            if high < low {
                warn!(low, high, "skipping inverted bfrange");
                continue;
            }
            let count = (high - low + 1).min(MAX_RANGE_CODES);
            if count < high - low + 1 {
                warn!(low, high, "bfrange truncated to {MAX_RANGE_CODES} codes");
            }

            for k in 0..count {
                let text = match &range.dest {
                    BfRangeDest::Single(start) => utf16_text(&add_big_endian(start, k)),
                    BfRangeDest::List(values) => match values.get(k as usize) {
                        Some(value) => utf16_text(value),
                        None => break,
                    },
                };
                let key = cmap.key(low + k, range.low.len());
                cmap.map.entry(key).or_insert(text);
            }
        }

        cmap
    }

    /// Hex key for a numeric source code, written at the width of the
    /// codespace range holding it. Without one, the narrowest range wide
    /// enough for the value decides, then the digits as written.
    fn key(&self, value: u32, digits: usize) -> String {
        let bytes = value.to_be_bytes();
        let fits = |width: usize| width >= 4 || value >> (8 * width) == 0;
        let width = self
            .codespace
            .iter()
            .find(|range| {
                range.width() <= 4
                    && fits(range.width())
                    && range.contains(&bytes[4 - range.width()..])
            })
            .or_else(|| self.codespace.iter().find(|range| fits(range.width())))
            .map(ByteRange::width)
            .unwrap_or_else(|| digits.div_ceil(2).max(1));
        format!("{value:0width$X}", width = width * 2)
    }

    /// Length of the code starting at `bytes[0]`: the narrowest codespace
    /// range matching the leading bytes, else `code_width`
    fn code_len(&self, bytes: &[u8]) -> usize {
        self.codespace
            .iter()
            .find(|range| bytes.len() >= range.width() && range.contains(&bytes[..range.width()]))
            .map_or(self.code_width.max(1), ByteRange::width)
            .min(bytes.len())
    }

    /// Text for one code
    pub fn lookup(&self, code: &[u8]) -> Option<&str> {
        self.map.get(&hex::encode_upper(code)).map(String::as_str)
    }

    /// Decode shown bytes code by code; unmapped codes fall back to their
    /// bytes as characters, with NUL bytes dropped.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let mut text = String::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let (code, tail) = rest.split_at(self.code_len(rest));
            match self.lookup(code) {
                Some(mapped) => text.push_str(mapped),
                None => text.extend(code.iter().filter(|&&b| b != 0).map(|&b| char::from(b))),
            }
            rest = tail;
        }
        text
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Destination bytes as text: UTF-16BE, or a single Latin-1 byte
fn utf16_text(bytes: &[u8]) -> String {
    match bytes {
        [b] => char::from(*b).to_string(),
        _ => decode_utf16be(bytes),
    }
}

/// Add `k` to a big-endian number, wrapping within its width
fn add_big_endian(bytes: &[u8], k: u32) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let mut carry = u64::from(k);
    for byte in out.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = u64::from(*byte) + (carry & 0xFF);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LexMode;

    const SAMPLE: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0011> <002E>
endbfchar
2 beginbfrange
<0024> <0026> <0041>
<0044> <0046> [<0061> <0062> <0063>]
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end";

    fn source(data: &[u8]) -> ToUnicodeSource {
        parse_to_unicode(&mut TokenCursor::from_bytes(data, LexMode::Bytes)).unwrap()
    }

    #[test]
    fn test_parse_sections() {
        let src = source(SAMPLE);
        assert_eq!(
            src.codespace,
            vec![CodespaceRange {
                low: "0000".to_string(),
                high: "FFFF".to_string()
            }]
        );
        assert_eq!(src.bf_chars.len(), 2);
        assert_eq!(src.bf_chars[1], ("0011".to_string(), vec![0x00, 0x2E]));
        assert_eq!(src.bf_ranges.len(), 2);
        assert_eq!(src.bf_ranges[0].dest, BfRangeDest::Single(vec![0x00, 0x41]));
        assert!(matches!(&src.bf_ranges[1].dest, BfRangeDest::List(v) if v.len() == 3));
    }

    #[test]
    fn test_header_entries() {
        let src = source(SAMPLE);
        assert_eq!(
            src.header.get("CMapName").and_then(|n| n.as_name()).map(|n| n.as_str()),
            Some("Adobe-Identity-UCS")
        );
        assert_eq!(src.header.get("CMapType"), Some(&PdfObject::Integer(2)));
        assert!(src.header.get("CIDSystemInfo").unwrap().as_dict().is_some());
        // `/ProcSet findresource` is not a definition
        assert!(!src.header.contains_key("CIDInit"));
    }

    #[test]
    fn test_cmap_lookup() {
        let cmap = ToUnicodeCMap::parse(SAMPLE).unwrap();
        assert_eq!(cmap.name.as_deref(), Some("Adobe-Identity-UCS"));
        assert_eq!(cmap.code_width, 2);
        assert_eq!(cmap.lookup(&[0x00, 0x03]), Some(" "));
        assert_eq!(cmap.lookup(&[0x00, 0x25]), Some("B"));
        assert_eq!(cmap.decode(&[0x00, 0x24, 0x00, 0x25, 0x00, 0x26, 0x00, 0x11]), "ABC.");
    }

    #[test]
    fn test_range_with_destination_list() {
        let cmap = ToUnicodeCMap::parse(SAMPLE).unwrap();
        for (k, expected) in ["a", "b", "c"].iter().enumerate() {
            assert_eq!(cmap.lookup(&[0x00, 0x44 + k as u8]), Some(*expected));
        }
    }

    #[test]
    fn test_first_write_wins() {
        let data = b"1 begincodespacerange <00> <FF> endcodespacerange
1 beginbfchar <41> <0058> endbfchar
2 beginbfrange <40> <42> <0061> <41> <41> <005A> endbfrange";
        let cmap = ToUnicodeCMap::parse(data).unwrap();
        assert_eq!(cmap.lookup(b"@"), Some("a"));
        // set by bfchar first; neither range overwrites it
        assert_eq!(cmap.lookup(b"A"), Some("X"));
        assert_eq!(cmap.lookup(b"B"), Some("c"));
    }

    #[test]
    fn test_unmapped_codes_fall_back_to_bytes() {
        let cmap = ToUnicodeCMap::parse(SAMPLE).unwrap();
        assert_eq!(cmap.decode(&[0x00, 0x24, 0x00, 0x5A]), "AZ");
        // a trailing odd byte is decoded on its own
        assert_eq!(cmap.decode(&[0x00, 0x24, 0x21]), "A!");
    }

    #[test]
    fn test_surrogate_pair_destination() {
        let data = b"1 beginbfchar <01> <D83DDE00> endbfchar";
        let cmap = ToUnicodeCMap::parse(data).unwrap();
        assert_eq!(cmap.code_width, 1);
        assert_eq!(cmap.lookup(&[0x01]), Some("\u{1F600}"));
    }

    #[test]
    fn test_mixed_width_codespace() {
        let data = b"2 begincodespacerange <00> <80> <8140> <9FFC> endcodespacerange
1 beginbfchar <8140> <3000> endbfchar
1 beginbfrange <41> <42> <0061> endbfrange";
        let cmap = ToUnicodeCMap::parse(data).unwrap();
        assert_eq!(cmap.code_width, 1);
        assert_eq!(cmap.lookup(&[0x81, 0x40]), Some("\u{3000}"));
        assert_eq!(cmap.decode(&[0x41, 0x81, 0x40, 0x42]), "a\u{3000}b");
        // 0xA0 opens no range; it is taken as a one-byte code
        assert_eq!(cmap.decode(&[0xA0, 0x41]), "\u{a0}a");
    }

    #[test]
    fn test_wide_bfchar_code_is_keyed_at_codespace_width() {
        let data = b"1 begincodespacerange <00> <FF> endcodespacerange
1 beginbfchar <0041> <0058> endbfchar
1 beginbfrange <0042> <0043> <0061> endbfrange";
        let cmap = ToUnicodeCMap::parse(data).unwrap();
        let mut keys: Vec<&str> = cmap.map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["41", "42", "43"]);
        assert_eq!(cmap.decode(b"ABC"), "Xab");
    }

    #[test]
    fn test_narrow_bfchar_code_is_padded() {
        let data = b"1 begincodespacerange <0000> <FFFF> endcodespacerange
1 beginbfchar <41> <0058> endbfchar";
        let cmap = ToUnicodeCMap::parse(data).unwrap();
        assert_eq!(cmap.lookup(&[0x00, 0x41]), Some("X"));
    }

    #[test]
    fn test_range_increment_carries() {
        assert_eq!(add_big_endian(&[0x00, 0xFF], 1), vec![0x01, 0x00]);
        assert_eq!(add_big_endian(&[0xFF, 0xFF], 1), vec![0x00, 0x00]);
        assert_eq!(add_big_endian(&[0x00, 0x41], 0), vec![0x00, 0x41]);
    }

    #[test]
    fn test_malformed_sections_are_errors() {
        let mut cursor =
            TokenCursor::from_bytes(b"1 beginbfchar <01> endbfchar", LexMode::Bytes);
        assert!(matches!(
            parse_to_unicode(&mut cursor),
            Err(ParseError::UnexpectedToken { .. })
        ));
        let mut cursor = TokenCursor::from_bytes(b"1 beginbfrange <01> <02>", LexMode::Bytes);
        assert!(matches!(
            parse_to_unicode(&mut cursor),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }
}
