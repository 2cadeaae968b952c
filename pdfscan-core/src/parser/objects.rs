//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3

use super::cursor::{unexpected, TokenCursor};
use super::lexer::{LexMode, Lexer, Token, TokenKind};
use super::{ParseError, ParseResult};
use std::collections::HashMap;
use std::fmt;

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfName(pub String);

/// PDF literal string object
#[derive(Debug, Clone, PartialEq)]
pub struct PdfString(pub Vec<u8>);

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

/// PDF Dictionary object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub HashMap<PdfName, PdfObject>);

/// PDF Stream object
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

impl PdfStream {
    /// Decompressed and un-predicted stream data
    pub fn decode(&self) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream(&self.data, &self.dict)
    }

    /// Get the raw (possibly compressed) stream data
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    /// Hex digits between `<` and `>`, whitespace removed
    HexString(String),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(u32, u16), // object number, generation number
}

impl PdfObject {
    /// Parse one PDF value from a cursor
    pub fn parse(cursor: &mut TokenCursor) -> ParseResult<Self> {
        let token = cursor.next_or_eof("PDF object")?.clone();
        Self::parse_from_token(cursor, &token)
    }

    /// Parse a PDF value starting from an already consumed token
    fn parse_from_token(cursor: &mut TokenCursor, token: &Token) -> ParseResult<Self> {
        match token.kind {
            TokenKind::Number => Self::parse_number(cursor, token),
            TokenKind::Name => Ok(PdfObject::Name(PdfName(
                token.name().unwrap_or_default().to_string(),
            ))),
            TokenKind::LiteralString => Ok(PdfObject::String(PdfString(match &token.value {
                super::lexer::TokenValue::Bytes(bytes) => bytes.clone(),
                _ => token.lexeme.clone(),
            }))),
            TokenKind::HexDelim if token.is_delim("<") => Self::parse_hex_string(cursor),
            TokenKind::ArrayDelim if token.is_delim("[") => Self::parse_array(cursor),
            TokenKind::DictDelim if token.is_delim("<<") => Self::parse_dictionary(cursor),
            TokenKind::Keyword if token.is_keyword("true") => Ok(PdfObject::Boolean(true)),
            TokenKind::Keyword if token.is_keyword("false") => Ok(PdfObject::Boolean(false)),
            TokenKind::Keyword if token.is_keyword("null") => Ok(PdfObject::Null),
            _ => Err(unexpected("PDF object", token)),
        }
    }

    /// A number, or the start of an `N G R` reference
    fn parse_number(cursor: &mut TokenCursor, token: &Token) -> ParseResult<Self> {
        if let Some(obj_num) = token.integer() {
            let generation = cursor.peek().and_then(|t| t.integer());
            let is_ref = cursor.peek_nth(1).is_some_and(|t| t.is_keyword("R"));
            if let (Some(gen_num), true) = (generation, is_ref) {
                if let (Ok(obj), Ok(gen)) = (u32::try_from(obj_num), u16::try_from(gen_num)) {
                    cursor.next();
                    cursor.next();
                    return Ok(PdfObject::Reference(obj, gen));
                }
            }
            return Ok(PdfObject::Integer(obj_num));
        }
        token
            .real()
            .map(PdfObject::Real)
            .ok_or_else(|| unexpected("number", token))
    }

    /// Parse a hex string body; the opening `<` is already consumed
    fn parse_hex_string(cursor: &mut TokenCursor) -> ParseResult<Self> {
        let mut digits = String::new();
        loop {
            let token = cursor.next_or_eof("hex digits or '>'")?;
            if token.is_delim(">") {
                break;
            }
            let is_hex = matches!(token.kind, TokenKind::Number | TokenKind::Keyword)
                && token.lexeme.iter().all(u8::is_ascii_hexdigit);
            if !is_hex {
                return Err(unexpected("hex digits or '>'", token));
            }
            digits.extend(token.lexeme.iter().map(|&b| b as char));
        }
        Ok(PdfObject::HexString(digits))
    }

    /// Parse a PDF array; the opening `[` is already consumed
    fn parse_array(cursor: &mut TokenCursor) -> ParseResult<Self> {
        let mut elements = Vec::new();
        loop {
            let token = cursor.next_or_eof("array element or ']'")?.clone();
            if token.is_delim("]") {
                break;
            }
            elements.push(Self::parse_from_token(cursor, &token)?);
        }
        Ok(PdfObject::Array(PdfArray(elements)))
    }

    /// Parse a PDF dictionary; the opening `<<` is already consumed
    fn parse_dictionary(cursor: &mut TokenCursor) -> ParseResult<Self> {
        let mut dict = HashMap::new();
        loop {
            let token = cursor.next_or_eof("dictionary key (name) or >>")?;
            if token.is_delim(">>") {
                break;
            }
            let key = match token.name() {
                Some(name) => name.to_string(),
                None => return Err(unexpected("dictionary key (name) or >>", token)),
            };
            let value = Self::parse(cursor)?;
            dict.insert(PdfName(key), value);
        }
        Ok(PdfObject::Dictionary(PdfDictionary(dict)))
    }

    /// Check if this object is null
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as real number
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as literal string
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes of a literal or hex string
    pub fn string_bytes(&self) -> Option<Vec<u8>> {
        match self {
            PdfObject::String(s) => Some(s.0.clone()),
            PdfObject::HexString(digits) => hex_to_bytes(digits),
            _ => None,
        }
    }

    /// Get as name
    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as dictionary (a stream answers with its dictionary)
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Get as reference
    pub fn as_reference(&self) -> Option<(u32, u16)> {
        match self {
            PdfObject::Reference(obj, gen) => Some((*obj, *gen)),
            _ => None,
        }
    }
}

/// Decode hex digits to bytes; an odd trailing digit is padded with 0
pub fn hex_to_bytes(digits: &str) -> Option<Vec<u8>> {
    if digits.len() % 2 == 1 {
        hex::decode(format!("{digits}0")).ok()
    } else {
        hex::decode(digits).ok()
    }
}

impl PdfDictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        PdfDictionary(HashMap::new())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(&PdfName(key.to_string()))
    }

    /// Insert a key-value pair
    pub fn insert(&mut self, key: String, value: PdfObject) {
        self.0.insert(PdfName(key), value);
    }

    /// Check if dictionary contains a key
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&PdfName(key.to_string()))
    }

    /// Get the dictionary type (value of /Type key)
    pub fn get_type(&self) -> Option<&str> {
        self.get_name("Type")
    }

    /// Name value of `key`
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|obj| obj.as_name())
            .map(|n| n.0.as_str())
    }

    /// Integer value of `key`
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|obj| obj.as_integer())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries sorted by key
    pub fn sorted_entries(&self) -> Vec<(&str, &PdfObject)> {
        let mut entries: Vec<_> = self.0.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl PdfArray {
    /// Create a new empty array
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    /// Get array length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if array is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get element at index
    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    /// Push an element
    pub fn push(&mut self, obj: PdfObject) {
        self.0.push(obj);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

impl PdfString {
    /// Create a new PDF string
    pub fn new(data: Vec<u8>) -> Self {
        PdfString(data)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Text of a string: UTF-16BE when it carries a byte order mark, Latin-1 otherwise
    pub fn to_text_lossy(&self) -> String {
        match self.0.strip_prefix(&[0xFE, 0xFF]) {
            Some(utf16) => decode_utf16be(utf16),
            None => self.0.iter().map(|&b| b as char).collect(),
        }
    }
}

/// Decode big-endian UTF-16, replacing unpaired surrogates
pub fn decode_utf16be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect();
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

impl PdfName {
    /// Create a new PDF name
    pub fn new(name: String) -> Self {
        PdfName(name)
    }

    /// Get the name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PdfObject {
    /// Render the object back in PDF syntax (streams show their length only)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfObject::Null => write!(f, "null"),
            PdfObject::Boolean(b) => write!(f, "{b}"),
            PdfObject::Integer(i) => write!(f, "{i}"),
            PdfObject::Real(r) => write!(f, "{r}"),
            PdfObject::String(s) => {
                write!(f, "(")?;
                for &b in s.as_bytes() {
                    match b {
                        b'(' | b')' | b'\\' => write!(f, "\\{}", b as char)?,
                        0x20..=0x7E => write!(f, "{}", b as char)?,
                        _ => write!(f, "\\{b:03o}")?,
                    }
                }
                write!(f, ")")
            }
            PdfObject::HexString(digits) => write!(f, "<{digits}>"),
            PdfObject::Name(n) => write!(f, "/{}", n.as_str()),
            PdfObject::Array(a) => {
                write!(f, "[")?;
                for (i, item) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            PdfObject::Dictionary(d) => write!(f, "{d}"),
            PdfObject::Stream(s) => write!(f, "{} stream[{} bytes]", s.dict, s.data.len()),
            PdfObject::Reference(obj, gen) => write!(f, "{obj} {gen} R"),
        }
    }
}

impl fmt::Display for PdfDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<<")?;
        for (key, value) in self.sorted_entries() {
            write!(f, " /{key} {value}")?;
        }
        write!(f, " >>")
    }
}

#[cfg(feature = "serde")]
mod serialize {
    use super::{PdfDictionary, PdfObject};
    use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

    impl Serialize for PdfObject {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                PdfObject::Null => serializer.serialize_unit(),
                PdfObject::Boolean(b) => serializer.serialize_bool(*b),
                PdfObject::Integer(i) => serializer.serialize_i64(*i),
                PdfObject::Real(r) => serializer.serialize_f64(*r),
                PdfObject::String(s) => serializer.serialize_str(&s.to_text_lossy()),
                PdfObject::HexString(digits) => serializer.serialize_str(&format!("<{digits}>")),
                PdfObject::Name(n) => serializer.serialize_str(&format!("/{}", n.as_str())),
                PdfObject::Array(a) => {
                    let mut seq = serializer.serialize_seq(Some(a.len()))?;
                    for item in a.iter() {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                PdfObject::Dictionary(d) => d.serialize(serializer),
                PdfObject::Stream(s) => {
                    let mut map = serializer.serialize_map(Some(2))?;
                    map.serialize_entry("dict", &s.dict)?;
                    map.serialize_entry("length", &s.data.len())?;
                    map.end()
                }
                PdfObject::Reference(obj, gen) => {
                    serializer.serialize_str(&format!("{obj} {gen} R"))
                }
            }
        }
    }

    impl Serialize for PdfDictionary {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let entries = self.sorted_entries();
            let mut map = serializer.serialize_map(Some(entries.len()))?;
            for (key, value) in entries {
                map.serialize_entry(key, value)?;
            }
            map.end()
        }
    }
}

/// A numbered object body: `N G obj value... endobj`
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub obj_number: u32,
    pub gen_number: u16,
    /// Values between `obj` and `endobj`; usually exactly one
    pub values: Vec<PdfObject>,
}

impl IndirectObject {
    /// First value of the body
    pub fn first(&self) -> Option<&PdfObject> {
        self.values.first()
    }

    /// The single value, `Null` for an empty body, an array when there are several
    pub fn into_value(mut self) -> PdfObject {
        match self.values.len() {
            0 => PdfObject::Null,
            1 => self.values.remove(0),
            _ => PdfObject::Array(PdfArray(self.values)),
        }
    }
}

/// Parse `N G obj ... endobj`.
///
/// Tokens after `endobj` are left in the cursor. A missing `endobj` is an
/// error; no partial object is returned.
pub fn parse_indirect_object(cursor: &mut TokenCursor) -> ParseResult<IndirectObject> {
    let obj_number = cursor.expect_integer("object number")?;
    let gen_number = cursor.expect_integer("generation number")?;
    cursor.expect_keyword("obj")?;

    let obj_number = u32::try_from(obj_number)
        .map_err(|_| ParseError::InvalidStructure(format!("bad object number {obj_number}")))?;
    let gen_number = u16::try_from(gen_number)
        .map_err(|_| ParseError::InvalidStructure(format!("bad generation {gen_number}")))?;

    let mut values = Vec::new();
    loop {
        match cursor.peek() {
            None => return Err(cursor.eof("endobj")),
            Some(token) if token.is_keyword("endobj") => {
                cursor.next();
                break;
            }
            Some(token) if token.kind == TokenKind::Keyword && !is_value_keyword(token) => {
                return Err(unexpected("endobj", token));
            }
            Some(_) => values.push(PdfObject::parse(cursor)?),
        }
    }

    Ok(IndirectObject {
        obj_number,
        gen_number,
        values,
    })
}

fn is_value_keyword(token: &Token) -> bool {
    token.is_keyword("true") || token.is_keyword("false") || token.is_keyword("null")
}

/// An object body cut around its stream payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSplit<'a> {
    /// Everything before the `stream` keyword
    pub head: &'a [u8],
    /// Bytes between the EOL after `stream` and the EOL before `endstream`
    pub payload: &'a [u8],
    /// Everything after `endstream`
    pub tail: &'a [u8],
    /// Offset of `tail` within the original bytes
    pub tail_offset: usize,
}

/// Locate `stream` ... `endstream` in an object body.
///
/// The declared `/Length` is not consulted: the payload runs forward to the
/// first `endstream` that is followed by `endobj`. Only a `stream` keyword
/// before the first `endobj` counts, so stale objects that share an extent
/// with this one are never picked up.
pub fn split_stream(bytes: &[u8]) -> Option<StreamSplit<'_>> {
    let body_end = find(bytes, b"endobj").unwrap_or(bytes.len());
    let keyword = find_stream_keyword(&bytes[..body_end])?;
    let mut payload_start = keyword + b"stream".len();
    match bytes.get(payload_start..payload_start + 2) {
        Some(b"\r\n") => payload_start += 2,
        _ => payload_start += 1,
    }

    let end = find_endstream(bytes, payload_start)?;
    let mut payload = &bytes[payload_start..end];
    if let Some(stripped) = payload.strip_suffix(b"\r\n") {
        payload = stripped;
    } else if let Some(stripped) = payload
        .strip_suffix(b"\n")
        .or_else(|| payload.strip_suffix(b"\r"))
    {
        payload = stripped;
    }

    let tail_offset = end + b"endstream".len();
    Some(StreamSplit {
        head: &bytes[..keyword],
        payload,
        tail: &bytes[tail_offset..],
        tail_offset,
    })
}

/// First `stream` keyword followed by an end-of-line
fn find_stream_keyword(bytes: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = find(&bytes[from..], b"stream") {
        let at = from + rel;
        let after = bytes.get(at + 6).copied();
        let preceded_by_end = at >= 3 && &bytes[at - 3..at] == b"end";
        if !preceded_by_end && matches!(after, Some(b'\r' | b'\n')) {
            return Some(at);
        }
        from = at + 6;
    }
    None
}

/// First `endstream` at or after `from` that closes the object, else the first one at all
fn find_endstream(bytes: &[u8], from: usize) -> Option<usize> {
    let first = from + find(bytes.get(from..)?, b"endstream")?;
    let mut at = first;
    loop {
        let rest = &bytes[at + b"endstream".len()..];
        let skipped = rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if rest[skipped..].starts_with(b"endobj") {
            return Some(at);
        }
        let next_from = at + b"endstream".len();
        match find(&bytes[next_from..], b"endstream") {
            Some(rel) => at = next_from + rel,
            None => return Some(first),
        }
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Parse a complete object body as read from its xref extent, stream payload included
pub fn parse_object_body(bytes: &[u8]) -> ParseResult<IndirectObject> {
    let Some(split) = split_stream(bytes) else {
        return parse_indirect_object(&mut TokenCursor::from_bytes(bytes, LexMode::Text));
    };

    let (line, column) = Lexer::location_of(bytes, split.tail_offset);
    let tokens = Lexer::new(split.head).chain(Lexer::new(split.tail).starting_at(line, column));
    let mut object = parse_indirect_object(&mut TokenCursor::new(tokens))?;

    match object.values.pop() {
        Some(PdfObject::Dictionary(dict)) => {
            object.values.push(PdfObject::Stream(PdfStream {
                dict,
                data: split.payload.to_vec(),
            }));
            Ok(object)
        }
        _ => Err(ParseError::InvalidStructure(format!(
            "object {} has stream data without a dictionary",
            object.obj_number
        ))),
    }
}
