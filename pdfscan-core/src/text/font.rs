//! Font resources and text decoding
//!
//! A [`Font`] is read from a page's `/Font` resource entry. Its encoding is
//! decided once at load time: a base single-byte encoding, or a base encoding
//! with a `Differences` array applied on top. A ToUnicode CMap, when present,
//! takes priority over both.

use super::cmap::ToUnicodeCMap;
use super::encoding::{glyph_to_unicode, BaseEncoding};
use crate::parser::content::{parse_content, TextBlock};
use crate::parser::cursor::TokenCursor;
use crate::parser::objects::{PdfDictionary, PdfObject};
use crate::parser::{LexMode, ParseError, ParseResult, PdfReader};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Encoding of a simple font
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FontEncoding {
    /// One of the predefined single-byte encodings
    Base(BaseEncoding),
    /// `BaseEncoding` with specific codes reassigned to glyph names
    Differences {
        base: BaseEncoding,
        differences: BTreeMap<u8, String>,
    },
}

impl Default for FontEncoding {
    fn default() -> Self {
        FontEncoding::Base(BaseEncoding::Standard)
    }
}

impl FontEncoding {
    /// Build from an `/Encoding` value that is already resolved
    pub fn from_object(obj: &PdfObject) -> Self {
        match obj {
            PdfObject::Name(name) => match BaseEncoding::from_name(name.as_str()) {
                Some(base) => FontEncoding::Base(base),
                None => {
                    warn!(encoding = name.as_str(), "unsupported font encoding, using Standard");
                    FontEncoding::default()
                }
            },
            PdfObject::Dictionary(dict) => {
                let base = dict
                    .get_name("BaseEncoding")
                    .and_then(BaseEncoding::from_name)
                    .unwrap_or_default();
                match dict.get("Differences").and_then(|d| d.as_array()) {
                    Some(array) => FontEncoding::Differences {
                        base,
                        differences: parse_differences(array.iter()),
                    },
                    None => FontEncoding::Base(base),
                }
            }
            _ => FontEncoding::default(),
        }
    }

    pub fn base(&self) -> BaseEncoding {
        match self {
            FontEncoding::Base(base) => *base,
            FontEncoding::Differences { base, .. } => *base,
        }
    }

    /// Text for one byte; never fails
    pub fn decode_byte(&self, code: u8) -> String {
        if let FontEncoding::Differences { differences, .. } = self {
            if let Some(text) = differences.get(&code).and_then(|g| glyph_to_unicode(g)) {
                return text;
            }
        }
        self.base()
            .lookup(code)
            .unwrap_or(char::from(code))
            .to_string()
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FontEncoding::Base(base) => base.decode(bytes),
            FontEncoding::Differences { .. } => bytes.iter().map(|&b| self.decode_byte(b)).collect(),
        }
    }
}

/// `[code name name ... code name ...]`: each number restarts the code
/// counter, each name takes the next code
pub fn parse_differences<'a>(items: impl Iterator<Item = &'a PdfObject>) -> BTreeMap<u8, String> {
    let mut differences = BTreeMap::new();
    let mut code: Option<i64> = None;
    for item in items {
        match item {
            PdfObject::Integer(start) => code = Some(*start),
            PdfObject::Name(glyph) => {
                if let Some(c) = code {
                    if let Ok(byte) = u8::try_from(c) {
                        differences.insert(byte, glyph.as_str().to_string());
                    }
                    code = Some(c + 1);
                }
            }
            _ => {}
        }
    }
    differences
}

/// A simple font as far as text extraction needs it
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Font {
    /// Resource name the font was first loaded under (`F1`)
    pub name: String,
    pub subtype: String,
    pub base_font: Option<String>,
    pub first_char: Option<i64>,
    pub last_char: Option<i64>,
    pub widths: Option<Vec<f64>>,
    pub descriptor: Option<PdfDictionary>,
    pub encoding: FontEncoding,
    pub to_unicode: Option<ToUnicodeCMap>,
}

impl Font {
    /// Read a font dictionary, resolving `Encoding`, `Widths`,
    /// `FontDescriptor` and `ToUnicode` through the reader.
    pub fn load<R: Read + Seek>(
        reader: &PdfReader<R>,
        name: &str,
        dict: &PdfDictionary,
    ) -> ParseResult<Self> {
        if let Some(kind) = dict.get_type() {
            if kind != "Font" {
                if reader.options().strict_types {
                    return Err(ParseError::InvalidStructure(format!(
                        "font resource {name} has /Type /{kind}"
                    )));
                }
                warn!(font = name, kind, "font dictionary with unexpected /Type");
            }
        }

        let subtype = dict.get_name("Subtype").unwrap_or("Type1").to_string();
        let base_font = dict.get_name("BaseFont").map(str::to_string);

        let encoding = match dict.get("Encoding") {
            Some(obj) => FontEncoding::from_object(&reader.resolve(obj)?),
            None => FontEncoding::default(),
        };

        let widths = match dict.get("Widths") {
            Some(obj) => reader
                .resolve(obj)?
                .as_array()
                .map(|a| a.iter().filter_map(PdfObject::as_real).collect()),
            None => None,
        };

        let descriptor = match dict.get("FontDescriptor") {
            Some(obj) => Some(reader.resolve_dict(obj, "FontDescriptor")?),
            None => None,
        };

        let to_unicode = match dict.get("ToUnicode") {
            Some(obj) => match reader.resolve(obj)? {
                PdfObject::Stream(stream) => {
                    let data = reader.decode_stream(&stream)?;
                    Some(ToUnicodeCMap::parse(&data)?)
                }
                // `/ToUnicode /Identity-H` and friends carry no table
                _ => None,
            },
            None => None,
        };

        debug!(
            font = name,
            subtype = %subtype,
            base_font = base_font.as_deref().unwrap_or("-"),
            cmap = to_unicode.is_some(),
            "loaded font"
        );

        Ok(Font {
            name: name.to_string(),
            subtype,
            base_font,
            first_char: dict.get_integer("FirstChar"),
            last_char: dict.get_integer("LastChar"),
            widths,
            descriptor,
            encoding,
            to_unicode,
        })
    }

    /// Decode shown bytes: ToUnicode first, then the font encoding
    pub fn decode(&self, bytes: &[u8]) -> String {
        match &self.to_unicode {
            Some(cmap) => cmap.decode(bytes),
            None => self.encoding.decode(bytes),
        }
    }
}

/// Fonts available to one page, keyed by resource name
pub type PageFonts = BTreeMap<String, Arc<Font>>;

/// Lazily filled font cache shared by all pages of a document.
///
/// Fonts reached through an indirect reference are loaded once; inline font
/// dictionaries are loaded every time they are asked for.
#[derive(Debug, Default)]
pub struct FontTable {
    cache: RwLock<HashMap<(u32, u16), Arc<Font>>>,
}

impl FontTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached fonts
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load the font that `obj` (a reference or a dictionary) describes
    pub fn load<R: Read + Seek>(
        &self,
        reader: &PdfReader<R>,
        name: &str,
        obj: &PdfObject,
    ) -> ParseResult<Arc<Font>> {
        let Some(key) = obj.as_reference() else {
            let dict = reader.resolve_dict(obj, "Font")?;
            return Ok(Arc::new(Font::load(reader, name, &dict)?));
        };

        if let Some(font) = self.cache.read().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(font);
        }

        let dict = reader.resolve_dict(obj, "Font")?;
        let font = Arc::new(Font::load(reader, name, &dict)?);
        if let Ok(mut cache) = self.cache.write() {
            // another reader may have won the race; keep whichever landed first
            return Ok(cache.entry(key).or_insert(font).clone());
        }
        Ok(font)
    }

    /// Add every entry of a `/Font` resource dictionary to `fonts`, skipping
    /// names that are already present
    pub fn add_fonts<R: Read + Seek>(
        &self,
        reader: &PdfReader<R>,
        font_dict: &PdfDictionary,
        fonts: &mut PageFonts,
    ) -> ParseResult<()> {
        for (name, obj) in font_dict.sorted_entries() {
            if fonts.contains_key(name) {
                continue;
            }
            let font = self.load(reader, name, obj)?;
            fonts.insert(name.to_string(), font);
        }
        Ok(())
    }
}

/// Decode every text block of a content stream with the page's fonts.
///
/// Returns one string per `BT ... ET` group. A block shown before any `Tf`
/// falls back to the Standard encoding.
pub fn decode_content(fonts: &PageFonts, content: &[u8]) -> ParseResult<Vec<String>> {
    let mut cursor = TokenCursor::from_bytes(content, LexMode::Bytes);
    let blocks = parse_content(&mut cursor)?;
    blocks.iter().map(|block| decode_block(fonts, block)).collect()
}

fn decode_block(fonts: &PageFonts, block: &TextBlock) -> ParseResult<String> {
    match &block.font {
        Some(name) => {
            let font = fonts
                .get(name)
                .ok_or_else(|| ParseError::UnresolvedResource(format!("font /{name}")))?;
            Ok(block.strings.iter().map(|s| font.decode(s)).collect())
        }
        None => {
            warn!("text shown without a selected font, using Standard encoding");
            let fallback = FontEncoding::default();
            Ok(block.strings.iter().map(|s| fallback.decode(s)).collect())
        }
    }
}
