//! Text decoding
//!
//! Turns the bytes shown by content stream operators into Unicode text using
//! the font's ToUnicode CMap, its `Differences` array or one of the built-in
//! single-byte encodings, in that order.

pub mod cmap;
pub mod encoding;
pub mod font;

pub use cmap::{parse_to_unicode, BfRange, BfRangeDest, CodespaceRange, ToUnicodeCMap, ToUnicodeSource};
pub use encoding::{glyph_to_unicode, BaseEncoding};
pub use font::{decode_content, parse_differences, Font, FontEncoding, FontTable, PageFonts};
