//! PDF Cross-Reference Table Parser
//!
//! Parses classic xref tables according to ISO 32000-1 Section 7.5.4 and
//! derives the byte extent of every in-use object from the sorted offsets.

use super::cursor::{unexpected, TokenCursor};
use super::lexer::LexMode;
use super::objects::{self, PdfObject};
use super::trailer::PdfTrailer;
use super::{ParseError, ParseResult};
use std::collections::HashMap;
use std::ops::Range;

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct XRefEntry {
    /// Byte offset in the file (next free object number for free entries)
    pub offset: u64,
    /// Generation number
    pub generation: u16,
    /// Whether this entry is in use
    pub in_use: bool,
}

/// Cross-reference table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XRefTable {
    /// Map of object number to xref entry
    entries: HashMap<u32, XRefEntry>,
}

impl XRefTable {
    /// Create a new empty xref table
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    pub fn insert(&mut self, obj_num: u32, entry: XRefEntry) {
        self.entries.insert(obj_num, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by object number
    pub fn entries(&self) -> Vec<(u32, XRefEntry)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(num, _)| *num);
        entries
    }

    /// Fill in entries from an older revision without touching existing ones.
    /// Returns the number of entries added.
    pub fn merge_older(&mut self, older: &XRefTable) -> usize {
        let before = self.entries.len();
        for (num, entry) in &older.entries {
            self.entries.entry(*num).or_insert(*entry);
        }
        self.entries.len() - before
    }

    /// Offsets of all in-use entries
    pub fn in_use_offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries
            .values()
            .filter(|e| e.in_use)
            .map(|e| e.offset)
    }
}

/// Parse an `xref` section and the trailer dictionary that follows it.
///
/// `xref_offset` is the byte offset the section was read from; it is
/// recorded on the returned trailer.
pub fn parse_xref_and_trailer(
    cursor: &mut TokenCursor,
    xref_offset: u64,
) -> ParseResult<(XRefTable, PdfTrailer)> {
    let looks_like_object = cursor.peek().is_some_and(|t| t.integer().is_some())
        && cursor.peek_nth(2).is_some_and(|t| t.is_keyword("obj"));
    if looks_like_object {
        return Err(ParseError::XRefStreamUnsupported(xref_offset));
    }

    cursor.expect_keyword("xref")?;
    let mut table = XRefTable::new();

    while !cursor.eat_keyword("trailer") {
        let first = cursor.expect_integer("subsection start or trailer")?;
        let count = cursor.expect_integer("subsection count")?;
        let first = u32::try_from(first)
            .map_err(|_| ParseError::InvalidXRef(format!("bad subsection start {first}")))?;
        let count = u32::try_from(count)
            .map_err(|_| ParseError::InvalidXRef(format!("bad subsection count {count}")))?;

        for i in 0..count {
            let offset = cursor.expect_integer("entry offset")?;
            let generation = cursor.expect_integer("entry generation")?;
            let kind = cursor.next_or_eof("'n' or 'f'")?;
            let in_use = if kind.is_keyword("n") {
                true
            } else if kind.is_keyword("f") {
                false
            } else {
                return Err(unexpected("'n' or 'f'", kind));
            };

            let entry = XRefEntry {
                offset: u64::try_from(offset)
                    .map_err(|_| ParseError::InvalidXRef(format!("bad offset {offset}")))?,
                generation: u16::try_from(generation)
                    .map_err(|_| ParseError::InvalidXRef(format!("bad generation {generation}")))?,
                in_use,
            };
            table.insert(first + i, entry);
        }
    }

    match PdfObject::parse(cursor)? {
        PdfObject::Dictionary(dict) => Ok((table, PdfTrailer::from_dict(dict, xref_offset))),
        other => Err(ParseError::InvalidXRef(format!(
            "trailer is not a dictionary: {other}"
        ))),
    }
}

/// Read the `startxref` offset from the last bytes of a file
pub fn find_startxref(footer: &[u8]) -> ParseResult<u64> {
    let at = objects::rfind(footer, b"startxref")
        .ok_or_else(|| ParseError::InvalidXRef("startxref not found".to_string()))?;
    let mut cursor = TokenCursor::from_bytes(&footer[at + b"startxref".len()..], LexMode::Text);
    cursor
        .expect_integer("startxref offset")
        .and_then(|offset| {
            u64::try_from(offset)
                .map_err(|_| ParseError::InvalidXRef(format!("bad startxref offset {offset}")))
        })
}

/// Sorted offsets of all in-use objects, used to cut object extents.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectIndex {
    offsets: Vec<u64>,
    /// Start of the most recent xref section
    section_start: u64,
    file_len: u64,
}

impl ObjectIndex {
    pub fn new(offsets: impl IntoIterator<Item = u64>, section_start: u64, file_len: u64) -> Self {
        let mut offsets: Vec<u64> = offsets.into_iter().collect();
        offsets.sort_unstable();
        offsets.dedup();
        Self {
            offsets,
            section_start,
            file_len,
        }
    }

    /// `[offset, next greater offset)`; the greatest offset ends at the xref section
    pub fn extent(&self, offset: u64) -> Range<u64> {
        let next = self.offsets.partition_point(|&o| o <= offset);
        let end = match self.offsets.get(next) {
            Some(&following) => following,
            None if self.section_start > offset => self.section_start,
            None => self.file_len,
        };
        offset..end
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}
