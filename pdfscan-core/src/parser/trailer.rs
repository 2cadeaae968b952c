//! Trailer dictionaries and the incremental-update chain
//!
//! Every xref section ends with a trailer (ISO 32000-1 Section 7.5.5). An
//! incrementally updated file carries one trailer per revision, linked from
//! newest to oldest through `Prev`.

use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

/// One revision's trailer dictionary
#[derive(Debug, Clone, PartialEq)]
pub struct PdfTrailer {
    pub dict: PdfDictionary,
    /// `Prev`: offset of the next older xref section
    pub prev: Option<u64>,
    /// Offset of the xref section this trailer closes
    pub xref_offset: u64,
}

impl PdfTrailer {
    /// Wrap a trailer dictionary read from the section at `xref_offset`.
    /// A `Prev` that is not a non-negative integer is ignored.
    pub fn from_dict(dict: PdfDictionary, xref_offset: u64) -> Self {
        let prev = dict
            .get_integer("Prev")
            .and_then(|offset| u64::try_from(offset).ok());
        Self {
            dict,
            prev,
            xref_offset,
        }
    }

    fn reference(&self, key: &str) -> Option<(u32, u16)> {
        self.dict.get(key).and_then(PdfObject::as_reference)
    }

    /// `Size`: one more than the highest object number
    pub fn size(&self) -> ParseResult<u32> {
        self.dict
            .get_integer("Size")
            .and_then(|size| u32::try_from(size).ok())
            .ok_or_else(|| ParseError::MissingKey("Size".to_string()))
    }

    /// `Root`: reference to the document catalog
    pub fn root(&self) -> ParseResult<(u32, u16)> {
        self.reference("Root")
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))
    }

    pub fn info(&self) -> Option<(u32, u16)> {
        self.reference("Info")
    }

    pub fn id(&self) -> Option<&PdfObject> {
        self.dict.get("ID")
    }

    /// Encrypted documents are read as-is; their strings and streams stay ciphered
    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }
}

/// Trailers of every revision, newest first
#[derive(Debug, Clone)]
pub struct TrailerChain {
    newest: PdfTrailer,
    revisions: Vec<PdfTrailer>,
}

impl TrailerChain {
    pub fn new(newest: PdfTrailer) -> Self {
        Self {
            revisions: vec![newest.clone()],
            newest,
        }
    }

    /// Append the trailer reached through the last one's `Prev`
    pub fn add_previous(&mut self, older: PdfTrailer) {
        self.revisions.push(older);
    }

    pub fn current(&self) -> &PdfTrailer {
        &self.newest
    }

    pub fn all(&self) -> &[PdfTrailer] {
        &self.revisions
    }

    pub fn has_previous(&self) -> bool {
        self.revisions.len() > 1
    }

    /// One dictionary for the whole chain: a key set by a newer revision is
    /// never replaced by an older one, older revisions only fill gaps.
    pub fn merged(&self) -> PdfTrailer {
        let mut merged = PdfDictionary::new();
        for (key, value) in self.revisions.iter().flat_map(|t| t.dict.0.iter()) {
            merged.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
        PdfTrailer::from_dict(merged, self.newest.xref_offset)
    }
}
