//! PDF Parser Module
//!
//! Reads classic PDF files (ISO 32000-1 syntax without object streams or
//! cross-reference streams): tokenizing, object grammar, the xref/trailer
//! chain, stream filters, page tree traversal and page-level queries.
//!
//! Object streams and cross-reference streams (PDF 1.5+) are not supported;
//! a file whose `startxref` points at an xref stream is rejected with
//! [`ParseError::XRefStreamUnsupported`].

pub mod color_space;
pub mod content;
pub mod cursor;
pub mod document;
pub mod filter_impls;
pub mod filters;
pub mod lexer;
pub mod objects;
pub mod page_tree;
pub mod reader;
pub mod trailer;
pub mod xref;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use self::color_space::{ColorDepth, ColorSpace, ColorSpaceResolver};
pub use self::content::{parse_content, TextBlock};
pub use self::cursor::TokenCursor;
pub use self::document::{DocumentSummary, ImageEncoding, PageImage, PdfDocument};
pub use self::lexer::{LexMode, Lexer, Token, TokenKind, TokenValue};
pub use self::objects::{
    parse_indirect_object, IndirectObject, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream,
    PdfString,
};
pub use self::page_tree::{build_page_tree, Catalog, Page};
pub use self::reader::PdfReader;
pub use self::trailer::{PdfTrailer, TrailerChain};
pub use self::xref::{parse_xref_and_trailer, ObjectIndex, XRefEntry, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected token at line {line}, column {column}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("Unexpected end of input at line {line}, column {column}: expected {expected}")]
    UnexpectedEof {
        expected: String,
        line: usize,
        column: usize,
    },

    #[error("Invalid xref table: {0}")]
    InvalidXRef(String),

    #[error("Cross-reference stream at offset {0} is not supported")]
    XRefStreamUnsupported(u64),

    #[error("Object {0} not found in xref table")]
    ObjectNotFound(u32),

    #[error("Generation mismatch for object {obj_num}: xref has {expected}, found {found}")]
    GenerationMismatch {
        obj_num: u32,
        expected: u16,
        found: u16,
    },

    #[error("Object {0} is not a stream")]
    NotAStream(u32),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Unresolved resource: {0}")]
    UnresolvedResource(String),

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Unsupported color space: {0}")]
    UnsupportedColorSpace(String),

    #[error("Corrupt stream data: {0}")]
    Corrupt(String),

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Circular reference detected: {0}")]
    CircularReference(String),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),
}

/// Options controlling how tolerant the reader is and how far it recurses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Number of bytes scanned backwards from end of file for `startxref`
    pub footer_scan_len: usize,
    /// Maximum number of trailer revisions followed through `Prev`
    pub max_prev_chain: usize,
    /// Recursion bound for page tree, resource inheritance and color spaces
    pub max_tree_depth: usize,
    /// Reject dictionaries whose `/Type` does not match what the caller expects
    pub strict_types: bool,
    /// Reject references and object headers whose generation differs from the xref entry
    pub strict_generations: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            footer_scan_len: 1024,
            max_prev_chain: 64,
            max_tree_depth: 32,
            strict_types: true,
            strict_generations: true,
        }
    }
}

impl ReaderOptions {
    /// Strict options: type mismatches are errors
    pub fn strict() -> Self {
        Self::default()
    }

    /// Lenient options: wider footer window; wrong `/Type` entries and
    /// generation numbers are logged and tolerated
    pub fn lenient() -> Self {
        Self {
            footer_scan_len: 4096,
            strict_types: false,
            strict_generations: false,
            ..Self::default()
        }
    }
}
