//! # pdfscan
//!
//! A from-scratch reader for classic PDF files, written in pure Rust.
//!
//! ## Features
//!
//! - **Tokenizer and object parser**: the full object grammar with line/column
//!   positions in every syntax error
//! - **Cross-reference chains**: incremental updates are followed through
//!   `Prev`, newest revision first
//! - **Stream filters**: FlateDecode, LZWDecode and DCTDecode (passed through),
//!   with PNG and TIFF predictors
//! - **Text**: base encodings, `Differences` arrays and ToUnicode CMaps
//! - **Images**: raw samples or original JPEG bytes, with color depth and
//!   JPEG frame information
//!
//! Object streams and cross-reference streams (PDF 1.5+), encryption and
//! rendering are out of scope.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfscan::parser::PdfDocument;
//!
//! # fn main() -> pdfscan::Result<()> {
//! let document = PdfDocument::open("document.pdf")?;
//! println!("Pages: {}", document.page_count());
//!
//! for number in 1..=document.page_count() {
//!     for block in document.get_page_text(number)? {
//!         println!("{block}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`parser`] - tokenizer, objects, xref/trailer chain, filters, page tree and
//!   the [`parser::PdfDocument`] facade
//! - [`text`] - encodings, CMaps and fonts
//! - [`error`] - crate-level error type

pub mod error;
pub mod parser;
pub mod text;

pub use error::{PdfError, Result};
pub use parser::{
    ParseError, PdfArray, PdfDictionary, PdfDocument, PdfName, PdfObject, PdfReader, PdfStream,
    PdfString, ReaderOptions,
};

/// Current version of pdfscan
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_reexports() {
        let err: PdfError = ParseError::MissingKey("Root".to_string()).into();
        assert!(err.to_string().contains("Root"));
        assert!(ReaderOptions::default().strict_types);
    }
}
