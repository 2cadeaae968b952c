//! Random-access PDF reader
//!
//! Locates the `startxref` footer, walks the xref/trailer chain through `Prev`
//! links and serves individual objects by reading just their byte extent.

use super::cursor::TokenCursor;
use super::filters;
use super::lexer::{LexMode, Lexer, Token};
use super::objects::{self, IndirectObject, PdfDictionary, PdfObject, PdfStream};
use super::trailer::{PdfTrailer, TrailerChain};
use super::xref::{self, ObjectIndex, XRefEntry, XRefTable};
use super::{ParseError, ParseResult, ReaderOptions};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, trace, warn};

/// Chunk size used while searching for the end of an xref section
const SECTION_CHUNK: usize = 4096;

/// Reference chains longer than this are treated as cycles
const MAX_REFERENCE_HOPS: usize = 32;

/// High-level PDF reader
pub struct PdfReader<R: Read + Seek> {
    source: Mutex<BufReader<R>>,
    file_len: u64,
    /// Merged xref table, newest revision first
    xref: XRefTable,
    /// Merged trailer dictionary
    trailer: PdfTrailer,
    chain: TrailerChain,
    index: ObjectIndex,
    options: ReaderOptions,
}

impl PdfReader<File> {
    /// Open a PDF file from a path
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> ParseResult<Self> {
        debug!(path = %path.as_ref().display(), "opening PDF");
        let file = File::open(path)?;
        Self::new_with_options(file, options)
    }
}

impl<R: Read + Seek> PdfReader<R> {
    /// Create a new PDF reader from a reader
    pub fn new(reader: R) -> ParseResult<Self> {
        Self::new_with_options(reader, ReaderOptions::default())
    }

    /// Create a new PDF reader with custom options
    pub fn new_with_options(reader: R, options: ReaderOptions) -> ParseResult<Self> {
        let mut source = BufReader::new(reader);
        let file_len = source.seek(SeekFrom::End(0))?;
        if file_len == 0 {
            return Err(ParseError::InvalidStructure("file is empty".to_string()));
        }

        let scan_len = (options.footer_scan_len as u64).min(file_len);
        let footer = read_range(&mut source, file_len - scan_len..file_len)?;
        let startxref = xref::find_startxref(&footer)?;
        debug!(startxref, "found xref footer");

        let mut table = XRefTable::new();
        let mut chain: Option<TrailerChain> = None;
        let mut visited = HashSet::new();
        let mut next = Some(startxref);

        while let Some(offset) = next {
            if !visited.insert(offset) {
                return Err(ParseError::CircularReference(format!(
                    "xref section at offset {offset} is reached twice through Prev"
                )));
            }
            if visited.len() > options.max_prev_chain {
                return Err(ParseError::InvalidXRef(format!(
                    "more than {} chained xref sections",
                    options.max_prev_chain
                )));
            }

            let bytes = read_section(&mut source, offset, file_len)?;
            let mut cursor = TokenCursor::from_bytes(&bytes, LexMode::Text);
            let (section, trailer) = xref::parse_xref_and_trailer(&mut cursor, offset)?;
            let added = table.merge_older(&section);
            debug!(offset, entries = section.len(), added, prev = ?trailer.prev, "read xref section");

            next = trailer.prev;
            match chain.as_mut() {
                Some(chain) => chain.add_previous(trailer),
                None => chain = Some(TrailerChain::new(trailer)),
            }
        }

        let chain = chain.ok_or_else(|| ParseError::InvalidXRef("no xref section".to_string()))?;
        let trailer = chain.merged();
        if trailer.is_encrypted() {
            warn!("document is encrypted; strings and streams are read without decryption");
        }

        let index = ObjectIndex::new(table.in_use_offsets(), startxref, file_len);
        debug!(
            objects = table.len(),
            revisions = chain.all().len(),
            "xref chain merged"
        );

        Ok(Self {
            source: Mutex::new(source),
            file_len,
            xref: table,
            trailer,
            chain,
            index,
            options,
        })
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Merged cross-reference table
    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    /// Merged trailer (newest value of every key)
    pub fn trailer(&self) -> &PdfTrailer {
        &self.trailer
    }

    /// Individual trailers, newest first
    pub fn trailer_chain(&self) -> &TrailerChain {
        &self.chain
    }

    fn entry(&self, obj_num: u32) -> ParseResult<&XRefEntry> {
        self.xref
            .get(obj_num)
            .filter(|entry| entry.in_use)
            .ok_or(ParseError::ObjectNotFound(obj_num))
    }

    /// Byte range occupied by an object
    pub fn object_extent(&self, obj_num: u32) -> ParseResult<Range<u64>> {
        let entry = self.entry(obj_num)?;
        let extent = self.index.extent(entry.offset);
        if extent.start >= self.file_len {
            return Err(ParseError::InvalidXRef(format!(
                "object {obj_num} offset {} is beyond the end of the file",
                extent.start
            )));
        }
        Ok(extent.start..extent.end.min(self.file_len))
    }

    /// Raw bytes of an object's extent
    pub fn get_object_bytes(&self, obj_num: u32) -> ParseResult<Vec<u8>> {
        let extent = self.object_extent(obj_num)?;
        trace!(obj_num, start = extent.start, end = extent.end, "reading object");
        self.read_bytes(extent)
    }

    /// Parse an object with all the values of its body
    pub fn get_indirect_object(&self, obj_num: u32) -> ParseResult<IndirectObject> {
        let bytes = self.get_object_bytes(obj_num)?;
        let object = objects::parse_object_body(&bytes)?;

        if object.obj_number != obj_num {
            return Err(ParseError::InvalidXRef(format!(
                "xref entry for object {obj_num} points at object {}",
                object.obj_number
            )));
        }
        self.check_generation(obj_num, object.gen_number)?;
        Ok(object)
    }

    /// Compare a generation number against the xref entry. A mismatch is an
    /// error under `strict_generations` and a warning otherwise.
    fn check_generation(&self, obj_num: u32, found: u16) -> ParseResult<()> {
        let expected = self.entry(obj_num)?.generation;
        if found == expected {
            return Ok(());
        }
        if self.options.strict_generations {
            return Err(ParseError::GenerationMismatch {
                obj_num,
                expected,
                found,
            });
        }
        warn!(obj_num, found, expected, "generation mismatch");
        Ok(())
    }

    /// Get an object by number
    pub fn get_object(&self, obj_num: u32) -> ParseResult<PdfObject> {
        Ok(self.get_indirect_object(obj_num)?.into_value())
    }

    /// Get an object that must be a stream
    pub fn get_object_with_stream(&self, obj_num: u32) -> ParseResult<PdfStream> {
        match self.get_object(obj_num)? {
            PdfObject::Stream(stream) => Ok(stream),
            _ => Err(ParseError::NotAStream(obj_num)),
        }
    }

    /// Decoded payload of a stream object
    pub fn get_stream(&self, obj_num: u32) -> ParseResult<Vec<u8>> {
        let stream = self.get_object_with_stream(obj_num)?;
        self.decode_stream(&stream)
    }

    /// Decode a stream, resolving indirect `Filter`/`DecodeParms` values first
    pub fn decode_stream(&self, stream: &PdfStream) -> ParseResult<Vec<u8>> {
        let mut dict = stream.dict.clone();
        for key in ["Filter", "DecodeParms"] {
            if let Some(PdfObject::Reference(..)) = dict.get(key) {
                let resolved = self.resolve(dict.get(key).unwrap_or(&PdfObject::Null))?;
                dict.insert(key.to_string(), resolved);
            }
        }
        filters::decode_stream(&stream.data, &dict)
    }

    /// Follow references until a direct value is reached. Each reference's
    /// generation is checked against the xref entry it lands on.
    pub fn resolve(&self, obj: &PdfObject) -> ParseResult<PdfObject> {
        let mut current = obj.clone();
        for _ in 0..MAX_REFERENCE_HOPS {
            match current {
                PdfObject::Reference(obj_num, gen_number) => {
                    self.check_generation(obj_num, gen_number)?;
                    current = self.get_object(obj_num)?;
                }
                other => return Ok(other),
            }
        }
        Err(ParseError::CircularReference(format!(
            "reference chain starting at {obj} does not end"
        )))
    }

    /// Resolve a value that must be a dictionary
    pub fn resolve_dict(&self, obj: &PdfObject, what: &str) -> ParseResult<PdfDictionary> {
        match self.resolve(obj)? {
            PdfObject::Dictionary(dict) => Ok(dict),
            PdfObject::Stream(stream) => Ok(stream.dict),
            other => Err(ParseError::InvalidStructure(format!(
                "{what} is not a dictionary: {other}"
            ))),
        }
    }

    /// Bytes of `[start, end)` split into lines
    pub fn read_section(&self, start: u64, end: u64) -> ParseResult<Vec<String>> {
        let end = end.min(self.file_len);
        if start > end {
            return Err(ParseError::InvalidStructure(format!(
                "section start {start} is past its end {end}"
            )));
        }
        let bytes = self.read_bytes(start..end)?;
        Ok(split_lines(&bytes))
    }

    /// Tokens of an object's extent; a stream payload is left out
    pub fn tokens_for(&self, obj_num: u32) -> ParseResult<Vec<Token>> {
        let bytes = self.get_object_bytes(obj_num)?;
        let tokens: Vec<Token> = match objects::split_stream(&bytes) {
            Some(split) => {
                let (line, column) = Lexer::location_of(&bytes, split.tail_offset);
                Lexer::new(split.head)
                    .chain(Lexer::new(split.tail).starting_at(line, column))
                    .collect()
            }
            None => Lexer::new(&bytes).collect(),
        };
        Ok(tokens.into_iter().filter(|t| !t.is_trivia()).collect())
    }

    fn read_bytes(&self, range: Range<u64>) -> ParseResult<Vec<u8>> {
        let mut source = self
            .source
            .lock()
            .map_err(|_| ParseError::Corrupt("reader lock poisoned".to_string()))?;
        read_range(&mut *source, range)
    }
}

fn read_range<S: Read + Seek>(source: &mut S, range: Range<u64>) -> ParseResult<Vec<u8>> {
    source.seek(SeekFrom::Start(range.start))?;
    let mut buf = Vec::with_capacity((range.end - range.start) as usize);
    source.take(range.end - range.start).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read an xref section up to and including its `startxref` keyword, or to EOF
fn read_section<S: Read + Seek>(source: &mut S, offset: u64, file_len: u64) -> ParseResult<Vec<u8>> {
    if offset >= file_len {
        return Err(ParseError::InvalidXRef(format!(
            "xref offset {offset} is beyond the end of the file"
        )));
    }

    source.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::new();
    let mut chunk = vec![0u8; SECTION_CHUNK];
    loop {
        let read = source.read(&mut chunk)?;
        if read == 0 {
            return Ok(bytes);
        }
        // re-scan the seam between chunks
        let from = bytes.len().saturating_sub(b"startxref".len());
        bytes.extend_from_slice(&chunk[..read]);
        if let Some(at) = objects::find(&bytes[from..], b"startxref") {
            bytes.truncate(from + at + b"startxref".len());
            return Ok(bytes);
        }
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(String::from_utf8_lossy(&bytes[start..i]).into_owned());
                start = i + 1;
            }
            b'\r' => {
                lines.push(String::from_utf8_lossy(&bytes[start..i]).into_owned());
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < bytes.len() {
        lines.push(String::from_utf8_lossy(&bytes[start..]).into_owned());
    }
    lines
}
