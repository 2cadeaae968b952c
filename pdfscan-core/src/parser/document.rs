//! PDF Document - page-level queries over a [`PdfReader`]
//!
//! The document owns the reader, the flattened catalog and two lazily filled
//! caches: fonts and color spaces. Everything built at open time is immutable;
//! the caches sit behind `RwLock`s, so a document can be shared between
//! threads when the underlying source can.
//!
//! # Example
//!
//! ```rust,no_run
//! use pdfscan::parser::PdfDocument;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = PdfDocument::open("document.pdf")?;
//! println!("Pages: {}", document.page_count());
//!
//! for (i, block) in document.get_page_text(1)?.iter().enumerate() {
//!     println!("block {i}: {block}");
//! }
//!
//! for (name, image) in document.get_page_images(1)? {
//!     println!("{name}: {}x{} ({:?})", image.width, image.height, image.encoding);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Files that use object streams or cross-reference streams (PDF 1.5+) are not
//! supported and fail to open.

use super::color_space::{ColorDepth, ColorSpace, ColorSpaceResolver};
use super::filter_impls::{parse_jpeg_info, JpegInfo};
use super::filters::Filter;
use super::objects::{PdfDictionary, PdfObject, PdfStream};
use super::page_tree::{Catalog, Page};
use super::reader::PdfReader;
use super::xref::XRefEntry;
use super::{ParseError, ParseResult, ReaderOptions};
use crate::error::{PdfError, Result};
use crate::text::font::{decode_content, Font, FontTable, PageFonts};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// How the bytes of a [`PageImage`] are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ImageEncoding {
    /// The original DCTDecode payload, a complete JPEG file
    Jpeg,
    /// Decoded samples, row by row
    Raw,
}

impl ImageEncoding {
    /// File extension used when the image is saved
    pub fn extension(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "jpg",
            ImageEncoding::Raw => "png",
        }
    }
}

/// An image XObject of a page
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PageImage {
    /// XObject resource name, or `image-<number>` when read by object number
    pub name: String,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub data: Vec<u8>,
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u32,
    pub color_depth: ColorDepth,
    /// Frame header of JPEG data
    pub jpeg: Option<JpegInfo>,
}

impl PageImage {
    /// Length of the image data in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encode raw 8-bit gray or RGB samples as PNG; JPEG data is returned as is
    #[cfg(feature = "external-images")]
    pub fn to_png(&self) -> Result<Vec<u8>> {
        use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

        if self.encoding == ImageEncoding::Jpeg {
            return Ok(self.data.clone());
        }
        if self.bits_per_component != 8 {
            return Err(PdfError::InvalidImage(format!(
                "{}: {} bits per component",
                self.name, self.bits_per_component
            )));
        }

        let invalid = || {
            PdfError::InvalidImage(format!(
                "{}: {} bytes do not fill {}x{}",
                self.name,
                self.data.len(),
                self.width,
                self.height
            ))
        };
        let pixels = (self.width as usize) * (self.height as usize);
        let image = match self.color_depth.components() {
            Some(1) => {
                let data = self.data.get(..pixels).ok_or_else(invalid)?.to_vec();
                DynamicImage::ImageLuma8(
                    GrayImage::from_raw(self.width, self.height, data).ok_or_else(invalid)?,
                )
            }
            Some(3) => {
                let data = self.data.get(..pixels * 3).ok_or_else(invalid)?.to_vec();
                DynamicImage::ImageRgb8(
                    RgbImage::from_raw(self.width, self.height, data).ok_or_else(invalid)?,
                )
            }
            other => {
                return Err(PdfError::InvalidImage(format!(
                    "{}: cannot export {other:?} color components",
                    self.name
                )))
            }
        };

        let mut png = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| PdfError::InvalidImage(e.to_string()))?;
        Ok(png.into_inner())
    }
}

/// Trailer, cross-reference table and catalog of a document
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DocumentSummary {
    /// Version from the `%PDF-x.y` header
    pub version: Option<String>,
    pub file_len: u64,
    pub revisions: usize,
    pub trailer: PdfDictionary,
    pub xref: Vec<(u32, XRefEntry)>,
    pub catalog: Catalog,
}

#[cfg(feature = "serde")]
impl DocumentSummary {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// High-level view of a PDF file
///
/// ```rust,no_run
/// use pdfscan::parser::{PdfDocument, PdfReader, ReaderOptions};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let reader = PdfReader::open_with_options("scan.pdf", ReaderOptions::lenient())?;
/// let document = PdfDocument::new(reader)?;
/// let page = document.get_page(1)?;
/// println!("page 1 is object {} {} R", page.obj_ref.0, page.obj_ref.1);
/// # Ok(())
/// # }
/// ```
pub struct PdfDocument<R: Read + Seek> {
    reader: PdfReader<R>,
    catalog: Catalog,
    fonts: FontTable,
    color_spaces: ColorSpaceResolver,
}

impl PdfDocument<File> {
    /// Open a file with the default (strict) options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(PdfReader::open(path)?)
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        Self::new(PdfReader::open_with_options(path, options)?)
    }
}

impl<R: Read + Seek> PdfDocument<R> {
    /// Build the catalog and page list of an opened reader
    pub fn new(reader: PdfReader<R>) -> Result<Self> {
        let catalog = Catalog::load(&reader)?;
        debug!(pages = catalog.page_count(), "document opened");
        Ok(Self {
            reader,
            catalog,
            fonts: FontTable::new(),
            color_spaces: ColorSpaceResolver::new(),
        })
    }

    pub fn reader(&self) -> &PdfReader<R> {
        &self.reader
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn page_count(&self) -> usize {
        self.catalog.page_count()
    }

    /// An object by number, with every value of its body
    pub fn get_object(&self, obj_num: u32) -> Result<PdfObject> {
        Ok(self.reader.get_object(obj_num)?)
    }

    /// Page `number`, counting from 1
    pub fn get_page(&self, number: usize) -> Result<Page> {
        let obj_ref = self
            .catalog
            .page_ref(number)
            .ok_or(PdfError::InvalidPageNumber {
                page: number,
                count: self.page_count(),
            })?;
        Ok(Page::load(&self.reader, obj_ref, number)?)
    }

    /// Fonts in the `/Font` resources of a page
    pub fn page_fonts(&self, number: usize) -> Result<PageFonts> {
        let page = self.get_page(number)?;
        self.fonts_of(&page)
    }

    fn fonts_of(&self, page: &Page) -> Result<PageFonts> {
        let mut fonts = PageFonts::new();
        if let Some(font_dict) = page.resource(&self.reader, "Font")? {
            self.fonts.add_fonts(&self.reader, &font_dict, &mut fonts)?;
        }
        Ok(fonts)
    }

    /// Resource names of the fonts of a page, sorted
    pub fn font_names(&self, number: usize) -> Result<Vec<String>> {
        Ok(self.page_fonts(number)?.into_keys().collect())
    }

    /// One font of a page by resource name
    pub fn font(&self, number: usize, name: &str) -> Result<Arc<Font>> {
        self.page_fonts(number)?
            .remove(name)
            .ok_or_else(|| ParseError::UnresolvedResource(format!("font /{name}")).into())
    }

    /// Text of a page, one string per text block
    pub fn get_page_text(&self, number: usize) -> Result<Vec<String>> {
        let page = self.get_page(number)?;
        let fonts = self.fonts_of(&page)?;
        let content = page.content_data(&self.reader)?;
        Ok(decode_content(&fonts, &content)?)
    }

    /// Image XObjects of a page by resource name.
    ///
    /// JPEG images keep their original bytes; everything else is decoded.
    pub fn get_page_images(&self, number: usize) -> Result<BTreeMap<String, PageImage>> {
        let page = self.get_page(number)?;
        let mut images = BTreeMap::new();
        let Some(xobjects) = page.resource(&self.reader, "XObject")? else {
            return Ok(images);
        };

        for (name, obj) in xobjects.sorted_entries() {
            let stream = match self.reader.resolve(obj)? {
                PdfObject::Stream(stream) => stream,
                other => {
                    warn!(xobject = name, "XObject is not a stream: {other}");
                    continue;
                }
            };
            if stream.dict.get_name("Subtype") != Some("Image") {
                continue;
            }
            let image = self.load_image(Some(&page), name, &stream)?;
            images.insert(name.to_string(), image);
        }
        Ok(images)
    }

    /// Image XObject by object number, outside any page. The image is named
    /// `image-<number>`; a color space given as a resource name cannot be
    /// resolved without a page and is an error.
    pub fn get_image(&self, obj_num: u32) -> Result<PageImage> {
        let stream = self.reader.get_object_with_stream(obj_num)?;
        let name = format!("image-{obj_num}");
        if stream.dict.get_name("Subtype") != Some("Image") {
            return Err(PdfError::InvalidImage(format!(
                "{name}: object is not an image XObject"
            )));
        }
        self.load_image(None, &name, &stream)
    }

    fn load_image(&self, page: Option<&Page>, name: &str, stream: &PdfStream) -> Result<PageImage> {
        let dict = &stream.dict;
        let is_jpeg = Filter::from_dict(dict)? == Some(Filter::DCTDecode);

        let (data, encoding, jpeg) = if is_jpeg {
            let info = match parse_jpeg_info(&stream.data) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(image = name, "unreadable JPEG header: {e}");
                    None
                }
            };
            (stream.data.clone(), ImageEncoding::Jpeg, info)
        } else {
            (self.reader.decode_stream(stream)?, ImageEncoding::Raw, None)
        };

        let dimension = |key: &str, from_jpeg: Option<u16>| -> Result<u32> {
            dict.get_integer(key)
                .and_then(|v| u32::try_from(v).ok())
                .or(from_jpeg.map(u32::from))
                .ok_or_else(|| PdfError::InvalidImage(format!("{name}: missing {key}")))
        };
        let width = dimension("Width", jpeg.as_ref().map(|j| j.width))?;
        let height = dimension("Height", jpeg.as_ref().map(|j| j.height))?;

        let image_mask = dict.get("ImageMask").and_then(PdfObject::as_bool) == Some(true);
        let bits_per_component = if image_mask {
            1
        } else {
            dict.get_integer("BitsPerComponent")
                .and_then(|v| u32::try_from(v).ok())
                .or(jpeg.as_ref().map(|j| u32::from(j.bits_per_component)))
                .unwrap_or(8)
        };

        let color_depth = match dict.get("ColorSpace") {
            Some(space) => self.image_color_depth(page, space)?,
            None if image_mask => ColorDepth::Components(1),
            None => match &jpeg {
                Some(info) => ColorDepth::Components(u32::from(info.components)),
                None => {
                    return Err(PdfError::InvalidImage(format!("{name}: no ColorSpace")));
                }
            },
        };

        Ok(PageImage {
            name: name.to_string(),
            data,
            encoding,
            width,
            height,
            bits_per_component,
            color_depth,
            jpeg,
        })
    }

    /// Depth of an image's color space; bare names that are not families are
    /// looked up in the page's `/ColorSpace` resources
    fn image_color_depth(&self, page: Option<&Page>, space: &PdfObject) -> Result<ColorDepth> {
        let mut space = ColorSpace::from_object(space)?;
        if let ColorSpace::Named(name) = &space {
            if !ColorSpace::is_family_name(name) {
                let spaces = match page {
                    Some(page) => page.resource(&self.reader, "ColorSpace")?,
                    None => None,
                };
                let resource = spaces
                    .and_then(|spaces| spaces.get(name).cloned())
                    .ok_or_else(|| ParseError::UnresolvedResource(format!("color space /{name}")))?;
                space = ColorSpace::from_object(&resource)?;
            }
        }
        Ok(self.color_spaces.color_depth(&self.reader, &space)?)
    }

    /// Trailer, cross-reference table and catalog
    pub fn summary(&self) -> DocumentSummary {
        let version = self
            .reader
            .read_section(0, 16)
            .ok()
            .and_then(|lines| lines.into_iter().next())
            .and_then(|line| line.strip_prefix("%PDF-").map(|v| v.trim().to_string()));

        DocumentSummary {
            version,
            file_len: self.reader.file_len(),
            revisions: self.reader.trailer_chain().all().len(),
            trailer: self.reader.trailer().dict.clone(),
            xref: self.reader.xref().entries(),
            catalog: self.catalog.clone(),
        }
    }

    /// Resolve a value through the reader
    pub fn resolve(&self, obj: &PdfObject) -> ParseResult<PdfObject> {
        self.reader.resolve(obj)
    }
}
