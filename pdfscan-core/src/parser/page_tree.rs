//! PDF Page Tree
//!
//! Flattens the `/Pages` tree of the document catalog into an ordered list of
//! page references (ISO 32000-1 Section 7.7.3) and materializes single pages
//! with their inherited resources.

use super::objects::{PdfDictionary, PdfObject};
use super::reader::PdfReader;
use super::{ParseError, ParseResult};
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Seek};
use tracing::{debug, warn};

/// Object number and generation of an indirect object
pub type ObjectRef = (u32, u16);

/// The document catalog with its page list
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Catalog {
    pub root_ref: ObjectRef,
    pub pages_ref: ObjectRef,
    /// Page references in reading order; page N is `pages[N - 1]`
    pub pages: Vec<ObjectRef>,
    /// Remaining catalog entries with lower-cased keys
    pub residual: BTreeMap<String, PdfObject>,
}

impl Catalog {
    /// Read the catalog named by the trailer's `/Root` and flatten its page tree
    pub fn load<R: Read + Seek>(reader: &PdfReader<R>) -> ParseResult<Self> {
        let root_ref = reader.trailer().root()?;
        let dict = reader.resolve_dict(&PdfObject::Reference(root_ref.0, root_ref.1), "Catalog")?;
        check_type(reader, &dict, "Catalog")?;

        let pages_ref = dict
            .get("Pages")
            .and_then(PdfObject::as_reference)
            .ok_or_else(|| ParseError::MissingKey("Catalog Pages".to_string()))?;
        let pages = build_page_tree(reader, pages_ref)?;
        debug!(pages = pages.len(), "page tree flattened");

        Ok(Catalog {
            root_ref,
            pages_ref,
            pages,
            residual: residual_entries(&dict, &["Type", "Pages"]),
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Reference of page `number`, counting from 1
    pub fn page_ref(&self, number: usize) -> Option<ObjectRef> {
        number.checked_sub(1).and_then(|i| self.pages.get(i)).copied()
    }
}

/// Expand a Pages node into its leaf page references, in `Kids` order.
///
/// When a node's `Count` equals the length of its `Kids`, the kids are taken
/// as pages without being read. Otherwise every kid is read: a `/Type /Page`
/// dictionary is a page, anything with `Kids` is expanded in turn.
pub fn build_page_tree<R: Read + Seek>(
    reader: &PdfReader<R>,
    pages_ref: ObjectRef,
) -> ParseResult<Vec<ObjectRef>> {
    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    expand_node(reader, pages_ref, 0, &mut visited, &mut pages)?;
    Ok(pages)
}

fn expand_node<R: Read + Seek>(
    reader: &PdfReader<R>,
    node_ref: ObjectRef,
    depth: usize,
    visited: &mut HashSet<ObjectRef>,
    pages: &mut Vec<ObjectRef>,
) -> ParseResult<()> {
    let limit = reader.options().max_tree_depth;
    if depth > limit {
        return Err(ParseError::InvalidStructure(format!(
            "page tree deeper than {limit} levels"
        )));
    }
    if !visited.insert(node_ref) {
        return Err(ParseError::CircularReference(format!(
            "page tree node {} {} R visited twice",
            node_ref.0, node_ref.1
        )));
    }

    let node = reader.resolve_dict(&PdfObject::Reference(node_ref.0, node_ref.1), "Pages node")?;
    check_type(reader, &node, "Pages")?;

    let kids_obj = node
        .get("Kids")
        .ok_or_else(|| ParseError::MissingKey("Pages Kids".to_string()))?;
    let kids = match reader.resolve(kids_obj)? {
        PdfObject::Array(kids) => kids,
        other => {
            return Err(ParseError::InvalidStructure(format!(
                "Pages Kids is not an array: {other}"
            )))
        }
    };
    let kid_refs = kids
        .iter()
        .map(|kid| {
            kid.as_reference().ok_or_else(|| {
                ParseError::InvalidStructure(format!("page tree kid {kid} is not a reference"))
            })
        })
        .collect::<ParseResult<Vec<_>>>()?;

    let count = node.get_integer("Count");
    if count == Some(kid_refs.len() as i64) {
        pages.extend(kid_refs);
        return Ok(());
    }

    for kid_ref in kid_refs {
        let kid = reader.resolve_dict(&PdfObject::Reference(kid_ref.0, kid_ref.1), "page tree kid")?;
        if kid.get_type() == Some("Page") || !kid.contains_key("Kids") {
            pages.push(kid_ref);
        } else {
            expand_node(reader, kid_ref, depth + 1, visited, pages)?;
        }
    }
    Ok(())
}

/// One page with its resources resolved
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Page {
    pub obj_ref: ObjectRef,
    /// 1-based page number
    pub number: usize,
    /// Own `/Resources`, or the nearest ancestor's
    pub resources: PdfDictionary,
    /// Content stream references (or inline streams), in drawing order
    pub contents: Vec<PdfObject>,
    /// Remaining page entries with lower-cased keys
    pub attributes: BTreeMap<String, PdfObject>,
}

impl Page {
    pub fn load<R: Read + Seek>(
        reader: &PdfReader<R>,
        obj_ref: ObjectRef,
        number: usize,
    ) -> ParseResult<Self> {
        let dict = reader.resolve_dict(&PdfObject::Reference(obj_ref.0, obj_ref.1), "Page")?;
        check_type(reader, &dict, "Page")?;

        let resources = inherited_resources(reader, &dict)?;
        let contents = match dict.get("Contents") {
            None | Some(PdfObject::Null) => Vec::new(),
            Some(PdfObject::Array(items)) => items.0.clone(),
            Some(reference @ PdfObject::Reference(..)) => match reader.resolve(reference)? {
                // a reference to an array of stream references
                PdfObject::Array(items) => items.0,
                _ => vec![reference.clone()],
            },
            Some(other) => vec![other.clone()],
        };

        Ok(Page {
            obj_ref,
            number,
            resources,
            contents,
            attributes: residual_entries(&dict, &["Type", "Parent", "Resources", "Contents"]),
        })
    }

    /// Decoded content streams joined with newlines
    pub fn content_data<R: Read + Seek>(&self, reader: &PdfReader<R>) -> ParseResult<Vec<u8>> {
        let mut data = Vec::new();
        for (i, item) in self.contents.iter().enumerate() {
            let stream = match reader.resolve(item)? {
                PdfObject::Stream(stream) => stream,
                other => {
                    return Err(ParseError::InvalidStructure(format!(
                        "page {} content entry {other} is not a stream",
                        self.number
                    )))
                }
            };
            if i > 0 {
                data.push(b'\n');
            }
            data.extend(reader.decode_stream(&stream)?);
        }
        Ok(data)
    }

    /// A resource category (`Font`, `XObject`, `ColorSpace`) as a dictionary
    pub fn resource<R: Read + Seek>(
        &self,
        reader: &PdfReader<R>,
        category: &str,
    ) -> ParseResult<Option<PdfDictionary>> {
        match self.resources.get(category) {
            None | Some(PdfObject::Null) => Ok(None),
            Some(obj) => reader.resolve_dict(obj, category).map(Some),
        }
    }
}

/// `/Resources` of the page or its closest ancestor, empty when none has any
fn inherited_resources<R: Read + Seek>(
    reader: &PdfReader<R>,
    page: &PdfDictionary,
) -> ParseResult<PdfDictionary> {
    let limit = reader.options().max_tree_depth;
    let mut node = page.clone();
    for _ in 0..=limit {
        if let Some(resources) = node.get("Resources") {
            return reader.resolve_dict(resources, "Resources");
        }
        match node.get("Parent") {
            Some(parent) => node = reader.resolve_dict(parent, "Parent")?,
            None => return Ok(PdfDictionary::new()),
        }
    }
    Err(ParseError::CircularReference(format!(
        "Parent chain longer than {limit} levels"
    )))
}

fn check_type<R: Read + Seek>(
    reader: &PdfReader<R>,
    dict: &PdfDictionary,
    expected: &str,
) -> ParseResult<()> {
    match dict.get_type() {
        Some(found) if found != expected => {
            if reader.options().strict_types {
                return Err(ParseError::InvalidStructure(format!(
                    "expected /Type /{expected}, found /{found}"
                )));
            }
            warn!(expected, found, "dictionary has unexpected /Type");
            Ok(())
        }
        _ => Ok(()),
    }
}

fn residual_entries(dict: &PdfDictionary, skip: &[&str]) -> BTreeMap<String, PdfObject> {
    dict.sorted_entries()
        .into_iter()
        .filter(|(key, _)| !skip.contains(key))
        .map(|(key, value)| (key.to_lowercase(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::{stream_body, PdfBuilder};
    use crate::parser::ReaderOptions;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn reader(pdf: Vec<u8>) -> PdfReader<Cursor<Vec<u8>>> {
        PdfReader::new(Cursor::new(pdf)).unwrap()
    }

    #[test]
    fn test_flat_kids() {
        let pdf = PdfBuilder::new()
            .object(1, b"<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, b"<< /Type /Pages /Kids [4 0 R 3 0 R] /Count 2 >>")
            .object(3, b"<< /Type /Page /Parent 2 0 R >>")
            .object(4, b"<< /Type /Page /Parent 2 0 R >>")
            .build("/Root 1 0 R");
        let catalog = Catalog::load(&reader(pdf)).unwrap();
        assert_eq!(catalog.pages, vec![(4, 0), (3, 0)]);
        assert_eq!(catalog.page_ref(1), Some((4, 0)));
        assert_eq!(catalog.page_ref(0), None);
        assert_eq!(catalog.page_ref(3), None);
    }

    #[test]
    fn test_nested_pages_nodes() {
        let pdf = PdfBuilder::new()
            .object(1, b"<< /Type /Catalog /Pages 2 0 R /PageMode /UseNone >>")
            .object(2, b"<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 4 >>")
            .object(3, b"<< /Type /Pages /Parent 2 0 R /Kids [5 0 R 6 0 R] /Count 2 >>")
            .object(4, b"<< /Type /Pages /Parent 2 0 R /Kids [7 0 R 8 0 R] /Count 2 >>")
            .object(5, b"<< /Type /Page /Parent 3 0 R >>")
            .object(6, b"<< /Type /Page /Parent 3 0 R >>")
            .object(7, b"<< /Type /Page /Parent 4 0 R >>")
            .object(8, b"<< /Type /Page /Parent 4 0 R >>")
            .build("/Root 1 0 R");
        let catalog = Catalog::load(&reader(pdf)).unwrap();
        assert_eq!(catalog.pages, vec![(5, 0), (6, 0), (7, 0), (8, 0)]);
        assert_eq!(catalog.pages_ref, (2, 0));
        assert_eq!(
            catalog.residual.get("pagemode").and_then(|v| v.as_name()).map(|n| n.as_str()),
            Some("UseNone")
        );
    }

    #[test]
    fn test_mixed_leaves_and_nodes() {
        let pdf = PdfBuilder::new()
            .object(1, b"<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, b"<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 3 >>")
            .object(3, b"<< /Type /Page /Parent 2 0 R >>")
            .object(4, b"<< /Type /Pages /Parent 2 0 R /Kids [5 0 R 6 0 R] /Count 2 >>")
            .object(5, b"<< /Type /Page /Parent 4 0 R >>")
            .object(6, b"<< /Type /Page /Parent 4 0 R >>")
            .build("/Root 1 0 R");
        let catalog = Catalog::load(&reader(pdf)).unwrap();
        assert_eq!(catalog.pages, vec![(3, 0), (5, 0), (6, 0)]);
    }

    #[test]
    fn test_cyclic_page_tree() {
        let pdf = PdfBuilder::new()
            .object(1, b"<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, b"<< /Type /Pages /Kids [3 0 R] /Count 5 >>")
            .object(3, b"<< /Type /Pages /Kids [2 0 R] /Count 5 >>")
            .build("/Root 1 0 R");
        assert!(matches!(
            Catalog::load(&reader(pdf)),
            Err(ParseError::CircularReference(_))
        ));
    }

    #[test]
    fn test_catalog_type_checked_in_strict_mode() {
        let pdf = PdfBuilder::new()
            .object(1, b"<< /Type /Outlines /Pages 2 0 R >>")
            .object(2, b"<< /Type /Pages /Kids [] /Count 0 >>")
            .build("/Root 1 0 R");
        assert!(Catalog::load(&reader(pdf.clone())).is_err());

        let lenient =
            PdfReader::new_with_options(Cursor::new(pdf), ReaderOptions::lenient()).unwrap();
        assert_eq!(Catalog::load(&lenient).unwrap().page_count(), 0);
    }

    #[test]
    fn test_missing_pages_entry() {
        let pdf = PdfBuilder::new()
            .object(1, b"<< /Type /Catalog >>")
            .build("/Root 1 0 R");
        assert!(matches!(
            Catalog::load(&reader(pdf)),
            Err(ParseError::MissingKey(_))
        ));
    }

    #[test]
    fn test_page_inherits_resources_and_joins_contents() {
        let pdf = PdfBuilder::new()
            .object(1, b"<< /Type /Catalog /Pages 2 0 R >>")
            .object(
                2,
                b"<< /Type /Pages /Kids [3 0 R] /Count 1 /Resources << /Font << /F1 6 0 R >> >> >>",
            )
            .object(
                3,
                b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents [4 0 R 5 0 R] >>",
            )
            .object(4, &stream_body("", b"BT (a) Tj ET"))
            .object(5, &stream_body("", b"BT (b) Tj ET"))
            .object(6, b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>")
            .build("/Root 1 0 R");
        let reader = reader(pdf);
        let page = Page::load(&reader, (3, 0), 1).unwrap();

        assert!(page.resources.contains_key("Font"));
        let fonts = page.resource(&reader, "Font").unwrap().unwrap();
        assert!(fonts.contains_key("F1"));
        assert_eq!(page.resource(&reader, "XObject").unwrap(), None);
        assert!(page.attributes.contains_key("mediabox"));
        assert!(!page.attributes.contains_key("parent"));

        assert_eq!(page.contents.len(), 2);
        assert_eq!(
            page.content_data(&reader).unwrap(),
            b"BT (a) Tj ET\nBT (b) Tj ET".to_vec()
        );
    }

    #[test]
    fn test_single_content_reference_and_no_contents() {
        let pdf = PdfBuilder::new()
            .object(1, b"<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, b"<< /Type /Pages /Kids [3 0 R 5 0 R] /Count 2 >>")
            .object(3, b"<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
            .object(4, &stream_body("", b"0 0 m"))
            .object(5, b"<< /Type /Page /Parent 2 0 R >>")
            .build("/Root 1 0 R");
        let reader = reader(pdf);

        let page = Page::load(&reader, (3, 0), 1).unwrap();
        assert_eq!(page.contents, vec![PdfObject::Reference(4, 0)]);
        assert_eq!(page.content_data(&reader).unwrap(), b"0 0 m".to_vec());

        let blank = Page::load(&reader, (5, 0), 2).unwrap();
        assert!(blank.contents.is_empty());
        assert!(blank.resources.is_empty());
        assert!(blank.content_data(&reader).unwrap().is_empty());
    }
}
