//! Color spaces of image XObjects
//!
//! Only the number of color components per pixel is computed; nothing is
//! converted or rendered. See ISO 32000-1 Section 8.6.

use super::objects::PdfObject;
use super::reader::PdfReader;
use super::{ParseError, ParseResult};
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::sync::RwLock;
use tracing::{debug, trace};

/// A `/ColorSpace` value, classified once when it is read
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    /// `/DeviceRGB`, `/Pattern`, or a resource name such as `/CS0`
    Named(String),
    /// `[/ICCBased 7 0 R]`, `[/Indexed /DeviceRGB 255 <...>]`, ...
    Compound { name: String, args: Vec<PdfObject> },
    /// An indirect reference to either of the above
    Reference(u32, u16),
}

impl ColorSpace {
    pub fn from_object(obj: &PdfObject) -> ParseResult<Self> {
        match obj {
            PdfObject::Name(name) => Ok(ColorSpace::Named(name.as_str().to_string())),
            PdfObject::Reference(num, gen) => Ok(ColorSpace::Reference(*num, *gen)),
            PdfObject::Array(array) => match array.0.split_first() {
                Some((PdfObject::Name(name), args)) => Ok(ColorSpace::Compound {
                    name: name.as_str().to_string(),
                    args: args.to_vec(),
                }),
                _ => Err(ParseError::UnsupportedColorSpace(format!(
                    "color space array {obj}"
                ))),
            },
            other => Err(ParseError::UnsupportedColorSpace(format!("{other}"))),
        }
    }

    /// Family name (`DeviceRGB`, `ICCBased`, ...); `None` for references
    pub fn family(&self) -> Option<&str> {
        match self {
            ColorSpace::Named(name) => Some(name),
            ColorSpace::Compound { name, .. } => Some(name),
            ColorSpace::Reference(..) => None,
        }
    }

    /// Whether a bare name is one of the predefined families rather than a
    /// resource name
    pub fn is_family_name(name: &str) -> bool {
        named_components(name).is_some() || name == "Pattern"
    }
}

/// Components per pixel
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ColorDepth {
    Components(u32),
    /// Pattern spaces: the arguments are kept as-is
    Deferred(Vec<PdfObject>),
}

impl ColorDepth {
    pub fn components(&self) -> Option<u32> {
        match self {
            ColorDepth::Components(n) => Some(*n),
            ColorDepth::Deferred(_) => None,
        }
    }
}

fn named_components(name: &str) -> Option<u32> {
    match name {
        "DeviceGray" | "G" | "CalGray" | "Indexed" | "I" | "Separation" => Some(1),
        "DeviceRGB" | "RGB" | "CalRGB" | "Lab" => Some(3),
        "DeviceCMYK" | "CMYK" => Some(4),
        _ => None,
    }
}

/// Computes color depths, caching results for color spaces reached through
/// an indirect reference
#[derive(Debug, Default)]
pub struct ColorSpaceResolver {
    cache: RwLock<HashMap<(u32, u16), ColorDepth>>,
}

impl ColorSpaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached color spaces
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn color_depth<R: Read + Seek>(
        &self,
        reader: &PdfReader<R>,
        space: &ColorSpace,
    ) -> ParseResult<ColorDepth> {
        self.depth_at(reader, space, 0)
    }

    fn depth_at<R: Read + Seek>(
        &self,
        reader: &PdfReader<R>,
        space: &ColorSpace,
        depth: usize,
    ) -> ParseResult<ColorDepth> {
        let limit = reader.options().max_tree_depth;
        if depth > limit {
            return Err(ParseError::CircularReference(format!(
                "color space nested deeper than {limit} levels"
            )));
        }
        trace!(?space, depth, "resolving color space");

        match space {
            ColorSpace::Named(name) if name == "Pattern" => Ok(ColorDepth::Deferred(Vec::new())),
            ColorSpace::Named(name) => named_components(name)
                .map(ColorDepth::Components)
                .ok_or_else(|| ParseError::UnsupportedColorSpace(name.clone())),
            ColorSpace::Reference(num, gen) => {
                let key = (*num, *gen);
                if let Some(hit) = self.cache.read().ok().and_then(|c| c.get(&key).cloned()) {
                    return Ok(hit);
                }
                let target = reader.resolve(&PdfObject::Reference(*num, *gen))?;
                let result = self.depth_at(reader, &ColorSpace::from_object(&target)?, depth + 1)?;
                if let Ok(mut cache) = self.cache.write() {
                    cache.insert(key, result.clone());
                }
                Ok(result)
            }
            ColorSpace::Compound { name, args } => {
                self.compound_depth(reader, name, args, depth)
            }
        }
    }

    fn compound_depth<R: Read + Seek>(
        &self,
        reader: &PdfReader<R>,
        name: &str,
        args: &[PdfObject],
        depth: usize,
    ) -> ParseResult<ColorDepth> {
        match name {
            "ICCBased" => {
                let profile = args.first().ok_or_else(|| {
                    ParseError::UnsupportedColorSpace("ICCBased without a profile".to_string())
                })?;
                let dict = reader.resolve_dict(profile, "ICC profile")?;
                if let Some(n) = dict.get_integer("N").and_then(|n| u32::try_from(n).ok()) {
                    return Ok(ColorDepth::Components(n));
                }
                match dict.get("Alternate") {
                    Some(alternate) => {
                        debug!("ICC profile without /N, using its alternate space");
                        let alternate = ColorSpace::from_object(alternate)?;
                        self.depth_at(reader, &alternate, depth + 1)
                    }
                    None => Err(ParseError::MissingKey("ICC profile N".to_string())),
                }
            }
            "DeviceN" => {
                let names = args.first().ok_or_else(|| {
                    ParseError::UnsupportedColorSpace("DeviceN without colorants".to_string())
                })?;
                match reader.resolve(names)? {
                    PdfObject::Array(names) => Ok(ColorDepth::Components(names.len() as u32)),
                    other => Err(ParseError::UnsupportedColorSpace(format!(
                        "DeviceN colorants {other}"
                    ))),
                }
            }
            "Pattern" => Ok(ColorDepth::Deferred(args.to_vec())),
            // `[/DeviceRGB]`, `[/CalRGB << ... >>]`, `[/Indexed base hival lookup]`
            other => named_components(other)
                .map(ColorDepth::Components)
                .ok_or_else(|| ParseError::UnsupportedColorSpace(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfName};
    use crate::parser::test_helpers::{stream_body, PdfBuilder};
    use std::io::Cursor;

    fn name(n: &str) -> PdfObject {
        PdfObject::Name(PdfName(n.to_string()))
    }

    fn compound(items: Vec<PdfObject>) -> ColorSpace {
        ColorSpace::from_object(&PdfObject::Array(PdfArray(items))).unwrap()
    }

    fn reader_with(objects: Vec<(u32, Vec<u8>)>) -> PdfReader<Cursor<Vec<u8>>> {
        let mut builder = PdfBuilder::new()
            .object(1, b"<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, b"<< /Type /Pages /Kids [] /Count 0 >>");
        for (num, body) in objects {
            builder = builder.object(num, &body);
        }
        PdfReader::new(Cursor::new(builder.build("/Root 1 0 R"))).unwrap()
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            ColorSpace::from_object(&name("DeviceRGB")).unwrap(),
            ColorSpace::Named("DeviceRGB".to_string())
        );
        assert_eq!(
            ColorSpace::from_object(&PdfObject::Reference(5, 0)).unwrap(),
            ColorSpace::Reference(5, 0)
        );
        let space = compound(vec![name("ICCBased"), PdfObject::Reference(7, 0)]);
        assert_eq!(space.family(), Some("ICCBased"));
        assert!(ColorSpace::from_object(&PdfObject::Integer(3)).is_err());
        assert!(ColorSpace::from_object(&PdfObject::Array(PdfArray::new())).is_err());
    }

    #[test]
    fn test_device_and_cie_spaces() {
        let reader = reader_with(Vec::new());
        let resolver = ColorSpaceResolver::new();
        for (family, expected) in [
            ("DeviceGray", 1),
            ("DeviceRGB", 3),
            ("DeviceCMYK", 4),
            ("CalGray", 1),
            ("Lab", 3),
        ] {
            let depth = resolver
                .color_depth(&reader, &ColorSpace::Named(family.to_string()))
                .unwrap();
            assert_eq!(depth, ColorDepth::Components(expected), "{family}");
        }
        let cal_rgb = compound(vec![name("CalRGB"), PdfObject::Dictionary(Default::default())]);
        assert_eq!(
            resolver.color_depth(&reader, &cal_rgb).unwrap(),
            ColorDepth::Components(3)
        );
    }

    #[test]
    fn test_special_spaces() {
        let reader = reader_with(Vec::new());
        let resolver = ColorSpaceResolver::new();
        let indexed = compound(vec![
            name("Indexed"),
            name("DeviceRGB"),
            PdfObject::Integer(255),
            PdfObject::HexString("000000FFFFFF".to_string()),
        ]);
        assert_eq!(resolver.color_depth(&reader, &indexed).unwrap().components(), Some(1));

        let separation = compound(vec![name("Separation"), name("Spot"), name("DeviceCMYK")]);
        assert_eq!(resolver.color_depth(&reader, &separation).unwrap().components(), Some(1));

        let device_n = compound(vec![
            name("DeviceN"),
            PdfObject::Array(PdfArray(vec![name("Cyan"), name("Magenta"), name("Spot")])),
            name("DeviceCMYK"),
        ]);
        assert_eq!(resolver.color_depth(&reader, &device_n).unwrap().components(), Some(3));

        let pattern = compound(vec![name("Pattern"), name("DeviceRGB")]);
        assert_eq!(
            resolver.color_depth(&reader, &pattern).unwrap(),
            ColorDepth::Deferred(vec![name("DeviceRGB")])
        );
    }

    #[test]
    fn test_icc_based_through_references() {
        let reader = reader_with(vec![
            (5, b"[/ICCBased 6 0 R]".to_vec()),
            (6, stream_body("/N 4", b"icc profile bytes")),
            (7, stream_body("/Alternate /DeviceRGB", b"icc")),
        ]);
        let resolver = ColorSpaceResolver::new();
        assert_eq!(
            resolver.color_depth(&reader, &ColorSpace::Reference(5, 0)).unwrap(),
            ColorDepth::Components(4)
        );
        assert_eq!(resolver.len(), 1);

        let alternate = compound(vec![name("ICCBased"), PdfObject::Reference(7, 0)]);
        assert_eq!(
            resolver.color_depth(&reader, &alternate).unwrap(),
            ColorDepth::Components(3)
        );
    }

    #[test]
    fn test_unknown_and_cyclic_spaces() {
        let reader = reader_with(vec![
            (5, b"6 0 R".to_vec()),
            (6, b"[/Indexed 5 0 R 1 <00>]".to_vec()),
            (8, b"9 0 R".to_vec()),
            (9, b"8 0 R".to_vec()),
        ]);
        let resolver = ColorSpaceResolver::new();
        assert!(matches!(
            resolver.color_depth(&reader, &ColorSpace::Named("CS0".to_string())),
            Err(ParseError::UnsupportedColorSpace(_))
        ));
        // Indexed does not look at its base, so this chain ends
        assert_eq!(
            resolver.color_depth(&reader, &ColorSpace::Reference(5, 0)).unwrap(),
            ColorDepth::Components(1)
        );
        assert!(matches!(
            resolver.color_depth(&reader, &ColorSpace::Reference(8, 0)),
            Err(ParseError::CircularReference(_))
        ));
    }
}
