//! PDF Stream Filters
//!
//! Handles decompression and decoding of PDF streams according to ISO 32000-1 Section 7.4.
//! Only FlateDecode, LZWDecode and DCTDecode (passed through) are understood, and
//! only one filter per stream.

use super::filter_impls::{lzw, predictor};
use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

#[cfg(feature = "compression")]
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
#[cfg(feature = "compression")]
use std::io::Read;

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// LZW decode
    LZWDecode,

    /// Flate decode (zlib/deflate compression)
    FlateDecode,

    /// DCT decode (JPEG), passed through untouched
    DCTDecode,
}

impl Filter {
    /// Parse filter from name, including the inline-image abbreviations
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "DCTDecode" | "DCT" => Some(Filter::DCTDecode),
            _ => None,
        }
    }

    /// Filter declared by a stream dictionary, `None` for unfiltered data
    pub fn from_dict(dict: &PdfDictionary) -> ParseResult<Option<Self>> {
        let name = match dict.get("Filter") {
            None | Some(PdfObject::Null) => return Ok(None),
            Some(PdfObject::Name(name)) => name.as_str(),
            Some(PdfObject::Array(array)) => match array.0.as_slice() {
                [] => return Ok(None),
                [PdfObject::Name(name)] => name.as_str(),
                [_] => {
                    return Err(ParseError::UnsupportedFilter(format!(
                        "filter array entry is not a name: {array:?}"
                    )))
                }
                many => {
                    return Err(ParseError::UnsupportedFilter(format!(
                        "filter pipelines are not supported ({} filters)",
                        many.len()
                    )))
                }
            },
            Some(other) => {
                return Err(ParseError::UnsupportedFilter(format!(
                    "invalid Filter value {other}"
                )))
            }
        };
        Filter::from_name(name)
            .map(Some)
            .ok_or_else(|| ParseError::UnsupportedFilter(name.to_string()))
    }
}

/// Decode stream data: decompress, then reverse any predictor
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let decompressed = decompress(data, dict)?;
    unpredict(decompressed, dict)
}

/// Apply the declared filter
pub fn decompress(data: &[u8], dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let params = decode_params(dict);
    match Filter::from_dict(dict)? {
        None => Ok(data.to_vec()),
        Some(filter) => apply_filter(data, filter, params),
    }
}

/// Reverse the PNG/TIFF predictor named in `DecodeParms`, if any
pub fn unpredict(data: Vec<u8>, dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    // JPEG data never carries a predictor
    if Filter::from_dict(dict)? == Some(Filter::DCTDecode) {
        return Ok(data);
    }
    let params = predictor::PredictorParams::from_dict(decode_params(dict));
    predictor::unpredict(data, &params)
}

/// `DecodeParms` as a dictionary; a one-element array is that dictionary
fn decode_params(dict: &PdfDictionary) -> Option<&PdfDictionary> {
    match dict.get("DecodeParms").or_else(|| dict.get("DP"))? {
        PdfObject::Dictionary(params) => Some(params),
        PdfObject::Array(array) => array.get(0).and_then(|p| p.as_dict()),
        _ => None,
    }
}

/// Apply a single filter to data
fn apply_filter(
    data: &[u8],
    filter: Filter,
    params: Option<&PdfDictionary>,
) -> ParseResult<Vec<u8>> {
    match filter {
        Filter::FlateDecode => decode_flate(data),
        Filter::LZWDecode => {
            let early_change = params
                .and_then(|p| p.get_integer("EarlyChange"))
                .unwrap_or(1);
            lzw::decode_lzw(data, early_change != 0)
        }
        Filter::DCTDecode => Ok(data.to_vec()),
    }
}

/// Decode FlateDecode data: zlib, then gzip framing, then raw deflate
#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let zlib_err = match ZlibDecoder::new(data).read_to_end(&mut result) {
        Ok(_) => return Ok(result),
        Err(e) => e,
    };

    if data.starts_with(&[0x1f, 0x8b]) {
        result.clear();
        if GzDecoder::new(data).read_to_end(&mut result).is_ok() {
            tracing::debug!("flate stream used gzip framing");
            return Ok(result);
        }
    }

    result.clear();
    match DeflateDecoder::new(data).read_to_end(&mut result) {
        Ok(_) if !result.is_empty() || data.is_empty() => {
            tracing::debug!("flate stream had no zlib header");
            Ok(result)
        }
        _ => Err(ParseError::StreamDecodeError(format!(
            "Flate decode error: {zlib_err}"
        ))),
    }
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> ParseResult<Vec<u8>> {
    Err(ParseError::StreamDecodeError(
        "FlateDecode requires 'compression' feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfName};

    fn dict_with(entries: Vec<(&str, PdfObject)>) -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        for (key, value) in entries {
            dict.insert(key.to_string(), value);
        }
        dict
    }

    fn name(n: &str) -> PdfObject {
        PdfObject::Name(PdfName(n.to_string()))
    }

    #[test]
    fn test_filter_from_name() {
        assert_eq!(Filter::from_name("FlateDecode"), Some(Filter::FlateDecode));
        assert_eq!(Filter::from_name("Fl"), Some(Filter::FlateDecode));
        assert_eq!(Filter::from_name("LZWDecode"), Some(Filter::LZWDecode));
        assert_eq!(Filter::from_name("DCTDecode"), Some(Filter::DCTDecode));
        assert_eq!(Filter::from_name("ASCII85Decode"), None);
        assert_eq!(Filter::from_name("JPXDecode"), None);
    }

    #[test]
    fn test_decode_stream_no_filter() {
        let data = b"plain";
        assert_eq!(decode_stream(data, &PdfDictionary::new()).unwrap(), data);
    }

    #[test]
    fn test_unknown_filter_is_unsupported() {
        let dict = dict_with(vec![("Filter", name("RunLengthDecode"))]);
        match decode_stream(b"x", &dict) {
            Err(ParseError::UnsupportedFilter(f)) => assert_eq!(f, "RunLengthDecode"),
            other => panic!("expected UnsupportedFilter, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_arrays() {
        let single = dict_with(vec![(
            "Filter",
            PdfObject::Array(PdfArray(vec![name("DCTDecode")])),
        )]);
        assert_eq!(decode_stream(b"\xff\xd8", &single).unwrap(), b"\xff\xd8");

        let pipeline = dict_with(vec![(
            "Filter",
            PdfObject::Array(PdfArray(vec![name("ASCII85Decode"), name("FlateDecode")])),
        )]);
        assert!(matches!(
            decode_stream(b"x", &pipeline),
            Err(ParseError::UnsupportedFilter(_))
        ));
    }

    #[test]
    fn test_invalid_filter_type() {
        let dict = dict_with(vec![("Filter", PdfObject::Integer(3))]);
        assert!(decode_stream(b"x", &dict).is_err());
    }

    #[test]
    fn test_lzw_with_early_change_param() {
        let mut params = PdfDictionary::new();
        params.insert("EarlyChange".to_string(), PdfObject::Integer(1));
        let dict = dict_with(vec![
            ("Filter", name("LZWDecode")),
            ("DecodeParms", PdfObject::Dictionary(params)),
        ]);
        let encoded = [0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        assert_eq!(
            decode_stream(&encoded, &dict).unwrap(),
            vec![45, 45, 45, 45, 45, 65, 45, 45, 45, 66]
        );
    }

    #[cfg(feature = "compression")]
    mod flate {
        use super::*;
        use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
        use flate2::Compression;
        use std::io::Write;

        const ORIGINAL: &[u8] = b"Hello, compressed world!";

        #[test]
        fn test_flate_decode() {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(ORIGINAL).unwrap();
            let compressed = encoder.finish().unwrap();
            assert_eq!(decode_flate(&compressed).unwrap(), ORIGINAL);
        }

        #[test]
        fn test_flate_falls_back_to_gzip() {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(ORIGINAL).unwrap();
            let compressed = encoder.finish().unwrap();
            assert_eq!(decode_flate(&compressed).unwrap(), ORIGINAL);
        }

        #[test]
        fn test_flate_falls_back_to_raw_deflate() {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(ORIGINAL).unwrap();
            let compressed = encoder.finish().unwrap();
            assert_eq!(decode_flate(&compressed).unwrap(), ORIGINAL);
        }

        #[test]
        fn test_flate_with_png_predictor() {
            // two rows of 3 bytes, both tagged Up
            let predicted = [2u8, 1, 2, 3, 2, 1, 1, 1];
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&predicted).unwrap();
            let compressed = encoder.finish().unwrap();

            let mut params = PdfDictionary::new();
            params.insert("Predictor".to_string(), PdfObject::Integer(12));
            params.insert("Columns".to_string(), PdfObject::Integer(3));
            let dict = dict_with(vec![
                ("Filter", name("FlateDecode")),
                ("DecodeParms", PdfObject::Dictionary(params)),
            ]);
            assert_eq!(
                decode_stream(&compressed, &dict).unwrap(),
                vec![1, 2, 3, 2, 3, 4]
            );
        }

        #[test]
        fn test_flate_garbage_is_an_error() {
            assert!(matches!(
                decode_flate(b"\x00\x01definitely not deflate"),
                Err(ParseError::StreamDecodeError(_))
            ));
        }
    }

    #[cfg(not(feature = "compression"))]
    #[test]
    fn test_flate_decode_not_supported() {
        assert!(decode_flate(b"compressed data").is_err());
    }
}
