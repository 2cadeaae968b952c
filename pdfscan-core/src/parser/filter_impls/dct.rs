//! DCTDecode (JPEG) header inspection
//!
//! JPEG payloads are never decoded; images keep their original bytes. Only
//! the frame header is read to learn the image geometry
//! (ISO 32000-1:2008 Section 7.4.8).

use crate::parser::{ParseError, ParseResult};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
/// APP14, written by Adobe encoders
const APP14: u8 = 0xEE;

/// JPEG frame information
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct JpegInfo {
    pub width: u16,
    pub height: u16,
    /// Number of color components (1=grayscale, 3=RGB/YCbCr, 4=CMYK)
    pub components: u8,
    pub bits_per_component: u8,
    pub color_space: JpegColorSpace,
}

/// JPEG color spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum JpegColorSpace {
    Gray,
    RGB,
    CMYK,
    YCbCr,
}

/// Start-of-frame markers: SOF0-SOF15 without DHT, JPG and DAC
fn is_start_of_frame(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Markers without a length field
fn is_standalone(marker: u8) -> bool {
    matches!(marker, 0x01 | 0xD0..=0xD7)
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]))
}

/// Parse JPEG header information
pub fn parse_jpeg_info(data: &[u8]) -> ParseResult<JpegInfo> {
    let corrupt = |msg: &str| ParseError::StreamDecodeError(format!("JPEG: {msg}"));

    if !data.starts_with(&SOI) {
        return Err(corrupt("missing SOI marker"));
    }

    let mut frame: Option<(u8, u16, u16, u8)> = None;
    let mut adobe_transform: Option<u8> = None;
    let mut pos = 2;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return Err(corrupt(&format!("expected marker at offset {pos}")));
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        pos += 2;
        if marker == EOI {
            break;
        }
        if is_standalone(marker) {
            continue;
        }

        let length = read_u16(data, pos).ok_or_else(|| corrupt("segment length missing"))? as usize;
        if length < 2 || pos + length > data.len() {
            return Err(corrupt("segment extends beyond data"));
        }
        let segment = &data[pos + 2..pos + length];

        match marker {
            m if is_start_of_frame(m) => {
                if segment.len() < 6 {
                    return Err(corrupt("SOF segment too short"));
                }
                let height = u16::from_be_bytes([segment[1], segment[2]]);
                let width = u16::from_be_bytes([segment[3], segment[4]]);
                frame = Some((segment[0], width, height, segment[5]));
                // everything needed is known
                break;
            }
            APP14 if segment.starts_with(b"Adobe") && segment.len() >= 12 => {
                adobe_transform = Some(segment[11]);
            }
            SOS => return Err(corrupt("scan data before frame header")),
            _ => {}
        }
        pos += length;
    }

    let (bits_per_component, width, height, components) =
        frame.ok_or_else(|| corrupt("dimensions not found"))?;
    if width == 0 || height == 0 {
        return Err(corrupt("zero image dimension"));
    }

    let color_space = match components {
        1 => JpegColorSpace::Gray,
        3 if adobe_transform == Some(0) => JpegColorSpace::RGB,
        3 => JpegColorSpace::YCbCr,
        4 => JpegColorSpace::CMYK,
        n => return Err(corrupt(&format!("unsupported component count {n}"))),
    };

    Ok(JpegInfo {
        width,
        height,
        components,
        bits_per_component,
        color_space,
    })
}
