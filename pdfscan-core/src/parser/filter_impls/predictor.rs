//! Predictor reversal for Flate and LZW streams
//!
//! ISO 32000-1:2008 Section 7.4.4.4: TIFF Predictor 2 (horizontal
//! differencing) and the PNG predictors 10-15, where each row carries its own
//! filter tag.

use crate::parser::objects::PdfDictionary;
use crate::parser::{ParseError, ParseResult};

/// `DecodeParms` entries that drive prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(params: Option<&PdfDictionary>) -> Self {
        let defaults = Self::default();
        let Some(params) = params else {
            return defaults;
        };
        let positive = |key: &str, default: usize| {
            params
                .get_integer(key)
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        Self {
            predictor: params.get_integer("Predictor").unwrap_or(defaults.predictor),
            colors: positive("Colors", defaults.colors),
            bits_per_component: positive("BitsPerComponent", defaults.bits_per_component),
            columns: positive("Columns", defaults.columns),
        }
    }

    fn bits_per_pixel(&self) -> ParseResult<usize> {
        self.colors
            .checked_mul(self.bits_per_component)
            .ok_or_else(|| self.overflow())
    }

    /// Bytes per complete pixel, at least one
    fn bytes_per_pixel(&self) -> ParseResult<usize> {
        Ok(self.bits_per_pixel()?.div_ceil(8).max(1))
    }

    /// Bytes of sample data per row, excluding any PNG tag byte
    fn row_len(&self) -> ParseResult<usize> {
        self.bits_per_pixel()?
            .checked_mul(self.columns)
            .map(|bits| bits.div_ceil(8))
            .ok_or_else(|| self.overflow())
    }

    fn overflow(&self) -> ParseError {
        ParseError::StreamDecodeError(format!(
            "predictor row size overflows: {} columns, {} colors, {} bits per component",
            self.columns, self.colors, self.bits_per_component
        ))
    }
}

/// Reverse the predictor described by `params`
pub fn unpredict(data: Vec<u8>, params: &PredictorParams) -> ParseResult<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        2 => unpredict_tiff(data, params),
        10..=15 => unpredict_png(&data, params),
        other => Err(ParseError::StreamDecodeError(format!(
            "unsupported predictor {other}"
        ))),
    }
}

fn unpredict_png(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    let row_len = params.row_len()?;
    // a pixel wider than the stream only ever sees zero padding on its left
    let bpp = params.bytes_per_pixel()?.min(data.len().max(1));
    let stride = row_len.checked_add(1).ok_or_else(|| params.overflow())?;
    // no row holds more samples than the stream has bytes
    let width = row_len.min(data.len()) + bpp;
    // working rows keep `bpp` zero bytes on the left so `left` never underflows
    let mut prior = vec![0u8; width];
    let mut current = vec![0u8; width];
    let mut out = Vec::with_capacity(data.len());

    for (row_index, encoded) in data.chunks(stride).enumerate() {
        let tag = encoded[0];
        let samples = &encoded[1..];

        for (i, &raw) in samples.iter().enumerate() {
            let x = i + bpp;
            let left = current[x - bpp];
            let above = prior[x];
            let upper_left = prior[x - bpp];
            current[x] = match tag {
                0 => raw,
                1 => raw.wrapping_add(left),
                2 => raw.wrapping_add(above),
                3 => raw.wrapping_add(((u16::from(left) + u16::from(above)) / 2) as u8),
                4 => raw.wrapping_add(paeth(left, above, upper_left)),
                _ => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "unknown PNG filter type {tag} in row {row_index}"
                    )))
                }
            };
        }

        // a truncated final row contributes what it has
        out.extend_from_slice(&current[bpp..bpp + samples.len()]);
        std::mem::swap(&mut prior, &mut current);
    }

    Ok(out)
}

/// Whichever neighbour is closest to `left + above - upper_left`; ties go to left, then above
fn paeth(left: u8, above: u8, upper_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(above) - i16::from(upper_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(above)).abs();
    let pc = (p - i16::from(upper_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

fn unpredict_tiff(mut data: Vec<u8>, params: &PredictorParams) -> ParseResult<Vec<u8>> {
    let colors = params.colors;
    let bpc = params.bits_per_component;
    let row_len = params.row_len()?;
    if row_len == 0 {
        return Ok(data);
    }

    for row in data.chunks_mut(row_len) {
        match bpc {
            8 => {
                for i in colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }
            16 => {
                let samples = row.len() / 2;
                for s in colors..samples {
                    let prev = u16::from_be_bytes([row[2 * (s - colors)], row[2 * (s - colors) + 1]]);
                    let cur = u16::from_be_bytes([row[2 * s], row[2 * s + 1]]);
                    row[2 * s..2 * s + 2].copy_from_slice(&cur.wrapping_add(prev).to_be_bytes());
                }
            }
            1 | 2 | 4 => {
                let samples = (params.columns * colors).min(row.len() * 8 / bpc);
                let mask = (1u8 << bpc) - 1;
                for s in colors..samples {
                    let sum = get_sample(row, s, bpc).wrapping_add(get_sample(row, s - colors, bpc));
                    set_sample(row, s, bpc, sum & mask);
                }
            }
            other => {
                return Err(ParseError::StreamDecodeError(format!(
                    "TIFF predictor does not support {other} bits per component"
                )))
            }
        }
    }

    Ok(data)
}

fn get_sample(row: &[u8], index: usize, bpc: usize) -> u8 {
    let bit = index * bpc;
    let shift = 8 - bpc - bit % 8;
    (row[bit / 8] >> shift) & ((1u8 << bpc) - 1)
}

fn set_sample(row: &mut [u8], index: usize, bpc: usize, value: u8) {
    let bit = index * bpc;
    let shift = 8 - bpc - bit % 8;
    let mask = ((1u8 << bpc) - 1) << shift;
    row[bit / 8] = (row[bit / 8] & !mask) | (value << shift);
}
