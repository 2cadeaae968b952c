//! PDF stream filter implementations
//!
//! LZW decompression, predictor reversal and JPEG header inspection
//! according to ISO 32000-1:2008 Section 7.4

pub mod dct;
pub mod lzw;
pub mod predictor;

pub use dct::{parse_jpeg_info, JpegColorSpace, JpegInfo};
pub use lzw::decode_lzw;
pub use predictor::{unpredict, PredictorParams};
