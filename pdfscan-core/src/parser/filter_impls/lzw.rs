//! LZWDecode filter implementation
//!
//! Variable-width (9 to 12 bit) LZW as described in ISO 32000-1:2008
//! Section 7.4.4. Codes are read most significant bit first.

use crate::parser::{ParseError, ParseResult};

const CLEAR_TABLE: u16 = 256;
const END_OF_DATA: u16 = 257;
const FIRST_FREE: usize = 258;
const MAX_ENTRIES: usize = 4096;

/// One string in the table, stored as its prefix code plus a final byte
#[derive(Debug, Clone, Copy)]
struct Entry {
    length: usize,
    head: u16,
    tail: u8,
}

struct Table {
    entries: Vec<Entry>,
}

impl Table {
    fn new() -> Self {
        let mut entries = Vec::with_capacity(MAX_ENTRIES);
        entries.extend((0..=255u8).map(|b| Entry {
            length: 1,
            head: 0,
            tail: b,
        }));
        // clear and end-of-data occupy 256 and 257
        entries.extend([Entry {
            length: 0,
            head: 0,
            tail: 0,
        }; 2]);
        Self { entries }
    }

    fn reset(&mut self) {
        self.entries.truncate(FIRST_FREE);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn code_width(&self, early_change: bool) -> u32 {
        match self.len() + usize::from(early_change) {
            n if n >= 2048 => 12,
            n if n >= 1024 => 11,
            n if n >= 512 => 10,
            _ => 9,
        }
    }

    fn first_byte(&self, mut code: u16) -> u8 {
        while self.entries[code as usize].length > 1 {
            code = self.entries[code as usize].head;
        }
        self.entries[code as usize].tail
    }

    fn add(&mut self, head: u16, tail: u8) -> ParseResult<()> {
        if self.len() >= MAX_ENTRIES {
            return Err(ParseError::Corrupt(format!(
                "LZW table grew past {MAX_ENTRIES} entries"
            )));
        }
        let length = self.entries[head as usize].length + 1;
        self.entries.push(Entry { length, head, tail });
        Ok(())
    }

    /// Append the string for `code` to `out`
    fn write(&self, code: u16, out: &mut Vec<u8>) {
        let length = self.entries[code as usize].length;
        let start = out.len();
        out.resize(start + length, 0);
        let mut code = code;
        for slot in out[start..].iter_mut().rev() {
            let entry = self.entries[code as usize];
            *slot = entry.tail;
            code = entry.head;
        }
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Next `width` bits, `None` once fewer than `width` bits remain
    fn read(&mut self, width: u32) -> Option<u16> {
        if self.bit_pos + width as usize > self.data.len() * 8 {
            return None;
        }
        let mut value = 0u16;
        for _ in 0..width {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            value = (value << 1) | u16::from(bit);
            self.bit_pos += 1;
        }
        Some(value)
    }
}

/// Decode LZW compressed data.
///
/// With `early_change` the code width grows one code before the table
/// reaches 512, 1024 and 2048 entries (the PDF default). A stream that runs
/// out of bits without an end-of-data code yields what was decoded so far.
pub fn decode_lzw(data: &[u8], early_change: bool) -> ParseResult<Vec<u8>> {
    let mut table = Table::new();
    let mut bits = BitReader::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut prev: Option<u16> = None;

    while let Some(code) = bits.read(table.code_width(early_change)) {
        match code {
            CLEAR_TABLE => {
                table.reset();
                prev = None;
            }
            END_OF_DATA => break,
            _ => {
                let Some(prev_code) = prev else {
                    if code > 255 {
                        return Err(ParseError::Corrupt(format!(
                            "LZW code {code} before any literal"
                        )));
                    }
                    out.push(code as u8);
                    prev = Some(code);
                    continue;
                };

                let next = table.len();
                let first = match (code as usize).cmp(&next) {
                    std::cmp::Ordering::Less => table.first_byte(code),
                    // the code being defined right now: prev + first byte of prev
                    std::cmp::Ordering::Equal => table.first_byte(prev_code),
                    std::cmp::Ordering::Greater => {
                        return Err(ParseError::Corrupt(format!(
                            "LZW code {code} beyond next free index {next}"
                        )))
                    }
                };
                table.add(prev_code, first)?;
                table.write(code, &mut out);
                prev = Some(code);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pack codes MSB first, following the decoder's width schedule
    fn pack(codes: &[u16], early_change: bool) -> Vec<u8> {
        let mut out = Vec::new();
        let (mut acc, mut nbits) = (0u64, 0u32);
        let mut table_len = FIRST_FREE;
        let mut have_prev = false;
        for &code in codes {
            let width = match table_len + usize::from(early_change) {
                n if n >= 2048 => 12,
                n if n >= 1024 => 11,
                n if n >= 512 => 10,
                _ => 9,
            };
            acc = (acc << width) | u64::from(code);
            nbits += width;
            while nbits >= 8 {
                nbits -= 8;
                out.push((acc >> nbits) as u8);
            }
            acc &= (1 << nbits) - 1;
            match code {
                CLEAR_TABLE => {
                    table_len = FIRST_FREE;
                    have_prev = false;
                }
                END_OF_DATA => {}
                _ if have_prev => table_len += 1,
                _ => have_prev = true,
            }
        }
        if nbits > 0 {
            out.push((acc << (8 - nbits)) as u8);
        }
        out
    }

    #[test]
    fn test_known_vector_with_early_change() {
        let encoded = [0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        assert_eq!(
            decode_lzw(&encoded, true).unwrap(),
            vec![45, 45, 45, 45, 45, 65, 45, 45, 45, 66]
        );
    }

    #[test]
    fn test_literal_codes_only() {
        let original = b"literal bytes, no repeats needed";
        let mut codes = vec![CLEAR_TABLE];
        codes.extend(original.iter().map(|&b| u16::from(b)));
        codes.push(END_OF_DATA);
        assert_eq!(decode_lzw(&pack(&codes, true), true).unwrap(), original);
    }

    #[test]
    fn test_code_defined_by_itself() {
        // A, AA (258 is still being defined), AAA (259 likewise)
        let codes = [CLEAR_TABLE, 65, 258, 259, END_OF_DATA];
        assert_eq!(decode_lzw(&pack(&codes, true), true).unwrap(), b"AAAAAA");
    }

    #[test]
    fn test_clear_resets_table() {
        let codes = [CLEAR_TABLE, 66, 67, 258, CLEAR_TABLE, 68, 258, END_OF_DATA];
        // after the second clear 258 is "DD", not "BC"
        assert_eq!(decode_lzw(&pack(&codes, false), false).unwrap(), b"BCBCDDD");
    }

    #[test]
    fn test_missing_end_of_data() {
        let codes = [CLEAR_TABLE, 72, 105];
        assert_eq!(decode_lzw(&pack(&codes, true), true).unwrap(), b"Hi");
    }

    #[test]
    fn test_code_beyond_table_is_corrupt() {
        let codes = [CLEAR_TABLE, 65, 300, END_OF_DATA];
        assert!(matches!(
            decode_lzw(&pack(&codes, true), true),
            Err(ParseError::Corrupt(_))
        ));
    }

    #[test]
    fn test_first_code_must_be_literal() {
        let codes = [CLEAR_TABLE, 258, END_OF_DATA];
        assert!(matches!(
            decode_lzw(&pack(&codes, true), true),
            Err(ParseError::Corrupt(_))
        ));
    }

    #[test]
    fn test_table_overflow_is_corrupt() {
        let mut codes = vec![CLEAR_TABLE];
        codes.extend(std::iter::repeat(65).take(MAX_ENTRIES - FIRST_FREE + 2));
        codes.push(END_OF_DATA);
        assert!(matches!(
            decode_lzw(&pack(&codes, true), true),
            Err(ParseError::Corrupt(_))
        ));

        // one code fewer fills the table exactly
        let mut codes = vec![CLEAR_TABLE];
        codes.extend(std::iter::repeat(65).take(MAX_ENTRIES - FIRST_FREE + 1));
        codes.push(END_OF_DATA);
        let decoded = decode_lzw(&pack(&codes, true), true).unwrap();
        assert_eq!(decoded.len(), MAX_ENTRIES - FIRST_FREE + 1);
    }
}
