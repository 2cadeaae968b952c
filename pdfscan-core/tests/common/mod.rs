//! Shared helpers for building small PDF files in memory
#![allow(dead_code)]

/// Builds one revision of a PDF file from numbered object bodies
pub struct PdfBuilder {
    objects: Vec<(u32, Vec<u8>)>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    pub fn object(mut self, num: u32, body: impl AsRef<[u8]>) -> Self {
        self.objects.push((num, body.as_ref().to_vec()));
        self
    }

    /// Header, objects, xref table and a trailer with `/Size` plus `trailer_entries`
    pub fn build(self, trailer_entries: &str) -> Vec<u8> {
        let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let offsets = write_objects(&mut pdf, &self.objects);
        write_xref(&mut pdf, &offsets, trailer_entries, None);
        pdf
    }
}

/// Append an incremental update redefining `objects`, chained through `/Prev`
pub fn append_update(mut pdf: Vec<u8>, objects: &[(u32, Vec<u8>)], trailer_entries: &str) -> Vec<u8> {
    let prev = startxref_of(&pdf);
    pdf.push(b'\n');
    let offsets = write_objects(&mut pdf, objects);
    write_xref(&mut pdf, &offsets, trailer_entries, Some(prev));
    pdf
}

/// Offset recorded after the last `startxref`
pub fn startxref_of(pdf: &[u8]) -> u64 {
    let text = String::from_utf8_lossy(pdf);
    let at = text.rfind("startxref").expect("no startxref");
    text[at + "startxref".len()..]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .expect("bad startxref")
}

/// `<< extra /Length n >> stream ... endstream`
pub fn stream(extra_entries: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!("<< {extra_entries} /Length {} >>\nstream\n", data.len()).into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(b"\nendstream");
    body
}

/// zlib-compress `data`
#[cfg(feature = "compression")]
pub fn zlib(data: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("write to Vec");
    encoder.finish().expect("finish zlib stream")
}

/// LZW-encode `data` using literal codes only, clearing the table before it
/// would overflow
pub fn lzw_literals(data: &[u8], early_change: bool) -> Vec<u8> {
    const CLEAR: u16 = 256;
    const EOD: u16 = 257;

    let mut codes = vec![CLEAR];
    for (i, &b) in data.iter().enumerate() {
        if i > 0 && i % 1000 == 0 {
            codes.push(CLEAR);
        }
        codes.push(u16::from(b));
    }
    codes.push(EOD);

    let mut out = Vec::new();
    let (mut acc, mut nbits) = (0u64, 0u32);
    let mut table_len = 258usize;
    let mut have_prev = false;
    for code in codes {
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
            CLEAR => {
                table_len = 258;
                have_prev = false;
            }
            EOD => {}
            _ if have_prev => table_len += 1,
            _ => have_prev = true,
        }
    }
    if nbits > 0 {
        out.push((acc << (8 - nbits)) as u8);
    }
    out
}

/// Apply one PNG filter type to every row and prefix the tag bytes
pub fn png_predict(rows: &[Vec<u8>], tag: u8, bpp: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut prior = vec![0u8; rows.first().map_or(0, Vec::len)];
    for row in rows {
        out.push(tag);
        for i in 0..row.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let above = prior[i];
            let upper_left = if i >= bpp { prior[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => above,
                3 => ((u16::from(left) + u16::from(above)) / 2) as u8,
                _ => paeth(left, above, upper_left),
            };
            out.push(row[i].wrapping_sub(predicted));
        }
        prior = row.clone();
    }
    out
}

fn paeth(left: u8, above: u8, upper_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(above) - i16::from(upper_left);
    let (pa, pb, pc) = (
        (p - i16::from(left)).abs(),
        (p - i16::from(above)).abs(),
        (p - i16::from(upper_left)).abs(),
    );
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

fn write_objects(pdf: &mut Vec<u8>, objects: &[(u32, Vec<u8>)]) -> Vec<(u32, usize)> {
    let mut offsets = Vec::new();
    for (num, body) in objects {
        offsets.push((*num, pdf.len()));
        pdf.extend_from_slice(format!("{num} 0 obj\n").as_bytes());
        pdf.extend_from_slice(body);
        pdf.extend_from_slice(b"\nendobj\n");
    }
    offsets
}

fn write_xref(pdf: &mut Vec<u8>, offsets: &[(u32, usize)], trailer_entries: &str, prev: Option<u64>) {
    let xref_start = pdf.len();
    let size = offsets.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
    let mut xref = String::from("xref\n0 1\n0000000000 65535 f\r\n");
    for (num, offset) in offsets {
        xref.push_str(&format!("{num} 1\n{offset:010} 00000 n\r\n"));
    }
    let prev = prev.map(|p| format!(" /Prev {p}")).unwrap_or_default();
    xref.push_str(&format!(
        "trailer\n<< /Size {size} {trailer_entries}{prev} >>\nstartxref\n{xref_start}\n%%EOF\n"
    ));
    pdf.extend_from_slice(xref.as_bytes());
}
