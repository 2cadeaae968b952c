//! Helper functions for creating valid test PDFs with correct offsets

/// Builds a single-revision PDF from numbered object bodies
pub struct PdfBuilder {
    objects: Vec<(u32, Vec<u8>)>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Add `num 0 obj <body> endobj`
    pub fn object(mut self, num: u32, body: &[u8]) -> Self {
        self.objects.push((num, body.to_vec()));
        self
    }

    /// Finish with an xref table and a trailer holding `/Size` plus `trailer_entries`
    pub fn build(self, trailer_entries: &str) -> Vec<u8> {
        let mut content = b"%PDF-1.4\n".to_vec();
        let offsets = write_objects(&mut content, &self.objects);
        write_xref(&mut content, &offsets, trailer_entries, None);
        content
    }
}

/// Append an incremental update that redefines `objects`
pub fn append_update(mut base: Vec<u8>, objects: &[(u32, &[u8])], trailer_entries: &str) -> Vec<u8> {
    let prev = last_startxref(&base);
    base.push(b'\n');
    let owned: Vec<(u32, Vec<u8>)> = objects.iter().map(|(n, b)| (*n, b.to_vec())).collect();
    let offsets = write_objects(&mut base, &owned);
    write_xref(&mut base, &offsets, trailer_entries, Some(prev));
    base
}

/// `<< extra /Length n >> stream ... endstream`
pub fn stream_body(extra_entries: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!("<< {extra_entries} /Length {} >>\nstream\n", data.len()).into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(b"\nendstream");
    body
}

/// Creates a minimal valid PDF with correct xref offsets
pub fn create_minimal_pdf() -> Vec<u8> {
    PdfBuilder::new()
        .object(1, b"<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, b"<< /Type /Pages /Kids [] /Count 0 >>")
        .build("/Root 1 0 R")
}

fn write_objects(content: &mut Vec<u8>, objects: &[(u32, Vec<u8>)]) -> Vec<(u32, usize)> {
    let mut offsets = Vec::new();
    for (num, body) in objects {
        offsets.push((*num, content.len()));
        content.extend_from_slice(format!("{num} 0 obj\n").as_bytes());
        content.extend_from_slice(body);
        content.extend_from_slice(b"\nendobj\n");
    }
    offsets
}

fn write_xref(
    content: &mut Vec<u8>,
    offsets: &[(u32, usize)],
    trailer_entries: &str,
    prev: Option<usize>,
) {
    let xref_start = content.len();
    let size = offsets.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
    let mut xref = String::from("xref\n0 1\n0000000000 65535 f \n");
    for (num, offset) in offsets {
        xref.push_str(&format!("{num} 1\n{offset:010} 00000 n \n"));
    }
    let prev = prev.map(|p| format!(" /Prev {p}")).unwrap_or_default();
    xref.push_str(&format!(
        "trailer\n<< /Size {size} {trailer_entries}{prev} >>\nstartxref\n{xref_start}\n%%EOF"
    ));
    content.extend_from_slice(xref.as_bytes());
}

fn last_startxref(content: &[u8]) -> usize {
    let text = String::from_utf8_lossy(content);
    let at = text.rfind("startxref").expect("no startxref");
    text[at + "startxref".len()..]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .expect("bad startxref")
}
