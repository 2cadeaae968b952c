//! PDF Content Stream Parser
//!
//! Collects the strings shown inside `BT ... ET` text objects (ISO 32000-1
//! Section 9.4), grouped by the font selected with `Tf`. Graphics operators
//! are read but otherwise ignored.
//!
//! Operands are parsed with the regular object grammar and kept on a stack
//! until the next operator consumes them. The stack is cleared after every
//! operator.

use super::cursor::TokenCursor;
use super::lexer::{Token, TokenKind};
use super::objects::PdfObject;
use super::ParseResult;
use tracing::trace;

/// Strings shown with one font inside one text object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBlock {
    /// Font resource name, `None` when text is shown before any `Tf`
    pub font: Option<String>,
    /// Raw bytes of every shown string, in order
    pub strings: Vec<Vec<u8>>,
}

impl TextBlock {
    fn new(font: Option<String>) -> Self {
        Self {
            font,
            strings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Parse a content stream tokenized in [`LexMode::Bytes`](super::LexMode::Bytes).
///
/// The font survives `ET` and applies to the next text object; a `Tf` in the
/// middle of a text object starts a new block. Text objects that show nothing
/// are dropped.
pub fn parse_content(cursor: &mut TokenCursor) -> ParseResult<Vec<TextBlock>> {
    let mut blocks = Vec::new();
    let mut operands: Vec<PdfObject> = Vec::new();
    let mut font: Option<String> = None;
    let mut current: Option<TextBlock> = None;

    while let Some(token) = cursor.peek() {
        if token.kind == TokenKind::Mismatch || is_stray_closer(token) {
            trace!(token = %token.describe(), "skipping content token");
            cursor.next();
            continue;
        }
        if !is_operator(token) {
            operands.push(PdfObject::parse(cursor)?);
            continue;
        }

        let op = token.text().into_owned();
        cursor.next();
        match op.as_str() {
            "BT" => {
                flush(&mut blocks, current.take());
                current = Some(TextBlock::new(font.clone()));
            }
            "ET" => flush(&mut blocks, current.take()),
            "Tf" => {
                if let Some(name) = operands.iter().rev().find_map(|o| o.as_name()) {
                    font = Some(name.as_str().to_string());
                    if let Some(block) = current.as_mut() {
                        if block.is_empty() {
                            block.font = font.clone();
                        } else if block.font != font {
                            let finished = std::mem::replace(block, TextBlock::new(font.clone()));
                            blocks.push(finished);
                        }
                    }
                }
            }
            "Tj" | "'" | "\"" => {
                if let (Some(block), Some(bytes)) = (
                    current.as_mut(),
                    operands.iter().rev().find_map(PdfObject::string_bytes),
                ) {
                    block.strings.push(bytes);
                }
            }
            "TJ" => {
                if let (Some(block), Some(array)) = (
                    current.as_mut(),
                    operands.iter().rev().find_map(|o| o.as_array()),
                ) {
                    block
                        .strings
                        .extend(array.iter().filter_map(PdfObject::string_bytes));
                }
            }
            "ID" => skip_inline_image(cursor),
            _ => {}
        }
        operands.clear();
    }

    // an unterminated text object still counts
    flush(&mut blocks, current);
    Ok(blocks)
}

fn flush(blocks: &mut Vec<TextBlock>, block: Option<TextBlock>) {
    if let Some(block) = block.filter(|b| !b.is_empty()) {
        blocks.push(block);
    }
}

fn is_operator(token: &Token) -> bool {
    token.kind == TokenKind::Keyword
        && !(token.is_keyword("true") || token.is_keyword("false") || token.is_keyword("null"))
}

fn is_stray_closer(token: &Token) -> bool {
    token.is_delim("]") || token.is_delim(">>") || token.is_delim(">")
}

/// Inline image data runs from `ID` to `EI`
fn skip_inline_image(cursor: &mut TokenCursor) {
    while let Some(token) = cursor.next() {
        if token.is_keyword("EI") {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{LexMode, ParseError};
    use pretty_assertions::assert_eq;

    fn blocks(content: &[u8]) -> Vec<TextBlock> {
        parse_content(&mut TokenCursor::from_bytes(content, LexMode::Bytes)).unwrap()
    }

    fn block(font: &str, strings: &[&[u8]]) -> TextBlock {
        TextBlock {
            font: Some(font.to_string()),
            strings: strings.iter().map(|s| s.to_vec()).collect(),
        }
    }

    #[test]
    fn test_simple_text_object() {
        let content = b"BT\n/F1 12 Tf\n72 712 Td\n(Hello World) Tj\nET";
        assert_eq!(blocks(content), vec![block("F1", &[b"Hello World"])]);
    }

    #[test]
    fn test_show_text_variants() {
        let content = b"BT /F1 9 Tf [(Hel) -120 (lo)] TJ (next) ' 2 1 (quoted) \" <414243> Tj ET";
        assert_eq!(
            blocks(content),
            vec![block("F1", &[b"Hel", b"lo", b"next", b"quoted", b"ABC"])]
        );
    }

    #[test]
    fn test_font_persists_across_text_objects() {
        let content = b"BT /F2 10 Tf (a) Tj ET 0 0 1 rg BT (b) Tj ET";
        assert_eq!(
            blocks(content),
            vec![block("F2", &[b"a"]), block("F2", &[b"b"])]
        );
    }

    #[test]
    fn test_font_change_inside_text_object() {
        let content = b"BT /F1 10 Tf (a) Tj /F2 10 Tf (b) Tj /F2 12 Tf (c) Tj ET";
        assert_eq!(
            blocks(content),
            vec![block("F1", &[b"a"]), block("F2", &[b"b", b"c"])]
        );
    }

    #[test]
    fn test_text_without_font() {
        let result = blocks(b"BT (orphan) Tj ET");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].font, None);
    }

    #[test]
    fn test_empty_and_outside_text_is_dropped() {
        let content = b"q 1 0 0 1 0 0 cm (not in BT) Tj Q BT /F1 1 Tf ET";
        assert!(blocks(content).is_empty());
    }

    #[test]
    fn test_binary_strings_stay_opaque() {
        let content = b"BT /F1 1 Tf (\xff\xfe\x00\x01) Tj ET";
        assert_eq!(blocks(content), vec![block("F1", &[b"\xff\xfe\x00\x01"])]);
    }

    #[test]
    fn test_marked_content_and_inline_image() {
        let content = b"/Span << /MCID 3 >> BDC BT /F1 1 Tf (x) Tj ET EMC \
                        BI /W 2 /H 1 /BPC 8 /CS /G ID \x01\x02 EI \
                        BT /F1 1 Tf (y) Tj ET";
        assert_eq!(
            blocks(content),
            vec![block("F1", &[b"x"]), block("F1", &[b"y"])]
        );
    }

    #[test]
    fn test_unterminated_operand_is_an_error() {
        let mut cursor = TokenCursor::from_bytes(b"BT /F1 1 Tf [(a) ", LexMode::Bytes);
        assert!(matches!(
            parse_content(&mut cursor),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }
}
