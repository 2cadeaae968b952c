//! Property-based tests for lexer, object grammar and stream decoders
//!
//! The parser must never panic, whatever bytes it is given, and the decoders
//! must invert the corresponding encoders.

mod common;

use common::{lzw_literals, png_predict, PdfBuilder};
use pdfscan::parser::filter_impls::{decode_lzw, unpredict, PredictorParams};
use pdfscan::parser::{LexMode, Lexer, PdfReader, TokenCursor};
use pdfscan::PdfObject;
use proptest::prelude::*;
use std::io::Cursor;

// Fragments that exercise every token class
fn pdf_fragment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,40}",
        "[a-zA-Z0-9()\\\\ ]{0,40}".prop_map(|s| format!("({s})")),
        "[0-9A-Fa-f ]{0,40}".prop_map(|s| format!("<{s}>")),
        "[a-zA-Z][a-zA-Z0-9#._-]{0,20}".prop_map(|s| format!("/{s}")),
        "[-+]?[0-9]{0,8}\\.?[0-9]{0,4}",
        Just("<< /Type /Page >>".to_string()),
        Just("[1 0 R 2 0 R]".to_string()),
        Just("% comment\r\n".to_string()),
        Just("{ } , : =".to_string()),
    ]
}

fn pdf_text_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(pdf_fragment_strategy(), 0..20).prop_map(|parts| parts.join(" ").into_bytes())
}

proptest! {
    #[test]
    fn test_lexer_never_panics(input in prop::collection::vec(any::<u8>(), 0..512)) {
        for mode in [LexMode::Text, LexMode::Bytes] {
            let mut last_line = 1;
            for token in Lexer::with_mode(&input, mode) {
                prop_assert!(token.line >= last_line);
                prop_assert!(token.column >= 1);
                last_line = token.line;
            }
        }
    }

    #[test]
    fn test_object_parser_never_panics(input in pdf_text_strategy()) {
        let mut cursor = TokenCursor::from_bytes(&input, LexMode::Text);
        while !cursor.is_at_end() {
            let before = cursor.remaining().len();
            if PdfObject::parse(&mut cursor).is_err() {
                break;
            }
            prop_assert!(cursor.remaining().len() < before);
        }
    }

    #[test]
    fn test_reader_never_panics_on_garbage(input in prop::collection::vec(any::<u8>(), 0..1024)) {
        let _ = PdfReader::new(Cursor::new(input));
    }

    #[test]
    fn test_reader_never_panics_on_truncation(cut in 0usize..400) {
        let pdf = PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>")
            .build("/Root 1 0 R");
        let cut = cut.min(pdf.len());
        let truncated = pdf[..pdf.len() - cut].to_vec();
        if let Ok(reader) = PdfReader::new(Cursor::new(truncated)) {
            for num in 0..5 {
                let _ = reader.get_object(num);
            }
        }
    }

    #[test]
    fn test_integers_parse_exactly(n in -1_000_000_000_000_000i64..1_000_000_000_000_000) {
        let text = format!("<< /N {n} >>");
        let mut cursor = TokenCursor::from_bytes(text.as_bytes(), LexMode::Text);
        let obj = PdfObject::parse(&mut cursor).unwrap();
        prop_assert_eq!(obj.as_dict().and_then(|d| d.get_integer("N")), Some(n));
    }

    #[test]
    fn test_names_and_strings_survive_parsing(
        name in "[A-Za-z][A-Za-z0-9]{0,20}",
        text in "[a-zA-Z0-9 ]{0,50}",
    ) {
        let source = format!("[/{name} ({text})]");
        let mut cursor = TokenCursor::from_bytes(source.as_bytes(), LexMode::Text);
        let obj = PdfObject::parse(&mut cursor).unwrap();
        let array = obj.as_array().unwrap();
        prop_assert_eq!(array.get(0).and_then(|o| o.as_name()).map(|n| n.as_str()), Some(name.as_str()));
        prop_assert_eq!(array.get(1).and_then(PdfObject::string_bytes), Some(text.into_bytes()));
    }

    #[test]
    fn test_lzw_literal_codes_round_trip(
        data in prop::collection::vec(any::<u8>(), 0..3000),
        early_change in any::<bool>(),
    ) {
        let encoded = lzw_literals(&data, early_change);
        prop_assert_eq!(decode_lzw(&encoded, early_change).unwrap(), data);
    }

    #[test]
    fn test_png_predictors_invert(
        (columns, colors, rows) in (1usize..8, 1usize..5).prop_flat_map(|(columns, colors)| {
            let row = prop::collection::vec(any::<u8>(), columns * colors);
            (Just(columns), Just(colors), prop::collection::vec(row, 1..6))
        }),
        tag in 0u8..5,
    ) {
        let params = PredictorParams {
            predictor: 10 + i64::from(tag),
            colors,
            bits_per_component: 8,
            columns,
        };
        let encoded = png_predict(&rows, tag, colors);
        prop_assert_eq!(unpredict(encoded, &params).unwrap(), rows.concat());
    }

    #[test]
    fn test_tiff_predictor_inverts(
        (columns, colors, rows) in (1usize..8, 1usize..5).prop_flat_map(|(columns, colors)| {
            let row = prop::collection::vec(any::<u8>(), columns * colors);
            (Just(columns), Just(colors), prop::collection::vec(row, 1..6))
        }),
    ) {
        let params = PredictorParams {
            predictor: 2,
            colors,
            bits_per_component: 8,
            columns,
        };
        let mut encoded = Vec::new();
        for row in &rows {
            for i in 0..row.len() {
                let left = if i >= colors { row[i - colors] } else { 0 };
                encoded.push(row[i].wrapping_sub(left));
            }
        }
        prop_assert_eq!(unpredict(encoded, &params).unwrap(), rows.concat());
    }
}
