//! Print the text blocks of every page (or one page) of a PDF file

use pdfscan::parser::{PdfDocument, PdfReader};
use pdfscan::ReaderOptions;
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <pdf_file> [page_number]", args[0]);
        eprintln!("Example: {} document.pdf 1", args[0]);
        std::process::exit(1);
    }

    let pdf_path = &args[1];
    let page_number = args.get(2).and_then(|s| s.parse::<usize>().ok());

    let reader = PdfReader::open_with_options(pdf_path, ReaderOptions::lenient())?;
    let document = PdfDocument::new(reader)?;
    println!("{pdf_path}: {} pages", document.page_count());

    let pages: Vec<usize> = match page_number {
        Some(n) => vec![n],
        None => (1..=document.page_count()).collect(),
    };

    for number in pages {
        println!("\n--- page {number} ---");
        match document.get_page_text(number) {
            Ok(blocks) => {
                for block in blocks {
                    println!("{block}");
                }
            }
            Err(e) => eprintln!("page {number}: {e}"),
        }
    }

    Ok(())
}
