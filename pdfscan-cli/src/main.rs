use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pdfscan::parser::{ImageEncoding, PageImage};
use pdfscan::text::Font;
use pdfscan::{PdfDocument, ReaderOptions};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pdfscan",
    about = "Inspect the objects, fonts, text and images of a PDF file",
    version,
    author
)]
struct Cli {
    /// Log resolution steps (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Treat unexpected /Type entries as errors
    #[arg(long, global = true)]
    strict: bool,

    /// Bytes scanned back from the end of the file for `startxref`
    #[arg(long, global = true, value_name = "BYTES")]
    footer_scan: Option<usize>,

    /// Recursion bound for the page tree and color spaces
    #[arg(long, global = true, value_name = "LEVELS")]
    max_depth: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the trailer, cross-reference table and catalog as JSON
    Summary {
        /// Input PDF file
        input: PathBuf,
    },

    /// Show one object: its xref entry by default, or save it as an image
    Object {
        /// Input PDF file
        input: PathBuf,

        /// Object number
        number: u32,

        #[command(flatten)]
        views: ObjectViews,
    },

    /// Print the bytes of a byte range line by line
    Section {
        /// Input PDF file
        input: PathBuf,

        /// First byte offset
        start: u64,

        /// Offset one past the last byte
        end: u64,
    },

    /// List the fonts of a page as JSON
    Fonts {
        /// Input PDF file
        input: PathBuf,

        /// Page number, starting at 1
        page: usize,
    },

    /// Print the text blocks of a page
    Text {
        /// Input PDF file
        input: PathBuf,

        /// Page number, starting at 1
        page: usize,
    },

    /// List the images of a page
    Images {
        /// Input PDF file
        input: PathBuf,

        /// Page number, starting at 1
        page: usize,

        /// Write each image into this directory (.jpg or .png)
        #[arg(short, long, value_name = "DIR")]
        save: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct ObjectViews {
    /// Token list of the object's bytes
    #[arg(long)]
    tokens: bool,

    /// Raw bytes of the object
    #[arg(long)]
    raw: bool,

    /// Parsed value as JSON
    #[arg(long)]
    parsed: bool,

    /// Everything above plus the xref entry
    #[arg(long)]
    all: bool,

    /// Save the object as an image into this directory (.jpg or .png)
    #[arg(long, value_name = "DIR")]
    image: Option<PathBuf>,
}

impl ObjectViews {
    fn xref(&self) -> bool {
        self.all || !(self.tokens || self.raw || self.parsed || self.image.is_some())
    }
}

impl Cli {
    fn reader_options(&self) -> ReaderOptions {
        let mut options = if self.strict {
            ReaderOptions::strict()
        } else {
            ReaderOptions::lenient()
        };
        if let Some(bytes) = self.footer_scan {
            options.footer_scan_len = bytes;
        }
        if let Some(levels) = self.max_depth {
            options.max_tree_depth = levels;
        }
        options
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "pdfscan=debug" } else { "pdfscan=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(input: &Path, options: ReaderOptions) -> Result<PdfDocument<File>> {
    debug!(path = %input.display(), ?options, "opening document");
    PdfDocument::open_with_options(input, options)
        .with_context(|| format!("Failed to open PDF {}", input.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = cli.reader_options();

    match cli.command {
        Commands::Summary { input } => {
            let doc = open(&input, options)?;
            let summary = doc.summary();
            println!("{}", summary.to_json().context("Failed to serialize summary")?);
        }

        Commands::Object {
            input,
            number,
            views,
        } => {
            let doc = open(&input, options)?;
            let reader = doc.reader();

            if views.xref() {
                let entry = reader
                    .xref()
                    .get(number)
                    .with_context(|| format!("Object {number} is not in the xref table"))?;
                let extent = reader.object_extent(number).ok();
                print_json(&json!({
                    "object": number,
                    "entry": entry,
                    "extent": extent.map(|e| [e.start, e.end]),
                }))?;
            }

            if views.tokens || views.all {
                let tokens = reader
                    .tokens_for(number)
                    .with_context(|| format!("Failed to tokenize object {number}"))?;
                for token in tokens {
                    println!("{}:{}\t{:?}\t{}", token.line, token.column, token.kind, token.describe());
                }
            }

            if views.raw || views.all {
                let bytes = reader
                    .get_object_bytes(number)
                    .with_context(|| format!("Failed to read object {number}"))?;
                println!("{}", String::from_utf8_lossy(&bytes));
            }

            if views.parsed || views.all {
                let object = doc
                    .get_object(number)
                    .with_context(|| format!("Failed to parse object {number}"))?;
                print_json(&object)?;
            }

            if let Some(dir) = &views.image {
                let image = doc
                    .get_image(number)
                    .with_context(|| format!("Object {number} is not a readable image"))?;
                print_json(&image)?;
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                let path = save_image(&image, dir)?;
                eprintln!("Wrote {}", path.display());
            }
        }

        Commands::Section { input, start, end } => {
            let doc = open(&input, options)?;
            let lines = doc
                .reader()
                .read_section(start, end)
                .with_context(|| format!("Failed to read bytes {start}..{end}"))?;
            for line in lines {
                println!("{line}");
            }
        }

        Commands::Fonts { input, page } => {
            let doc = open(&input, options)?;
            let fonts = doc
                .page_fonts(page)
                .with_context(|| format!("Failed to load fonts of page {page}"))?;
            let fonts: BTreeMap<&str, &Font> = fonts
                .iter()
                .map(|(name, font)| (name.as_str(), font.as_ref()))
                .collect();
            print_json(&fonts)?;
        }

        Commands::Text { input, page } => {
            let doc = open(&input, options)?;
            let blocks = doc
                .get_page_text(page)
                .with_context(|| format!("Failed to extract text from page {page}"))?;
            for block in blocks {
                println!("{block}");
            }
        }

        Commands::Images { input, page, save } => {
            let doc = open(&input, options)?;
            let images = doc
                .get_page_images(page)
                .with_context(|| format!("Failed to read images of page {page}"))?;
            print_json(&images)?;

            if let Some(dir) = save {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                let mut written = 0;
                for image in images.values() {
                    match save_image(image, &dir) {
                        Ok(path) => {
                            eprintln!("Wrote {}", path.display());
                            written += 1;
                        }
                        Err(e) => warn!(image = %image.name, "not saved: {e:#}"),
                    }
                }
                if written == 0 && !images.is_empty() {
                    bail!("none of the {} images could be saved", images.len());
                }
            }
        }
    }

    Ok(())
}

fn save_image(image: &PageImage, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("{}.{}", image.name, image.encoding.extension()));
    let bytes = match image.encoding {
        ImageEncoding::Jpeg => image.data.clone(),
        ImageEncoding::Raw => image.to_png()?,
    };
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
