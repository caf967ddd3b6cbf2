//! Text extraction for uploaded documents (PDF, DOCX, HTML).
//!
//! The format is decided from the declared file extension alone, before any
//! bytes are parsed. Extraction turns the document body into plain UTF-8
//! text with paragraph breaks preserved as blank lines where the format
//! exposes them, so the chunker can prefer those boundaries.

use std::io::Read;
use std::path::Path;

use scraper::{ElementRef, Html, Selector};

use crate::error::{RagError, Result};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Elements whose text never reaches the index.
const HTML_SKIPPED: [&str; 6] = ["script", "style", "noscript", "template", "head", "title"];

/// Elements that end a paragraph when they close.
const HTML_BLOCKS: [&str; 24] = [
    "p", "div", "section", "article", "main", "header", "footer", "aside", "nav", "h1", "h2",
    "h3", "h4", "h5", "h6", "li", "ul", "ol", "table", "tr", "blockquote", "pre", "dl", "dd",
];

/// Inline cells that still need a word boundary between neighbours.
const HTML_CELLS: [&str; 2] = ["td", "th"];

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Html,
}

impl DocumentFormat {
    pub const ALLOWED_EXTENSIONS: [&'static str; 3] = [".pdf", ".docx", ".html"];

    /// Resolve the format from a declared extension such as `".PDF"` or `"docx"`.
    pub fn from_extension(extension: &str) -> Result<Self> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "html" => Ok(DocumentFormat::Html),
            _ => Err(RagError::UnsupportedFormat {
                extension: if normalized.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{}", normalized)
                },
            }),
        }
    }

    /// Resolve the format from a filename or path.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(extension)
    }
}

/// Extract plain text from a document body.
///
/// `filename` is only used to label errors.
pub fn extract_text(bytes: &[u8], format: DocumentFormat, filename: &str) -> Result<String> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes, filename),
        DocumentFormat::Docx => extract_docx(bytes, filename),
        DocumentFormat::Html => extract_html(bytes, filename),
    }
}

fn extract_pdf(bytes: &[u8], filename: &str) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::extraction(filename, format!("PDF extraction failed: {}", e)))
}

fn extract_docx(bytes: &[u8], filename: &str) -> Result<String> {
    let ooxml = |e: String| RagError::extraction(filename, format!("DOCX extraction failed: {}", e));

    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ooxml("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml("word/document.xml exceeds size limit".to_string()));
    }
    extract_word_paragraphs(&doc_xml).map_err(ooxml)
}

/// Collect `<w:t>` runs, one line per `<w:p>` paragraph.
fn extract_word_paragraphs(xml: &[u8]) -> std::result::Result<String, String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_html(bytes: &[u8], filename: &str) -> Result<String> {
    let source = std::str::from_utf8(bytes)
        .map_err(|e| RagError::extraction(filename, format!("HTML is not valid UTF-8: {}", e)))?;
    let document = Html::parse_document(source);
    let body_selector = Selector::parse("body")
        .map_err(|e| RagError::extraction(filename, format!("invalid selector: {:?}", e)))?;
    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    walk_html(root, &mut raw);
    Ok(normalize_blocks(&raw))
}

fn walk_html(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if HTML_SKIPPED.contains(&name) {
                continue;
            }
            if name == "br" {
                out.push('\n');
                continue;
            }
            let block = HTML_BLOCKS.contains(&name);
            let cell = HTML_CELLS.contains(&name);
            if block {
                out.push_str("\n\n");
            } else if cell {
                out.push(' ');
            }
            walk_html(child_el, out);
            if block {
                out.push_str("\n\n");
            } else if cell {
                out.push(' ');
            }
        }
    }
}

/// Collapse intra-line whitespace and keep at most one blank line between
/// paragraphs.
fn normalize_blocks(raw: &str) -> String {
    let mut out = String::new();
    let mut blank_run = false;
    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run { "\n\n" } else { "\n" });
        }
        out.push_str(&collapsed);
        blank_run = false;
    }
    out
}
