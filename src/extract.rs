//! Offline text extraction.
//!
//! [`LocalExtractor`] handles what can be read without a model: PDF text
//! layers (`pdf-extract`), DOCX (`zip` + `quick-xml`), and plain text or
//! CSV passed through as UTF-8. Images and scanned PDFs with no text layer
//! need the Gemini extractor.

use std::io::Read;

use anyhow::Result;
use async_trait::async_trait;
use quick_xml::events::Event;
use thiserror::Error;

use doco_core::models::{Document, MIME_CSV, MIME_DOCX, MIME_PDF};
use doco_core::provider::TextExtractor;

/// Cap on decompressed `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type for local extraction: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("text is not valid UTF-8")]
    NotUtf8,
}

/// Extract plain text from `bytes` declared as `media_type`.
pub fn extract_text(bytes: &[u8], media_type: &str) -> Result<String, ExtractError> {
    let base = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match base.as_str() {
        MIME_PDF => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string())),
        MIME_DOCX => extract_docx(bytes),
        MIME_CSV | "application/json" => utf8(bytes),
        m if m.starts_with("text/") => utf8(bytes),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

fn utf8(bytes: &[u8]) -> Result<String, ExtractError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    paragraphs_from_wordml(&xml)
}

/// Text runs (`w:t`) joined per paragraph (`w:p`), paragraphs separated by
/// newlines.
fn paragraphs_from_wordml(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(t)) if in_text => {
                current.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

/// [`TextExtractor`] backed by [`extract_text`]. Parsing runs on the
/// blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalExtractor;

#[async_trait]
impl TextExtractor for LocalExtractor {
    fn name(&self) -> &str {
        "local"
    }

    async fn extract_text(&self, document: &Document) -> Result<String> {
        let bytes = document.bytes.clone();
        let media_type = document.media_type.clone();
        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, &media_type)).await??;
        Ok(text)
    }
}
