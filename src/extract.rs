//! Plain-text extraction from uploaded `.docx` documents.
//!
//! A `.docx` file is a zip archive; the body text lives in
//! `word/document.xml` as `<w:t>` runs inside `<w:p>` paragraphs. We keep the
//! run text, emit one line per paragraph, and map `<w:tab/>` and `<w:br/>` to
//! a tab and a newline. Styling and headers are ignored.

use std::io::{Cursor, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const DOCUMENT_XML: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported file type '{0}'. Please upload a .docx file.")]
    UnsupportedType(String),

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("Could not open document: {0}")]
    Archive(String),

    #[error("Document has no word/document.xml part")]
    MissingBody,

    #[error("Document body exceeds {limit} bytes once decompressed")]
    TooLarge { limit: u64 },

    #[error("Document contains no text")]
    NoText,
}

/// Whether an upload looks like a `.docx`, by MIME type or file name.
pub fn is_docx(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let by_type = content_type
        .map(|t| t.split(';').next().unwrap_or("").trim() == DOCX_MIME)
        .unwrap_or(false);
    let by_name = file_name
        .map(|n| n.to_ascii_lowercase().ends_with(".docx"))
        .unwrap_or(false);
    by_type || by_name
}

/// Split a `data:<mime>;base64,<payload>` URI into MIME type and bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), ExtractError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ExtractError::InvalidDataUri("missing 'data:' prefix".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ExtractError::InvalidDataUri("missing ',' separator".to_string()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| ExtractError::InvalidDataUri("payload is not base64".to_string()))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ExtractError::InvalidDataUri(e.to_string()))?;
    Ok((mime.to_string(), bytes))
}

/// Extract text from a `.docx` sent as a base64 data URI.
pub fn extract_text_from_data_uri(
    uri: &str,
    max_document_bytes: usize,
) -> Result<String, ExtractError> {
    let (mime, bytes) = decode_data_uri(uri)?;
    if !is_docx(Some(&mime), None) {
        return Err(ExtractError::UnsupportedType(mime));
    }
    extract_text(&bytes, max_document_bytes)
}

/// Extract the body text of a `.docx` file.
///
/// `max_document_bytes` bounds the decompressed body part, independent of the
/// size of the upload itself.
pub fn extract_text(bytes: &[u8], max_document_bytes: usize) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::Archive(e.to_string()))?;

    let limit = max_document_bytes as u64;
    let mut xml = String::new();
    {
        let mut part = archive.by_name(DOCUMENT_XML).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => ExtractError::MissingBody,
            other => ExtractError::Archive(other.to_string()),
        })?;
        if part.size() > limit {
            return Err(ExtractError::TooLarge { limit });
        }
        // The declared size can lie; never inflate past the limit.
        part.by_ref()
            .take(limit + 1)
            .read_to_string(&mut xml)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        if xml.len() as u64 > limit {
            return Err(ExtractError::TooLarge { limit });
        }
    }

    let text = document_xml_to_text(&xml)?;
    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }
    tracing::debug!(chars = text.len(), "Extracted document text");
    Ok(text)
}

/// Flatten WordprocessingML to text.
fn document_xml_to_text(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;
    // Tab stop definitions inside paragraph properties are also `<w:tab>`.
    let mut in_props = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            ExtractError::Archive(format!(
                "malformed document XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"pPr" => in_props = true,
                b"tab" if !in_props => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" if !in_props => out.push('\t'),
                b"br" | b"cr" | b"p" => out.push('\n'),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"pPr" => in_props = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractError::Archive(format!("bad text run: {}", e)))?;
                out.push_str(&text);
            }
            Event::CData(c) if in_text => out.push_str(&String::from_utf8_lossy(&c)),
            Event::Eof => break,
            _ => {}
        }
    }

    // Collapse trailing whitespace per line and drop runs of blank lines.
    let mut result = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        result.push_str(line);
        result.push('\n');
    }
    Ok(result.trim().to_string())
}
