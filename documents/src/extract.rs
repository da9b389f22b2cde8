//! Plain-text extraction for supported file formats.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

use crate::error::{ReaderError, Result};

/// Text runs, tabs, line breaks and paragraph ends in WordprocessingML.
static DOCX_TOKENS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab\s*/>|<w:br\s*/>|</w:p>").ok()
});

/// Predefined XML entities and numeric character references.
static XML_ENTITIES: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"&(?:#([0-9]+)|#[xX]([0-9a-fA-F]+)|(lt|gt|quot|apos|amp));").ok()
});

/// Extract the text of the file at `path`, choosing the format by extension.
pub fn extract_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "docx" => extract_docx(path),
        _ => extract_plain(path),
    }
}

/// Read a text file, replacing invalid UTF-8.
pub fn extract_plain(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

/// Extract paragraph text from a `.docx` archive.
pub fn extract_docx(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut xml = String::new();
    match archive.by_name("word/document.xml") {
        Ok(mut part) => {
            part.read_to_string(&mut xml)?;
        }
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ReaderError::MissingDocumentBody(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    }

    document_xml_to_text(&xml)
}

/// Convert the body of `word/document.xml` to text, one line per paragraph.
pub fn document_xml_to_text(xml: &str) -> Result<String> {
    let tokens = DOCX_TOKENS
        .as_ref()
        .ok_or_else(|| ReaderError::Extraction("docx tokenizer failed to compile".to_string()))?;

    let mut text = String::with_capacity(xml.len() / 4);
    for caps in tokens.captures_iter(xml) {
        if let Some(run) = caps.get(1) {
            text.push_str(&decode_entities(run.as_str()));
            continue;
        }
        let Some(token) = caps.get(0) else {
            continue;
        };
        match token.as_str() {
            "</w:p>" => text.push('\n'),
            t if t.starts_with("<w:tab") => text.push('\t'),
            _ => text.push('\n'),
        }
    }

    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    Ok(lines.join("\n").trim().to_string())
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let Some(entities) = XML_ENTITIES.as_ref() else {
        return raw.to_string();
    };
    entities.replace_all(raw, decode_entity).into_owned()
}

/// Unknown names and invalid code points are kept as written.
fn decode_entity(caps: &Captures<'_>) -> String {
    let code = match (caps.get(1), caps.get(2)) {
        (Some(decimal), _) => decimal.as_str().parse().ok(),
        (None, Some(hex)) => u32::from_str_radix(hex.as_str(), 16).ok(),
        (None, None) => None,
    };
    if let Some(c) = code.and_then(char::from_u32) {
        return c.to_string();
    }

    match caps.get(3).as_ref().map(regex_lite::Match::as_str) {
        Some("lt") => "<".to_string(),
        Some("gt") => ">".to_string(),
        Some("quot") => "\"".to_string(),
        Some("apos") => "'".to_string(),
        Some("amp") => "&".to_string(),
        _ => caps.get(0).map_or_else(String::new, |m| m.as_str().to_string()),
    }
}
