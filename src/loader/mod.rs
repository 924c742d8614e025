//! Document loading: heterogeneous source formats to plain text.
//!
//! The format set is a closed enum resolved once at ingestion entry; every
//! loader is a pure transform from bytes to normalized UTF-8 text plus
//! section provenance markers (page or heading breaks) so citation offsets
//! can be mapped back to a place in the source.

mod docx;
mod html;
mod pdf;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

/// Source formats accepted by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Html,
    Markdown,
    Text,
}

impl DocumentFormat {
    /// Resolve a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Result<Self, RagError> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "html" | "htm" => Ok(Self::Html),
            "md" | "markdown" => Ok(Self::Markdown),
            "txt" | "text" => Ok(Self::Text),
            other => Err(RagError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Html => "html",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural marker surviving from the source document: the character
/// offset (into the normalized text) where a page or section starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionBreak {
    pub offset: usize,
    pub label: String,
}

/// Normalized plain text plus provenance, ready for chunking.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub text: String,
    pub source: String,
    pub format: DocumentFormat,
    /// Always non-empty; the first entry starts at offset 0.
    pub sections: Vec<SectionBreak>,
}

impl LoadedDocument {
    /// Label of the section containing the given character offset.
    pub fn section_at(&self, offset: usize) -> Option<&SectionBreak> {
        self.sections.iter().rev().find(|s| s.offset <= offset)
    }
}

/// Load raw bytes in the declared format.
pub fn load_bytes(
    bytes: &[u8],
    source: &str,
    format: DocumentFormat,
) -> Result<LoadedDocument, RagError> {
    let (text, sections) = match format {
        DocumentFormat::Pdf => pdf::extract(bytes)?,
        DocumentFormat::Docx => docx::extract(bytes)?,
        DocumentFormat::Html => {
            let raw = decode_utf8(bytes)?;
            html::extract(&raw)
        }
        DocumentFormat::Markdown => {
            let raw = decode_utf8(bytes)?;
            markdown_sections(&normalize_text(&raw))
        }
        DocumentFormat::Text => {
            let normalized = normalize_text(&decode_utf8(bytes)?);
            (normalized, Vec::new())
        }
    };

    let mut sections = sections;
    if sections.first().map(|s| s.offset) != Some(0) {
        sections.insert(
            0,
            SectionBreak {
                offset: 0,
                label: "start".to_string(),
            },
        );
    }

    tracing::debug!(
        "loaded {} as {}: {} chars, {} section(s)",
        source,
        format,
        text.chars().count(),
        sections.len()
    );

    Ok(LoadedDocument {
        text,
        source: source.to_string(),
        format,
        sections,
    })
}

fn decode_utf8(bytes: &[u8]) -> Result<String, RagError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| RagError::CorruptSource(format!("invalid UTF-8: {e}")))
}

/// Normalize line endings and collapse runs of blank lines, preserving
/// paragraph structure for the chunker's boundary search.
pub(crate) fn normalize_text(raw: &str) -> String {
    static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();
    let blank_runs = BLANK_RUNS.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"));

    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    blank_runs.replace_all(&unified, "\n\n").trim().to_string()
}

/// Record `#` headings as section breaks (offsets are char offsets).
fn markdown_sections(text: &str) -> (String, Vec<SectionBreak>) {
    let mut sections = Vec::new();
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let label = trimmed.trim_start_matches('#').trim();
            if !label.is_empty() {
                sections.push(SectionBreak {
                    offset,
                    label: label.to_string(),
                });
            }
        }
        offset += line.chars().count();
    }
    (text.to_string(), sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_dispatch() {
        assert_eq!(DocumentFormat::from_extension("PDF").unwrap(), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_extension(".htm").unwrap(), DocumentFormat::Html);
        assert!(matches!(
            DocumentFormat::from_extension("xlsx"),
            Err(RagError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn text_load_normalizes_line_endings() {
        let doc = load_bytes(b"one\r\ntwo\r\n\r\n\r\n\r\nthree", "a.txt", DocumentFormat::Text)
            .unwrap();
        assert_eq!(doc.text, "one\ntwo\n\nthree");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].offset, 0);
    }

    #[test]
    fn markdown_headings_become_sections() {
        let md = "# Intro\n\nHello.\n\n## Details\n\nWorld.";
        let doc = load_bytes(md.as_bytes(), "a.md", DocumentFormat::Markdown).unwrap();
        let labels: Vec<&str> = doc.sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Intro", "Details"]);

        let world_at = doc.text.find("World").unwrap();
        assert_eq!(doc.section_at(world_at).unwrap().label, "Details");
    }

    #[test]
    fn invalid_utf8_is_corrupt_source() {
        let result = load_bytes(&[0xff, 0xfe, 0x00], "bad.txt", DocumentFormat::Text);
        assert!(matches!(result, Err(RagError::CorruptSource(_))));
    }
}
