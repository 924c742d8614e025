//! PDF text extraction with page provenance.

use crate::core::errors::RagError;

use super::{normalize_text, SectionBreak};

/// Extract text from PDF bytes. Form feeds emitted by the extractor mark
/// page boundaries; each page becomes a section break labelled `page N`.
pub(crate) fn extract(bytes: &[u8]) -> Result<(String, Vec<SectionBreak>), RagError> {
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::CorruptSource(format!("PDF extraction failed: {e}")))?;

    let mut text = String::new();
    let mut sections = Vec::new();
    let mut offset = 0usize;

    for (page_no, page) in raw.split('\u{c}').enumerate() {
        let page_text = normalize_text(page);
        if page_text.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str("\n\n");
            offset += 2;
        }
        sections.push(SectionBreak {
            offset,
            label: format!("page {}", page_no + 1),
        });
        offset += page_text.chars().count();
        text.push_str(&page_text);
    }

    Ok((text, sections))
}
