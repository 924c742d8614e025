//! DOCX text extraction.
//!
//! Reads `word/document.xml` out of the OOXML zip container and collects
//! `w:t` text runs, inserting paragraph breaks at `w:p` boundaries. Entry
//! reads are size-bounded so a malformed archive cannot balloon memory.

use std::io::Read;

use quick_xml::events::Event;

use crate::core::errors::RagError;

use super::{normalize_text, SectionBreak};

/// Cap on the decompressed size of the document XML entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub(crate) fn extract(bytes: &[u8]) -> Result<(String, Vec<SectionBreak>), RagError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| RagError::CorruptSource(format!("not a DOCX archive: {e}")))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| RagError::CorruptSource("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| RagError::CorruptSource(format!("failed to read document.xml: {e}")))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(RagError::CorruptSource(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    let text = collect_runs(&doc_xml)?;
    let normalized = normalize_text(&text);
    Ok((normalized, Vec::new()))
}

/// Walk the XML and collect `w:t` text, breaking paragraphs on `w:p`.
fn collect_runs(xml: &[u8]) -> Result<String, RagError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if !out.ends_with("\n\n") {
                        out.push_str("\n\n");
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| RagError::CorruptSource(format!("bad XML text: {e}")))?;
                out.push_str(unescaped.as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(RagError::CorruptSource(format!(
                    "document.xml parse failed: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
