//! DOCX 텍스트 추출
//!
//! `word/document.xml` 의 `<w:t>` 텍스트를 문단(`<w:p>`) 단위 줄로 모읍니다.

use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// ZIP 엔트리 최대 해제 크기 (zip bomb 방지)
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const DOCUMENT_XML: &str = "word/document.xml";

/// DOCX 바이트에서 텍스트 추출
pub fn extract_text_from_docx(bytes: &[u8]) -> Result<String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).context("Failed to open DOCX archive")?;

    let entry = archive
        .by_name(DOCUMENT_XML)
        .with_context(|| format!("{} not found in DOCX", DOCUMENT_XML))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .context("Failed to read document.xml")?;

    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        anyhow::bail!("{} exceeds size limit ({} bytes)", DOCUMENT_XML, MAX_XML_ENTRY_BYTES);
    }

    paragraphs_from_xml(&xml)
}

/// 문단별 텍스트를 줄바꿈으로 연결
fn paragraphs_from_xml(xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().context("Invalid text in document.xml")?;
                current.push_str(&text);
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("Malformed document.xml at {}: {}", reader.buffer_position(), e),
            _ => {}
        }
        buf.clear();
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n"))
}
