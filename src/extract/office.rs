//! OOXML extraction (DOCX, XLSX, PPTX).
//!
//! Each format is a ZIP of XML parts. Entries are read with a size bound
//! (zip-bomb protection) and streamed through `quick-xml`; structure is
//! kept as line breaks: one line per Word paragraph, per spreadsheet row
//! and per slide paragraph.

use std::io::Read;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use docsage_core::{PipelineError, PipelineResult};

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn ooxml_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::ExtractionFailed(format!("OOXML: {}", e))
}

fn open_archive(bytes: &[u8]) -> PipelineResult<Archive<'_>> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml_err)
}

/// Names of the entries in a ZIP, or `None` when the bytes are not a ZIP.
pub fn zip_entry_names(bytes: &[u8]) -> Option<Vec<String>> {
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).ok()?;
    Some(archive.file_names().map(str::to_string).collect())
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> PipelineResult<Vec<u8>> {
    let entry = archive.by_name(name).map_err(ooxml_err)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(ooxml_err)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml_err(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entries named `<prefix><n>.xml`, sorted by `n`.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .filter(|n| n[prefix.len()..n.len() - 4].parse::<u32>().is_ok())
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name[prefix.len()..name.len() - 4]
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

pub fn extract_docx(bytes: &[u8]) -> PipelineResult<String> {
    let mut archive = open_archive(bytes)?;
    if archive.index_for_name("word/document.xml").is_none() {
        return Err(ooxml_err("word/document.xml not found"));
    }
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    paragraphs_text(&xml)
}

pub fn extract_pptx(bytes: &[u8]) -> PipelineResult<String> {
    let mut archive = open_archive(bytes)?;
    let slides = numbered_parts(&archive, "ppt/slides/slide");
    let mut out = Vec::new();
    for name in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = paragraphs_text(&xml)?;
        if !text.trim().is_empty() {
            out.push(text.trim().to_string());
        }
    }
    Ok(out.join("\n\n"))
}

/// Text of `w:p` (Word) or `a:p` (DrawingML) paragraphs, one per line.
///
/// Runs are `t` elements; `tab` inserts a tab (except inside a `tabs`
/// definition list) and `br`/`cr` insert line breaks.
fn paragraphs_text(xml: &[u8]) -> PipelineResult<String> {
    let mut out = String::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    let mut in_tabs = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_t = true,
                b"tabs" => in_tabs = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" if !in_tabs => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                out.push_str(&te.unescape().map_err(ooxml_err)?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"tabs" => in_tabs = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

pub fn extract_xlsx(bytes: &[u8]) -> PipelineResult<String> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.index_for_name("xl/sharedStrings.xml").is_some() {
        read_shared_strings(&read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };
    let sheets = numbered_parts(&archive, "xl/worksheets/sheet");
    let mut out = Vec::new();
    for name in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let rows = sheet_rows(&xml, &shared_strings)?;
        if !rows.is_empty() {
            out.push(rows.join("\n"));
        }
    }
    Ok(out.join("\n\n"))
}

/// Shared strings table; rich-text runs inside one `si` are concatenated.
fn read_shared_strings(xml: &[u8]) -> PipelineResult<Vec<String>> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(ooxml_err)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellType {
    Shared,
    Inline,
    Bool,
    Other,
}

fn cell_type(e: &BytesStart<'_>) -> CellType {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"t" {
            return match attr.value.as_ref() {
                b"s" => CellType::Shared,
                b"inlineStr" => CellType::Inline,
                b"b" => CellType::Bool,
                _ => CellType::Other,
            };
        }
    }
    CellType::Other
}

/// One string per non-empty row, cells joined by ` | `.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> PipelineResult<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut kind = CellType::Other;
    let mut value = String::new();
    let mut capture = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    kind = cell_type(&e);
                    value.clear();
                }
                b"v" => capture = kind != CellType::Inline,
                b"t" => capture = kind == CellType::Inline,
                _ => {}
            },
            Ok(Event::Text(te)) if capture => {
                value.push_str(&te.unescape().map_err(ooxml_err)?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    let text = resolve_cell(kind, value.trim(), shared_strings);
                    if !text.is_empty() {
                        row.push(text);
                        cell_count += 1;
                    }
                    kind = CellType::Other;
                }
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join(" | "));
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(" | "));
    }
    Ok(rows)
}

fn resolve_cell(kind: CellType, raw: &str, shared_strings: &[String]) -> String {
    match kind {
        CellType::Shared => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        CellType::Bool => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        CellType::Inline | CellType::Other => raw.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;

    /// Build an in-memory ZIP from `(name, contents)` pairs.
    pub fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (name, body) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{}</w:body></w:document>",
            body
        );
        zip_of(&[("word/document.xml", &xml)])
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{docx, zip_of};
    use super::*;

    #[test]
    fn test_docx_paragraphs_tabs_and_breaks() {
        let xml = "<w:document xmlns:w=\"w\"><w:body>\
            <w:p><w:pPr><w:tabs><w:tab w:val=\"left\" w:pos=\"720\"/></w:tabs></w:pPr>\
            <w:r><w:t>Name</w:t></w:r><w:r><w:tab/><w:t>Value</w:t></w:r></w:p>\
            <w:p><w:r><w:t xml:space=\"preserve\">Line one </w:t><w:br/><w:t>line two &amp; more</w:t></w:r></w:p>\
            </w:body></w:document>";
        let bytes = zip_of(&[("word/document.xml", xml)]);
        assert_eq!(
            extract_docx(&bytes).unwrap(),
            "Name\tValue\nLine one \nline two & more\n"
        );
    }

    #[test]
    fn test_docx_fixture_paragraph_order() {
        let text = extract_docx(&docx(&["First.", "Second.", "Third."])).unwrap();
        assert_eq!(text, "First.\nSecond.\nThird.\n");
    }

    #[test]
    fn test_docx_missing_document_part() {
        let bytes = zip_of(&[("other.xml", "<x/>")]);
        assert!(matches!(
            extract_docx(&bytes),
            Err(PipelineError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn test_invalid_zip_is_extraction_failure() {
        assert!(matches!(
            extract_xlsx(b"not a zip"),
            Err(PipelineError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn test_xlsx_rows_and_cell_types() {
        let shared = "<sst><si><t>Item</t></si><si><t>Price</t></si>\
                      <si><r><t>Green </t></r><r><t>tea</t></r></si></sst>";
        let sheet1 = "<worksheet><sheetData>\
            <row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"B1\" t=\"s\"><v>1</v></c></row>\
            <row r=\"2\"><c r=\"A2\" t=\"s\"><v>2</v></c><c r=\"B2\"><v>4.5</v></c></row>\
            <row r=\"3\"><c r=\"A3\" t=\"inlineStr\"><is><t>Inline</t></is></c><c r=\"B3\" t=\"b\"><v>1</v></c></row>\
            <row r=\"4\"></row>\
            </sheetData></worksheet>";
        let sheet2 = "<worksheet><sheetData><row><c><v>7</v></c></row></sheetData></worksheet>";
        let bytes = zip_of(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet2.xml", sheet2),
            ("xl/worksheets/sheet1.xml", sheet1),
        ]);
        assert_eq!(
            extract_xlsx(&bytes).unwrap(),
            "Item | Price\nGreen tea | 4.5\nInline | TRUE\n\n7"
        );
    }

    #[test]
    fn test_pptx_slides_in_numeric_order() {
        let slide = |t: &str| {
            format!(
                "<p:sld xmlns:p=\"p\" xmlns:a=\"a\"><p:cSld><p:spTree><p:sp><p:txBody>\
                 <a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                t
            )
        };
        let (s1, s2, s10) = (slide("one"), slide("two"), slide("ten"));
        let bytes = zip_of(&[
            ("ppt/slides/slide10.xml", &s10),
            ("ppt/slides/slide2.xml", &s2),
            ("ppt/slides/slide1.xml", &s1),
        ]);
        assert_eq!(extract_pptx(&bytes).unwrap(), "one\n\ntwo\n\nten");
    }
}
